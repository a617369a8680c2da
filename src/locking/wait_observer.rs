// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Observer interfaces for lock wait instrumentation.
//!
//! Observers decouple the `PathLockController` from user-facing feedback so
//! callers can surface contention without duplicating the retry loop.

use crate::locking::identity::LockIdentity;
use crate::locking::timeout::LockTimeoutValue;
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observer hooks for lock wait events.
pub trait LockWaitObserver: Send + Sync {
    /// Called once per call, the first time the engine has to wait.
    fn on_wait_start(&self, _identity: &LockIdentity, _deadline: LockTimeoutValue) {}

    /// Called after a wait interval elapsed without the semaphore being signaled.
    fn on_retry(
        &self,
        _identity: &LockIdentity,
        _attempt: usize,
        _elapsed: Duration,
        _remaining: Option<Duration>,
    ) {
    }

    fn on_acquired(&self, _identity: &LockIdentity, _waited: Duration, _created_new: bool) {}

    fn on_deadline_exceeded(&self, _identity: &LockIdentity, _waited: Duration) {}

    fn on_cancelled(&self, _identity: &LockIdentity, _waited: Duration) {}
}

/// Writes human-readable wait progress lines, throttled to one progress line
/// per `interval`.
pub struct LockWaitReporter<W: Write + Send> {
    sink: Mutex<W>,
    interval: Duration,
    state: Mutex<ReporterState>,
}

#[derive(Default)]
struct ReporterState {
    waiting: bool,
    last_emit: Option<Instant>,
}

impl LockWaitReporter<std::io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(std::io::stderr(), Duration::from_secs(5))
    }
}

impl<W: Write + Send> LockWaitReporter<W> {
    pub fn new(sink: W, interval: Duration) -> Self {
        Self {
            sink: Mutex::new(sink),
            interval,
            state: Mutex::new(ReporterState::default()),
        }
    }

    pub fn into_inner(self) -> W {
        self.sink
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, message: &str) {
        if let Ok(mut sink) = self.sink.lock() {
            let _ = writeln!(sink, "{message}");
        }
    }
}

impl<W: Write + Send> LockWaitObserver for LockWaitReporter<W> {
    fn on_wait_start(&self, identity: &LockIdentity, deadline: LockTimeoutValue) {
        if let Ok(mut state) = self.state.lock() {
            state.waiting = true;
            state.last_emit = Some(Instant::now());
        }
        self.emit(&format!(
            "Waiting for lock {identity} (deadline: {deadline}); Ctrl-C to cancel."
        ));
    }

    fn on_retry(
        &self,
        identity: &LockIdentity,
        attempt: usize,
        elapsed: Duration,
        remaining: Option<Duration>,
    ) {
        let now = Instant::now();
        let due = match self.state.lock() {
            Ok(mut state) => {
                let due = state
                    .last_emit
                    .map(|last| now.duration_since(last) >= self.interval)
                    .unwrap_or(true);
                if due {
                    state.last_emit = Some(now);
                }
                due
            }
            Err(_) => false,
        };
        if !due {
            return;
        }

        let remaining_text = remaining
            .map(|value| format!(" (~{:.1}s remaining)", value.as_secs_f64()))
            .unwrap_or_default();
        self.emit(&format!(
            "Still waiting for lock {identity} after {:.1}s, attempt {attempt}{remaining_text}",
            elapsed.as_secs_f64()
        ));
    }

    fn on_acquired(&self, identity: &LockIdentity, waited: Duration, _created_new: bool) {
        let waited_before = self
            .state
            .lock()
            .map(|state| state.waiting)
            .unwrap_or(false);
        if waited_before {
            self.emit(&format!(
                "Acquired lock {identity} after {:.1}s.",
                waited.as_secs_f64()
            ));
        }
    }

    fn on_deadline_exceeded(&self, identity: &LockIdentity, waited: Duration) {
        self.emit(&format!(
            "Gave up waiting for lock {identity} after {:.1}s.",
            waited.as_secs_f64()
        ));
    }

    fn on_cancelled(&self, identity: &LockIdentity, waited: Duration) {
        self.emit(&format!(
            "Cancelled wait for lock {identity} after {:.1}s.",
            waited.as_secs_f64()
        ));
    }
}
