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

use crate::locking::cancellation::CancellationToken;
use crate::locking::identity::LockIdentity;
use crate::locking::timeout::{DEFAULT_WAIT_INTERVAL, LockTimeoutSource, LockTimeoutValue};
use crate::locking::wait_observer::LockWaitObserver;
use std::cmp;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Indicates whether a lock request may block waiting for contention to clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireMode {
    Blocking,
    NonBlocking,
}

impl AcquireMode {
    pub fn is_non_blocking(self) -> bool {
        matches!(self, AcquireMode::NonBlocking)
    }
}

/// Exponential backoff bounding each slice of a wait, so cancellation and the
/// deadline are rechecked regularly without busy polling.
#[derive(Debug, Clone)]
pub struct PollingBackoff {
    initial: Duration,
    factor: u32,
    cap: Duration,
    current: Duration,
}

impl PollingBackoff {
    pub fn new(initial: Duration, factor: u32, cap: Duration) -> Self {
        Self {
            initial,
            factor: cmp::max(factor, 1),
            cap,
            current: initial,
        }
    }

    /// Returns the current delay and advances the backoff sequence.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.saturating_mul(self.factor);
        self.current = cmp::min(next, self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

impl Default for PollingBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(10), 2, Duration::from_millis(1_100))
    }
}

/// Tracks elapsed and remaining time for the overall deadline of one call.
#[derive(Debug, Clone)]
pub struct LockTimeoutBudget {
    value: LockTimeoutValue,
    started_at: Instant,
}

impl LockTimeoutBudget {
    pub fn new(value: LockTimeoutValue) -> Self {
        Self {
            value,
            started_at: Instant::now(),
        }
    }

    pub fn value(&self) -> LockTimeoutValue {
        self.value
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn remaining(&self) -> Option<Duration> {
        match self.value {
            LockTimeoutValue::Infinite => None,
            LockTimeoutValue::Finite(limit) => Some(limit.saturating_sub(self.elapsed())),
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.value, LockTimeoutValue::Finite(limit) if self.elapsed() >= limit)
    }
}

/// Everything one call to the engine needs: which path, how long each
/// attempt waits, the overall deadline, and who to tell about waiting.
pub struct LockAcquisitionRequest<'a> {
    path: PathBuf,
    wait_interval: Duration,
    budget: LockTimeoutBudget,
    source: LockTimeoutSource,
    cancellation: CancellationToken,
    backoff: PollingBackoff,
    observer: Option<&'a dyn LockWaitObserver>,
    mode: AcquireMode,
    retries: usize,
    wait_started: bool,
}

impl<'a> LockAcquisitionRequest<'a> {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            wait_interval: DEFAULT_WAIT_INTERVAL,
            budget: LockTimeoutBudget::new(LockTimeoutValue::Infinite),
            source: LockTimeoutSource::Default,
            cancellation: CancellationToken::new(),
            backoff: PollingBackoff::default(),
            observer: None,
            mode: AcquireMode::Blocking,
            retries: 0,
            wait_started: false,
        }
    }

    pub fn with_mode(mut self, mode: AcquireMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_wait_interval(mut self, wait_interval: Duration) -> Self {
        self.wait_interval = wait_interval;
        self
    }

    /// Sets the overall deadline; the clock starts now.
    pub fn with_deadline(mut self, deadline: LockTimeoutValue) -> Self {
        self.budget = LockTimeoutBudget::new(deadline);
        self
    }

    pub fn with_deadline_source(mut self, source: LockTimeoutSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn with_backoff(mut self, backoff: PollingBackoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_observer(mut self, observer: Option<&'a dyn LockWaitObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity for the next attempt; recomputed every time.
    pub fn identity(&self) -> LockIdentity {
        LockIdentity::from_path(&self.path)
    }

    pub fn mode(&self) -> AcquireMode {
        self.mode
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    pub fn budget(&self) -> &LockTimeoutBudget {
        &self.budget
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn elapsed(&self) -> Duration {
        self.budget.elapsed()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.budget.remaining()
    }

    pub fn deadline(&self) -> LockTimeoutValue {
        self.budget.value()
    }

    pub fn deadline_source(&self) -> LockTimeoutSource {
        self.source
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Starts a new wait interval. Slices grow again from the initial backoff
    /// so a freshly reopened lock is polled promptly.
    pub fn begin_window(&mut self) {
        self.backoff.reset();
    }

    /// Length of the next wait slice, bounded by the backoff, the rest of the
    /// current wait interval and the rest of the deadline. `None` once the
    /// interval is used up.
    pub fn next_slice(&mut self, window_remaining: Duration) -> Option<Duration> {
        if window_remaining.is_zero() {
            return None;
        }
        let mut slice = self.backoff.next_delay().min(window_remaining);
        if let Some(remaining) = self.remaining() {
            slice = slice.min(remaining);
        }
        Some(slice)
    }

    pub fn record_wait_start(&mut self, identity: &LockIdentity) {
        if !self.wait_started {
            if let Some(observer) = self.observer {
                observer.on_wait_start(identity, self.deadline());
            }
            self.wait_started = true;
        }
    }

    pub fn record_retry(&mut self, identity: &LockIdentity) {
        self.retries = self.retries.saturating_add(1);
        if let Some(observer) = self.observer {
            observer.on_retry(identity, self.retries, self.elapsed(), self.remaining());
        }
    }

    pub fn notify_acquired(&self, identity: &LockIdentity, created_new: bool) {
        if let Some(observer) = self.observer {
            observer.on_acquired(identity, self.elapsed(), created_new);
        }
    }

    pub fn notify_deadline_exceeded(&self, identity: &LockIdentity) {
        if let Some(observer) = self.observer {
            observer.on_deadline_exceeded(identity, self.elapsed());
        }
    }

    pub fn notify_cancelled(&self, identity: &LockIdentity) {
        if let Some(observer) = self.observer {
            observer.on_cancelled(identity, self.elapsed());
        }
    }
}
