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

//! Cancellation of lock waits.
//!
//! A token is a shared cell holding why the wait should stop, if it should.
//! Signal handlers write the signal number into the cell directly, so the
//! engine can report which signal interrupted it.

use log::{debug, warn};
use signal_hook::consts::signal::{SIGINT, SIGTERM};
use signal_hook::flag;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

#[cfg(windows)]
use signal_hook::consts::signal::SIGBREAK;

const ACTIVE: usize = 0;
const REQUESTED: usize = usize::MAX;

/// Why a wait was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// [`CancellationToken::cancel`] was called.
    Requested,
    /// The process received this signal.
    Signal(i32),
}

impl CancelReason {
    /// Conventional shell status for a process stopped this way.
    pub fn exit_code(self) -> i32 {
        match self {
            CancelReason::Requested => 128 + SIGINT,
            CancelReason::Signal(signal) => 128 + signal,
        }
    }

    fn from_state(state: usize) -> Option<Self> {
        match state {
            ACTIVE => None,
            REQUESTED => Some(CancelReason::Requested),
            signal => Some(
                i32::try_from(signal)
                    .map(CancelReason::Signal)
                    .unwrap_or(CancelReason::Requested),
            ),
        }
    }
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => f.write_str("cancelled by caller"),
            CancelReason::Signal(signal) => write!(f, "interrupted by signal {signal}"),
        }
    }
}

/// Token the engine checks before every wait slice.
///
/// Clones share one cell. The first reason recorded wins.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<AtomicUsize>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let _ = self
            .state
            .compare_exchange(ACTIVE, REQUESTED, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn reason(&self) -> Option<CancelReason> {
        CancelReason::from_state(self.state.load(Ordering::SeqCst))
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Arranges for `signal` to cancel this token. The handler stays installed
    /// for the life of the process.
    pub fn cancel_on_signal(&self, signal: i32) -> std::io::Result<()> {
        let value = usize::try_from(signal)
            .map_err(|_| std::io::Error::other(format!("invalid signal number {signal}")))?;
        flag::register_usize(signal, Arc::clone(&self.state), value)?;
        debug!("Signal {signal} now cancels lock waits");
        Ok(())
    }
}

fn termination_signals() -> &'static [i32] {
    #[cfg(windows)]
    {
        &[SIGINT, SIGTERM, SIGBREAK]
    }

    #[cfg(not(windows))]
    {
        &[SIGINT, SIGTERM]
    }
}

static SIGNAL_TOKEN: OnceLock<CancellationToken> = OnceLock::new();

/// Token cancelled by the process's termination signals. Handlers are
/// installed on first use; failures to install are logged and skipped.
pub fn signal_token() -> CancellationToken {
    SIGNAL_TOKEN
        .get_or_init(|| {
            let token = CancellationToken::new();
            for &signal in termination_signals() {
                if let Err(err) = token.cancel_on_signal(signal) {
                    warn!("Failed to register cancellation handler for signal {signal}: {err}");
                }
            }
            token
        })
        .clone()
}
