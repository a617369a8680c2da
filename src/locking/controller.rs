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

use crate::config::LockingConfig;
use crate::error::{LockError, Result};
use crate::locking::acquisition::{AcquireMode, LockAcquisitionRequest};
use crate::locking::backend::{
    LockBackend, NamedSemaphore, OpenedSemaphore, SemaphoreProvider, select_provider,
};
use crate::locking::cancellation::{CancelReason, CancellationToken};
use crate::locking::guard::PathLockGuard;
use crate::locking::hygiene;
use crate::locking::identity::LockIdentity;
use crate::locking::timeout::{LockTimeoutSource, LockTimeoutValue};
use log::{debug, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug)]
enum AcquireDisposition {
    Acquired(PathLockGuard),
    NotAcquired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    Signaled,
    TimedOut,
    Cancelled(CancelReason),
    DeadlineExceeded,
}

/// Runs work while holding the named semaphore derived from a path.
///
/// The backend is fixed when the controller is built. Controllers are cheap to
/// share between threads; each call opens its own semaphore handles.
pub struct PathLockController {
    provider: Arc<dyn SemaphoreProvider>,
    wait_interval: Duration,
    deadline: LockTimeoutValue,
    deadline_source: LockTimeoutSource,
    cancellation: CancellationToken,
}

impl PathLockController {
    pub fn new(config: &LockingConfig) -> Result<Self> {
        let provider = select_provider(config)?;
        Ok(Self::with_provider(provider, config))
    }

    pub fn with_provider(provider: Arc<dyn SemaphoreProvider>, config: &LockingConfig) -> Self {
        let deadline_source = if config.deadline == LockTimeoutValue::default() {
            LockTimeoutSource::Default
        } else {
            LockTimeoutSource::Config
        };

        Self {
            provider,
            wait_interval: config.wait_interval(),
            deadline: config.deadline,
            deadline_source,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_wait_interval(mut self, wait_interval: Duration) -> Self {
        self.wait_interval = wait_interval;
        self
    }

    pub fn with_deadline(mut self, deadline: LockTimeoutValue, source: LockTimeoutSource) -> Self {
        self.deadline = deadline;
        self.deadline_source = source;
        self
    }

    /// Token every request built by this controller checks while waiting.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn backend(&self) -> LockBackend {
        self.provider.backend()
    }

    pub fn wait_interval(&self) -> Duration {
        self.wait_interval
    }

    pub fn deadline(&self) -> LockTimeoutValue {
        self.deadline
    }

    /// Starts a request carrying this controller's timing and cancellation.
    /// The deadline clock starts here.
    pub fn request<'a, P: AsRef<Path>>(&self, path: P) -> LockAcquisitionRequest<'a> {
        LockAcquisitionRequest::new(path.as_ref())
            .with_wait_interval(self.wait_interval)
            .with_deadline(self.deadline)
            .with_deadline_source(self.deadline_source)
            .with_cancellation(self.cancellation.clone())
    }

    pub fn acquire<P: AsRef<Path>>(&self, path: P) -> Result<PathLockGuard> {
        self.acquire_with(self.request(path))
    }

    pub fn try_acquire<P: AsRef<Path>>(&self, path: P) -> Result<Option<PathLockGuard>> {
        let mut request = self.request(path).with_mode(AcquireMode::NonBlocking);
        match self.acquire_with_mode(&mut request)? {
            AcquireDisposition::Acquired(guard) => Ok(Some(guard)),
            AcquireDisposition::NotAcquired => Ok(None),
        }
    }

    /// Blocking acquisition driven by an explicit request.
    pub fn acquire_with(&self, request: LockAcquisitionRequest<'_>) -> Result<PathLockGuard> {
        let mut request = request.with_mode(AcquireMode::Blocking);
        match self.acquire_with_mode(&mut request)? {
            AcquireDisposition::Acquired(guard) => Ok(guard),
            AcquireDisposition::NotAcquired => Err(LockError::Unexpected {
                identity: request.identity().to_string(),
            }),
        }
    }

    /// Runs `work` exactly once while holding the lock for `path`, passing
    /// whether this call created the underlying semaphore.
    ///
    /// The lock is released whether `work` returns or panics. Whatever `work`
    /// returns, including its own `Result`, is handed back untouched.
    pub fn run_exclusive<P, T, F>(&self, path: P, work: F) -> Result<T>
    where
        P: AsRef<Path>,
        F: FnOnce(bool) -> T,
    {
        self.run_exclusive_with(self.request(path), work)
    }

    pub fn run_exclusive_with<T, F>(&self, request: LockAcquisitionRequest<'_>, work: F) -> Result<T>
    where
        F: FnOnce(bool) -> T,
    {
        let guard = self.acquire_with(request)?;
        let value = work(guard.created_new());

        if let Err(err) = guard.release() {
            warn!("{err}");
        }
        Ok(value)
    }

    /// [`run_exclusive`](Self::run_exclusive) for work without a result.
    pub fn execute_exclusive<P, F>(&self, path: P, action: F) -> Result<()>
    where
        P: AsRef<Path>,
        F: FnOnce(bool),
    {
        self.run_exclusive(path, action)
    }

    /// Removes the persisted semaphore for `path`. Only safe when no process
    /// is using the lock.
    pub fn purge<P: AsRef<Path>>(&self, path: P) -> Result<bool> {
        let identity = LockIdentity::from_path(path.as_ref());
        hygiene::purge_identity(self.provider.as_ref(), &identity)
    }

    fn acquire_with_mode(
        &self,
        request: &mut LockAcquisitionRequest<'_>,
    ) -> Result<AcquireDisposition> {
        loop {
            let identity = request.identity();
            let OpenedSemaphore {
                mut semaphore,
                created_new,
                held,
            } = self
                .provider
                .create_or_open(&identity)
                .map_err(|err| LockError::Acquire {
                    identity: identity.to_string(),
                    details: err.to_string(),
                })?;

            if held {
                return Ok(self.acquired(request, identity, semaphore, created_new));
            }

            if request.mode().is_non_blocking() {
                let taken = semaphore
                    .try_wait()
                    .map_err(|err| wait_error(&identity, err))?;
                if taken {
                    return Ok(self.acquired(request, identity, semaphore, created_new));
                }
                debug!("Lock {identity} is busy; not waiting");
                return Ok(AcquireDisposition::NotAcquired);
            }

            request.record_wait_start(&identity);
            match self.wait_for(request, &identity, semaphore.as_mut())? {
                WaitOutcome::Signaled => {
                    return Ok(self.acquired(request, identity, semaphore, created_new));
                }
                WaitOutcome::TimedOut => {
                    request.record_retry(&identity);
                    debug!(
                        "Lock {identity} still busy after {:.1}s; reopening (attempt {})",
                        request.wait_interval().as_secs_f64(),
                        request.retries()
                    );
                }
                WaitOutcome::Cancelled(reason) => {
                    request.notify_cancelled(&identity);
                    return Err(LockError::Cancelled {
                        identity: identity.to_string(),
                        waited_secs: request.elapsed().as_secs_f64(),
                        reason,
                    });
                }
                WaitOutcome::DeadlineExceeded => {
                    request.notify_deadline_exceeded(&identity);
                    return Err(LockError::DeadlineExceeded {
                        identity: identity.to_string(),
                        waited_secs: request.elapsed().as_secs_f64(),
                        deadline: request.deadline(),
                        deadline_source: request.deadline_source(),
                    });
                }
            }
        }
    }

    /// Waits one wait interval in backoff-sized slices, checking cancellation
    /// and the deadline before each slice.
    fn wait_for(
        &self,
        request: &mut LockAcquisitionRequest<'_>,
        identity: &LockIdentity,
        semaphore: &mut dyn NamedSemaphore,
    ) -> Result<WaitOutcome> {
        let window_started = Instant::now();
        request.begin_window();
        loop {
            if let Some(reason) = request.cancellation().reason() {
                return Ok(WaitOutcome::Cancelled(reason));
            }
            if request.budget().is_expired() {
                return Ok(WaitOutcome::DeadlineExceeded);
            }

            let window_remaining = request
                .wait_interval()
                .saturating_sub(window_started.elapsed());
            let Some(slice) = request.next_slice(window_remaining) else {
                return Ok(WaitOutcome::TimedOut);
            };

            if semaphore
                .wait_timeout(slice)
                .map_err(|err| wait_error(identity, err))?
            {
                return Ok(WaitOutcome::Signaled);
            }
        }
    }

    fn acquired(
        &self,
        request: &LockAcquisitionRequest<'_>,
        identity: LockIdentity,
        semaphore: Box<dyn NamedSemaphore>,
        created_new: bool,
    ) -> AcquireDisposition {
        debug!(
            "Acquired {} lock {identity} (created_new: {created_new}) after {:.3}s",
            self.backend(),
            request.elapsed().as_secs_f64()
        );
        request.notify_acquired(&identity, created_new);
        AcquireDisposition::Acquired(PathLockGuard::new(
            identity,
            self.backend(),
            semaphore,
            created_new,
        ))
    }
}

fn wait_error(identity: &LockIdentity, err: std::io::Error) -> LockError {
    LockError::Wait {
        identity: identity.to_string(),
        details: err.to_string(),
    }
}
