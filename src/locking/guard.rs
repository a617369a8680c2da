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

use crate::error::{LockError, Result};
use crate::locking::backend::{LockBackend, NamedSemaphore};
use crate::locking::identity::LockIdentity;
use log::{debug, warn};
use std::fmt;
use std::time::{Duration, Instant};

/// Proof that the semaphore for one identity is held.
///
/// The semaphore is signaled exactly once: by [`PathLockGuard::release`] or,
/// failing that, when the guard is dropped (including during unwinding).
pub struct PathLockGuard {
    identity: LockIdentity,
    backend: LockBackend,
    semaphore: Option<Box<dyn NamedSemaphore>>,
    created_new: bool,
    acquired_at: Instant,
}

impl PathLockGuard {
    pub(crate) fn new(
        identity: LockIdentity,
        backend: LockBackend,
        semaphore: Box<dyn NamedSemaphore>,
        created_new: bool,
    ) -> Self {
        Self {
            identity,
            backend,
            semaphore: Some(semaphore),
            created_new,
            acquired_at: Instant::now(),
        }
    }

    pub fn identity(&self) -> &LockIdentity {
        &self.identity
    }

    pub fn backend(&self) -> LockBackend {
        self.backend
    }

    /// Whether the acquisition that produced this guard instantiated the
    /// underlying semaphore.
    pub fn created_new(&self) -> bool {
        self.created_new
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    pub fn release(mut self) -> Result<()> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<()> {
        let Some(mut semaphore) = self.semaphore.take() else {
            return Ok(());
        };

        semaphore.release().map_err(|err| LockError::Release {
            identity: self.identity.to_string(),
            details: err.to_string(),
        })?;
        debug!(
            "Released {} lock {} after {:.3}s",
            self.backend,
            self.identity,
            self.held_for().as_secs_f64()
        );
        Ok(())
    }
}

impl Drop for PathLockGuard {
    fn drop(&mut self) {
        if self.semaphore.is_none() {
            return;
        }

        if let Err(err) = self.release_inner() {
            warn!("Failed to release lock {} during drop: {err}", self.identity);
        }
    }
}

impl fmt::Debug for PathLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathLockGuard")
            .field("identity", &self.identity)
            .field("backend", &self.backend)
            .field("created_new", &self.created_new)
            .field("released", &self.semaphore.is_none())
            .finish()
    }
}
