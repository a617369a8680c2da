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

//! Named binary semaphores behind a single capability interface.
//!
//! A provider is chosen once when the controller is built. Every provider
//! hands out semaphores with capacity 1 and an initial count of 0, so the
//! attempt that creates the object holds it immediately.

pub mod advisory;
pub mod in_process;
#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

use crate::config::{LockingConfig, LockingMode};
use crate::error::Result;
use crate::locking::identity::LockIdentity;
use log::{debug, warn};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

pub use advisory::AdvisoryFileProvider;
pub use in_process::InProcessProvider;
#[cfg(unix)]
pub use posix::PosixSemaphoreProvider;
#[cfg(windows)]
pub use windows::WindowsSemaphoreProvider;

/// Indicates which backend satisfies lock requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockBackend {
    Semaphore,
    Advisory,
    InProcess,
}

impl LockBackend {
    /// Whether exclusion extends beyond the current process.
    pub fn is_cross_process(self) -> bool {
        !matches!(self, LockBackend::InProcess)
    }
}

impl fmt::Display for LockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LockBackend::Semaphore => "semaphore",
            LockBackend::Advisory => "advisory",
            LockBackend::InProcess => "in-process",
        };
        f.write_str(label)
    }
}

/// One opened handle on a named binary semaphore.
pub trait NamedSemaphore: Send {
    /// Blocks for at most `timeout`; returns `true` once the semaphore was taken.
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Takes the semaphore only if it is immediately available.
    fn try_wait(&mut self) -> io::Result<bool> {
        self.wait_timeout(Duration::ZERO)
    }

    /// Signals the semaphore. Must only be called by the current holder.
    fn release(&mut self) -> io::Result<()>;
}

/// Outcome of one create-or-open call.
pub struct OpenedSemaphore {
    pub semaphore: Box<dyn NamedSemaphore>,
    /// This call instantiated the underlying object.
    pub created_new: bool,
    /// The caller already holds the semaphore and must not wait on it.
    pub held: bool,
}

impl fmt::Debug for OpenedSemaphore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenedSemaphore")
            .field("created_new", &self.created_new)
            .field("held", &self.held)
            .finish_non_exhaustive()
    }
}

/// Creates or opens named semaphores for lock identities.
pub trait SemaphoreProvider: Send + Sync {
    fn backend(&self) -> LockBackend;

    fn create_or_open(&self, identity: &LockIdentity) -> io::Result<OpenedSemaphore>;

    /// Removes the persisted object for `identity`, if the backend keeps one
    /// beyond the life of its handles. Returns whether anything was removed.
    fn purge(&self, identity: &LockIdentity) -> io::Result<bool>;
}

/// Picks the provider for the configured mode.
pub fn select_provider(config: &LockingConfig) -> Result<Arc<dyn SemaphoreProvider>> {
    let backend = match config.mode {
        LockingMode::Auto => native_backend(),
        LockingMode::Semaphore => LockBackend::Semaphore,
        LockingMode::Advisory => LockBackend::Advisory,
        LockingMode::InProcess => LockBackend::InProcess,
    };
    debug!("Locking mode {:?} resolved to {backend} backend", config.mode);

    if !backend.is_cross_process() {
        warn!(
            "Using in-process locks: exclusion only applies to threads of this process, not to \
             other processes."
        );
    }

    match backend {
        LockBackend::Semaphore => semaphore_provider(),
        LockBackend::Advisory => Ok(Arc::new(AdvisoryFileProvider::new(config.lock_dir()))),
        LockBackend::InProcess => Ok(Arc::new(InProcessProvider::shared())),
    }
}

/// Backend `auto` resolves to on the current platform.
///
/// Unix gets advisory file locks: the kernel drops them when the holder exits,
/// however it exits. A POSIX semaphore outlives a crashed holder with a count
/// of zero and blocks every later caller until it is purged.
pub fn native_backend() -> LockBackend {
    if cfg!(windows) {
        LockBackend::Semaphore
    } else if cfg!(unix) {
        LockBackend::Advisory
    } else {
        LockBackend::InProcess
    }
}

#[cfg(unix)]
fn semaphore_provider() -> Result<Arc<dyn SemaphoreProvider>> {
    Ok(Arc::new(PosixSemaphoreProvider::new()))
}

#[cfg(windows)]
fn semaphore_provider() -> Result<Arc<dyn SemaphoreProvider>> {
    Ok(Arc::new(WindowsSemaphoreProvider::new()))
}

#[cfg(not(any(unix, windows)))]
fn semaphore_provider() -> Result<Arc<dyn SemaphoreProvider>> {
    Err(crate::error::LockError::UnsupportedBackend(
        LockBackend::Semaphore.to_string(),
    ))
}
