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

//! Cross-process mutual exclusion keyed by file path.
//!
//! A path is turned into a [`LockIdentity`], the identity names a binary
//! semaphore, and [`run_exclusive`] runs caller work while holding it:
//!
//! ```no_run
//! let created_new = pathmutex::run_exclusive("/var/cache/app/index.json", |created_new| {
//!     // only one process at a time gets here for this path
//!     created_new
//! })?;
//! # Ok::<(), pathmutex::error::LockError>(())
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod locking;
pub mod logging;

pub use config::{LockingConfig, LockingMode, PathMutexConfig};
pub use error::{LockError, Result};
pub use locking::{
    CancelReason, CancellationToken, LockAcquisitionRequest, LockIdentity, LockWaitObserver,
    PathLockController, PathLockGuard,
};

use log::debug;
use std::path::Path;
use std::sync::OnceLock;

static DEFAULT_CONTROLLER: OnceLock<PathLockController> = OnceLock::new();

/// Process-wide controller built from the loaded configuration on first use.
pub fn default_controller() -> Result<&'static PathLockController> {
    if let Some(controller) = DEFAULT_CONTROLLER.get() {
        return Ok(controller);
    }

    let config = config::new_pathmutex_config()?;
    let controller = PathLockController::new(&config.locking)?;
    debug!("Default lock controller uses the {} backend", controller.backend());
    Ok(DEFAULT_CONTROLLER.get_or_init(|| controller))
}

/// Runs `work` while holding the lock for `path` through the default
/// controller. See [`PathLockController::run_exclusive`].
pub fn run_exclusive<P, T, F>(path: P, work: F) -> Result<T>
where
    P: AsRef<Path>,
    F: FnOnce(bool) -> T,
{
    default_controller()?.run_exclusive(path, work)
}

pub fn execute_exclusive<P, F>(path: P, action: F) -> Result<()>
where
    P: AsRef<Path>,
    F: FnOnce(bool),
{
    default_controller()?.execute_exclusive(path, action)
}
