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

//! Recovery for lock objects that outlive their holders.
//!
//! POSIX named semaphores and advisory lock files stay behind after every
//! process using them has exited. When a holder crashed without posting, the
//! semaphore count is stuck at zero and every later attempt waits forever;
//! purging the object lets the next attempt create a fresh one.

use crate::error::{LockError, Result};
use crate::locking::backend::SemaphoreProvider;
use crate::locking::identity::LockIdentity;
use log::{debug, info, warn};
use std::path::Path;
use std::time::{Duration, Instant};

/// Summary of a purge over one or more paths.
#[derive(Debug, Default, Clone)]
pub struct LockHygieneReport {
    pub removed: usize,
    pub absent: usize,
    pub errors: usize,
    pub duration: Duration,
}

impl LockHygieneReport {
    pub fn is_clean(&self) -> bool {
        self.errors == 0
    }
}

/// Removes the persisted object for `identity`; `false` when there was none.
pub fn purge_identity(provider: &dyn SemaphoreProvider, identity: &LockIdentity) -> Result<bool> {
    let removed = provider
        .purge(identity)
        .map_err(|err| LockError::Acquire {
            identity: identity.to_string(),
            details: format!("failed to purge {} lock: {err}", provider.backend()),
        })?;

    if removed {
        info!("Purged {} lock {identity}", provider.backend());
    } else {
        debug!("No persisted {} lock for {identity}", provider.backend());
    }
    Ok(removed)
}

/// Purges every path, continuing past individual failures.
pub fn purge_paths<I, P>(provider: &dyn SemaphoreProvider, paths: I) -> LockHygieneReport
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let start = Instant::now();
    let mut report = LockHygieneReport::default();

    for path in paths {
        let identity = LockIdentity::from_path(path.as_ref());
        match purge_identity(provider, &identity) {
            Ok(true) => report.removed += 1,
            Ok(false) => report.absent += 1,
            Err(err) => {
                warn!("{err}");
                report.errors += 1;
            }
        }
    }

    report.duration = start.elapsed();
    debug!(
        "Lock purge removed {} object(s), {} absent in {:.3}s (errors: {})",
        report.removed,
        report.absent,
        report.duration.as_secs_f64(),
        report.errors
    );
    report
}
