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

use crate::config::{LockingMode, PathMutexConfig};
use crate::error::{LockError, Result};
use crate::locking::backend::select_provider;
use crate::locking::hygiene::purge_paths;
use log::debug;
use std::io;
use std::path::PathBuf;

pub struct PurgeCommand<'a> {
    config: &'a PathMutexConfig,
}

impl<'a> PurgeCommand<'a> {
    pub fn new(config: &'a PathMutexConfig) -> Result<Self> {
        Ok(Self { config })
    }

    pub fn execute(&self, paths: &[PathBuf], mode: Option<LockingMode>) -> Result<()> {
        let mut locking = self.config.locking.clone();
        if let Some(mode) = mode {
            locking.mode = mode;
        }
        let provider = select_provider(&locking)?;
        debug!("Purging {} path(s) on the {} backend", paths.len(), provider.backend());

        let report = purge_paths(provider.as_ref(), paths);
        println!(
            "Removed {} lock object(s); {} not present",
            report.removed, report.absent
        );

        if !report.is_clean() {
            return Err(LockError::Io(io::Error::other(format!(
                "failed to purge {} lock object(s)",
                report.errors
            ))));
        }
        Ok(())
    }
}
