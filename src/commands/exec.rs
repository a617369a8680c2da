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

use crate::config::{DEADLINE_ENV_VAR, LockingConfig, LockingMode, PathMutexConfig};
use crate::error::{LockError, Result};
use crate::locking::cancellation::signal_token;
use crate::locking::controller::PathLockController;
use crate::locking::timeout::{LockTimeoutResolver, LockTimeoutValue, parse_wait_interval};
use crate::locking::wait_observer::LockWaitReporter;
use log::{debug, info};
use std::env;
use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

/// Environment variable telling the child whether it created the lock.
pub const CREATED_NEW_ENV_VAR: &str = "PATHMUTEX_CREATED_NEW";

/// Flags accepted by `pathmutex exec`.
#[derive(Debug, Default)]
pub struct ExecOptions<'a> {
    pub wait_timeout: Option<&'a str>,
    pub deadline: Option<&'a str>,
    pub mode: Option<LockingMode>,
}

pub struct ExecCommand<'a> {
    config: &'a PathMutexConfig,
}

impl<'a> ExecCommand<'a> {
    pub fn new(config: &'a PathMutexConfig) -> Result<Self> {
        Ok(Self { config })
    }

    /// Runs `command` while holding the lock for `path`; returns the exit
    /// code the CLI should terminate with.
    pub fn execute(&self, path: &Path, command: &[String], options: &ExecOptions<'_>) -> Result<i32> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| LockError::CommandFailed("no command given".to_string()))?;

        let controller = self.controller(options)?;
        let reporter = LockWaitReporter::stderr();
        let request = controller.request(path).with_observer(Some(&reporter));

        info!("Running {program} under lock for {}", path.display());
        let status = controller
            .run_exclusive_with(request, |created_new| run_child(program, args, created_new))?
            .map_err(|err| LockError::CommandFailed(format!("{program}: {err}")))?;

        debug!("{program} finished with {status}");
        Ok(exit_code(status))
    }

    fn controller(&self, options: &ExecOptions<'_>) -> Result<PathLockController> {
        let mut locking: LockingConfig = self.config.locking.clone();
        if let Some(mode) = options.mode {
            locking.mode = mode;
        }
        if let Some(value) = options.wait_timeout {
            let interval =
                parse_wait_interval(value).map_err(|e| LockError::InvalidConfig(e.to_string()))?;
            locking.wait_timeout_secs = interval.as_secs();
        }

        let env_deadline = env::var(DEADLINE_ENV_VAR).ok();
        let deadline = LockTimeoutResolver::new(
            options.deadline,
            env_deadline.as_deref(),
            locking.deadline,
            LockTimeoutValue::default(),
        )
        .resolve()
        .map_err(|e| LockError::InvalidConfig(e.to_string()))?;
        debug!("Lock deadline {} from {}", deadline.value, deadline.source);

        Ok(PathLockController::new(&locking)?
            .with_deadline(deadline.value, deadline.source)
            .with_cancellation(signal_token()))
    }
}

fn run_child(program: &str, args: &[String], created_new: bool) -> io::Result<ExitStatus> {
    Command::new(program)
        .args(args)
        .env(CREATED_NEW_ENV_VAR, if created_new { "1" } else { "0" })
        .status()
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn advisory_config(temp: &TempDir) -> PathMutexConfig {
        PathMutexConfig {
            locking: LockingConfig {
                mode: LockingMode::Advisory,
                lock_dir: Some(temp.path().join("locks")),
                ..LockingConfig::default()
            },
        }
    }

    #[test]
    fn rejects_empty_command() {
        let temp = TempDir::new().unwrap();
        let config = advisory_config(&temp);
        let command = ExecCommand::new(&config).unwrap();
        let err = command
            .execute(&temp.path().join("x"), &[], &ExecOptions::default())
            .unwrap_err();
        assert!(matches!(err, LockError::CommandFailed(_)));
    }

    #[test]
    fn rejects_zero_wait_timeout() {
        let temp = TempDir::new().unwrap();
        let config = advisory_config(&temp);
        let command = ExecCommand::new(&config).unwrap();
        let options = ExecOptions {
            wait_timeout: Some("0"),
            ..ExecOptions::default()
        };
        let err = command
            .execute(&temp.path().join("x"), &["true".to_string()], &options)
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidConfig(_)));
    }

    #[cfg(unix)]
    #[test]
    fn child_exit_code_is_returned() {
        let temp = TempDir::new().unwrap();
        let config = advisory_config(&temp);
        let command = ExecCommand::new(&config).unwrap();
        let argv = ["sh", "-c", "exit 3"].map(String::from);
        let code = command
            .execute(&temp.path().join("x"), &argv, &ExecOptions::default())
            .unwrap();
        assert_eq!(code, 3);
    }

    #[test]
    fn missing_program_is_command_failure() {
        let temp = TempDir::new().unwrap();
        let config = advisory_config(&temp);
        let command = ExecCommand::new(&config).unwrap();
        let argv = ["pathmutex-definitely-not-a-program".to_string()];
        let err = command
            .execute(&temp.path().join("x"), &argv, &ExecOptions::default())
            .unwrap_err();
        assert!(matches!(err, LockError::CommandFailed(_)));
    }
}
