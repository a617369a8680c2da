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

use crate::error::LockError;

pub struct ErrorContext<'a> {
    pub error: &'a LockError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl<'a> ErrorContext<'a> {
    pub fn new(error: &'a LockError) -> Self {
        let (suggestion, details) = match error {
            LockError::Acquire { identity, details } => {
                let suggestion = if cfg!(unix) {
                    Some(
                        "Named semaphores are limited to 251 characters and may not contain NUL \
                         bytes. Use a shorter path or switch to the advisory backend with \
                         --mode advisory."
                            .to_string(),
                    )
                } else {
                    Some(
                        "Use a shorter path or switch to the advisory backend with --mode \
                         advisory."
                            .to_string(),
                    )
                };
                let details = Some(format!("Identity {identity}: {details}"));
                (suggestion, details)
            }
            LockError::Wait { details, .. } => {
                let suggestion = Some(
                    "The lock object may have been removed by another process. Try again."
                        .to_string(),
                );
                let details = Some(details.clone());
                (suggestion, details)
            }
            LockError::DeadlineExceeded { identity, .. } => {
                let suggestion = Some(format!(
                    "Another process is holding '{identity}'. Increase --deadline or use \
                     'infinite' to wait without limit. If the holder crashed, run 'pathmutex \
                     purge <PATH>'."
                ));
                let details = None;
                (suggestion, details)
            }
            LockError::Cancelled { reason, .. } => {
                let suggestion = None;
                let details = Some(format!(
                    "The wait was {reason} before the lock was acquired; nothing ran."
                ));
                (suggestion, details)
            }
            LockError::Unexpected { .. } => {
                let suggestion = Some(
                    "This indicates a bug in the locking engine. Please report it.".to_string(),
                );
                (suggestion, None)
            }
            LockError::UnsupportedBackend(backend) => {
                let suggestion = Some(
                    "Use --mode auto to select the best available backend, or --mode in-process \
                     for single-process use."
                        .to_string(),
                );
                let details = Some(format!("Backend '{backend}' requested."));
                (suggestion, details)
            }
            LockError::InvalidConfig(msg) | LockError::ConfigError(msg) => {
                let suggestion = Some(
                    "Check config.toml and PATHMUTEX_LOCKING__* environment variables.".to_string(),
                );
                let details = Some(msg.clone());
                (suggestion, details)
            }
            LockError::Io(io_err) => {
                let suggestion = match io_err.kind() {
                    std::io::ErrorKind::PermissionDenied => {
                        if cfg!(unix) {
                            Some("Check permissions of the lock directory.".to_string())
                        } else {
                            Some("Run as Administrator or check file permissions.".to_string())
                        }
                    }
                    std::io::ErrorKind::NotFound => Some(
                        "Ensure the file or directory exists and the path is correct.".to_string(),
                    ),
                    _ => None,
                };
                let details = Some(format!("I/O error: {io_err}"));
                (suggestion, details)
            }
            _ => (None, None),
        };

        ErrorContext {
            error,
            suggestion,
            details,
        }
    }
}
