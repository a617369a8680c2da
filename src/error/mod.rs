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

mod context;
mod exit_codes;
mod format;
#[cfg(test)]
mod tests;

pub use context::ErrorContext;
pub use exit_codes::get_exit_code;
pub use format::format_error_with_color;

use crate::locking::cancellation::CancelReason;
use crate::locking::timeout::{LockTimeoutSource, LockTimeoutValue};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to create or open lock '{identity}': {details}")]
    Acquire { identity: String, details: String },

    #[error("Failed while waiting for lock '{identity}': {details}")]
    Wait { identity: String, details: String },

    #[error("Failed to release lock '{identity}': {details}")]
    Release { identity: String, details: String },

    #[error("Waiting for lock '{identity}' was {reason} after {waited_secs:.1}s")]
    Cancelled {
        identity: String,
        waited_secs: f64,
        reason: CancelReason,
    },

    #[error(
        "Lock '{identity}' was not acquired within {deadline} ({deadline_source}); waited {waited_secs:.1}s"
    )]
    DeadlineExceeded {
        identity: String,
        waited_secs: f64,
        deadline: LockTimeoutValue,
        deadline_source: LockTimeoutSource,
    },

    #[error("Lock acquisition failed unexpectedly for '{identity}'")]
    Unexpected { identity: String },

    #[error("Locking backend '{0}' is not available on this platform")]
    UnsupportedBackend(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LockError>;
