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

pub mod acquisition;
pub mod backend;
pub mod cancellation;
pub mod controller;
pub mod guard;
pub mod hygiene;
pub mod identity;
pub mod timeout;
pub mod wait_observer;

pub use acquisition::{AcquireMode, LockAcquisitionRequest, LockTimeoutBudget, PollingBackoff};
pub use backend::{LockBackend, NamedSemaphore, OpenedSemaphore, SemaphoreProvider};
pub use cancellation::{CancelReason, CancellationToken, signal_token};
pub use controller::PathLockController;
pub use guard::PathLockGuard;
pub use hygiene::{LockHygieneReport, purge_identity, purge_paths};
pub use identity::{IDENTITY_PREFIX, LockIdentity};
pub use timeout::{
    LockTimeoutResolution, LockTimeoutResolver, LockTimeoutSource, LockTimeoutValue,
    parse_timeout_override, parse_wait_interval,
};
pub use wait_observer::{LockWaitObserver, LockWaitReporter};
