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

//! Process-local binary semaphores keyed by identity.
//!
//! This backend only serializes threads of the current process. The shared
//! registry is created on first use and lives until the process exits; entries
//! are inserted lazily and never removed, so it grows with the number of
//! distinct identities locked.

use crate::locking::backend::{LockBackend, NamedSemaphore, OpenedSemaphore, SemaphoreProvider};
use crate::locking::identity::LockIdentity;
use log::debug;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::time::Duration;

type Registry = Mutex<HashMap<String, Arc<LocalSemaphore>>>;

static SHARED_REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct InProcessProvider {
    registry: Arc<Registry>,
}

impl InProcessProvider {
    /// Provider backed by the process-wide registry.
    pub fn shared() -> Self {
        let registry = SHARED_REGISTRY.get_or_init(|| Arc::new(Mutex::new(HashMap::new())));
        Self {
            registry: Arc::clone(registry),
        }
    }

    /// Provider with a private registry, unrelated to any other provider.
    pub fn isolated() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of identities ever locked through this registry.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.registry.lock().map(|map| map.len()).unwrap_or(0)
    }
}

impl SemaphoreProvider for InProcessProvider {
    fn backend(&self) -> LockBackend {
        LockBackend::InProcess
    }

    fn create_or_open(&self, identity: &LockIdentity) -> io::Result<OpenedSemaphore> {
        let mut registry = self.registry.lock().map_err(|_| poisoned())?;
        let (slot, created_new) = match registry.get(identity.as_str()) {
            Some(existing) => (Arc::clone(existing), false),
            None => {
                let slot = Arc::new(LocalSemaphore::held());
                registry.insert(identity.as_str().to_string(), Arc::clone(&slot));
                (slot, true)
            }
        };

        Ok(OpenedSemaphore {
            semaphore: Box::new(LocalHandle { slot }),
            created_new,
            held: created_new,
        })
    }

    fn purge(&self, identity: &LockIdentity) -> io::Result<bool> {
        debug!("In-process lock {identity} is never removed from the registry");
        Ok(false)
    }
}

#[derive(Debug)]
struct LocalSemaphore {
    available: Mutex<bool>,
    signal: Condvar,
}

impl LocalSemaphore {
    fn held() -> Self {
        Self {
            available: Mutex::new(false),
            signal: Condvar::new(),
        }
    }

    fn state(&self) -> io::Result<MutexGuard<'_, bool>> {
        self.available.lock().map_err(|_| poisoned())
    }
}

struct LocalHandle {
    slot: Arc<LocalSemaphore>,
}

impl NamedSemaphore for LocalHandle {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        let guard = self.slot.state()?;
        let (mut available, _) = self
            .slot
            .signal
            .wait_timeout_while(guard, timeout, |available| !*available)
            .map_err(|_| poisoned())?;

        if *available {
            *available = false;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn release(&mut self) -> io::Result<()> {
        let mut available = self.slot.state()?;
        *available = true;
        drop(available);
        self.slot.signal.notify_one();
        Ok(())
    }
}

fn poisoned() -> io::Error {
    io::Error::other("in-process lock state poisoned")
}
