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

//! Win32 named semaphores (`CreateSemaphoreW`).
//!
//! The kernel destroys the object once its last handle closes, including the
//! handles of a crashed process, so a fresh attempt after a crash re-creates it.

use crate::locking::backend::{LockBackend, NamedSemaphore, OpenedSemaphore, SemaphoreProvider};
use crate::locking::identity::LockIdentity;
use log::{debug, trace};
use std::ffi::OsStr;
use std::io;
use std::iter;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use std::time::Duration;
use winapi::shared::minwindef::DWORD;
use winapi::shared::winerror::{ERROR_ALREADY_EXISTS, WAIT_TIMEOUT};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::CloseHandle;
use winapi::um::synchapi::{CreateSemaphoreW, ReleaseSemaphore, WaitForSingleObject};
use winapi::um::winbase::WAIT_OBJECT_0;
use winapi::um::winnt::HANDLE;

#[derive(Debug, Default)]
pub struct WindowsSemaphoreProvider;

impl WindowsSemaphoreProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SemaphoreProvider for WindowsSemaphoreProvider {
    fn backend(&self) -> LockBackend {
        LockBackend::Semaphore
    }

    fn create_or_open(&self, identity: &LockIdentity) -> io::Result<OpenedSemaphore> {
        let wide_name: Vec<u16> = OsStr::new(identity.as_str())
            .encode_wide()
            .chain(iter::once(0))
            .collect();

        // SAFETY: `wide_name` is NUL-terminated and outlives the call.
        let handle = unsafe { CreateSemaphoreW(ptr::null_mut(), 0, 1, wide_name.as_ptr()) };
        if handle.is_null() {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: GetLastError only reads the calling thread's last-error value,
        // which CreateSemaphoreW set just above.
        let created_new = unsafe { GetLastError() } != ERROR_ALREADY_EXISTS;
        trace!("Opened semaphore {identity} (created_new: {created_new})");

        Ok(OpenedSemaphore {
            semaphore: Box::new(WindowsSemaphore { handle }),
            created_new,
            held: created_new,
        })
    }

    fn purge(&self, identity: &LockIdentity) -> io::Result<bool> {
        debug!("Semaphore {identity} is released by the kernel with its last handle; nothing to purge");
        Ok(false)
    }
}

struct WindowsSemaphore {
    handle: HANDLE,
}

// SAFETY: kernel handles may be used from any thread.
unsafe impl Send for WindowsSemaphore {}

impl NamedSemaphore for WindowsSemaphore {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        let millis = DWORD::try_from(timeout.as_millis()).unwrap_or(DWORD::MAX - 1);
        // SAFETY: `self.handle` is a live semaphore handle.
        match unsafe { WaitForSingleObject(self.handle, millis) } {
            WAIT_OBJECT_0 => Ok(true),
            WAIT_TIMEOUT => Ok(false),
            _ => Err(io::Error::last_os_error()),
        }
    }

    fn release(&mut self) -> io::Result<()> {
        // SAFETY: `self.handle` is a live semaphore handle.
        if unsafe { ReleaseSemaphore(self.handle, 1, ptr::null_mut()) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for WindowsSemaphore {
    fn drop(&mut self) {
        // SAFETY: the handle is owned by this value and closed once.
        if unsafe { CloseHandle(self.handle) } == 0 {
            debug!(
                "Failed to close semaphore handle: {}",
                io::Error::last_os_error()
            );
        }
    }
}
