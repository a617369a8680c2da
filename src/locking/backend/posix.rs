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

//! POSIX named semaphores (`sem_open`).
//!
//! Objects live in the kernel namespace until `sem_unlink`, independent of the
//! processes that opened them. A holder that dies without posting leaves the
//! count at zero; `purge` is the recovery path for that case.

use crate::locking::backend::{LockBackend, NamedSemaphore, OpenedSemaphore, SemaphoreProvider};
use crate::locking::identity::LockIdentity;
use log::{debug, trace};
use std::ffi::CString;
use std::io;
use std::time::Duration;

const SEMAPHORE_MODE: libc::c_uint = 0o600;

#[derive(Debug, Default)]
pub struct PosixSemaphoreProvider;

impl PosixSemaphoreProvider {
    pub fn new() -> Self {
        Self
    }
}

impl SemaphoreProvider for PosixSemaphoreProvider {
    fn backend(&self) -> LockBackend {
        LockBackend::Semaphore
    }

    fn create_or_open(&self, identity: &LockIdentity) -> io::Result<OpenedSemaphore> {
        let name = semaphore_name(identity)?;

        loop {
            // SAFETY: `name` is a valid NUL-terminated string; the variadic
            // arguments are promoted to `c_uint` as sem_open expects.
            let sem = unsafe {
                libc::sem_open(
                    name.as_ptr(),
                    libc::O_CREAT | libc::O_EXCL,
                    SEMAPHORE_MODE,
                    0 as libc::c_uint,
                )
            };
            if sem != libc::SEM_FAILED {
                trace!("Created semaphore {identity}");
                return Ok(opened(sem, name, true));
            }

            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(err);
            }

            // SAFETY: as above; no creation flags means no variadic arguments.
            let sem = unsafe { libc::sem_open(name.as_ptr(), 0) };
            if sem != libc::SEM_FAILED {
                trace!("Opened existing semaphore {identity}");
                return Ok(opened(sem, name, false));
            }

            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ENOENT) {
                return Err(err);
            }
            debug!("Semaphore {identity} was unlinked between create and open; retrying");
        }
    }

    fn purge(&self, identity: &LockIdentity) -> io::Result<bool> {
        let name = semaphore_name(identity)?;
        // SAFETY: `name` is a valid NUL-terminated string.
        if unsafe { libc::sem_unlink(name.as_ptr()) } == 0 {
            return Ok(true);
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::ENOENT) => Ok(false),
            _ => Err(err),
        }
    }
}

fn opened(sem: *mut libc::sem_t, name: CString, created_new: bool) -> OpenedSemaphore {
    OpenedSemaphore {
        semaphore: Box::new(PosixSemaphore { sem, name }),
        created_new,
        held: created_new,
    }
}

fn semaphore_name(identity: &LockIdentity) -> io::Result<CString> {
    CString::new(format!("/{identity}"))
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))
}

struct PosixSemaphore {
    sem: *mut libc::sem_t,
    name: CString,
}

// SAFETY: a sem_t handle returned by sem_open may be used from any thread.
unsafe impl Send for PosixSemaphore {}

impl PosixSemaphore {
    fn try_wait_once(&mut self) -> io::Result<bool> {
        loop {
            // SAFETY: `self.sem` stays valid until `sem_close` in drop.
            if unsafe { libc::sem_trywait(self.sem) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EAGAIN) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn timed_wait(&mut self, timeout: Duration) -> io::Result<bool> {
        let deadline = realtime_after(timeout)?;
        loop {
            // SAFETY: `self.sem` is valid and `deadline` outlives the call.
            if unsafe { libc::sem_timedwait(self.sem, &deadline) } == 0 {
                return Ok(true);
            }
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::ETIMEDOUT) => return Ok(false),
                Some(libc::EINTR) => continue,
                _ => return Err(err),
            }
        }
    }

    // No sem_timedwait here; poll instead.
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn timed_wait(&mut self, timeout: Duration) -> io::Result<bool> {
        let started = std::time::Instant::now();
        let poll = Duration::from_millis(5);
        loop {
            if self.try_wait_once()? {
                return Ok(true);
            }
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Ok(false);
            }
            std::thread::sleep(remaining.min(poll));
        }
    }
}

impl NamedSemaphore for PosixSemaphore {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        if timeout.is_zero() {
            return self.try_wait_once();
        }
        self.timed_wait(timeout)
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        self.try_wait_once()
    }

    fn release(&mut self) -> io::Result<()> {
        // SAFETY: `self.sem` stays valid until `sem_close` in drop.
        if unsafe { libc::sem_post(self.sem) } == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }
}

impl Drop for PosixSemaphore {
    fn drop(&mut self) {
        // SAFETY: `self.sem` came from a successful sem_open and is closed once.
        if unsafe { libc::sem_close(self.sem) } != 0 {
            debug!(
                "Failed to close semaphore {:?}: {}",
                self.name,
                io::Error::last_os_error()
            );
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn realtime_after(timeout: Duration) -> io::Result<libc::timespec> {
    // SAFETY: timespec is plain data; clock_gettime fills it in.
    let mut now: libc::timespec = unsafe { std::mem::zeroed() };
    // SAFETY: `now` is a valid, writable timespec.
    if unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut now) } != 0 {
        return Err(io::Error::last_os_error());
    }

    let nanos = now.tv_nsec as u64 + u64::from(timeout.subsec_nanos());
    let secs = (now.tv_sec as u64)
        .saturating_add(timeout.as_secs())
        .saturating_add(nanos / 1_000_000_000);

    let mut deadline = now;
    deadline.tv_sec = libc::time_t::try_from(secs).unwrap_or(libc::time_t::MAX);
    deadline.tv_nsec = (nanos % 1_000_000_000) as _;
    Ok(deadline)
}
