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

//! Advisory file locks standing in for a named semaphore.
//!
//! Each identity maps to `<lock_dir>/<identity>.lock`. Holding the exclusive
//! advisory lock on it is what holding the semaphore means. The OS drops the
//! lock when the holder exits, crashed or not.
//!
//! `created_new` is decided under the lock: whoever first holds an empty file
//! reports it and stamps its pid into the file. Creating the file is not
//! enough, since another opener may take the lock before the creator does.

use crate::locking::backend::{LockBackend, NamedSemaphore, OpenedSemaphore, SemaphoreProvider};
use crate::locking::identity::LockIdentity;
use log::{debug, trace, warn};
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const LOCK_FILE_SUFFIX: &str = ".lock";
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct AdvisoryFileProvider {
    lock_dir: PathBuf,
}

impl AdvisoryFileProvider {
    pub fn new<P: Into<PathBuf>>(lock_dir: P) -> Self {
        Self {
            lock_dir: lock_dir.into(),
        }
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    pub fn lock_file_path(&self, identity: &LockIdentity) -> PathBuf {
        self.lock_dir
            .join(format!("{}{LOCK_FILE_SUFFIX}", identity.as_str()))
    }
}

impl SemaphoreProvider for AdvisoryFileProvider {
    fn backend(&self) -> LockBackend {
        LockBackend::Advisory
    }

    fn create_or_open(&self, identity: &LockIdentity) -> io::Result<OpenedSemaphore> {
        fs::create_dir_all(&self.lock_dir)?;
        let path = self.lock_file_path(identity);

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true).truncate(false);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path)?;

        let mut semaphore = AdvisoryFileLock { file, path };
        let held = semaphore.try_lock_once()?;
        let created_new = held && semaphore.stamp_if_fresh()?;
        trace!(
            "Opened lock file {} (created_new: {created_new}, held: {held})",
            semaphore.path.display()
        );

        Ok(OpenedSemaphore {
            semaphore: Box::new(semaphore),
            created_new,
            held,
        })
    }

    fn purge(&self, identity: &LockIdentity) -> io::Result<bool> {
        let path = self.lock_file_path(identity);
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!("Removed lock file {}", path.display());
                Ok(true)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }
}

struct AdvisoryFileLock {
    file: File,
    path: PathBuf,
}

impl AdvisoryFileLock {
    fn try_lock_once(&mut self) -> io::Result<bool> {
        loop {
            match self.file.try_lock() {
                Ok(()) => return Ok(true),
                Err(TryLockError::WouldBlock) => return Ok(false),
                Err(TryLockError::Error(err)) if err.kind() == io::ErrorKind::Interrupted => {
                    continue;
                }
                Err(TryLockError::Error(err)) => return Err(err),
            }
        }
    }

    /// Writes the holder's pid into an empty lock file. Returns whether the
    /// file was empty. Must be called while holding the lock.
    fn stamp_if_fresh(&mut self) -> io::Result<bool> {
        if self.file.metadata()?.len() > 0 {
            return Ok(false);
        }
        writeln!(self.file, "{}", std::process::id())?;
        self.file.flush()?;
        Ok(true)
    }
}

impl NamedSemaphore for AdvisoryFileLock {
    fn wait_timeout(&mut self, timeout: Duration) -> io::Result<bool> {
        let started = Instant::now();
        loop {
            if self.try_lock_once()? {
                return Ok(true);
            }
            let remaining = timeout.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                return Ok(false);
            }
            thread::sleep(remaining.min(POLL_INTERVAL));
        }
    }

    fn try_wait(&mut self) -> io::Result<bool> {
        self.try_lock_once()
    }

    fn release(&mut self) -> io::Result<()> {
        self.file.unlock().inspect_err(|err| {
            warn!(
                "Failed to unlock {}: {err}",
                self.path.display()
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity() -> LockIdentity {
        LockIdentity::resolve("/srv/cache/packages.json")
    }

    #[test]
    fn first_open_creates_file_and_holds_lock() {
        let temp = TempDir::new().unwrap();
        let provider = AdvisoryFileProvider::new(temp.path().join("locks"));
        let id = identity();

        let mut first = provider.create_or_open(&id).unwrap();
        assert!(first.created_new);
        assert!(first.held);
        assert!(provider.lock_file_path(&id).exists());

        let mut second = provider.create_or_open(&id).unwrap();
        assert!(!second.created_new);
        assert!(!second.held);
        assert!(!second.semaphore.try_wait().unwrap());

        first.semaphore.release().unwrap();
        assert!(second.semaphore.wait_timeout(Duration::from_secs(1)).unwrap());
        second.semaphore.release().unwrap();
    }

    #[test]
    fn reopening_free_lock_holds_immediately() {
        let temp = TempDir::new().unwrap();
        let provider = AdvisoryFileProvider::new(temp.path());
        let id = identity();

        let mut first = provider.create_or_open(&id).unwrap();
        first.semaphore.release().unwrap();
        drop(first);

        let second = provider.create_or_open(&id).unwrap();
        assert!(!second.created_new);
        assert!(second.held);
    }

    #[test]
    fn dropping_handle_releases_lock() {
        let temp = TempDir::new().unwrap();
        let provider = AdvisoryFileProvider::new(temp.path());
        let id = identity();

        let first = provider.create_or_open(&id).unwrap();
        assert!(first.held);
        drop(first);

        let second = provider.create_or_open(&id).unwrap();
        assert!(second.held);
    }

    #[test]
    fn wait_times_out_while_held() {
        let temp = TempDir::new().unwrap();
        let provider = AdvisoryFileProvider::new(temp.path());
        let id = identity();

        let _holder = provider.create_or_open(&id).unwrap();
        let mut waiter = provider.create_or_open(&id).unwrap();
        let started = Instant::now();
        assert!(!waiter.semaphore.wait_timeout(Duration::from_millis(80)).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(80));
    }

    #[test]
    fn purge_removes_lock_file() {
        let temp = TempDir::new().unwrap();
        let provider = AdvisoryFileProvider::new(temp.path());
        let id = identity();

        drop(provider.create_or_open(&id).unwrap());
        assert!(provider.purge(&id).unwrap());
        assert!(!provider.lock_file_path(&id).exists());
        assert!(!provider.purge(&id).unwrap());
    }

    #[test]
    fn lock_file_is_private_and_stamped() {
        let temp = TempDir::new().unwrap();
        let provider = AdvisoryFileProvider::new(temp.path());
        let id = identity();

        drop(provider.create_or_open(&id).unwrap());
        let path = provider.lock_file_path(&id);
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn racing_openers_report_created_new_exactly_once() {
        let temp = TempDir::new().unwrap();
        let provider = AdvisoryFileProvider::new(temp.path());

        for round in 0..50 {
            let id = LockIdentity::resolve(&format!("/srv/race/{round}"));
            let reported = std::sync::atomic::AtomicUsize::new(0);

            thread::scope(|scope| {
                for _ in 0..6 {
                    scope.spawn(|| {
                        let mut opened = provider.create_or_open(&id).unwrap();
                        if !opened.held {
                            let taken = opened.semaphore.wait_timeout(Duration::from_secs(5));
                            assert!(taken.unwrap());
                        }
                        if opened.created_new {
                            reported.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                        opened.semaphore.release().unwrap();
                    });
                }
            });

            assert_eq!(
                reported.load(std::sync::atomic::Ordering::SeqCst),
                1,
                "identity {id}"
            );
        }
    }
}
