// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The host-wide install lock
//!
//! An advisory exclusive lock on a well-known path under the RPM root.
//! The holder writes its PID into the file; a holder that is no longer
//! alive may be stolen.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::time::Duration;

use log::warn;
use nix::fcntl::{flock, FlockArg};
use thiserror::Error;

#[derive(Debug)]
pub struct InstallLock {
    path: PathBuf,
    file: Option<File>,
}

impl InstallLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    /// Block until the lock is ours. A dead holder's lock is stolen after
    /// the liveness check.
    pub fn acquire_blocking(&mut self) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;

        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                Ok(()) => break,
                Err(nix::errno::Errno::EWOULDBLOCK) => {
                    if let Some(holder) = read_pid(&file) {
                        if !pid_alive(holder) {
                            warn!("lock holder PID {holder} is dead, stealing lock");
                            continue;
                        }
                    }
                    std::thread::sleep(Duration::from_millis(500));
                }
                Err(e) => return Err(Error::Flock(e)),
            }
        }

        write_pid(&file)?;
        self.file = Some(file);
        Ok(())
    }

    /// Try once; false when another holder is alive
    pub fn try_acquire(&mut self) -> Result<bool, Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)?;
        match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
            Ok(()) => {
                write_pid(&file)?;
                self.file = Some(file);
                Ok(true)
            }
            Err(nix::errno::Errno::EWOULDBLOCK) => Ok(false),
            Err(e) => Err(Error::Flock(e)),
        }
    }

    pub fn release(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = flock(file.as_raw_fd(), FlockArg::Unlock);
        }
    }

    pub fn holder_pid(&self) -> Option<i32> {
        let file = File::open(&self.path).ok()?;
        read_pid(&file)
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_pid(mut file: &File) -> Result<(), Error> {
    file.set_len(0)?;
    file.rewind()?;
    write!(file, "{}", std::process::id())?;
    file.flush()?;
    Ok(())
}

fn read_pid(mut file: &File) -> Option<i32> {
    let mut content = String::new();
    file.rewind().ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

fn pid_alive(pid: i32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;
    match kill(Pid::from_raw(pid), None) {
        Ok(()) => true,
        // Exists but owned by someone else
        Err(nix::errno::Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("io")]
    Io(#[from] std::io::Error),
    #[error("obtaining exclusive file lock")]
    Flock(#[source] nix::errno::Errno),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lock_records_pid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("var/lib/rpm/.urpm-install.lock");

        let mut lock = InstallLock::new(&path);
        lock.acquire_blocking().unwrap();
        assert_eq!(lock.holder_pid(), Some(std::process::id() as i32));
        lock.release();
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lock");

        let mut first = InstallLock::new(&path);
        first.acquire_blocking().unwrap();

        let mut second = InstallLock::new(&path);
        assert!(!second.try_acquire().unwrap());

        first.release();
        assert!(second.try_acquire().unwrap());
    }
}
