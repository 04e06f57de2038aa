// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Background failure channel
//!
//! When the forked child fails after the parent was released, the only
//! durable way to reach the user is a flag file consumed by the next
//! invocation, plus a plain text log of everything the child did.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

/// Error flag + child-side log under one root
#[derive(Debug, Clone)]
pub struct BackgroundChannel {
    error_flag: PathBuf,
    log_path: PathBuf,
}

impl BackgroundChannel {
    pub fn new(error_flag: PathBuf, log_path: PathBuf) -> Self {
        Self {
            error_flag,
            log_path,
        }
    }

    /// One-shot read of a previous failure; present until cleared
    pub fn check_error(&self) -> Option<String> {
        let content = std::fs::read_to_string(&self.error_flag).ok()?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            Some("unknown background install error".to_owned())
        } else {
            Some(trimmed.to_owned())
        }
    }

    pub fn clear_error(&self) {
        let _ = std::fs::remove_file(&self.error_flag);
    }

    /// Best effort; a failing flag write must never mask the real error
    pub fn set_error(&self, error: &str) {
        if let Some(parent) = self.error_flag.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&self.error_flag, format!("{error}\n"));
        self.log(&format!("ERROR: {error}"));
    }

    /// Timestamped line in the background log
    pub fn log(&self, message: &str) {
        if let Some(parent) = self.log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let Ok(mut file) = OpenOptions::new().create(true).append(true).open(&self.log_path)
        else {
            return;
        };
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let _ = writeln!(file, "{stamp} {message}");
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn channel(dir: &std::path::Path) -> BackgroundChannel {
        BackgroundChannel::new(dir.join("error-flag"), dir.join("background.log"))
    }

    #[test]
    fn flag_is_one_shot() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel(dir.path());

        assert!(channel.check_error().is_none());
        channel.set_error("transaction failed after release");
        assert_eq!(
            channel.check_error().as_deref(),
            Some("transaction failed after release")
        );
        channel.clear_error();
        assert!(channel.check_error().is_none());
    }

    #[test]
    fn log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel(dir.path());
        channel.log("one");
        channel.log("two");
        let content = std::fs::read_to_string(dir.path().join("background.log")).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.lines().all(|l| l.contains("one") || l.contains("two")));
    }
}
