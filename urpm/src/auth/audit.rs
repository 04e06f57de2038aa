// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Append-only JSON audit trail
//!
//! One event per line. Audit failures are logged and swallowed; they must
//! never block the operation being audited.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use log::debug;
use serde::Serialize;

use super::AuthContext;

#[derive(Debug, Serialize)]
struct Event<'a> {
    timestamp: i64,
    event: String,
    user: &'a str,
    uid: u32,
    pid: u32,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    packages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
}

impl<'a> Event<'a> {
    fn new(kind: impl Into<String>, context: &'a AuthContext) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            event: kind.into(),
            user: &context.user_name,
            uid: context.uid,
            pid: context.pid,
            source: &context.source,
            action: None,
            packages: Vec::new(),
            command: None,
            success: None,
            error: None,
            media_name: None,
            details: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn write(&self, event: &Event<'_>) {
        let Ok(line) = serde_json::to_string(event) else {
            return;
        };
        if let Some(parent) = self.path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                let _ = writeln!(file, "{line}");
            }
            Err(e) => debug!("cannot write audit log {}: {e}", self.path.display()),
        }
    }

    pub fn operation_start(
        &self,
        context: &AuthContext,
        action: &str,
        packages: &[String],
        command: &str,
    ) {
        let mut event = Event::new(format!("{action}_start"), context);
        event.packages = packages.to_vec();
        event.command = Some(command);
        self.write(&event);
    }

    pub fn operation_complete(
        &self,
        context: &AuthContext,
        action: &str,
        packages: &[String],
        success: bool,
        error: Option<&str>,
    ) {
        let mut event = Event::new(format!("{action}_complete"), context);
        event.packages = packages.to_vec();
        event.success = Some(success);
        event.error = error;
        self.write(&event);
    }

    pub fn auth_denied(&self, context: &AuthContext, action: &str) {
        let mut event = Event::new("auth_denied", context);
        event.action = Some(action);
        self.write(&event);
    }

    pub fn media_change(
        &self,
        context: &AuthContext,
        change_type: &str,
        media_name: &str,
        details: Option<&str>,
    ) {
        let mut event = Event::new("media_change", context);
        event.action = Some(change_type);
        event.media_name = Some(media_name);
        event.details = details;
        self.write(&event);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn events_are_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path().join("audit.log"));
        let context = AuthContext::user_cli();

        log.operation_start(&context, "install", &["wget".to_owned()], "urpm install wget");
        log.operation_complete(&context, "install", &["wget".to_owned()], true, None);
        log.auth_denied(&context, "remove");
        log.media_change(&context, "add", "Core Release", None);

        let content = std::fs::read_to_string(dir.path().join("audit.log")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "install_start");
        assert_eq!(first["packages"][0], "wget");

        let denied: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(denied["event"], "auth_denied");
        assert_eq!(denied["action"], "remove");
    }
}
