// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Capability checks ahead of every mutating operation
//!
//! The transport layer builds an [`AuthContext`] and the façade enforces
//! it. The CLI running as root gets everything; an unprivileged CLI gets
//! query only. IPC transports resolve permissions per caller through the
//! [`Authority`] boundary; the policy backend itself lives elsewhere.

use bitflags::bitflags;
use thiserror::Error;

pub use self::audit::AuditLog;

pub mod audit;

bitflags! {
    /// Fine-grained permission flags for package operations
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permission: u8 {
        /// Search, info, list
        const QUERY = 1 << 0;
        /// Refresh metadata
        const REFRESH = 1 << 1;
        const INSTALL = 1 << 2;
        const REMOVE = 1 << 3;
        /// System upgrade
        const UPGRADE = 1 << 4;
        /// Add/remove/configure media
        const MEDIA_MANAGE = 1 << 5;
    }
}

impl Permission {
    pub const ALL: Self = Self::all();

    pub fn label(&self) -> &'static str {
        if *self == Permission::QUERY {
            "query"
        } else if *self == Permission::REFRESH {
            "refresh"
        } else if *self == Permission::INSTALL {
            "install"
        } else if *self == Permission::REMOVE {
            "remove"
        } else if *self == Permission::UPGRADE {
            "upgrade"
        } else if *self == Permission::MEDIA_MANAGE {
            "media-manage"
        } else {
            "multiple"
        }
    }
}

/// The abstract policy backend: given a caller, may it do this?
pub trait Authority {
    fn check_authorization(
        &self,
        pid: u32,
        uid: u32,
        permission: Permission,
        allow_interaction: bool,
    ) -> bool;
}

/// Identity and granted permissions of the caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub uid: u32,
    pub user_name: String,
    pub permissions: Permission,
    /// "cli", "polkit", …
    pub source: String,
    pub pid: u32,
}

impl AuthContext {
    /// CLI running as root: everything allowed
    pub fn root_cli() -> Self {
        Self {
            uid: 0,
            user_name: current_user_name(),
            permissions: Permission::ALL,
            source: "cli".to_owned(),
            pid: std::process::id(),
        }
    }

    /// Unprivileged CLI: read-only
    pub fn user_cli() -> Self {
        Self {
            uid: nix::unistd::Uid::current().as_raw(),
            user_name: current_user_name(),
            permissions: Permission::QUERY,
            source: "cli".to_owned(),
            pid: std::process::id(),
        }
    }

    /// Pick the CLI context matching the effective uid
    pub fn for_cli() -> Self {
        if nix::unistd::Uid::effective().is_root() {
            Self::root_cli()
        } else {
            Self::user_cli()
        }
    }

    /// Resolve an IPC caller's grant per permission through the backend.
    /// Query is always granted.
    pub fn from_authority(
        authority: &dyn Authority,
        pid: u32,
        uid: u32,
        wanted: Permission,
        allow_interaction: bool,
    ) -> Self {
        let mut granted = Permission::QUERY;
        for permission in [
            Permission::REFRESH,
            Permission::INSTALL,
            Permission::REMOVE,
            Permission::UPGRADE,
            Permission::MEDIA_MANAGE,
        ] {
            if wanted.contains(permission)
                && authority.check_authorization(pid, uid, permission, allow_interaction)
            {
                granted |= permission;
            }
        }
        Self {
            uid,
            user_name: uid.to_string(),
            permissions: granted,
            source: "polkit".to_owned(),
            pid,
        }
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.contains(permission)
    }

    /// Error out unless the permission is granted
    pub fn require(&self, permission: Permission) -> Result<(), AuthError> {
        if self.can(permission) {
            Ok(())
        } else {
            Err(AuthError {
                action: permission.label().to_owned(),
                user: self.user_name.clone(),
                source_label: self.source.clone(),
            })
        }
    }
}

fn current_user_name() -> String {
    std::env::var("SUDO_USER")
        .or_else(|_| std::env::var("USER"))
        .unwrap_or_else(|_| nix::unistd::Uid::current().to_string())
}

#[derive(Debug, Error)]
#[error("permission denied: {action} (user={user}, source={source_label})")]
pub struct AuthError {
    pub action: String,
    pub user: String,
    pub source_label: String,
}

#[cfg(test)]
mod test {
    use super::*;

    struct AllowInstallOnly;

    impl Authority for AllowInstallOnly {
        fn check_authorization(
            &self,
            _pid: u32,
            _uid: u32,
            permission: Permission,
            _allow_interaction: bool,
        ) -> bool {
            permission == Permission::INSTALL
        }
    }

    #[test]
    fn root_cli_has_everything() {
        let context = AuthContext::root_cli();
        for permission in [
            Permission::QUERY,
            Permission::REFRESH,
            Permission::INSTALL,
            Permission::REMOVE,
            Permission::UPGRADE,
            Permission::MEDIA_MANAGE,
        ] {
            assert!(context.can(permission));
        }
        assert_eq!(context.source, "cli");
    }

    #[test]
    fn authority_grants_are_per_permission() {
        let context = AuthContext::from_authority(
            &AllowInstallOnly,
            4321,
            1000,
            Permission::INSTALL | Permission::REMOVE,
            false,
        );
        assert!(context.can(Permission::INSTALL));
        assert!(!context.can(Permission::REMOVE));
        assert!(context.can(Permission::QUERY), "query is always granted");

        assert!(context.require(Permission::INSTALL).is_ok());
        let denied = context.require(Permission::REMOVE).unwrap_err();
        assert!(denied.to_string().contains("remove"));
    }
}
