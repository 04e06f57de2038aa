// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use log::trace;
use nix::unistd::{access, AccessFlags, Uid};

/// System mutability - do we have readwrite?
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    /// We only have readonly access
    ReadOnly,
    /// We have read-write access
    ReadWrite,
}

impl fmt::Display for Mutability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mutability::ReadOnly => "read-only".fmt(f),
            Mutability::ReadWrite => "read-write".fmt(f),
        }
    }
}

/// Path layout of one managed root.
///
/// Everything the tool persists lives under either the RPM root itself
/// (install lock, error flag, reason file) or the state/cache/log trees.
#[derive(Debug, Clone)]
pub struct Installation {
    pub root: PathBuf,
    pub mutability: Mutability,
}

impl Installation {
    pub fn open(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();

        let mutability = if Uid::effective().is_root() {
            Mutability::ReadWrite
        } else if access(&root, AccessFlags::W_OK).is_ok() {
            Mutability::ReadWrite
        } else {
            Mutability::ReadOnly
        };

        trace!("Mutability: {mutability}");
        trace!("Root dir: {root:?}");

        if matches!(mutability, Mutability::ReadWrite) {
            ensure_dirs_exist(&root);
        }

        Self { root, mutability }
    }

    pub fn read_only(&self) -> bool {
        matches!(self.mutability, Mutability::ReadOnly)
    }

    /// The relational store
    pub fn db_path(&self) -> PathBuf {
        self.root.join("var/lib/urpm/packages.db")
    }

    /// Root of the RPM cache tree
    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("var/cache/urpm")
    }

    /// `<cache>/medias/official/<relative_path>` for official media
    pub fn official_media_dir(&self, relative_path: impl AsRef<Path>) -> PathBuf {
        self.cache_dir().join("medias/official").join(relative_path)
    }

    /// `<cache>/medias/custom/<short_name>` for custom media
    pub fn custom_media_dir(&self, short_name: impl AsRef<Path>) -> PathBuf {
        self.cache_dir().join("medias/custom").join(short_name)
    }

    /// Pre-rewrite cache layout, still honoured for reads
    pub fn legacy_media_dir(&self, hostname: &str, media_name: &str) -> PathBuf {
        self.cache_dir().join("medias").join(hostname).join(media_name)
    }

    /// Cross-process exclusive install lock
    pub fn install_lock_path(&self) -> PathBuf {
        self.root.join("var/lib/rpm/.urpm-install.lock")
    }

    /// One-shot flag set by a failing background child
    pub fn background_error_path(&self) -> PathBuf {
        self.root.join("var/lib/rpm/.urpm-background-error")
    }

    /// Names of packages installed as dependencies, one per line
    pub fn deps_list_path(&self) -> PathBuf {
        self.root.join("var/lib/rpm/installed-through-deps.list")
    }

    /// Append-only structured audit trail
    pub fn audit_log_path(&self) -> PathBuf {
        self.root.join("var/log/urpm/audit.log")
    }

    /// Plain text log written by the forked transaction child
    pub fn background_log_path(&self) -> PathBuf {
        self.root.join("var/log/urpm-background.log")
    }
}

/// Ensures state directories are created
fn ensure_dirs_exist(root: &Path) {
    for path in [
        root.join("var/lib/urpm"),
        root.join("var/lib/rpm"),
        root.join("var/cache/urpm/medias"),
        root.join("var/log/urpm"),
    ] {
        let _ = fs::create_dir_all(path);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn paths_are_rooted() {
        let install = Installation {
            root: PathBuf::from("/chroot"),
            mutability: Mutability::ReadOnly,
        };
        assert_eq!(
            install.install_lock_path(),
            PathBuf::from("/chroot/var/lib/rpm/.urpm-install.lock")
        );
        assert_eq!(
            install.official_media_dir("10/x86_64/media/core/release"),
            PathBuf::from("/chroot/var/cache/urpm/medias/official/10/x86_64/media/core/release")
        );
    }
}
