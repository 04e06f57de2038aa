// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! The installed-reason compatibility file
//!
//! `installed-through-deps.list` under the RPM root is a flat, one name
//! per line set of packages installed as dependencies. It predates the
//! relational store and stays authoritative for orphan detection; the
//! resolver is its only writer. Races with the daemon are avoided because
//! the file lives in the install lock's domain.

use std::collections::BTreeSet;
use std::io::{self, Write};
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ReasonFile {
    path: PathBuf,
}

impl ReasonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Missing file reads as the empty set
    pub fn read(&self) -> Result<BTreeSet<String>, Error> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(ToOwned::to_owned)
                .collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(BTreeSet::new()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn write(&self, names: &BTreeSet<String>) -> Result<(), Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(Error::Io)?;
        }
        // Atomic replace so a crash never leaves a torn list
        let tmp = self.path.with_extension("tmp");
        let mut file = std::fs::File::create(&tmp).map_err(Error::Io)?;
        for name in names {
            writeln!(file, "{name}").map_err(Error::Io)?;
        }
        file.sync_all().map_err(Error::Io)?;
        std::fs::rename(&tmp, &self.path).map_err(Error::Io)?;
        Ok(())
    }

    /// Record names as dependency-installed
    pub fn mark_dependency(&self, names: &[String]) -> Result<(), Error> {
        let mut set = self.read()?;
        for name in names {
            set.insert(name.clone());
        }
        self.write(&set)
    }

    /// Promote names to explicitly installed
    pub fn mark_explicit(&self, names: &[String]) -> Result<(), Error> {
        self.unmark(names)
    }

    /// Drop names from the set entirely
    pub fn unmark(&self, names: &[String]) -> Result<(), Error> {
        let mut set = self.read()?;
        for name in names {
            set.remove(name);
        }
        self.write(&set)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("reason file: {0}")]
    Io(#[source] io::Error),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mark_cycle_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let file = ReasonFile::new(dir.path().join("installed-through-deps.list"));

        assert!(file.read().unwrap().is_empty(), "missing file reads empty");

        let names = vec!["libfoo".to_owned(), "libbar".to_owned()];
        file.mark_dependency(&names).unwrap();
        file.mark_dependency(&names).unwrap();
        assert_eq!(file.read().unwrap().len(), 2);

        file.mark_explicit(&["libfoo".to_owned()]).unwrap();
        let set = file.read().unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains("libbar"));

        // explicit → dependency → explicit lands where it started
        file.mark_dependency(&["libfoo".to_owned()]).unwrap();
        file.mark_explicit(&["libfoo".to_owned()]).unwrap();
        assert!(!file.read().unwrap().contains("libfoo"));
    }

    #[test]
    fn file_is_plain_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deps.list");
        let file = ReasonFile::new(&path);
        file.mark_dependency(&["b".to_owned(), "a".to_owned()]).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "a\nb\n", "sorted, newline terminated");
    }
}
