// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::db::constraints::{pin_priority, Pin};
use crate::db::packages::Record;
use crate::dependency::Capability;
use crate::package::Meta;

/// Media name under which local on-disk RPMs are injected
pub const LOCAL_MEDIA: &str = "@LocalRPMs";

/// One installable unit the solver can pick
#[derive(Debug, Clone)]
pub struct Candidate {
    pub meta: Meta,
    pub media_id: i64,
    pub media_name: String,
    pub media_priority: i64,
    /// Effective priority after pins
    pub pin_priority: i64,
    /// Set when the payload is a local file rather than a download
    pub local_path: Option<PathBuf>,
}

/// The available universe: every package of every enabled media, plus any
/// injected local RPMs
#[derive(Debug, Default)]
pub struct Pool {
    candidates: Vec<Candidate>,
    by_name: HashMap<String, Vec<usize>>,
    by_provider: HashMap<String, Vec<usize>>,
}

impl Pool {
    pub fn new(records: Vec<Record>, pins: &[Pin]) -> Self {
        let mut pool = Self::default();
        for record in records {
            let pinned = pin_priority(pins, record.meta.name(), &record.media_name)
                .unwrap_or(record.media_priority);
            pool.insert(Candidate {
                pin_priority: pinned,
                media_id: record.media_id,
                media_name: record.media_name,
                media_priority: record.media_priority,
                local_path: None,
                meta: record.meta,
            });
        }
        pool
    }

    /// Local RPMs outrank media candidates in provider selection; the
    /// downgrade rule is enforced by the solver, not here
    pub fn add_local_rpm(&mut self, meta: Meta, path: PathBuf) {
        self.insert(Candidate {
            meta,
            media_id: 0,
            media_name: LOCAL_MEDIA.to_owned(),
            media_priority: i64::MAX,
            pin_priority: i64::MAX,
            local_path: Some(path),
        });
    }

    fn insert(&mut self, candidate: Candidate) {
        let index = self.candidates.len();
        self.by_name
            .entry(candidate.meta.name().to_lowercase())
            .or_default()
            .push(index);
        self.by_provider
            .entry(candidate.meta.name().to_owned())
            .or_default()
            .push(index);
        for provide in &candidate.meta.provides {
            self.by_provider
                .entry(provide.name.clone())
                .or_default()
                .push(index);
        }
        self.candidates.push(candidate);
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Every candidate index, for whole-pool scans
    pub fn all(&self) -> impl Iterator<Item = usize> {
        0..self.candidates.len()
    }

    pub fn get(&self, index: usize) -> &Candidate {
        &self.candidates[index]
    }

    /// Most preferred among an arbitrary set of indexes
    pub fn best_of(&self, mut indexes: Vec<usize>) -> Option<usize> {
        self.sort_by_preference(&mut indexes);
        indexes.into_iter().next()
    }

    /// Candidate indexes carrying a given package name, preference order
    pub fn by_name(&self, name: &str) -> Vec<usize> {
        let mut found = self
            .by_name
            .get(&name.to_lowercase())
            .cloned()
            .unwrap_or_default();
        self.sort_by_preference(&mut found);
        found
    }

    /// Candidate indexes satisfying a capability, preference order
    pub fn providers_of(&self, capability: &Capability) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .by_provider
            .get(&capability.name)
            .map(|indexes| {
                indexes
                    .iter()
                    .copied()
                    .filter(|&i| self.candidates[i].meta.provides_capability(capability))
                    .collect()
            })
            .unwrap_or_default();
        self.sort_by_preference(&mut found);
        found
    }

    /// Best candidate for a bare name
    pub fn best_by_name(&self, name: &str) -> Option<usize> {
        self.by_name(name).into_iter().next()
    }

    /// Pin priority first, then media priority, then EVR, then a
    /// deterministic name/media tiebreak
    fn sort_by_preference(&self, indexes: &mut [usize]) {
        indexes.sort_by(|&a, &b| self.preference(a, b));
    }

    fn preference(&self, a: usize, b: usize) -> Ordering {
        let (a, b) = (&self.candidates[a], &self.candidates[b]);
        b.pin_priority
            .cmp(&a.pin_priority)
            .then_with(|| b.media_priority.cmp(&a.media_priority))
            .then_with(|| b.meta.evr().cmp(a.meta.evr()))
            .then_with(|| a.meta.name().cmp(b.meta.name()))
            .then_with(|| a.media_name.cmp(&b.media_name))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::evr::Nevra;

    fn record(nevra: &str, media: &str, priority: i64, provides: &[&str]) -> Record {
        let mut meta = Meta::new(Nevra::parse(nevra).unwrap());
        meta.provides = provides.iter().map(|p| p.parse().unwrap()).collect();
        Record {
            meta,
            media_id: 1,
            media_name: media.to_owned(),
            media_priority: priority,
        }
    }

    #[test]
    fn preference_order() {
        let pool = Pool::new(
            vec![
                record("foo-1.0-1.mga10.x86_64", "Core", 50, &[]),
                record("foo-2.0-1.mga10.x86_64", "Core", 50, &[]),
                record("foo-1.5-1.mga10.x86_64", "Backports", 80, &[]),
            ],
            &[],
        );

        let best = pool.best_by_name("foo").unwrap();
        // Media priority outranks EVR
        assert_eq!(pool.get(best).meta.evr().version, "1.5");
        assert_eq!(pool.get(best).media_name, "Backports");
    }

    #[test]
    fn pins_outrank_media_priority() {
        let pins = vec![crate::db::constraints::Pin {
            id: 1,
            package_pattern: "foo".to_owned(),
            media_pattern: Some("Core".to_owned()),
            priority: 500,
            version_pattern: None,
            comment: None,
        }];
        let pool = Pool::new(
            vec![
                record("foo-1.0-1.mga10.x86_64", "Core", 50, &[]),
                record("foo-2.0-1.mga10.x86_64", "Backports", 80, &[]),
            ],
            &pins,
        );
        let best = pool.best_by_name("foo").unwrap();
        assert_eq!(pool.get(best).media_name, "Core");
    }

    #[test]
    fn providers_respect_version_constraints() {
        let pool = Pool::new(
            vec![
                record("libfoo-1.0-1.mga10.x86_64", "Core", 50, &["libfoo.so.1 = 1.0"]),
                record("libfoo-2.0-1.mga10.x86_64", "Core", 50, &["libfoo.so.2 = 2.0"]),
            ],
            &[],
        );
        let hits = pool.providers_of(&"libfoo.so.2".parse().unwrap());
        assert_eq!(hits.len(), 1);
        assert_eq!(pool.get(hits[0]).meta.evr().version, "2.0");

        let hits = pool.providers_of(&"libfoo >= 1.5".parse().unwrap());
        assert_eq!(hits.len(), 1, "implicit self-provide is version aware");
    }

    #[test]
    fn local_rpms_outrank_everything() {
        let mut pool = Pool::new(
            vec![record("foo-9.0-1.mga10.x86_64", "Core", 999, &[])],
            &[],
        );
        pool.add_local_rpm(
            Meta::new(Nevra::parse("foo-1.0-1.mga10.x86_64").unwrap()),
            PathBuf::from("/tmp/foo-1.0-1.mga10.x86_64.rpm"),
        );
        let best = pool.best_by_name("foo").unwrap();
        assert!(pool.get(best).local_path.is_some());
    }
}
