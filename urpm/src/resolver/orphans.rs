// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Orphan detection
//!
//! An orphan is a dependency-installed package no explicitly installed
//! package reaches through the requires graph. The reason set comes from
//! the installed-through-deps file; everything not in it is a root.

use std::collections::{BTreeSet, HashSet, VecDeque};

use super::pool::Pool;
use super::{ActionKind, Installed, PackageAction};
use crate::evr::Nevra;

/// Dependency-marked packages unreachable from any explicit package
pub fn find_orphans(installed: &Installed, dependency_names: &BTreeSet<String>) -> Vec<String> {
    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for meta in installed.iter() {
        if !dependency_names.contains(meta.name()) {
            reachable.insert(meta.name().to_owned());
            queue.push_back(meta.name());
        }
    }

    while let Some(name) = queue.pop_front() {
        let Some(meta) = installed.get(name) else {
            continue;
        };
        let wanted: Vec<String> = meta
            .requires
            .iter()
            .chain(meta.recommends.iter())
            .flat_map(|cap| {
                installed
                    .iter()
                    .filter(|p| p.provides_capability(cap))
                    .map(|p| p.name().to_owned())
            })
            .collect();
        for name in wanted {
            if reachable.insert(name.clone()) {
                if let Some(meta) = installed.get(&name) {
                    queue.push_back(meta.name());
                }
            }
        }
    }

    let mut orphans: Vec<String> = installed
        .iter()
        .filter(|meta| {
            dependency_names.contains(meta.name()) && !reachable.contains(meta.name())
        })
        .map(|meta| meta.name().to_owned())
        .collect();
    orphans.sort();
    orphans
}

/// Project the installed set past a planned set of actions, so orphans
/// that a pending upgrade would create can be reported up front
pub fn simulate_upgrade(
    installed: &Installed,
    pool: &Pool,
    actions: &[PackageAction],
) -> Installed {
    let removed: HashSet<&str> = actions
        .iter()
        .filter(|a| a.action == ActionKind::Remove)
        .map(|a| a.name.as_str())
        .collect();
    let replaced: HashSet<&str> = actions
        .iter()
        .filter(|a| {
            matches!(
                a.action,
                ActionKind::Install | ActionKind::Upgrade | ActionKind::Downgrade
            )
        })
        .map(|a| a.name.as_str())
        .collect();

    let mut after: Vec<_> = installed
        .iter()
        .filter(|meta| !removed.contains(meta.name()) && !replaced.contains(meta.name()))
        .cloned()
        .collect();

    for action in actions {
        if action.action == ActionKind::Remove {
            continue;
        }
        // Pull the incoming metadata out of the pool by nevra
        let incoming = Nevra::parse(&action.nevra).ok().and_then(|nevra| {
            pool.by_name(&nevra.name)
                .into_iter()
                .map(|i| pool.get(i))
                .find(|c| c.meta.nevra == nevra)
                .map(|c| c.meta.clone())
        });
        if let Some(meta) = incoming {
            after.push(meta);
        }
    }

    Installed::new(after)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::packages::Record;
    use crate::package::Meta;
    use crate::resolver::Reason;

    fn meta(nevra: &str, requires: &[&str]) -> Meta {
        let mut m = Meta::new(Nevra::parse(nevra).unwrap());
        m.requires = requires.iter().map(|s| s.parse().unwrap()).collect();
        m
    }

    fn deps(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn unreferenced_dependency_is_orphan() {
        let installed = Installed::new(vec![
            meta("app-1.0-1.mga10.x86_64", &["libused"]),
            meta("libused-1.0-1.mga10.x86_64", &[]),
            meta("libstale-1.0-1.mga10.x86_64", &[]),
        ]);
        let orphans = find_orphans(&installed, &deps(&["libused", "libstale"]));
        assert_eq!(orphans, vec!["libstale"]);
    }

    #[test]
    fn transitive_reachability() {
        let installed = Installed::new(vec![
            meta("app-1.0-1.mga10.x86_64", &["libmid"]),
            meta("libmid-1.0-1.mga10.x86_64", &["libdeep"]),
            meta("libdeep-1.0-1.mga10.x86_64", &[]),
        ]);
        let orphans = find_orphans(&installed, &deps(&["libmid", "libdeep"]));
        assert!(orphans.is_empty(), "deep deps reachable through chains");
    }

    #[test]
    fn upgrade_that_drops_a_dependency_creates_orphan() {
        let installed = Installed::new(vec![
            meta("app-1.0-1.mga10.x86_64", &["libold"]),
            meta("libold-1.0-1.mga10.x86_64", &[]),
        ]);
        let pool = Pool::new(
            vec![Record {
                meta: meta("app-2.0-1.mga10.x86_64", &[]),
                media_id: 1,
                media_name: "Core".to_owned(),
                media_priority: 50,
            }],
            &[],
        );

        let action = PackageAction {
            name: "app".to_owned(),
            nevra: "app-2.0-1.mga10.x86_64".to_owned(),
            evr: "2.0-1.mga10".to_owned(),
            arch: "x86_64".to_owned(),
            action: ActionKind::Upgrade,
            reason: Reason::Explicit,
            previous_nevra: Some("app-1.0-1.mga10.x86_64".to_owned()),
            media_name: "Core".to_owned(),
            filesize: 0,
            size: 0,
        };

        let after = simulate_upgrade(&installed, &pool, &[action]);
        let orphans = find_orphans(&after, &deps(&["libold"]));
        assert_eq!(orphans, vec!["libold"]);
    }
}
