// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Dependency resolver
//!
//! Turns user intent plus the installed set and the available pool into an
//! ordered action plan. Provider selection is a total order (pin priority,
//! media priority, EVR, name) so identical inputs always produce identical
//! plans. Holds are honoured everywhere: a held name is never upgraded and
//! never replaced through obsoletes; attempts land on the warning channel
//! rather than failing the plan.

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use crate::dependency::Capability;
use crate::evr::Evr;
use crate::package::Meta;

pub use self::pool::{Candidate, Pool, LOCAL_MEDIA};
pub use self::reasons::ReasonFile;

pub mod orphans;
pub mod pool;
pub mod reasons;

/// What the plan does to one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Install,
    Upgrade,
    Remove,
    Downgrade,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Install => "install",
            ActionKind::Upgrade => "upgrade",
            ActionKind::Remove => "remove",
            ActionKind::Downgrade => "downgrade",
        }
    }
}

/// Why the plan touches one package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Explicit,
    Dependency,
    Orphan,
    Obsoleted,
}

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Reason::Explicit => "explicit",
            Reason::Dependency => "dependency",
            Reason::Orphan => "orphan",
            Reason::Obsoleted => "obsoleted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageAction {
    pub name: String,
    pub nevra: String,
    pub evr: String,
    pub arch: String,
    pub action: ActionKind,
    pub reason: Reason,
    pub previous_nevra: Option<String>,
    pub media_name: String,
    pub filesize: u64,
    pub size: u64,
}

/// Multiple provider names satisfy one needed capability
#[derive(Debug, Clone)]
pub struct Alternative {
    pub capability: String,
    pub providers: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ResolverResult {
    pub success: bool,
    pub actions: Vec<PackageAction>,
    pub problems: Vec<String>,
    pub alternatives: Vec<Alternative>,
    pub install_size: u64,
    pub upgrade_size_delta: i64,
}

/// The current installed set, indexed for provider lookup
#[derive(Debug, Default)]
pub struct Installed {
    packages: Vec<Meta>,
    by_name: HashMap<String, usize>,
}

impl Installed {
    pub fn new(packages: Vec<Meta>) -> Self {
        let by_name = packages
            .iter()
            .enumerate()
            .map(|(i, meta)| (meta.name().to_lowercase(), i))
            .collect();
        Self { packages, by_name }
    }

    pub fn get(&self, name: &str) -> Option<&Meta> {
        self.by_name
            .get(&name.to_lowercase())
            .map(|&i| &self.packages[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Meta> {
        self.packages.iter()
    }

    /// Is the capability satisfied, ignoring packages about to go away?
    pub fn satisfies(&self, capability: &Capability, removed: &HashSet<String>) -> bool {
        self.packages
            .iter()
            .filter(|meta| !removed.contains(meta.name()))
            .any(|meta| meta.provides_capability(capability))
    }
}

/// Per-call inclusion policy for the soft dependency classes
#[derive(Debug, Clone, Copy)]
struct SoftDeps {
    recommends: bool,
    suggests: bool,
}

pub struct Resolver {
    pool: Pool,
    installed: Installed,
    held: HashSet<String>,
    reasons: ReasonFile,
    warnings: Vec<String>,
    /// Opt-in for suggests on install/upgrade
    pub with_suggests: bool,
}

impl Resolver {
    pub fn new(
        pool: Pool,
        installed: Installed,
        held: HashSet<String>,
        reasons: ReasonFile,
    ) -> Self {
        Self {
            pool,
            installed,
            held,
            reasons,
            warnings: Vec::new(),
            with_suggests: false,
        }
    }

    /// Held-package notices and other non-fatal diagnostics collected by
    /// the last resolve call
    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    pub fn installed(&self) -> &Installed {
        &self.installed
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Inject local on-disk RPMs into the pool; returns their names
    pub fn add_local_rpms(&mut self, paths: &[std::path::PathBuf]) -> Result<Vec<String>, crate::rpmdb::Error> {
        let mut names = Vec::new();
        for path in paths {
            let meta = crate::rpmdb::read_header(path)?;
            names.push(meta.name().to_owned());
            self.pool.add_local_rpm(meta, path.clone());
        }
        Ok(names)
    }

    pub fn resolve_install(
        &mut self,
        names: &[String],
        choices: Option<&HashMap<String, String>>,
    ) -> ResolverResult {
        let soft = SoftDeps {
            recommends: true,
            suggests: self.with_suggests,
        };
        let (result, warnings) = {
            let mut solve = Solve::new(self, soft, choices);
            for name in names {
                solve.request(name);
            }
            solve.propagate();
            let result = solve.finish();
            (result, solve.warnings)
        };
        self.warnings.extend(warnings);
        result
    }

    pub fn resolve_remove(
        &mut self,
        names: &[String],
        erase_recommends: bool,
        keep_suggests: bool,
    ) -> ResolverResult {
        let mut result = ResolverResult {
            success: true,
            ..Default::default()
        };

        let mut to_remove: Vec<(String, Reason)> = Vec::new();
        let mut removed: HashSet<String> = HashSet::new();

        for name in names {
            match self.installed.get(name) {
                Some(meta) => {
                    let name = meta.name().to_owned();
                    if removed.insert(name.clone()) {
                        to_remove.push((name, Reason::Explicit));
                    }
                }
                None => {
                    result.success = false;
                    result.problems.push(format!("package {name} is not installed"));
                }
            }
        }
        if !result.success {
            return result;
        }

        // Reverse-dependency closure: anything whose requirements only the
        // removed set satisfies goes too
        loop {
            let mut grew = false;
            for meta in self.installed.iter() {
                if removed.contains(meta.name()) {
                    continue;
                }
                let broken = meta.requires.iter().any(|req| {
                    let removed_provides = self
                        .installed
                        .iter()
                        .filter(|p| removed.contains(p.name()))
                        .any(|p| p.provides_capability(req));
                    removed_provides && !self.installed.satisfies(req, &removed)
                });
                if broken {
                    if self.held.contains(meta.name()) {
                        result.success = false;
                        result.problems.push(format!(
                            "removing {} would break held package {}",
                            names.join(", "),
                            meta.name()
                        ));
                        continue;
                    }
                    removed.insert(meta.name().to_owned());
                    to_remove.push((meta.name().to_owned(), Reason::Dependency));
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }
        if !result.success {
            return result;
        }

        if erase_recommends {
            // Dependency-reason packages only soft-referenced by the
            // removed set. Suggests-only ones go too, unless the caller
            // asked to keep them.
            let dep_names = self.reasons.read().unwrap_or_default();
            let soft_referenced: HashSet<&str> = self
                .installed
                .iter()
                .filter(|p| removed.contains(p.name()))
                .flat_map(|p| {
                    let suggests = (!keep_suggests)
                        .then(|| p.suggests.iter().map(|s| s.name.as_str()))
                        .into_iter()
                        .flatten();
                    p.recommends.iter().map(|r| r.name.as_str()).chain(suggests)
                })
                .collect();
            for meta in self.installed.iter() {
                if removed.contains(meta.name())
                    || !dep_names.contains(meta.name())
                    || !soft_referenced.contains(meta.name())
                {
                    continue;
                }
                let still_wanted = self.installed.iter().any(|other| {
                    !removed.contains(other.name())
                        && other
                            .requires
                            .iter()
                            .chain(other.recommends.iter())
                            .any(|cap| meta.provides_capability(cap))
                });
                if !still_wanted && !self.held.contains(meta.name()) {
                    removed.insert(meta.name().to_owned());
                    to_remove.push((meta.name().to_owned(), Reason::Orphan));
                }
            }
        }

        // Dependents erase before the packages they depend on
        to_remove.reverse();
        for (name, reason) in to_remove {
            let meta = self.installed.get(&name).expect("removal of installed");
            result.actions.push(remove_action(meta, reason));
        }
        result
    }

    pub fn resolve_upgrade(&mut self, names: Option<&[String]>) -> ResolverResult {
        let soft = SoftDeps {
            recommends: false,
            suggests: false,
        };
        let targets: Vec<String> = match names {
            Some(names) => names.to_vec(),
            None => self.installed.iter().map(|m| m.name().to_owned()).collect(),
        };

        let (result, warnings) = {
            let mut solve = Solve::new(self, soft, None);
            self.upgrade_targets(&mut solve, &targets, names.is_some());
            solve.propagate();
            let result = solve.finish();
            (result, solve.warnings)
        };
        self.warnings.extend(warnings);
        result
    }

    fn upgrade_targets(&self, solve: &mut Solve<'_>, targets: &[String], explicit: bool) {
        for name in targets {
            let Some(current) = self.installed.get(name) else {
                if explicit {
                    // Explicitly named but absent: treat as fresh install
                    solve.request(name);
                }
                continue;
            };
            let current_name = current.name().to_owned();
            let current_evr = current.evr().clone();

            if let Some(best) = self.pool.best_by_name(&current_name) {
                let candidate = self.pool.get(best);
                if candidate.meta.evr() > &current_evr {
                    if self.held.contains(&current_name) {
                        solve.warnings.push(format!(
                            "{current_name} is held back (candidate {})",
                            candidate.meta.evr()
                        ));
                    } else {
                        solve.enqueue(best, Reason::Explicit);
                    }
                } else if candidate.local_path.is_some() && candidate.meta.evr() < &current_evr {
                    // Local payload older than installed: explicit downgrade
                    solve.enqueue(best, Reason::Explicit);
                }
            }

            // Replacement via obsoletes from a differently-named package
            if let Some(obsoleter) = self.find_obsoleter(&current_name, &current_evr) {
                if self.held.contains(&current_name) {
                    solve.warnings.push(format!(
                        "{current_name} is held, not replaced by {}",
                        self.pool.get(obsoleter).meta.name()
                    ));
                } else {
                    solve.enqueue(obsoleter, Reason::Explicit);
                }
            }
        }
    }

    /// Best differently-named candidate whose obsoletes cover (name, evr)
    fn find_obsoleter(&self, name: &str, evr: &Evr) -> Option<usize> {
        let hits: Vec<usize> = self
            .pool
            .all()
            .filter(|&index| {
                let candidate = self.pool.get(index);
                !candidate.meta.name().eq_ignore_ascii_case(name)
                    && candidate
                        .meta
                        .obsoletes
                        .iter()
                        .any(|cap| cap.satisfied_by(name, Some(evr)))
            })
            .collect();
        self.pool.best_of(hits)
    }

    pub fn find_all_orphans(&self) -> Vec<String> {
        let deps = self.reasons.read().unwrap_or_default();
        orphans::find_orphans(&self.installed, &deps)
    }

    /// Orphans created by a planned upgrade, so the façade can offer them
    /// for removal alongside
    pub fn find_upgrade_orphans(&self, actions: &[PackageAction]) -> Vec<String> {
        let deps = self.reasons.read().unwrap_or_default();
        let before = orphans::find_orphans(&self.installed, &deps);

        let after_set = orphans::simulate_upgrade(&self.installed, &self.pool, actions);
        let after = orphans::find_orphans(&after_set, &deps);

        let before: HashSet<_> = before.into_iter().collect();
        after.into_iter().filter(|n| !before.contains(n)).collect()
    }

    pub fn mark_as_explicit(&self, names: &[String]) -> Result<(), reasons::Error> {
        self.reasons.mark_explicit(names)
    }

    pub fn mark_as_dependency(&self, names: &[String]) -> Result<(), reasons::Error> {
        self.reasons.mark_dependency(names)
    }

    pub fn unmark_packages(&self, names: &[String]) -> Result<(), reasons::Error> {
        self.reasons.unmark(names)
    }

    pub fn dependency_marked(&self) -> std::collections::BTreeSet<String> {
        self.reasons.read().unwrap_or_default()
    }
}

fn remove_action(meta: &Meta, reason: Reason) -> PackageAction {
    PackageAction {
        name: meta.name().to_owned(),
        nevra: meta.nevra.to_string(),
        evr: meta.evr().to_string(),
        arch: meta.arch().to_owned(),
        action: ActionKind::Remove,
        reason,
        previous_nevra: None,
        media_name: String::new(),
        filesize: 0,
        size: meta.size,
    }
}

/// One resolution pass: propagation state plus the output accumulators
struct Solve<'a> {
    pool: &'a Pool,
    installed: &'a Installed,
    held: &'a HashSet<String>,
    soft: SoftDeps,
    choices: HashMap<String, String>,

    queue: VecDeque<(usize, Reason)>,
    selected: Vec<(usize, Reason)>,
    selected_names: HashMap<String, usize>,
    removals: Vec<(Meta, Reason)>,
    removal_names: HashSet<String>,

    problems: Vec<String>,
    alternatives: Vec<Alternative>,
    warnings: Vec<String>,
}

impl<'a> Solve<'a> {
    fn new(
        resolver: &'a Resolver,
        soft: SoftDeps,
        choices: Option<&HashMap<String, String>>,
    ) -> Self {
        Self {
            pool: &resolver.pool,
            installed: &resolver.installed,
            held: &resolver.held,
            soft,
            choices: choices.cloned().unwrap_or_default(),
            queue: VecDeque::new(),
            selected: Vec::new(),
            selected_names: HashMap::new(),
            removals: Vec::new(),
            removal_names: HashSet::new(),
            problems: Vec::new(),
            alternatives: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Resolve one requested name (or capability) to a candidate
    fn request(&mut self, spec: &str) {
        let by_name = self.pool.by_name(spec);
        if let Some(&best) = by_name.first() {
            let candidate = self.pool.get(best);
            if let Some(current) = self.installed.get(spec) {
                // Nothing newer available; local payloads may still downgrade
                if candidate.local_path.is_none() && candidate.meta.evr() <= current.evr() {
                    self.warnings
                        .push(format!("{} is already installed", current.name()));
                    return;
                }
            }
            self.enqueue(best, Reason::Explicit);
            return;
        }

        // Not a package name: try it as a capability
        let Ok(capability) = spec.parse::<Capability>() else {
            self.problems.push(format!("no package named {spec}"));
            return;
        };
        match self.pick_provider(&capability, None) {
            Some(index) => self.enqueue(index, Reason::Explicit),
            None => self.problems.push(format!("no package provides {spec}")),
        }
    }

    fn enqueue(&mut self, index: usize, reason: Reason) {
        self.queue.push_back((index, reason));
    }

    /// Drain the work queue, selecting candidates and following requires
    fn propagate(&mut self) {
        while let Some((index, reason)) = self.queue.pop_front() {
            self.select(index, reason);
        }
    }

    fn select(&mut self, index: usize, reason: Reason) {
        let candidate = self.pool.get(index);
        let name = candidate.meta.name().to_owned();

        if self.selected_names.contains_key(&name) {
            return;
        }

        // Obsoleted installed packages ride in the same transaction
        let mut victims = Vec::new();
        for cap in &candidate.meta.obsoletes {
            for installed in self.installed.iter() {
                if installed.name() != name
                    && cap.satisfied_by(installed.name(), Some(installed.evr()))
                {
                    victims.push(installed.clone());
                }
            }
        }

        // A held victim the candidate cannot coexist with vetoes the whole
        // candidate, before any removal is committed
        for victim in &victims {
            if self.held.contains(victim.name())
                && candidate
                    .meta
                    .conflicts
                    .iter()
                    .any(|cap| cap.satisfied_by(victim.name(), Some(victim.evr())))
            {
                self.warnings.push(format!(
                    "{name} not installed, it would replace held package {}",
                    victim.name()
                ));
                return;
            }
        }
        for victim in victims {
            if self.held.contains(victim.name()) {
                self.warnings.push(format!(
                    "{} obsoletes held package {}, keeping it",
                    name,
                    victim.name()
                ));
            } else if self.removal_names.insert(victim.name().to_owned()) {
                self.removals.push((victim, Reason::Obsoleted));
            }
        }

        // Hard conflicts against what stays installed or is already selected
        for cap in &candidate.meta.conflicts {
            let clash = self
                .installed
                .iter()
                .filter(|p| !self.removal_names.contains(p.name()) && p.name() != name)
                .find(|p| cap.satisfied_by(p.name(), Some(p.evr())));
            if let Some(clash) = clash {
                self.problems
                    .push(format!("{name} conflicts with installed {}", clash.nevra));
                return;
            }
            let clash = self
                .selected
                .iter()
                .map(|&(i, _)| &self.pool.get(i).meta)
                .find(|p| cap.satisfied_by(p.name(), Some(p.evr())));
            if let Some(clash) = clash {
                self.problems
                    .push(format!("{name} conflicts with selected {}", clash.nevra));
                return;
            }
        }

        self.selected_names.insert(name.clone(), self.selected.len());
        self.selected.push((index, reason));

        let requires = candidate.meta.requires.clone();
        let recommends = candidate.meta.recommends.clone();
        let suggests = candidate.meta.suggests.clone();

        for require in &requires {
            if self.satisfied(require) {
                continue;
            }
            match self.pick_provider(require, Some(&name)) {
                Some(provider) => self.enqueue(provider, Reason::Dependency),
                None => self
                    .problems
                    .push(format!("nothing provides {require}, required by {name}")),
            }
        }
        if self.soft.recommends {
            for soft_dep in &recommends {
                if self.satisfied(soft_dep) {
                    continue;
                }
                if let Some(provider) = self.pick_soft_provider(soft_dep) {
                    self.enqueue(provider, Reason::Dependency);
                }
            }
        }
        if self.soft.suggests {
            for soft_dep in &suggests {
                if self.satisfied(soft_dep) {
                    continue;
                }
                if let Some(provider) = self.pick_soft_provider(soft_dep) {
                    self.enqueue(provider, Reason::Dependency);
                }
            }
        }
    }

    fn satisfied(&self, capability: &Capability) -> bool {
        if self.installed.satisfies(capability, &self.removal_names) {
            return true;
        }
        self.selected
            .iter()
            .any(|&(i, _)| self.pool.get(i).meta.provides_capability(capability))
    }

    /// Rule-ordered provider choice, with alternative surfacing when a
    /// versioned family makes the pick ambiguous
    fn pick_provider(&mut self, capability: &Capability, requester: Option<&str>) -> Option<usize> {
        let providers = self.pool.providers_of(capability);
        if providers.is_empty() {
            return None;
        }

        let mut names: Vec<&str> = providers
            .iter()
            .map(|&i| self.pool.get(i).meta.name())
            .collect();
        names.dedup();
        let distinct: HashSet<&str> = names.iter().copied().collect();

        if distinct.len() > 1 {
            // An explicit choice settles it
            if let Some(chosen) = self.choices.get(&capability.name) {
                if let Some(&index) = providers
                    .iter()
                    .find(|&&i| self.pool.get(i).meta.name() == chosen.as_str())
                {
                    return Some(index);
                }
            }
            // Exactly one provider name already installed settles it too
            let installed_names: Vec<&str> = distinct
                .iter()
                .copied()
                .filter(|n| self.installed.get(n).is_some())
                .collect();
            if installed_names.len() == 1 {
                let pick = installed_names[0];
                return providers
                    .iter()
                    .copied()
                    .find(|&i| self.pool.get(i).meta.name() == pick);
            }
            // A versioned family (foo8.4 vs foo8.5) needs a human choice
            let families: HashSet<String> =
                distinct.iter().map(|n| family_of(n)).collect();
            if families.len() == 1 && installed_names.is_empty() {
                let mut provider_names: Vec<String> =
                    distinct.iter().map(|s| (*s).to_owned()).collect();
                provider_names.sort();
                self.alternatives.push(Alternative {
                    capability: capability.to_string(),
                    providers: provider_names,
                });
                self.problems.push(match requester {
                    Some(requester) => format!(
                        "multiple providers for {capability}, required by {requester}"
                    ),
                    None => format!("multiple providers for {capability}"),
                });
                return None;
            }
        }

        providers.into_iter().next()
    }

    /// Soft deps never fail and never raise alternatives
    fn pick_soft_provider(&mut self, capability: &Capability) -> Option<usize> {
        self.pool.providers_of(capability).into_iter().next()
    }

    fn finish(&mut self) -> ResolverResult {
        let mut result = ResolverResult {
            success: self.problems.is_empty(),
            problems: std::mem::take(&mut self.problems),
            alternatives: std::mem::take(&mut self.alternatives),
            ..Default::default()
        };
        if !result.success {
            return result;
        }

        for &(index, reason) in self.ordered_selection().iter() {
            let candidate = self.pool.get(index);
            let name = candidate.meta.name().to_owned();

            let (action, previous) = match self.installed.get(&name) {
                Some(current) if candidate.meta.evr() > current.evr() => {
                    (ActionKind::Upgrade, Some(current.nevra.to_string()))
                }
                Some(current) if candidate.meta.evr() < current.evr() => {
                    (ActionKind::Downgrade, Some(current.nevra.to_string()))
                }
                Some(current) => (ActionKind::Install, Some(current.nevra.to_string())),
                None => {
                    // A local payload older than the repo candidate is a
                    // downgrade relative to what the media offer
                    let media_newer = candidate.local_path.is_some()
                        && self
                            .pool
                            .by_name(&name)
                            .into_iter()
                            .filter_map(|i| {
                                let other = self.pool.get(i);
                                other.local_path.is_none().then(|| other.meta.evr().clone())
                            })
                            .max()
                            .map(|best| best > *candidate.meta.evr())
                            .unwrap_or(false);
                    if media_newer {
                        (ActionKind::Downgrade, None)
                    } else {
                        (ActionKind::Install, None)
                    }
                }
            };

            match action {
                ActionKind::Upgrade => {
                    if let Some(current) = self.installed.get(&name) {
                        result.upgrade_size_delta +=
                            candidate.meta.size as i64 - current.size as i64;
                    }
                }
                _ => result.install_size += candidate.meta.size,
            }

            result.actions.push(PackageAction {
                name,
                nevra: candidate.meta.nevra.to_string(),
                evr: candidate.meta.evr().to_string(),
                arch: candidate.meta.arch().to_owned(),
                action,
                reason,
                previous_nevra: previous,
                media_name: candidate.media_name.clone(),
                filesize: candidate.meta.filesize,
                size: candidate.meta.size,
            });
        }

        for (victim, reason) in std::mem::take(&mut self.removals) {
            result.actions.push(remove_action(&victim, reason));
        }

        result
    }

    /// Dependencies first; cycles fall back to selection order, RPM's own
    /// transaction ordering copes with those
    fn ordered_selection(&self) -> Vec<(usize, Reason)> {
        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<_> = (0..self.selected.len())
            .map(|i| graph.add_node(i))
            .collect();

        for (pos, &(index, _)) in self.selected.iter().enumerate() {
            for require in &self.pool.get(index).meta.requires {
                for (dep_pos, &(dep_index, _)) in self.selected.iter().enumerate() {
                    if dep_pos != pos
                        && self.pool.get(dep_index).meta.provides_capability(require)
                    {
                        graph.add_edge(nodes[dep_pos], nodes[pos], ());
                    }
                }
            }
        }

        match toposort(&graph, None) {
            Ok(order) => order.into_iter().map(|n| self.selected[graph[n]]).collect(),
            Err(_) => self.selected.clone(),
        }
    }
}

/// `foo8.4` and `foo8.5` share the family `foo`
fn family_of(name: &str) -> String {
    name.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.')
        .to_owned()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::packages::Record;
    use crate::evr::Nevra;

    fn meta(nevra: &str) -> Meta {
        Meta::new(Nevra::parse(nevra).unwrap())
    }

    fn full_meta(
        nevra: &str,
        requires: &[&str],
        provides: &[&str],
        recommends: &[&str],
        obsoletes: &[&str],
        conflicts: &[&str],
    ) -> Meta {
        let mut m = meta(nevra);
        m.size = 1000;
        m.filesize = 500;
        m.requires = requires.iter().map(|s| s.parse().unwrap()).collect();
        m.provides = provides.iter().map(|s| s.parse().unwrap()).collect();
        m.recommends = recommends.iter().map(|s| s.parse().unwrap()).collect();
        m.obsoletes = obsoletes.iter().map(|s| s.parse().unwrap()).collect();
        m.conflicts = conflicts.iter().map(|s| s.parse().unwrap()).collect();
        m
    }

    fn record(meta: Meta) -> Record {
        Record {
            meta,
            media_id: 1,
            media_name: "Core".to_owned(),
            media_priority: 50,
        }
    }

    fn resolver(pool: Vec<Meta>, installed: Vec<Meta>, held: &[&str]) -> (Resolver, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let reasons = ReasonFile::new(dir.path().join("deps.list"));
        let resolver = Resolver::new(
            Pool::new(pool.into_iter().map(record).collect(), &[]),
            Installed::new(installed),
            held.iter().map(|s| (*s).to_owned()).collect(),
            reasons,
        );
        (resolver, dir)
    }

    #[test]
    fn simple_install_with_deps() {
        let (mut resolver, _dir) = resolver(
            vec![
                full_meta("wget-1.21-1.mga10.x86_64", &["libpsl.so.5"], &[], &[], &[], &[]),
                full_meta(
                    "libpsl-0.21-1.mga10.x86_64",
                    &[],
                    &["libpsl.so.5"],
                    &[],
                    &[],
                    &[],
                ),
            ],
            vec![],
            &[],
        );

        let result = resolver.resolve_install(&["wget".to_owned()], None);
        assert!(result.success, "{:?}", result.problems);
        assert_eq!(result.actions.len(), 2);
        // Dependency ordered before its dependent
        assert_eq!(result.actions[0].name, "libpsl");
        assert_eq!(result.actions[0].reason, Reason::Dependency);
        assert_eq!(result.actions[1].name, "wget");
        assert_eq!(result.actions[1].reason, Reason::Explicit);
        assert_eq!(result.install_size, 2000);
    }

    #[test]
    fn missing_dependency_is_a_problem() {
        let (mut resolver, _dir) = resolver(
            vec![full_meta(
                "wget-1.21-1.mga10.x86_64",
                &["libmissing.so.9"],
                &[],
                &[],
                &[],
                &[],
            )],
            vec![],
            &[],
        );
        let result = resolver.resolve_install(&["wget".to_owned()], None);
        assert!(!result.success);
        assert!(result.problems[0].contains("libmissing.so.9"));
        assert!(result.actions.is_empty(), "no actions on failure");
    }

    #[test]
    fn recommends_on_install_not_upgrade() {
        let pool = vec![
            full_meta(
                "app-2.0-1.mga10.x86_64",
                &[],
                &[],
                &["app-docs"],
                &[],
                &[],
            ),
            full_meta("app-docs-2.0-1.mga10.noarch", &[], &[], &[], &[], &[]),
        ];

        let (mut r1, _d1) = resolver(pool.clone(), vec![], &[]);
        let result = r1.resolve_install(&["app".to_owned()], None);
        assert!(result.success);
        assert_eq!(result.actions.len(), 2, "recommends included on install");

        let (mut r2, _d2) = resolver(
            pool,
            vec![full_meta("app-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[])],
            &[],
        );
        let result = r2.resolve_upgrade(None);
        assert!(result.success);
        assert_eq!(result.actions.len(), 1, "recommends excluded on upgrade");
        assert_eq!(result.actions[0].action, ActionKind::Upgrade);
        assert_eq!(
            result.actions[0].previous_nevra.as_deref(),
            Some("app-1.0-1.mga10.x86_64")
        );
    }

    #[test]
    fn held_package_never_upgraded() {
        let (mut resolver, _dir) = resolver(
            vec![full_meta("kernel-6.6-1.mga10.x86_64", &[], &[], &[], &[], &[])],
            vec![full_meta("kernel-6.1-1.mga10.x86_64", &[], &[], &[], &[], &[])],
            &["kernel"],
        );
        let result = resolver.resolve_upgrade(None);
        assert!(result.success);
        assert!(result.actions.is_empty());
        let warnings = resolver.take_warnings();
        assert!(warnings.iter().any(|w| w.contains("kernel")));
    }

    #[test]
    fn obsoletes_couple_removal() {
        let (mut resolver, _dir) = resolver(
            vec![full_meta(
                "bar-2.0-1.mga10.x86_64",
                &[],
                &[],
                &[],
                &["baz"],
                &[],
            )],
            vec![full_meta("baz-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[])],
            &[],
        );
        let result = resolver.resolve_install(&["bar".to_owned()], None);
        assert!(result.success);
        assert_eq!(result.actions.len(), 2);
        assert_eq!(result.actions[0].action, ActionKind::Install);
        assert_eq!(result.actions[1].action, ActionKind::Remove);
        assert_eq!(result.actions[1].name, "baz");
        assert_eq!(result.actions[1].reason, Reason::Obsoleted);
    }

    #[test]
    fn held_obsolete_victim_survives() {
        let (mut resolver, _dir) = resolver(
            vec![full_meta(
                "bar-2.0-1.mga10.x86_64",
                &[],
                &[],
                &[],
                &["baz"],
                &[],
            )],
            vec![full_meta("baz-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[])],
            &["baz"],
        );
        let result = resolver.resolve_install(&["bar".to_owned()], None);
        assert!(result.success);
        // bar is independent of baz: installed, baz stays
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].name, "bar");
        assert!(resolver.take_warnings().iter().any(|w| w.contains("baz")));
    }

    #[test]
    fn held_obsolete_victim_with_conflict_blocks_candidate() {
        let (mut resolver, _dir) = resolver(
            vec![full_meta(
                "bar-2.0-1.mga10.x86_64",
                &[],
                &[],
                &[],
                &["baz"],
                &["baz"],
            )],
            vec![full_meta("baz-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[])],
            &["baz"],
        );
        let result = resolver.resolve_install(&["bar".to_owned()], None);
        assert!(result.success);
        assert!(result.actions.is_empty(), "bar requires removing held baz");
    }

    #[test]
    fn versioned_family_surfaces_alternatives() {
        let (mut resolver, _dir) = resolver(
            vec![
                full_meta("php8.4-1.0-1.mga10.x86_64", &[], &["php"], &[], &[], &[]),
                full_meta("php8.5-1.0-1.mga10.x86_64", &[], &["php"], &[], &[], &[]),
                full_meta("site-1.0-1.mga10.noarch", &["php"], &[], &[], &[], &[]),
            ],
            vec![],
            &[],
        );
        let result = resolver.resolve_install(&["site".to_owned()], None);
        assert!(!result.success);
        assert_eq!(result.alternatives.len(), 1);
        assert_eq!(
            result.alternatives[0].providers,
            vec!["php8.4", "php8.5"]
        );

        // An explicit choice resolves the ambiguity
        let choices: HashMap<String, String> =
            [("php".to_owned(), "php8.5".to_owned())].into();
        let result = resolver.resolve_install(&["site".to_owned()], Some(&choices));
        assert!(result.success, "{:?}", result.problems);
        assert!(result.actions.iter().any(|a| a.name == "php8.5"));
    }

    #[test]
    fn installed_family_auto_picks() {
        let (mut resolver, _dir) = resolver(
            vec![
                full_meta("php8.4-1.1-1.mga10.x86_64", &[], &["php"], &[], &[], &[]),
                full_meta("php8.5-1.0-1.mga10.x86_64", &[], &["php"], &[], &[], &[]),
                full_meta("site-1.0-1.mga10.noarch", &["php"], &[], &[], &[], &[]),
            ],
            vec![full_meta("php8.4-1.0-1.mga10.x86_64", &[], &["php"], &[], &[], &[])],
            &[],
        );
        let result = resolver.resolve_install(&["site".to_owned()], None);
        assert!(result.success, "{:?}", result.problems);
        // php requirement is satisfied by the installed php8.4 already
        assert_eq!(result.actions.len(), 1);
    }

    #[test]
    fn remove_with_reverse_closure() {
        let (mut resolver, _dir) = resolver(
            vec![],
            vec![
                full_meta(
                    "libfoo-1.0-1.mga10.x86_64",
                    &[],
                    &["libfoo.so.1"],
                    &[],
                    &[],
                    &[],
                ),
                full_meta(
                    "app-1.0-1.mga10.x86_64",
                    &["libfoo.so.1"],
                    &[],
                    &[],
                    &[],
                    &[],
                ),
                full_meta("other-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[]),
            ],
            &[],
        );
        let result = resolver.resolve_remove(&["libfoo".to_owned()], false, false);
        assert!(result.success, "{:?}", result.problems);
        assert_eq!(result.actions.len(), 2);
        // Dependent goes first
        assert_eq!(result.actions[0].name, "app");
        assert_eq!(result.actions[0].reason, Reason::Dependency);
        assert_eq!(result.actions[1].name, "libfoo");
        assert_eq!(result.actions[1].reason, Reason::Explicit);
    }

    #[test]
    fn remove_blocked_by_held_dependent() {
        let (mut resolver, _dir) = resolver(
            vec![],
            vec![
                full_meta(
                    "libfoo-1.0-1.mga10.x86_64",
                    &[],
                    &["libfoo.so.1"],
                    &[],
                    &[],
                    &[],
                ),
                full_meta(
                    "app-1.0-1.mga10.x86_64",
                    &["libfoo.so.1"],
                    &[],
                    &[],
                    &[],
                    &[],
                ),
            ],
            &["app"],
        );
        let result = resolver.resolve_remove(&["libfoo".to_owned()], false, false);
        assert!(!result.success);
        assert!(result.problems[0].contains("app"));
    }

    #[test]
    fn erase_recommends_honours_keep_suggests() {
        let mut app = full_meta("app-1.0-1.mga10.x86_64", &[], &[], &["docs"], &[], &[]);
        app.suggests = vec!["extras".parse().unwrap()];
        let docs = full_meta("docs-1.0-1.mga10.noarch", &[], &[], &[], &[], &[]);
        let extras = full_meta("extras-1.0-1.mga10.noarch", &[], &[], &[], &[], &[]);

        let plan_with = |keep_suggests: bool| {
            let (mut r, dir) = resolver(
                vec![],
                vec![app.clone(), docs.clone(), extras.clone()],
                &[],
            );
            r.mark_as_dependency(&["docs".to_owned(), "extras".to_owned()])
                .unwrap();
            let plan = r.resolve_remove(&["app".to_owned()], true, keep_suggests);
            (plan, dir)
        };

        let (plan, _d1) = plan_with(false);
        assert!(plan.success, "{:?}", plan.problems);
        let names: Vec<&str> = plan.actions.iter().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"docs"), "recommends-only orphan removed");
        assert!(names.contains(&"extras"), "suggests-only orphan removed");

        let (plan, _d2) = plan_with(true);
        let names: Vec<&str> = plan.actions.iter().map(|a| a.name.as_str()).collect();
        assert!(names.contains(&"docs"));
        assert!(
            !names.contains(&"extras"),
            "keep_suggests spares suggests-only orphans"
        );
    }

    #[test]
    fn local_rpm_downgrade_detection() {
        let dir = tempfile::tempdir().unwrap();
        let reasons = ReasonFile::new(dir.path().join("deps.list"));
        let mut pool = Pool::new(
            vec![record(full_meta(
                "foo-3.0-1.mga10.x86_64",
                &[],
                &[],
                &[],
                &[],
                &[],
            ))],
            &[],
        );
        pool.add_local_rpm(
            full_meta("foo-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[]),
            std::path::PathBuf::from("/tmp/foo-1.0-1.mga10.x86_64.rpm"),
        );
        let mut resolver = Resolver::new(pool, Installed::new(vec![]), HashSet::new(), reasons);

        let result = resolver.resolve_install(&["foo".to_owned()], None);
        assert!(result.success);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(
            result.actions[0].action,
            ActionKind::Downgrade,
            "local payload older than the media candidate"
        );
        assert_eq!(result.actions[0].media_name, LOCAL_MEDIA);
    }

    #[test]
    fn upgrade_with_older_local_payload_downgrades() {
        let dir = tempfile::tempdir().unwrap();
        let reasons = ReasonFile::new(dir.path().join("deps.list"));
        let mut pool = Pool::new(vec![], &[]);
        pool.add_local_rpm(
            full_meta("foo-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[]),
            std::path::PathBuf::from("/tmp/foo-1.0-1.mga10.x86_64.rpm"),
        );
        let mut resolver = Resolver::new(
            pool,
            Installed::new(vec![full_meta("foo-2.0-1.mga10.x86_64", &[], &[], &[], &[], &[])]),
            HashSet::new(),
            reasons,
        );

        let result = resolver.resolve_upgrade(Some(&["foo".to_owned()]));
        assert!(result.success, "{:?}", result.problems);
        assert_eq!(result.actions.len(), 1);
        assert_eq!(result.actions[0].action, ActionKind::Downgrade);
        assert_eq!(
            result.actions[0].previous_nevra.as_deref(),
            Some("foo-2.0-1.mga10.x86_64")
        );
        assert_eq!(result.actions[0].media_name, LOCAL_MEDIA);
    }

    #[test]
    fn cyclic_requires_tolerated() {
        let (mut resolver, _dir) = resolver(
            vec![
                full_meta("a-1.0-1.mga10.x86_64", &["b"], &[], &[], &[], &[]),
                full_meta("b-1.0-1.mga10.x86_64", &["a"], &[], &[], &[], &[]),
            ],
            vec![],
            &[],
        );
        let result = resolver.resolve_install(&["a".to_owned()], None);
        assert!(result.success, "{:?}", result.problems);
        assert_eq!(result.actions.len(), 2);
    }

    #[test]
    fn upgrade_via_obsoleter() {
        let (mut resolver, _dir) = resolver(
            vec![full_meta(
                "newfs-2.0-1.mga10.x86_64",
                &[],
                &[],
                &[],
                &["oldfs < 2.0"],
                &[],
            )],
            vec![full_meta("oldfs-1.0-1.mga10.x86_64", &[], &[], &[], &[], &[])],
            &[],
        );
        let result = resolver.resolve_upgrade(None);
        assert!(result.success);
        assert_eq!(result.actions.len(), 2);
        assert!(result
            .actions
            .iter()
            .any(|a| a.name == "newfs" && a.action == ActionKind::Install));
        assert!(result
            .actions
            .iter()
            .any(|a| a.name == "oldfs"
                && a.action == ActionKind::Remove
                && a.reason == Reason::Obsoleted));
    }

    #[test]
    fn deterministic_plans() {
        let pool = vec![
            full_meta("app-1.0-1.mga10.x86_64", &["lib"], &[], &[], &[], &[]),
            full_meta("libz-1.0-1.mga10.x86_64", &[], &["lib"], &[], &[], &[]),
            full_meta("liba-1.0-1.mga10.x86_64", &[], &["lib"], &[], &[], &[]),
        ];
        let mut plans = Vec::new();
        for _ in 0..3 {
            let (mut r, _d) = resolver(pool.clone(), vec![], &[]);
            let result = r.resolve_install(&["app".to_owned()], None);
            let names: Vec<String> =
                result.actions.iter().map(|a| a.name.clone()).collect();
            plans.push((result.success, names));
        }
        assert_eq!(plans[0], plans[1]);
        assert_eq!(plans[1], plans[2]);
        // Name tiebreak picks liba over libz
        assert!(plans[0].1.contains(&"liba".to_owned()));
    }
}
