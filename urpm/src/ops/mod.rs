// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Operations façade
//!
//! Composes store, resolver, download coordinator and transaction queue
//! into whole user intents, and records every mutation in history. All
//! transports (CLI today, IPC later) funnel through here so the auth gate
//! and the audit trail sit in exactly one place.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use itertools::Itertools;
use log::{debug, warn};
use thiserror::Error;

use crate::auth::{AuditLog, AuthContext, AuthError, Permission};
use crate::db::history::{self, TransactionPackage};
use crate::db::Database;
use crate::download::{
    Availability, Coordinator, DownloadItem, DownloadResult, Downloader, DownloaderOptions,
    PeerClient, ProgressUpdate,
};
use crate::installation::Installation;
use crate::queue::{InstallOptions, QueueResult, TransactionQueue};
use crate::resolver::{ActionKind, PackageAction, Reason, ReasonFile, Resolver, LOCAL_MEDIA};
use crate::rpmdb::Rpmdb;
use crate::{environment, resolver};

/// Façade-level knobs; transport layers map their flags onto this
#[derive(Debug, Clone)]
pub struct Settings {
    pub verify_signatures: bool,
    pub force: bool,
    pub test: bool,
    pub reinstall: bool,
    pub noscripts: bool,
    pub use_peers: bool,
    pub only_peers: bool,
    /// Wait for the child and its scriptlets instead of early release
    pub sync: bool,
    pub max_workers: usize,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            verify_signatures: true,
            force: false,
            test: false,
            reinstall: false,
            noscripts: false,
            use_peers: true,
            only_peers: false,
            sync: false,
            max_workers: environment::MAX_DOWNLOAD_WORKERS,
            timeout: Duration::from_secs(environment::CONNECT_TIMEOUT_SECS),
            max_retries: environment::MAX_RETRIES,
        }
    }
}

/// Aggregate outcome of one download run
#[derive(Debug, Default)]
pub struct DownloadOutcome {
    pub results: Vec<DownloadResult>,
    pub downloaded: usize,
    pub cached: usize,
    pub from_peers: u64,
    pub from_upstream: u64,
}

impl DownloadOutcome {
    pub fn missing(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.item.filename())
            .collect()
    }
}

pub struct Operations {
    db: Database,
    installation: Installation,
    context: AuthContext,
    audit: AuditLog,
}

impl Operations {
    pub fn new(db: Database, installation: Installation, context: AuthContext) -> Self {
        let audit = AuditLog::new(installation.audit_log_path());
        Self {
            db,
            installation,
            context,
            audit,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn installation(&self) -> &Installation {
        &self.installation
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn context(&self) -> &AuthContext {
        &self.context
    }

    /// Gate a mutating verb; denials are audited
    pub fn authorize(&self, permission: Permission) -> Result<(), AuthError> {
        match self.context.require(permission) {
            Ok(()) => Ok(()),
            Err(denied) => {
                self.audit.auth_denied(&self.context, permission.label());
                Err(denied)
            }
        }
    }

    /// Assemble a resolver over the current installed set and the pool of
    /// every enabled media
    pub async fn make_resolver(&self) -> Result<Resolver, Error> {
        let records = self.db.load_pool().await?;
        let pins = self.db.list_pins().await?;
        let held = self.db.held_names().await?;
        let installed = Rpmdb::new(&self.installation.root).query_installed()?;

        Ok(Resolver::new(
            resolver::Pool::new(records, &pins),
            resolver::Installed::new(installed),
            held,
            ReasonFile::new(self.installation.deps_list_path()),
        ))
    }

    /// Split a plan into remote downloads and local file installs
    pub async fn build_download_items(
        &self,
        actions: &[PackageAction],
        resolver: &Resolver,
    ) -> Result<(Vec<DownloadItem>, Vec<PathBuf>), Error> {
        let mut items = Vec::new();
        let mut local_paths = Vec::new();
        let mut media_cache: HashMap<String, Option<crate::db::media::Media>> = HashMap::new();
        let mut servers_cache: HashMap<i64, Vec<crate::db::server::Server>> = HashMap::new();

        for action in actions {
            if action.action == ActionKind::Remove {
                continue;
            }

            if action.media_name == LOCAL_MEDIA {
                let path = resolver
                    .pool()
                    .by_name(&action.name)
                    .into_iter()
                    .find_map(|i| resolver.pool().get(i).local_path.clone());
                match path {
                    Some(path) => local_paths.push(path),
                    None => warn!("local package {} has no payload path", action.name),
                }
                continue;
            }

            if !media_cache.contains_key(&action.media_name) {
                let media = self.db.get_media(&action.media_name).await?;
                if let Some(media) = &media {
                    let servers = self.db.get_servers_for_media(media.id, true).await?;
                    servers_cache.insert(media.id, servers);
                }
                media_cache.insert(action.media_name.clone(), media);
            }
            let Some(Some(media)) = media_cache.get(&action.media_name) else {
                warn!("media '{}' not found", action.media_name);
                continue;
            };

            // EVR without the epoch: filenames never carry it
            let evr = action.evr.split_once(':').map(|(_, v)| v).unwrap_or(&action.evr);
            let (version, release) = evr
                .rsplit_once('-')
                .map(|(v, r)| (v.to_owned(), r.to_owned()))
                .unwrap_or_else(|| (evr.to_owned(), "1".to_owned()));

            items.push(DownloadItem {
                name: action.name.clone(),
                version,
                release,
                arch: action.arch.clone(),
                media_id: media.id,
                media_name: media.name.clone(),
                relative_path: media.relative_path.clone(),
                is_official: media.is_official,
                servers: servers_cache.get(&media.id).cloned().unwrap_or_default(),
                size: if action.filesize > 0 {
                    action.filesize
                } else {
                    action.size
                },
            });
        }

        Ok((items, local_paths))
    }

    /// Fetch everything into the cache; peers preferred, provenance and
    /// auto-blacklisting recorded afterwards on this thread
    pub async fn download_packages(
        &self,
        items: Vec<DownloadItem>,
        settings: &Settings,
        progress: Option<&(dyn Fn(ProgressUpdate<'_>) + Sync)>,
    ) -> Result<DownloadOutcome, Error> {
        if items.is_empty() {
            return Ok(DownloadOutcome::default());
        }

        let downloader = Downloader::new(
            self.installation.cache_dir(),
            DownloaderOptions {
                max_workers: settings.max_workers,
                use_peers: settings.use_peers,
                only_peers: settings.only_peers,
                timeout: settings.timeout,
                max_retries: settings.max_retries,
                target_version: None,
                target_arch: None,
            },
        );

        // Peer discovery + availability, skipping blacklisted peers. The
        // blocking HTTP client lives on helper threads; this thread drives
        // the store.
        let mut availability = Availability::new();
        if downloader.options.use_peers {
            let mut peers = std::thread::spawn(|| PeerClient::default().discover_peers())
                .join()
                .unwrap_or_default();
            let before = peers.len();
            let mut kept = Vec::new();
            for peer in peers.drain(..) {
                if !self.db.is_peer_blacklisted(&peer.host, peer.port).await? {
                    kept.push(peer);
                }
            }
            if kept.len() < before {
                debug!("filtered {} blacklisted peers", before - kept.len());
            }
            if !kept.is_empty() {
                let filenames: Vec<String> = items.iter().map(DownloadItem::filename).collect();
                availability = std::thread::spawn(move || {
                    PeerClient::default().query_peers_have(&kept, &filenames)
                })
                .join()
                .unwrap_or_default();
            }
        }

        let coordinator = Coordinator::new(&downloader, availability);
        let (results, stats) = coordinator.download_all(items, progress);

        // Store writes stay on this thread
        for blacklist in &stats.pending_blacklist {
            self.db
                .blacklist_peer(&blacklist.host, Some(blacklist.port), Some(&blacklist.reason))
                .await?;
            warn!(
                "auto-blacklisted peer {}:{} - {}",
                blacklist.host, blacklist.port, blacklist.reason
            );
        }

        let mut downloaded = 0;
        let mut cached = 0;
        for result in &results {
            if result.cached {
                cached += 1;
            } else if result.success {
                downloaded += 1;
            }
            if let (true, Some(path), Some(provenance)) =
                (result.success, &result.path, &result.peer_info)
            {
                let relative = path
                    .strip_prefix(self.installation.cache_dir().join("medias"))
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_else(|_| path.to_string_lossy().into_owned());
                self.db
                    .record_peer_download(
                        &result.item.filename(),
                        &relative,
                        &provenance.peer_host,
                        provenance.peer_port,
                        provenance.file_size as i64,
                        &provenance.checksum_sha256,
                        provenance.verified,
                    )
                    .await?;
            }
            if result.success && !result.cached {
                self.db
                    .register_cache_file(
                        &result.item.filename(),
                        result.item.media_id,
                        &result
                            .path
                            .as_ref()
                            .map(|p| p.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        result.item.size as i64,
                    )
                    .await?;
            }
        }

        if downloaded > 0 {
            notify_daemon_cache_invalidate();
        }

        Ok(DownloadOutcome {
            results,
            downloaded,
            cached,
            from_peers: stats.from_peers,
            from_upstream: stats.from_upstream,
        })
    }

    /// Build and run the install queue: the plan's payloads, coupled
    /// erases for obsoleted packages, and orphan cleanup trailing in the
    /// background
    pub fn execute_install(
        &self,
        rpm_paths: Vec<PathBuf>,
        erase_names: Vec<String>,
        orphan_names: Vec<String>,
        settings: &Settings,
        progress: Option<crate::queue::ProgressFn<'_>>,
    ) -> Result<QueueResult, Error> {
        let mut queue = TransactionQueue::new(self.installation.clone());
        queue.add_install(
            rpm_paths,
            "install",
            InstallOptions {
                verify_signatures: settings.verify_signatures,
                force: settings.force,
                test: settings.test,
                reinstall: settings.reinstall,
                noscripts: settings.noscripts,
            },
            erase_names,
        );
        if !orphan_names.is_empty() {
            queue.add_erase(orphan_names, "orphan_cleanup", settings.force, settings.test, true);
        }
        if queue.is_empty() {
            return Ok(QueueResult {
                success: true,
                ..Default::default()
            });
        }
        Ok(queue.execute(progress, settings.sync)?)
    }

    pub fn execute_erase(
        &self,
        names: Vec<String>,
        settings: &Settings,
        progress: Option<crate::queue::ProgressFn<'_>>,
    ) -> Result<QueueResult, Error> {
        let mut queue = TransactionQueue::new(self.installation.clone());
        queue.add_erase(names, "erase", settings.force, settings.test, false);
        if queue.is_empty() {
            return Ok(QueueResult {
                success: true,
                ..Default::default()
            });
        }
        Ok(queue.execute(progress, settings.sync)?)
    }

    /// A previous run's background failure, surfaced once at startup
    pub fn pending_background_error(&self) -> Option<String> {
        TransactionQueue::new(self.installation.clone()).take_background_error()
    }

    // -- History -------------------------------------------------------------

    /// Open a history row and record the whole plan against it
    pub async fn begin_transaction(
        &self,
        action: history::Action,
        command: &str,
        actions: &[PackageAction],
    ) -> Result<i64, Error> {
        let id = self
            .db
            .begin_history_transaction(action, Some(command))
            .await?;
        let rows: Vec<TransactionPackage> = actions
            .iter()
            .map(|a| TransactionPackage {
                pkg_nevra: a.nevra.clone(),
                pkg_name: a.name.clone(),
                action: a.action.as_str().to_owned(),
                reason: a.reason.as_str().to_owned(),
                previous_nevra: a.previous_nevra.clone(),
            })
            .collect();
        self.db.record_packages(id, &rows).await?;
        Ok(id)
    }

    pub async fn complete_transaction(&self, id: i64) -> Result<(), Error> {
        Ok(self.db.complete_transaction(id, 0).await?)
    }

    pub async fn abort_transaction(&self, id: i64) -> Result<(), Error> {
        Ok(self.db.abort_transaction(id).await?)
    }

    /// Rebind the installed-reason state to match a completed plan
    pub fn mark_dependencies(&self, resolver: &Resolver, actions: &[PackageAction]) {
        let dependencies: Vec<String> = actions
            .iter()
            .filter(|a| a.reason != Reason::Explicit && a.action != ActionKind::Remove)
            .map(|a| a.name.clone())
            .collect();
        let explicit: Vec<String> = actions
            .iter()
            .filter(|a| a.reason == Reason::Explicit && a.action != ActionKind::Remove)
            .map(|a| a.name.clone())
            .collect();
        if !dependencies.is_empty() {
            if let Err(e) = resolver.mark_as_dependency(&dependencies) {
                warn!("cannot update reason file: {e}");
            }
        }
        if !explicit.is_empty() {
            if let Err(e) = resolver.mark_as_explicit(&explicit) {
                warn!("cannot update reason file: {e}");
            }
        }
    }

    /// The whole install/upgrade data flow: download what the plan needs,
    /// record history, run the queue (coupled erases included, orphan
    /// cleanup trailing in background), then settle history and reasons.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_plan(
        &self,
        resolver: &Resolver,
        plan: &crate::resolver::ResolverResult,
        action: history::Action,
        command: &str,
        orphan_names: Vec<String>,
        settings: &Settings,
        download_progress: Option<&(dyn Fn(ProgressUpdate<'_>) + Sync)>,
        queue_progress: Option<crate::queue::ProgressFn<'_>>,
    ) -> Result<PlanOutcome, Error> {
        let actions = &plan.actions;
        let erase_names: Vec<String> = actions
            .iter()
            .filter(|a| a.action == ActionKind::Remove)
            .map(|a| a.name.clone())
            .collect();

        let (items, local_paths) = self.build_download_items(actions, resolver).await?;
        let download = self.download_packages(items, settings, download_progress).await?;

        let missing = download.missing();
        if !missing.is_empty() {
            // No RPM transaction is attempted with payloads absent
            return Err(Error::MissingPackages(missing));
        }

        let mut rpm_paths: Vec<PathBuf> = download
            .results
            .iter()
            .filter_map(|r| r.path.clone())
            .collect();
        rpm_paths.extend(local_paths);

        let packages: Vec<String> = actions.iter().map(|a| a.name.clone()).collect();
        self.audit
            .operation_start(&self.context, action.as_str(), &packages, command);

        let transaction_id = self.begin_transaction(action, command, actions).await?;

        let queue = self.execute_install(
            rpm_paths,
            erase_names,
            orphan_names,
            settings,
            queue_progress,
        )?;

        let interrupted = matches!(
            crate::signal::interrupt_state(),
            crate::signal::Interrupt::Abort
        );

        if queue.success && !interrupted {
            self.complete_transaction(transaction_id).await?;
            self.mark_dependencies(resolver, actions);
            self.audit
                .operation_complete(&self.context, action.as_str(), &packages, true, None);
        } else {
            // Interrupted runs leave the row `interrupted`; their
            // dependency installs become faildep candidates
            self.abort_transaction(transaction_id).await?;
            let error = if interrupted {
                "interrupted by user".to_owned()
            } else {
                queue
                    .operations
                    .iter()
                    .flat_map(|op| op.errors.iter())
                    .join("; ")
            };
            self.audit.operation_complete(
                &self.context,
                action.as_str(),
                &packages,
                false,
                Some(&error),
            );
        }

        Ok(PlanOutcome {
            transaction_id,
            download,
            queue,
            interrupted,
        })
    }

    /// Removal flow: history row, erase queue, reason-file cleanup
    pub async fn apply_remove(
        &self,
        resolver: &Resolver,
        plan: &crate::resolver::ResolverResult,
        action: history::Action,
        command: &str,
        settings: &Settings,
        queue_progress: Option<crate::queue::ProgressFn<'_>>,
    ) -> Result<PlanOutcome, Error> {
        let names: Vec<String> = plan.actions.iter().map(|a| a.name.clone()).collect();

        self.audit
            .operation_start(&self.context, action.as_str(), &names, command);
        let transaction_id = self.begin_transaction(action, command, &plan.actions).await?;

        let queue = self.execute_erase(names.clone(), settings, queue_progress)?;

        if queue.success {
            self.complete_transaction(transaction_id).await?;
            if let Err(e) = resolver.unmark_packages(&names) {
                warn!("cannot update reason file: {e}");
            }
            self.audit
                .operation_complete(&self.context, action.as_str(), &names, true, None);
        } else {
            self.abort_transaction(transaction_id).await?;
            self.audit.operation_complete(
                &self.context,
                action.as_str(),
                &names,
                false,
                Some(&queue.overall_error),
            );
        }

        Ok(PlanOutcome {
            transaction_id,
            download: DownloadOutcome::default(),
            queue,
            interrupted: false,
        })
    }

    // -- Undo / rollback -----------------------------------------------------

    /// Reverse action set for one completed transaction
    pub async fn plan_undo(&self, transaction_id: i64) -> Result<UndoPlan, Error> {
        let Some((row, packages)) = self.db.get_transaction(transaction_id).await? else {
            return Err(Error::NoSuchTransaction(transaction_id));
        };
        if row.status != "complete" {
            return Err(Error::NotUndoable(transaction_id, row.status));
        }
        if row.undone_by.is_some() {
            return Err(Error::AlreadyUndone(transaction_id));
        }

        let mut plan = UndoPlan {
            transaction_id,
            ..Default::default()
        };
        for package in packages {
            match package.action.as_str() {
                "install" => plan.erase_names.push(package.pkg_name),
                "remove" => plan.install_specs.push(package.pkg_nevra),
                "upgrade" | "downgrade" => match package.previous_nevra {
                    Some(previous) => plan.install_specs.push(previous),
                    None => plan
                        .problems
                        .push(format!("{}: previous version unknown", package.pkg_name)),
                },
                other => plan
                    .problems
                    .push(format!("{}: cannot undo action {other}", package.pkg_name)),
            }
        }
        Ok(plan)
    }

    // -- Faildep cleanup -----------------------------------------------------

    /// Dependency installs stranded by interrupted transactions, grouped
    /// per transaction for `autoremove --faildeps`
    pub async fn faildep_candidates(&self) -> Result<Vec<(i64, Vec<String>)>, Error> {
        let mut out = Vec::new();
        for transaction in self.db.interrupted_transactions().await? {
            let nevras = self.db.faildep_candidates(transaction.id).await?;
            if !nevras.is_empty() {
                out.push((transaction.id, nevras));
            }
        }
        Ok(out)
    }
}

/// Result of applying one resolved plan
#[derive(Debug)]
pub struct PlanOutcome {
    pub transaction_id: i64,
    pub download: DownloadOutcome,
    pub queue: QueueResult,
    /// The user aborted with a double interrupt; history says `interrupted`
    pub interrupted: bool,
}

/// What undoing a transaction requires
#[derive(Debug, Default)]
pub struct UndoPlan {
    pub transaction_id: i64,
    /// Names to erase (they were installed by the transaction)
    pub erase_names: Vec<String>,
    /// NEVRAs to re-obtain and install
    pub install_specs: Vec<String>,
    pub problems: Vec<String>,
}

/// Tell the local daemon its advertised cache is stale; absence of a
/// daemon is not an error. Runs on its own thread so callers inside the
/// runtime never block on the HTTP client.
pub fn notify_daemon_cache_invalidate() {
    let _ = std::thread::spawn(|| {
        let Ok(client) = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
        else {
            return;
        };
        for port in [environment::DAEMON_DEV_PORT, environment::DAEMON_PORT] {
            let _ = client
                .post(format!("http://127.0.0.1:{port}/api/invalidate-cache"))
                .send();
        }
    })
    .join();
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("store: {0}")]
    Database(#[from] crate::db::Error),
    #[error("rpm: {0}")]
    Rpm(#[from] crate::rpmdb::Error),
    #[error("queue: {0}")]
    Queue(#[from] crate::queue::Error),
    #[error("no transaction {0}")]
    NoSuchTransaction(i64),
    #[error("transaction {0} is {1}, only complete transactions can be undone")]
    NotUndoable(i64, String),
    #[error("transaction {0} was already undone")]
    AlreadyUndone(i64),
    #[error("packages could not be downloaded: {}", .0.join(", "))]
    MissingPackages(Vec<String>),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::db::history::Action;
    use crate::evr::Nevra;

    async fn ops() -> (Operations, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::memory().await.unwrap();
        let installation = Installation::open(dir.path());
        (
            Operations::new(db, installation, AuthContext::root_cli()),
            dir,
        )
    }

    fn action(nevra: &str, kind: ActionKind, reason: Reason, previous: Option<&str>) -> PackageAction {
        let parsed = Nevra::parse(nevra).unwrap();
        PackageAction {
            name: parsed.name.clone(),
            nevra: nevra.to_owned(),
            evr: parsed.evr.to_string(),
            arch: parsed.arch.clone(),
            action: kind,
            reason,
            previous_nevra: previous.map(ToOwned::to_owned),
            media_name: "Core".to_owned(),
            filesize: 100,
            size: 400,
        }
    }

    #[tokio::test]
    async fn history_records_full_plan() {
        let (ops, _dir) = ops().await;
        let actions = vec![
            action(
                "wget-1.21-1.mga10.x86_64",
                ActionKind::Install,
                Reason::Explicit,
                None,
            ),
            action(
                "libpsl-0.21-1.mga10.x86_64",
                ActionKind::Install,
                Reason::Dependency,
                None,
            ),
        ];
        let id = ops
            .begin_transaction(Action::Install, "urpm install wget", &actions)
            .await
            .unwrap();
        ops.complete_transaction(id).await.unwrap();

        let (row, packages) = ops.db().get_transaction(id).await.unwrap().unwrap();
        assert_eq!(row.status, "complete");
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].reason, "explicit");
        assert_eq!(packages[1].reason, "dependency");
    }

    #[tokio::test]
    async fn undo_plan_reverses_actions() {
        let (ops, _dir) = ops().await;
        let actions = vec![
            action(
                "new-2.0-1.mga10.x86_64",
                ActionKind::Install,
                Reason::Explicit,
                None,
            ),
            action(
                "up-2.0-1.mga10.x86_64",
                ActionKind::Upgrade,
                Reason::Explicit,
                Some("up-1.0-1.mga10.x86_64"),
            ),
            action(
                "gone-1.0-1.mga10.x86_64",
                ActionKind::Remove,
                Reason::Explicit,
                None,
            ),
        ];
        let id = ops
            .begin_transaction(Action::Install, "cmd", &actions)
            .await
            .unwrap();
        ops.complete_transaction(id).await.unwrap();

        let plan = ops.plan_undo(id).await.unwrap();
        assert_eq!(plan.erase_names, vec!["new"]);
        assert_eq!(
            plan.install_specs,
            vec!["up-1.0-1.mga10.x86_64", "gone-1.0-1.mga10.x86_64"]
        );
        assert!(plan.problems.is_empty());
    }

    #[tokio::test]
    async fn undo_rejects_interrupted_and_undone() {
        let (ops, _dir) = ops().await;
        let id = ops
            .begin_transaction(Action::Install, "cmd", &[])
            .await
            .unwrap();
        ops.abort_transaction(id).await.unwrap();
        assert!(matches!(
            ops.plan_undo(id).await,
            Err(Error::NotUndoable(_, _))
        ));

        let id2 = ops.begin_transaction(Action::Install, "cmd", &[]).await.unwrap();
        ops.complete_transaction(id2).await.unwrap();
        ops.db().mark_undone(id2, id2).await.unwrap();
        assert!(matches!(ops.plan_undo(id2).await, Err(Error::AlreadyUndone(_))));
    }

    #[tokio::test]
    async fn authorization_gate_audits_denials() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::memory().await.unwrap();
        let installation = Installation::open(dir.path());
        let ops = Operations::new(db, installation, AuthContext::user_cli());

        assert!(ops.authorize(Permission::QUERY).is_ok());
        assert!(ops.authorize(Permission::INSTALL).is_err());

        let audit = std::fs::read_to_string(dir.path().join("var/log/urpm/audit.log")).unwrap();
        assert!(audit.contains("auth_denied"));
        assert!(audit.contains("install"));
    }

    #[tokio::test]
    async fn faildeps_grouped_per_transaction() {
        let (ops, _dir) = ops().await;
        let actions = vec![
            action(
                "app-1.0-1.mga10.x86_64",
                ActionKind::Install,
                Reason::Explicit,
                None,
            ),
            action(
                "libdep-1.0-1.mga10.x86_64",
                ActionKind::Install,
                Reason::Dependency,
                None,
            ),
        ];
        let id = ops.begin_transaction(Action::Install, "cmd", &actions).await.unwrap();
        ops.abort_transaction(id).await.unwrap();

        let faildeps = ops.faildep_candidates().await.unwrap();
        assert_eq!(faildeps.len(), 1);
        assert_eq!(faildeps[0].0, id);
        assert_eq!(faildeps[0].1, vec!["libdep-1.0-1.mga10.x86_64"]);
    }
}
