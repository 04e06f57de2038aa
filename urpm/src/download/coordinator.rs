// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Queue-based parallel download coordination
//!
//! A fixed set of worker slots drains a shared work queue. Peer failures
//! propagate immediately through a shared set so later items assigned to a
//! dead peer get rerouted, to an alternative peer when one advertises the
//! file, otherwise upstream. Blacklist writes are deferred to the caller's
//! thread; workers never touch the store.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use log::{debug, warn};

use super::peer::{Assignment, Availability, Peer};
use super::{DownloadItem, DownloadResult, Downloader, PeerToBlacklist};

/// Live progress of one worker slot
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    pub name: String,
    pub bytes_done: u64,
    pub bytes_total: u64,
    /// Server name or `peer@host`
    pub source: String,
    pub started: Instant,
    samples: VecDeque<(Instant, u64)>,
}

impl DownloadProgress {
    fn new(name: String, bytes_total: u64, source: String) -> Self {
        Self {
            name,
            bytes_done: 0,
            bytes_total,
            source,
            started: Instant::now(),
            samples: VecDeque::new(),
        }
    }

    fn add_sample(&mut self, bytes_done: u64) {
        self.bytes_done = bytes_done;
        self.samples.push_back((Instant::now(), bytes_done));
        // Rolling window for the speed estimate
        while self.samples.len() > 10 {
            self.samples.pop_front();
        }
    }

    /// Bytes per second over the rolling sample window
    pub fn speed(&self) -> f64 {
        let (Some(&(oldest_time, oldest_bytes)), Some(&(newest_time, newest_bytes))) =
            (self.samples.front(), self.samples.back())
        else {
            return 0.0;
        };
        let elapsed = newest_time.duration_since(oldest_time).as_secs_f64();
        if elapsed <= 0.0 || newest_bytes <= oldest_bytes {
            return 0.0;
        }
        (newest_bytes - oldest_bytes) as f64 / elapsed
    }
}

/// Per-slot view handed to the progress callback; `None` slots are idle
pub type SlotState = (usize, Option<DownloadProgress>);

/// One tick of overall progress
#[derive(Debug)]
pub struct ProgressUpdate<'a> {
    pub current_name: &'a str,
    pub completed: usize,
    pub total: usize,
    pub bytes_done: u64,
    pub bytes_total: u64,
    pub item_bytes: u64,
    pub item_total: u64,
    pub slots: &'a [SlotState],
}

#[derive(Debug, Default)]
pub struct Stats {
    pub from_peers: u64,
    pub from_upstream: u64,
    pub failed_peers: Vec<(String, u16)>,
    pub pending_blacklist: Vec<PeerToBlacklist>,
}

pub struct Coordinator<'a> {
    downloader: &'a Downloader,
    max_workers: usize,
    availability: Availability,
    failed_peers: Mutex<HashSet<(String, u16)>>,
    pending_blacklist: Mutex<Vec<PeerToBlacklist>>,
    slots: Mutex<HashMap<usize, DownloadProgress>>,
    counters: Mutex<(u64, u64)>,
}

impl<'a> Coordinator<'a> {
    pub fn new(downloader: &'a Downloader, availability: Availability) -> Self {
        Self {
            downloader,
            max_workers: downloader.options.max_workers.max(1),
            availability,
            failed_peers: Mutex::new(HashSet::new()),
            pending_blacklist: Mutex::new(Vec::new()),
            slots: Mutex::new(HashMap::new()),
            counters: Mutex::new((0, 0)),
        }
    }

    /// Download every item; results come back as a bag, not in order
    pub fn download_all(
        self,
        items: Vec<DownloadItem>,
        progress: Option<&(dyn Fn(ProgressUpdate<'_>) + Sync)>,
    ) -> (Vec<DownloadResult>, Stats) {
        let total_items = items.len();
        let total_bytes: u64 = items.iter().map(|i| i.size).sum();

        let filenames: Vec<String> = items.iter().map(DownloadItem::filename).collect();
        let plan = super::peer::create_download_plan(&filenames, &self.availability);
        let mut assignments: HashMap<String, Assignment> =
            plan.into_iter().map(|a| (a.filename.clone(), a)).collect();

        let queue: Mutex<VecDeque<(DownloadItem, Option<Assignment>)>> = Mutex::new(
            items
                .into_iter()
                .map(|item| {
                    let assignment = assignments.remove(&item.filename());
                    (item, assignment)
                })
                .collect(),
        );

        let (tx, rx) = mpsc::channel::<DownloadResult>();

        let mut results = Vec::with_capacity(total_items);
        let mut completed_bytes = 0u64;
        let mut last_name = String::new();

        std::thread::scope(|scope| {
            let workers: Vec<_> = (0..self.max_workers)
                .map(|slot| {
                    let tx = tx.clone();
                    let queue = &queue;
                    let this = &self;
                    scope.spawn(move || this.worker(slot, queue, tx))
                })
                .collect();
            drop(tx);

            while results.len() < total_items {
                match rx.recv_timeout(Duration::from_millis(100)) {
                    Ok(result) => {
                        if result.success {
                            completed_bytes += result.item.size;
                        }
                        last_name = result.item.name.clone();
                        results.push(result);
                        self.report(progress, &last_name, results.len(), total_items, completed_bytes, total_bytes);
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        self.report(progress, &last_name, results.len(), total_items, completed_bytes, total_bytes);
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        if results.len() < total_items {
                            warn!(
                                "workers finished early: got {}/{} results",
                                results.len(),
                                total_items
                            );
                        }
                        break;
                    }
                }
            }

            for worker in workers {
                let _ = worker.join();
            }
        });

        let (from_peers, from_upstream) = *self.counters.lock().unwrap();
        let stats = Stats {
            from_peers,
            from_upstream,
            failed_peers: self.failed_peers.into_inner().unwrap().into_iter().collect(),
            pending_blacklist: self.pending_blacklist.into_inner().unwrap(),
        };

        (results, stats)
    }

    fn worker(
        &self,
        slot: usize,
        queue: &Mutex<VecDeque<(DownloadItem, Option<Assignment>)>>,
        results: mpsc::Sender<DownloadResult>,
    ) {
        loop {
            let work = queue.lock().unwrap().pop_front();
            let Some((item, assignment)) = work else {
                break;
            };

            let result = self.download_item(&item, assignment, slot);
            self.clear_slot(slot);

            if result.success && !result.cached {
                let mut counters = self.counters.lock().unwrap();
                if result.from_peer {
                    counters.0 += 1;
                } else {
                    counters.1 += 1;
                }
            }

            if results.send(result).is_err() {
                // Caller stopped consuming; cooperative cancellation
                break;
            }
        }
    }

    fn download_item(
        &self,
        item: &DownloadItem,
        assignment: Option<Assignment>,
        slot: usize,
    ) -> DownloadResult {
        if let Some(path) = self.downloader.cached_path(item) {
            return DownloadResult {
                item: item.clone(),
                success: true,
                path: Some(path),
                error: None,
                cached: true,
                from_peer: false,
                peer_info: None,
                blacklist_peer: None,
            };
        }

        let progress = |done: u64, total: u64| self.update_slot(slot, done, total);

        // Peer leg, with one reroute to an alternative advertiser
        if let Some(assignment) = assignment.filter(Assignment::is_peer) {
            let mut target = Some((
                assignment.peer.clone().expect("peer assignment"),
                assignment.peer_path.clone(),
            ));

            if let Some((peer, _)) = &target {
                if self.is_peer_failed(peer) {
                    debug!("skipping failed peer {} for {}", peer.host, item.filename());
                    target = self.alternative_peer(item, peer);
                }
            }

            let mut attempts = 0;
            while let Some((peer, path)) = target.take() {
                attempts += 1;
                self.start_slot(
                    slot,
                    item.name.clone(),
                    item.size,
                    format!("peer@{}", peer.host),
                );
                let result = self.downloader.download_from_peer(item, &peer, &path, &progress);
                if result.success {
                    return result;
                }
                if let Some(blacklist) = &result.blacklist_peer {
                    self.mark_peer_failed(&peer, &blacklist.reason);
                }
                if attempts >= 2 {
                    break;
                }
                target = self.alternative_peer(item, &peer);
            }

            if self.downloader.only_peers() {
                return DownloadResult {
                    item: item.clone(),
                    success: false,
                    path: None,
                    error: Some("not available from peers (--only-peers mode)".to_owned()),
                    cached: false,
                    from_peer: false,
                    peer_info: None,
                    blacklist_peer: None,
                };
            }
        } else if self.downloader.only_peers() {
            return DownloadResult {
                item: item.clone(),
                success: false,
                path: None,
                error: Some("not available from peers (--only-peers mode)".to_owned()),
                cached: false,
                from_peer: false,
                peer_info: None,
                blacklist_peer: None,
            };
        }

        let on_start =
            |source: &str| self.start_slot(slot, item.name.clone(), item.size, source.to_owned());
        self.downloader.download_one(item, slot, &progress, &on_start)
    }

    fn alternative_peer(&self, item: &DownloadItem, exclude: &Peer) -> Option<(Peer, String)> {
        let failed = self.failed_peers.lock().unwrap();
        self.availability
            .get(&item.filename())?
            .iter()
            .find(|info| {
                info.peer != *exclude && !failed.contains(&info.peer.key())
            })
            .map(|info| (info.peer.clone(), info.path.clone()))
    }

    fn is_peer_failed(&self, peer: &Peer) -> bool {
        self.failed_peers.lock().unwrap().contains(&peer.key())
    }

    fn mark_peer_failed(&self, peer: &Peer, reason: &str) {
        let mut failed = self.failed_peers.lock().unwrap();
        if failed.insert(peer.key()) {
            warn!("peer {}:{} marked as failed: {reason}", peer.host, peer.port);
            self.pending_blacklist.lock().unwrap().push(PeerToBlacklist {
                host: peer.host.clone(),
                port: peer.port,
                reason: reason.to_owned(),
            });
        }
    }

    fn start_slot(&self, slot: usize, name: String, bytes_total: u64, source: String) {
        self.slots
            .lock()
            .unwrap()
            .insert(slot, DownloadProgress::new(name, bytes_total, source));
    }

    fn update_slot(&self, slot: usize, bytes_done: u64, bytes_total: u64) {
        let mut slots = self.slots.lock().unwrap();
        if let Some(progress) = slots.get_mut(&slot) {
            if bytes_total > 0 {
                progress.bytes_total = bytes_total;
            }
            progress.add_sample(bytes_done);
        }
    }

    fn clear_slot(&self, slot: usize) {
        self.slots.lock().unwrap().remove(&slot);
    }

    fn snapshot_slots(&self) -> Vec<SlotState> {
        let slots = self.slots.lock().unwrap();
        (0..self.max_workers)
            .map(|slot| (slot, slots.get(&slot).cloned()))
            .collect()
    }

    fn report(
        &self,
        progress: Option<&(dyn Fn(ProgressUpdate<'_>) + Sync)>,
        last_name: &str,
        completed: usize,
        total: usize,
        completed_bytes: u64,
        total_bytes: u64,
    ) {
        let Some(callback) = progress else {
            return;
        };
        let slots = self.snapshot_slots();
        let active: Vec<&DownloadProgress> =
            slots.iter().filter_map(|(_, p)| p.as_ref()).collect();

        let partial: u64 = active.iter().map(|p| p.bytes_done).sum();
        let (name, item_bytes, item_total) = match active.first() {
            Some(first) => (first.name.as_str(), first.bytes_done, first.bytes_total),
            None => (last_name, 0, 0),
        };

        callback(ProgressUpdate {
            current_name: name,
            completed,
            total,
            bytes_done: completed_bytes + partial,
            bytes_total: total_bytes,
            item_bytes,
            item_total,
            slots: &slots,
        });
    }
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::path::Path;

    use sha2::{Digest, Sha256};

    use super::*;
    use crate::db::server::Server;
    use crate::download::peer::PeerFileInfo;
    use crate::download::DownloaderOptions;
    use crate::environment;

    fn item(name: &str, servers: Vec<Server>) -> DownloadItem {
        DownloadItem {
            name: name.to_owned(),
            version: "1.0".to_owned(),
            release: "1.mga10".to_owned(),
            arch: "x86_64".to_owned(),
            media_id: 1,
            media_name: "Core".to_owned(),
            relative_path: "core".to_owned(),
            is_official: true,
            servers,
            size: 11,
        }
    }

    fn rpm_bytes() -> Vec<u8> {
        let mut bytes = environment::RPM_MAGIC.to_vec();
        bytes.extend_from_slice(b"payload");
        bytes
    }

    fn write_cached(cache: &Path, item: &DownloadItem) {
        let path = cache
            .join("medias/official")
            .join(&item.relative_path)
            .join(item.filename());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, rpm_bytes()).unwrap();
    }

    /// Minimal HTTP server answering every request with `body`
    fn serve(body: Vec<u8>, hits: usize) -> (u16, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            for _ in 0..hits {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let mut buf = [0u8; 2048];
                let _ = stream.read(&mut buf);
                let header = format!(
                    "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                let _ = stream.write_all(header.as_bytes());
                let _ = stream.write_all(&body);
            }
        });
        (port, handle)
    }

    fn peer_on(port: u16) -> Peer {
        Peer {
            host: "127.0.0.1".to_owned(),
            port,
            media: Vec::new(),
        }
    }

    fn availability_for(item: &DownloadItem, peer: &Peer) -> Availability {
        let mut availability = Availability::new();
        availability.insert(
            item.filename(),
            vec![PeerFileInfo {
                filename: item.filename(),
                size: item.size,
                path: format!("official/core/{}", item.filename()),
                peer: peer.clone(),
            }],
        );
        availability
    }

    #[test]
    fn cached_items_bypass_network() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(dir.path(), DownloaderOptions::default());
        let items: Vec<_> = (0..3)
            .map(|i| item(&format!("pkg{i}"), Vec::new()))
            .collect();
        for it in &items {
            write_cached(dir.path(), it);
        }

        let coordinator = Coordinator::new(&downloader, Availability::new());
        let (results, stats) = coordinator.download_all(items, None);

        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.success && r.cached));
        assert_eq!(stats.from_peers + stats.from_upstream, 0);
        assert!(
            results.iter().all(|r| r.peer_info.is_none()),
            "cache hits write no provenance"
        );
    }

    #[test]
    fn peer_download_records_provenance() {
        let dir = tempfile::tempdir().unwrap();
        let body = rpm_bytes();
        let digest = hex::encode(Sha256::digest(&body));
        let (port, server) = serve(body, 1);

        let downloader = Downloader::new(dir.path(), DownloaderOptions::default());
        let it = item("wget", Vec::new());
        let peer = peer_on(port);
        let coordinator = Coordinator::new(&downloader, availability_for(&it, &peer));

        let (results, stats) = coordinator.download_all(vec![it], None);
        server.join().unwrap();

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.success, "{:?}", result.error);
        assert!(result.from_peer);
        let provenance = result.peer_info.as_ref().unwrap();
        assert_eq!(provenance.checksum_sha256, digest);
        assert_eq!(provenance.peer_port, port);
        assert_eq!(stats.from_peers, 1);
        assert_eq!(stats.from_upstream, 0);

        // File landed at its final path with valid magic
        let path = result.path.as_ref().unwrap();
        assert!(crate::download::check_rpm_magic(path).is_ok());
    }

    #[test]
    fn garbage_peer_is_failed_and_blacklisted() {
        let dir = tempfile::tempdir().unwrap();
        let (port, server) = serve(vec![0, 0, 0, 0], 1);

        let downloader = Downloader::new(dir.path(), DownloaderOptions::default());
        let it = item("wget", Vec::new());
        let peer = peer_on(port);
        let coordinator = Coordinator::new(&downloader, availability_for(&it, &peer));

        let (results, stats) = coordinator.download_all(vec![it.clone()], None);
        server.join().unwrap();

        assert_eq!(results.len(), 1);
        assert!(!results[0].success, "no upstream servers to fall back to");

        assert_eq!(stats.failed_peers, vec![("127.0.0.1".to_owned(), port)]);
        assert_eq!(stats.pending_blacklist.len(), 1);
        assert!(stats.pending_blacklist[0].reason.contains("invalid file"));

        // Neither a partial payload nor the tmp file survives
        let downloader = Downloader::new(dir.path(), DownloaderOptions::default());
        let final_path = downloader.cache_path(&it);
        assert!(!final_path.exists());
        assert!(!final_path.with_extension("tmp").exists());
    }

    #[test]
    fn failed_peer_reroutes_to_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let (bad_port, bad_server) = serve(vec![1, 2, 3, 4], 1);
        let (good_port, good_server) = serve(rpm_bytes(), 1);

        let mirror = Server {
            id: 1,
            name: "mirror".to_owned(),
            protocol: "http".to_owned(),
            host: format!("127.0.0.1:{good_port}"),
            base_path: String::new(),
            is_official: true,
            enabled: true,
            priority: 100,
            ip_mode: "auto".to_owned(),
        };

        let downloader = Downloader::new(dir.path(), DownloaderOptions::default());
        let it = item("wget", vec![mirror]);
        let peer = peer_on(bad_port);
        let coordinator = Coordinator::new(&downloader, availability_for(&it, &peer));

        let (results, stats) = coordinator.download_all(vec![it], None);
        bad_server.join().unwrap();
        good_server.join().unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].success, "{:?}", results[0].error);
        assert!(!results[0].from_peer);
        assert_eq!(stats.from_upstream, 1);
        assert_eq!(stats.failed_peers.len(), 1);
    }

    #[test]
    fn only_peers_mode_fails_without_peers() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(
            dir.path(),
            DownloaderOptions {
                only_peers: true,
                ..Default::default()
            },
        );
        let coordinator = Coordinator::new(&downloader, Availability::new());
        let (results, _) = coordinator.download_all(vec![item("wget", Vec::new())], None);
        assert!(!results[0].success);
        assert!(results[0].error.as_ref().unwrap().contains("only-peers"));
    }

    #[test]
    fn speed_from_rolling_window() {
        let mut progress = DownloadProgress::new("x".into(), 100, "srv".into());
        progress.add_sample(0);
        std::thread::sleep(Duration::from_millis(20));
        progress.add_sample(1000);
        assert!(progress.speed() > 0.0);
    }
}
