// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Multi-source package downloads
//!
//! Obtains RPMs into the local cache from upstream mirrors and LAN peers.
//! Every payload is written to a `.tmp` sibling first and renamed only
//! once complete, and nothing with bad magic bytes survives on disk.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, warn};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::server::Server;
use crate::environment;
use crate::request::IpMode;

pub use self::coordinator::{Coordinator, DownloadProgress, ProgressUpdate, SlotState, Stats};
pub use self::peer::{
    create_download_plan, Assignment, Availability, Peer, PeerClient, PeerFileInfo,
};

pub mod coordinator;
pub mod peer;

/// One RPM to obtain
#[derive(Debug, Clone)]
pub struct DownloadItem {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub media_id: i64,
    pub media_name: String,
    /// Path fragment between a server's base url and the filename
    pub relative_path: String,
    pub is_official: bool,
    /// Servers able to serve this media, best first
    pub servers: Vec<Server>,
    pub size: u64,
}

impl DownloadItem {
    pub fn filename(&self) -> String {
        format!(
            "{}-{}-{}.{}.rpm",
            self.name, self.version, self.release, self.arch
        )
    }
}

/// Provenance of a peer-served payload
#[derive(Debug, Clone)]
pub struct PeerProvenance {
    pub peer_host: String,
    pub peer_port: u16,
    pub checksum_sha256: String,
    pub file_size: u64,
    pub verified: bool,
}

/// Deferred blacklist entry; SQLite writes stay on the caller's thread
#[derive(Debug, Clone)]
pub struct PeerToBlacklist {
    pub host: String,
    pub port: u16,
    pub reason: String,
}

#[derive(Debug)]
pub struct DownloadResult {
    pub item: DownloadItem,
    pub success: bool,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
    pub cached: bool,
    pub from_peer: bool,
    pub peer_info: Option<PeerProvenance>,
    pub blacklist_peer: Option<PeerToBlacklist>,
}

impl DownloadResult {
    fn ok(item: DownloadItem, path: PathBuf) -> Self {
        Self {
            item,
            success: true,
            path: Some(path),
            error: None,
            cached: false,
            from_peer: false,
            peer_info: None,
            blacklist_peer: None,
        }
    }

    fn cached(item: DownloadItem, path: PathBuf) -> Self {
        Self {
            cached: true,
            ..Self::ok(item, path)
        }
    }

    fn failed(item: DownloadItem, error: String) -> Self {
        Self {
            item,
            success: false,
            path: None,
            error: Some(error),
            cached: false,
            from_peer: false,
            peer_info: None,
            blacklist_peer: None,
        }
    }
}

/// Validate the four leading magic bytes of an RPM payload
pub fn check_rpm_magic(path: &Path) -> Result<(), MagicError> {
    let mut file = fs::File::open(path).map_err(|e| MagicError::Unreadable(e.to_string()))?;
    let mut magic = [0u8; 4];
    let read = file
        .read(&mut magic)
        .map_err(|e| MagicError::Unreadable(e.to_string()))?;
    if read < 4 {
        return Err(MagicError::TooSmall);
    }
    if magic != environment::RPM_MAGIC {
        // Identify the common impostors for a better diagnostic
        let mut start = [0u8; 100];
        let _ = file.read(&mut start);
        let text = String::from_utf8_lossy(&start).to_lowercase();
        if text.contains("<!doctype") || text.contains("<html") {
            return Err(MagicError::Html);
        }
        if magic.starts_with(b"<?") {
            return Err(MagicError::Xml);
        }
        return Err(MagicError::BadMagic(hex::encode(magic)));
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MagicError {
    #[error("file too small (< 4 bytes)")]
    TooSmall,
    #[error("file is HTML (captive portal?)")]
    Html,
    #[error("file is XML")]
    Xml,
    #[error("invalid RPM magic (got {0})")]
    BadMagic(String),
    #[error("cannot read file: {0}")]
    Unreadable(String),
}

#[derive(Debug, Clone)]
pub struct DownloaderOptions {
    pub max_workers: usize,
    pub use_peers: bool,
    pub only_peers: bool,
    pub timeout: Duration,
    pub max_retries: usize,
    pub target_version: Option<String>,
    pub target_arch: Option<String>,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            max_workers: environment::MAX_DOWNLOAD_WORKERS,
            use_peers: true,
            only_peers: false,
            timeout: Duration::from_secs(environment::CONNECT_TIMEOUT_SECS),
            max_retries: environment::MAX_RETRIES,
            target_version: None,
            target_arch: None,
        }
    }
}

/// Download manager for RPM packages
#[derive(Debug)]
pub struct Downloader {
    cache_dir: PathBuf,
    pub options: DownloaderOptions,
}

impl Downloader {
    pub fn new(cache_dir: impl Into<PathBuf>, mut options: DownloaderOptions) -> Self {
        // only-peers implies peers
        options.use_peers |= options.only_peers;
        Self {
            cache_dir: cache_dir.into(),
            options,
        }
    }

    pub fn only_peers(&self) -> bool {
        self.options.only_peers
    }

    /// Final path for an item:
    /// `medias/official/<relative_path>/` or `medias/custom/<short name>/`
    pub fn cache_path(&self, item: &DownloadItem) -> PathBuf {
        let dir = if item.is_official {
            self.cache_dir.join("medias/official").join(&item.relative_path)
        } else {
            self.cache_dir.join("medias/custom").join(&item.media_name)
        };
        dir.join(item.filename())
    }

    /// A valid cached copy short-circuits every download mode. The old
    /// `medias/<hostname>/<media>/` layout is still honoured for reads.
    pub fn cached_path(&self, item: &DownloadItem) -> Option<PathBuf> {
        let primary = self.cache_path(item);
        if file_is_valid_rpm(&primary) {
            return Some(primary);
        }
        self.legacy_cached_path(item)
    }

    fn legacy_cached_path(&self, item: &DownloadItem) -> Option<PathBuf> {
        let medias = self.cache_dir.join("medias");
        let entries = fs::read_dir(&medias).ok()?;
        for entry in entries.flatten() {
            let hostdir = entry.path();
            if !hostdir.is_dir() {
                continue;
            }
            let candidate = hostdir.join(&item.media_name).join(item.filename());
            if file_is_valid_rpm(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    /// Download a single package with multi-server failover.
    ///
    /// Servers are tried in priority order, starting at `slot % servers` so
    /// concurrent workers pre-balance across mirrors. Transient errors
    /// retry with a linear backoff; HTTP errors skip straight to the next
    /// server.
    pub fn download_one(
        &self,
        item: &DownloadItem,
        worker_slot: usize,
        progress: &dyn Fn(u64, u64),
        on_start: &dyn Fn(&str),
    ) -> DownloadResult {
        if let Some(path) = self.cached_path(item) {
            return DownloadResult::cached(item.clone(), path);
        }
        if item.servers.is_empty() {
            return DownloadResult::failed(
                item.clone(),
                "no servers configured for this media".to_owned(),
            );
        }

        let cache_path = self.cache_path(item);
        let mut servers: Vec<&Server> = item.servers.iter().collect();
        if servers.len() > 1 {
            let len = servers.len();
            servers.rotate_left(worker_slot % len);
        }

        let mut errors: Vec<String> = Vec::new();
        for server in servers {
            let url = format!(
                "{}/{}/{}",
                server.base_url(),
                item.relative_path,
                item.filename()
            );
            debug!("trying server {} (ip_mode={}): {url}", server.name, server.ip_mode);
            on_start(&server.name);

            for attempt in 0..self.options.max_retries {
                match self.fetch_to_cache(&url, &cache_path, server.ip_mode(), progress, None) {
                    Ok(_) => match check_rpm_magic(&cache_path) {
                        Ok(()) => {
                            return DownloadResult::ok(item.clone(), cache_path);
                        }
                        Err(magic) => {
                            warn!("downloaded file is not a valid RPM: {magic}");
                            let _ = fs::remove_file(&cache_path);
                            errors.push(format!("{}: {magic}", server.name));
                            break;
                        }
                    },
                    Err(FetchError::Http(status)) => {
                        // Permanent on this server, move on
                        errors.push(format!("{}: HTTP {status}", server.name));
                        break;
                    }
                    Err(e) => {
                        errors.push(format!("{}: {e}", server.name));
                        if attempt + 1 < self.options.max_retries {
                            std::thread::sleep(Duration::from_secs(attempt as u64 + 1));
                        }
                    }
                }
            }
        }

        let tail = errors
            .iter()
            .rev()
            .take(3)
            .rev()
            .cloned()
            .collect::<Vec<_>>()
            .join("; ");
        DownloadResult::failed(item.clone(), format!("all servers failed: {tail}"))
    }

    /// Download from a peer, hashing the stream for provenance. Anything
    /// that is not an RPM fails the attempt and flags the peer.
    pub fn download_from_peer(
        &self,
        item: &DownloadItem,
        peer: &Peer,
        peer_path: &str,
        progress: &dyn Fn(u64, u64),
    ) -> DownloadResult {
        let cache_path = self.cache_path(item);
        let encoded: String = url_encode_path(peer_path);
        let url = format!("{}/media/{encoded}", peer.base_url());

        let mut hasher = Sha256::new();
        let downloaded =
            match self.fetch_to_cache(&url, &cache_path, IpMode::Auto, progress, Some(&mut hasher))
            {
                Ok(bytes) => bytes,
                Err(e) => {
                    return DownloadResult::failed(
                        item.clone(),
                        format!("peer download failed: {e}"),
                    );
                }
            };

        if let Err(magic) = check_rpm_magic(&cache_path) {
            warn!("peer {} served invalid RPM: {magic}", peer.host);
            let _ = fs::remove_file(&cache_path);
            let mut result =
                DownloadResult::failed(item.clone(), format!("peer served invalid file: {magic}"));
            result.blacklist_peer = Some(PeerToBlacklist {
                host: peer.host.clone(),
                port: peer.port,
                reason: format!("served invalid file: {magic}"),
            });
            return result;
        }

        let mut result = DownloadResult::ok(item.clone(), cache_path);
        result.from_peer = true;
        result.peer_info = Some(PeerProvenance {
            peer_host: peer.host.clone(),
            peer_port: peer.port,
            checksum_sha256: hex::encode(hasher.finalize()),
            file_size: downloaded,
            // Signature checking happens at install time
            verified: false,
        });
        result
    }

    /// Stream a URL into `dest` via a `.tmp` sibling, atomically renamed
    fn fetch_to_cache(
        &self,
        url: &str,
        dest: &Path,
        ip_mode: IpMode,
        progress: &dyn Fn(u64, u64),
        mut hasher: Option<&mut Sha256>,
    ) -> Result<u64, FetchError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| FetchError::Io(e.to_string()))?;
        }
        let tmp = dest.with_extension("tmp");

        let client = crate::request::client_for(ip_mode, self.options.timeout)
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        let mut response = client
            .get(url)
            .send()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::Http(response.status().as_u16()));
        }
        let total = response.content_length().unwrap_or(0);

        let result = (|| {
            let mut out = fs::File::create(&tmp).map_err(|e| FetchError::Io(e.to_string()))?;
            let mut buf = [0u8; 65536];
            let mut downloaded = 0u64;
            loop {
                let read = response
                    .read(&mut buf)
                    .map_err(|e| FetchError::Transport(e.to_string()))?;
                if read == 0 {
                    break;
                }
                std::io::Write::write_all(&mut out, &buf[..read])
                    .map_err(|e| FetchError::Io(e.to_string()))?;
                if let Some(hasher) = hasher.as_deref_mut() {
                    hasher.update(&buf[..read]);
                }
                downloaded += read as u64;
                progress(downloaded, total);
            }
            Ok(downloaded)
        })();

        match result {
            Ok(bytes) => {
                fs::rename(&tmp, dest).map_err(|e| FetchError::Io(e.to_string()))?;
                Ok(bytes)
            }
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                Err(e)
            }
        }
    }
}

fn file_is_valid_rpm(path: &Path) -> bool {
    path.exists()
        && fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
        && check_rpm_magic(path).is_ok()
}

/// Percent-encode a relative path, keeping the slashes
fn url_encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                out.push(byte as char);
            }
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

#[derive(Debug, Error)]
enum FetchError {
    #[error("HTTP {0}")]
    Http(u16),
    #[error("{0}")]
    Transport(String),
    #[error("io: {0}")]
    Io(String),
}

#[cfg(test)]
mod test {
    use super::*;

    fn item(cache: &Path) -> (Downloader, DownloadItem) {
        let downloader = Downloader::new(cache, DownloaderOptions::default());
        let item = DownloadItem {
            name: "wget".to_owned(),
            version: "1.21".to_owned(),
            release: "1.mga10".to_owned(),
            arch: "x86_64".to_owned(),
            media_id: 1,
            media_name: "Core".to_owned(),
            relative_path: "10/x86_64/core".to_owned(),
            is_official: true,
            servers: Vec::new(),
            size: 100,
        };
        (downloader, item)
    }

    fn write_rpm(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut content = environment::RPM_MAGIC.to_vec();
        content.extend_from_slice(b"payload");
        fs::write(path, content).unwrap();
    }

    #[test]
    fn magic_detection() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.rpm");
        write_rpm(&good);
        assert!(check_rpm_magic(&good).is_ok());

        let html = dir.path().join("portal.rpm");
        fs::write(&html, b"<!DOCTYPE html><html>login</html>").unwrap();
        assert_eq!(check_rpm_magic(&html), Err(MagicError::Html));

        let small = dir.path().join("small.rpm");
        fs::write(&small, b"ab").unwrap();
        assert_eq!(check_rpm_magic(&small), Err(MagicError::TooSmall));

        let junk = dir.path().join("junk.rpm");
        fs::write(&junk, [0u8, 0, 0, 0]).unwrap();
        assert!(matches!(
            check_rpm_magic(&junk),
            Err(MagicError::BadMagic(_))
        ));
    }

    #[test]
    fn cache_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (downloader, mut item) = item(dir.path());

        assert_eq!(
            downloader.cache_path(&item),
            dir.path()
                .join("medias/official/10/x86_64/core/wget-1.21-1.mga10.x86_64.rpm")
        );

        item.is_official = false;
        assert_eq!(
            downloader.cache_path(&item),
            dir.path().join("medias/custom/Core/wget-1.21-1.mga10.x86_64.rpm")
        );
    }

    #[test]
    fn cached_hit_requires_valid_magic() {
        let dir = tempfile::tempdir().unwrap();
        let (downloader, item) = item(dir.path());

        assert!(downloader.cached_path(&item).is_none());

        let path = downloader.cache_path(&item);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not an rpm").unwrap();
        assert!(
            downloader.cached_path(&item).is_none(),
            "corrupt cache entries are not hits"
        );

        write_rpm(&path);
        assert_eq!(downloader.cached_path(&item), Some(path));
    }

    #[test]
    fn legacy_layout_read() {
        let dir = tempfile::tempdir().unwrap();
        let (downloader, item) = item(dir.path());

        let legacy = dir
            .path()
            .join("medias/mirror.example.org/Core")
            .join(item.filename());
        write_rpm(&legacy);

        assert_eq!(downloader.cached_path(&item), Some(legacy));
    }

    #[test]
    fn no_servers_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let (downloader, item) = item(dir.path());
        let result = downloader.download_one(&item, 0, &|_, _| {}, &|_| {});
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no servers"));
    }

    #[test]
    fn path_encoding() {
        assert_eq!(
            url_encode_path("official/core release/foo bar.rpm"),
            "official/core%20release/foo%20bar.rpm"
        );
        assert_eq!(url_encode_path("a/b~c.rpm"), "a/b~c.rpm");
    }
}
