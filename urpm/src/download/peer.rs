// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Peer discovery and availability
//!
//! A peer is another instance on the LAN serving its RPM cache over HTTP.
//! The local daemon's `/api/peers` is the preferred source since it
//! already maintains a peer table; a UDP broadcast probe is the fallback.
//! Availability is established by POSTing the wanted filenames to each
//! peer's `/api/have`.

use std::collections::HashMap;
use std::net::UdpSocket;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::environment;

/// A reachable cache-serving instance on the LAN
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    pub host: String,
    pub port: u16,
    pub media: Vec<String>,
}

impl Peer {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn key(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

/// One file a peer advertises
#[derive(Debug, Clone)]
pub struct PeerFileInfo {
    pub filename: String,
    pub size: u64,
    /// Relative path for the `/media/` download URL
    pub path: String,
    pub peer: Peer,
}

/// filename → peers that advertise it
pub type Availability = HashMap<String, Vec<PeerFileInfo>>;

#[derive(Debug, Deserialize)]
struct PeersResponse {
    #[serde(default)]
    peers: Vec<PeerEntry>,
}

#[derive(Debug, Deserialize)]
struct PeerEntry {
    host: String,
    port: u16,
    #[serde(default)]
    media: Vec<String>,
    #[serde(default = "default_true")]
    alive: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct HaveRequest<'a> {
    packages: &'a [String],
}

#[derive(Debug, Deserialize)]
struct HaveResponse {
    #[serde(default)]
    available: Vec<HaveEntry>,
}

#[derive(Debug, Deserialize)]
struct HaveEntry {
    filename: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    path: String,
}

/// Discovery datagram payload, after the `URPMD1` framing
#[derive(Debug, Serialize, Deserialize)]
struct DiscoveryMessage {
    host: String,
    port: u16,
    version: String,
}

pub struct PeerClient {
    timeout: Duration,
    daemon_ports: [u16; 2],
}

impl Default for PeerClient {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(environment::PEER_TIMEOUT_SECS),
            daemon_ports: [environment::DAEMON_DEV_PORT, environment::DAEMON_PORT],
        }
    }
}

impl PeerClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    /// Discover peers: local daemon first, UDP broadcast as fallback
    pub fn discover_peers(&self) -> Vec<Peer> {
        let peers = self.query_local_daemon();
        if !peers.is_empty() {
            info!("got {} peers from local daemon", peers.len());
            return peers;
        }
        let peers = self.scan_lan_udp();
        if peers.is_empty() {
            debug!("no peers found");
        } else {
            info!("found {} peers via UDP scan", peers.len());
        }
        peers
    }

    fn query_local_daemon(&self) -> Vec<Peer> {
        let client = match reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(1))
            .build()
        {
            Ok(client) => client,
            Err(_) => return Vec::new(),
        };

        for port in self.daemon_ports {
            let url = format!("http://127.0.0.1:{port}/api/peers");
            let Ok(response) = client.get(&url).send() else {
                continue;
            };
            let Ok(parsed) = response.json::<PeersResponse>() else {
                continue;
            };
            return parsed
                .peers
                .into_iter()
                .filter(|p| p.alive)
                .map(|p| Peer {
                    host: p.host,
                    port: p.port,
                    media: p.media,
                })
                .collect();
        }
        Vec::new()
    }

    fn scan_lan_udp(&self) -> Vec<Peer> {
        let mut peers = Vec::new();
        let mut seen = std::collections::HashSet::new();

        let Ok(socket) = UdpSocket::bind(("0.0.0.0", 0)) else {
            return peers;
        };
        if socket.set_broadcast(true).is_err() {
            return peers;
        }
        let _ = socket.set_read_timeout(Some(self.timeout));

        let message = DiscoveryMessage {
            host: local_ip(),
            port: 0,
            version: env!("CARGO_PKG_VERSION").to_owned(),
        };
        let Ok(payload) = serde_json::to_vec(&message) else {
            return peers;
        };
        let mut datagram = environment::DISCOVERY_MAGIC.to_vec();
        datagram.extend_from_slice(&payload);

        if socket
            .send_to(&datagram, ("255.255.255.255", environment::DISCOVERY_PORT))
            .is_err()
        {
            return peers;
        }

        let mut buf = [0u8; 4096];
        while let Ok((len, addr)) = socket.recv_from(&mut buf) {
            let data = &buf[..len];
            let Some(body) = data.strip_prefix(environment::DISCOVERY_MAGIC) else {
                continue;
            };
            let Ok(message) = serde_json::from_slice::<DiscoveryMessage>(body) else {
                continue;
            };
            if message.port == 0 {
                continue;
            }
            let host = if message.host.is_empty() {
                addr.ip().to_string()
            } else {
                message.host
            };
            if seen.insert((host.clone(), message.port)) {
                peers.push(Peer {
                    host,
                    port: message.port,
                    media: Vec::new(),
                });
            }
        }

        peers
    }

    /// Ask every peer which of `filenames` it can serve; queries run in
    /// parallel, each bounded by the peer timeout
    pub fn query_peers_have(&self, peers: &[Peer], filenames: &[String]) -> Availability {
        let mut availability: Availability =
            filenames.iter().map(|f| (f.clone(), Vec::new())).collect();
        if peers.is_empty() || filenames.is_empty() {
            return availability;
        }

        let mut responses: Vec<(Peer, HaveResponse)> = Vec::new();
        for chunk in peers.chunks(environment::MAX_PEER_QUERIES.max(1)) {
            let batch: Vec<_> = std::thread::scope(|scope| {
                let handles: Vec<_> = chunk
                    .iter()
                    .map(|peer| {
                        let timeout = self.timeout;
                        scope.spawn(move || {
                            query_one_peer(peer, filenames, timeout).map(|r| (peer.clone(), r))
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .filter_map(|handle| handle.join().ok().flatten())
                    .collect()
            });
            responses.extend(batch);
        }

        for (peer, response) in responses {
            for entry in response.available {
                if let Some(bucket) = availability.get_mut(&entry.filename) {
                    bucket.push(PeerFileInfo {
                        filename: entry.filename,
                        size: entry.size,
                        path: entry.path,
                        peer: peer.clone(),
                    });
                }
            }
        }

        availability
    }
}

fn query_one_peer(peer: &Peer, filenames: &[String], timeout: Duration) -> Option<HaveResponse> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .build()
        .ok()?;
    let url = format!("{}/api/have", peer.base_url());
    let response = client
        .post(&url)
        .json(&HaveRequest { packages: filenames })
        .send()
        .ok()?;
    match response.json::<HaveResponse>() {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!("failed to query peer {}:{}: {e}", peer.host, peer.port);
            None
        }
    }
}

/// Best-effort local address, for self-filtering in discovery replies
fn local_ip() -> String {
    UdpSocket::bind(("0.0.0.0", 0))
        .and_then(|s| {
            s.connect(("8.8.8.8", 80))?;
            s.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "127.0.0.1".to_owned())
}

/// Where one file will be fetched from
#[derive(Debug, Clone)]
pub struct Assignment {
    pub filename: String,
    pub peer: Option<Peer>,
    pub peer_path: String,
    pub size: u64,
}

impl Assignment {
    pub fn upstream(filename: String) -> Self {
        Self {
            filename,
            peer: None,
            peer_path: String::new(),
            size: 0,
        }
    }

    pub fn is_peer(&self) -> bool {
        self.peer.is_some()
    }
}

/// Load-balanced plan: each file goes to the advertising peer with the
/// fewest assignments so far; files no peer has go upstream
pub fn create_download_plan(filenames: &[String], availability: &Availability) -> Vec<Assignment> {
    let mut plan = Vec::with_capacity(filenames.len());
    let mut peer_load: HashMap<(String, u16), usize> = HashMap::new();

    for filename in filenames {
        let advertised = availability.get(filename).map(Vec::as_slice).unwrap_or(&[]);
        if advertised.is_empty() {
            plan.push(Assignment::upstream(filename.clone()));
            continue;
        }

        let best = advertised
            .iter()
            .min_by_key(|info| {
                (
                    *peer_load.entry(info.peer.key()).or_insert(0),
                    info.peer.key(),
                )
            })
            .expect("non-empty advertised list");

        *peer_load.entry(best.peer.key()).or_insert(0) += 1;
        plan.push(Assignment {
            filename: filename.clone(),
            peer: Some(best.peer.clone()),
            peer_path: best.path.clone(),
            size: best.size,
        });
    }

    plan
}

#[cfg(test)]
mod test {
    use super::*;

    fn peer(host: &str) -> Peer {
        Peer {
            host: host.to_owned(),
            port: 9876,
            media: Vec::new(),
        }
    }

    fn advertise(availability: &mut Availability, filename: &str, peers: &[&Peer]) {
        let bucket = availability.entry(filename.to_owned()).or_default();
        for p in peers {
            bucket.push(PeerFileInfo {
                filename: filename.to_owned(),
                size: 100,
                path: format!("official/core/{filename}"),
                peer: (*p).clone(),
            });
        }
    }

    #[test]
    fn plan_balances_load() {
        let a = peer("10.0.0.1");
        let b = peer("10.0.0.2");
        let files: Vec<String> = (0..4).map(|i| format!("pkg{i}.rpm")).collect();

        let mut availability = Availability::new();
        for f in &files {
            advertise(&mut availability, f, &[&a, &b]);
        }

        let plan = create_download_plan(&files, &availability);
        let on_a = plan
            .iter()
            .filter(|p| p.peer.as_ref().map(|p| p.host.as_str()) == Some("10.0.0.1"))
            .count();
        assert_eq!(on_a, 2, "four files over two peers lands two each");
        assert!(plan.iter().all(Assignment::is_peer));
    }

    #[test]
    fn unadvertised_files_go_upstream() {
        let a = peer("10.0.0.1");
        let files = vec!["have.rpm".to_owned(), "missing.rpm".to_owned()];
        let mut availability = Availability::new();
        advertise(&mut availability, "have.rpm", &[&a]);
        availability.insert("missing.rpm".to_owned(), Vec::new());

        let plan = create_download_plan(&files, &availability);
        assert!(plan[0].is_peer());
        assert!(!plan[1].is_peer());
        assert_eq!(plan[1].filename, "missing.rpm");
    }

    #[test]
    fn plan_is_deterministic() {
        let a = peer("10.0.0.2");
        let b = peer("10.0.0.1");
        let files = vec!["x.rpm".to_owned()];
        let mut availability = Availability::new();
        advertise(&mut availability, "x.rpm", &[&a, &b]);

        let plan1 = create_download_plan(&files, &availability);
        let plan2 = create_download_plan(&files, &availability);
        assert_eq!(
            plan1[0].peer.as_ref().unwrap().host,
            plan2[0].peer.as_ref().unwrap().host
        );
        // Equal load ties break on the peer key
        assert_eq!(plan1[0].peer.as_ref().unwrap().host, "10.0.0.1");
    }
}
