// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::download::PeerClient;
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("peer")
        .about("Inspect LAN peers and P2P provenance")
        .subcommand_required(true)
        .subcommand(Command::new("list").about("Discover reachable peers"))
        .subcommand(
            Command::new("downloads")
                .about("Show peer download provenance")
                .arg(Arg::new("host"))
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_parser(clap::value_parser!(i64))
                        .default_value("100"),
                ),
        )
        .subcommand(
            Command::new("blacklist")
                .about("Blacklist a peer")
                .arg(Arg::new("host").required(true))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(clap::value_parser!(u16)),
                )
                .arg(Arg::new("reason").long("reason")),
        )
        .subcommand(
            Command::new("unblacklist")
                .about("Remove a peer from the blacklist")
                .arg(Arg::new("host").required(true))
                .arg(
                    Arg::new("port")
                        .long("port")
                        .value_parser(clap::value_parser!(u16)),
                ),
        )
        .subcommand(
            Command::new("clean")
                .about("Delete cached files obtained from a peer")
                .arg(Arg::new("host").required(true)),
        )
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;

    match args.subcommand() {
        Some(("list", _)) => {
            let peers = PeerClient::default().discover_peers();
            if peers.is_empty() {
                println!("No peers discovered.");
                return Ok(());
            }
            let blacklisted = runtime::block_on(ops.db().list_blacklisted_peers())?;
            for peer in peers {
                let banned = blacklisted.iter().any(|b| {
                    b.peer_host == peer.host
                        && b.peer_port.map(|p| p == i64::from(peer.port)).unwrap_or(true)
                });
                let mark = if banned { " [blacklisted]" } else { "" };
                println!("{}:{}{mark}", peer.host, peer.port);
            }
            Ok(())
        }
        Some(("downloads", sub)) => {
            let host = sub.get_one::<String>("host").map(String::as_str);
            let limit = *sub.get_one::<i64>("limit").expect("defaulted");
            let downloads = runtime::block_on(ops.db().list_peer_downloads(host, limit))?;
            if downloads.is_empty() {
                println!("No peer downloads recorded.");
            }
            for download in downloads {
                println!(
                    "{}  from {}:{}  {}  sha256:{}",
                    download.filename,
                    download.peer_host,
                    download.peer_port,
                    super::format_size(download.file_size.unwrap_or(0) as u64),
                    download.checksum_sha256.as_deref().unwrap_or("-"),
                );
            }

            let stats = runtime::block_on(ops.db().peer_stats())?;
            if !stats.is_empty() {
                println!("\nPer peer:");
                for stat in stats {
                    println!(
                        "  {}:{}  {} downloads, {}",
                        stat.peer_host,
                        stat.peer_port,
                        stat.download_count,
                        super::format_size(stat.total_bytes.unwrap_or(0) as u64)
                    );
                }
            }
            Ok(())
        }
        Some(("blacklist", sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let host = sub.get_one::<String>("host").expect("required");
            let port = sub.get_one::<u16>("port").copied();
            let reason = sub.get_one::<String>("reason").map(String::as_str);
            runtime::block_on(ops.db().blacklist_peer(host, port, reason))?;
            println!("Blacklisted {host}.");
            Ok(())
        }
        Some(("unblacklist", sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let host = sub.get_one::<String>("host").expect("required");
            let port = sub.get_one::<u16>("port").copied();
            let removed = runtime::block_on(ops.db().unblacklist_peer(host, port))?;
            if removed > 0 {
                println!("Removed {host} from the blacklist.");
            } else {
                println!("{host} was not blacklisted.");
            }
            Ok(())
        }
        Some(("clean", sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let host = sub.get_one::<String>("host").expect("required");
            let files = runtime::block_on(ops.db().files_from_peer(host))?;
            let medias_root = ops.installation().cache_dir().join("medias");
            let mut removed = 0usize;
            for file in &files {
                let path = if file.starts_with('/') {
                    std::path::PathBuf::from(file)
                } else {
                    medias_root.join(file)
                };
                if std::fs::remove_file(&path).is_ok() {
                    removed += 1;
                }
            }
            let records = runtime::block_on(ops.db().delete_peer_downloads(host))?;
            println!("Removed {removed} files and {records} provenance records from {host}.");
            crate::ops::notify_daemon_cache_invalidate();
            Ok(())
        }
        _ => unreachable!(),
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] super::OpenError),
    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),
    #[error("store: {0}")]
    Database(#[from] crate::db::Error),
}
