// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("cache")
        .about("Inspect and maintain the RPM cache")
        .subcommand_required(true)
        .subcommand(Command::new("info").about("Cache summary"))
        .subcommand(Command::new("stats").about("Per-media cache statistics"))
        .subcommand(
            Command::new("clean")
                .about("Evict cached RPMs")
                .arg(Arg::new("media").long("media"))
                .arg(
                    Arg::new("max-age-days")
                        .long("max-age-days")
                        .value_parser(clap::value_parser!(i64)),
                )
                .arg(
                    Arg::new("free-bytes")
                        .long("free-bytes")
                        .help("Evict until this many bytes are reclaimed")
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
        .subcommand(
            Command::new("rebuild")
                .about("Rebuild the file search index")
        )
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;

    match args.subcommand() {
        Some(("info", _)) => {
            let stats = runtime::block_on(ops.db().cache_stats(None))?;
            println!("Cached files : {}", stats.total_files);
            println!("Total size   : {}", super::format_size(stats.total_size as u64));
            println!(
                "Referenced   : {} ({})",
                stats.referenced_files,
                super::format_size(stats.referenced_size as u64)
            );
            println!(
                "Unreferenced : {} ({})",
                stats.unreferenced_files,
                super::format_size(stats.unreferenced_size as u64)
            );
            let (files, packages) = runtime::block_on(ops.db().files_stats())?;
            println!("Files index  : {files} files across {packages} packages");
            Ok(())
        }
        Some(("stats", _)) => {
            for media in runtime::block_on(ops.db().list_media())? {
                let stats = runtime::block_on(ops.db().cache_stats(Some(media.id)))?;
                if stats.total_files == 0 {
                    continue;
                }
                println!(
                    "{:<30} {:>6} files  {:>10}",
                    media.name,
                    stats.total_files,
                    super::format_size(stats.total_size as u64)
                );
            }
            Ok(())
        }
        Some(("clean", sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let media_id = match sub.get_one::<String>("media") {
                Some(name) => Some(
                    runtime::block_on(ops.db().get_media(name))?
                        .ok_or_else(|| Error::NoSuchMedia(name.clone()))?
                        .id,
                ),
                None => None,
            };
            let max_age = sub.get_one::<i64>("max-age-days").copied();
            let free_bytes = sub.get_one::<i64>("free-bytes").copied();

            let victims =
                runtime::block_on(ops.db().files_to_evict(media_id, free_bytes, max_age))?;
            let mut freed = 0i64;
            let mut removed = 0usize;
            let medias_root = ops.installation().cache_dir().join("medias");
            for victim in victims {
                let path = medias_root.join(&victim.file_path);
                // Absolute paths from older records are honoured as-is
                let path = if victim.file_path.starts_with('/') {
                    std::path::PathBuf::from(&victim.file_path)
                } else {
                    path
                };
                if path.exists() && std::fs::remove_file(&path).is_err() {
                    continue;
                }
                runtime::block_on(ops.db().delete_cache_file(&victim.filename, victim.media_id))?;
                freed += victim.file_size;
                removed += 1;
            }
            println!("Evicted {removed} files, freed {}.", super::format_size(freed as u64));
            crate::ops::notify_daemon_cache_invalidate();
            Ok(())
        }
        Some(("rebuild", _)) => {
            ops.authorize(Permission::REFRESH)?;
            let indexed = runtime::block_on(ops.db().rebuild_fts_index(|done, total| {
                if done % 500_000 < crate::environment::FTS_REBUILD_BATCH {
                    log::info!("indexed {done}/{total} rows");
                }
            }))?;
            println!("Rebuilt file search index: {indexed} rows.");
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
    #[error("no such media: {0}")]
    NoSuchMedia(String),
}
