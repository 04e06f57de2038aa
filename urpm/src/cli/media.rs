// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::db::media::NewMedia;
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("media")
        .about("Manage repository sources")
        .subcommand_required(true)
        .subcommand(Command::new("list").about("List configured media"))
        .subcommand(
            Command::new("add")
                .about("Add a media")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("short-name").long("short-name").required(true))
                .arg(Arg::new("distro-version").long("distro-version").required(true))
                .arg(Arg::new("arch").long("arch").required(true))
                .arg(Arg::new("relative-path").long("relative-path").required(true))
                .arg(
                    Arg::new("priority")
                        .long("priority")
                        .value_parser(clap::value_parser!(i64))
                        .default_value("50"),
                )
                .arg(
                    Arg::new("custom")
                        .long("custom")
                        .help("Unofficial media, cached under medias/custom")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("update")
                        .long("update")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("remove")
                .about("Remove a media and everything it owns")
                .arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("enable").arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("disable").arg(Arg::new("name").required(true)),
        )
        .subcommand(
            Command::new("sync-files")
                .about("Toggle files-index sync for a media")
                .arg(Arg::new("name").required(true))
                .arg(Arg::new("off").long("off").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("update")
                .about("Import a synthesis index for a media")
                .arg(Arg::new("name").required(true))
                .arg(
                    Arg::new("synthesis")
                        .long("synthesis")
                        .help("Path or URL of a synthesis file")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("import-files")
                .about("Import a files index for a media")
                .arg(Arg::new("name").required(true))
                .arg(
                    Arg::new("files-xml")
                        .long("files-xml")
                        .help("Path to a files index (xml, optionally lzma/xz)")
                        .required(true),
                ),
        )
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;

    match args.subcommand() {
        Some(("list", _)) => {
            let media = runtime::block_on(ops.db().list_media())?;
            if media.is_empty() {
                println!("No media configured.");
            }
            for m in media {
                let state = if m.enabled { "enabled" } else { "disabled" };
                println!(
                    "{:<30} {:<8} prio {:<4} {}/{} {}",
                    m.name, state, m.priority, m.version, m.architecture, m.relative_path
                );
            }
            Ok(())
        }
        Some(("add", sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let name = sub.get_one::<String>("name").expect("required");
            let id = runtime::block_on(ops.db().add_media(NewMedia {
                name,
                short_name: sub.get_one::<String>("short-name").expect("required"),
                version: sub.get_one::<String>("distro-version").expect("required"),
                architecture: sub.get_one::<String>("arch").expect("required"),
                relative_path: sub.get_one::<String>("relative-path").expect("required"),
                is_official: !sub.get_flag("custom"),
                enabled: true,
                update_media: sub.get_flag("update"),
                priority: *sub.get_one::<i64>("priority").expect("defaulted"),
            }))?;
            ops.audit()
                .media_change(ops.context(), "add", name, None);
            println!("Added media {name} (id {id}).");
            Ok(())
        }
        Some(("remove", sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let name = sub.get_one::<String>("name").expect("required");
            runtime::block_on(ops.db().remove_media(name))?;
            ops.audit()
                .media_change(ops.context(), "remove", name, None);
            println!("Removed media {name}.");
            Ok(())
        }
        Some((verb @ ("enable" | "disable"), sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let name = sub.get_one::<String>("name").expect("required");
            runtime::block_on(ops.db().enable_media(name, verb == "enable"))?;
            ops.audit().media_change(ops.context(), verb, name, None);
            println!("Media {name} {verb}d.");
            Ok(())
        }
        Some(("sync-files", sub)) => {
            ops.authorize(Permission::MEDIA_MANAGE)?;
            let name = sub.get_one::<String>("name").expect("required");
            let enabled = !sub.get_flag("off");
            runtime::block_on(ops.db().set_media_sync_files(name, enabled))?;
            println!(
                "Files-index sync {} for {name}.",
                if enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
        Some(("update", sub)) => {
            ops.authorize(Permission::REFRESH)?;
            let name = sub.get_one::<String>("name").expect("required");
            let source = sub.get_one::<String>("synthesis").expect("required");

            let media = runtime::block_on(ops.db().get_media(name))?
                .ok_or_else(|| Error::NoSuchMedia(name.clone()))?;

            let packages = if source.starts_with("http://") || source.starts_with("https://") {
                let url = url::Url::parse(source).map_err(|_| Error::BadUrl(source.clone()))?;
                let response = crate::request::get(url)?;
                crate::synthesis::parse(response)?
            } else {
                crate::synthesis::parse_file(std::path::Path::new(source))?
            };
            let count = packages.len();
            runtime::block_on(ops.db().import_packages(media.id, &packages))?;

            // Keep cache accounting aligned with the fresh index
            let referenced: Vec<String> =
                packages.iter().map(|m| m.nevra.filename()).collect();
            runtime::block_on(ops.db().mark_cache_files_unreferenced(media.id, &referenced))?;

            ops.audit()
                .media_change(ops.context(), "update", name, Some(source));
            println!("Imported {count} packages into {name}.");
            Ok(())
        }
        Some(("import-files", sub)) => {
            ops.authorize(Permission::REFRESH)?;
            let name = sub.get_one::<String>("name").expect("required");
            let path = sub.get_one::<String>("files-xml").expect("required");

            let media = runtime::block_on(ops.db().get_media(name))?
                .ok_or_else(|| Error::NoSuchMedia(name.clone()))?;

            let entries = crate::files_xml::parse_file(std::path::Path::new(path))
                .map_err(crate::files_xml::Error::from)?
                .collect::<Result<Vec<_>, _>>()?;
            let compressed = std::fs::metadata(path).map(|m| m.len() as i64).ok();

            runtime::block_on(ops.db().begin_bulk_import())?;
            let imported = runtime::block_on(ops.db().import_files(
                media.id,
                entries,
                None,
                compressed,
                |files, packages| {
                    log::info!("imported {files} files / {packages} packages");
                },
                0,
            ));
            runtime::block_on(ops.db().end_bulk_import())?;
            let (files, packages) = imported?;

            let indexed = runtime::block_on(ops.db().rebuild_fts_index(|_, _| {}))?;
            println!(
                "Imported {files} files across {packages} packages ({indexed} rows indexed)."
            );
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
    #[error("synthesis: {0}")]
    Synthesis(#[from] crate::synthesis::Error),
    #[error("invalid url: {0}")]
    BadUrl(String),
    #[error("fetching synthesis: {0}")]
    Fetch(#[from] crate::request::Error),
    #[error("files index: {0}")]
    FilesXml(#[from] crate::files_xml::Error),
}
