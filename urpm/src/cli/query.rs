// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::runtime;

use super::GlobalArgs;

pub fn search_command() -> Command {
    Command::new("search")
        .visible_alias("s")
        .visible_alias("query")
        .visible_alias("q")
        .about("Search packages by name")
        .arg(Arg::new("term").required(true))
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_parser(clap::value_parser!(i64))
                .default_value("0"),
        )
}

pub fn find_command() -> Command {
    Command::new("find")
        .visible_alias("f")
        .about("Find which package owns a file path")
        .arg(Arg::new("pattern").required(true))
        .arg(
            Arg::new("media")
                .long("media")
                .help("Restrict to one media")
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_parser(clap::value_parser!(i64))
                .default_value("0"),
        )
}

pub fn provides_command() -> Command {
    Command::new("provides")
        .visible_alias("whatprovides")
        .visible_alias("wp")
        .about("List packages providing a capability")
        .arg(Arg::new("capability").required(true))
}

pub fn info_command() -> Command {
    Command::new("info")
        .visible_alias("show")
        .about("Show details of a package")
        .arg(Arg::new("package").required(true))
}

pub fn search(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    let term = args.get_one::<String>("term").expect("required");
    let limit = *args.get_one::<i64>("limit").expect("defaulted");

    let records = runtime::block_on(ops.db().search_packages(term, limit))?;
    if records.is_empty() {
        println!("No package matches {term}");
        return Ok(());
    }
    for record in records {
        println!(
            "{}  {}  [{}]  {}",
            record.meta.nevra,
            super::format_size(record.meta.filesize),
            record.media_name,
            record.meta.summary
        );
    }
    Ok(())
}

pub fn find(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    let pattern = args.get_one::<String>("pattern").expect("required");
    let limit = *args.get_one::<i64>("limit").expect("defaulted");

    let media_ids = match args.get_one::<String>("media") {
        Some(name) => {
            let media = runtime::block_on(ops.db().get_media(name))?
                .ok_or_else(|| Error::NoSuchMedia(name.clone()))?;
            Some(vec![media.id])
        }
        None => None,
    };

    let hits = runtime::block_on(ops.db().search_files(
        pattern,
        media_ids.as_deref(),
        limit,
    ))?;
    if hits.is_empty() {
        println!("No file matches {pattern}");
        return Ok(());
    }
    for hit in hits {
        println!("{}: {} [{}]", hit.pkg_nevra, hit.file_path, hit.media_name);
    }
    Ok(())
}

pub fn provides(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    let capability = args.get_one::<String>("capability").expect("required");

    let records = runtime::block_on(ops.db().whatprovides(capability))?;
    if records.is_empty() {
        println!("Nothing provides {capability}");
        return Ok(());
    }
    for record in records {
        println!("{} [{}]", record.meta.nevra, record.media_name);
    }
    Ok(())
}

pub fn info(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    let spec = args.get_one::<String>("package").expect("required");

    let records = runtime::block_on(ops.db().get_package_smart(spec))?;
    let Some(record) = records.first() else {
        println!("No package matches {spec}");
        return Ok(());
    };

    let meta = &record.meta;
    println!("Name     : {}", meta.name());
    println!("Version  : {}", meta.evr());
    println!("Arch     : {}", meta.arch());
    println!("Media    : {}", record.media_name);
    println!("Group    : {}", meta.group);
    println!("Download : {}", super::format_size(meta.filesize));
    println!("Installed: {}", super::format_size(meta.size));
    println!("Summary  : {}", meta.summary);
    if !meta.provides.is_empty() {
        println!("Provides :");
        for provide in &meta.provides {
            println!("    {provide}");
        }
    }
    if !meta.requires.is_empty() {
        println!("Requires :");
        for require in &meta.requires {
            println!("    {require}");
        }
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] super::OpenError),
    #[error("store: {0}")]
    Database(#[from] crate::db::Error),
    #[error("no such media: {0}")]
    NoSuchMedia(String),
}
