// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::io::{BufRead, Write};

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::auth::AuthContext;
use crate::db::Database;
use crate::installation::Installation;
use crate::ops::Operations;
use crate::runtime;

pub mod autoremove;
pub mod cache;
pub mod history;
pub mod hold;
pub mod install;
pub mod mark;
pub mod media;
pub mod peer;
pub mod query;
pub mod remove;
pub mod upgrade;
pub mod version;

/// Generate the CLI command structure
fn command() -> Command {
    Command::new("urpm")
        .about("Package manager with peer-to-peer downloads")
        .arg(
            Arg::new("version")
                .short('v')
                .long("version")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("root")
                .short('D')
                .long("root")
                .global(true)
                .help("RPM root directory")
                .action(ArgAction::Set)
                .default_value("/"),
        )
        .arg(
            Arg::new("yes")
                .short('y')
                .long("yes")
                .global(true)
                .help("Assume yes for all questions")
                .action(ArgAction::SetTrue),
        )
        .arg_required_else_help(true)
        .subcommand(install::command())
        .subcommand(remove::command())
        .subcommand(upgrade::command())
        .subcommand(query::search_command())
        .subcommand(query::find_command())
        .subcommand(query::provides_command())
        .subcommand(query::info_command())
        .subcommand(history::command())
        .subcommand(history::undo_command())
        .subcommand(history::rollback_command())
        .subcommand(autoremove::command())
        .subcommand(mark::command())
        .subcommand(hold::hold_command())
        .subcommand(hold::unhold_command())
        .subcommand(media::command())
        .subcommand(cache::command())
        .subcommand(peer::command())
        .subcommand(version::command())
}

/// Process all CLI arguments
pub fn process() -> Result<(), Error> {
    let matches = command().get_matches();
    if matches.get_flag("version") {
        version::print();
        return Ok(());
    }

    let global = GlobalArgs::from(&matches);

    match matches.subcommand() {
        Some(("install", args)) => install::handle(args, &global).map_err(Error::Install),
        Some(("remove", args)) => remove::handle(args, &global).map_err(Error::Remove),
        Some(("upgrade", args)) => upgrade::handle(args, &global).map_err(Error::Upgrade),
        Some(("search", args)) => query::search(args, &global).map_err(Error::Query),
        Some(("find", args)) => query::find(args, &global).map_err(Error::Query),
        Some(("provides", args)) => query::provides(args, &global).map_err(Error::Query),
        Some(("info", args)) => query::info(args, &global).map_err(Error::Query),
        Some(("history", args)) => history::handle(args, &global).map_err(Error::History),
        Some(("undo", args)) => history::undo(args, &global).map_err(Error::History),
        Some(("rollback", args)) => history::rollback(args, &global).map_err(Error::History),
        Some(("autoremove", args)) => autoremove::handle(args, &global).map_err(Error::Autoremove),
        Some(("mark", args)) => mark::handle(args, &global).map_err(Error::Mark),
        Some(("hold", args)) => hold::hold(args, &global).map_err(Error::Hold),
        Some(("unhold", args)) => hold::unhold(args, &global).map_err(Error::Hold),
        Some(("media", args)) => media::handle(args, &global).map_err(Error::Media),
        Some(("cache", args)) => cache::handle(args, &global).map_err(Error::Cache),
        Some(("peer", args)) => peer::handle(args, &global).map_err(Error::Peer),
        Some(("version", _)) => {
            version::print();
            Ok(())
        }
        _ => unreachable!(),
    }
}

#[derive(Debug, Clone)]
pub(crate) struct GlobalArgs {
    pub root: String,
    pub yes: bool,
}

impl From<&ArgMatches> for GlobalArgs {
    fn from(matches: &ArgMatches) -> Self {
        Self {
            root: matches
                .get_one::<String>("root")
                .cloned()
                .unwrap_or_else(|| "/".to_owned()),
            yes: matches.get_flag("yes"),
        }
    }
}

/// Open the store and build the façade for one invocation
pub(crate) fn open(global: &GlobalArgs) -> Result<Operations, OpenError> {
    let installation = Installation::open(&global.root);
    let db = runtime::block_on(Database::new(
        installation.db_path(),
        installation.read_only(),
    ))?;
    let context = AuthContext::for_cli();
    let ops = Operations::new(db, installation, context);

    // A failed background commit from a previous run surfaces here, once
    if let Some(error) = ops.pending_background_error() {
        eprintln!("warning: a previous background operation failed: {error}");
    }

    Ok(ops)
}

#[derive(Debug, Error)]
#[error("opening store: {0}")]
pub struct OpenError(#[from] crate::db::Error);

/// Simple y/N prompt, auto-accepted with --yes
pub(crate) fn confirm(prompt: &str, yes: bool) -> bool {
    if yes {
        return true;
    }
    print!("{prompt} [y/N] ");
    let _ = std::io::stdout().flush();
    let mut line = String::new();
    if std::io::stdin().lock().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("install: {0}")]
    Install(#[from] install::Error),

    #[error("remove: {0}")]
    Remove(#[from] remove::Error),

    #[error("upgrade: {0}")]
    Upgrade(#[from] upgrade::Error),

    #[error("query: {0}")]
    Query(#[from] query::Error),

    #[error("history: {0}")]
    History(#[from] history::Error),

    #[error("autoremove: {0}")]
    Autoremove(#[from] autoremove::Error),

    #[error("mark: {0}")]
    Mark(#[from] mark::Error),

    #[error("hold: {0}")]
    Hold(#[from] hold::Error),

    #[error("media: {0}")]
    Media(#[from] media::Error),

    #[error("cache: {0}")]
    Cache(#[from] cache::Error),

    #[error("peer: {0}")]
    Peer(#[from] peer::Error),
}

impl Error {
    /// Exit code mapping: 130 for user interruption, 1 for everything else
    pub fn exit_code(&self) -> i32 {
        if matches!(
            crate::signal::interrupt_state(),
            crate::signal::Interrupt::Abort
        ) {
            130
        } else {
            1
        }
    }
}
