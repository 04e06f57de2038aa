// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::db::history::Action;
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("upgrade")
        .visible_alias("u")
        .visible_alias("up")
        .visible_alias("update")
        .about("Upgrade named packages, local RPM files, or the whole system")
        .arg(
            Arg::new("packages")
                .help("Package names or .rpm paths; empty for full upgrade")
                .num_args(0..),
        )
        .arg(
            Arg::new("clean-orphans")
                .long("clean-orphans")
                .help("Remove packages orphaned by this upgrade, in background")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("force").long("force").action(ArgAction::SetTrue))
        .arg(Arg::new("test").long("test").action(ArgAction::SetTrue))
        .arg(
            Arg::new("nosignature")
                .long("nosignature")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("no-peers").long("no-peers").action(ArgAction::SetTrue))
        .arg(
            Arg::new("only-peers")
                .long("only-peers")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("sync").long("sync").action(ArgAction::SetTrue))
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    ops.authorize(Permission::UPGRADE)?;

    let specs: Vec<String> = args
        .get_many::<String>("packages")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    let mut resolver = runtime::block_on(ops.make_resolver())?;

    // Local .rpm payloads enter the pool like install's; an older local
    // payload is an explicit downgrade of the installed package
    let (local_paths, names): (Vec<_>, Vec<_>) = specs
        .into_iter()
        .partition(|s| s.ends_with(".rpm") && (s.contains('/') || s.starts_with('.')));
    let local_paths: Vec<PathBuf> = local_paths.into_iter().map(PathBuf::from).collect();
    let mut requested = names;
    requested.extend(resolver.add_local_rpms(&local_paths)?);

    let plan = resolver.resolve_upgrade(if requested.is_empty() {
        None
    } else {
        Some(&requested)
    });
    for warning in resolver.take_warnings() {
        eprintln!("warning: {warning}");
    }

    if !plan.success {
        super::install::print_problems(&plan);
        return Err(Error::Unresolvable);
    }
    if plan.actions.is_empty() {
        println!("System is up to date.");
        return Ok(());
    }

    // Orphans this upgrade would strand; offered for background cleanup
    let orphans = if args.get_flag("clean-orphans") {
        let orphans = resolver.find_upgrade_orphans(&plan.actions);
        if !orphans.is_empty() {
            println!("Orphans to clean afterwards: {}", orphans.join(", "));
        }
        orphans
    } else {
        Vec::new()
    };

    super::install::print_plan(&plan);
    if !super::confirm("Continue?", global.yes) {
        return Err(Error::Declined);
    }

    let settings = super::install::settings_from(args);
    let command_line = if requested.is_empty() {
        "urpm upgrade".to_owned()
    } else {
        format!("urpm upgrade {}", requested.join(" "))
    };

    let outcome = super::install::run_plan(
        &ops,
        &resolver,
        &plan,
        Action::Upgrade,
        &command_line,
        orphans,
        &settings,
    )?;
    super::install::report_outcome(&outcome).map_err(Error::Install)
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] super::OpenError),
    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),
    #[error(transparent)]
    Ops(#[from] crate::ops::Error),
    #[error(transparent)]
    Install(#[from] super::install::Error),
    #[error(transparent)]
    LocalRpm(#[from] crate::rpmdb::Error),
    #[error("unresolvable request")]
    Unresolvable,
    #[error("aborted by user")]
    Declined,
}
