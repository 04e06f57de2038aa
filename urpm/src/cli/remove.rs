// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::db::history::Action;
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("remove")
        .visible_alias("e")
        .visible_alias("erase")
        .about("Remove installed packages and their unused dependents")
        .arg(
            Arg::new("packages")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("erase-recommends")
                .long("erase-recommends")
                .help("Also remove packages only recommended by the removed set")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("keep-suggests")
                .long("keep-suggests")
                .help("With --erase-recommends, spare suggests-only packages")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("force").long("force").action(ArgAction::SetTrue))
        .arg(Arg::new("test").long("test").action(ArgAction::SetTrue))
        .arg(Arg::new("sync").long("sync").action(ArgAction::SetTrue))
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    ops.authorize(Permission::REMOVE)?;

    let names: Vec<String> = args
        .get_many::<String>("packages")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    let mut resolver = runtime::block_on(ops.make_resolver())?;
    let plan = resolver.resolve_remove(
        &names,
        args.get_flag("erase-recommends"),
        args.get_flag("keep-suggests"),
    );
    for warning in resolver.take_warnings() {
        eprintln!("warning: {warning}");
    }

    if !plan.success {
        super::install::print_problems(&plan);
        return Err(Error::Unresolvable);
    }
    if plan.actions.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    super::install::print_plan(&plan);
    if !super::confirm("Continue?", global.yes) {
        return Err(Error::Declined);
    }

    let settings = super::install::settings_from(args);
    let command_line = format!("urpm remove {}", names.join(" "));
    let mut queue_progress = |_op: &str, name: &str, current: u64, total: u64| {
        println!("  [{current}/{total}] {name}");
    };

    let outcome = runtime::block_on(ops.apply_remove(
        &resolver,
        &plan,
        Action::Remove,
        &command_line,
        &settings,
        Some(&mut queue_progress),
    ))?;

    if outcome.queue.success {
        println!("Transaction {} complete.", outcome.transaction_id);
        Ok(())
    } else {
        for op in &outcome.queue.operations {
            for error in &op.errors {
                eprintln!("error: {error}");
            }
        }
        Err(Error::Transaction)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] super::OpenError),
    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),
    #[error(transparent)]
    Ops(#[from] crate::ops::Error),
    #[error("unresolvable request")]
    Unresolvable,
    #[error("aborted by user")]
    Declined,
    #[error("transaction failed")]
    Transaction,
}
