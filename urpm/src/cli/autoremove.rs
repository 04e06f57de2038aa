// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::db::history::Action;
use crate::evr::Nevra;
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("autoremove")
        .visible_alias("ar")
        .about("Remove orphaned dependencies")
        .arg(
            Arg::new("faildeps")
                .long("faildeps")
                .help("Clean dependencies left behind by interrupted transactions")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("test").long("test").action(ArgAction::SetTrue))
        .arg(Arg::new("sync").long("sync").action(ArgAction::SetTrue))
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    ops.authorize(Permission::REMOVE)?;

    if args.get_flag("faildeps") {
        return faildeps(args, &ops, global);
    }

    let mut resolver = runtime::block_on(ops.make_resolver())?;
    let orphans = resolver.find_all_orphans();
    if orphans.is_empty() {
        println!("No orphans found.");
        return Ok(());
    }

    let plan = resolver.resolve_remove(&orphans, false, false);
    if !plan.success {
        super::install::print_problems(&plan);
        return Err(Error::Unresolvable);
    }

    super::install::print_plan(&plan);
    if !super::confirm("Remove these orphans?", global.yes) {
        return Err(Error::Declined);
    }

    let settings = super::install::settings_from(args);
    let mut queue_progress = |_op: &str, name: &str, current: u64, total: u64| {
        println!("  [{current}/{total}] {name}");
    };
    let outcome = runtime::block_on(ops.apply_remove(
        &resolver,
        &plan,
        Action::Autoremove,
        "urpm autoremove",
        &settings,
        Some(&mut queue_progress),
    ))?;

    if outcome.queue.success {
        println!("Removed {} orphans.", plan.actions.len());
        Ok(())
    } else {
        Err(Error::Transaction)
    }
}

/// Clean dependency installs stranded by interrupted transactions, then
/// mark those transactions as cleaned
fn faildeps(
    args: &ArgMatches,
    ops: &crate::ops::Operations,
    global: &GlobalArgs,
) -> Result<(), Error> {
    let candidates = runtime::block_on(ops.faildep_candidates())?;
    if candidates.is_empty() {
        println!("No failed-dependency leftovers found.");
        return Ok(());
    }

    let mut names = Vec::new();
    for (transaction_id, nevras) in &candidates {
        println!("Transaction {transaction_id} left behind:");
        for nevra in nevras {
            println!("  {nevra}");
            let name = Nevra::parse(nevra)
                .map(|n| n.name)
                .unwrap_or_else(|_| nevra.clone());
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }

    if !super::confirm("Remove these packages?", global.yes) {
        return Err(Error::Declined);
    }

    let settings = super::install::settings_from(args);
    let transaction_id = runtime::block_on(ops.begin_transaction(
        Action::Autoremove,
        "urpm autoremove --faildeps",
        &[],
    ))?;

    let mut queue_progress = |_op: &str, name: &str, current: u64, total: u64| {
        println!("  [{current}/{total}] {name}");
    };
    let queue = ops.execute_erase(names.clone(), &settings, Some(&mut queue_progress))?;

    if queue.success {
        runtime::block_on(ops.complete_transaction(transaction_id))?;
        for (cleaned_id, _) in &candidates {
            runtime::block_on(ops.db().mark_cleaned(*cleaned_id))?;
        }
        if let Ok(resolver) = runtime::block_on(ops.make_resolver()) {
            let _ = resolver.unmark_packages(&names);
        }
        println!("Cleaned {} transactions.", candidates.len());
        Ok(())
    } else {
        runtime::block_on(ops.abort_transaction(transaction_id))?;
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
    #[error("store: {0}")]
    Database(#[from] crate::db::Error),
    #[error("unresolvable request")]
    Unresolvable,
    #[error("aborted by user")]
    Declined,
    #[error("transaction failed")]
    Transaction,
}
