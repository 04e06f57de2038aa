// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::db::history::Action;
use crate::ops::{Operations, UndoPlan};
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("history")
        .visible_alias("h")
        .about("Show transaction history")
        .arg(
            Arg::new("id")
                .help("Show one transaction in detail")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new("limit")
                .long("limit")
                .value_parser(clap::value_parser!(i64))
                .default_value("20"),
        )
        .arg(Arg::new("action").long("action").help("Filter by action"))
}

pub fn undo_command() -> Command {
    Command::new("undo")
        .about("Undo one completed transaction")
        .arg(
            Arg::new("id")
                .help("Transaction id (defaults to the last one)")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            clap::Arg::new("sync")
                .long("sync")
                .action(clap::ArgAction::SetTrue),
        )
}

pub fn rollback_command() -> Command {
    Command::new("rollback")
        .visible_alias("r")
        .about("Undo the last N transactions, newest first")
        .arg(
            Arg::new("count")
                .required(true)
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            clap::Arg::new("sync")
                .long("sync")
                .action(clap::ArgAction::SetTrue),
        )
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;

    if let Some(&id) = args.get_one::<i64>("id") {
        return show(&ops, id);
    }

    let limit = *args.get_one::<i64>("limit").expect("defaulted");
    let filter = args
        .get_one::<String>("action")
        .and_then(|s| Action::parse(s));

    let rows = runtime::block_on(ops.db().list_history(limit, filter))?;
    if rows.is_empty() {
        println!("No transactions recorded.");
        return Ok(());
    }
    for row in rows {
        let time = chrono::DateTime::from_timestamp(row.timestamp, 0)
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let undone = match row.undone_by {
            Some(by) => format!(" (undone by {by})"),
            None => String::new(),
        };
        println!(
            "{:>4}  {time}  {:<10} {:<12} {}{undone}",
            row.id, row.action, row.status, row.user
        );
    }
    Ok(())
}

fn show(ops: &Operations, id: i64) -> Result<(), Error> {
    let Some((row, packages)) = runtime::block_on(ops.db().get_transaction(id))? else {
        return Err(Error::NoSuchTransaction(id));
    };
    println!("Transaction {}: {} ({})", row.id, row.action, row.status);
    if let Some(command) = &row.command {
        println!("Command: {command}");
    }
    for package in packages {
        let previous = package
            .previous_nevra
            .map(|p| format!(" (was {p})"))
            .unwrap_or_default();
        println!(
            "  {:<9} {:<10} {}{previous}",
            package.action, package.reason, package.pkg_nevra
        );
    }
    Ok(())
}

pub fn undo(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    ops.authorize(Permission::REMOVE)?;

    let id = match args.get_one::<i64>("id") {
        Some(&id) => id,
        None => runtime::block_on(ops.db().last_complete_transaction())?
            .ok_or(Error::NothingToUndo)?
            .id,
    };

    let plan = runtime::block_on(ops.plan_undo(id))?;
    undo_transactions(&ops, vec![plan], Action::Undo, global, args.get_flag("sync"))
}

pub fn rollback(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    ops.authorize(Permission::REMOVE)?;

    let count = *args.get_one::<i64>("count").expect("required");
    let transactions = runtime::block_on(ops.db().undoable_transactions(count))?;
    if transactions.is_empty() {
        return Err(Error::NothingToUndo);
    }

    // Newest first, so the reversal replays backwards
    let mut plans = Vec::new();
    for transaction in &transactions {
        plans.push(runtime::block_on(ops.plan_undo(transaction.id))?);
    }
    undo_transactions(&ops, plans, Action::Rollback, global, args.get_flag("sync"))
}

/// Execute a batch of undo plans as one transaction: erases of everything
/// the originals installed, reinstalls of everything they removed or
/// replaced, then `undone_by` backpointers.
fn undo_transactions(
    ops: &Operations,
    plans: Vec<UndoPlan>,
    action: Action,
    global: &GlobalArgs,
    sync: bool,
) -> Result<(), Error> {
    let mut erase_names = Vec::new();
    let mut install_specs = Vec::new();
    let mut undone_ids = Vec::new();
    for plan in &plans {
        for problem in &plan.problems {
            eprintln!("warning: {problem}");
        }
        erase_names.extend(plan.erase_names.iter().cloned());
        install_specs.extend(plan.install_specs.iter().cloned());
        undone_ids.push(plan.transaction_id);
    }

    println!("Undoing transaction(s) {undone_ids:?}:");
    for name in &erase_names {
        println!("  remove   {name}");
    }
    for spec in &install_specs {
        println!("  install  {spec}");
    }
    if !super::confirm("Continue?", global.yes) {
        return Err(Error::Declined);
    }

    // Re-obtain the NEVRAs to reinstall, where the media still carry them
    let mut resolver = runtime::block_on(ops.make_resolver())?;
    let mut reinstall_names = Vec::new();
    for spec in &install_specs {
        let records = runtime::block_on(ops.db().get_package_smart(spec))?;
        match records.first() {
            Some(record) => reinstall_names.push(record.meta.name().to_owned()),
            None => eprintln!("warning: {spec} is no longer available from any media"),
        }
    }

    let mut plan = if reinstall_names.is_empty() {
        Default::default()
    } else {
        resolver.with_suggests = false;
        let plan = resolver.resolve_install(&reinstall_names, None);
        if !plan.success {
            super::install::print_problems(&plan);
            return Err(Error::Unresolvable);
        }
        plan
    };

    // The erase leg rides the same queue as coupled erases
    let settings = crate::ops::Settings {
        sync,
        ..Default::default()
    };
    let command_line = format!("urpm {} {undone_ids:?}", action.as_str());

    let (items, local) = runtime::block_on(ops.build_download_items(&plan.actions, &resolver))?;
    let download = runtime::block_on(ops.download_packages(items, &settings, None))?;
    let missing = download.missing();
    if !missing.is_empty() {
        return Err(Error::Ops(crate::ops::Error::MissingPackages(missing)));
    }

    let mut rpm_paths: Vec<std::path::PathBuf> =
        download.results.iter().filter_map(|r| r.path.clone()).collect();
    rpm_paths.extend(local);

    // Record the reversal itself, erases included
    for name in &erase_names {
        plan.actions.push(crate::resolver::PackageAction {
            name: name.clone(),
            nevra: name.clone(),
            evr: String::new(),
            arch: String::new(),
            action: crate::resolver::ActionKind::Remove,
            reason: crate::resolver::Reason::Explicit,
            previous_nevra: None,
            media_name: String::new(),
            filesize: 0,
            size: 0,
        });
    }

    let transaction_id =
        runtime::block_on(ops.begin_transaction(action, &command_line, &plan.actions))?;

    let mut queue_progress = |_op: &str, name: &str, current: u64, total: u64| {
        println!("  [{current}/{total}] {name}");
    };
    let queue = ops.execute_install(
        rpm_paths,
        erase_names,
        Vec::new(),
        &settings,
        Some(&mut queue_progress),
    )?;

    if queue.success {
        runtime::block_on(ops.complete_transaction(transaction_id))?;
        for id in undone_ids {
            runtime::block_on(ops.db().mark_undone(id, transaction_id))?;
        }
        println!("Transaction {transaction_id} complete.");
        Ok(())
    } else {
        runtime::block_on(ops.abort_transaction(transaction_id))?;
        for op in &queue.operations {
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
    #[error("store: {0}")]
    Database(#[from] crate::db::Error),
    #[error("no transaction {0}")]
    NoSuchTransaction(i64),
    #[error("no completed transaction to undo")]
    NothingToUndo,
    #[error("unresolvable request")]
    Unresolvable,
    #[error("aborted by user")]
    Declined,
    #[error("transaction failed")]
    Transaction,
}
