// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::db::history::Action;
use crate::ops::{Operations, PlanOutcome, Settings};
use crate::resolver::{ActionKind, Resolver, ResolverResult};
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("install")
        .visible_alias("i")
        .about("Install packages from media or local RPM files")
        .arg(
            Arg::new("packages")
                .help("Package names, capabilities or .rpm paths")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("choice")
                .long("choice")
                .help("Resolve a provider ambiguity: capability=package")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("no-recommends")
                .long("no-recommends")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("with-suggests")
                .long("with-suggests")
                .action(ArgAction::SetTrue),
        )
        .arg(Arg::new("force").long("force").action(ArgAction::SetTrue))
        .arg(Arg::new("test").long("test").action(ArgAction::SetTrue))
        .arg(
            Arg::new("reinstall")
                .long("reinstall")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("nosignature")
                .long("nosignature")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("no-peers")
                .long("no-peers")
                .help("Skip LAN peers, download from mirrors only")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("only-peers")
                .long("only-peers")
                .help("Fail rather than fall back to mirrors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("sync")
                .long("sync")
                .help("Wait for scriptlets instead of returning early")
                .action(ArgAction::SetTrue),
        )
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    ops.authorize(Permission::INSTALL)?;

    let specs: Vec<String> = args
        .get_many::<String>("packages")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    let settings = settings_from(args);
    let choices = parse_choices(args);

    let mut resolver = runtime::block_on(ops.make_resolver())?;
    resolver.with_suggests = args.get_flag("with-suggests");

    // Local .rpm paths enter the pool, names resolve against it
    let (local_paths, names): (Vec<_>, Vec<_>) = specs
        .into_iter()
        .partition(|s| s.ends_with(".rpm") && (s.contains('/') || s.starts_with('.')));
    let local_paths: Vec<PathBuf> = local_paths.into_iter().map(PathBuf::from).collect();
    let mut requested = names;
    requested.extend(resolver.add_local_rpms(&local_paths)?);

    let plan = resolver.resolve_install(&requested, choices.as_ref());
    for warning in resolver.take_warnings() {
        eprintln!("warning: {warning}");
    }

    if !plan.success {
        print_problems(&plan);
        return Err(Error::Unresolvable);
    }
    if plan.actions.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }

    print_plan(&plan);
    if !super::confirm("Continue?", global.yes) {
        return Err(Error::Declined);
    }

    let command_line = format!("urpm install {}", requested.join(" "));
    let outcome = run_plan(
        &ops,
        &resolver,
        &plan,
        Action::Install,
        &command_line,
        Vec::new(),
        &settings,
    )?;

    report_outcome(&outcome)
}

/// Shared by install and upgrade: download, queue, history, reporting
pub(crate) fn run_plan(
    ops: &Operations,
    resolver: &Resolver,
    plan: &ResolverResult,
    action: Action,
    command_line: &str,
    orphan_names: Vec<String>,
    settings: &Settings,
) -> Result<PlanOutcome, Error> {
    let download_progress = |update: crate::download::ProgressUpdate<'_>| {
        print!(
            "\r  downloading {}/{} ({} / {})      ",
            update.completed,
            update.total,
            super::format_size(update.bytes_done),
            super::format_size(update.bytes_total),
        );
        let _ = std::io::Write::flush(&mut std::io::stdout());
    };
    let mut queue_progress = |_op: &str, name: &str, current: u64, total: u64| {
        println!("  [{current}/{total}] {name}");
    };

    let outcome = runtime::block_on(ops.apply_plan(
        resolver,
        plan,
        action,
        command_line,
        orphan_names,
        settings,
        Some(&download_progress),
        Some(&mut queue_progress),
    ))?;
    println!();
    Ok(outcome)
}

pub(crate) fn report_outcome(outcome: &PlanOutcome) -> Result<(), Error> {
    if outcome.interrupted {
        eprintln!(
            "Interrupted; transaction {} marked as interrupted. \
             Run `urpm autoremove --faildeps` to clean up.",
            outcome.transaction_id
        );
        return Err(Error::Interrupted);
    }
    if outcome.download.downloaded + outcome.download.cached > 0 {
        println!(
            "Fetched {} packages ({} cached, {} from peers, {} from mirrors)",
            outcome.download.downloaded + outcome.download.cached,
            outcome.download.cached,
            outcome.download.from_peers,
            outcome.download.from_upstream,
        );
    }
    if outcome.queue.success {
        println!("Transaction {} complete.", outcome.transaction_id);
        Ok(())
    } else {
        for op in &outcome.queue.operations {
            for error in &op.errors {
                eprintln!("error: {error}");
            }
        }
        if !outcome.queue.overall_error.is_empty() {
            eprintln!("error: {}", outcome.queue.overall_error);
        }
        Err(Error::Transaction)
    }
}

pub(crate) fn print_plan(plan: &ResolverResult) {
    for action in &plan.actions {
        let tag = match action.action {
            ActionKind::Install => "install",
            ActionKind::Upgrade => "upgrade",
            ActionKind::Remove => "remove ",
            ActionKind::Downgrade => "downgrade",
        };
        match &action.previous_nevra {
            Some(previous) if action.action != ActionKind::Remove => {
                println!("  {tag}  {} (replacing {previous})", action.nevra);
            }
            _ => println!("  {tag}  {} [{}]", action.nevra, action.media_name),
        }
    }
    if plan.install_size > 0 {
        println!("Installed size: {}", super::format_size(plan.install_size));
    }
    if plan.upgrade_size_delta != 0 {
        println!("Upgrade size delta: {} bytes", plan.upgrade_size_delta);
    }
}

pub(crate) fn print_problems(plan: &ResolverResult) {
    for problem in &plan.problems {
        eprintln!("error: {problem}");
    }
    for alternative in &plan.alternatives {
        eprintln!(
            "note: {} is provided by: {} (pick one with --choice {}=<name>)",
            alternative.capability,
            alternative.providers.join(", "),
            alternative.capability
        );
    }
}

/// Tolerates verbs that only define a subset of the shared flags
fn flag(args: &ArgMatches, name: &str) -> bool {
    args.try_get_one::<bool>(name)
        .ok()
        .flatten()
        .copied()
        .unwrap_or(false)
}

pub(crate) fn settings_from(args: &ArgMatches) -> Settings {
    Settings {
        verify_signatures: !flag(args, "nosignature"),
        force: flag(args, "force"),
        test: flag(args, "test"),
        reinstall: flag(args, "reinstall"),
        use_peers: !flag(args, "no-peers"),
        only_peers: flag(args, "only-peers"),
        sync: flag(args, "sync"),
        ..Default::default()
    }
}

fn parse_choices(args: &ArgMatches) -> Option<HashMap<String, String>> {
    let choices: HashMap<String, String> = args
        .get_many::<String>("choice")
        .into_iter()
        .flatten()
        .filter_map(|c| {
            c.split_once('=')
                .map(|(capability, name)| (capability.to_owned(), name.to_owned()))
        })
        .collect();
    (!choices.is_empty()).then_some(choices)
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
    LocalRpm(#[from] crate::rpmdb::Error),
    #[error("unresolvable request")]
    Unresolvable,
    #[error("aborted by user")]
    Declined,
    #[error("interrupted by user")]
    Interrupted,
    #[error("transaction failed")]
    Transaction,
}
