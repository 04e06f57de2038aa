// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::runtime;

use super::GlobalArgs;

pub fn command() -> Command {
    Command::new("mark")
        .about("Manage the installed-reason state used for orphan detection")
        .subcommand_required(true)
        .subcommand(
            Command::new("manual")
                .about("Mark packages as explicitly installed")
                .arg(Arg::new("packages").num_args(1..).required(true)),
        )
        .subcommand(
            Command::new("auto")
                .about("Mark packages as dependency-installed")
                .arg(Arg::new("packages").num_args(1..).required(true)),
        )
        .subcommand(Command::new("show").about("List dependency-installed packages"))
}

pub fn handle(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;

    match args.subcommand() {
        Some(("show", _)) => {
            let resolver = runtime::block_on(ops.make_resolver())?;
            let marked = resolver.dependency_marked();
            if marked.is_empty() {
                println!("No packages are marked as dependencies.");
            }
            for name in marked {
                println!("{name}");
            }
            Ok(())
        }
        Some((verb @ ("manual" | "auto"), sub)) => {
            ops.authorize(Permission::INSTALL)?;
            let names: Vec<String> = sub
                .get_many::<String>("packages")
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            let resolver = runtime::block_on(ops.make_resolver())?;
            if verb == "manual" {
                resolver.mark_as_explicit(&names)?;
            } else {
                resolver.mark_as_dependency(&names)?;
            }
            println!("Marked {} packages as {verb}.", names.len());
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
    #[error(transparent)]
    Ops(#[from] crate::ops::Error),
    #[error("reason file: {0}")]
    Reasons(#[from] crate::resolver::reasons::Error),
}
