// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::{Arg, ArgMatches, Command};
use thiserror::Error;

use crate::auth::Permission;
use crate::runtime;

use super::GlobalArgs;

pub fn hold_command() -> Command {
    Command::new("hold")
        .about("Freeze packages against upgrade and obsoletes replacement")
        .arg(Arg::new("packages").num_args(0..))
        .arg(Arg::new("reason").long("reason"))
}

pub fn unhold_command() -> Command {
    Command::new("unhold")
        .about("Release held packages")
        .arg(Arg::new("packages").num_args(1..).required(true))
}

pub fn hold(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    let names: Vec<String> = args
        .get_many::<String>("packages")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    // Without arguments, list current holds
    if names.is_empty() {
        let holds = runtime::block_on(ops.db().list_holds())?;
        if holds.is_empty() {
            println!("No packages held.");
        }
        for hold in holds {
            match hold.reason {
                Some(reason) => println!("{}  ({reason})", hold.package_name),
                None => println!("{}", hold.package_name),
            }
        }
        return Ok(());
    }

    ops.authorize(Permission::INSTALL)?;
    let reason = args.get_one::<String>("reason").map(String::as_str);
    for name in &names {
        if runtime::block_on(ops.db().add_hold(name, reason))? {
            println!("{name} held.");
        } else {
            println!("{name} was already held.");
        }
    }
    Ok(())
}

pub fn unhold(args: &ArgMatches, global: &GlobalArgs) -> Result<(), Error> {
    let ops = super::open(global)?;
    ops.authorize(Permission::INSTALL)?;

    for name in args.get_many::<String>("packages").into_iter().flatten() {
        if runtime::block_on(ops.db().remove_hold(name))? {
            println!("{name} released.");
        } else {
            println!("{name} was not held.");
        }
    }
    Ok(())
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Open(#[from] super::OpenError),
    #[error(transparent)]
    Auth(#[from] crate::auth::AuthError),
    #[error("store: {0}")]
    Database(#[from] crate::db::Error),
}
