// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use clap::Command;

pub fn command() -> Command {
    Command::new("version").about("Print version info and exit")
}

/// Print program version
pub fn print() {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
}
