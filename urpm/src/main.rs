// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

use tracing_subscriber::EnvFilter;

use urpm::{cli, runtime, signal};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let _rt = runtime::init();
    let _interrupt = match signal::install_interrupt_guard() {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("warning: {e}");
            None
        }
    };

    if let Err(e) = cli::process() {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}
