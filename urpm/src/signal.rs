// SPDX-FileCopyrightText: Copyright © 2024-2025 The urpm Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Signal handling

use std::sync::atomic::{AtomicU32, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet};
use thiserror::Error;

pub use nix::sys::signal::Signal;

static SIGINT_COUNT: AtomicU32 = AtomicU32::new(0);

extern "C" fn on_sigint(_: i32) {
    SIGINT_COUNT.fetch_add(1, Ordering::SeqCst);
}

/// Install the two-stage interrupt handler until [`Guard`] is dropped.
///
/// First Ctrl-C requests a graceful stop (the in-flight package is allowed
/// to finish), the second one aborts.
pub fn install_interrupt_guard() -> Result<Guard, Error> {
    SIGINT_COUNT.store(0, Ordering::SeqCst);
    let action = unsafe {
        sigaction(
            Signal::SIGINT,
            &SigAction::new(SigHandler::Handler(on_sigint), SaFlags::empty(), SigSet::empty()),
        )
        .map_err(Error::Install)?
    };
    Ok(Guard(PrevHandler {
        signal: Signal::SIGINT,
        action,
    }))
}

/// How far the user has escalated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    None,
    /// One press: finish the in-flight package, then stop
    Requested,
    /// Two or more presses: abort now
    Abort,
}

pub fn interrupt_state() -> Interrupt {
    match SIGINT_COUNT.load(Ordering::SeqCst) {
        0 => Interrupt::None,
        1 => Interrupt::Requested,
        _ => Interrupt::Abort,
    }
}

/// A guard which restores the previous signal
/// handler when dropped
pub struct Guard(PrevHandler);

impl Drop for Guard {
    fn drop(&mut self) {
        unsafe {
            let _ = sigaction(self.0.signal, &self.0.action);
        }
    }
}

struct PrevHandler {
    signal: Signal,
    action: SigAction,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("install signal handler")]
    Install(#[source] nix::Error),
}
