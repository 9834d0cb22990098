// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! SIGINT/SIGTERM handling for a run.
//!
//! The handler only flips atomics. The runner polls [`INTERRUPTED`]
//! between steps and stops the matrix; once teardown has begun a further
//! signal only prints a notice, so cleanup always finishes.

use std::sync::atomic::{AtomicBool, Ordering};

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::{FxError, FxResult};

/// Set once an interrupt arrived.
pub static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Set while teardown runs.
pub static TEARING_DOWN: AtomicBool = AtomicBool::new(false);

const TEARDOWN_NOTICE: &[u8] = b"Umount a testing file system. Please wait.\n";

/// Record an interrupt unless teardown already started. Returns whether
/// the interrupt was recorded.
fn note_interrupt(interrupted: &AtomicBool, tearing_down: &AtomicBool) -> bool {
    if tearing_down.load(Ordering::SeqCst) {
        return false;
    }
    interrupted.store(true, Ordering::SeqCst);
    true
}

extern "C" fn handle_interrupt(_signo: nix::libc::c_int) {
    if !note_interrupt(&INTERRUPTED, &TEARING_DOWN) {
        // write(2) is async-signal-safe.
        let _ = nix::unistd::write(std::io::stderr(), TEARDOWN_NOTICE);
    }
}

/// Install the handler for SIGINT and SIGTERM.
pub fn install() -> FxResult<()> {
    let action = SigAction::new(
        SigHandler::Handler(handle_interrupt),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );

    for signal in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: the handler only touches atomics and calls write(2).
        unsafe { sigaction(signal, &action) }.map_err(|e| FxError::Syscall {
            syscall: "sigaction",
            message: format!("{}: {}", signal, e),
        })?;
    }

    tracing::debug!("Interrupt handler installed");
    Ok(())
}

pub fn interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// Mark the start of teardown; later signals no longer interrupt.
pub fn begin_teardown() {
    TEARING_DOWN.store(true, Ordering::SeqCst);
}
