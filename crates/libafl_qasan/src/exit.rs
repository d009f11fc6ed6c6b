//! # exit
//! Process termination for errors that cannot be handed back to the guest.
use core::fmt::Arguments;
use std::process;

use log::error;

/// Logs `msg`, echoes it to stderr and aborts the whole process.
pub fn fatal(msg: Arguments<'_>) -> ! {
    error!("{msg}");
    eprintln!("==QASan== {msg}");
    process::abort()
}
