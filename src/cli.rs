//! Small pieces shared by `mkfs.wtfs` and `statfs.wtfs`: fatal-error
//! reporting in the corpus's own `{prog}: {msg}` + `exit(1)` idiom (see
//! `mkfs/src/main.rs`, `fdisk/src/main.rs`), rather than panicking or
//! unwinding.

use std::fmt;
use std::process::exit;

/// Prints `{prog}: {msg}` to stderr and exits the process with status 1.
/// Never returns.
pub fn fatal(prog: &str, msg: impl fmt::Display) -> ! {
    eprintln!("{prog}: {msg}");
    exit(1);
}

/// Prints `{prog}: Failed to {stage}: {err}` to stderr and exits 1, the
/// one-line "Failed to <stage>" framing `spec.md` §7 requires of CLI
/// tools.
pub fn fatal_stage(prog: &str, stage: &str, err: impl fmt::Display) -> ! {
    eprintln!("{prog}: Failed to {stage}: {err}");
    exit(1);
}
