//! Conditional diagnostic tracing, gated by the `WTFS_DEBUG` environment
//! variable. Mirrors the original kernel module's `wtfs_debug` macro, which
//! compiles to a no-op unless a debug build flag is set.

use std::sync::OnceLock;

static DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

pub fn debug_enabled() -> bool {
    *DEBUG_ENABLED.get_or_init(|| std::env::var_os("WTFS_DEBUG").is_some())
}

macro_rules! wtfs_debug {
    ($($arg:tt)*) => {
        if $crate::log::debug_enabled() {
            eprint!("[wtfs] ");
            eprintln!($($arg)*);
        }
    };
}
pub(crate) use wtfs_debug;

/// Finer-grained tracing than `wtfs_debug!`, for per-block chain walks and
/// bitmap searches; gated behind the same `WTFS_DEBUG` switch since this
/// crate has no separate verbosity levels, unlike the kernel module's
/// compile-time `wtfs_debug`/`wtfs_error` split.
macro_rules! wtfs_trace {
    ($($arg:tt)*) => {
        if $crate::log::debug_enabled() {
            eprint!("[wtfs:trace] ");
            eprintln!($($arg)*);
        }
    };
}
pub(crate) use wtfs_trace;
