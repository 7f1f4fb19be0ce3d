//! Logging initialization via `env_logger`, following the teacher's
//! convention of `log::info!` at startup milestones and `log::warn!`/
//! `log::error!` at the resource-shortage and graph-construction-error
//! boundaries named in §7. Hot-path code (the worker loop, the deque, the
//! counter) does not log at all.

/// Initializes the global `log` logger from the `RUST_LOG` environment
/// variable, defaulting to `info` when unset. Safe to call more than
/// once; subsequent calls are no-ops (`env_logger::try_init` swallows the
/// "already initialized" error).
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
