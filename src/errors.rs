//! Error Types
//!
//! The error taxonomy from §7: resource shortage, render-graph construction
//! errors, GPU acquisition failure, and asset load failure. Internal
//! invariant violations (deque overflow, a torn snapshot read) are not
//! represented here — §7 marks those process-fatal, so they `panic!` at
//! the point of violation rather than flowing through [`PyriteError`].

use thiserror::Error;

/// The top-level error type the engine's public API returns.
#[derive(Error, Debug)]
pub enum PyriteError {
    /// The transient resource pool is exhausted; the affected pass is
    /// skipped for this frame rather than failing the whole frame (§7).
    #[error("transient resource pool exhausted: {0}")]
    PoolExhausted(String),

    /// The render graph declares a cycle between passes. Compilation
    /// still produces a topological prefix (§7, §8 S6) so this is
    /// reported, not treated as fatal.
    #[error("render graph contains a cycle")]
    GraphCycle,

    /// A pass reads or writes a resource handle that was never declared
    /// by an earlier `create`/`import_texture` call.
    #[error("render graph references a dangling resource handle: {0:?}")]
    DanglingHandle(pyrite_graph::ResourceHandle),

    /// `begin_frame` returned no command handle; the render task exits
    /// early with no barriers and no submission (§7).
    #[error("GPU backend did not provide a command handle for this frame")]
    NoCommandHandle,

    /// An async asset load failed outright (as opposed to the "callback
    /// never invoked" convention for a lighter-weight miss, §7).
    #[error("failed to load asset {path}: {reason}")]
    AssetLoadFailed { path: String, reason: String },

    /// Engine configuration failed validation before the scheduler or
    /// renderer were ever constructed.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(String),
}

/// Alias for `Result<T, PyriteError>`.
pub type Result<T> = std::result::Result<T, PyriteError>;
