//! The render hardware interface: the capability-set trait the render
//! graph and frame orchestrator are written against, and the value types
//! that cross that boundary.
//!
//! Per §9's design note, the real source used virtual dispatch over the
//! GPU backend; the re-expression here is a single capability-set trait
//! ([`RenderHardwareInterface`]) rather than an inheritance hierarchy — one
//! concrete backend (the real GPU implementation) is out of this
//! workspace's scope (§1), so only the [`null_backend`] test double lives
//! here.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

mod interface;
#[cfg(feature = "null-backend")]
pub mod null_backend;
mod types;

pub use interface::RenderHardwareInterface;
pub use types::{BufferHandle, CommandHandle, ResourceState, TextureDesc, TextureFormat, TextureHandle, TextureUsage};
