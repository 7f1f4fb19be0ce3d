//! The immutable per-frame scene snapshot (§4.6, §3) and the parallel
//! extractor that fills it from the game-logic scene.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

mod bounds;
mod entity;
mod extractor;
mod snapshot;

pub use bounds::BoundingBox;
pub use entity::{EntityId, LogicScene, MeshBoundsTable};
pub use extractor::extract;
pub use snapshot::RenderSceneSnapshot;
