//! Frame orchestration: the fixed-timestep logic/render loop, the
//! triple-buffered snapshot publication it drives, and cascaded shadow map
//! derivation for the render task it spawns each frame (§4.9).

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

mod cull;
mod fps;
mod orchestrator;
mod scene_view;
mod shadow;
mod triple_buffer;

pub use fps::FpsCounter;
pub use orchestrator::{FrameOrchestrator, ShadowConfig, SystemClock};
pub use scene_view::SceneView;
pub use shadow::{Cascade, build_cascade_view_proj, compute_cascade_splits, compute_frustum_corners_world, derive_cascades};
