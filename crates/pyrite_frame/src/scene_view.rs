//! The per-frame view the render phase builds from the committed snapshot
//! (§4.9 step 5): camera matrices, light parameters, viewport, and time.

use glam::{Mat4, Vec3};

/// Everything the render task needs that isn't already in the
/// [`pyrite_scene::RenderSceneSnapshot`] it's handed — built fresh each
/// render phase, never mutated afterward.
#[derive(Debug, Clone, Copy)]
pub struct SceneView {
    pub camera_view: Mat4,
    pub camera_proj: Mat4,
    pub camera_near: f32,
    pub camera_far: f32,
    pub light_direction: Vec3,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub time: f32,
}

impl SceneView {
    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.viewport_width as f32 / self.viewport_height.max(1) as f32
    }
}
