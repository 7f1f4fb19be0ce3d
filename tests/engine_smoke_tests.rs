//! Black-box smoke test for the `Engine` façade, exercised only through
//! `pyrite`'s public API (§6 "Exposed to the game layer").

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec3};
use pyrite::{BoundingBox, Engine, EngineConfig, SceneView};
use pyrite_rhi::null_backend::NullBackend;
use pyrite_rhi::RenderHardwareInterface;

#[test]
fn engine_drives_the_game_logic_closure_until_requested_to_exit() {
    let backend: Arc<dyn RenderHardwareInterface> = Arc::new(NullBackend::new());
    let config = EngineConfig { worker_count: 2, ..EngineConfig::default() };
    let mut engine = Engine::new(config, backend).expect("default config is valid");

    engine.scene_mut().spawn(Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)), 0, 0, false);
    engine.mesh_bounds().set(0, BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)));

    let logic_calls = Arc::new(AtomicUsize::new(0));
    let logic_calls_clone = Arc::clone(&logic_calls);
    let exit_handle = engine.exit_handle();

    engine.run(
        move |_scene, _dt| {
            let calls = logic_calls_clone.fetch_add(1, Ordering::Relaxed) + 1;
            if calls >= 3 {
                exit_handle.request();
            }
        },
        |_scene, time| SceneView {
            camera_view: Mat4::look_at_rh(Vec3::new(0.0, 3.0, 8.0), Vec3::ZERO, Vec3::Y),
            camera_proj: Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0),
            camera_near: 0.1,
            camera_far: 100.0,
            light_direction: Vec3::new(-0.3, -1.0, -0.2),
            viewport_width: 1280,
            viewport_height: 720,
            time,
        },
    );

    assert!(logic_calls.load(Ordering::Relaxed) >= 3);
}
