//! Integration tests exercising `FrameOrchestrator` end to end through
//! only `pyrite_frame`'s public API, against the `NullBackend` test
//! double (§8 scenario S5) and the standalone shadow cascade math it
//! drives each render phase.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use glam::{Mat4, Vec3};
use pyrite_frame::{derive_cascades, FrameOrchestrator, SceneView, ShadowConfig};
use pyrite_rhi::null_backend::NullBackend;
use pyrite_rhi::RenderHardwareInterface;
use pyrite_scene::{BoundingBox, LogicScene, MeshBoundsTable};
use pyrite_scheduler::TaskScheduler;

fn scene_view(time: f32) -> SceneView {
    SceneView {
        camera_view: Mat4::look_at_rh(Vec3::new(0.0, 4.0, 10.0), Vec3::ZERO, Vec3::Y),
        camera_proj: Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 200.0),
        camera_near: 0.1,
        camera_far: 200.0,
        light_direction: Vec3::new(-0.4, -1.0, -0.3),
        viewport_width: 1920,
        viewport_height: 1080,
        time,
    }
}

#[test]
fn s5_fixed_timestep_division_holds_against_the_null_backend() {
    let scheduler = TaskScheduler::new(2);
    scheduler.attach_main_thread();

    let null_backend = Arc::new(NullBackend::new());
    let backend: Arc<dyn RenderHardwareInterface> = Arc::clone(&null_backend);

    let mut scene = LogicScene::new();
    scene.spawn(Mat4::IDENTITY, 0, 0, false);
    let mesh_bounds = MeshBoundsTable::new();
    mesh_bounds.set(0, BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)));

    let mut orchestrator = FrameOrchestrator::new(scheduler, 0.010, ShadowConfig::default());

    let iterations_remaining = AtomicUsize::new(10);
    let logic_calls = Arc::new(AtomicUsize::new(0));
    let logic_calls_clone = Arc::clone(&logic_calls);

    orchestrator.run(
        backend,
        &mut scene,
        &mesh_bounds,
        || {
            let remaining = iterations_remaining.load(Ordering::Relaxed);
            if remaining == 0 {
                false
            } else {
                iterations_remaining.store(remaining - 1, Ordering::Relaxed);
                true
            }
        },
        || 0.010,
        move |_scene, _dt| {
            logic_calls_clone.fetch_add(1, Ordering::Relaxed);
        },
        |_scene, time| scene_view(time),
    );

    assert_eq!(logic_calls.load(Ordering::Relaxed), 10);
    let calls = null_backend.begin_frame_call_count();
    assert!(calls >= 1 && calls <= 10, "begin_frame called {calls} times, expected between 1 and 10");
    assert!(orchestrator.fps() > 0.0);
}

#[test]
fn shadow_cascades_stay_in_lockstep_with_the_orchestrators_split_view() {
    let view = scene_view(0.0);
    let scene_aabb = BoundingBox::new(Vec3::splat(-50.0), Vec3::splat(50.0));

    let cascades = derive_cascades(&view, 4, 0.6, Vec3::new(-0.4, -1.0, -0.3), 2048, scene_aabb, 25.0);

    assert_eq!(cascades.len(), 4);
    assert!((cascades.last().unwrap().split_depth - view.camera_far).abs() < 1e-3);
}
