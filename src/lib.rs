//! Pyrite — the concurrency and frame-orchestration core of a real-time 3D
//! rendering engine.
//!
//! This crate is the façade: it wires together the fiber-based scheduler
//! (`pyrite_scheduler`), the render-graph-driven frame orchestrator
//! (`pyrite_frame`), and the scene/extraction layer (`pyrite_scene`) behind
//! a single [`Engine`] entry point, following the teacher's `App`/`Engine`
//! split (construct with configuration, inject collaborators, `run` blocks
//! the caller). The concrete GPU backend, asset decoding, window/input,
//! and game-side update logic are all out of scope (§1) — `Engine` takes
//! them as injected collaborators rather than constructing them itself.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

mod assets;
mod config;
mod errors;
mod logging;

pub use assets::{AsyncImageLoader, AsyncMeshLoader, ImageData, ImageLoadCallback, MeshData, MeshLoadCallback};
pub use config::{BackendChoice, EngineConfig};
pub use errors::{PyriteError, Result};
pub use logging::init_logging;

pub use pyrite_frame::{FpsCounter, SceneView, ShadowConfig, SystemClock};
pub use pyrite_rhi::RenderHardwareInterface;
pub use pyrite_scene::{BoundingBox, EntityId, LogicScene, MeshBoundsTable};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use pyrite_frame::FrameOrchestrator;
use pyrite_scheduler::TaskScheduler;

/// The engine façade (§6 "Exposed to the game layer"). Owns the scheduler,
/// the frame orchestrator, and the logic-side scene; the GPU backend and
/// asset loaders are injected at construction, matching the teacher's
/// `App::with_renderer` pattern of letting the caller supply the heavy
/// collaborators.
pub struct Engine {
    config: EngineConfig,
    scheduler: Arc<TaskScheduler>,
    backend: Arc<dyn RenderHardwareInterface>,
    orchestrator: FrameOrchestrator,
    scene: LogicScene,
    mesh_bounds: MeshBoundsTable,
    mesh_loader: Option<Arc<dyn AsyncMeshLoader>>,
    image_loader: Option<Arc<dyn AsyncImageLoader>>,
    exit_requested: Arc<AtomicBool>,
}

impl Engine {
    /// Builds the engine from `config`, starting `config.worker_count`
    /// (or `0` resolved to available parallelism) scheduler workers and
    /// attaching the calling thread as worker 0 (§4.5: worker 0 is
    /// main-thread affine).
    ///
    /// `backend` is the GPU backend to drive; constructing a concrete one
    /// is out of this crate's scope (§1) — tests and headless runs pass
    /// `pyrite_rhi::null_backend::NullBackend`.
    pub fn new(config: EngineConfig, backend: Arc<dyn RenderHardwareInterface>) -> Result<Self> {
        let config = config.validated()?;
        log::info!("starting pyrite engine: \"{}\" ({}x{}, {} workers)", config.window_title, config.window_width, config.window_height, config.worker_count);

        let scheduler = TaskScheduler::new(config.worker_count);
        scheduler.attach_main_thread();
        let orchestrator = FrameOrchestrator::new(Arc::clone(&scheduler), config.fixed_timestep, config.shadow);

        Ok(Engine {
            config,
            scheduler,
            backend,
            orchestrator,
            scene: LogicScene::new(),
            mesh_bounds: MeshBoundsTable::new(),
            mesh_loader: None,
            image_loader: None,
            exit_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    #[must_use]
    pub fn with_mesh_loader(mut self, loader: Arc<dyn AsyncMeshLoader>) -> Self {
        self.mesh_loader = Some(loader);
        self
    }

    #[must_use]
    pub fn with_image_loader(mut self, loader: Arc<dyn AsyncImageLoader>) -> Self {
        self.image_loader = Some(loader);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn scene(&self) -> &LogicScene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut LogicScene {
        &mut self.scene
    }

    #[must_use]
    pub fn mesh_bounds(&self) -> &MeshBoundsTable {
        &self.mesh_bounds
    }

    #[must_use]
    pub fn mesh_loader(&self) -> Option<&Arc<dyn AsyncMeshLoader>> {
        self.mesh_loader.as_ref()
    }

    #[must_use]
    pub fn image_loader(&self) -> Option<&Arc<dyn AsyncImageLoader>> {
        self.image_loader.as_ref()
    }

    #[must_use]
    pub fn fps(&self) -> f32 {
        self.orchestrator.fps()
    }

    /// Requests that [`Engine::run`]'s main loop stop after its current
    /// iteration. Stands in for the out-of-scope window's close-request
    /// event (the teacher's `WindowEvent::CloseRequested` handler calling
    /// `event_loop.exit()`) — whatever drives window events in a full port
    /// calls this instead.
    pub fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::Relaxed);
    }

    /// A cloneable handle that can request shutdown from outside `Engine`
    /// itself — in particular from inside the `game_logic_fn` closure
    /// passed to [`Engine::run`], which only ever sees `&mut LogicScene`
    /// and can't reach back into a moved-from `Engine`.
    #[must_use]
    pub fn exit_handle(&self) -> ExitHandle {
        ExitHandle(Arc::clone(&self.exit_requested))
    }

    /// Blocks until [`Engine::request_exit`] is called, running the
    /// fixed-timestep logic/render loop in between (§4.9) and invoking
    /// `game_logic_fn(scene, fixed_dt)` once per logic phase (§6). Shuts
    /// the scheduler's render task down and waits for GPU idle before
    /// returning.
    pub fn run(mut self, game_logic_fn: impl FnMut(&mut LogicScene, f32), build_scene_view: impl FnMut(&LogicScene, f32) -> SceneView) {
        let exit_requested = Arc::clone(&self.exit_requested);
        let mut clock = SystemClock::new();

        let backend = Arc::clone(&self.backend);
        let mesh_bounds = &self.mesh_bounds;
        self.orchestrator.run(
            backend,
            &mut self.scene,
            mesh_bounds,
            move || !exit_requested.load(Ordering::Relaxed),
            move || clock.tick(),
            game_logic_fn,
            build_scene_view,
        );
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.scheduler.shutdown();
    }
}

/// A cloneable, `Send + Sync` handle that can request [`Engine::run`]'s
/// main loop to stop. See [`Engine::exit_handle`].
#[derive(Clone)]
pub struct ExitHandle(Arc<AtomicBool>);

impl ExitHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use pyrite_rhi::null_backend::NullBackend;
    use std::sync::atomic::AtomicUsize;

    fn test_backend() -> Arc<dyn RenderHardwareInterface> {
        Arc::new(NullBackend::new())
    }

    #[test]
    fn engine_runs_until_exit_is_requested() {
        let config = EngineConfig { worker_count: 2, ..EngineConfig::default() };
        let mut engine = Engine::new(config, test_backend()).expect("valid config");
        engine.scene_mut().spawn(Mat4::IDENTITY, 0, 0, false);
        engine.mesh_bounds().set(0, pyrite_scene::BoundingBox::new(glam::Vec3::splat(-0.5), glam::Vec3::splat(0.5)));

        let logic_calls = Arc::new(AtomicUsize::new(0));
        let logic_calls_clone = Arc::clone(&logic_calls);
        let exit_handle = engine.exit_handle();

        engine.run(
            move |_scene, _dt| {
                let calls = logic_calls_clone.fetch_add(1, Ordering::Relaxed) + 1;
                if calls >= 5 {
                    exit_handle.request();
                }
            },
            |_scene, time| SceneView {
                camera_view: Mat4::look_at_rh(glam::Vec3::new(0.0, 2.0, 5.0), glam::Vec3::ZERO, glam::Vec3::Y),
                camera_proj: Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0),
                camera_near: 0.1,
                camera_far: 100.0,
                light_direction: glam::Vec3::new(-0.3, -1.0, -0.2),
                viewport_width: 1280,
                viewport_height: 720,
                time,
            },
        );

        assert!(logic_calls.load(Ordering::Relaxed) >= 5);
    }

    #[test]
    fn invalid_fixed_timestep_is_rejected() {
        let config = EngineConfig { fixed_timestep: 0.0, ..EngineConfig::default() };
        let result = Engine::new(config, test_backend());
        assert!(matches!(result, Err(PyriteError::InvalidConfig(_))));
    }

    #[test]
    fn worker_count_zero_resolves_to_available_parallelism() {
        let config = EngineConfig { worker_count: 0, ..EngineConfig::default() };
        let resolved = config.validated().expect("valid config");
        assert!(resolved.worker_count >= 1);
    }
}
