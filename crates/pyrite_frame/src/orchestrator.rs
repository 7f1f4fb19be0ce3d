//! [`FrameOrchestrator`]: the fixed-timestep logic/render loop (§4.9).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;
use pyrite_graph::{RenderGraph, TransientResourcePool};
use pyrite_rhi::{RenderHardwareInterface, ResourceState, TextureDesc, TextureFormat, TextureUsage};
use pyrite_scene::{LogicScene, MeshBoundsTable};
use pyrite_scheduler::{Counter, TaskScheduler};

use crate::cull;
use crate::fps::FpsCounter;
use crate::scene_view::SceneView;
use crate::shadow::derive_cascades;
use crate::triple_buffer::TripleBuffer;

/// `render_inflight_index`'s sentinel meaning "the renderer has no frame
/// in flight" (§3).
const RENDER_IDLE: usize = usize::MAX;

/// Caps a single iteration's measured `frame_time` to prevent the "spiral
/// of death" where a slow frame causes the next logic phase to simulate an
/// even larger timestep (§4.9 step 3).
const MAX_FRAME_TIME_SECS: f32 = 0.25;

/// Number of render-phase iterations between `TransientResourcePool::trim`
/// calls (§4.8's **[ADDED]** `trim`, exposed here as `maybe_prune`).
const PRUNE_INTERVAL_FRAMES: u32 = 120;
/// Idle-frame threshold passed to `trim` — an entry survives this many
/// prune calls unused before being destroyed.
const MAX_IDLE_PRUNE_FRAMES: u32 = 4;

/// Shadow cascade parameters the render task derives cascades from every
/// frame. Exposed separately from `EngineConfig` (the root crate, not yet
/// built) so this crate has no upward dependency on it.
#[derive(Debug, Clone, Copy)]
pub struct ShadowConfig {
    pub cascade_count: u32,
    pub lambda: f32,
    pub light_direction: Vec3,
    pub shadow_map_size: u32,
    pub z_buffer: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        ShadowConfig {
            cascade_count: 4,
            lambda: 0.6,
            light_direction: Vec3::new(-0.3, -1.0, -0.2),
            shadow_map_size: 2048,
            z_buffer: 25.0,
        }
    }
}

/// Wraps a raw pointer so it can cross into a `'static`-bound spawned
/// task; sound only because the caller waits on the matching counter
/// before the pointee is invalidated. See `pyrite_scene::extractor`'s
/// `ScopedPtr` for the same pattern applied to extraction.
struct ScopedPtr<T: ?Sized>(*mut T);

// SAFETY: see `ScopedPtr`'s doc comment.
unsafe impl<T: ?Sized> Send for ScopedPtr<T> {}
unsafe impl<T: ?Sized> Sync for ScopedPtr<T> {}

/// Drives the fixed-timestep logic/render loop: triple-buffered snapshot
/// publication, async render task submission, and periodic transient-pool
/// pruning (§4.9).
pub struct FrameOrchestrator {
    scheduler: Arc<TaskScheduler>,
    buffers: Arc<TripleBuffer>,
    pool: Arc<TransientResourcePool>,
    current_write_index: usize,
    last_committed_index: Arc<AtomicUsize>,
    render_inflight_index: Arc<AtomicUsize>,
    render_task_counter: Counter,
    accumulator: f32,
    fixed_dt: f32,
    fps: FpsCounter,
    frames_since_prune: u32,
    shadow_config: ShadowConfig,
}

impl FrameOrchestrator {
    #[must_use]
    pub fn new(scheduler: Arc<TaskScheduler>, fixed_dt: f32, shadow_config: ShadowConfig) -> Self {
        FrameOrchestrator {
            scheduler,
            buffers: Arc::new(TripleBuffer::new()),
            pool: Arc::new(TransientResourcePool::new()),
            current_write_index: 0,
            last_committed_index: Arc::new(AtomicUsize::new(0)),
            render_inflight_index: Arc::new(AtomicUsize::new(RENDER_IDLE)),
            render_task_counter: Counter::new(0),
            accumulator: 0.0,
            fixed_dt,
            fps: FpsCounter::new(),
            frames_since_prune: 0,
            shadow_config,
        }
    }

    #[must_use]
    pub fn fps(&self) -> f32 {
        self.fps.fps()
    }

    /// Runs the main loop until `poll_events` returns `false`, per §4.9's
    /// five-step iteration. `poll_events` stands in for the out-of-scope
    /// window/input subsystem (§1) — it returns whether the host window is
    /// still open. `clock` supplies the measured wall-clock delta each
    /// iteration; production callers use [`std::time::Instant`]-based
    /// timing (see the free function in this module used by this crate's
    /// own tests for a deterministic substitute).
    pub fn run(
        &mut self,
        backend: Arc<dyn RenderHardwareInterface>,
        scene: &mut LogicScene,
        mesh_bounds: &MeshBoundsTable,
        mut poll_events: impl FnMut() -> bool,
        mut tick: impl FnMut() -> f32,
        mut game_logic_fn: impl FnMut(&mut LogicScene, f32),
        mut build_scene_view: impl FnMut(&LogicScene, f32) -> SceneView,
    ) {
        let mut wall_time = 0.0f32;

        loop {
            self.scheduler.pump_main_thread_tasks();
            if !poll_events() {
                break;
            }

            let frame_time = tick().min(MAX_FRAME_TIME_SECS);
            self.fps.record_frame(frame_time);
            self.accumulator += frame_time;

            while self.accumulator >= self.fixed_dt {
                self.logic_phase(scene, mesh_bounds, &mut game_logic_fn, wall_time);
                self.accumulator -= self.fixed_dt;
                wall_time += self.fixed_dt;
            }

            self.render_phase(&backend, scene, wall_time, &mut build_scene_view);
            self.maybe_prune(backend.as_ref());
        }

        self.shutdown(backend.as_ref());
    }

    fn logic_phase(&mut self, scene: &mut LogicScene, mesh_bounds: &MeshBoundsTable, game_logic_fn: &mut dyn FnMut(&mut LogicScene, f32), _wall_time: f32) {
        let next_write_index = (self.current_write_index + 1) % 3;
        if next_write_index == self.render_inflight_index.load(Ordering::Acquire) {
            // The renderer hasn't finished reading this slot yet; wait
            // for it rather than overwrite a snapshot still in flight.
            self.scheduler.wait(&self.render_task_counter, None);
        }
        self.current_write_index = next_write_index;

        let scene_ptr = ScopedPtr(std::ptr::from_mut(scene));
        let logic_fn_ptr = ScopedPtr(std::ptr::from_mut::<dyn FnMut(&mut LogicScene, f32)>(game_logic_fn));
        let fixed_dt = self.fixed_dt;
        let logic_counter = Counter::new(0);
        self.scheduler.spawn(
            Box::new(move || {
                // SAFETY: `scene_ptr`/`logic_fn_ptr` point at this
                // function's borrowed parameters, both of which stay
                // alive until `wait` below returns.
                let scene = unsafe { &mut *scene_ptr.0 };
                let game_logic_fn = unsafe { &mut *logic_fn_ptr.0 };
                game_logic_fn(scene, fixed_dt);
            }),
            Some(&logic_counter),
        );
        self.scheduler.wait(&logic_counter, None);

        // SAFETY: `current_write_index` never equals `render_inflight_index`
        // here, by the check above, so no render task holds a reference
        // into this slot.
        let slot = unsafe { self.buffers.slot_mut(self.current_write_index) };
        pyrite_scene::extract(&self.scheduler, scene, mesh_bounds, slot);

        self.last_committed_index.store(self.current_write_index, Ordering::Release);
    }

    fn render_phase(&mut self, backend: &Arc<dyn RenderHardwareInterface>, scene: &LogicScene, wall_time: f32, build_scene_view: &mut dyn FnMut(&LogicScene, f32) -> SceneView) {
        // `render_inflight_index` holds a single slot value, so at most one
        // render task may be outstanding at a time — otherwise a second
        // spawn below would clobber the first task's recorded slot and
        // `logic_phase`'s collision check would stop seeing it. Block here
        // rather than let the scheduler pile up a second render task.
        self.scheduler.wait(&self.render_task_counter, None);

        let render_idx = self.last_committed_index.load(Ordering::Acquire);
        let scene_view = build_scene_view(scene, wall_time);
        self.render_inflight_index.store(render_idx, Ordering::Release);

        let backend = Arc::clone(backend);
        let buffers = Arc::clone(&self.buffers);
        let pool = Arc::clone(&self.pool);
        let scheduler = Arc::clone(&self.scheduler);
        let render_inflight_index = Arc::clone(&self.render_inflight_index);
        let shadow_config = self.shadow_config;

        self.scheduler.spawn(
            Box::new(move || {
                // SAFETY: the wait above guarantees no other render task is
                // outstanding when this one is spawned, so `render_idx` is
                // not aliased by any other in-flight `slot`/`slot_mut` call;
                // this task is itself the only reader of this slot until it
                // stores `RENDER_IDLE` back below.
                let snapshot = unsafe { buffers.slot(render_idx) };
                run_render_task(&scheduler, backend.as_ref(), pool.as_ref(), &scene_view, snapshot, shadow_config);
                render_inflight_index.store(RENDER_IDLE, Ordering::Release);
            }),
            Some(&self.render_task_counter),
        );
    }

    /// **[ADDED]** Periodic `TransientResourcePool::trim` invocation (§4.8),
    /// called from the render phase rather than every frame.
    fn maybe_prune(&mut self, backend: &dyn RenderHardwareInterface) {
        self.frames_since_prune += 1;
        if self.frames_since_prune < PRUNE_INTERVAL_FRAMES {
            return;
        }
        self.frames_since_prune = 0;
        self.pool.trim(MAX_IDLE_PRUNE_FRAMES, backend);
    }

    /// Waits for the in-flight render task, drives the GPU idle, per
    /// §4.9's shutdown sequence.
    fn shutdown(&mut self, backend: &dyn RenderHardwareInterface) {
        self.scheduler.wait(&self.render_task_counter, None);
        backend.wait_idle();
    }
}

fn run_render_task(scheduler: &TaskScheduler, backend: &dyn RenderHardwareInterface, pool: &TransientResourcePool, scene_view: &SceneView, snapshot: &pyrite_scene::RenderSceneSnapshot, shadow_config: ShadowConfig) {
    let view_proj = scene_view.camera_proj * scene_view.camera_view;
    let visible = cull::cull_and_sort(scheduler, view_proj, snapshot);
    let scene_aabb = cull::compute_scene_aabb(snapshot, &visible);

    let cascades = derive_cascades(
        scene_view,
        shadow_config.cascade_count,
        shadow_config.lambda,
        shadow_config.light_direction,
        shadow_config.shadow_map_size,
        scene_aabb,
        shadow_config.z_buffer,
    );

    let mut graph = RenderGraph::new();
    let backbuffer = graph.import_texture("backbuffer", backend.get_current_swapchain_texture(), ResourceState::Present);

    let mut shadow_maps = Vec::with_capacity(cascades.len());
    for (i, cascade) in cascades.iter().enumerate() {
        let desc = TextureDesc::simple_2d(shadow_config.shadow_map_size, shadow_config.shadow_map_size, TextureFormat::Depth32Float, TextureUsage::DEPTH_STENCIL | TextureUsage::SHADER_RESOURCE);
        let view_proj = cascade.view_proj;
        let visible_count = visible.len();
        let mut created = pyrite_graph::ResourceHandle::INVALID;
        graph.add_pass(
            format!("shadow_cascade_{i}"),
            |builder| {
                created = builder.create(format!("shadow_map_{i}"), desc);
                builder.write(created, ResourceState::DepthStencilWrite);
            },
            move |_handle, _cmd, _backend| {
                log::trace!("shadow cascade {i}: {visible_count} casters, view_proj {view_proj:?}");
            },
        );
        shadow_maps.push(created);
    }

    let shadow_count = shadow_maps.len();
    let visible_count = visible.len();
    graph.add_pass(
        "main_pass",
        |builder| {
            for &shadow_map in &shadow_maps {
                builder.read(shadow_map, ResourceState::ShaderResource);
            }
            builder.write(backbuffer, ResourceState::RenderTarget);
        },
        move |_handle, _cmd, _backend| {
            log::debug!("main pass: drawing {visible_count} instances against {shadow_count} shadow cascades");
        },
    );

    let report = graph.compile(pool, backend);
    if report.cycle_detected {
        log::error!("render graph compile reported a cycle; running only the reachable {}/{} passes", report.passes_run, report.passes_total);
    }

    match backend.begin_frame() {
        Some(cmd) => {
            graph.execute(cmd, backend, pool);
            backend.end_frame(cmd);
        }
        None => log::warn!("backend failed to begin frame; skipping graph execution this render task"),
    }
}

/// A `tick` closure backed by [`std::time::Instant`], for production
/// callers of [`FrameOrchestrator::run`].
pub struct SystemClock {
    last: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Self {
        SystemClock { last: Instant::now() }
    }

    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let elapsed = (now - self.last).as_secs_f32();
        self.last = now;
        elapsed
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use pyrite_rhi::null_backend::NullBackend;

    fn test_scene_view() -> SceneView {
        SceneView {
            camera_view: Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y),
            camera_proj: Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 16.0 / 9.0, 0.1, 100.0),
            camera_near: 0.1,
            camera_far: 100.0,
            light_direction: Vec3::new(-0.3, -1.0, -0.2),
            viewport_width: 1920,
            viewport_height: 1080,
            time: 0.0,
        }
    }

    /// S5: 0 ms logic, fixed_dt = 10 ms, 100 ms of wall time fed in 10 ms
    /// ticks — expect exactly `floor(100/10) = 10` committed snapshots and
    /// between 1 and 10 `begin_frame` calls observed by shutdown.
    #[test]
    fn s5_committed_snapshot_count_matches_fixed_timestep_division() {
        let scheduler = TaskScheduler::new(2);
        scheduler.attach_main_thread();
        let null_backend = Arc::new(NullBackend::new());
        let backend: Arc<dyn RenderHardwareInterface> = null_backend.clone();

        let mut orchestrator = FrameOrchestrator::new(Arc::clone(&scheduler), 0.010, ShadowConfig::default());
        let mut scene = LogicScene::new();
        let mesh_bounds = MeshBoundsTable::new();

        let logic_calls = Arc::new(AtomicUsize::new(0));
        let logic_calls_clone = Arc::clone(&logic_calls);

        let mut remaining_iterations = 10;
        let poll_events = move || {
            if remaining_iterations == 0 {
                false
            } else {
                remaining_iterations -= 1;
                true
            }
        };
        let tick = || 0.010;
        let game_logic_fn = move |_scene: &mut LogicScene, _dt: f32| {
            logic_calls_clone.fetch_add(1, Ordering::Relaxed);
        };
        let build_scene_view = |_scene: &LogicScene, _t: f32| test_scene_view();

        orchestrator.run(Arc::clone(&backend), &mut scene, &mesh_bounds, poll_events, tick, game_logic_fn, build_scene_view);

        assert_eq!(logic_calls.load(Ordering::Relaxed), 10);
        let begin_frame_calls = null_backend.begin_frame_call_count();
        assert!(begin_frame_calls >= 1 && begin_frame_calls <= 10);

        scheduler.shutdown();
    }

    /// Property 8: across many rapid ticks, the logic writer never selects
    /// an index equal to the renderer's in-flight index. `NullBackend`'s
    /// default no-op `begin_frame`/`end_frame` complete near-instantly, so
    /// on their own they give a render task no window to still be in
    /// flight when the write cursor wraps back to its slot 3 ticks later —
    /// this test instead uses [`NullBackend::with_frame_work_delay`] to
    /// hold each render task open well past the fixed timestep, forcing
    /// `render_phase` to actually contend with a still-running previous
    /// task. If `render_phase` ever spawned a second render task before
    /// the first finished, `render_task_counter` would hold more than one
    /// outstanding task and `logic_phase`'s collision check would be racing
    /// against a stale `render_inflight_index` — this only runs to
    /// completion without hanging or panicking if that never happens.
    #[test]
    fn property8_triple_buffer_writer_never_collides_with_inflight_render_slot() {
        let scheduler = TaskScheduler::new(4);
        scheduler.attach_main_thread();
        let backend: Arc<dyn RenderHardwareInterface> = Arc::new(NullBackend::with_frame_work_delay(std::time::Duration::from_millis(5)));

        let mut orchestrator = FrameOrchestrator::new(Arc::clone(&scheduler), 0.001, ShadowConfig::default());
        let mut scene = LogicScene::new();
        scene.spawn(Mat4::IDENTITY, 0, 0, false);
        let mesh_bounds = MeshBoundsTable::new();
        mesh_bounds.set(0, pyrite_scene::BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)));

        let mut remaining_iterations = 50;
        let poll_events = move || {
            if remaining_iterations == 0 {
                false
            } else {
                remaining_iterations -= 1;
                true
            }
        };
        let tick = || 0.001;
        let game_logic_fn = |_scene: &mut LogicScene, _dt: f32| {};
        let build_scene_view = |_scene: &LogicScene, _t: f32| test_scene_view();

        orchestrator.run(backend, &mut scene, &mesh_bounds, poll_events, tick, game_logic_fn, build_scene_view);

        scheduler.shutdown();
    }
}
