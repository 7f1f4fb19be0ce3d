//! Engine Configuration
//!
//! Plain, `Default`-implementing configuration for the engine façade, in
//! the manner of the teacher's `RenderSettings`: one struct, no builder
//! machinery, fields grouped by the subsystem they configure.

use pyrite_frame::ShadowConfig;

/// Which GPU backend the engine should request at startup.
///
/// The concrete backend is out of this workspace's scope (§1); `Null` is
/// the only variant with an implementation here (`pyrite_rhi::null_backend`),
/// used for headless/test runs. Other variants name backends a real port
/// would wire in without the engine façade needing to change shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendChoice {
    Null,
    Vulkan,
    Dx12,
    Metal,
}

/// Top-level engine configuration: window, scheduler, and frame-pacing
/// parameters the game layer sets once at startup (§6 "Exposed to the
/// game layer").
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Title for the (out-of-scope) application window.
    pub window_title: String,
    /// Requested window resolution in physical pixels.
    pub window_width: u32,
    pub window_height: u32,
    /// Which GPU backend to request.
    pub backend: BackendChoice,
    /// Number of frames the renderer may have in flight at once.
    pub frames_in_flight: u32,
    /// Enables backend validation/debug layers.
    pub enable_validation: bool,
    /// Number of OS worker threads the scheduler starts (§4.5). `0` means
    /// "use the number of available CPUs".
    pub worker_count: usize,
    /// The logic phase's fixed timestep, in seconds (§4.9).
    pub fixed_timestep: f32,
    /// Shadow cascade parameters passed straight through to
    /// `FrameOrchestrator` (§4.9).
    pub shadow: ShadowConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            window_title: "Pyrite".to_string(),
            window_width: 1280,
            window_height: 720,
            backend: BackendChoice::Null,
            frames_in_flight: 2,
            enable_validation: cfg!(debug_assertions),
            worker_count: 0,
            fixed_timestep: 1.0 / 60.0,
            shadow: ShadowConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Resolves `worker_count == 0` to the available parallelism, and
    /// rejects values that would make the fixed-timestep loop or the
    /// frame-pacing model nonsensical.
    pub(crate) fn validated(mut self) -> crate::errors::Result<Self> {
        if self.fixed_timestep <= 0.0 {
            return Err(crate::errors::PyriteError::InvalidConfig("fixed_timestep must be positive".to_string()));
        }
        if self.frames_in_flight == 0 {
            return Err(crate::errors::PyriteError::InvalidConfig("frames_in_flight must be at least 1".to_string()));
        }
        if self.worker_count == 0 {
            self.worker_count = std::thread::available_parallelism().map(std::num::NonZeroUsize::get).unwrap_or(4);
        }
        Ok(self)
    }
}
