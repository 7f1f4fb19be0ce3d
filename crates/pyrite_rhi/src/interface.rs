//! The capability-set trait consumed from the GPU backend, per §6.

use crate::types::{BufferHandle, CommandHandle, ResourceState, TextureDesc, TextureHandle};

/// Everything the render graph and frame orchestrator need from a concrete
/// GPU backend. One implementation suffices for a minimal port (§9); the
/// real backend is out of this workspace's scope (§1) and only
/// [`crate::null_backend::NullBackend`] (behind the `null-backend`
/// feature) implements this trait here.
pub trait RenderHardwareInterface: Send + Sync {
    /// Begins recording a frame's commands. Returns `None` if the backend
    /// could not acquire a command stream this frame (§7's GPU-acquisition
    /// failure) — the caller must skip barriers and submission entirely.
    fn begin_frame(&self) -> Option<CommandHandle>;

    /// Submits the commands recorded against `cmd`.
    fn end_frame(&self, cmd: CommandHandle);

    /// Blocks until the GPU has finished all submitted work. Called only
    /// during shutdown (§4.9) — never on the hot path.
    fn wait_idle(&self);

    /// The current swapchain image, to be imported into the render graph
    /// via `import_texture`.
    fn get_current_swapchain_texture(&self) -> TextureHandle;

    /// Creates a texture matching `desc`, optionally initialized from
    /// `data` (tightly packed, matching `desc`'s format).
    fn create_texture(&self, desc: &TextureDesc, data: Option<&[u8]>) -> TextureHandle;

    fn create_gpu_buffer(&self, size: u64, initial_state: ResourceState) -> BufferHandle;

    /// A CPU-mapped buffer suitable for staging uploads.
    fn create_upload_buffer(&self, size: u64) -> BufferHandle;

    fn destroy_buffer(&self, buffer: BufferHandle);

    fn copy_buffer_immediate(&self, src: BufferHandle, dst: BufferHandle, size: u64);

    fn update_bindless_texture(&self, slot: u32, texture: TextureHandle);

    /// Records a state transition for `texture` on `cmd`.
    fn resource_barrier(&self, cmd: CommandHandle, texture: TextureHandle, old_state: ResourceState, new_state: ResourceState);

    fn set_debug_name(&self, texture: TextureHandle, name: &str);

    /// Pushes a debug-label scope. Every call must be paired with
    /// [`RenderHardwareInterface::cmd_end_debug_label`], even if the pass
    /// that opened it exits early (§9's scoped-resources note) — the
    /// render graph's execution loop guarantees this pairing, not the
    /// backend.
    fn cmd_begin_debug_label(&self, cmd: CommandHandle, name: &str, color: [f32; 4]);

    fn cmd_end_debug_label(&self, cmd: CommandHandle);

    /// Destroys a texture previously created by this backend. Used by
    /// `pyrite_graph`'s transient pool when trimming idle entries
    /// (§4.8's `trim`).
    fn destroy_texture(&self, texture: TextureHandle);
}
