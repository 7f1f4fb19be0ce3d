//! An in-memory [`RenderHardwareInterface`] double used by tests and by
//! higher crates' `dev-dependencies`. Tracks just enough bookkeeping
//! (handle allocation, live buffer/texture sets) to make assertions
//! possible; issues no real GPU work.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use log::warn;

use crate::interface::RenderHardwareInterface;
use crate::types::{allocate_handle, BufferHandle, CommandHandle, ResourceState, TextureDesc, TextureHandle};

/// A no-op GPU backend. `begin_frame` always succeeds unless
/// [`NullBackend::fail_next_begin_frame`] was armed, which lets tests
/// exercise §7's GPU-acquisition-failure path.
pub struct NullBackend {
    next_texture: AtomicU64,
    next_buffer: AtomicU64,
    next_command: AtomicU64,
    swapchain: TextureHandle,
    fail_next_begin_frame: AtomicBool,
    begin_frame_calls: AtomicU64,
    live_textures: Mutex<Vec<TextureHandle>>,
    destroyed_textures: Mutex<Vec<TextureHandle>>,
    frame_work_delay: Duration,
}

impl NullBackend {
    #[must_use]
    pub fn new() -> Self {
        let next_texture = AtomicU64::new(0);
        let swapchain = TextureHandle(allocate_handle(&next_texture));
        NullBackend {
            next_texture,
            next_buffer: AtomicU64::new(0),
            next_command: AtomicU64::new(0),
            swapchain,
            fail_next_begin_frame: AtomicBool::new(false),
            begin_frame_calls: AtomicU64::new(0),
            live_textures: Mutex::new(Vec::new()),
            destroyed_textures: Mutex::new(Vec::new()),
            frame_work_delay: Duration::ZERO,
        }
    }

    /// Builds a backend whose `begin_frame`/`end_frame` each hold the
    /// calling render task open for `delay` — a test-only knob for forcing
    /// a render task to still be in flight when later logic/render phases
    /// run, since the no-op fast path otherwise gives overlap-sensitive
    /// tests no window to observe a collision in.
    #[must_use]
    pub fn with_frame_work_delay(delay: Duration) -> Self {
        NullBackend { frame_work_delay: delay, ..Self::new() }
    }

    /// Arms a one-shot `begin_frame` failure, for exercising §7's
    /// GPU-acquisition-failure path.
    pub fn fail_next_begin_frame(&self) {
        self.fail_next_begin_frame.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn begin_frame_call_count(&self) -> u64 {
        self.begin_frame_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn live_texture_count(&self) -> usize {
        self.live_textures.lock().expect("null backend mutex poisoned").len()
    }

    #[must_use]
    pub fn destroyed_texture_count(&self) -> usize {
        self.destroyed_textures.lock().expect("null backend mutex poisoned").len()
    }
}

impl Default for NullBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderHardwareInterface for NullBackend {
    fn begin_frame(&self) -> Option<CommandHandle> {
        self.begin_frame_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_begin_frame.swap(false, Ordering::SeqCst) {
            warn!("null backend: simulated begin_frame failure");
            return None;
        }
        if !self.frame_work_delay.is_zero() {
            std::thread::sleep(self.frame_work_delay);
        }
        Some(CommandHandle(allocate_handle(&self.next_command)))
    }

    fn end_frame(&self, _cmd: CommandHandle) {
        if !self.frame_work_delay.is_zero() {
            std::thread::sleep(self.frame_work_delay);
        }
    }

    fn wait_idle(&self) {}

    fn get_current_swapchain_texture(&self) -> TextureHandle {
        self.swapchain
    }

    fn create_texture(&self, _desc: &TextureDesc, _data: Option<&[u8]>) -> TextureHandle {
        let handle = TextureHandle(allocate_handle(&self.next_texture));
        self.live_textures.lock().expect("null backend mutex poisoned").push(handle);
        handle
    }

    fn create_gpu_buffer(&self, _size: u64, _initial_state: ResourceState) -> BufferHandle {
        BufferHandle(allocate_handle(&self.next_buffer))
    }

    fn create_upload_buffer(&self, _size: u64) -> BufferHandle {
        BufferHandle(allocate_handle(&self.next_buffer))
    }

    fn destroy_buffer(&self, _buffer: BufferHandle) {}

    fn copy_buffer_immediate(&self, _src: BufferHandle, _dst: BufferHandle, _size: u64) {}

    fn update_bindless_texture(&self, _slot: u32, _texture: TextureHandle) {}

    fn resource_barrier(&self, _cmd: CommandHandle, _texture: TextureHandle, _old_state: ResourceState, _new_state: ResourceState) {}

    fn set_debug_name(&self, _texture: TextureHandle, _name: &str) {}

    fn cmd_begin_debug_label(&self, _cmd: CommandHandle, _name: &str, _color: [f32; 4]) {}

    fn cmd_end_debug_label(&self, _cmd: CommandHandle) {}

    fn destroy_texture(&self, texture: TextureHandle) {
        let mut live = self.live_textures.lock().expect("null backend mutex poisoned");
        live.retain(|&t| t != texture);
        drop(live);
        self.destroyed_textures.lock().expect("null backend mutex poisoned").push(texture);
    }
}
