//! Transient texture pool (§4.8).
//!
//! Keyed by `TextureDesc` hash, reusing allocations across frames. Pool
//! entries outlive individual frames; acquisition may happen from any
//! worker compiling a graph, so the pool is internally synchronized rather
//! than requiring the caller to hold a lock.

use parking_lot::Mutex;
use pyrite_rhi::{RenderHardwareInterface, TextureDesc, TextureHandle};
use rustc_hash::FxHashMap;

struct PooledEntry {
    handle: TextureHandle,
    idle_frames: u32,
}

#[derive(Default)]
struct PoolInner {
    free: FxHashMap<TextureDesc, Vec<PooledEntry>>,
    live_count: usize,
}

/// A pool of reusable transient textures, grouped by description.
///
/// `acquire`/`release` are the hot-path operations; `trim` is an
/// out-of-band maintenance call ([`crate::RenderGraph`] never calls it
/// itself — see `FrameOrchestrator::maybe_prune` in `pyrite_frame`).
pub struct TransientResourcePool {
    inner: Mutex<PoolInner>,
}

impl TransientResourcePool {
    #[must_use]
    pub fn new() -> Self {
        TransientResourcePool {
            inner: Mutex::new(PoolInner::default()),
        }
    }

    /// Returns an existing free texture matching `desc` if one exists,
    /// otherwise creates a new one via `backend`. Returns
    /// [`TextureHandle::INVALID`] if the backend itself reports exhaustion
    /// (§4.7's failure semantics) — callers must treat that as "this
    /// resource did not allocate" rather than a usable handle.
    pub fn acquire(&self, desc: &TextureDesc, backend: &dyn RenderHardwareInterface) -> TextureHandle {
        let mut inner = self.inner.lock();
        if let Some(bucket) = inner.free.get_mut(desc) {
            if let Some(entry) = bucket.pop() {
                inner.live_count += 1;
                return entry.handle;
            }
        }
        drop(inner);
        let handle = backend.create_texture(desc, None);
        if handle.is_valid() {
            self.inner.lock().live_count += 1;
        }
        handle
    }

    /// Returns `handle` to the free pool under `desc`'s key. A no-op for
    /// [`TextureHandle::INVALID`] (the resource never allocated).
    pub fn release(&self, desc: &TextureDesc, handle: TextureHandle) {
        if !handle.is_valid() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.live_count = inner.live_count.saturating_sub(1);
        inner.free.entry(desc.clone()).or_default().push(PooledEntry { handle, idle_frames: 0 });
    }

    /// Destroys every free texture that has sat unused for more than
    /// `max_idle_frames` calls to `trim`. Every remaining free texture's
    /// idle counter is incremented first, so a texture must survive
    /// `max_idle_frames` consecutive trims without being reused.
    pub fn trim(&self, max_idle_frames: u32, backend: &dyn RenderHardwareInterface) {
        let mut inner = self.inner.lock();
        for bucket in inner.free.values_mut() {
            for entry in bucket.iter_mut() {
                entry.idle_frames += 1;
            }
        }
        let mut destroyed = 0usize;
        for bucket in inner.free.values_mut() {
            bucket.retain(|entry| {
                let keep = entry.idle_frames <= max_idle_frames;
                if !keep {
                    backend.destroy_texture(entry.handle);
                    destroyed += 1;
                }
                keep
            });
        }
        inner.free.retain(|_, bucket| !bucket.is_empty());
        if destroyed > 0 {
            log::debug!("transient pool trim destroyed {destroyed} idle texture(s)");
        }
    }

    /// Total textures the pool currently owns, live and free.
    #[must_use]
    pub fn total_texture_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.live_count + inner.free.values().map(Vec::len).sum::<usize>()
    }
}

impl Default for TransientResourcePool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_rhi::{null_backend::NullBackend, TextureFormat, TextureUsage};

    fn desc() -> TextureDesc {
        TextureDesc::simple_2d(256, 256, TextureFormat::Rgba8Unorm, TextureUsage::RENDER_TARGET)
    }

    #[test]
    fn release_then_acquire_reuses_the_same_handle() {
        let backend = NullBackend::new();
        let pool = TransientResourcePool::new();
        let d = desc();

        let a = pool.acquire(&d, &backend);
        pool.release(&d, a);
        let b = pool.acquire(&d, &backend);

        assert_eq!(a, b);
        assert_eq!(backend.live_texture_count(), 1);
    }

    #[test]
    fn trim_destroys_textures_idle_past_the_limit() {
        let backend = NullBackend::new();
        let pool = TransientResourcePool::new();
        let d = desc();

        let a = pool.acquire(&d, &backend);
        pool.release(&d, a);

        pool.trim(2, &backend);
        assert_eq!(pool.total_texture_count(), 1);
        pool.trim(2, &backend);
        assert_eq!(pool.total_texture_count(), 1);
        pool.trim(2, &backend);
        assert_eq!(pool.total_texture_count(), 0);
        assert_eq!(backend.destroyed_texture_count(), 1);
    }
}
