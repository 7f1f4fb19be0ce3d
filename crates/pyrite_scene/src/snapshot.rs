//! The immutable, per-frame structure-of-arrays scene representation
//! published between the logic and render phases (§3, §4.6).

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use glam::Mat4;

use crate::bounds::BoundingBox;

/// Structure-of-arrays scene snapshot filled by many extractor chunk tasks
/// concurrently, each claiming a disjoint slot via [`RenderSceneSnapshot::add_instance`].
///
/// Lifecycle: `FREE` (after [`RenderSceneSnapshot::reset`]) → `WRITING`
/// (extraction in progress) → `COMMITTED`/`READING` (once the owning
/// `FrameOrchestrator` publishes its index) → `FREE` again on the next
/// `reset`. This type itself only implements the `WRITING` half; the
/// publish/read states are the triple buffer's atomics in `pyrite_frame`.
///
/// Backing storage uses the same `UnsafeCell<MaybeUninit<T>>` array
/// pattern as [`pyrite_fiber`]'s work-stealing deque: every writer claims
/// a disjoint index via `fetch_add` before touching its slot, so the
/// shared `&self` access across concurrently-running extractor tasks
/// never aliases the same memory.
pub struct RenderSceneSnapshot {
    capacity: usize,
    instance_count: AtomicUsize,
    world_matrices: Box<[UnsafeCell<MaybeUninit<Mat4>>]>,
    world_aabbs: Box<[UnsafeCell<MaybeUninit<BoundingBox>>]>,
    mesh_indices: Box<[UnsafeCell<MaybeUninit<u32>>]>,
    material_indices: Box<[UnsafeCell<MaybeUninit<u32>>]>,
    static_flags: Box<[UnsafeCell<MaybeUninit<bool>>]>,
}

// SAFETY: every slot is claimed exclusively by exactly one `fetch_add`
// winner before being written or read; no two callers ever touch the same
// index concurrently.
unsafe impl Send for RenderSceneSnapshot {}
unsafe impl Sync for RenderSceneSnapshot {}

fn uninit_array<T>(capacity: usize) -> Box<[UnsafeCell<MaybeUninit<T>>]> {
    (0..capacity).map(|_| UnsafeCell::new(MaybeUninit::uninit())).collect()
}

impl RenderSceneSnapshot {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        RenderSceneSnapshot {
            capacity,
            instance_count: AtomicUsize::new(0),
            world_matrices: uninit_array(capacity),
            world_aabbs: uninit_array(capacity),
            mesh_indices: uninit_array(capacity),
            material_indices: uninit_array(capacity),
            static_flags: uninit_array(capacity),
        }
    }

    /// Ensures capacity for at least `capacity_hint` entries and resets
    /// `instance_count` to zero, moving the snapshot back to its `FREE`
    /// state. Reallocates only when growing; a snapshot never shrinks its
    /// backing storage, matching the pooling rationale elsewhere in this
    /// workspace (stacks, fibers, transient textures) of amortizing
    /// allocation over reuse rather than resizing every frame.
    pub fn reset(&mut self, capacity_hint: usize) {
        if capacity_hint > self.capacity {
            *self = Self::with_capacity(capacity_hint);
        }
        self.instance_count.store(0, Ordering::Relaxed);
    }

    /// Atomically claims the next free slot and writes every parallel
    /// array's value at that slot. Safe to call concurrently from many
    /// extractor chunk tasks because each call claims a distinct index.
    ///
    /// The claim itself uses `Relaxed` ordering: per §5's ordering
    /// guarantees, no synchronization is required among writers beyond
    /// the release this snapshot's *publication* (`last_committed_index`,
    /// in `pyrite_frame`) performs after every extraction task has
    /// already been waited on — that `wait` is what establishes the
    /// happens-before edge to the render task, not this counter.
    ///
    /// # Panics
    ///
    /// Panics if more instances are added than `reset`'s `capacity_hint`
    /// reserved for — a caller bug (the extractor should size the hint
    /// from the logic scene's own entity count).
    pub fn add_instance(&self, world_matrix: Mat4, world_aabb: BoundingBox, mesh_index: u32, material_index: u32, is_static: bool) {
        let slot = self.instance_count.fetch_add(1, Ordering::Relaxed);
        assert!(slot < self.capacity, "RenderSceneSnapshot: instance count exceeded the capacity reserved by reset()");

        // SAFETY: `slot` was just claimed exclusively by this call's
        // `fetch_add`; no other caller will ever write this index.
        unsafe {
            (*self.world_matrices[slot].get()).write(world_matrix);
            (*self.world_aabbs[slot].get()).write(world_aabb);
            (*self.mesh_indices[slot].get()).write(mesh_index);
            (*self.material_indices[slot].get()).write(material_index);
            (*self.static_flags[slot].get()).write(is_static);
        }
    }

    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.instance_count.load(Ordering::Relaxed)
    }

    fn check_index(&self, index: usize) {
        assert!(index < self.instance_count(), "RenderSceneSnapshot: index {index} out of bounds");
    }

    #[must_use]
    pub fn world_matrix(&self, index: usize) -> Mat4 {
        self.check_index(index);
        // SAFETY: `index < instance_count()`, so this slot was written by
        // a completed `add_instance` call before `instance_count` could
        // have reached past it.
        unsafe { (*self.world_matrices[index].get()).assume_init() }
    }

    #[must_use]
    pub fn world_aabb(&self, index: usize) -> BoundingBox {
        self.check_index(index);
        unsafe { (*self.world_aabbs[index].get()).assume_init() }
    }

    #[must_use]
    pub fn mesh_index(&self, index: usize) -> u32 {
        self.check_index(index);
        unsafe { (*self.mesh_indices[index].get()).assume_init() }
    }

    #[must_use]
    pub fn material_index(&self, index: usize) -> u32 {
        self.check_index(index);
        unsafe { (*self.material_indices[index].get()).assume_init() }
    }

    #[must_use]
    pub fn is_static(&self, index: usize) -> bool {
        self.check_index(index);
        unsafe { (*self.static_flags[index].get()).assume_init() }
    }
}

impl Default for RenderSceneSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn add_instance_round_trips_every_field() {
        let mut snapshot = RenderSceneSnapshot::new();
        snapshot.reset(4);

        snapshot.add_instance(Mat4::IDENTITY, BoundingBox::new(Vec3::ZERO, Vec3::ONE), 3, 7, true);

        assert_eq!(snapshot.instance_count(), 1);
        assert_eq!(snapshot.world_matrix(0), Mat4::IDENTITY);
        assert_eq!(snapshot.mesh_index(0), 3);
        assert_eq!(snapshot.material_index(0), 7);
        assert!(snapshot.is_static(0));
    }

    #[test]
    fn reset_reuses_storage_when_shrinking_and_clears_count() {
        let mut snapshot = RenderSceneSnapshot::new();
        snapshot.reset(16);
        snapshot.add_instance(Mat4::IDENTITY, BoundingBox::default(), 0, 0, false);
        assert_eq!(snapshot.instance_count(), 1);

        snapshot.reset(4);
        assert_eq!(snapshot.instance_count(), 0);
    }

    #[test]
    #[should_panic(expected = "capacity")]
    fn add_instance_past_capacity_panics() {
        let mut snapshot = RenderSceneSnapshot::new();
        snapshot.reset(1);
        snapshot.add_instance(Mat4::IDENTITY, BoundingBox::default(), 0, 0, false);
        snapshot.add_instance(Mat4::IDENTITY, BoundingBox::default(), 0, 0, false);
    }

    #[test]
    fn concurrent_add_instance_from_many_threads_claims_disjoint_slots() {
        use std::sync::Arc;
        use std::thread;

        let mut snapshot = RenderSceneSnapshot::new();
        snapshot.reset(4000);
        let snapshot = Arc::new(snapshot);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let snapshot = Arc::clone(&snapshot);
                thread::spawn(move || {
                    for i in 0..500u32 {
                        snapshot.add_instance(Mat4::IDENTITY, BoundingBox::default(), t, i, false);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(snapshot.instance_count(), 4000);
        let mut seen_per_thread = [0u32; 8];
        for i in 0..snapshot.instance_count() {
            seen_per_thread[snapshot.mesh_index(i) as usize] += 1;
        }
        assert!(seen_per_thread.iter().all(|&c| c == 500));
    }
}
