//! The triple-buffered array of [`RenderSceneSnapshot`]s (§3, §4.9).
//!
//! Exactly one of the three slots is ever written at a time (the logic
//! thread, during the logic phase) and at most one is ever read at a time
//! (a spawned render task) — `FrameOrchestrator`'s `next_write_index ==
//! render_inflight_index` check is what keeps those two indices distinct.
//! This type only holds the storage and hands out unchecked access by
//! index; enforcing disjointness is the orchestrator's job.

use std::cell::UnsafeCell;

use pyrite_scene::RenderSceneSnapshot;

pub(crate) struct TripleBuffer {
    slots: [UnsafeCell<RenderSceneSnapshot>; 3],
}

// SAFETY: callers of `slot`/`slot_mut` are required to never pick the same
// index from two threads at once (see each method's doc comment); the
// orchestrator's write/inflight-index invariant is what actually
// guarantees that in practice.
unsafe impl Send for TripleBuffer {}
unsafe impl Sync for TripleBuffer {}

impl TripleBuffer {
    pub(crate) fn new() -> Self {
        TripleBuffer {
            slots: [
                UnsafeCell::new(RenderSceneSnapshot::new()),
                UnsafeCell::new(RenderSceneSnapshot::new()),
                UnsafeCell::new(RenderSceneSnapshot::new()),
            ],
        }
    }

    /// # Safety
    ///
    /// The caller must guarantee no other live reference (mutable or
    /// shared) to slot `index` exists for the duration this reference is
    /// used.
    pub(crate) unsafe fn slot_mut(&self, index: usize) -> &mut RenderSceneSnapshot {
        unsafe { &mut *self.slots[index].get() }
    }

    /// # Safety
    ///
    /// The caller must guarantee no concurrent mutable reference to slot
    /// `index` exists for the duration this reference is used.
    pub(crate) unsafe fn slot(&self, index: usize) -> &RenderSceneSnapshot {
        unsafe { &*self.slots[index].get() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Mat4, Vec3};
    use pyrite_scene::BoundingBox;

    #[test]
    fn distinct_slots_are_independently_writable_and_readable() {
        let buffer = TripleBuffer::new();
        unsafe {
            buffer.slot_mut(0).reset(1);
            buffer.slot_mut(0).add_instance(Mat4::IDENTITY, BoundingBox::new(Vec3::ZERO, Vec3::ONE), 1, 1, false);
            buffer.slot_mut(1).reset(1);
            buffer.slot_mut(1).add_instance(Mat4::IDENTITY, BoundingBox::new(Vec3::ZERO, Vec3::ONE), 2, 2, false);
        }
        unsafe {
            assert_eq!(buffer.slot(0).mesh_index(0), 1);
            assert_eq!(buffer.slot(1).mesh_index(0), 2);
        }
    }
}
