//! Frustum culling and draw-order sort-key generation, run at the start
//! of the render task (§4.9 step 5: "culls (frustum), generates sort keys
//! in parallel, sorts").

use std::sync::Mutex;

use glam::{Mat4, Vec4};
use pyrite_scene::{BoundingBox, RenderSceneSnapshot};
use pyrite_scheduler::{Counter, TaskScheduler};

const CULL_CHUNK_SIZE: usize = 256;

/// Wraps a raw pointer so it can cross into the `'static`-bound
/// `parallel_for` closure; sound only because the caller blocks on
/// `scheduler.wait` before the pointee goes out of scope. Same pattern as
/// `pyrite_scene::extractor`'s `ScopedPtr`.
#[derive(Clone, Copy)]
struct ScopedPtr<T>(*const T);

// SAFETY: see `ScopedPtr`'s doc comment.
unsafe impl<T> Send for ScopedPtr<T> {}
unsafe impl<T> Sync for ScopedPtr<T> {}

/// Packs `(material_index, mesh_index)` into a single sort key so draws
/// naturally batch by material, then by mesh, when sorted ascending.
#[must_use]
fn sort_key(material_index: u32, mesh_index: u32) -> u64 {
    (u64::from(material_index) << 32) | u64::from(mesh_index)
}

/// Extracts the 6 frustum planes (left, right, bottom, top, near, far) from
/// a combined view-projection matrix via the Gribb–Hartmann method. Each
/// plane is `(a, b, c, d)` with the inside half-space satisfying
/// `a*x + b*y + c*z + d >= 0`.
#[must_use]
fn frustum_planes(view_proj: Mat4) -> [Vec4; 6] {
    let m = view_proj;
    let row0 = Vec4::new(m.x_axis.x, m.y_axis.x, m.z_axis.x, m.w_axis.x);
    let row1 = Vec4::new(m.x_axis.y, m.y_axis.y, m.z_axis.y, m.w_axis.y);
    let row2 = Vec4::new(m.x_axis.z, m.y_axis.z, m.z_axis.z, m.w_axis.z);
    let row3 = Vec4::new(m.x_axis.w, m.y_axis.w, m.z_axis.w, m.w_axis.w);

    [row3 + row0, row3 - row0, row3 + row1, row3 - row1, row3 + row2, row3 - row2]
}

/// Positive-vertex AABB-vs-frustum test: for each plane, picks the AABB
/// corner furthest along the plane normal and rejects if even that corner
/// is outside.
#[must_use]
fn aabb_in_frustum(planes: &[Vec4; 6], aabb: &BoundingBox) -> bool {
    for plane in planes {
        let positive = Vec4::new(
            if plane.x >= 0.0 { aabb.max.x } else { aabb.min.x },
            if plane.y >= 0.0 { aabb.max.y } else { aabb.min.y },
            if plane.z >= 0.0 { aabb.max.z } else { aabb.min.z },
            1.0,
        );
        if plane.dot(positive) < 0.0 {
            return false;
        }
    }
    true
}

/// Culls `snapshot` against `view_proj` in parallel, then sorts the
/// surviving instance indices by `(material_index, mesh_index)`. Returns
/// the visible instance indices in draw order.
#[must_use]
pub(crate) fn cull_and_sort(scheduler: &TaskScheduler, view_proj: Mat4, snapshot: &RenderSceneSnapshot) -> Vec<u32> {
    let count = snapshot.instance_count();
    if count == 0 {
        return Vec::new();
    }

    let planes = frustum_planes(view_proj);
    let snapshot_ptr = ScopedPtr(std::ptr::from_ref(snapshot));
    let visible: Mutex<Vec<(u64, u32)>> = Mutex::new(Vec::new());
    let visible_ptr = ScopedPtr(std::ptr::from_ref(&visible));

    let counter = Counter::new(0);
    scheduler.parallel_for(
        count,
        CULL_CHUNK_SIZE,
        move |start, end| {
            // SAFETY: `snapshot_ptr`/`visible_ptr` outlive this closure
            // because the caller waits on `counter` before either
            // referent goes out of scope.
            let snapshot = unsafe { &*snapshot_ptr.0 };
            let visible = unsafe { &*visible_ptr.0 };

            let mut local = Vec::new();
            for i in start..end {
                let aabb = snapshot.world_aabb(i);
                if aabb_in_frustum(&planes, &aabb) {
                    let key = sort_key(snapshot.material_index(i), snapshot.mesh_index(i));
                    local.push((key, i as u32));
                }
            }
            if !local.is_empty() {
                visible.lock().expect("cull result mutex poisoned").extend(local);
            }
        },
        &counter,
    );
    scheduler.wait(&counter, None);

    let mut visible = visible.into_inner().expect("cull result mutex poisoned");
    visible.sort_unstable_by_key(|(key, _)| *key);
    visible.into_iter().map(|(_, index)| index).collect()
}

/// Folds the world-space AABBs of `indices` into a single bounding box,
/// used to fit the shadow cascades' far Z plane (§4.9).
#[must_use]
pub(crate) fn compute_scene_aabb(snapshot: &RenderSceneSnapshot, indices: &[u32]) -> BoundingBox {
    let mut aabb = BoundingBox::default();
    for &index in indices {
        aabb = aabb.union(&snapshot.world_aabb(index as usize));
    }
    aabb
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn instances_outside_the_frustum_are_culled() {
        let scheduler = TaskScheduler::new(2);
        scheduler.attach_main_thread();

        let mut snapshot = RenderSceneSnapshot::new();
        snapshot.reset(2);
        snapshot.add_instance(Mat4::IDENTITY, BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)), 0, 0, false);
        snapshot.add_instance(Mat4::IDENTITY, BoundingBox::new(Vec3::splat(999.0), Vec3::splat(1000.0)), 1, 1, false);

        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        let visible = cull_and_sort(&scheduler, proj * view, &snapshot);

        assert_eq!(visible, vec![0]);
        scheduler.shutdown();
    }

    #[test]
    fn sorting_groups_by_material_then_mesh() {
        let scheduler = TaskScheduler::new(1);
        scheduler.attach_main_thread();

        let mut snapshot = RenderSceneSnapshot::new();
        snapshot.reset(3);
        let aabb = BoundingBox::new(Vec3::splat(-0.1), Vec3::splat(0.1));
        snapshot.add_instance(Mat4::IDENTITY, aabb, 5, 2, false);
        snapshot.add_instance(Mat4::IDENTITY, aabb, 1, 1, false);
        snapshot.add_instance(Mat4::IDENTITY, aabb, 2, 1, false);

        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let proj = Mat4::perspective_rh(std::f32::consts::FRAC_PI_4, 1.0, 0.1, 100.0);
        let visible = cull_and_sort(&scheduler, proj * view, &snapshot);

        assert_eq!(visible, vec![1, 2, 0]);
        scheduler.shutdown();
    }
}
