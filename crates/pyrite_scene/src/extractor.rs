//! Parallel extraction from a [`LogicScene`] into a [`RenderSceneSnapshot`] (§4.6).

use pyrite_scheduler::{Counter, TaskScheduler};

use crate::entity::{LogicScene, MeshBoundsTable};
use crate::snapshot::RenderSceneSnapshot;

/// Typical chunk size for the extraction `parallel_for`, per §4.6.
const EXTRACTION_CHUNK_SIZE: usize = 128;

/// Wraps a raw pointer so it can cross into the `'static`-bound
/// `parallel_for` closure. Sound only because `extract` blocks on
/// `scheduler.wait` before returning, so every borrow this crosses
/// outlives every chunk task that dereferences it.
#[derive(Clone, Copy)]
struct ScopedPtr<T>(*const T);

// SAFETY: see `ScopedPtr`'s doc comment — the pointee's lifetime is
// guaranteed by `extract`'s blocking `wait` call, not by the type system.
unsafe impl<T> Send for ScopedPtr<T> {}
unsafe impl<T> Sync for ScopedPtr<T> {}

/// Extracts all active entities from `scene` into `snapshot`, in parallel.
///
/// Launches a `parallel_for` over all logic entities in chunks of
/// `EXTRACTION_CHUNK_SIZE`. For each entity it transforms the mesh's
/// cached local AABB by the entity's world matrix, filters inactive
/// entities, and appends an instance. `mesh_bounds` is snapshotted once
/// under a lock before the parallel pass starts so every chunk task reads
/// a stable vector rather than re-acquiring the lock per entity.
pub fn extract(scheduler: &TaskScheduler, scene: &LogicScene, mesh_bounds: &MeshBoundsTable, snapshot: &mut RenderSceneSnapshot) {
    let entity_count = scene.len();
    snapshot.reset(entity_count);
    if entity_count == 0 {
        return;
    }

    let bounds_snapshot = mesh_bounds.snapshot();
    let scene_ptr = ScopedPtr(std::ptr::from_ref(scene));
    let snapshot_ptr = ScopedPtr(std::ptr::from_ref::<RenderSceneSnapshot>(snapshot));
    let bounds_ptr = ScopedPtr(bounds_snapshot.as_ptr());
    let bounds_len = bounds_snapshot.len();

    let counter = Counter::new(0);
    scheduler.parallel_for(
        entity_count,
        EXTRACTION_CHUNK_SIZE,
        move |start, end| {
            // SAFETY: `scene_ptr`/`snapshot_ptr` point at `extract`'s
            // parameters, and `bounds_ptr`/`bounds_len` describe
            // `bounds_snapshot` — all three outlive this closure because
            // `extract` waits on `counter` (below) before returning and
            // before `bounds_snapshot` is dropped.
            let scene = unsafe { &*scene_ptr.0 };
            let snapshot = unsafe { &*snapshot_ptr.0 };
            let bounds = unsafe { std::slice::from_raw_parts(bounds_ptr.0, bounds_len) };

            for entity in start..end {
                if !scene.is_active(entity) {
                    continue;
                }
                let mesh_index = scene.mesh_index(entity);
                let Some(local_bounds) = bounds.get(mesh_index as usize) else {
                    log::warn!("entity {entity} references mesh index {mesh_index} with no recorded bounds; skipping");
                    continue;
                };
                let transform = scene.transform(entity);
                let world_aabb = local_bounds.transform(&transform);
                snapshot.add_instance(transform, world_aabb, mesh_index, scene.material_index(entity), scene.is_static(entity));
            }
        },
        &counter,
    );

    scheduler.wait(&counter, None);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::BoundingBox;
    use glam::{Mat4, Vec3};

    #[test]
    fn extract_fills_the_snapshot_with_only_active_entities() {
        let scheduler = TaskScheduler::new(2);
        scheduler.attach_main_thread();

        let mut scene = LogicScene::new();
        for i in 0..300 {
            let id = scene.spawn(Mat4::from_translation(Vec3::new(i as f32, 0.0, 0.0)), 0, 0, false);
            if i % 3 == 0 {
                scene.set_active(id, false);
            }
        }

        let bounds = MeshBoundsTable::new();
        bounds.set(0, BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)));

        let mut snapshot = RenderSceneSnapshot::new();
        extract(&scheduler, &scene, &bounds, &mut snapshot);

        let expected_active = (0..300).filter(|i| i % 3 != 0).count();
        assert_eq!(snapshot.instance_count(), expected_active);

        scheduler.shutdown();
    }

    #[test]
    fn extract_on_an_empty_scene_produces_an_empty_snapshot() {
        let scheduler = TaskScheduler::new(1);
        scheduler.attach_main_thread();

        let scene = LogicScene::new();
        let bounds = MeshBoundsTable::new();
        let mut snapshot = RenderSceneSnapshot::new();
        extract(&scheduler, &scene, &bounds, &mut snapshot);

        assert_eq!(snapshot.instance_count(), 0);
        scheduler.shutdown();
    }
}
