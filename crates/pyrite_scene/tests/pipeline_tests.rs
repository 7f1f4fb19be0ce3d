//! Integration tests spanning `LogicScene`, `MeshBoundsTable`, and
//! `extract` together, exercised only through `pyrite_scene`'s public API
//! (§8 property 7, and the extraction edge case §4.6 calls out: an
//! entity referencing a mesh index with no recorded bounds).

use glam::{Mat4, Vec3};
use pyrite_scene::{extract, BoundingBox, LogicScene, MeshBoundsTable, RenderSceneSnapshot};
use pyrite_scheduler::TaskScheduler;

#[test]
fn entities_with_unrecorded_mesh_bounds_are_skipped_not_panicked() {
    let scheduler = TaskScheduler::new(2);
    scheduler.attach_main_thread();

    let mut scene = LogicScene::new();
    scene.spawn(Mat4::IDENTITY, 0, 0, false);
    scene.spawn(Mat4::IDENTITY, 99, 0, false); // mesh index 99 has no recorded bounds

    let bounds = MeshBoundsTable::new();
    bounds.set(0, BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)));

    let mut snapshot = RenderSceneSnapshot::new();
    extract(&scheduler, &scene, &bounds, &mut snapshot);

    assert_eq!(snapshot.instance_count(), 1);
    assert_eq!(snapshot.mesh_index(0), 0);

    scheduler.shutdown();
}

#[test]
fn extracted_world_aabbs_follow_the_entity_transform() {
    let scheduler = TaskScheduler::new(2);
    scheduler.attach_main_thread();

    let mut scene = LogicScene::new();
    scene.spawn(Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)), 0, 0, false);

    let bounds = MeshBoundsTable::new();
    bounds.set(0, BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0)));

    let mut snapshot = RenderSceneSnapshot::new();
    extract(&scheduler, &scene, &bounds, &mut snapshot);

    let aabb = snapshot.world_aabb(0);
    assert!((aabb.min.x - 9.0).abs() < 1e-5);
    assert!((aabb.max.x - 11.0).abs() < 1e-5);

    scheduler.shutdown();
}

#[test]
fn repeated_extraction_reuses_snapshot_storage_across_frames() {
    let scheduler = TaskScheduler::new(2);
    scheduler.attach_main_thread();

    let mut scene = LogicScene::new();
    let bounds = MeshBoundsTable::new();
    bounds.set(0, BoundingBox::new(Vec3::splat(-0.5), Vec3::splat(0.5)));
    let mut snapshot = RenderSceneSnapshot::new();

    for frame in 0..5u32 {
        scene.spawn(Mat4::from_translation(Vec3::new(f32::from(frame as u16), 0.0, 0.0)), 0, 0, false);
        extract(&scheduler, &scene, &bounds, &mut snapshot);
        assert_eq!(snapshot.instance_count(), frame as usize + 1);
    }

    scheduler.shutdown();
}
