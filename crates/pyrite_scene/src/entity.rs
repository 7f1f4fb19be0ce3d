//! The minimal game-logic scene shape the extractor reads from.
//!
//! `spec.md` §6 treats the game layer as an external collaborator; this is
//! the smallest structure-of-arrays shape that gives the extractor (§4.6)
//! something concrete to extract from. No components system, no
//! scripting, no physics — those stay out of scope.

use glam::Mat4;
use parking_lot::RwLock;

use crate::bounds::BoundingBox;

/// An index into a [`LogicScene`]'s parallel arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub u32);

/// A flat struct-of-arrays game-logic scene: one slot per entity, indexed
/// by [`EntityId`]. Entities are never removed mid-frame, only deactivated
/// via [`LogicScene::set_active`] — matching the extractor's read-only,
/// whole-array access pattern.
#[derive(Default)]
pub struct LogicScene {
    transforms: Vec<Mat4>,
    mesh_indices: Vec<u32>,
    material_indices: Vec<u32>,
    static_flags: Vec<bool>,
    active: Vec<bool>,
}

impl LogicScene {
    #[must_use]
    pub fn new() -> Self {
        LogicScene::default()
    }

    pub fn spawn(&mut self, transform: Mat4, mesh_index: u32, material_index: u32, is_static: bool) -> EntityId {
        let id = EntityId(self.transforms.len() as u32);
        self.transforms.push(transform);
        self.mesh_indices.push(mesh_index);
        self.material_indices.push(material_index);
        self.static_flags.push(is_static);
        self.active.push(true);
        id
    }

    pub fn set_active(&mut self, id: EntityId, active: bool) {
        self.active[id.0 as usize] = active;
    }

    pub fn set_transform(&mut self, id: EntityId, transform: Mat4) {
        self.transforms[id.0 as usize] = transform;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }

    #[must_use]
    pub fn is_active(&self, index: usize) -> bool {
        self.active[index]
    }

    #[must_use]
    pub fn transform(&self, index: usize) -> Mat4 {
        self.transforms[index]
    }

    #[must_use]
    pub fn mesh_index(&self, index: usize) -> u32 {
        self.mesh_indices[index]
    }

    #[must_use]
    pub fn material_index(&self, index: usize) -> u32 {
        self.material_indices[index]
    }

    #[must_use]
    pub fn is_static(&self, index: usize) -> bool {
        self.static_flags[index]
    }
}

/// The cached local-space bounding box per mesh, keyed by mesh index.
/// §4.6 calls for "a snapshot of the mesh bounds table taken once under a
/// lock before extraction so the parallel body reads a stable vector" —
/// [`MeshBoundsTable::snapshot`] is that operation; the table itself may
/// still be mutated by asset loading between frames.
#[derive(Default)]
pub struct MeshBoundsTable {
    bounds: RwLock<Vec<BoundingBox>>,
}

impl MeshBoundsTable {
    #[must_use]
    pub fn new() -> Self {
        MeshBoundsTable::default()
    }

    /// Records (or overwrites) the local bounding box for a mesh index,
    /// growing the table if needed.
    pub fn set(&self, mesh_index: u32, bounds: BoundingBox) {
        let mut table = self.bounds.write();
        let index = mesh_index as usize;
        if index >= table.len() {
            table.resize(index + 1, BoundingBox::default());
        }
        table[index] = bounds;
    }

    /// Takes a single read-locked snapshot of the whole table. The
    /// extractor calls this once before spawning its `parallel_for` so
    /// every chunk task reads a stable, un-locked `Vec` rather than
    /// re-acquiring the lock per entity.
    #[must_use]
    pub fn snapshot(&self) -> Vec<BoundingBox> {
        self.bounds.read().clone()
    }
}
