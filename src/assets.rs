//! Asset-loader collaborator traits (§6 "Consumed from asset loaders").
//!
//! Asset decoding itself is out of scope (§1) — these traits only fix the
//! *contract* a concrete loader must satisfy: an async-style load keyed by
//! path, invoking a callback on completion. The callback may run on any
//! worker thread (mirroring `TaskScheduler::spawn`'s `Box<dyn FnOnce() +
//! Send>` contract), so callers that need the result on the main thread
//! must marshal it there themselves — the engine does not do that for
//! them.

/// Placeholder payload for a loaded mesh. Real vertex/index data formats
/// are an out-of-scope asset-pipeline concern (§1); this only carries
/// enough to hand a mesh index and bounds to the logic scene.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertex_count: u32,
    pub index_count: u32,
}

/// Placeholder payload for a loaded image/texture source.
#[derive(Debug, Clone, Default)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

/// Per §7's asset load failure convention: the callback is invoked with
/// `None` rather than an error, and the engine continues rendering
/// without that asset.
pub type MeshLoadCallback = Box<dyn FnOnce(Option<MeshData>) + Send>;
pub type ImageLoadCallback = Box<dyn FnOnce(Option<ImageData>) + Send>;

/// Asynchronous mesh loading collaborator (§6).
pub trait AsyncMeshLoader: Send + Sync {
    /// Begins loading the mesh at `path`. `on_loaded` is invoked exactly
    /// once, from an unspecified worker, with `Some(data)` on success or
    /// `None` on failure (§7's "callback is never invoked or is invoked
    /// with an empty payload" convention — this implementation always
    /// invokes it, with `None` standing in for "empty payload").
    fn load_mesh_async(&self, path: &str, on_loaded: MeshLoadCallback);
}

/// Asynchronous image loading collaborator (§6). Same contract as
/// [`AsyncMeshLoader`].
pub trait AsyncImageLoader: Send + Sync {
    fn load_image_async(&self, path: &str, on_loaded: ImageLoadCallback);
}
