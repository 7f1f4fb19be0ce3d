//! Graph-local resource handles.
//!
//! Distinct from [`pyrite_rhi::TextureHandle`]: a `ResourceHandle` names a
//! node *within one graph instance* (transient or imported); the physical
//! backend texture it resolves to is filled in during compilation.

/// A handle to a resource node within a single [`crate::RenderGraph`]
/// instance. Valid only until that graph's next [`crate::RenderGraph::execute`]
/// resets it. `0` is reserved as invalid, matching every handle type in this
/// workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub(crate) u32);

impl ResourceHandle {
    pub const INVALID: ResourceHandle = ResourceHandle(0);

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// The 0-based index into the graph's resource table. Panics (via the
    /// underlying subtraction) if called on `INVALID` — callers must check
    /// [`Self::is_valid`] first.
    pub(crate) fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}
