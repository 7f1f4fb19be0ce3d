//! The `setup`-phase builder passed to [`crate::RenderGraph::add_pass`].

use pyrite_rhi::{ResourceState, TextureDesc};
use smallvec::SmallVec;

use crate::handle::ResourceHandle;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PassAccess {
    pub handle: ResourceHandle,
    pub state: ResourceState,
}

pub(crate) struct ResourceNode {
    pub name: String,
    /// `None` until a transient resource is allocated during compilation;
    /// `Some` immediately for imported resources.
    pub physical: Option<pyrite_rhi::TextureHandle>,
    /// `None` for imported resources (they never go through the pool).
    pub desc: Option<TextureDesc>,
    pub initial_state: ResourceState,
}

/// Offered to a pass's `setup` closure. `create`/`read`/`write` register a
/// transient resource and the pass's declared accesses; the graph derives
/// dependencies and barriers from exactly what's recorded here.
pub struct PassBuilder<'g> {
    pub(crate) resources: &'g mut Vec<ResourceNode>,
    pub(crate) reads: SmallVec<[PassAccess; 4]>,
    pub(crate) writes: SmallVec<[PassAccess; 4]>,
}

impl<'g> PassBuilder<'g> {
    pub(crate) fn new(resources: &'g mut Vec<ResourceNode>) -> Self {
        PassBuilder {
            resources,
            reads: SmallVec::new(),
            writes: SmallVec::new(),
        }
    }

    /// Registers a new transient resource to be pooled, starting in the
    /// `Undefined` state.
    pub fn create(&mut self, name: impl Into<String>, desc: TextureDesc) -> ResourceHandle {
        self.resources.push(ResourceNode {
            name: name.into(),
            physical: None,
            desc: Some(desc),
            initial_state: ResourceState::Undefined,
        });
        ResourceHandle(self.resources.len() as u32)
    }

    /// Records a read access with the GPU state this pass requires the
    /// resource to be in. Returns `handle` unchanged for chaining; a
    /// dangling handle is logged once and otherwise ignored.
    pub fn read(&mut self, handle: ResourceHandle, required_state: ResourceState) -> ResourceHandle {
        if self.validate(handle) {
            self.reads.push(PassAccess { handle, state: required_state });
        }
        handle
    }

    /// Records a write access with the GPU state this pass produces the
    /// resource in.
    pub fn write(&mut self, handle: ResourceHandle, required_state: ResourceState) -> ResourceHandle {
        if self.validate(handle) {
            self.writes.push(PassAccess { handle, state: required_state });
        }
        handle
    }

    fn validate(&self, handle: ResourceHandle) -> bool {
        let ok = handle.is_valid() && handle.index() < self.resources.len();
        if !ok {
            log::error!("render graph pass references an unknown or invalid resource handle {:?}", handle);
        }
        ok
    }
}
