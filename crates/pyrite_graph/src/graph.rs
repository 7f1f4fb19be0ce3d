//! Declarative per-frame render graph: pass registration, compilation
//! (dependency derivation, Kahn topological sort, barrier placement,
//! transient allocation), and sequential execution.

use std::collections::VecDeque;

use pyrite_rhi::{CommandHandle, RenderHardwareInterface, ResourceState, TextureHandle};
use rustc_hash::FxHashMap;

use crate::builder::{PassAccess, PassBuilder, ResourceNode};
use crate::handle::ResourceHandle;
use crate::pool::TransientResourcePool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy)]
struct BarrierOp {
    handle: ResourceHandle,
    old_state: ResourceState,
    new_state: ResourceState,
}

type PassExecute = Box<dyn FnOnce(CommandHandle, &dyn RenderHardwareInterface)>;

struct PassNode {
    name: String,
    reads: smallvec::SmallVec<[PassAccess; 4]>,
    writes: smallvec::SmallVec<[PassAccess; 4]>,
    deps: Vec<usize>,
    barriers: Vec<BarrierOp>,
    execute: Option<PassExecute>,
}

/// The outcome of [`RenderGraph::compile`]. `cycle_detected` mirrors §4.7's
/// failure semantics: a cycle is a programmer error, logged once; the
/// passes still reachable in Kahn order are the only ones `execute` will
/// run (S6).
#[derive(Debug, Clone, Copy, Default)]
pub struct CompileReport {
    pub cycle_detected: bool,
    pub passes_run: usize,
    pub passes_total: usize,
}

/// A per-frame DAG of passes with declared resource accesses, compiled
/// into an ordered sequence of barriers and execute calls. One instance is
/// reused frame over frame: `execute` resets it (§4.7's lifecycle), so
/// resource id `0` stays reserved as invalid across resets.
#[derive(Default)]
pub struct RenderGraph {
    resources: Vec<ResourceNode>,
    passes: Vec<PassNode>,
    sorted_order: Vec<usize>,
}

impl RenderGraph {
    #[must_use]
    pub fn new() -> Self {
        RenderGraph::default()
    }

    /// Imports an external resource (e.g. the current swapchain image)
    /// with its observed starting state.
    pub fn import_texture(&mut self, name: impl Into<String>, physical: TextureHandle, current_state: ResourceState) -> ResourceHandle {
        self.resources.push(ResourceNode {
            name: name.into(),
            physical: Some(physical),
            desc: None,
            initial_state: current_state,
        });
        ResourceHandle(self.resources.len() as u32)
    }

    /// Registers a pass. `setup` runs immediately, declaring resource
    /// accesses via the builder and returning whatever pass-local data
    /// `execute` needs (e.g. the handles it resolved); `execute` runs
    /// later, during [`RenderGraph::execute`], once compilation has
    /// resolved every resource to a physical backing and this pass's
    /// barriers.
    pub fn add_pass<T, F, E>(&mut self, name: impl Into<String>, setup: F, execute: E)
    where
        F: FnOnce(&mut PassBuilder) -> T,
        E: FnOnce(T, CommandHandle, &dyn RenderHardwareInterface) + 'static,
        T: 'static,
    {
        let mut builder = PassBuilder::new(&mut self.resources);
        let data = setup(&mut builder);
        let PassBuilder { reads, writes, .. } = builder;

        self.passes.push(PassNode {
            name: name.into(),
            reads,
            writes,
            deps: Vec::new(),
            barriers: Vec::new(),
            execute: Some(Box::new(move |cmd, backend| execute(data, cmd, backend))),
        });
    }

    /// Compiles the graph: dependency derivation, topological sort,
    /// barrier placement, transient allocation. Must be called once per
    /// frame before [`RenderGraph::execute`].
    pub fn compile(&mut self, pool: &TransientResourcePool, backend: &dyn RenderHardwareInterface) -> CompileReport {
        self.derive_dependencies();
        let cycle_detected = self.topological_sort();
        if cycle_detected {
            log::error!(
                "render graph has a cycle: {} of {} passes are not reachable in topological order and will not run this frame",
                self.passes.len() - self.sorted_order.len(),
                self.passes.len()
            );
        }
        self.place_barriers();
        self.allocate_transients(pool, backend);

        CompileReport {
            cycle_detected,
            passes_run: self.sorted_order.len(),
            passes_total: self.passes.len(),
        }
    }

    /// Finds each resource's writer over the whole pass list, then adds a
    /// producer-to-consumer edge for every read. Two phases rather than one
    /// interleaved scan: a single forward scan (recording a resource's
    /// writer only once a write has already been seen) can only ever
    /// produce edges that point from an earlier-inserted pass to a later
    /// one, which by construction can never cycle — it would make the
    /// cycle-reporting path in `compile` unreachable. Resolving the writer
    /// over the full list first means a pass's read can legitimately point
    /// at a producer inserted later, so two passes can end up mutually
    /// dependent (§8 S6) for `topological_sort` to actually detect.
    fn derive_dependencies(&mut self) {
        let mut last_writer: FxHashMap<u32, usize> = FxHashMap::default();
        for (idx, pass) in self.passes.iter().enumerate() {
            for access in &pass.writes {
                last_writer.insert(access.handle.0, idx);
            }
        }
        for pass_idx in 0..self.passes.len() {
            for access in self.passes[pass_idx].reads.clone() {
                if let Some(&producer) = last_writer.get(&access.handle.0) {
                    if producer != pass_idx && !self.passes[pass_idx].deps.contains(&producer) {
                        self.passes[pass_idx].deps.push(producer);
                    }
                }
            }
        }
    }

    /// Kahn's algorithm. Returns `true` if a cycle prevented some passes
    /// from reaching in-degree zero — those passes are simply absent from
    /// `self.sorted_order`, a partial but deterministic order.
    fn topological_sort(&mut self) -> bool {
        let n = self.passes.len();
        let mut in_degree: Vec<usize> = self.passes.iter().map(|p| p.deps.len()).collect();
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (idx, pass) in self.passes.iter().enumerate() {
            for &dep in &pass.deps {
                successors[dep].push(idx);
            }
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(pass_idx) = queue.pop_front() {
            order.push(pass_idx);
            for &succ in &successors[pass_idx] {
                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    queue.push_back(succ);
                }
            }
        }

        let has_cycle = order.len() < n;
        self.sorted_order = order;
        has_cycle
    }

    /// Walks the sorted order maintaining a per-resource current-state
    /// tracker, recording a barrier wherever the required state differs
    /// from the last recorded one (or the same state is re-written).
    fn place_barriers(&mut self) {
        let mut tracker: FxHashMap<u32, (ResourceState, Option<AccessKind>)> = FxHashMap::default();
        for &pass_idx in &self.sorted_order.clone() {
            let mut barriers = Vec::new();
            let reads = self.passes[pass_idx].reads.clone();
            let writes = self.passes[pass_idx].writes.clone();
            let accesses = reads
                .iter()
                .map(|a| (AccessKind::Read, *a))
                .chain(writes.iter().map(|a| (AccessKind::Write, *a)));

            for (kind, access) in accesses {
                let initial_state = self.resources[access.handle.index()].initial_state;
                let (current_state, last_kind) = *tracker.entry(access.handle.0).or_insert((initial_state, None));

                let needs_barrier = current_state != access.state
                    || (kind == AccessKind::Write && last_kind == Some(AccessKind::Write) && current_state == access.state);

                if needs_barrier {
                    barriers.push(BarrierOp {
                        handle: access.handle,
                        old_state: current_state,
                        new_state: access.state,
                    });
                }
                tracker.insert(access.handle.0, (access.state, Some(kind)));
            }
            self.passes[pass_idx].barriers = barriers;
        }
    }

    /// For every transient resource (non-empty name, no physical backing
    /// yet), acquires a texture from `pool`. Imported resources already
    /// have their caller-provided physical backing and are skipped.
    fn allocate_transients(&mut self, pool: &TransientResourcePool, backend: &dyn RenderHardwareInterface) {
        for resource in &mut self.resources {
            if resource.physical.is_some() {
                continue;
            }
            let Some(desc) = resource.desc.as_ref() else { continue };
            if resource.name.is_empty() {
                log::error!("render graph: skipping unnamed transient resource");
                continue;
            }
            let handle = pool.acquire(desc, backend);
            if !handle.is_valid() {
                log::error!("render graph: transient pool exhausted acquiring \"{}\"", resource.name);
            }
            resource.physical = Some(handle);
        }
    }

    /// Iterates the compiled order: emits a debug label, issues every
    /// recorded barrier, invokes the pass's execute closure, emits the
    /// end-debug-label. A pass referencing a resource that failed to
    /// allocate (§4.7's pool-exhaustion path) is skipped with a logged
    /// error rather than panicking; the rest of the frame still submits.
    /// After the last pass, releases transient resources back to the pool
    /// and resets the graph for the next frame.
    pub fn execute(&mut self, cmd: CommandHandle, backend: &dyn RenderHardwareInterface, pool: &TransientResourcePool) {
        let order = std::mem::take(&mut self.sorted_order);
        for pass_idx in order {
            let pass = &mut self.passes[pass_idx];
            if self.resources_valid(pass_idx) {
                backend.cmd_begin_debug_label(cmd, &pass.name, debug_color(&pass.name));
                for barrier in &pass.barriers {
                    let physical = self.resources[barrier.handle.index()]
                        .physical
                        .expect("barrier refers to a resource resolved during compile");
                    backend.resource_barrier(cmd, physical, barrier.old_state, barrier.new_state);
                }
                if let Some(execute) = pass.execute.take() {
                    execute(cmd, backend);
                }
                backend.cmd_end_debug_label(cmd);
            } else {
                log::error!("render graph: skipping pass \"{}\" due to an unallocated resource", pass.name);
            }
        }
        self.release_transients_and_reset(pool);
    }

    fn resources_valid(&self, pass_idx: usize) -> bool {
        let pass = &self.passes[pass_idx];
        pass.reads
            .iter()
            .chain(pass.writes.iter())
            .all(|access| self.resources[access.handle.index()].physical.is_some_and(TextureHandle::is_valid))
    }

    fn release_transients_and_reset(&mut self, pool: &TransientResourcePool) {
        for resource in self.resources.drain(..) {
            if let (Some(desc), Some(physical)) = (resource.desc, resource.physical) {
                pool.release(&desc, physical);
            }
        }
        self.passes.clear();
        self.sorted_order.clear();
    }

    #[must_use]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }
}

/// A deterministic, cheap debug-label color derived from the pass name —
/// purely cosmetic, for graphics-debugger visualization.
fn debug_color(name: &str) -> [f32; 4] {
    let mut hash: u32 = 2166136261;
    for byte in name.as_bytes() {
        hash ^= u32::from(*byte);
        hash = hash.wrapping_mul(16777619);
    }
    let r = (hash & 0xff) as f32 / 255.0;
    let g = ((hash >> 8) & 0xff) as f32 / 255.0;
    let b = ((hash >> 16) & 0xff) as f32 / 255.0;
    [r, g, b, 1.0]
}
