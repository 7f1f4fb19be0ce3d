//! Fibers: the stack-backed, cooperatively-scheduled unit of execution.

use std::alloc::{alloc, dealloc, Layout};
use std::cell::UnsafeCell;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU8, Ordering};

use crate::context::{self, StackPointer};
use crate::counter::Counter;

/// Stack size per fiber. 64 KiB in debug builds (room for unoptimized
/// frames and the canary guard word), 32 KiB in release, per §4.2.
#[cfg(debug_assertions)]
pub const FIBER_STACK_SIZE: usize = 64 * 1024;
#[cfg(not(debug_assertions))]
pub const FIBER_STACK_SIZE: usize = 32 * 1024;

const STACK_ALIGN: usize = 16;

/// Width of the canary region at the low end of the stack.
///
/// A real guard page (`mprotect(PROT_NONE)` / `VirtualProtect`) is the
/// right long-term fix for stack overflow detection but needs a
/// page-granularity, platform-specific allocation path this crate doesn't
/// have yet (see DESIGN.md). In the meantime a canary word is written once
/// at stack creation and checked whenever a fiber is recycled out of the
/// pool, in debug builds only — it catches the common case (a closure that
/// ran the stack dry) without pretending to be a complete overflow guard.
const CANARY: usize = 0xDEAD_C0DE_FEED_FACE;

/// The lifecycle state of a [`Fiber`], per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FiberState {
    /// Sitting in a [`crate::pool::FiberPool`] free list, stack unused.
    Idle,
    /// Holding a closure, queued on a worker's deque or the main queue.
    Queued,
    /// Currently executing on some worker thread.
    Running,
    /// Suspended inside `wait(counter)`, linked onto that counter's list.
    Waiting,
}

/// A single user-space execution context: an owned stack plus the saved
/// stack pointer `switch_context` needs to resume it, per §3/§4.2.
///
/// A `Fiber` is always reached through a raw pointer owned by exactly one
/// of: a [`crate::pool::FiberPool`] free list, a worker's
/// [`crate::deque::WorkStealingDeque`], the running-on-this-thread slot, or
/// a [`Counter`]'s wait list. `next_free` and `next_waiter` are therefore
/// never both "in use" at the same time, which is what lets a single
/// `Fiber` carry both intrusive links.
pub struct Fiber {
    stack: *mut u8,
    stack_layout: Layout,
    /// Saved stack pointer; valid to read only while the fiber isn't
    /// currently running.
    saved_sp: UnsafeCell<StackPointer>,
    state: AtomicU8,
    /// The closure this fiber is carrying, taken by `fiber_main` when it
    /// first runs.
    work: UnsafeCell<Option<Box<dyn FnOnce() + Send>>>,
    /// Counter this fiber decrements when its work completes (fork-join
    /// bookkeeping), if any.
    completion_counter: UnsafeCell<*const Counter>,
    /// Counter this fiber is parked on while `Waiting`.
    wait_counter: UnsafeCell<*const Counter>,
    /// Intrusive link for `FiberPool`'s free-list Treiber stack.
    pub(crate) next_free: AtomicPtr<Fiber>,
    /// Intrusive link for `Counter`'s wait-list Treiber stack.
    pub(crate) next_waiter: AtomicPtr<Fiber>,
}

// SAFETY: a `Fiber`'s fields are only mutated by whichever single thread
// currently owns it (per the exclusive-ownership invariant above); the
// atomics exist for the handoff itself, not for concurrent access.
unsafe impl Send for Fiber {}
unsafe impl Sync for Fiber {}

impl Fiber {
    /// Allocates a new fiber with its own stack. The fiber starts `Idle`
    /// with no work and must be given a closure via [`Fiber::set_work`]
    /// before being switched into.
    pub fn new() -> Self {
        let layout = Layout::from_size_align(FIBER_STACK_SIZE, STACK_ALIGN)
            .expect("fiber stack layout is always valid");
        // SAFETY: layout has nonzero size.
        let stack = unsafe { alloc(layout) };
        assert!(!stack.is_null(), "failed to allocate fiber stack");

        #[cfg(debug_assertions)]
        // SAFETY: `stack` points to `FIBER_STACK_SIZE` writable bytes;
        // a `usize` at the very start fits within that region.
        unsafe {
            (stack as *mut usize).write(CANARY);
        }

        Fiber {
            stack,
            stack_layout: layout,
            saved_sp: UnsafeCell::new(0),
            state: AtomicU8::new(FiberState::Idle as u8),
            work: UnsafeCell::new(None),
            completion_counter: UnsafeCell::new(ptr::null()),
            wait_counter: UnsafeCell::new(ptr::null()),
            next_free: AtomicPtr::new(ptr::null_mut()),
            next_waiter: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub fn state(&self) -> FiberState {
        match self.state.load(Ordering::Acquire) {
            0 => FiberState::Idle,
            1 => FiberState::Queued,
            2 => FiberState::Running,
            3 => FiberState::Waiting,
            _ => unreachable!("invalid fiber state byte"),
        }
    }

    #[inline]
    pub fn set_state(&self, state: FiberState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Checks the debug-build canary, logging and asserting on corruption.
    /// Called when a fiber is returned to the pool.
    #[cfg(debug_assertions)]
    pub(crate) fn check_canary(&self) {
        // SAFETY: the low end of the stack allocation is not in use while
        // the fiber is idle.
        let word = unsafe { (self.stack as *const usize).read() };
        assert_eq!(
            word, CANARY,
            "fiber stack canary corrupted — likely stack overflow in a spawned task"
        );
    }

    #[cfg(not(debug_assertions))]
    pub(crate) fn check_canary(&self) {}

    /// Installs a work closure and (optionally) the counter to decrement on
    /// completion, and primes the stack so that switching into this fiber
    /// enters [`fiber_main`].
    ///
    /// # Safety
    ///
    /// The fiber must currently be `Idle` and not referenced by any other
    /// thread.
    pub unsafe fn set_work(&self, work: Box<dyn FnOnce() + Send>, completion_counter: *const Counter) {
        unsafe {
            *self.work.get() = Some(work);
            *self.completion_counter.get() = completion_counter;

            let stack_top = self.stack.add(FIBER_STACK_SIZE);
            let sp = context::prepare_stack(stack_top, ptr::from_ref(self).cast_mut().cast());
            *self.saved_sp.get() = sp;
        }
    }

    #[inline]
    pub(crate) fn saved_sp(&self) -> StackPointer {
        // SAFETY: only read while this fiber isn't running.
        unsafe { *self.saved_sp.get() }
    }

    /// Raw pointer to the saved-stack-pointer cell, for `switch_context`'s
    /// `out_prev_sp` parameter.
    #[inline]
    pub(crate) fn saved_sp_ptr(&self) -> *mut StackPointer {
        self.saved_sp.get()
    }

    /// Records the counter a fiber is about to suspend on, or clears it
    /// (pass a null pointer) once the worker has attached it to that
    /// counter's wait list. Set by the fiber itself before suspending;
    /// read and cleared by the worker that resumes it, per §4.5.
    ///
    /// # Safety
    ///
    /// Must only be called on the fiber currently running on the calling
    /// thread, or by the worker that owns it while it is fully suspended.
    pub fn set_wait_counter(&self, counter: *const Counter) {
        unsafe {
            *self.wait_counter.get() = counter;
        }
    }

    /// The counter this fiber marked itself as waiting on, or null.
    pub fn wait_counter(&self) -> *const Counter {
        unsafe { *self.wait_counter.get() }
    }

    fn take_work(&self) -> Box<dyn FnOnce() + Send> {
        unsafe { (*self.work.get()).take() }.expect("fiber entered with no work installed")
    }

    fn completion_counter(&self) -> *const Counter {
        unsafe { *self.completion_counter.get() }
    }
}

impl Drop for Fiber {
    fn drop(&mut self) {
        // SAFETY: `stack`/`stack_layout` were produced together by `alloc`
        // in `new` and never reallocated.
        unsafe {
            dealloc(self.stack, self.stack_layout);
        }
    }
}

impl Default for Fiber {
    fn default() -> Self {
        Self::new()
    }
}

thread_local! {
    /// The fiber currently running on this worker thread, if any.
    static CURRENT_FIBER: std::cell::Cell<*mut Fiber> = const { std::cell::Cell::new(ptr::null_mut()) };
}

/// Returns the fiber currently running on this thread, if this thread is a
/// scheduler worker that is presently inside one.
pub fn current() -> Option<*mut Fiber> {
    let ptr = CURRENT_FIBER.with(std::cell::Cell::get);
    if ptr.is_null() {
        None
    } else {
        Some(ptr)
    }
}

pub(crate) fn set_current(fiber: *mut Fiber) {
    CURRENT_FIBER.with(|cell| cell.set(fiber));
}

/// Entry point every fiber's stack is primed to land in on its first
/// switch-in (via [`context::fiber_trampoline_entry`]). Runs the fiber's
/// closure, decrements its completion counter if any, then switches back
/// to the worker loop's stack by calling into
/// [`crate::pool::return_to_scheduler`] — which never returns here, since
/// the fiber is recycled instead of unwound.
///
/// # Safety
///
/// `fiber_ptr` must be a valid, exclusively-owned `*mut Fiber` with work
/// already installed via [`Fiber::set_work`].
pub(crate) unsafe fn fiber_main(fiber_ptr: *mut Fiber) -> ! {
    set_current(fiber_ptr);
    // SAFETY: `fiber_ptr` is valid and exclusively owned for the duration
    // of this call per the caller's contract.
    let fiber = unsafe { &*fiber_ptr };
    fiber.set_state(FiberState::Running);

    let work = fiber.take_work();
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));

    let completion_counter = fiber.completion_counter();
    let woken = if completion_counter.is_null() {
        Vec::new()
    } else {
        // SAFETY: the spawner guarantees the counter outlives this fiber's
        // execution (it's waited on before being dropped). The drained
        // list (if this decrement lands on the zero transition) must be
        // handed back to the scheduler to requeue — nothing in this
        // leaf crate knows how to run a fiber, so it can't requeue them
        // itself.
        unsafe { &*completion_counter }.decrement()
    };

    crate::pool::return_to_scheduler(fiber_ptr, result.err(), woken);
}
