//! [`FiberPool`]: a lock-free free-list that recycles [`Fiber`]s, plus the
//! low-level switch-in/switch-out machinery workers use to enter and leave
//! them.
//!
//! The switch machinery lives here rather than in `context` because it
//! needs a per-thread "where do I resume the worker loop" slot
//! ([`SCHEDULER_SP`]) that only makes sense paired with the pool's
//! recycling logic: a fiber that finishes deposits its outcome in
//! [`COMPLETION`] right before switching back, and the scheduler picks it
//! up from [`switch_to_fiber`]'s return value to decide whether to recycle
//! the fiber or re-queue it as a waiter.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use log::warn;

use crate::context::{self, StackPointer};
use crate::fiber::{Fiber, FiberState};

thread_local! {
    /// The worker loop's own stack pointer, valid only while a fiber is
    /// running on this thread. Read by `Fiber::fiber_main`'s exit path to
    /// know where to jump back to.
    static SCHEDULER_SP: Cell<StackPointer> = const { Cell::new(0) };

    /// Set by a fiber immediately before switching back to the scheduler
    /// having finished (as opposed to merely suspending on a `wait`).
    static COMPLETION: RefCell<Option<FiberOutcome>> = const { RefCell::new(None) };
}

/// What happened to a fiber between a [`switch_to_fiber`] call and its
/// return.
pub struct FiberOutcome {
    /// The fiber that ran to completion.
    pub fiber: *mut Fiber,
    /// `Some` if the fiber's closure panicked; the scheduler re-raises this
    /// via [`std::panic::resume_unwind`] after recycling the fiber, so a
    /// panic in spawned work surfaces the same way a top-level panic would.
    pub panic: Option<Box<dyn Any + Send>>,
    /// Fibers that were waiting on this fiber's completion counter and
    /// were drained by the zero-transition decrement. The scheduler must
    /// make each of these runnable again (push onto a deque or the main
    /// queue) — this crate has no scheduler to do that itself.
    pub woken: Vec<*mut Fiber>,
}

/// Switches from the calling (worker loop) stack onto `fiber`'s stack and
/// blocks until that fiber either completes or suspends itself via
/// [`suspend_current`].
///
/// Returns `Some(outcome)` if the fiber ran to completion during this call,
/// `None` if it suspended (and has already been linked wherever it's
/// waiting, by the caller of `wait`, before the switch back).
///
/// # Safety
///
/// `fiber` must point to a valid [`Fiber`] with work installed via
/// [`Fiber::set_work`], not currently running anywhere else.
pub unsafe fn switch_to_fiber(fiber: *mut Fiber) -> Option<FiberOutcome> {
    COMPLETION.with(|c| *c.borrow_mut() = None);
    // SAFETY: `fiber` is valid per the caller's contract; `SCHEDULER_SP`'s
    // cell is valid to write a `usize` through for the lifetime of this
    // thread.
    unsafe {
        context::switch_context(SCHEDULER_SP.with(Cell::as_ptr), (*fiber).saved_sp());
    }
    COMPLETION.with(|c| c.borrow_mut().take())
}

/// Suspends the currently-running fiber, switching back to whichever
/// [`switch_to_fiber`] call most recently entered it. Returns once some
/// later `switch_to_fiber` call resumes this same fiber.
///
/// Called by `pyrite_scheduler`'s `wait` implementation after the fiber has
/// recorded which [`crate::counter::Counter`] it's waiting on via
/// `Fiber::set_wait_counter`, but *before* anything links it onto that
/// counter's wait list — per §4.5, the worker does the linking itself once
/// this call returns `None` from the worker's perspective (i.e. once
/// `switch_to_fiber` regains control), when it's safe to touch the fiber
/// again because it is fully suspended.
///
/// # Safety
///
/// Must be called from within `fiber`'s own stack (i.e. from code running
/// as that fiber), and `fiber` must not be concurrently touched by any
/// other thread until this call returns.
pub unsafe fn suspend_current(fiber: *mut Fiber) {
    let scheduler_sp = SCHEDULER_SP.with(Cell::get);
    // SAFETY: per caller's contract, this executes on `fiber`'s own stack;
    // `(*fiber).saved_sp_ptr()` is valid to write through.
    unsafe {
        context::switch_context((*fiber).saved_sp_ptr(), scheduler_sp);
    }
    crate::fiber::set_current(fiber);
}

/// Deposits `fiber`'s completion outcome and switches back to the
/// scheduler, never to resume this stack again (the fiber is recycled by
/// the scheduler instead).
///
/// # Safety
///
/// Must be called from within `fiber`'s own stack, exactly once, as the
/// final action of [`crate::fiber::fiber_main`].
pub(crate) unsafe fn return_to_scheduler(
    fiber: *mut Fiber,
    panic: Option<Box<dyn Any + Send>>,
    woken: Vec<*mut Fiber>,
) -> ! {
    COMPLETION.with(|c| *c.borrow_mut() = Some(FiberOutcome { fiber, panic, woken }));
    let scheduler_sp = SCHEDULER_SP.with(Cell::get);
    // SAFETY: this fiber is never resumed again, so discarding its own
    // resume point (null out_prev_sp) is correct.
    unsafe {
        context::switch_context(ptr::null_mut(), scheduler_sp);
    }
    unreachable!("a completed fiber's stack must never be switched back into")
}

/// A lock-free free-list of reusable [`Fiber`]s, per §4.2.
///
/// Implemented as a Treiber stack over `Fiber::next_free`: `alloc` pops,
/// `release` pushes. Allocates new fibers (bounded by `max_fibers`) when
/// the free list runs dry rather than blocking, since blocking on a worker
/// thread would stall the whole scheduler (§5).
pub struct FiberPool {
    head: AtomicPtr<Fiber>,
    live_count: AtomicUsize,
    max_fibers: usize,
}

impl FiberPool {
    /// Creates a pool pre-populated with `initial` fibers, refusing to grow
    /// past `max_fibers` total.
    pub fn new(initial: usize, max_fibers: usize) -> Self {
        let pool = FiberPool {
            head: AtomicPtr::new(ptr::null_mut()),
            live_count: AtomicUsize::new(0),
            max_fibers,
        };
        for _ in 0..initial {
            let fiber = Box::into_raw(Box::new(Fiber::new()));
            pool.live_count.fetch_add(1, Ordering::Relaxed);
            pool.push_free(fiber);
        }
        pool
    }

    fn push_free(&self, fiber: *mut Fiber) {
        // SAFETY: `fiber` is exclusively owned by the pool at this point.
        let fiber_ref = unsafe { &*fiber };
        fiber_ref.set_state(FiberState::Idle);
        loop {
            let head = self.head.load(Ordering::Acquire);
            fiber_ref.next_free.store(head, Ordering::Relaxed);
            if self
                .head
                .compare_exchange_weak(head, fiber, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn pop_free(&self) -> Option<*mut Fiber> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            if head.is_null() {
                return None;
            }
            // SAFETY: `head` was pushed by this pool and hasn't been freed;
            // nothing else pops from this Treiber stack concurrently
            // without going through the same CAS loop.
            let next = unsafe { (*head).next_free.load(Ordering::Relaxed) };
            if self
                .head
                .compare_exchange_weak(head, next, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return Some(head);
            }
        }
    }

    /// Takes a fiber from the free list, allocating a new one if the list
    /// is empty and the pool hasn't hit `max_fibers`. Logs at `warn` when
    /// forced to grow, per §7's resource-shortage handling, since steady
    /// state should reuse fibers rather than keep allocating.
    pub fn alloc(&self) -> Option<*mut Fiber> {
        if let Some(fiber) = self.pop_free() {
            return Some(fiber);
        }
        if self.live_count.fetch_add(1, Ordering::Relaxed) >= self.max_fibers {
            self.live_count.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        warn!("fiber pool exhausted free list, allocating a new fiber stack");
        Some(Box::into_raw(Box::new(Fiber::new())))
    }

    /// Returns a fiber to the free list after its work has completed.
    /// Checks the debug-build stack canary first.
    ///
    /// # Safety
    ///
    /// `fiber` must not be referenced anywhere else (queued, running, or
    /// waiting) after this call.
    pub unsafe fn release(&self, fiber: *mut Fiber) {
        // SAFETY: caller guarantees exclusive ownership.
        let fiber_ref = unsafe { &*fiber };
        fiber_ref.check_canary();
        self.push_free(fiber);
    }

    /// Number of fibers currently allocated (idle, queued, running, or
    /// waiting) — never exceeds `max_fibers`.
    pub fn live_count(&self) -> usize {
        self.live_count.load(Ordering::Relaxed)
    }
}

impl Drop for FiberPool {
    fn drop(&mut self) {
        // Reclaims whatever remains on the free list. Fibers checked out
        // (queued/running/waiting) at drop time are a caller bug — the
        // scheduler must quiesce all workers before dropping its pool —
        // and are intentionally leaked rather than double-freed.
        while let Some(fiber) = self.pop_free() {
            // SAFETY: popped from our own free list, exclusively owned.
            unsafe {
                drop(Box::from_raw(fiber));
            }
        }
    }
}

// SAFETY: access to the free list is entirely through the atomic
// CAS loop above.
unsafe impl Send for FiberPool {}
unsafe impl Sync for FiberPool {}
