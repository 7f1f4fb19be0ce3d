//! [`TaskScheduler`]: owns the workers, the fiber pool, and the main-thread
//! incoming queue; exposes the public scheduling contract from §4.5.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use parking_lot::Mutex as TryMutex;
use pyrite_fiber::{Counter, Fiber, FiberPool, WorkStealingDeque};

use crate::worker;

/// Default number of pooled fibers per worker (§4.2).
const DEFAULT_FIBERS_PER_WORKER: usize = 128;
/// Default per-worker deque capacity; must be a power of two (rounded up
/// internally if not).
const DEFAULT_DEQUE_CAPACITY: usize = 4096;

/// Owns the worker threads, the shared fiber pool, each worker's
/// work-stealing deque, and the mutex-protected main-thread incoming
/// queue. Constructed once per engine instance and shared via `Arc`.
pub struct TaskScheduler {
    deques: Vec<WorkStealingDeque<*mut Fiber>>,
    fiber_pool: FiberPool,
    main_queue: TryMutex<VecDeque<*mut Fiber>>,
    num_workers: usize,
    shutdown: AtomicBool,
    join_handles: Mutex<Vec<JoinHandle<()>>>,
}

// SAFETY: all raw-pointer fields (deques of `*mut Fiber`, the main queue)
// are only ever touched through the synchronized operations these types
// already provide (`WorkStealingDeque`'s atomic protocol, the `main_queue`
// mutex); there is no unsynchronized aliasing of scheduler state itself.
unsafe impl Send for TaskScheduler {}
unsafe impl Sync for TaskScheduler {}

impl TaskScheduler {
    /// Creates a scheduler with `num_workers` total workers (including
    /// worker 0, the main thread) and spawns OS threads for workers
    /// `1..num_workers` immediately. Worker 0 does not run until
    /// [`TaskScheduler::attach_main_thread`] is called on the thread that
    /// will drive the main loop.
    pub fn new(num_workers: usize) -> Arc<Self> {
        let num_workers = num_workers.max(1);
        let deques = (0..num_workers)
            .map(|_| WorkStealingDeque::new(DEFAULT_DEQUE_CAPACITY))
            .collect();

        let scheduler = Arc::new(TaskScheduler {
            deques,
            fiber_pool: FiberPool::new(
                DEFAULT_FIBERS_PER_WORKER * num_workers,
                DEFAULT_FIBERS_PER_WORKER * num_workers * 4,
            ),
            main_queue: TryMutex::new(VecDeque::new()),
            num_workers,
            shutdown: AtomicBool::new(false),
            join_handles: Mutex::new(Vec::new()),
        });

        let mut handles = Vec::with_capacity(num_workers.saturating_sub(1));
        for index in 1..num_workers {
            let scheduler = Arc::clone(&scheduler);
            let handle = std::thread::Builder::new()
                .name(format!("pyrite-worker-{index}"))
                .spawn(move || worker::run_worker_loop(scheduler, index))
                .expect("failed to spawn scheduler worker thread");
            handles.push(handle);
        }
        *scheduler.join_handles.lock().expect("join handle list poisoned") = handles;

        scheduler
    }

    /// Attaches the calling OS thread as worker 0. Must be called exactly
    /// once, from the thread that will subsequently call
    /// [`TaskScheduler::pump_main_thread_tasks`] and
    /// [`TaskScheduler::wait`].
    pub fn attach_main_thread(self: &Arc<Self>) {
        assert!(worker::worker_index().is_none(), "thread is already attached to a scheduler");
        worker::set_worker_index(0);
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub(crate) fn deque(&self, index: usize) -> &WorkStealingDeque<*mut Fiber> {
        &self.deques[index]
    }

    pub(crate) fn fiber_pool(&self) -> &FiberPool {
        &self.fiber_pool
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Pushes `fiber` onto the calling thread's own deque if it's a worker,
    /// or the main-thread incoming queue otherwise. Used by `spawn`'s
    /// fallback path and by `requeue_local` for stolen fibers returning to
    /// their new owner's deque.
    pub(crate) fn requeue_local(&self, fiber: *mut Fiber) {
        if let Some(index) = worker::worker_index() {
            if self.deques[index].push(fiber).is_err() {
                panic!("worker {index}'s deque overflowed its fixed capacity — this is a fatal scheduling error per the documented capacity limit");
            }
        } else {
            self.main_queue.lock().push_back(fiber);
        }
    }

    /// Drains the main-thread incoming queue onto worker `index`'s own
    /// deque under a try-lock, per §4.5 step (1). Only meaningful for
    /// worker 0; called defensively for any index but is a no-op unless
    /// the try-lock succeeds and the queue is nonempty.
    pub(crate) fn drain_main_queue_into(&self, index: usize) {
        let Some(mut queue) = self.main_queue.try_lock() else {
            return;
        };
        while let Some(fiber) = queue.pop_front() {
            if self.deques[index].push(fiber).is_err() {
                // Put it back rather than drop a task on the floor; the
                // deque is momentarily full, try again next tick.
                queue.push_front(fiber);
                break;
            }
        }
    }

    fn alloc_fiber(&self, work: Box<dyn FnOnce() + Send>, counter: Option<&Counter>) -> *mut Fiber {
        let fiber = self
            .fiber_pool
            .alloc()
            .expect("fiber pool exhausted its hard cap — increase DEFAULT_FIBERS_PER_WORKER or the workload's concurrent fiber count");
        if let Some(counter) = counter {
            counter.increment();
        }
        let counter_ptr = counter.map_or(std::ptr::null(), std::ptr::from_ref);
        // SAFETY: `fiber` was just allocated from the pool, not referenced
        // anywhere else.
        unsafe {
            (*fiber).set_work(work, counter_ptr);
        }
        fiber
    }

    /// Enqueues a one-shot work item. If `counter` is given, it is
    /// incremented before the fiber becomes eligible to run. Pushed to the
    /// calling worker's own deque if the caller is a worker; otherwise
    /// routed through the main-thread incoming queue (worker 0 drains it),
    /// since pushing directly onto another worker's deque would violate
    /// the deque's owner-only push invariant (§4.3).
    pub fn spawn(&self, work: Box<dyn FnOnce() + Send>, counter: Option<&Counter>) {
        let fiber = self.alloc_fiber(work, counter);
        self.requeue_local(fiber);
    }

    /// As [`TaskScheduler::spawn`], but the fiber is guaranteed to execute
    /// on worker 0. If the caller is already worker 0, pushes directly onto
    /// its deque; otherwise always routes through the main-thread incoming
    /// queue regardless of whether the caller itself is a worker.
    pub fn spawn_on_main(&self, work: Box<dyn FnOnce() + Send>, counter: Option<&Counter>) {
        let fiber = self.alloc_fiber(work, counter);
        if worker::worker_index() == Some(0) {
            if self.deques[0].push(fiber).is_err() {
                panic!("worker 0's deque overflowed its fixed capacity — this is a fatal scheduling error per the documented capacity limit");
            }
        } else {
            self.main_queue.lock().push_back(fiber);
        }
    }

    /// Blocks the caller until `counter` reaches zero, per §4.5.
    ///
    /// If called from within a fiber, suspends cooperatively (the calling
    /// worker thread keeps finding other work in the meantime). If called
    /// from a plain OS thread (no fiber currently running on it), spins a
    /// reduced worker loop — `pump_main_thread_tasks` if this thread is
    /// worker 0, otherwise a bare yield loop — invoking `on_idle` each time
    /// nothing was found.
    pub fn wait(&self, counter: &Counter, mut on_idle: Option<&mut dyn FnMut()>) {
        if counter.is_zero() {
            return;
        }

        if let Some(fiber) = pyrite_fiber::fiber::current() {
            // SAFETY: `fiber` is the fiber currently running on this
            // thread; only it can set its own wait counter.
            unsafe {
                (*fiber).set_wait_counter(std::ptr::from_ref(counter));
            }
            // SAFETY: called from within `fiber`'s own stack, as required.
            unsafe {
                pyrite_fiber::pool::suspend_current(fiber);
            }
            return;
        }

        let index = worker::worker_index();
        while !counter.is_zero() {
            let did_work = match index {
                Some(i) => worker::worker_tick(self, i),
                None => false,
            };
            if !did_work {
                if let Some(cb) = on_idle.as_deref_mut() {
                    cb();
                } else {
                    std::thread::yield_now();
                }
            }
        }
    }

    /// Decrements `counter` and, if this decrement lands on its zero
    /// transition, requeues every fiber that was parked waiting on it.
    ///
    /// Task completion already does this automatically for a task's own
    /// completion counter (§4.5's fiber entry protocol); this is the
    /// scheduler-aware entry point for any other code that needs to signal
    /// a counter directly — a manual [`Counter::decrement`] call would
    /// drain the waiters but have no way to make them runnable again,
    /// since `pyrite_fiber` has no scheduler to requeue them on.
    pub fn signal(&self, counter: &Counter) {
        let woken = counter.decrement();
        for fiber in woken {
            self.requeue_local(fiber);
        }
    }

    /// Spawns `ceil(count / chunk_size)` tasks, each invoking `body(start,
    /// end)` over its half-open subrange `[start, end)`. Chunk ordering is
    /// not guaranteed; `body` must be safe to call concurrently for
    /// disjoint ranges.
    pub fn parallel_for<F>(&self, count: usize, chunk_size: usize, body: F, counter: &Counter)
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        if count == 0 {
            return;
        }
        let chunk_size = chunk_size.max(1);
        let body = Arc::new(body);

        let mut start = 0;
        while start < count {
            let end = (start + chunk_size).min(count);
            let body = Arc::clone(&body);
            self.spawn(Box::new(move || body(start, end)), Some(counter));
            start = end;
        }
    }

    /// Performs steps (1) and (2) of the worker loop for worker 0 only —
    /// drain the main queue, then pop and run one local task — and
    /// returns. Called by the engine between frame stages rather than
    /// running a dedicated loop on the main thread (§4.5).
    pub fn pump_main_thread_tasks(&self) -> bool {
        assert_eq!(
            worker::worker_index(),
            Some(0),
            "pump_main_thread_tasks must only be called from the attached main thread"
        );
        worker::worker_tick(self, 0)
    }

    /// Signals every worker loop to stop once its current tick finds no
    /// more work, then joins all worker threads. Does not interrupt a
    /// fiber that is mid-execution (§5's cancellation policy).
    ///
    /// Must be called explicitly by the owner before the last `Arc` to this
    /// scheduler is dropped — each worker thread holds its own `Arc` clone
    /// for its whole lifetime, so nothing would ever observe the shutdown
    /// flag if it were only set from a `Drop` impl run after every worker
    /// has already exited.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let handles = std::mem::take(&mut *self.join_handles.lock().expect("join handle list poisoned"));
        for handle in handles {
            let _ = handle.join();
        }
    }
}
