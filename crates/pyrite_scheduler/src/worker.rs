//! Per-thread state and the worker loop body, per §4.5's "Worker loop" and
//! "Thread-locals" subsections.

use std::cell::Cell;
use std::ptr;
use std::sync::Arc;
use std::time::Duration;

use log::error;
use pyrite_fiber::pool;

use crate::scheduler::TaskScheduler;

thread_local! {
    /// This thread's worker index, if it's a scheduler worker at all.
    /// Worker 0 is the attached main thread; 1..N are dedicated OS threads.
    static WORKER_INDEX: Cell<Option<usize>> = const { Cell::new(None) };

    /// Round-robin steal cursor, per §4.5: starts at `(self + 1) % n`.
    static NEXT_VICTIM: Cell<usize> = const { Cell::new(0) };
}

/// This thread's worker index, or `None` if it has never attached.
pub(crate) fn worker_index() -> Option<usize> {
    WORKER_INDEX.with(Cell::get)
}

pub(crate) fn set_worker_index(index: usize) {
    WORKER_INDEX.with(|cell| cell.set(Some(index)));
    NEXT_VICTIM.with(|cell| cell.set(index));
}

/// Entry point for a dedicated worker OS thread (workers `1..num_workers`).
/// Runs until the scheduler's shutdown flag is observed with nothing left
/// to do on this worker's own deque.
pub(crate) fn run_worker_loop(scheduler: Arc<TaskScheduler>, index: usize) {
    set_worker_index(index);
    loop {
        let did_work = worker_tick(&scheduler, index);
        if !did_work {
            if scheduler.is_shutting_down() {
                break;
            }
            std::thread::sleep(Duration::from_micros(50));
        }
    }
}

/// One iteration of the worker loop: pop the local deque, else steal from a
/// round-robin victim, else report idle. Runs at most one fiber to its next
/// suspension or completion. Returns whether any work was found.
///
/// This is also what [`TaskScheduler::pump_main_thread_tasks`] calls for
/// worker 0, performing steps (1) (main-queue drain) and (2) (local pop)
/// only, per §4.5's note that the main thread never runs the steal step.
pub(crate) fn worker_tick(scheduler: &TaskScheduler, index: usize) -> bool {
    if index == 0 {
        scheduler.drain_main_queue_into(index);
    }

    if let Some(fiber) = scheduler.deque(index).pop() {
        run_fiber(scheduler, fiber);
        return true;
    }

    if index == 0 {
        // Worker 0 never steals; it only pumps between frame stages.
        return false;
    }

    let num_workers = scheduler.num_workers();
    let start = NEXT_VICTIM.with(Cell::get);
    for offset in 0..num_workers {
        let victim = (start + offset) % num_workers;
        if victim == index {
            continue;
        }
        if let Some(fiber) = scheduler.deque(victim).steal() {
            NEXT_VICTIM.with(|cell| cell.set((victim + 1) % num_workers));
            run_fiber(scheduler, fiber);
            return true;
        }
    }
    false
}

/// Switches into `fiber`, runs it to its next suspension or completion, and
/// handles the result per §4.5's fiber entry protocol: attach to a counter
/// if it's waiting, return it to the pool if it finished, or reschedule it
/// if it merely yielded.
pub(crate) fn run_fiber(scheduler: &TaskScheduler, fiber: *mut pyrite_fiber::Fiber) {
    // SAFETY: `fiber` was just popped or stolen, so it is not running
    // anywhere else and this thread has exclusive access to it.
    let outcome = unsafe { pool::switch_to_fiber(fiber) };

    match outcome {
        Some(completed) => {
            // SAFETY: the fiber just finished; nothing else references it.
            unsafe {
                scheduler.fiber_pool().release(completed.fiber);
            }
            for woken in completed.woken {
                scheduler.requeue_local(woken);
            }
            if let Some(panic) = completed.panic {
                error!("task panicked; propagating after releasing its fiber");
                std::panic::resume_unwind(panic);
            }
        }
        None => {
            // SAFETY: `fiber` is fully suspended now that `switch_to_fiber`
            // has returned control to us.
            let fiber_ref = unsafe { &*fiber };
            let wait_counter = fiber_ref.wait_counter();
            if wait_counter.is_null() {
                // Voluntarily yielded with no wait target: reschedule.
                scheduler.requeue_local(fiber);
            } else {
                // SAFETY: the spawner of whatever made this fiber wait
                // guarantees the counter outlives the wait.
                let counter = unsafe { &*wait_counter };
                fiber_ref.set_wait_counter(ptr::null());
                // SAFETY: `fiber` is suspended and not linked anywhere.
                let runnable = unsafe { counter.park(fiber) };
                for ready in runnable {
                    scheduler.requeue_local(ready);
                }
            }
        }
    }
}
