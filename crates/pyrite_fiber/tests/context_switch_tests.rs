//! End-to-end tests that actually perform a context switch onto a fiber
//! stack and back, rather than only exercising the data structures around
//! it in isolation.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use pyrite_fiber::pool::{self, FiberOutcome};
use pyrite_fiber::{Counter, FiberPool};

#[test]
fn fiber_runs_its_closure_and_reports_completion() {
    let pool = FiberPool::new(4, 16);
    let fiber = pool.alloc().expect("pool should not be exhausted");

    let ran = Arc::new(AtomicBool::new(false));
    let ran_in_closure = Arc::clone(&ran);

    // SAFETY: `fiber` was just allocated, not referenced elsewhere.
    unsafe {
        (*fiber).set_work(
            Box::new(move || {
                ran_in_closure.store(true, Ordering::SeqCst);
            }),
            std::ptr::null(),
        );
    }

    // SAFETY: `fiber` has work installed and is not running anywhere else.
    let outcome = unsafe { pool::switch_to_fiber(fiber) };
    let FiberOutcome { fiber: completed, panic } = outcome.expect("fiber should run to completion");
    assert_eq!(completed, fiber);
    assert!(panic.is_none());
    assert!(ran.load(Ordering::SeqCst));

    // SAFETY: the fiber completed and is not referenced anywhere else.
    unsafe {
        pool.release(fiber);
    }
}

#[test]
fn fiber_panic_is_captured_rather_than_unwinding_into_the_worker() {
    let pool = FiberPool::new(4, 16);
    let fiber = pool.alloc().expect("pool should not be exhausted");

    // SAFETY: freshly allocated fiber.
    unsafe {
        (*fiber).set_work(Box::new(|| panic!("boom")), std::ptr::null());
    }

    // SAFETY: work installed, exclusively owned.
    let outcome = unsafe { pool::switch_to_fiber(fiber) }.expect("fiber completes (by panicking)");
    assert!(outcome.panic.is_some());

    // SAFETY: completed fiber, not referenced elsewhere.
    unsafe {
        pool.release(fiber);
    }
}

#[test]
fn decrementing_a_shared_counter_across_many_fibers() {
    const N: usize = 256;
    let pool = FiberPool::new(8, N + 8);
    let counter = Counter::new(N as isize);
    let total = Arc::new(AtomicUsize::new(0));

    let mut fibers = Vec::with_capacity(N);
    for i in 0..N {
        let fiber = pool.alloc().expect("pool should not be exhausted");
        let total = Arc::clone(&total);
        // SAFETY: freshly allocated fiber, counter outlives this scope.
        unsafe {
            (*fiber).set_work(
                Box::new(move || {
                    total.fetch_add(i, Ordering::SeqCst);
                }),
                std::ptr::from_ref(&counter),
            );
        }
        fibers.push(fiber);
    }

    for fiber in &fibers {
        // SAFETY: each fiber has work installed and is switched into
        // exactly once, sequentially, on this single test thread.
        let outcome = unsafe { pool::switch_to_fiber(*fiber) }.expect("fiber runs to completion");
        assert!(outcome.panic.is_none());
        // SAFETY: completed, no longer referenced.
        unsafe {
            pool.release(*fiber);
        }
    }

    assert!(counter.is_zero());
    assert_eq!(total.load(Ordering::SeqCst), (0..N).sum::<usize>());
}
