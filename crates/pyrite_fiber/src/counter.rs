//! [`Counter`]: the fork-join synchronization primitive fibers suspend on.
//!
//! A `Counter` is an atomic signed count plus an intrusive Treiber stack of
//! fibers parked waiting for it to reach zero. Per §4.4, the drain happens
//! exactly once, at the transition from nonzero to zero — a
//! `decrement`-to-zero by the last finisher is what wakes every waiter, not
//! each individual decrement re-checking and possibly double-draining.

use std::ptr;
use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};

use crate::fiber::Fiber;

/// An atomic fork-join latch. `spawn` increments it once per task handed
/// out; each task's completion decrements it once. `wait` parks the
/// calling fiber until the count reaches zero, per §4.4/§4.5.
pub struct Counter {
    count: AtomicIsize,
    waiters: AtomicPtr<Fiber>,
}

impl Counter {
    pub fn new(initial: isize) -> Self {
        Counter {
            count: AtomicIsize::new(initial),
            waiters: AtomicPtr::new(ptr::null_mut()),
        }
    }

    #[inline]
    pub fn value(&self) -> isize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.value() <= 0
    }

    /// Increments the count by one. Called once per task spawned against
    /// this counter, before the task is made visible to any worker.
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrements the count by one. If this decrement is the one that
    /// brings the count to zero, drains and returns every fiber currently
    /// parked on this counter so the caller can re-queue them.
    ///
    /// Only the decrement that observes the zero transition drains —
    /// concurrent decrements that land above zero do nothing further,
    /// which is what makes the "drain exactly once" guarantee hold without
    /// an extra lock.
    pub fn decrement(&self) -> Vec<*mut Fiber> {
        let prev = self.count.fetch_sub(1, Ordering::AcqRel);
        if prev != 1 {
            return Vec::new();
        }
        self.drain_waiters()
    }

    fn drain_waiters(&self) -> Vec<*mut Fiber> {
        let mut head = self.waiters.swap(ptr::null_mut(), Ordering::AcqRel);
        let mut drained = Vec::new();
        while !head.is_null() {
            // SAFETY: every pointer on this list was pushed by `park` below
            // and is exclusively owned by the wait list until drained.
            let next = unsafe { (*head).next_waiter.load(Ordering::Relaxed) };
            drained.push(head);
            head = next;
        }
        drained
    }

    /// Links a fully-suspended `fiber` onto this counter's wait list.
    ///
    /// Per §4.5's fiber entry protocol, this is called by the *worker*
    /// after the fiber has already switched back to it having set its own
    /// `pending_wait_counter` — never by the fiber on its own stack — so
    /// there is no self-resumption hazard in pushing it here.
    ///
    /// Returns the fibers the caller must make runnable again: empty if
    /// `fiber` is now genuinely parked (a later [`Counter::decrement`]
    /// will drain it), or a non-empty list — possibly containing fibers
    /// other than `fiber`, if several workers raced the same zero
    /// transition — if the count had already reached (or just reached)
    /// zero and this call won the drain race against the last
    /// decrementer.
    ///
    /// # Safety
    ///
    /// `fiber` must not already be linked on any other wait list or free
    /// list, and must not be running on any thread.
    pub unsafe fn park(&self, fiber: *mut Fiber) -> Vec<*mut Fiber> {
        if self.is_zero() {
            return vec![fiber];
        }
        // SAFETY: caller guarantees exclusive ownership of `fiber`'s link
        // fields for the duration of this call.
        let fiber_ref = unsafe { &*fiber };
        loop {
            let head = self.waiters.load(Ordering::Acquire);
            fiber_ref.next_waiter.store(head, Ordering::Relaxed);
            if self
                .waiters
                .compare_exchange_weak(head, fiber, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
        // A decrement may have raced us to zero and already swapped the
        // list out before our push landed, in which case `fiber` would
        // wait forever unless we drain here ourselves.
        if self.is_zero() {
            return self.drain_waiters();
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decrement_to_zero_drains_exactly_once() {
        let counter = Counter::new(0);
        counter.increment();
        counter.increment();
        assert_eq!(counter.decrement(), Vec::<*mut Fiber>::new());
        assert!(!counter.is_zero());
        let drained = counter.decrement();
        assert!(counter.is_zero());
        // No waiters were parked in this test, but the drain must still
        // fire (return, even if empty) exactly on the zero transition.
        assert!(drained.is_empty());
    }

    #[test]
    fn park_returns_fiber_immediately_when_already_zero() {
        let counter = Counter::new(0);
        let fiber = Box::into_raw(Box::new(Fiber::new()));
        // SAFETY: freshly boxed, not linked anywhere.
        let runnable = unsafe { counter.park(fiber) };
        assert_eq!(runnable, vec![fiber]);
        // SAFETY: never linked, safe to drop directly.
        unsafe {
            drop(Box::from_raw(fiber));
        }
    }

    #[test]
    fn value_tracks_increments_and_decrements() {
        let counter = Counter::new(0);
        counter.increment();
        counter.increment();
        counter.increment();
        assert_eq!(counter.value(), 3);
        counter.decrement();
        assert_eq!(counter.value(), 2);
    }
}
