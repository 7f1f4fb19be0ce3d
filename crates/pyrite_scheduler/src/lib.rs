//! The fiber-based work-stealing task scheduler.
//!
//! Owns a fixed set of OS worker threads plus the fiber pool and deques from
//! `pyrite_fiber`, and exposes the cooperative-multitasking public contract:
//! [`TaskScheduler::spawn`], [`TaskScheduler::spawn_on_main`],
//! [`TaskScheduler::wait`], and [`TaskScheduler::parallel_for`].
//!
//! Nothing above this crate should need to reach into `pyrite_fiber`
//! directly — this is the seam where "a stack that can be suspended" turns
//! into "a task system with fork-join and data-parallel loops".

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]

mod scheduler;
mod worker;

pub use pyrite_fiber::Counter;
pub use scheduler::TaskScheduler;
