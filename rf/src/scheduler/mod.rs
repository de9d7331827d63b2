//! Dependency-aware worker-pool scheduler
//!
//! Advances the task graph with a bounded pool of workers: roots seed the
//! ready queue, completions unlock children, failures skip transitive
//! dependents, and an optional fail-fast policy drains the queue after
//! the first failure.

pub mod config;
pub mod core;
pub mod queue;

pub use config::SchedulerConfig;
pub use core::{Scheduler, UpdateCallback};
pub use queue::{ReadyEntry, ReadyQueue};
