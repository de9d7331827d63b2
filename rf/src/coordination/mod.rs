//! Shared coordination state across tasks
//!
//! Three small handles travel through the scheduler and cascade instead
//! of living as globals: a time-bounded runner blacklist, a durable
//! quality graylist, and per-provider concurrency limits.

pub mod blacklist;
pub mod graylist;
pub mod limiter;

pub use blacklist::Blacklist;
pub use graylist::{Graylist, GraylistEntry};
pub use limiter::ProviderLimiter;
