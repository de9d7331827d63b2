//! Per-task runner fallback cascade
//!
//! Resolution composes the ordered list of runner names for a task and
//! applies the safety filters; the engine then attempts each name in
//! order, journaling every attempt and feeding rate-limit and
//! connectivity evidence back into the shared blacklist.

pub mod engine;
pub mod resolve;

pub use engine::{CascadeContext, run_cascade};
pub use resolve::{CascadePolicy, resolve_cascade};
