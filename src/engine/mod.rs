//! Engine module - active selection, the judging loop, and review sessions.
//!
//! Provides:
//! - `ActiveSelector`: entropy-times-decay ranking of items for human review
//! - `JudgingLoop`: throttled, cancellable round-robin cursor walker
//! - `ReviewSession`: single-actor composition of store, pool, loop, and
//!   selector, including the labeling pipeline

mod judging;
mod selector;
mod session;

pub use judging::*;
pub use selector::*;
pub use session::*;
