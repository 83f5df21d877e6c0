//! arbitrium - Human-in-the-loop active learning with an LLM arbiter.
//!
//! ## Architecture
//!
//! arbitrium keeps three cooperating parts on a single control task:
//! - **Judging loop**: walks all items round-robin, asking the arbiter for a
//!   yes-probability per item, throttled and cancellable
//! - **Active selector**: ranks judged items by entropy decayed by staleness
//!   and picks the one most worth a human look
//! - **Labeling pipeline**: applies a human verdict, grows the few-shot
//!   example pool, and marks every other verdict one step staler
//!
//! ## Epistemic design
//!
//! - K_i (Knowledge): status transitions enforced by a closed sum type
//! - B_i (Beliefs): every arbiter call and file touch is a Result
//! - I^R (Resolvable): Lambda, throttle QPS, model are user configuration
//! - I^B (Bounded): network uncertainty lives in the arbiter (retry, backoff)

pub mod client;
pub mod engine;
pub mod models;
pub mod store;

// Re-exports for convenience
pub use client::{Arbiter, ArbiterError, DummyArbiter, GptArbiter};
pub use engine::{ActiveSelector, JudgingLoop, ReviewSession, SelectOutcome, StepOutcome, Throttle};
pub use models::{ArbitriumError, Config, ItemCatalog, Label, Result};
pub use store::{
    AnnotationFile, ItemAnnotation, ItemStatus, PromptAndExamples, QAPair, StoreSession,
};
