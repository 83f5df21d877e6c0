//! Store module - annotation records, persistence, and the example pool.
//!
//! Provides:
//! - `ItemStatus` / `ItemAnnotation`: how fresh each judge verdict is
//! - `AnnotationFile` / `StoreSession`: scoped load/flush of annotations
//! - `PromptAndExamples`: the few-shot example pool and prompt rendering

mod annotation;
mod persistent;
mod pool;

pub use annotation::*;
pub use persistent::*;
pub use pool::*;
