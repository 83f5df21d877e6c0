//! Arbiter clients.

mod arbiter;
mod gpt;
mod pricing;

pub use arbiter::*;
pub use gpt::*;
pub use pricing::*;
