//! Error types for arbitrium.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (missing files, rejected submissions)
//! - I^B materialized: Infrastructure failures (network, API)
//! - K_i violated: Internal invariant violations (bugs)

use thiserror::Error;

/// Top-level error type for arbitrium.
#[derive(Debug, Error)]
pub enum ArbitriumError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED — Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// The submitted item is no longer the active selection. Nothing was
    /// mutated; the caller raced a pool change and should re-select.
    #[error("Stale selection: submitted {submitted}, active pick is {current:?}")]
    StaleSelection {
        submitted: String,
        current: Option<String>,
    },

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED — Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    #[error("Arbiter error: {0}")]
    Arbiter(#[from] crate::client::ArbiterError),

    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED — Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArbitriumError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// True for the rejected-submission case, which callers report
    /// distinctly from success rather than treating as fatal.
    pub fn is_stale_selection(&self) -> bool {
        matches!(self, Self::StaleSelection { .. })
    }
}

/// Result type alias for arbitrium.
pub type Result<T> = std::result::Result<T, ArbitriumError>;
