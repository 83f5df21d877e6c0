//! The arbiter capability.
//!
//! Epistemic foundation:
//! - K_i: A judge call yields a probability of "Yes" in [0, 1]
//! - B_i: Every call may fail → Result
//! - I^B: Retry and backoff are this collaborator's job, never the core's

use crate::models::Label;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors from an arbiter implementation.
#[derive(Debug, Error)]
pub enum ArbiterError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Neither answer token appeared among the top logprobs.
    #[error("No Yes/No token in top logprobs for model {model}")]
    NoVerdictToken { model: String },

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

/// Streamed rationale receiver: one callback, tagged by hypothesis.
pub type RationaleSink<'a> = &'a mut (dyn FnMut(Label, &str) + Send);

/// An automated judge producing a yes-probability per item.
#[async_trait]
pub trait Arbiter: Send + Sync {
    /// Score a prompt with the probability of "Yes".
    ///
    /// `max_tokens` can be larger if you want to debug by knowing what it
    /// wants to say.
    async fn judge(&self, model: &str, prompt: &str, max_tokens: u32)
        -> Result<f64, ArbiterError>;

    /// Stream a short rationale for each hypothesis ("No" and "Yes") to the
    /// sink, as if the model had committed to that answer.
    async fn interrogate(
        &self,
        model: &str,
        prompt: &str,
        question: &str,
        max_tokens: u32,
        sink: RationaleSink<'_>,
    ) -> Result<(), ArbiterError>;

    /// Total cost incurred so far in USD.
    fn running_cost(&self) -> f64;

    /// Cost of the most recent judge call in USD.
    fn cost_per_item(&self) -> f64;
}

/// Cost-free stand-in arbiter for dry runs: sleeps briefly and answers with
/// a uniform random probability.
pub struct DummyArbiter;

#[async_trait]
impl Arbiter for DummyArbiter {
    async fn judge(
        &self,
        _model: &str,
        _prompt: &str,
        _max_tokens: u32,
    ) -> Result<f64, ArbiterError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Ok(rand::random::<f64>())
    }

    async fn interrogate(
        &self,
        _model: &str,
        _prompt: &str,
        _question: &str,
        _max_tokens: u32,
        sink: RationaleSink<'_>,
    ) -> Result<(), ArbiterError> {
        sink(Label::No, "A dummy arbiter has no reasons.");
        sink(Label::Yes, "A dummy arbiter has no reasons.");
        Ok(())
    }

    fn running_cost(&self) -> f64 {
        0.0
    }

    fn cost_per_item(&self) -> f64 {
        0.0
    }
}
