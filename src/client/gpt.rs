//! GPT-backed arbiter over any OpenAI-compatible chat completions endpoint.
//!
//! Epistemic foundation:
//! - K_i: The yes-probability is read off the first token's top logprobs
//! - B_i: API will respond within timeout (might fail)
//! - B_i: Response will be valid JSON (might fail)
//! - I^B: Network availability unknowable → retry with backoff

use crate::client::{pricing_for, Arbiter, ArbiterError, RationaleSink};
use crate::models::{Label, NO_OR_YES};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Message in a chat completion request.
#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

impl Message {
    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Chat completion request payload.
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    logprobs: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_logprobs: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    logprobs: Option<ChoiceLogprobs>,
}

#[derive(Debug, Deserialize)]
struct ChoiceLogprobs {
    content: Option<Vec<TokenLogprobs>>,
}

#[derive(Debug, Deserialize)]
struct TokenLogprobs {
    top_logprobs: Vec<TopLogprob>,
}

#[derive(Debug, Deserialize)]
struct TopLogprob {
    token: String,
    logprob: f64,
}

/// Token usage reported by the API.
#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
    #[serde(default)]
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Clone, Deserialize)]
struct PromptTokensDetails {
    #[serde(default)]
    cached_tokens: Option<u32>,
}

/// One server-sent chunk of a streamed completion.
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

/// API error response (OpenAI-compatible).
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Arbiter backed by an OpenAI-compatible chat completions endpoint.
///
/// Judge calls request token logprobs at temperature 0 and convert the
/// relative mass of the "Yes"/"No" tokens into a probability. Interrogation
/// replays the prompt with the answer pinned to each hypothesis and streams
/// the model's explanation.
pub struct GptArbiter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    max_retries: u32,
    // Cost tracking, stored as microdollars for atomic ops
    running_cost_micros: AtomicU64,
    unit_cost_micros: AtomicU64,
}

impl GptArbiter {
    /// Create a new GPT arbiter.
    pub fn new(
        api_key: String,
        base_url: String,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self, ArbiterError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ArbiterError::Network)?;

        Ok(Self {
            client,
            base_url,
            api_key,
            timeout,
            max_retries,
            running_cost_micros: AtomicU64::new(0),
            unit_cost_micros: AtomicU64::new(0),
        })
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.api_key)) {
            headers.insert(AUTHORIZATION, value);
        }
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn record_cost(&self, model: &str, usage: Option<&Usage>) -> f64 {
        let Some(usage) = usage else { return 0.0 };
        let Some(pricing) = pricing_for(model) else {
            warn!(model = model, "No pricing for model, cost not tracked");
            return 0.0;
        };
        let cached = usage
            .prompt_tokens_details
            .as_ref()
            .and_then(|d| d.cached_tokens)
            .unwrap_or(0);
        let cost = pricing.estimate(usage.prompt_tokens, cached, usage.completion_tokens);
        self.running_cost_micros
            .fetch_add((cost * 1_000_000.0) as u64, Ordering::Relaxed);
        cost
    }

    /// POST a chat completion with retry on 429 and network errors.
    async fn post_chat(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, ArbiterError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut last_error: Option<ArbiterError> = None;

        for attempt in 0..self.max_retries {
            let response = match self
                .client
                .post(&url)
                .headers(self.headers())
                .json(request)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(if e.is_timeout() {
                        ArbiterError::Timeout(self.timeout)
                    } else {
                        ArbiterError::Network(e)
                    });
                    if attempt < self.max_retries - 1 {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        debug!(
                            attempt = attempt,
                            backoff_secs = backoff.as_secs(),
                            "Retrying after network error"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    continue;
                }
            };

            let status = response.status().as_u16();

            if status == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<f64>().ok())
                    .unwrap_or(1.0);
                last_error = Some(ArbiterError::Api {
                    status,
                    message: "rate limited".to_string(),
                });
                if attempt < self.max_retries - 1 {
                    debug!(retry_after_secs = retry_after, "Rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs_f64(retry_after)).await;
                }
                continue;
            }

            if !response.status().is_success() {
                let error_body = response.text().await.unwrap_or_default();
                let error = if status == 401 {
                    ArbiterError::AuthenticationFailed
                } else if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body)
                {
                    ArbiterError::Api {
                        status,
                        message: api_error.error.message,
                    }
                } else {
                    ArbiterError::Api {
                        status,
                        message: error_body,
                    }
                };

                // Auth errors never heal on retry
                if status == 401 {
                    return Err(error);
                }

                last_error = Some(error);
                if attempt < self.max_retries - 1 {
                    tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                }
                continue;
            }

            return response
                .json()
                .await
                .map_err(|e| ArbiterError::InvalidResponse(format!("Failed to parse: {e}")));
        }

        Err(last_error.unwrap_or_else(|| ArbiterError::MaxRetriesExceeded {
            attempts: self.max_retries,
            last_error: "Unknown error".to_string(),
        }))
    }

    /// Stream one hypothesis's rationale, forwarding content chunks.
    async fn stream_rationale(
        &self,
        model: &str,
        prompt: &str,
        question: &str,
        max_tokens: u32,
        label: Label,
        sink: &mut (dyn FnMut(Label, &str) + Send),
    ) -> Result<(), ArbiterError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![
                Message::user(prompt),
                Message::assistant(label.answer()),
                Message::user(question),
            ],
            max_tokens,
            temperature: 1.0,
            logprobs: None,
            top_logprobs: None,
            stream: Some(true),
            stream_options: Some(StreamOptions {
                include_usage: true,
            }),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(&request)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ArbiterError::Api { status, message });
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(ArbiterError::Network)?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));

            // SSE events are newline-delimited; hold back any partial line.
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim();
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                let chunk: StreamChunk = serde_json::from_str(data).map_err(|e| {
                    ArbiterError::InvalidResponse(format!("Bad stream chunk: {e}"))
                })?;
                // Usage arrives on the final, otherwise-empty chunk.
                self.record_cost(model, chunk.usage.as_ref());
                if let Some(content) = chunk
                    .choices
                    .first()
                    .and_then(|c| c.delta.content.as_deref())
                {
                    if !content.is_empty() {
                        sink(label, content);
                    }
                }
            }
        }

        Ok(())
    }
}

/// Convert the first token's top logprobs into P(Yes).
///
/// B_i falsified when neither answer token shows up: that is an arbiter
/// failure, not a 0.5.
fn yes_probability(model: &str, top_logprobs: &[TopLogprob]) -> Result<f64, ArbiterError> {
    let mut yes = 0.0;
    let mut no = 0.0;
    for top in top_logprobs {
        let prob = top.logprob.exp();
        if top.token == NO_OR_YES[1] {
            yes = prob;
        } else if top.token == NO_OR_YES[0] {
            no = prob;
        }
    }
    if yes + no == 0.0 {
        return Err(ArbiterError::NoVerdictToken {
            model: model.to_string(),
        });
    }
    Ok(yes / (yes + no))
}

#[async_trait]
impl Arbiter for GptArbiter {
    async fn judge(
        &self,
        model: &str,
        prompt: &str,
        max_tokens: u32,
    ) -> Result<f64, ArbiterError> {
        let request = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![Message::user(prompt)],
            max_tokens,
            temperature: 0.0, // should be inconsequential
            logprobs: Some(true),
            top_logprobs: Some(5),
            stream: None,
            stream_options: None,
        };

        let response = self.post_chat(&request).await?;
        let cost = self.record_cost(model, response.usage.as_ref());
        self.unit_cost_micros
            .store((cost * 1_000_000.0) as u64, Ordering::Relaxed);

        let top_logprobs = response
            .choices
            .first()
            .and_then(|c| c.logprobs.as_ref())
            .and_then(|lp| lp.content.as_ref())
            .and_then(|content| content.first())
            .map(|t| t.top_logprobs.as_slice())
            .ok_or_else(|| ArbiterError::InvalidResponse("No logprobs in response".to_string()))?;

        yes_probability(model, top_logprobs)
    }

    async fn interrogate(
        &self,
        model: &str,
        prompt: &str,
        question: &str,
        max_tokens: u32,
        sink: RationaleSink<'_>,
    ) -> Result<(), ArbiterError> {
        for label in [Label::No, Label::Yes] {
            self.stream_rationale(model, prompt, question, max_tokens, label, &mut *sink)
                .await?;
        }
        Ok(())
    }

    fn running_cost(&self) -> f64 {
        self.running_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }

    fn cost_per_item(&self) -> f64 {
        self.unit_cost_micros.load(Ordering::Relaxed) as f64 / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn top(token: &str, prob: f64) -> TopLogprob {
        TopLogprob {
            token: token.to_string(),
            logprob: prob.ln(),
        }
    }

    #[test]
    fn yes_probability_normalizes_over_both_tokens() {
        let tops = vec![top("Yes", 0.6), top("No", 0.2), top("Maybe", 0.1)];
        let p = yes_probability("m", &tops).unwrap();
        assert!((p - 0.75).abs() < 1e-9);
    }

    #[test]
    fn yes_probability_errors_without_verdict_tokens() {
        let tops = vec![top("Maybe", 0.9)];
        assert!(matches!(
            yes_probability("m", &tops),
            Err(ArbiterError::NoVerdictToken { .. })
        ));
    }

    #[test]
    fn stream_chunk_parses_delta_and_usage() {
        let data = r#"{"choices":[{"delta":{"content":"be"}}],"usage":null}"#;
        let chunk: StreamChunk = serde_json::from_str(data).unwrap();
        assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("be"));

        let last = r#"{"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#;
        let chunk: StreamChunk = serde_json::from_str(last).unwrap();
        assert!(chunk.choices.is_empty());
        assert_eq!(chunk.usage.unwrap().completion_tokens, 5);
    }
}
