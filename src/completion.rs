//! Completion provider adapter.
//!
//! Sends the composed prompt plus trailing conversation history to an
//! OpenAI-style chat-completions endpoint and returns the text with the
//! provider-reported token usage. Cost is computed from the static price
//! table below.
//!
//! The price table is maintained by hand against published provider
//! pricing. A stale entry silently under- or over-counts spend — there
//! is no automatic reconciliation against billing.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::CompletionConfig;
use crate::models::{CompletionOutcome, CompletionRequest};
use crate::retry::{ProviderError, RetryPolicy};

/// Token usage as reported by the provider.
#[derive(Debug, Clone)]
pub struct RawCompletion {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// A chat-completion backend. Implementations must not retry internally;
/// callers wrap invocations in the shared [`RetryPolicy`].
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion, ProviderError>;
}

/// USD per 1K tokens: (model, prompt rate, completion rate).
///
/// Updated manually when provider pricing changes.
const PRICE_PER_1K: [(&str, f64, f64); 4] = [
    ("gpt-4o", 0.0025, 0.010),
    ("gpt-4o-mini", 0.00015, 0.0006),
    ("gpt-4-turbo", 0.010, 0.030),
    ("sonar", 0.001, 0.001),
];

/// Dollar cost for a call, from the static price table. Unknown models
/// cost 0.0 — an unpriced model is a table maintenance miss, not a
/// request failure.
pub fn estimate_cost(model: &str, prompt_tokens: u32, completion_tokens: u32) -> f64 {
    for (name, prompt_rate, completion_rate) in PRICE_PER_1K {
        if name == model {
            return (prompt_tokens as f64 / 1000.0) * prompt_rate
                + (completion_tokens as f64 / 1000.0) * completion_rate;
        }
    }
    0.0
}

/// Invoke `provider` under the retry policy and attach the cost estimate.
pub async fn run_completion(
    provider: &dyn CompletionProvider,
    retry: &RetryPolicy,
    request: &CompletionRequest,
) -> Result<CompletionOutcome> {
    let raw = retry.run(|| provider.complete(request)).await?;
    let cost_estimate = estimate_cost(&request.model, raw.prompt_tokens, raw.completion_tokens);
    Ok(CompletionOutcome {
        text: raw.text,
        prompt_tokens: raw.prompt_tokens,
        completion_tokens: raw.completion_tokens,
        cost_estimate,
        model: request.model.clone(),
    })
}

/// OpenAI-style chat-completions adapter over HTTP.
pub struct OpenAiCompletion {
    base_url: String,
    timeout: Duration,
}

impl OpenAiCompletion {
    pub fn from_config(config: &CompletionConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletion {
    fn name(&self) -> &'static str {
        "openai_chat"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<RawCompletion, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::permanent(anyhow!("OPENAI_API_KEY not set")))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::permanent(e.into()))?;

        let mut messages = vec![json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        for message in &request.messages {
            messages.push(json!({
                "role": message.role.as_str(),
                "content": message.content,
            }));
        }

        let body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(e.into()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::transient(anyhow!(
                "completion error {}: {}",
                status,
                body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::permanent(anyhow!(
                "completion error {}: {}",
                status,
                body
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::permanent(e.into()))?;

        let text = json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                ProviderError::permanent(anyhow!("completion response missing content"))
            })?
            .to_string();

        let prompt_tokens = json["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32;
        let completion_tokens = json["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32;

        Ok(RawCompletion {
            text,
            prompt_tokens,
            completion_tokens,
        })
    }
}
