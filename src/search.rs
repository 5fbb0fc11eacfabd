//! Search provider adapter.
//!
//! Issues a web-search-style query through a chain of providers:
//! a Perplexity-style primary with live citations, an OpenAI-style
//! secondary answering from model knowledge, and a static templated
//! fallback that always succeeds. Every provider call writes one audit
//! row (provider name + success flag) to `search_audit`.
//!
//! The chain guarantees an outcome: `confidence` is always in [0, 1] and
//! `source_count >= 0`, even when both remote providers fail.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;
use std::time::Duration;
use uuid::Uuid;

use crate::config::SearchConfig;
use crate::models::{SearchEngine, SearchOutcome};
use crate::retry::{ProviderError, RetryPolicy};

/// One search request as assembled by the pipeline.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub company_name: Option<String>,
    pub industry: Option<String>,
    /// Recency filter understood by the primary provider, e.g. "month".
    pub timeframe: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            company_name: None,
            industry: None,
            timeframe: None,
        }
    }

    /// The query plus any company/industry hints, as fed to providers.
    fn hinted_query(&self) -> String {
        let mut q = self.query.clone();
        if let Some(company) = &self.company_name {
            q.push_str(&format!(" (company: {})", company));
        }
        if let Some(industry) = &self.industry {
            q.push_str(&format!(" (industry: {})", industry));
        }
        q
    }
}

/// Raw answer from a single provider, before chain bookkeeping.
#[derive(Debug, Clone)]
pub struct ProviderAnswer {
    pub content: String,
    pub sources: Vec<String>,
    pub confidence: f64,
}

/// A single search backend. Implementations must not retry internally;
/// the chain applies the shared [`RetryPolicy`] around each provider.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, request: &SearchRequest) -> Result<ProviderAnswer, ProviderError>;
}

/// The primary/secondary pair the pipeline walks through.
pub struct SearchChain {
    pub primary: Box<dyn SearchProvider>,
    pub secondary: Box<dyn SearchProvider>,
}

impl SearchChain {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            primary: Box::new(PerplexityProvider::new(config)),
            secondary: Box::new(AnalyticalProvider::new(config)),
        }
    }
}

/// Run the fallback chain: primary, then secondary, then the static
/// templated answer. Never fails on provider errors — only a failed
/// audit write propagates.
pub async fn run_search(
    chain: &SearchChain,
    pool: &SqlitePool,
    user_id: &str,
    request: &SearchRequest,
    retry: &RetryPolicy,
) -> Result<SearchOutcome> {
    for (provider, engine) in [
        (chain.primary.as_ref(), SearchEngine::Primary),
        (chain.secondary.as_ref(), SearchEngine::Secondary),
    ] {
        let answer = retry.run(|| provider.search(request)).await;
        let usable = matches!(&answer, Ok(a) if !a.content.trim().is_empty());
        write_audit(pool, user_id, provider.name(), &request.query, usable).await?;

        if let Ok(answer) = answer {
            if !answer.content.trim().is_empty() {
                let source_count = answer.sources.len();
                return Ok(SearchOutcome {
                    content: answer.content,
                    sources: answer.sources,
                    confidence: answer.confidence.clamp(0.0, 1.0),
                    source_count,
                    engine,
                });
            }
        }
    }

    write_audit(pool, user_id, "static_fallback", &request.query, true).await?;
    Ok(static_fallback(request))
}

/// Templated answer used when every remote provider fails. Confidence is
/// fixed at 0.5 with zero sources.
pub fn static_fallback(request: &SearchRequest) -> SearchOutcome {
    let content = format!(
        "Live research is currently unavailable for \"{}\". The guidance below \
         draws on general domain knowledge and may not reflect recent events.",
        request.query
    );
    SearchOutcome {
        content,
        sources: Vec::new(),
        confidence: 0.5,
        source_count: 0,
        engine: SearchEngine::Fallback,
    }
}

async fn write_audit(
    pool: &SqlitePool,
    user_id: &str,
    provider: &str,
    query: &str,
    success: bool,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO search_audit (id, user_id, provider, query, success, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(provider)
    .bind(query)
    .bind(success)
    .bind(chrono::Utc::now().timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

// ============ Perplexity-style primary ============

/// Primary provider: a Perplexity-style `/chat/completions` endpoint
/// that performs live web search and returns citations.
pub struct PerplexityProvider {
    base_url: String,
    model: String,
    timeout: Duration,
}

impl PerplexityProvider {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            base_url: config.primary_base_url.clone(),
            model: config.primary_model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl SearchProvider for PerplexityProvider {
    fn name(&self) -> &'static str {
        "perplexity"
    }

    async fn search(&self, request: &SearchRequest) -> Result<ProviderAnswer, ProviderError> {
        let api_key = std::env::var("PERPLEXITY_API_KEY")
            .map_err(|_| ProviderError::permanent(anyhow!("PERPLEXITY_API_KEY not set")))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::permanent(e.into()))?;

        let mut body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a research assistant. Answer with specific, recent facts: \
                                names, figures, dates. Be concise."
                },
                { "role": "user", "content": request.hinted_query() }
            ],
        });
        if let Some(timeframe) = &request.timeframe {
            body["search_recency_filter"] = json!(timeframe);
        }

        let response = client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(e.into()))?;

        let json = check_and_parse(self.name(), response).await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        let sources: Vec<String> = json["citations"]
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        let confidence = if sources.is_empty() { 0.7 } else { 0.9 };
        Ok(ProviderAnswer {
            content,
            sources,
            confidence,
        })
    }
}

// ============ OpenAI-style secondary ============

/// Secondary provider: an OpenAI-style chat endpoint asked to give an
/// analytical overview from model knowledge. No live sources, so the
/// answer is paraphrased as analysis rather than research.
pub struct AnalyticalProvider {
    base_url: String,
    model: String,
    timeout: Duration,
}

impl AnalyticalProvider {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            base_url: config.secondary_base_url.clone(),
            model: config.secondary_model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl SearchProvider for AnalyticalProvider {
    fn name(&self) -> &'static str {
        "openai_analytical"
    }

    async fn search(&self, request: &SearchRequest) -> Result<ProviderAnswer, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::permanent(anyhow!("OPENAI_API_KEY not set")))?;

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProviderError::permanent(e.into()))?;

        let prompt = format!(
            "Provide an analytical overview of the following topic from your \
             existing knowledge. Note clearly that live data was unavailable. \
             Topic: {}",
            request.hinted_query()
        );
        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": 0.3,
        });

        let response = client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transient(e.into()))?;

        let json = check_and_parse(self.name(), response).await?;

        let content = json["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();

        Ok(ProviderAnswer {
            content,
            sources: Vec::new(),
            confidence: 0.7,
        })
    }
}

/// Shared HTTP status handling: 429/5xx are transient, other non-2xx are
/// permanent, and body parse failures are permanent.
async fn check_and_parse(
    provider: &str,
    response: reqwest::Response,
) -> Result<serde_json::Value, ProviderError> {
    let status = response.status();
    if status.as_u16() == 429 || status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::transient(anyhow!(
            "{} error {}: {}",
            provider,
            status,
            body
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::permanent(anyhow!(
            "{} error {}: {}",
            provider,
            status,
            body
        )));
    }
    response
        .json()
        .await
        .map_err(|e| ProviderError::permanent(e.into()))
}
