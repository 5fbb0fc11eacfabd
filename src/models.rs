//! Core data types flowing through the orchestration pipeline.
//!
//! A user turn produces one [`SearchOutcome`], one or two
//! [`CompletionOutcome`]s (the second only when the validator forces a
//! regeneration), an ephemeral [`ValidationScore`], and exactly one
//! [`UsageLogEntry`] row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which engine in the fallback chain produced a search answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    Primary,
    Secondary,
    Fallback,
}

impl SearchEngine {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchEngine::Primary => "primary",
            SearchEngine::Secondary => "secondary",
            SearchEngine::Fallback => "fallback",
        }
    }
}

/// Result of the search provider chain. Produced once per user turn and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub content: String,
    pub sources: Vec<String>,
    /// Confidence in [0.0, 1.0]. Fixed at 0.5 on the static fallback path.
    pub confidence: f64,
    pub source_count: usize,
    pub engine: SearchEngine,
}

/// A single message in a conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// Request sent to a completion provider. Built fresh per call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// What the completion provider returned, with token usage and the cost
/// computed from the static per-model price table.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub text: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_estimate: f64,
    pub model: String,
}

/// Heuristic grounding score. Derived and ephemeral — never persisted,
/// only used to decide whether to regenerate.
#[derive(Debug, Clone)]
pub struct ValidationScore {
    /// 0..=100; fraction of extracted search facts echoed by the completion.
    pub score: u8,
    pub issues: Vec<String>,
}

/// One append-only row in the usage ledger.
#[derive(Debug, Clone, Serialize)]
pub struct UsageLogEntry {
    pub id: String,
    pub user_id: String,
    pub function_name: String,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
    pub status: UsageStatus,
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageStatus {
    /// The turn produced a real answer.
    Success,
    /// The turn fell back to the apologetic message after a phase failure.
    Degraded,
}

impl UsageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageStatus::Success => "success",
            UsageStatus::Degraded => "degraded",
        }
    }
}

/// Pipeline phase, used to report where a turn failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnPhase {
    Searching,
    Composing,
    Completing,
    Validating,
    Regenerating,
    Logging,
}

/// Final result of one user turn, success or degraded.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub response: String,
    pub tokens_used: u32,
    pub cost: f64,
    pub model: String,
    /// True when a regeneration was forced by the validator.
    pub regenerated: bool,
    pub search_engine: Option<SearchEngine>,
    /// Set when the turn degraded to an apologetic message.
    pub degraded: bool,
    pub can_retry: bool,
    pub failed_phase: Option<TurnPhase>,
}
