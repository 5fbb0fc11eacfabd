//! Turn orchestration.
//!
//! One user turn walks the phases
//! `searching → composing → completing → validating → (regenerating?) → logging`.
//! The quota gate runs before any of them, server-side. Any phase error
//! degrades the turn to an apologetic assistant message with a retry
//! affordance; nothing in the pipeline is fatal to the process.
//!
//! Invariant: at most two logical completion calls per turn — one normal
//! and one if the validator forces a regeneration. The regenerated answer
//! is accepted unconditionally. Transport retries within each call are
//! governed by the [`RetryPolicy`], not counted here.

use anyhow::Result;
use sqlx::SqlitePool;
use std::time::Duration;

use crate::agent::AgentKind;
use crate::completion::{run_completion, CompletionProvider};
use crate::compose::{compose_prompt, trailing_history, ContextBlock};
use crate::config::Config;
use crate::ledger::{self, QuotaDecision};
use crate::models::{
    ChatMessage, CompletionRequest, MessageRole, TurnOutcome, TurnPhase, UsageStatus,
};
use crate::retry::RetryPolicy;
use crate::search::{run_search, SearchChain, SearchRequest};
use crate::validate::{needs_regeneration, regeneration_prompt, score_grounding};

/// Everything a turn needs injected. Providers are trait objects so
/// tests can substitute counting doubles.
pub struct PipelineDeps {
    pub pool: SqlitePool,
    pub search_chain: SearchChain,
    pub completion: Box<dyn CompletionProvider>,
    pub retry: RetryPolicy,
}

/// One turn's input, owned by the caller.
#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_id: String,
    pub agent: AgentKind,
    pub message: String,
    pub context: ContextBlock,
    pub history: Vec<ChatMessage>,
    /// Overrides the search request derived from `message` when set.
    pub search: Option<SearchRequest>,
}

impl TurnInput {
    pub fn new(user_id: impl Into<String>, agent: AgentKind, message: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            agent,
            message: message.into(),
            context: ContextBlock::default(),
            history: Vec::new(),
            search: None,
        }
    }
}

/// Result of one turn: either a (possibly degraded) outcome, or an
/// explicit quota block issued before any provider call.
#[derive(Debug)]
pub enum TurnResult {
    Completed(TurnOutcome),
    QuotaExceeded(QuotaDecision),
}

const APOLOGY: &str = "I ran into a problem answering that. Nothing was lost — \
                       please try again in a moment.";

/// Execute one user turn end to end.
///
/// Returns `Err` only when the quota gate itself cannot be evaluated
/// (ledger unreachable); every downstream failure degrades instead.
pub async fn run_turn(deps: &PipelineDeps, config: &Config, input: &TurnInput) -> Result<TurnResult> {
    let decision = ledger::check_quota(&deps.pool, &config.quota, &input.user_id).await?;
    if !decision.is_allowed() {
        return Ok(TurnResult::QuotaExceeded(decision));
    }

    match execute_phases(deps, config, input).await {
        Ok(outcome) => Ok(TurnResult::Completed(outcome)),
        Err((phase, err)) => Ok(TurnResult::Completed(degrade(deps, input, phase, err).await)),
    }
}

type PhaseError = (TurnPhase, anyhow::Error);

async fn execute_phases(
    deps: &PipelineDeps,
    config: &Config,
    input: &TurnInput,
) -> Result<TurnOutcome, PhaseError> {
    // searching
    let search_request = input
        .search
        .clone()
        .unwrap_or_else(|| SearchRequest::new(input.message.clone()));
    let search = run_search(
        &deps.search_chain,
        &deps.pool,
        &input.user_id,
        &search_request,
        &deps.retry,
    )
    .await
    .map_err(|e| (TurnPhase::Searching, e))?;

    // composing — pure, cannot fail
    let system_prompt = compose_prompt(
        input.agent,
        &input.context,
        Some(&search),
        &input.message,
        config.pipeline.snippet_max_chars,
    );

    // completing
    let settings = input.agent.model_settings();
    let mut messages: Vec<ChatMessage> =
        trailing_history(&input.history, config.pipeline.history_window).to_vec();
    messages.push(ChatMessage {
        role: MessageRole::User,
        content: input.message.clone(),
    });

    let request = CompletionRequest {
        system_prompt: system_prompt.clone(),
        messages: messages.clone(),
        model: settings.model.clone(),
        temperature: settings.temperature,
        max_tokens: settings.max_tokens,
    };
    let first = run_completion(deps.completion.as_ref(), &deps.retry, &request)
        .await
        .map_err(|e| (TurnPhase::Completing, e))?;

    // validating. The fallback path scores 0 without being a failure.
    let score = score_grounding(&search, &first.text);

    let mut regenerated = false;
    let mut final_completion = first.clone();
    let mut total_prompt_tokens = first.prompt_tokens;
    let mut total_completion_tokens = first.completion_tokens;
    let mut total_cost = first.cost_estimate;

    if needs_regeneration(&search, &score, config.validator.threshold) {
        // regenerating — exactly one forced attempt, accepted as-is.
        // A failed regeneration keeps the original answer rather than
        // degrading the whole turn.
        let regen_request = CompletionRequest {
            system_prompt: regeneration_prompt(&system_prompt, &score),
            messages,
            model: settings.model,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        };
        if let Ok(second) =
            run_completion(deps.completion.as_ref(), &RetryPolicy::once(), &regen_request).await
        {
            total_prompt_tokens += second.prompt_tokens;
            total_completion_tokens += second.completion_tokens;
            total_cost += second.cost_estimate;
            final_completion = second;
            regenerated = true;
        }
    }

    // logging
    let metadata = serde_json::json!({
        "agent": input.agent.as_str(),
        "search_engine": search.engine.as_str(),
        "validation_score": score.score,
        "regenerated": regenerated,
    });
    let entry = ledger::new_entry(
        &input.user_id,
        "chat_turn",
        total_prompt_tokens,
        total_completion_tokens,
        total_cost,
        UsageStatus::Success,
        metadata.to_string(),
    );
    ledger::append_usage(&deps.pool, &entry)
        .await
        .map_err(|e| (TurnPhase::Logging, e))?;

    Ok(TurnOutcome {
        response: final_completion.text,
        tokens_used: total_prompt_tokens + total_completion_tokens,
        cost: total_cost,
        model: final_completion.model,
        regenerated,
        search_engine: Some(search.engine),
        degraded: false,
        can_retry: false,
        failed_phase: None,
    })
}

/// Convert a phase failure into the apologetic outcome, recording an
/// error row in the ledger so failed turns still count.
async fn degrade(
    deps: &PipelineDeps,
    input: &TurnInput,
    phase: TurnPhase,
    err: anyhow::Error,
) -> TurnOutcome {
    let metadata = serde_json::json!({
        "agent": input.agent.as_str(),
        "failed_phase": phase,
        "error": err.to_string(),
    });
    let entry = ledger::new_entry(
        &input.user_id,
        "chat_turn",
        0,
        0,
        0.0,
        UsageStatus::Degraded,
        metadata.to_string(),
    );
    // The turn is already degraded; a failed error-row write changes nothing
    // the caller can act on.
    if let Err(log_err) = ledger::append_usage(&deps.pool, &entry).await {
        eprintln!("usage log write failed during degraded turn: {log_err}");
    }

    TurnOutcome {
        response: APOLOGY.to_string(),
        tokens_used: 0,
        cost: 0.0,
        model: String::new(),
        regenerated: false,
        search_engine: None,
        degraded: true,
        can_retry: true,
        failed_phase: Some(phase),
    }
}

/// Collaboration mode: each agent answers the same message in sequence,
/// with a fixed delay between invocations. Latency grows linearly with
/// agent count by design — there is no concurrent fan-out.
pub async fn run_collaboration(
    deps: &PipelineDeps,
    config: &Config,
    base: &TurnInput,
    agents: &[AgentKind],
) -> Result<Vec<(AgentKind, TurnResult)>> {
    let mut results = Vec::with_capacity(agents.len());
    for (i, agent) in agents.iter().enumerate() {
        if i > 0 && config.pipeline.agent_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(config.pipeline.agent_delay_ms)).await;
        }
        let input = TurnInput {
            agent: *agent,
            ..base.clone()
        };
        let result = run_turn(deps, config, &input).await?;
        results.push((*agent, result));
    }
    Ok(results)
}
