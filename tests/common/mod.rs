//! Shared test fixtures: tempfile-backed databases and provider doubles.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use sqlx::SqlitePool;
use tempfile::TempDir;

use mentor_harness::completion::{CompletionProvider, RawCompletion};
use mentor_harness::config::{load_config, Config};
use mentor_harness::models::CompletionRequest;
use mentor_harness::retry::ProviderError;
use mentor_harness::search::{ProviderAnswer, SearchProvider, SearchRequest};
use mentor_harness::{db, migrate};

/// Write a config into a temp dir, migrate, and open the pool.
/// Retry delays are zeroed and the collaboration delay disabled so tests
/// run fast.
pub async fn setup() -> (TempDir, Config, SqlitePool) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    let config_content = format!(
        r#"[db]
path = "{}/mentor.sqlite"

[pipeline]
agent_delay_ms = 0

[retry]
max_attempts = 3
base_delay_ms = 0
jitter = false

[server]
bind = "127.0.0.1:0"
"#,
        root.display()
    );
    let config_path = root.join("mentor.toml");
    fs::write(&config_path, config_content).unwrap();

    let config = load_config(&config_path).unwrap();
    migrate::run_migrations(&config).await.unwrap();
    let pool = db::connect(&config).await.unwrap();

    (tmp, config, pool)
}

/// Search double returning a fixed answer.
pub struct CannedSearch {
    pub content: String,
    pub sources: Vec<String>,
}

impl CannedSearch {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            sources: vec!["https://news.example.com/item".to_string()],
        }
    }
}

#[async_trait]
impl SearchProvider for CannedSearch {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn search(&self, _request: &SearchRequest) -> Result<ProviderAnswer, ProviderError> {
        Ok(ProviderAnswer {
            content: self.content.clone(),
            sources: self.sources.clone(),
            confidence: 0.9,
        })
    }
}

/// Search double that always fails permanently.
pub struct FailingSearch;

#[async_trait]
impl SearchProvider for FailingSearch {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn search(&self, _request: &SearchRequest) -> Result<ProviderAnswer, ProviderError> {
        Err(ProviderError::permanent(anyhow!("provider unavailable")))
    }
}

/// Completion double that replays scripted responses in order, counting
/// every invocation. The last response repeats if the script runs out.
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<String>>,
    calls: Arc<AtomicU32>,
    fail: bool,
}

impl ScriptedCompletion {
    pub fn new(responses: &[&str]) -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
                calls: calls.clone(),
                fail: false,
            },
            calls,
        )
    }

    pub fn failing() -> (Self, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        (
            Self {
                responses: Mutex::new(VecDeque::new()),
                calls: calls.clone(),
                fail: true,
            },
            calls,
        )
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn complete(&self, _request: &CompletionRequest) -> Result<RawCompletion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ProviderError::permanent(anyhow!("completion unavailable")));
        }

        let mut responses = self.responses.lock().unwrap();
        let text = if responses.len() > 1 {
            responses.pop_front().unwrap()
        } else {
            responses
                .front()
                .cloned()
                .unwrap_or_else(|| "scripted response".to_string())
        };

        Ok(RawCompletion {
            text,
            prompt_tokens: 100,
            completion_tokens: 50,
        })
    }
}
