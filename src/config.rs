use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Search provider chain settings. The primary provider is tried first,
/// then the secondary, then the static fallback answer.
#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_primary_base_url")]
    pub primary_base_url: String,
    #[serde(default = "default_primary_model")]
    pub primary_model: String,
    #[serde(default = "default_secondary_base_url")]
    pub secondary_base_url: String,
    #[serde(default = "default_secondary_model")]
    pub secondary_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            primary_base_url: default_primary_base_url(),
            primary_model: default_primary_model(),
            secondary_base_url: default_secondary_base_url(),
            secondary_model: default_secondary_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_primary_base_url() -> String {
    "https://api.perplexity.ai".to_string()
}
fn default_primary_model() -> String {
    "sonar".to_string()
}
fn default_secondary_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_secondary_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_secondary_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_secondary_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Acceptance threshold for the response validator.
///
/// A completion scoring below `threshold` triggers exactly one
/// regeneration. The 50/100 default is an empirical choice, kept
/// configurable rather than fixed.
#[derive(Debug, Deserialize, Clone)]
pub struct ValidatorConfig {
    #[serde(default = "default_threshold")]
    pub threshold: u8,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

fn default_threshold() -> u8 {
    50
}

/// Dollar-denominated spend limits enforced server-side before any
/// provider call is made.
#[derive(Debug, Deserialize, Clone)]
pub struct QuotaConfig {
    #[serde(default = "default_daily_limit")]
    pub daily_limit_usd: f64,
    #[serde(default = "default_monthly_limit")]
    pub monthly_limit_usd: f64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit_usd: default_daily_limit(),
            monthly_limit_usd: default_monthly_limit(),
        }
    }
}

fn default_daily_limit() -> f64 {
    5.0
}
fn default_monthly_limit() -> f64 {
    50.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Trailing conversation messages included in each completion request.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// Knowledge snippets are truncated to this many characters before
    /// composition.
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
    /// Delay between agents in collaboration mode.
    #[serde(default = "default_agent_delay_ms")]
    pub agent_delay_ms: u64,
    /// Manual retries offered to the caller after a degraded turn.
    #[serde(default = "default_max_manual_retries")]
    pub max_manual_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            snippet_max_chars: default_snippet_max_chars(),
            agent_delay_ms: default_agent_delay_ms(),
            max_manual_retries: default_max_manual_retries(),
        }
    }
}

fn default_history_window() -> usize {
    8
}
fn default_snippet_max_chars() -> usize {
    900
}
fn default_agent_delay_ms() -> u64 {
    2000
}
fn default_max_manual_retries() -> u32 {
    3
}

/// Shared retry settings applied to both the search and completion
/// adapters.
#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}
fn default_jitter() -> bool {
    true
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.validator.threshold > 100 {
        anyhow::bail!("validator.threshold must be in [0, 100]");
    }

    if config.quota.daily_limit_usd <= 0.0 || config.quota.monthly_limit_usd <= 0.0 {
        anyhow::bail!("quota limits must be > 0");
    }

    if config.quota.daily_limit_usd > config.quota.monthly_limit_usd {
        anyhow::bail!("quota.daily_limit_usd must not exceed quota.monthly_limit_usd");
    }

    if config.pipeline.history_window == 0 {
        anyhow::bail!("pipeline.history_window must be > 0");
    }

    if config.pipeline.snippet_max_chars == 0 {
        anyhow::bail!("pipeline.snippet_max_chars must be > 0");
    }

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(body.as_bytes()).unwrap();
        f
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let f = write_config(
            r#"
[db]
path = "/tmp/mentor.sqlite"

[server]
bind = "127.0.0.1:7440"
"#,
        );
        let config = load_config(f.path()).unwrap();
        assert_eq!(config.validator.threshold, 50);
        assert_eq!(config.quota.daily_limit_usd, 5.0);
        assert_eq!(config.pipeline.history_window, 8);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn rejects_threshold_above_100() {
        let f = write_config(
            r#"
[db]
path = "/tmp/mentor.sqlite"

[validator]
threshold = 150

[server]
bind = "127.0.0.1:7440"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }

    #[test]
    fn rejects_daily_limit_above_monthly() {
        let f = write_config(
            r#"
[db]
path = "/tmp/mentor.sqlite"

[quota]
daily_limit_usd = 100.0
monthly_limit_usd = 50.0

[server]
bind = "127.0.0.1:7440"
"#,
        );
        assert!(load_config(f.path()).is_err());
    }
}
