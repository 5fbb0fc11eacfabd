//! Usage/cost ledger and quota gate.
//!
//! One row is appended per completion call, success or failure. Rows are
//! never updated or deleted; the daily and monthly aggregations the
//! quota gate reads are plain sums over this append-only log.
//!
//! The gate runs inside the pipeline, before any provider call — there
//! is no client-side pre-check to bypass.

use anyhow::Result;
use chrono::{Datelike, TimeZone, Timelike, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::config::QuotaConfig;
use crate::models::{UsageLogEntry, UsageStatus};

/// Append one usage row. The only write this module performs.
pub async fn append_usage(pool: &SqlitePool, entry: &UsageLogEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO usage_log
            (id, user_id, function_name, prompt_tokens, completion_tokens, cost_usd, status, metadata_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.user_id)
    .bind(&entry.function_name)
    .bind(entry.prompt_tokens)
    .bind(entry.completion_tokens)
    .bind(entry.cost_usd)
    .bind(entry.status.as_str())
    .bind(&entry.metadata_json)
    .bind(entry.created_at.timestamp())
    .execute(pool)
    .await?;
    Ok(())
}

/// Convenience constructor filling in id and timestamp.
pub fn new_entry(
    user_id: &str,
    function_name: &str,
    prompt_tokens: u32,
    completion_tokens: u32,
    cost_usd: f64,
    status: UsageStatus,
    metadata_json: String,
) -> UsageLogEntry {
    UsageLogEntry {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        function_name: function_name.to_string(),
        prompt_tokens,
        completion_tokens,
        cost_usd,
        status,
        metadata_json,
        created_at: Utc::now(),
    }
}

/// Spend sums for one user.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UsageSummary {
    pub user_id: String,
    pub today_usd: f64,
    pub month_usd: f64,
    pub total_usd: f64,
    pub request_count: i64,
}

/// Dollar cost summed since midnight UTC.
pub async fn cost_today(pool: &SqlitePool, user_id: &str) -> Result<f64> {
    let now = Utc::now();
    let midnight = now.timestamp() - i64::from(now.time().num_seconds_from_midnight());
    sum_since(pool, user_id, midnight).await
}

/// Dollar cost summed since the first of the current month, UTC.
pub async fn cost_this_month(pool: &SqlitePool, user_id: &str) -> Result<f64> {
    let now = Utc::now();
    let month_start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .ok_or_else(|| anyhow::anyhow!("could not compute start of month"))?
        .timestamp();
    sum_since(pool, user_id, month_start).await
}

async fn sum_since(pool: &SqlitePool, user_id: &str, since: i64) -> Result<f64> {
    let sum: Option<f64> = sqlx::query_scalar(
        "SELECT SUM(cost_usd) FROM usage_log WHERE user_id = ? AND created_at >= ?",
    )
    .bind(user_id)
    .bind(since)
    .fetch_one(pool)
    .await?;
    Ok(sum.unwrap_or(0.0))
}

/// Full per-user summary for the usage endpoint and CLI.
pub async fn usage_summary(pool: &SqlitePool, user_id: &str) -> Result<UsageSummary> {
    let today_usd = cost_today(pool, user_id).await?;
    let month_usd = cost_this_month(pool, user_id).await?;

    let total_usd: Option<f64> =
        sqlx::query_scalar("SELECT SUM(cost_usd) FROM usage_log WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;
    let request_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM usage_log WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    Ok(UsageSummary {
        user_id: user_id.to_string(),
        today_usd,
        month_usd,
        total_usd: total_usd.unwrap_or(0.0),
        request_count,
    })
}

/// Outcome of the pre-flight quota check.
#[derive(Debug, Clone, PartialEq)]
pub enum QuotaDecision {
    Allowed,
    DailyExceeded { used_usd: f64, limit_usd: f64 },
    MonthlyExceeded { used_usd: f64, limit_usd: f64 },
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Check both spend windows. Must be consulted before any provider call.
pub async fn check_quota(
    pool: &SqlitePool,
    quota: &QuotaConfig,
    user_id: &str,
) -> Result<QuotaDecision> {
    let today = cost_today(pool, user_id).await?;
    if today >= quota.daily_limit_usd {
        return Ok(QuotaDecision::DailyExceeded {
            used_usd: today,
            limit_usd: quota.daily_limit_usd,
        });
    }

    let month = cost_this_month(pool, user_id).await?;
    if month >= quota.monthly_limit_usd {
        return Ok(QuotaDecision::MonthlyExceeded {
            used_usd: month,
            limit_usd: quota.monthly_limit_usd,
        });
    }

    Ok(QuotaDecision::Allowed)
}
