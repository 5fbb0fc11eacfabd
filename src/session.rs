//! Conversation sessions.
//!
//! A session ties a user to an agent persona and an opaque JSON config
//! blob, and owns an ordered message history. Conversation state lives
//! here rather than in ambient memory: the pipeline receives history
//! loaded from these tables and writes the turn's messages back.

use anyhow::{bail, Result};
use chrono::Utc;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::agent::AgentKind;
use crate::models::{ChatMessage, MessageRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Archived,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
            SessionStatus::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<SessionStatus> {
        match s {
            "active" => Some(SessionStatus::Active),
            "completed" => Some(SessionStatus::Completed),
            "archived" => Some(SessionStatus::Archived),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub agent_kind: AgentKind,
    pub config_json: String,
    pub status: SessionStatus,
}

/// Create a new active session and return it.
pub async fn create_session(
    pool: &SqlitePool,
    user_id: &str,
    agent: AgentKind,
    config_json: &str,
) -> Result<Session> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().timestamp();

    sqlx::query(
        "INSERT INTO sessions (id, user_id, agent_kind, config_json, status, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 'active', ?, ?)",
    )
    .bind(&id)
    .bind(user_id)
    .bind(agent.as_str())
    .bind(config_json)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(Session {
        id,
        user_id: user_id.to_string(),
        agent_kind: agent,
        config_json: config_json.to_string(),
        status: SessionStatus::Active,
    })
}

pub async fn get_session(pool: &SqlitePool, session_id: &str) -> Result<Session> {
    let row = sqlx::query(
        "SELECT id, user_id, agent_kind, config_json, status FROM sessions WHERE id = ?",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        bail!("session not found: {}", session_id);
    };

    let agent_str: String = row.get("agent_kind");
    let status_str: String = row.get("status");

    let agent_kind = AgentKind::parse(&agent_str)
        .ok_or_else(|| anyhow::anyhow!("unknown agent kind in session row: {}", agent_str))?;
    let status = SessionStatus::parse(&status_str)
        .ok_or_else(|| anyhow::anyhow!("unknown session status: {}", status_str))?;

    Ok(Session {
        id: row.get("id"),
        user_id: row.get("user_id"),
        agent_kind,
        config_json: row.get("config_json"),
        status,
    })
}

/// Move a session to a new status. Archived sessions stay archived.
pub async fn set_status(pool: &SqlitePool, session_id: &str, status: SessionStatus) -> Result<()> {
    let current = get_session(pool, session_id).await?;
    if current.status == SessionStatus::Archived && status != SessionStatus::Archived {
        bail!("archived sessions cannot be reopened");
    }

    sqlx::query("UPDATE sessions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now().timestamp())
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Append one message to a session's history, assigning the next seq.
/// The seq is computed inside the INSERT so concurrent appends cannot
/// collide on `UNIQUE(session_id, seq)`.
pub async fn append_message(
    pool: &SqlitePool,
    session_id: &str,
    role: MessageRole,
    content: &str,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO session_messages (id, session_id, seq, role, content, created_at) \
         SELECT ?, ?, COALESCE(MAX(seq) + 1, 0), ?, ?, ? \
         FROM session_messages WHERE session_id = ?",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(session_id)
    .bind(role.as_str())
    .bind(content)
    .bind(Utc::now().timestamp())
    .bind(session_id)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE sessions SET updated_at = ? WHERE id = ?")
        .bind(Utc::now().timestamp())
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Load a session's full message history in order.
pub async fn load_history(pool: &SqlitePool, session_id: &str) -> Result<Vec<ChatMessage>> {
    let rows = sqlx::query(
        "SELECT role, content FROM session_messages WHERE session_id = ? ORDER BY seq ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;

    let mut history = Vec::with_capacity(rows.len());
    for row in rows {
        let role_str: String = row.get("role");
        let role = match role_str.as_str() {
            "system" => MessageRole::System,
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            other => bail!("unknown message role in history: {}", other),
        };
        history.push(ChatMessage {
            role,
            content: row.get("content"),
        });
    }
    Ok(history)
}
