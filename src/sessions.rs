//! Chat sessions and message history.
//!
//! A session belongs to one user and accumulates messages from two
//! senders, `user` and `bot`. Token accounting is split: the user message
//! records the input tokens of the turn, the bot message the output
//! tokens, and the session keeps a running total.

use anyhow::{bail, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use crate::models::Resolution;
use crate::pipeline::Pipeline;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct SessionSummary {
    pub id: i64,
    pub created_at: String,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Message {
    pub sender: String,
    pub text: String,
    pub tokens_used: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionHistory {
    pub messages: Vec<Message>,
    pub total_tokens: i64,
}

pub async fn create_session(pool: &SqlitePool, user_id: i64) -> Result<i64> {
    let result = sqlx::query("INSERT INTO sessions (user_id) VALUES (?)")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

pub async fn sessions_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<SessionSummary>> {
    let sessions = sqlx::query_as(
        "SELECT id, created_at, total_tokens FROM sessions \
         WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(sessions)
}

pub async fn session_history(pool: &SqlitePool, session_id: i64) -> Result<SessionHistory> {
    let messages: Vec<Message> = sqlx::query_as(
        "SELECT sender, text, tokens_used FROM messages \
         WHERE session_id = ? ORDER BY created_at ASC, id ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    let total_tokens: Option<i64> =
        sqlx::query_scalar("SELECT total_tokens FROM sessions WHERE id = ?")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;
    Ok(SessionHistory {
        messages,
        total_tokens: total_tokens.unwrap_or(0),
    })
}

pub async fn add_message(
    pool: &SqlitePool,
    session_id: i64,
    sender: &str,
    text: &str,
    tokens_used: i64,
) -> Result<()> {
    sqlx::query("INSERT INTO messages (session_id, sender, text, tokens_used) VALUES (?, ?, ?, ?)")
        .bind(session_id)
        .bind(sender)
        .bind(text)
        .bind(tokens_used)
        .execute(pool)
        .await?;
    sqlx::query("UPDATE sessions SET total_tokens = total_tokens + ? WHERE id = ?")
        .bind(tokens_used)
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a session and its messages, but only for its owner.
pub async fn delete_session(pool: &SqlitePool, session_id: i64, user_id: i64) -> Result<()> {
    let owner: Option<i64> = sqlx::query_scalar("SELECT user_id FROM sessions WHERE id = ?")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    match owner {
        Some(owner) if owner == user_id => {}
        _ => bail!("session not found or unauthorized"),
    }
    sqlx::query("DELETE FROM messages WHERE session_id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM sessions WHERE id = ?")
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run one conversational turn: prepend the stored history as context,
/// resolve the question, then persist both sides of the exchange.
pub async fn handle_message(
    pool: &SqlitePool,
    pipeline: &Pipeline,
    session_id: i64,
    question: &str,
) -> Result<Resolution> {
    let history = session_history(pool, session_id).await?;
    let context: Vec<String> = history
        .messages
        .iter()
        .map(|m| format!("{}: {}", m.sender, m.text))
        .collect();
    let full_question = if context.is_empty() {
        question.to_string()
    } else {
        format!("{}\nuser: {question}", context.join("\n"))
    };

    let resolution = pipeline.resolve(&full_question).await?;

    add_message(
        pool,
        session_id,
        "user",
        question,
        resolution.token_usage.input as i64,
    )
    .await?;
    add_message(
        pool,
        session_id,
        "bot",
        &resolution.answer,
        resolution.token_usage.output as i64,
    )
    .await?;

    Ok(resolution)
}
