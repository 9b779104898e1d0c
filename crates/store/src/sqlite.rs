//! SQLite run store.
//!
//! Uses a single SQLite database file with one table per record kind:
//! - `sessions`, `messages`
//! - `memory_items`
//! - `runs`, `steps`, `artifacts`
//!
//! Structured fields (CPIR, preferences, router decision, memory values,
//! parsed step output) are stored as JSON text. Every table carries an
//! integer `seq` so creation order survives identical timestamps.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;
use switchyard_core::error::StoreError;
use switchyard_core::{
    Artifact, MemoryItem, MemoryPatch, Message, Run, RunCompletion, RunPatch, RunStatus, RunStore,
    RunTotals, Session, Step, StepPatch, StoreResult,
};
use tracing::{debug, info};

/// A SQLite-backed run store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database lives per connection.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite run store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> StoreResult<Self> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        let statements: [(&str, &str); 10] = [
            (
                "sessions table",
                r#"
                CREATE TABLE IF NOT EXISTS sessions (
                    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                    id          TEXT UNIQUE NOT NULL,
                    title       TEXT NOT NULL,
                    created_at  TEXT NOT NULL,
                    updated_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages table",
                r#"
                CREATE TABLE IF NOT EXISTS messages (
                    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                    id          TEXT UNIQUE NOT NULL,
                    session_id  TEXT NOT NULL,
                    role        TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "memory_items table",
                r#"
                CREATE TABLE IF NOT EXISTS memory_items (
                    seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                    id             TEXT UNIQUE NOT NULL,
                    session_id     TEXT NOT NULL,
                    item_type      TEXT NOT NULL,
                    key            TEXT NOT NULL,
                    value          TEXT NOT NULL DEFAULT '{}',
                    confidence     REAL NOT NULL DEFAULT 0.5,
                    enabled        INTEGER NOT NULL DEFAULT 1,
                    source_run_id  TEXT,
                    created_at     TEXT NOT NULL,
                    updated_at     TEXT NOT NULL
                )
                "#,
            ),
            (
                "runs table",
                r#"
                CREATE TABLE IF NOT EXISTS runs (
                    seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
                    id                  TEXT UNIQUE NOT NULL,
                    session_id          TEXT NOT NULL,
                    mode                TEXT NOT NULL,
                    status              TEXT NOT NULL,
                    user_message_id     TEXT,
                    selected_model_ids  TEXT NOT NULL DEFAULT '[]',
                    preferences         TEXT NOT NULL,
                    cpir                TEXT NOT NULL,
                    router_decision     TEXT,
                    input_tokens        INTEGER NOT NULL DEFAULT 0,
                    output_tokens       INTEGER NOT NULL DEFAULT 0,
                    cost_usd            REAL NOT NULL DEFAULT 0.0,
                    latency_ms          INTEGER NOT NULL DEFAULT 0,
                    created_at          TEXT NOT NULL,
                    updated_at          TEXT NOT NULL
                )
                "#,
            ),
            (
                "steps table",
                r#"
                CREATE TABLE IF NOT EXISTS steps (
                    seq                 INTEGER PRIMARY KEY AUTOINCREMENT,
                    id                  TEXT UNIQUE NOT NULL,
                    run_id              TEXT NOT NULL,
                    node_id             TEXT NOT NULL,
                    step_type           TEXT NOT NULL,
                    provider            TEXT NOT NULL,
                    model_id            TEXT NOT NULL,
                    status              TEXT NOT NULL,
                    rendered_prompt     TEXT NOT NULL DEFAULT '',
                    output_raw          TEXT NOT NULL DEFAULT '',
                    output_parsed_json  TEXT,
                    input_tokens        INTEGER NOT NULL DEFAULT 0,
                    output_tokens       INTEGER NOT NULL DEFAULT 0,
                    cost_usd            REAL NOT NULL DEFAULT 0.0,
                    latency_ms          INTEGER NOT NULL DEFAULT 0,
                    origin              TEXT,
                    error_message       TEXT,
                    started_at          TEXT,
                    finished_at         TEXT,
                    created_at          TEXT NOT NULL
                )
                "#,
            ),
            (
                "artifacts table",
                r#"
                CREATE TABLE IF NOT EXISTS artifacts (
                    seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                    id          TEXT UNIQUE NOT NULL,
                    session_id  TEXT NOT NULL,
                    run_id      TEXT NOT NULL,
                    kind        TEXT NOT NULL,
                    title       TEXT NOT NULL,
                    content     TEXT NOT NULL,
                    created_at  TEXT NOT NULL
                )
                "#,
            ),
            (
                "messages index",
                "CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, seq)",
            ),
            (
                "memory index",
                "CREATE INDEX IF NOT EXISTS idx_memory_session ON memory_items(session_id, updated_at DESC)",
            ),
            (
                "steps index",
                "CREATE INDEX IF NOT EXISTS idx_steps_run ON steps(run_id, seq)",
            ),
            (
                "artifacts index",
                "CREATE INDEX IF NOT EXISTS idx_artifacts_run ON artifacts(run_id, seq)",
            ),
        ];

        for (label, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("{label}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    async fn fetch_run(&self, id: &str) -> StoreResult<Run> {
        self.get_run(id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "Run",
            id: id.to_string(),
        })
    }
}

// --- Column codecs ---

/// Fixed-width RFC 3339 so text ordering matches time ordering.
fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn col<'r, T>(row: &'r SqliteRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Sqlite> + sqlx::Type<Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("{name} column: {e}")))
}

fn col_ts(row: &SqliteRow, name: &str) -> StoreResult<DateTime<Utc>> {
    parse_ts(&col::<String>(row, name)?)
}

fn col_opt_ts(row: &SqliteRow, name: &str) -> StoreResult<Option<DateTime<Utc>>> {
    col::<Option<String>>(row, name)?
        .as_deref()
        .map(parse_ts)
        .transpose()
}

fn col_enum<T>(row: &SqliteRow, name: &str) -> StoreResult<T>
where
    T: FromStr<Err = String>,
{
    col::<String>(row, name)?
        .parse()
        .map_err(|e: String| StoreError::Corrupt(format!("{name} column: {e}")))
}

fn col_json<T: DeserializeOwned>(row: &SqliteRow, name: &str) -> StoreResult<T> {
    serde_json::from_str(&col::<String>(row, name)?)
        .map_err(|e| StoreError::Corrupt(format!("{name} column: {e}")))
}

fn col_opt_json<T: DeserializeOwned>(row: &SqliteRow, name: &str) -> StoreResult<Option<T>> {
    col::<Option<String>>(row, name)?
        .map(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| StoreError::Corrupt(format!("{name} column: {e}")))
        })
        .transpose()
}

fn col_u64(row: &SqliteRow, name: &str) -> StoreResult<u64> {
    Ok(col::<i64>(row, name)?.max(0) as u64)
}

fn to_json<T: Serialize>(value: &T) -> StoreResult<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Storage(format!("JSON encoding: {e}")))
}

// --- Row mapping ---

fn row_to_session(row: &SqliteRow) -> StoreResult<Session> {
    Ok(Session {
        id: col(row, "id")?,
        title: col(row, "title")?,
        created_at: col_ts(row, "created_at")?,
        updated_at: col_ts(row, "updated_at")?,
    })
}

fn row_to_message(row: &SqliteRow) -> StoreResult<Message> {
    Ok(Message {
        id: col(row, "id")?,
        session_id: col(row, "session_id")?,
        role: col_enum(row, "role")?,
        content: col(row, "content")?,
        created_at: col_ts(row, "created_at")?,
    })
}

fn row_to_memory(row: &SqliteRow) -> StoreResult<MemoryItem> {
    Ok(MemoryItem {
        id: col(row, "id")?,
        session_id: col(row, "session_id")?,
        item_type: col_enum(row, "item_type")?,
        key: col(row, "key")?,
        value: col_json(row, "value")?,
        confidence: col(row, "confidence")?,
        enabled: col(row, "enabled")?,
        source_run_id: col(row, "source_run_id")?,
        created_at: col_ts(row, "created_at")?,
        updated_at: col_ts(row, "updated_at")?,
    })
}

fn row_to_run(row: &SqliteRow) -> StoreResult<Run> {
    Ok(Run {
        id: col(row, "id")?,
        session_id: col(row, "session_id")?,
        mode: col_enum(row, "mode")?,
        status: col_enum(row, "status")?,
        user_message_id: col(row, "user_message_id")?,
        selected_model_ids: col_json(row, "selected_model_ids")?,
        preferences: col_json(row, "preferences")?,
        cpir: col_json(row, "cpir")?,
        router_decision: col_opt_json(row, "router_decision")?,
        totals: RunTotals {
            input_tokens: col_u64(row, "input_tokens")?,
            output_tokens: col_u64(row, "output_tokens")?,
            cost_usd: col(row, "cost_usd")?,
            latency_ms: col_u64(row, "latency_ms")?,
        },
        created_at: col_ts(row, "created_at")?,
        updated_at: col_ts(row, "updated_at")?,
    })
}

fn row_to_step(row: &SqliteRow) -> StoreResult<Step> {
    let origin = col::<Option<String>>(row, "origin")?
        .map(|raw| {
            raw.parse()
                .map_err(|e: String| StoreError::Corrupt(format!("origin column: {e}")))
        })
        .transpose()?;

    Ok(Step {
        id: col(row, "id")?,
        run_id: col(row, "run_id")?,
        node_id: col(row, "node_id")?,
        step_type: col_enum(row, "step_type")?,
        provider: col_enum(row, "provider")?,
        model_id: col(row, "model_id")?,
        status: col_enum(row, "status")?,
        rendered_prompt: col(row, "rendered_prompt")?,
        output_raw: col(row, "output_raw")?,
        output_parsed_json: col_opt_json(row, "output_parsed_json")?,
        input_tokens: col_u64(row, "input_tokens")?,
        output_tokens: col_u64(row, "output_tokens")?,
        cost_usd: col(row, "cost_usd")?,
        latency_ms: col_u64(row, "latency_ms")?,
        origin,
        error_message: col(row, "error_message")?,
        started_at: col_opt_ts(row, "started_at")?,
        finished_at: col_opt_ts(row, "finished_at")?,
        created_at: col_ts(row, "created_at")?,
    })
}

fn row_to_artifact(row: &SqliteRow) -> StoreResult<Artifact> {
    Ok(Artifact {
        id: col(row, "id")?,
        session_id: col(row, "session_id")?,
        run_id: col(row, "run_id")?,
        kind: col_enum(row, "kind")?,
        title: col(row, "title")?,
        content: col(row, "content")?,
        created_at: col_ts(row, "created_at")?,
    })
}

// --- Writes shared by the pool and the completion transaction ---

async fn insert_message<'e, E>(exec: E, message: &Message) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO messages (id, session_id, role, content, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(&message.id)
    .bind(&message.session_id)
    .bind(message.role.as_str())
    .bind(&message.content)
    .bind(ts(&message.created_at))
    .execute(exec)
    .await
    .map_err(|e| StoreError::Storage(format!("INSERT message failed: {e}")))?;
    Ok(())
}

async fn insert_memory<'e, E>(exec: E, item: &MemoryItem) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO memory_items
            (id, session_id, item_type, key, value, confidence, enabled, source_run_id, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&item.id)
    .bind(&item.session_id)
    .bind(item.item_type.as_str())
    .bind(&item.key)
    .bind(to_json(&item.value)?)
    .bind(item.confidence)
    .bind(item.enabled)
    .bind(&item.source_run_id)
    .bind(ts(&item.created_at))
    .bind(ts(&item.updated_at))
    .execute(exec)
    .await
    .map_err(|e| StoreError::Storage(format!("INSERT memory item failed: {e}")))?;
    Ok(())
}

async fn insert_artifact<'e, E>(exec: E, artifact: &Artifact) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO artifacts (id, session_id, run_id, kind, title, content, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(&artifact.id)
    .bind(&artifact.session_id)
    .bind(&artifact.run_id)
    .bind(artifact.kind.as_str())
    .bind(&artifact.title)
    .bind(&artifact.content)
    .bind(ts(&artifact.created_at))
    .execute(exec)
    .await
    .map_err(|e| StoreError::Storage(format!("INSERT artifact failed: {e}")))?;
    Ok(())
}

/// Write back the mutable columns of a run.
async fn write_run<'e, E>(exec: E, run: &Run) -> StoreResult<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let decision = run.router_decision.as_ref().map(to_json).transpose()?;
    sqlx::query(
        r#"
        UPDATE runs SET
            status = ?1,
            router_decision = ?2,
            input_tokens = ?3,
            output_tokens = ?4,
            cost_usd = ?5,
            latency_ms = ?6,
            updated_at = ?7
        WHERE id = ?8
        "#,
    )
    .bind(run.status.as_str())
    .bind(decision)
    .bind(run.totals.input_tokens as i64)
    .bind(run.totals.output_tokens as i64)
    .bind(run.totals.cost_usd)
    .bind(run.totals.latency_ms as i64)
    .bind(ts(&run.updated_at))
    .bind(&run.id)
    .execute(exec)
    .await
    .map_err(|e| StoreError::Storage(format!("UPDATE run failed: {e}")))?;
    Ok(())
}

#[async_trait]
impl RunStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_session(&self, session: Session) -> StoreResult<Session> {
        sqlx::query(
            "INSERT INTO sessions (id, title, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&session.id)
        .bind(&session.title)
        .bind(ts(&session.created_at))
        .bind(ts(&session.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT session failed: {e}")))?;
        Ok(session)
    }

    async fn get_session(&self, id: &str) -> StoreResult<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT session failed: {e}")))?;
        row.as_ref().map(row_to_session).transpose()
    }

    async fn create_message(&self, message: Message) -> StoreResult<Message> {
        insert_message(&self.pool, &message).await?;
        Ok(message)
    }

    async fn get_message(&self, id: &str) -> StoreResult<Option<Message>> {
        let row = sqlx::query("SELECT * FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT message failed: {e}")))?;
        row.as_ref().map(row_to_message).transpose()
    }

    async fn recent_messages(&self, session_id: &str, limit: usize) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2",
        )
        .bind(session_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("SELECT recent messages failed: {e}")))?;
        rows.iter().map(row_to_message).collect()
    }

    async fn list_messages(&self, session_id: &str) -> StoreResult<Vec<Message>> {
        let rows = sqlx::query("SELECT * FROM messages WHERE session_id = ?1 ORDER BY seq ASC")
            .bind(session_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT messages failed: {e}")))?;
        rows.iter().map(row_to_message).collect()
    }

    async fn create_memory(&self, item: MemoryItem) -> StoreResult<MemoryItem> {
        insert_memory(&self.pool, &item).await?;
        Ok(item)
    }

    async fn get_memory(&self, id: &str) -> StoreResult<Option<MemoryItem>> {
        let row = sqlx::query("SELECT * FROM memory_items WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT memory item failed: {e}")))?;
        row.as_ref().map(row_to_memory).transpose()
    }

    async fn list_memory(&self, session_id: &str) -> StoreResult<Vec<MemoryItem>> {
        let rows = sqlx::query(
            "SELECT * FROM memory_items WHERE session_id = ?1 ORDER BY updated_at DESC, seq DESC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("SELECT memory failed: {e}")))?;
        rows.iter().map(row_to_memory).collect()
    }

    async fn enabled_memory(&self, session_id: &str) -> StoreResult<Vec<MemoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM memory_items
            WHERE session_id = ?1 AND enabled = 1
            ORDER BY updated_at DESC, seq DESC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("SELECT enabled memory failed: {e}")))?;
        rows.iter().map(row_to_memory).collect()
    }

    async fn update_memory(&self, id: &str, patch: &MemoryPatch) -> StoreResult<MemoryItem> {
        let mut item = self.get_memory(id).await?.ok_or_else(|| StoreError::NotFound {
            entity: "MemoryItem",
            id: id.to_string(),
        })?;
        patch.apply(&mut item);

        sqlx::query(
            r#"
            UPDATE memory_items SET value = ?1, confidence = ?2, enabled = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(to_json(&item.value)?)
        .bind(item.confidence)
        .bind(item.enabled)
        .bind(ts(&item.updated_at))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE memory item failed: {e}")))?;

        Ok(item)
    }

    async fn delete_memory(&self, id: &str) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM memory_items WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE memory item failed: {e}")))?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_run(&self, run: Run) -> StoreResult<Run> {
        let decision = run.router_decision.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO runs (
                id, session_id, mode, status, user_message_id, selected_model_ids,
                preferences, cpir, router_decision,
                input_tokens, output_tokens, cost_usd, latency_ms,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
        )
        .bind(&run.id)
        .bind(&run.session_id)
        .bind(run.mode.as_str())
        .bind(run.status.as_str())
        .bind(&run.user_message_id)
        .bind(to_json(&run.selected_model_ids)?)
        .bind(to_json(&run.preferences)?)
        .bind(to_json(&run.cpir)?)
        .bind(decision)
        .bind(run.totals.input_tokens as i64)
        .bind(run.totals.output_tokens as i64)
        .bind(run.totals.cost_usd)
        .bind(run.totals.latency_ms as i64)
        .bind(ts(&run.created_at))
        .bind(ts(&run.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT run failed: {e}")))?;

        debug!(run_id = %run.id, mode = %run.mode, "Stored run");
        Ok(run)
    }

    async fn get_run(&self, id: &str) -> StoreResult<Option<Run>> {
        let row = sqlx::query("SELECT * FROM runs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT run failed: {e}")))?;
        row.as_ref().map(row_to_run).transpose()
    }

    async fn update_run(&self, id: &str, patch: &RunPatch) -> StoreResult<Run> {
        let mut run = self.fetch_run(id).await?;
        patch.apply(&mut run);
        write_run(&self.pool, &run).await?;
        Ok(run)
    }

    async fn create_step(&self, step: Step) -> StoreResult<Step> {
        let parsed = step.output_parsed_json.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO steps (
                id, run_id, node_id, step_type, provider, model_id, status,
                rendered_prompt, output_raw, output_parsed_json,
                input_tokens, output_tokens, cost_usd, latency_ms,
                origin, error_message, started_at, finished_at, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)
            "#,
        )
        .bind(&step.id)
        .bind(&step.run_id)
        .bind(&step.node_id)
        .bind(step.step_type.as_str())
        .bind(step.provider.as_str())
        .bind(&step.model_id)
        .bind(step.status.as_str())
        .bind(&step.rendered_prompt)
        .bind(&step.output_raw)
        .bind(parsed)
        .bind(step.input_tokens as i64)
        .bind(step.output_tokens as i64)
        .bind(step.cost_usd)
        .bind(step.latency_ms as i64)
        .bind(step.origin.map(|o| o.as_str()))
        .bind(&step.error_message)
        .bind(step.started_at.as_ref().map(ts))
        .bind(step.finished_at.as_ref().map(ts))
        .bind(ts(&step.created_at))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT step failed: {e}")))?;
        Ok(step)
    }

    async fn update_step(&self, id: &str, patch: &StepPatch) -> StoreResult<Step> {
        let row = sqlx::query("SELECT * FROM steps WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT step failed: {e}")))?;
        let mut step = row
            .as_ref()
            .map(row_to_step)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Step",
                id: id.to_string(),
            })?;
        patch.apply(&mut step);

        let parsed = step.output_parsed_json.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            UPDATE steps SET
                provider = ?1, model_id = ?2, status = ?3,
                rendered_prompt = ?4, output_raw = ?5, output_parsed_json = ?6,
                input_tokens = ?7, output_tokens = ?8, cost_usd = ?9, latency_ms = ?10,
                origin = ?11, error_message = ?12, started_at = ?13, finished_at = ?14
            WHERE id = ?15
            "#,
        )
        .bind(step.provider.as_str())
        .bind(&step.model_id)
        .bind(step.status.as_str())
        .bind(&step.rendered_prompt)
        .bind(&step.output_raw)
        .bind(parsed)
        .bind(step.input_tokens as i64)
        .bind(step.output_tokens as i64)
        .bind(step.cost_usd)
        .bind(step.latency_ms as i64)
        .bind(step.origin.map(|o| o.as_str()))
        .bind(&step.error_message)
        .bind(step.started_at.as_ref().map(ts))
        .bind(step.finished_at.as_ref().map(ts))
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("UPDATE step failed: {e}")))?;

        Ok(step)
    }

    async fn steps_for_run(&self, run_id: &str) -> StoreResult<Vec<Step>> {
        let rows = sqlx::query("SELECT * FROM steps WHERE run_id = ?1 ORDER BY seq ASC")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT steps failed: {e}")))?;
        rows.iter().map(row_to_step).collect()
    }

    async fn create_artifact(&self, artifact: Artifact) -> StoreResult<Artifact> {
        insert_artifact(&self.pool, &artifact).await?;
        Ok(artifact)
    }

    async fn artifacts_for_run(&self, run_id: &str) -> StoreResult<Vec<Artifact>> {
        let rows = sqlx::query("SELECT * FROM artifacts WHERE run_id = ?1 ORDER BY seq ASC")
            .bind(run_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT artifacts failed: {e}")))?;
        rows.iter().map(row_to_artifact).collect()
    }

    async fn complete_run(&self, completion: RunCompletion) -> StoreResult<Run> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("BEGIN failed: {e}")))?;

        let row = sqlx::query("SELECT * FROM runs WHERE id = ?1")
            .bind(&completion.run_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("SELECT run failed: {e}")))?;
        let mut run = row
            .as_ref()
            .map(row_to_run)
            .transpose()?
            .ok_or_else(|| StoreError::NotFound {
                entity: "Run",
                id: completion.run_id.clone(),
            })?;

        insert_artifact(&mut *tx, &completion.artifact).await?;
        insert_message(&mut *tx, &completion.message).await?;
        insert_memory(&mut *tx, &completion.memory).await?;

        RunPatch {
            status: Some(RunStatus::Done),
            totals: Some(completion.totals),
            ..Default::default()
        }
        .apply(&mut run);
        write_run(&mut *tx, &run).await?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("COMMIT failed: {e}")))?;

        debug!(run_id = %run.id, "Run completion committed");
        Ok(run)
    }
}
