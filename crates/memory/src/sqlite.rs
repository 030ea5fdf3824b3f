//! SQLite store.
//!
//! One database file with three tables:
//! - `facts`: memory facts; `iid` keeps insertion order
//! - `prompt_components`: learned component weights and statistics
//! - `thread_contexts`: per-thread `ContextState` as JSON
//!
//! Migrations are idempotent (`CREATE ... IF NOT EXISTS`) and run on open.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mnemo_core::error::{Error, Result, StorageError};
use mnemo_core::{
    ComponentStore, ContextState, ContextStore, FactFilter, Importance, MemoryFact, MemoryStore,
    PromptComponent,
};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

pub struct SqliteStore {
    pool: SqlitePool,
}

fn query_failed(what: &str, e: sqlx::Error) -> Error {
    StorageError::QueryFailed(format!("{what}: {e}")).into()
}

impl SqliteStore {
    /// Open a database from a connection string such as `sqlite://mnemo.db`.
    pub async fn new(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StorageError::Io(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, url).await
    }

    /// Open (creating if missing) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StorageError::from)?;
        }
        let options = SqliteConnectOptions::new().filename(path);
        Self::connect(options, &path.display().to_string()).await
    }

    async fn connect(options: SqliteConnectOptions, label: &str) -> Result<Self> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Io(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {label}");
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        let statements = [
            (
                "facts table",
                r#"
                CREATE TABLE IF NOT EXISTS facts (
                    iid              INTEGER PRIMARY KEY AUTOINCREMENT,
                    id               TEXT UNIQUE NOT NULL,
                    question         TEXT NOT NULL,
                    answer           TEXT NOT NULL,
                    tags             TEXT NOT NULL DEFAULT '[]',
                    agent            TEXT NOT NULL,
                    importance       TEXT NOT NULL DEFAULT 'medium',
                    confidence       REAL NOT NULL DEFAULT 1.0,
                    created_at       TEXT NOT NULL,
                    source_thread_id TEXT
                )
                "#,
            ),
            (
                "agent index",
                "CREATE INDEX IF NOT EXISTS idx_facts_agent ON facts(agent)",
            ),
            (
                "thread index",
                "CREATE INDEX IF NOT EXISTS idx_facts_thread ON facts(source_thread_id)",
            ),
            (
                "components table",
                r#"
                CREATE TABLE IF NOT EXISTS prompt_components (
                    id            TEXT PRIMARY KEY,
                    category      TEXT NOT NULL,
                    text_template TEXT NOT NULL,
                    weight        REAL NOT NULL DEFAULT 0.0,
                    success_rate  REAL NOT NULL DEFAULT 0.5,
                    usage_count   INTEGER NOT NULL DEFAULT 0,
                    last_used_at  TEXT
                )
                "#,
            ),
            (
                "contexts table",
                r#"
                CREATE TABLE IF NOT EXISTS thread_contexts (
                    thread_id    TEXT PRIMARY KEY,
                    state        TEXT NOT NULL,
                    last_updated TEXT NOT NULL
                )
                "#,
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::MigrationFailed(format!("{what}: {e}")))?;
        }

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_fact(row: &sqlx::sqlite::SqliteRow) -> Result<MemoryFact> {
        let column = |name: &str, e: sqlx::Error| query_failed(&format!("{name} column"), e);

        let tags_json: String = row.try_get("tags").map_err(|e| column("tags", e))?;
        let importance: String = row.try_get("importance").map_err(|e| column("importance", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let confidence: f64 = row.try_get("confidence").map_err(|e| column("confidence", e))?;

        let fact = MemoryFact {
            id: row.try_get("id").map_err(|e| column("id", e))?,
            question: row.try_get("question").map_err(|e| column("question", e))?,
            answer: row.try_get("answer").map_err(|e| column("answer", e))?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            agent: row.try_get("agent").map_err(|e| column("agent", e))?,
            importance: importance.parse().unwrap_or_else(|e| {
                warn!(error = %e, "Unknown importance in facts table");
                Importance::default()
            }),
            confidence: confidence as f32,
            created_at: parse_timestamp(&created_at),
            source_thread_id: row
                .try_get("source_thread_id")
                .map_err(|e| column("source_thread_id", e))?,
        };
        Ok(fact.normalized())
    }

    fn row_to_component(row: &sqlx::sqlite::SqliteRow) -> Result<PromptComponent> {
        let column = |name: &str, e: sqlx::Error| query_failed(&format!("{name} column"), e);

        let weight: f64 = row.try_get("weight").map_err(|e| column("weight", e))?;
        let success_rate: f64 = row.try_get("success_rate").map_err(|e| column("success_rate", e))?;
        let usage_count: i64 = row.try_get("usage_count").map_err(|e| column("usage_count", e))?;
        let last_used_at: Option<String> =
            row.try_get("last_used_at").map_err(|e| column("last_used_at", e))?;

        let component = PromptComponent {
            id: row.try_get("id").map_err(|e| column("id", e))?,
            category: row.try_get("category").map_err(|e| column("category", e))?,
            text_template: row.try_get("text_template").map_err(|e| column("text_template", e))?,
            weight: weight as f32,
            success_rate: success_rate as f32,
            usage_count: usage_count.max(0) as u64,
            last_used_at: last_used_at.as_deref().map(parse_timestamp),
        };
        Ok(component.normalized())
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl MemoryStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn save(&self, fact: MemoryFact) -> Result<String> {
        let fact = fact.normalized();
        let tags_json = serde_json::to_string(&fact.tags)?;

        sqlx::query(
            r#"
            INSERT INTO facts (id, question, answer, tags, agent, importance, confidence, created_at, source_thread_id)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                question = excluded.question,
                answer = excluded.answer,
                tags = excluded.tags,
                importance = excluded.importance,
                confidence = excluded.confidence
            "#,
        )
        .bind(&fact.id)
        .bind(&fact.question)
        .bind(&fact.answer)
        .bind(&tags_json)
        .bind(&fact.agent)
        .bind(fact.importance.as_str())
        .bind(f64::from(fact.confidence))
        .bind(fact.created_at.to_rfc3339())
        .bind(&fact.source_thread_id)
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("INSERT fact", e))?;

        debug!(id = %fact.id, "Stored fact");
        Ok(fact.id)
    }

    async fn find(&self, filter: &FactFilter) -> Result<Vec<MemoryFact>> {
        let rows = match &filter.agent {
            Some(agent) => {
                sqlx::query("SELECT * FROM facts WHERE agent = ?1 ORDER BY iid")
                    .bind(agent)
                    .fetch_all(&self.pool)
                    .await
            }
            None => sqlx::query("SELECT * FROM facts ORDER BY iid").fetch_all(&self.pool).await,
        }
        .map_err(|e| query_failed("SELECT facts", e))?;

        // Tag sets are JSON arrays; match them in Rust rather than with LIKE.
        let mut facts = Vec::with_capacity(rows.len());
        for row in &rows {
            let fact = Self::row_to_fact(row)?;
            if filter.matches(&fact) {
                facts.push(fact);
            }
        }
        Ok(facts)
    }

    async fn get(&self, id: &str) -> Result<MemoryFact> {
        let row = sqlx::query("SELECT * FROM facts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("SELECT fact", e))?;
        match row {
            Some(row) => Self::row_to_fact(&row),
            None => Err(Error::not_found("memory", id)),
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM facts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("DELETE fact", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("memory", id));
        }
        Ok(())
    }

    async fn update_importance(&self, id: &str, importance: Importance) -> Result<()> {
        let result = sqlx::query("UPDATE facts SET importance = ?1 WHERE id = ?2")
            .bind(importance.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("UPDATE importance", e))?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("memory", id));
        }
        Ok(())
    }

    async fn delete_thread_scoped(&self, thread_id: &str) -> Result<usize> {
        let candidates = sqlx::query("SELECT * FROM facts WHERE source_thread_id = ?1")
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("SELECT thread facts", e))?;

        let mut removed = 0;
        for row in &candidates {
            let fact = Self::row_to_fact(row)?;
            if fact.is_thread_scoped_to(thread_id) {
                sqlx::query("DELETE FROM facts WHERE id = ?1")
                    .bind(&fact.id)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| query_failed("DELETE thread fact", e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM facts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| query_failed("COUNT facts", e))?;
        let n: i64 = row.try_get("n").map_err(|e| query_failed("COUNT column", e))?;
        Ok(n.max(0) as usize)
    }
}

#[async_trait]
impl ComponentStore for SqliteStore {
    async fn load_components(&self) -> Result<Vec<PromptComponent>> {
        let rows = sqlx::query("SELECT * FROM prompt_components ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| query_failed("SELECT components", e))?;
        rows.iter().map(Self::row_to_component).collect()
    }

    async fn upsert_component(&self, component: &PromptComponent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO prompt_components (id, category, text_template, weight, success_rate, usage_count, last_used_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                category = excluded.category,
                text_template = excluded.text_template,
                weight = excluded.weight,
                success_rate = excluded.success_rate,
                usage_count = excluded.usage_count,
                last_used_at = excluded.last_used_at
            "#,
        )
        .bind(&component.id)
        .bind(&component.category)
        .bind(&component.text_template)
        .bind(f64::from(component.weight))
        .bind(f64::from(component.success_rate))
        .bind(i64::try_from(component.usage_count).unwrap_or(i64::MAX))
        .bind(component.last_used_at.map(|t| t.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("UPSERT component", e))?;
        Ok(())
    }
}

#[async_trait]
impl ContextStore for SqliteStore {
    async fn load_context(&self, thread_id: &str) -> Result<Option<ContextState>> {
        let row = sqlx::query("SELECT state FROM thread_contexts WHERE thread_id = ?1")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| query_failed("SELECT context", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let json: String = row.try_get("state").map_err(|e| query_failed("state column", e))?;
        let state = serde_json::from_str(&json)
            .map_err(|e| StorageError::Corrupt(format!("context for {thread_id}: {e}")))?;
        Ok(Some(state))
    }

    async fn upsert_context(&self, state: &ContextState) -> Result<()> {
        let json = serde_json::to_string(state)?;
        sqlx::query(
            r#"
            INSERT INTO thread_contexts (thread_id, state, last_updated)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(thread_id) DO UPDATE SET
                state = excluded.state,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&state.thread_id)
        .bind(&json)
        .bind(state.last_updated.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| query_failed("UPSERT context", e))?;
        Ok(())
    }

    async fn delete_context(&self, thread_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM thread_contexts WHERE thread_id = ?1")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_failed("DELETE context", e))?;
        Ok(result.rows_affected() > 0)
    }
}
