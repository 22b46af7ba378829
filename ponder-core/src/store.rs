//! Durable, local-only storage for journal entries.
//!
//! One physical table keyed by `id`; the engine serializes transactions, so no
//! locking is added here. All operations are async and surface storage
//! failures as `PonderError` — nothing is silently swallowed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::db::Database;
use crate::error::PonderError;
use crate::export::{self, ExportPayload, WireEntry, EXPORT_VERSION};
use crate::models::{new_entry_id, now_ms, JournalEntry, UpsertEntry};

/// Row shape as stored. `reflection_questions` is a JSON array in a nullable
/// TEXT column; timestamps are RFC 3339 text.
#[derive(Debug, sqlx::FromRow)]
struct EntryRow {
    id: String,
    content: String,
    summary: Option<String>,
    reflection_questions: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for JournalEntry {
    type Error = PonderError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        let reflection_questions = row
            .reflection_questions
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()?;
        Ok(JournalEntry {
            id: row.id,
            content: row.content,
            summary: row.summary,
            reflection_questions,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const SELECT_ENTRY: &str =
    "SELECT id, content, summary, reflection_questions, created_at, updated_at FROM entries";

#[derive(Clone)]
pub struct EntryStore {
    db: Arc<Database>,
}

impl EntryStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// An independent store over a fresh in-memory database.
    pub async fn in_memory() -> Result<Self, PonderError> {
        Ok(Self::new(Arc::new(Database::in_memory().await?)))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    async fn pool(&self) -> Result<&SqlitePool, PonderError> {
        self.db.acquire().await
    }

    /// Insert-or-update keyed by id. A missing id gets a fresh UUID; a missing
    /// `created_at` keeps the stored value for an existing id (else "now");
    /// `updated_at` is always refreshed. Returns the row as written.
    pub async fn upsert(&self, entry: UpsertEntry) -> Result<JournalEntry, PonderError> {
        let pool = self.pool().await?;
        let now = now_ms();
        let id = entry.id.unwrap_or_else(new_entry_id);

        let mut tx = pool.begin().await?;

        let created_at = match entry.created_at {
            Some(t) => t,
            None => sqlx::query_scalar::<_, DateTime<Utc>>(
                "SELECT created_at FROM entries WHERE id = ?",
            )
            .bind(&id)
            .fetch_optional(&mut *tx)
            .await?
            .unwrap_or(now),
        };

        let materialized = JournalEntry {
            id,
            content: entry.content,
            summary: entry.summary,
            reflection_questions: entry.reflection_questions,
            created_at,
            updated_at: now,
        };

        write_entry(&mut tx, &materialized).await?;
        tx.commit().await?;

        Ok(materialized)
    }

    pub async fn get(&self, id: &str) -> Result<Option<JournalEntry>, PonderError> {
        let pool = self.pool().await?;
        let row: Option<EntryRow> =
            sqlx::query_as(&format!("{SELECT_ENTRY} WHERE id = ?"))
                .bind(id)
                .fetch_optional(pool)
                .await?;
        row.map(JournalEntry::try_from).transpose()
    }

    /// Update-in-place of an existing entry's text. Unlike upsert, a missing
    /// id is an error here.
    pub async fn update_content(
        &self,
        id: &str,
        content: &str,
    ) -> Result<JournalEntry, PonderError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let row: Option<EntryRow> = sqlx::query_as(&format!("{SELECT_ENTRY} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let mut entry = match row {
            Some(r) => JournalEntry::try_from(r)?,
            None => {
                return Err(PonderError::EntryNotFound { id: id.to_string() });
            }
        };

        entry.content = content.to_string();
        entry.updated_at = now_ms();
        write_entry(&mut tx, &entry).await?;
        tx.commit().await?;

        Ok(entry)
    }

    /// Every stored entry, in store order. Callers sort for display.
    pub async fn list_all(&self) -> Result<Vec<JournalEntry>, PonderError> {
        let pool = self.pool().await?;
        let rows: Vec<EntryRow> = sqlx::query_as(SELECT_ENTRY).fetch_all(pool).await?;
        rows.into_iter().map(JournalEntry::try_from).collect()
    }

    /// Idempotent delete; a missing id is not an error.
    pub async fn delete(&self, id: &str) -> Result<(), PonderError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM entries WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    pub async fn clear_all(&self) -> Result<(), PonderError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM entries").execute(pool).await?;
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, PonderError> {
        let pool = self.pool().await?;
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(pool)
            .await?;
        Ok(n)
    }

    /// Insert each wire entry verbatim — ids and both timestamps preserved,
    /// nothing regenerated — inside one transaction. A failure on any record
    /// rolls back the whole batch.
    pub async fn import_many(
        &self,
        entries: &[WireEntry],
    ) -> Result<Vec<JournalEntry>, PonderError> {
        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;

        let mut imported = Vec::with_capacity(entries.len());
        for wire in entries {
            let entry = export::deserialize_entry(wire)?;
            write_entry(&mut tx, &entry).await?;
            imported.push(entry);
        }

        tx.commit().await?;
        tracing::info!(count = imported.len(), "Imported journal entries");
        Ok(imported)
    }

    /// Snapshot of the whole store in wire form.
    pub async fn export(&self) -> Result<ExportPayload, PonderError> {
        let entries = self.list_all().await?;
        Ok(ExportPayload {
            version: EXPORT_VERSION,
            entries: entries.iter().map(export::serialize_entry).collect(),
        })
    }
}

async fn write_entry(
    tx: &mut Transaction<'_, Sqlite>,
    entry: &JournalEntry,
) -> Result<(), PonderError> {
    let questions_json = entry
        .reflection_questions
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    sqlx::query(
        r#"
        INSERT INTO entries (id, content, summary, reflection_questions, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            content = excluded.content,
            summary = excluded.summary,
            reflection_questions = excluded.reflection_questions,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.content)
    .bind(&entry.summary)
    .bind(questions_json)
    .bind(entry.created_at)
    .bind(entry.updated_at)
    .execute(&mut **tx)
    .await?;

    Ok(())
}
