use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One journal record — the sole persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub content: String,
    pub summary: Option<String>,
    pub reflection_questions: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial input to `EntryStore::upsert`. Only `content` is required; the
/// store fills in everything else. A supplied `created_at` always wins —
/// the import path relies on this to replay history verbatim.
#[derive(Debug, Clone, Default)]
pub struct UpsertEntry {
    pub id: Option<String>,
    pub content: String,
    pub summary: Option<String>,
    pub reflection_questions: Option<Vec<String>>,
    pub created_at: Option<DateTime<Utc>>,
}

impl UpsertEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Generate a fresh entry id (random UUID, stored as an opaque string).
pub fn new_entry_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current time truncated to millisecond precision, so that stored and
/// wire-form timestamps round-trip exactly.
pub fn now_ms() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}
