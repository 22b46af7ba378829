pub mod ai;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod store;

pub use ai::{CompletionClient, CompletionConfig, CompletionError};
pub use config::PonderConfig;
pub use db::Database;
pub use error::PonderError;
pub use export::{
    deserialize_entry, serialize_entry, validate_export_payload, ExportPayload, ValidationError,
    WireEntry, EXPORT_VERSION,
};
pub use models::{JournalEntry, UpsertEntry};
pub use store::EntryStore;
