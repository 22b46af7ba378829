pub mod entry;

pub use entry::{new_entry_id, now_ms, JournalEntry, UpsertEntry};
