use thiserror::Error;

use crate::export::ValidationError;

#[derive(Error, Debug)]
pub enum PonderError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Entry not found: {id}")]
    EntryNotFound { id: String },

    #[error("Database unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}
