use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    // `source_name` rather than `source`: thiserror reserves that field
    // name for the error's cause chain.
    #[error("Duplicate key for {source_name}:{source_id}")]
    DuplicateKey {
        source_name: String,
        source_id: String,
    },

    #[error("Notification delivery failed: {0}")]
    Notification(String),

    #[error("Storage error: {message}")]
    Storage { message: String },
}

pub type Result<T> = std::result::Result<T, CatalogError>;
