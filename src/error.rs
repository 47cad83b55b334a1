use thiserror::Error;

/// Failures surfaced by the entry store.
///
/// Backup failures never show up here; they are logged and dropped.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("entry {0} not found")]
    NotFound(i64),

    #[error("failed to initialize storage: {0}")]
    StorageInit(#[source] tokio_rusqlite::Error),

    #[error("storage read failed: {0}")]
    StorageRead(#[source] tokio_rusqlite::Error),

    #[error("storage write failed: {0}")]
    StorageWrite(#[source] tokio_rusqlite::Error),
}

impl StoreError {
    /// Response status a request layer should answer with for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::Validation(_) => 400,
            StoreError::NotFound(_) => 404,
            StoreError::StorageInit(_)
            | StoreError::StorageRead(_)
            | StoreError::StorageWrite(_) => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid command: {0}")]
    Usage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
