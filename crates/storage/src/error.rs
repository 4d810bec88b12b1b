use std::path::PathBuf;

use dbkeep_core::BackupStatus;

/// All errors that can be returned by a `Catalog` implementation.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Malformed backup metadata, rejected before any mutation.
    #[error("invalid backup metadata: {0}")]
    Validation(String),

    /// No record with the given id.
    #[error("backup record not found: {id}")]
    NotFound { id: String },

    /// Illegal status transition. A record transitions out of `Pending`
    /// exactly once; hitting this indicates a caller bug or a race.
    #[error("backup {id} is {status}, expected pending")]
    InvalidState { id: String, status: BackupStatus },

    #[error("catalog I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("catalog serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from a `BackupStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("artifact not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
}
