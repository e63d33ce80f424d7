//! Custom error types for the backup engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Backup configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("Backup record not found: {0}")]
    BackupNotFound(String),

    #[error("A run is already in progress for config {0}")]
    RunInProgress(String),

    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("Backup password not configured for config {0}")]
    CredentialMissing(String),

    #[error("Invalid encrypted payload: {0}")]
    Format(String),

    #[error("Authentication failed: wrong password or corrupted data")]
    Authentication,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Key material error: {0}")]
    KeyMaterial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
