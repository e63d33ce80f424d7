//! Password-encrypted incremental backup and restore engine.
//!
//! Snapshots configured source paths into timestamped sessions of
//! per-file-encrypted copies, tracks content hashes to only back up changed
//! files, prunes sessions past each config's retention window, and can
//! re-trigger itself on hourly/daily/weekly schedules.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod fs;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{EngineError, Result};
pub use services::restore::{restore_backup, RestoreResult};
pub use services::scheduler::BackupScheduler;
pub use services::session::{perform_backup, RunResult};
pub use state::AppState;
