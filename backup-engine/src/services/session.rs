//! One backup run: enumerate, filter by content hash, encrypt into a fresh
//! session directory, record history, prune old sessions.

use crate::crypto::cipher::{self, KEY_LEN};
use crate::crypto::keys;
use crate::db::connection::{with_conn, DbPool};
use crate::error::{EngineError, Result};
use crate::fs::{paths, walker};
use crate::models::{backup_config, backup_history, file_ledger};
use crate::services::retention;
use crate::state::AppState;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const SESSION_DIR_PREFIX: &str = "backup_";
pub const ENCRYPTED_SUFFIX: &str = ".enc";

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_PARTIAL: &str = "partial";

#[derive(Debug, Clone, Serialize)]
pub struct FailedFile {
    pub file: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub files_backed_up: usize,
    pub total_bytes: u64,
    pub session_path: PathBuf,
    pub failed_files: Vec<FailedFile>,
    pub status: String,
    pub message: String,
}

/// Run a backup for one config.
///
/// Holds the per-config run lock for the whole run, so a second backup or
/// restore for the same config fails fast with [`EngineError::RunInProgress`]
/// instead of interleaving. Runs for different configs proceed concurrently.
pub async fn perform_backup(
    state: &Arc<AppState>,
    config_id: &str,
    password: &str,
) -> Result<RunResult> {
    {
        let mut running = state.running.lock().await;
        if !running.insert(config_id.to_string()) {
            return Err(EngineError::RunInProgress(config_id.to_string()));
        }
    }

    let result = run_session(state, config_id, password).await;

    {
        let mut running = state.running.lock().await;
        running.remove(config_id);
    }

    result
}

async fn run_session(state: &Arc<AppState>, config_id: &str, password: &str) -> Result<RunResult> {
    let cid = config_id.to_string();
    let config = with_conn(&state.db, move |conn| backup_config::find_by_id(conn, &cid))
        .await?
        .ok_or_else(|| EngineError::ConfigNotFound(config_id.to_string()))?;

    let source_paths = config.source_paths();
    let backup_folder = PathBuf::from(&config.backup_folder);
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ");
    let session_path = backup_folder.join(format!("{SESSION_DIR_PREFIX}{timestamp}"));
    tokio::fs::create_dir_all(&session_path).await?;

    tracing::info!(
        config_id = %config.id,
        session = %session_path.display(),
        sources = source_paths.len(),
        "Starting backup run"
    );

    // Key material is created on the first run and reused ever after; the
    // session key is derived once per run.
    let record = keys::load_or_create(&backup_folder, &config.id).await?;
    let salt = record.salt_bytes()?;
    let key = {
        let password = password.to_string();
        let salt = salt.clone();
        let iterations = record.iterations;
        tokio::task::spawn_blocking(move || cipher::derive_key(&password, &salt, iterations))
            .await
            .map_err(|e| EngineError::Internal(e.into()))?
    };

    let files = {
        let sources = source_paths.clone();
        tokio::task::spawn_blocking(move || walker::enumerate(&sources))
            .await
            .map_err(|e| EngineError::Internal(e.into()))?
    };
    tracing::info!(config_id = %config.id, files = files.len(), "Enumerated source files");

    let backup_root = paths::backup_root(&source_paths).unwrap_or_default();

    let mut files_backed_up = 0usize;
    let mut total_bytes = 0u64;
    let mut failed_files = Vec::new();
    let mut interrupted = false;

    for file in &files {
        if state.shutdown.is_cancelled() {
            tracing::warn!(config_id = %config.id, "Run cancelled; unprocessed files stay queued for the next run");
            interrupted = true;
            break;
        }

        match backup_one(&state.db, &config.id, &key, &salt, &backup_root, &session_path, file)
            .await
        {
            Ok(Some(bytes)) => {
                files_backed_up += 1;
                total_bytes += bytes;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    config_id = %config.id,
                    file = %file.display(),
                    error = %e,
                    "File backup failed"
                );
                failed_files.push(FailedFile {
                    file: file.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    let status = if failed_files.is_empty() { STATUS_SUCCESS } else { STATUS_PARTIAL };

    {
        let cid = config.id.clone();
        let session = session_path.to_string_lossy().to_string();
        let count = files_backed_up as i64;
        let bytes = total_bytes as i64;
        let status = status.to_string();
        with_conn(&state.db, move |conn| {
            backup_history::create(conn, &cid, &session, count, bytes, &status)
        })
        .await?;
    }

    retention::prune(&state.db, &config.id, &backup_folder, config.retention_days).await;

    let message = if interrupted {
        format!("Backup interrupted after {files_backed_up} file(s); remaining files will be picked up next run.")
    } else if files_backed_up == 0 {
        "No modified files found. Nothing new to backup.".to_string()
    } else {
        format!("Backup completed: {files_backed_up} file(s) encrypted.")
    };

    tracing::info!(
        config_id = %config.id,
        files = files_backed_up,
        bytes = total_bytes,
        failed = failed_files.len(),
        status,
        "Backup run finished"
    );

    Ok(RunResult {
        success: failed_files.is_empty(),
        files_backed_up,
        total_bytes,
        session_path,
        failed_files,
        status: status.to_string(),
        message,
    })
}

/// Back up a single enumerated file. `Ok(None)` means the file was skipped
/// (unchanged, or it normalizes outside the backup root); `Ok(Some(bytes))`
/// is a successful encryption. Errors are per-file and the caller accumulates
/// them without aborting the run.
async fn backup_one(
    db: &DbPool,
    config_id: &str,
    key: &[u8; KEY_LEN],
    salt: &[u8],
    backup_root: &Path,
    session_path: &Path,
    file: &Path,
) -> Result<Option<u64>> {
    let plain = tokio::fs::read(file).await?;
    let hash = cipher::content_hash(&plain);

    let changed = {
        let cid = config_id.to_string();
        let path = file.to_string_lossy().to_string();
        let hash = hash.clone();
        with_conn(db, move |conn| file_ledger::needs_backup(conn, &cid, &path, &hash)).await?
    };
    if !changed {
        return Ok(None);
    }

    let Some(relative) = paths::session_relative(backup_root, file) else {
        tracing::warn!(
            file = %file.display(),
            root = %backup_root.display(),
            "Skipped file that normalizes outside the backup root"
        );
        return Ok(None);
    };

    let mut dest = session_path.join(&relative);
    dest.as_mut_os_string().push(ENCRYPTED_SUFFIX);
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let payload = cipher::encrypt_bytes(&plain, key, salt)?;
    tokio::fs::write(&dest, payload).await?;

    let modified_at = tokio::fs::metadata(file)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    // Ledger commit happens only after the encrypted copy is on disk.
    let size = plain.len() as u64;
    {
        let cid = config_id.to_string();
        let path = file.to_string_lossy().to_string();
        let size = size as i64;
        with_conn(db, move |conn| {
            file_ledger::upsert(conn, &cid, &path, &hash, size, modified_at)
        })
        .await?;
    }

    tracing::debug!(file = %file.display(), dest = %dest.display(), "Encrypted");
    Ok(Some(size))
}
