//! Session restore: decrypt a recorded backup session into a destination
//! root, rebuilding the original relative layout.

use crate::crypto::cipher;
use crate::crypto::keys;
use crate::db::connection::with_conn;
use crate::error::{EngineError, Result};
use crate::models::{backup_config, backup_history};
use crate::services::session::{ENCRYPTED_SUFFIX, FailedFile};
use crate::state::AppState;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

#[derive(Debug, Clone, Serialize)]
pub struct RestoreResult {
    pub success: bool,
    pub files_restored: usize,
    pub destination: PathBuf,
    pub failed_files: Vec<FailedFile>,
}

/// Restore every encrypted file of a recorded session under `destination`.
///
/// Takes the same per-config run lock as backups, so a restore never
/// interleaves with a backup for the same config. A wrong password shows up
/// as one authentication failure per file, never as silently corrupt output.
pub async fn restore_backup(
    state: &Arc<AppState>,
    backup_id: &str,
    password: &str,
    destination: &Path,
) -> Result<RestoreResult> {
    let (history, config) = {
        let bid = backup_id.to_string();
        with_conn(&state.db, move |conn| {
            let history = backup_history::find_by_id(conn, &bid)?;
            let config = match &history {
                Some(h) => backup_config::find_by_id(conn, &h.config_id)?,
                None => None,
            };
            Ok((history, config))
        })
        .await?
    };
    let history = history.ok_or_else(|| EngineError::BackupNotFound(backup_id.to_string()))?;
    let config = config.ok_or_else(|| EngineError::ConfigNotFound(history.config_id.clone()))?;

    {
        let mut running = state.running.lock().await;
        if !running.insert(config.id.clone()) {
            return Err(EngineError::RunInProgress(config.id.clone()));
        }
    }

    let result = restore_session(
        Path::new(&config.backup_folder),
        &config.id,
        Path::new(&history.session_path),
        password,
        destination,
    )
    .await;

    {
        let mut running = state.running.lock().await;
        running.remove(&config.id);
    }

    result
}

async fn restore_session(
    backup_folder: &Path,
    config_id: &str,
    session_path: &Path,
    password: &str,
    destination: &Path,
) -> Result<RestoreResult> {
    // The folder's key record supplies the KDF iteration count; the salt is
    // read back from each payload header.
    let record = keys::load(backup_folder, config_id).await?;
    let iterations = record.iterations;

    tracing::info!(
        config_id = %config_id,
        session = %session_path.display(),
        destination = %destination.display(),
        "Starting restore"
    );

    let encrypted: Vec<PathBuf> = {
        let session = session_path.to_path_buf();
        tokio::task::spawn_blocking(move || {
            WalkDir::new(&session)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
                .map(|e| e.path().to_path_buf())
                .filter(|p| p.to_string_lossy().ends_with(ENCRYPTED_SUFFIX))
                .collect()
        })
        .await
        .map_err(|e| EngineError::Internal(e.into()))?
    };

    let mut files_restored = 0usize;
    let mut failed_files = Vec::new();

    for file in &encrypted {
        match restore_one(session_path, file, password, iterations, destination).await {
            Ok(()) => files_restored += 1,
            Err(e) => {
                tracing::warn!(file = %file.display(), error = %e, "File restore failed");
                failed_files.push(FailedFile {
                    file: file.display().to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    tracing::info!(
        config_id = %config_id,
        restored = files_restored,
        failed = failed_files.len(),
        "Restore finished"
    );

    Ok(RestoreResult {
        success: failed_files.is_empty(),
        files_restored,
        destination: destination.to_path_buf(),
        failed_files,
    })
}

async fn restore_one(
    session_path: &Path,
    file: &Path,
    password: &str,
    iterations: u32,
    destination: &Path,
) -> Result<()> {
    let relative = file
        .strip_prefix(session_path)
        .map_err(|_| EngineError::Format(format!("file outside session: {}", file.display())))?;

    let relative_str = relative.to_string_lossy();
    let original = relative_str
        .strip_suffix(ENCRYPTED_SUFFIX)
        .unwrap_or(&relative_str);
    let dest = destination.join(original);

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let payload = tokio::fs::read(file).await?;
    let plain = {
        let password = password.to_string();
        tokio::task::spawn_blocking(move || cipher::decrypt_bytes(&payload, &password, iterations))
            .await
            .map_err(|e| EngineError::Internal(e.into()))?
    }?;

    tokio::fs::write(&dest, plain).await?;
    tracing::debug!(file = %file.display(), dest = %dest.display(), "Decrypted");
    Ok(())
}
