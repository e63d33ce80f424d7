//! Retention pruning: drop sessions older than the config's window.

use crate::db::connection::{with_conn, DbPool};
use crate::models::backup_history;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// Delete sessions of `config_id` whose age strictly exceeds `retention_days`,
/// removing both the session directory and its history row. A session exactly
/// at the boundary is retained. Per-entry failures are logged and skipped; the
/// sweep never aborts and never touches the folder's key material file (only
/// session directories recorded in history are removed). Returns the number
/// of sessions pruned.
pub async fn prune(
    db: &DbPool,
    config_id: &str,
    backup_folder: &Path,
    retention_days: i64,
) -> u64 {
    let history = {
        let cid = config_id.to_string();
        match with_conn(db, move |conn| backup_history::find_by_config_id(conn, &cid)).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(config_id = %config_id, error = %e, "Retention sweep could not list history");
                return 0;
            }
        }
    };

    let now = Utc::now();
    let window = Duration::days(retention_days);
    let mut removed = 0u64;

    for record in history {
        let created = match DateTime::parse_from_rfc3339(&record.created_at) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "Skipped history row with bad timestamp");
                continue;
            }
        };

        if now - created <= window {
            continue;
        }

        let session_path = Path::new(&record.session_path);
        if !session_path.starts_with(backup_folder) {
            tracing::warn!(
                record_id = %record.id,
                path = %session_path.display(),
                "Skipped history row pointing outside the backup folder"
            );
            continue;
        }

        match tokio::fs::remove_dir_all(session_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(
                    record_id = %record.id,
                    path = %session_path.display(),
                    error = %e,
                    "Failed to delete expired session directory"
                );
                continue;
            }
        }

        let delete_result = {
            let rid = record.id.clone();
            with_conn(db, move |conn| backup_history::delete(conn, &rid)).await
        };
        match delete_result {
            Ok(_) => {
                removed += 1;
                tracing::info!(
                    config_id = %config_id,
                    path = %record.session_path,
                    "Deleted expired backup session"
                );
            }
            Err(e) => {
                tracing::warn!(record_id = %record.id, error = %e, "Failed to delete history row");
            }
        }
    }

    if removed > 0 {
        tracing::info!(config_id = %config_id, removed, "Retention sweep finished");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyMaterialRecord;
    use crate::services::session::tests::{insert_config, test_state};
    use rusqlite::params;
    use std::fs;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn insert_history_row(
        state: &std::sync::Arc<crate::state::AppState>,
        config_id: &str,
        session_path: &Path,
        created_at: DateTime<Utc>,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let conn = state.db.get().unwrap();
        conn.execute(
            "INSERT INTO backup_history (id, config_id, session_path, file_count, total_bytes, status, created_at)
             VALUES (?1, ?2, ?3, 1, 10, 'success', ?4)",
            params![
                id,
                config_id,
                session_path.to_string_lossy().to_string(),
                created_at.to_rfc3339()
            ],
        )
        .unwrap();
        id
    }

    #[tokio::test]
    async fn test_prune_removes_only_expired_sessions() {
        let dir = TempDir::new().unwrap();
        let backup_folder = dir.path().join("backups");
        fs::create_dir_all(&backup_folder).unwrap();

        let state = test_state(dir.path());
        let config_id = insert_config(&state, vec![], &backup_folder, 7);

        let old = backup_folder.join("backup_old");
        let just_outside = backup_folder.join("backup_just_outside");
        let just_inside = backup_folder.join("backup_just_inside");
        let fresh = backup_folder.join("backup_fresh");
        for p in [&old, &just_outside, &just_inside, &fresh] {
            fs::create_dir_all(p).unwrap();
            fs::write(p.join("x.enc"), b"payload").unwrap();
        }

        let now = Utc::now();
        insert_history_row(&state, &config_id, &old, now - Duration::days(8));
        insert_history_row(
            &state,
            &config_id,
            &just_outside,
            now - Duration::days(7) - Duration::minutes(1),
        );
        // strictly-older-than semantics: a session still inside the window
        // by any margin is retained
        insert_history_row(
            &state,
            &config_id,
            &just_inside,
            now - Duration::days(7) + Duration::minutes(1),
        );
        insert_history_row(&state, &config_id, &fresh, now - Duration::days(1));

        let removed = prune(&state.db, &config_id, &backup_folder, 7).await;
        assert_eq!(removed, 2);
        assert!(!old.exists());
        assert!(!just_outside.exists());
        assert!(just_inside.exists());
        assert!(fresh.exists());

        let conn = state.db.get().unwrap();
        let rows = backup_history::find_by_config_id(&conn, &config_id).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_prune_never_touches_key_material() {
        let dir = TempDir::new().unwrap();
        let backup_folder = dir.path().join("backups");
        fs::create_dir_all(&backup_folder).unwrap();

        let state = test_state(dir.path());
        let config_id = insert_config(&state, vec![], &backup_folder, 0);

        let key_file = KeyMaterialRecord::path_for(&backup_folder, &config_id);
        fs::write(&key_file, "{}").unwrap();

        let session = backup_folder.join("backup_ancient");
        fs::create_dir_all(&session).unwrap();
        insert_history_row(&state, &config_id, &session, Utc::now() - Duration::days(365));

        let removed = prune(&state.db, &config_id, &backup_folder, 0).await;
        assert_eq!(removed, 1);
        assert!(!session.exists());
        assert!(key_file.exists());
    }

    #[tokio::test]
    async fn test_prune_survives_missing_session_directory() {
        let dir = TempDir::new().unwrap();
        let backup_folder = dir.path().join("backups");
        fs::create_dir_all(&backup_folder).unwrap();

        let state = test_state(dir.path());
        let config_id = insert_config(&state, vec![], &backup_folder, 1);

        // history row whose directory was already deleted by hand
        let ghost = backup_folder.join("backup_ghost");
        insert_history_row(&state, &config_id, &ghost, Utc::now() - Duration::days(30));

        let removed = prune(&state.db, &config_id, &backup_folder, 1).await;
        assert_eq!(removed, 1);

        let conn = state.db.get().unwrap();
        assert!(backup_history::find_by_config_id(&conn, &config_id).unwrap().is_empty());
    }
}
