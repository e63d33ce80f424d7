use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One row per completed run, including zero-file runs. Append-only: rows are
/// removed only by retention pruning or the config-deletion cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupHistoryRecord {
    pub id: String,
    pub config_id: String,
    pub session_path: String,
    pub file_count: i64,
    pub total_bytes: i64,
    pub status: String,
    pub created_at: String,
}

fn row_to_record(row: &Row) -> rusqlite::Result<BackupHistoryRecord> {
    Ok(BackupHistoryRecord {
        id: row.get("id")?,
        config_id: row.get("config_id")?,
        session_path: row.get("session_path")?,
        file_count: row.get("file_count")?,
        total_bytes: row.get("total_bytes")?,
        status: row.get("status")?,
        created_at: row.get("created_at")?,
    })
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<BackupHistoryRecord>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_history WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_record(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

pub fn find_by_config_id(
    conn: &Connection,
    config_id: &str,
) -> anyhow::Result<Vec<BackupHistoryRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM backup_history WHERE config_id = ? ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![config_id], |row| row_to_record(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn create(
    conn: &Connection,
    config_id: &str,
    session_path: &str,
    file_count: i64,
    total_bytes: i64,
    status: &str,
) -> anyhow::Result<BackupHistoryRecord> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO backup_history (id, config_id, session_path, file_count, total_bytes, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![id, config_id, session_path, file_count, total_bytes, status, now],
    )?;
    find_by_id(conn, &id)?
        .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created history record"))
}

pub fn delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changes = conn.execute("DELETE FROM backup_history WHERE id = ?", params![id])?;
    Ok(changes > 0)
}
