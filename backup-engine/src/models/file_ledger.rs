use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-(config, path) change-detection record.
///
/// Invariant: a row whose hash matches the file's current content hash means
/// the file is unchanged since its last successful encryption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLedgerEntry {
    pub id: String,
    pub config_id: String,
    pub file_path: String,
    pub content_hash: String,
    pub file_size: i64,
    pub modified_at: i64,
    pub updated_at: String,
}

fn row_to_entry(row: &Row) -> rusqlite::Result<FileLedgerEntry> {
    Ok(FileLedgerEntry {
        id: row.get("id")?,
        config_id: row.get("config_id")?,
        file_path: row.get("file_path")?,
        content_hash: row.get("content_hash")?,
        file_size: row.get("file_size")?,
        modified_at: row.get("modified_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find(
    conn: &Connection,
    config_id: &str,
    file_path: &str,
) -> anyhow::Result<Option<FileLedgerEntry>> {
    let mut stmt =
        conn.prepare("SELECT * FROM file_ledger WHERE config_id = ? AND file_path = ?")?;
    let mut rows = stmt.query_map(params![config_id, file_path], |row| row_to_entry(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

/// True when the path has no ledger row or its stored hash differs.
pub fn needs_backup(
    conn: &Connection,
    config_id: &str,
    file_path: &str,
    content_hash: &str,
) -> anyhow::Result<bool> {
    Ok(match find(conn, config_id, file_path)? {
        Some(entry) => entry.content_hash != content_hash,
        None => true,
    })
}

pub fn upsert(
    conn: &Connection,
    config_id: &str,
    file_path: &str,
    content_hash: &str,
    file_size: i64,
    modified_at: i64,
) -> anyhow::Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO file_ledger (id, config_id, file_path, content_hash, file_size, modified_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(config_id, file_path) DO UPDATE SET
           content_hash = excluded.content_hash,
           file_size = excluded.file_size,
           modified_at = excluded.modified_at,
           updated_at = excluded.updated_at",
        params![
            Uuid::new_v4().to_string(),
            config_id,
            file_path,
            content_hash,
            file_size,
            modified_at,
            now
        ],
    )?;
    Ok(())
}
