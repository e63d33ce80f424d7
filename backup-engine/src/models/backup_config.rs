use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub source_paths: String, // JSON array stored as text
    pub backup_folder: String,
    pub schedule_type: String,
    pub schedule_time: Option<String>,
    pub retention_days: i64,
    pub is_active: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl BackupConfig {
    pub fn source_paths(&self) -> Vec<PathBuf> {
        serde_json::from_str::<Vec<String>>(&self.source_paths)
            .unwrap_or_default()
            .into_iter()
            .map(PathBuf::from)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBackupConfigRequest {
    pub user_id: String,
    pub name: String,
    pub source_paths: Vec<String>,
    pub backup_folder: String,
    #[serde(default = "default_schedule_type")]
    pub schedule_type: String,
    pub schedule_time: Option<String>,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default = "default_is_active")]
    pub is_active: i64,
}

fn default_schedule_type() -> String { "manual".to_string() }
fn default_retention_days() -> i64 { 7 }
fn default_is_active() -> i64 { 1 }

#[derive(Debug, Deserialize)]
pub struct UpdateBackupConfigRequest {
    pub name: Option<String>,
    pub source_paths: Option<Vec<String>>,
    pub backup_folder: Option<String>,
    pub schedule_type: Option<String>,
    pub schedule_time: Option<Option<String>>,
    pub retention_days: Option<i64>,
    pub is_active: Option<i64>,
}

fn row_to_config(row: &Row) -> rusqlite::Result<BackupConfig> {
    Ok(BackupConfig {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        name: row.get("name")?,
        source_paths: row.get("source_paths")?,
        backup_folder: row.get("backup_folder")?,
        schedule_type: row.get("schedule_type")?,
        schedule_time: row.get("schedule_time")?,
        retention_days: row.get("retention_days")?,
        is_active: row.get("is_active")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

pub fn find_all(conn: &Connection) -> anyhow::Result<Vec<BackupConfig>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_configs ORDER BY created_at DESC")?;
    let rows = stmt.query_map([], |row| row_to_config(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn find_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<BackupConfig>> {
    let mut stmt = conn.prepare("SELECT * FROM backup_configs WHERE id = ?")?;
    let mut rows = stmt.query_map(params![id], |row| row_to_config(row))?;
    Ok(rows.next().and_then(|r| r.ok()))
}

/// Configs the scheduler should own a timer for.
pub fn find_schedulable(conn: &Connection) -> anyhow::Result<Vec<BackupConfig>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM backup_configs WHERE is_active = 1 AND schedule_type != 'manual'",
    )?;
    let rows = stmt.query_map([], |row| row_to_config(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn create(conn: &Connection, data: &CreateBackupConfigRequest) -> anyhow::Result<BackupConfig> {
    let id = Uuid::new_v4().to_string();
    let now = chrono::Utc::now().to_rfc3339();
    let source_paths_json = serde_json::to_string(&data.source_paths)?;
    conn.execute(
        "INSERT INTO backup_configs (id, user_id, name, source_paths, backup_folder, schedule_type, schedule_time, retention_days, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            data.user_id,
            data.name,
            source_paths_json,
            data.backup_folder,
            data.schedule_type,
            data.schedule_time,
            data.retention_days,
            data.is_active,
            now,
            now,
        ],
    )?;
    find_by_id(conn, &id)?
        .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created config"))
}

pub fn update(
    conn: &Connection,
    id: &str,
    data: &UpdateBackupConfigRequest,
) -> anyhow::Result<Option<BackupConfig>> {
    let existing = find_by_id(conn, id)?;
    if existing.is_none() {
        return Ok(None);
    }

    let mut sets = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref name) = data.name {
        sets.push("name = ?");
        values.push(Box::new(name.clone()));
    }
    if let Some(ref source_paths) = data.source_paths {
        sets.push("source_paths = ?");
        values.push(Box::new(serde_json::to_string(source_paths)?));
    }
    if let Some(ref backup_folder) = data.backup_folder {
        sets.push("backup_folder = ?");
        values.push(Box::new(backup_folder.clone()));
    }
    if let Some(ref schedule_type) = data.schedule_type {
        sets.push("schedule_type = ?");
        values.push(Box::new(schedule_type.clone()));
    }
    if let Some(ref schedule_time) = data.schedule_time {
        sets.push("schedule_time = ?");
        values.push(Box::new(schedule_time.clone()));
    }
    if let Some(retention_days) = data.retention_days {
        sets.push("retention_days = ?");
        values.push(Box::new(retention_days));
    }
    if let Some(is_active) = data.is_active {
        sets.push("is_active = ?");
        values.push(Box::new(is_active));
    }

    if sets.is_empty() {
        return find_by_id(conn, id);
    }

    sets.push("updated_at = datetime('now')");
    values.push(Box::new(id.to_string()));

    let sql = format!("UPDATE backup_configs SET {} WHERE id = ?", sets.join(", "));
    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    conn.execute(&sql, params.as_slice())?;
    find_by_id(conn, id)
}

/// Ledger and history rows go with the config via FK cascade.
pub fn delete(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let changes = conn.execute("DELETE FROM backup_configs WHERE id = ?", params![id])?;
    Ok(changes > 0)
}
