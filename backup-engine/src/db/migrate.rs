use crate::db::connection::DbPool;
use std::fs;
use std::path::Path;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS backup_configs (
  id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  name TEXT NOT NULL,
  source_paths TEXT NOT NULL DEFAULT '[]',
  backup_folder TEXT NOT NULL,
  schedule_type TEXT NOT NULL DEFAULT 'manual' CHECK(schedule_type IN ('manual','hourly','daily','weekly')),
  schedule_time TEXT,
  retention_days INTEGER NOT NULL DEFAULT 7,
  is_active INTEGER NOT NULL DEFAULT 1,
  created_at TEXT NOT NULL DEFAULT (datetime('now')),
  updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS backup_history (
  id TEXT PRIMARY KEY,
  config_id TEXT NOT NULL REFERENCES backup_configs(id) ON DELETE CASCADE,
  session_path TEXT NOT NULL,
  file_count INTEGER NOT NULL DEFAULT 0,
  total_bytes INTEGER NOT NULL DEFAULT 0,
  status TEXT NOT NULL DEFAULT 'success' CHECK(status IN ('success','partial')),
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS file_ledger (
  id TEXT PRIMARY KEY,
  config_id TEXT NOT NULL REFERENCES backup_configs(id) ON DELETE CASCADE,
  file_path TEXT NOT NULL,
  content_hash TEXT NOT NULL,
  file_size INTEGER NOT NULL DEFAULT 0,
  modified_at INTEGER NOT NULL DEFAULT 0,
  updated_at TEXT NOT NULL,
  UNIQUE(config_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_backup_history_config_id ON backup_history(config_id);
CREATE INDEX IF NOT EXISTS idx_backup_history_created_at ON backup_history(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_file_ledger_config_id ON file_ledger(config_id);
"#;

pub fn migrate(pool: &DbPool, data_dir: &Path) -> anyhow::Result<()> {
    tracing::info!("[DB] Starting database migration...");

    fs::create_dir_all(data_dir)?;

    let conn = pool.get()?;
    conn.execute_batch(SCHEMA)?;

    tracing::info!("[DB] Migration complete");
    Ok(())
}
