pub mod backup_config;
pub mod backup_history;
pub mod file_ledger;
