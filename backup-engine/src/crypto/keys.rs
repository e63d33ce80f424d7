//! Persisted key material for a backup folder.
//!
//! Each (backup folder, config) pair gets one `.config_<id>.json` record
//! holding the KDF name, salt, and iteration count. The record is created on
//! the first backup and read back for every later backup and restore; it is
//! never regenerated, since a new salt would make every existing session in
//! the folder undecryptable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::crypto::cipher::{self, SALT_LEN};
use crate::error::{EngineError, Result};

pub const KDF_NAME: &str = "pbkdf2-hmac-sha256";
pub const PBKDF2_ITERATIONS: u32 = 200_000;

/// Prefix of key record file names; retention and restore must leave these alone.
pub const KEY_FILE_PREFIX: &str = ".config_";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMaterialRecord {
    pub kdf: String,
    pub salt: String,
    pub iterations: u32,
}

impl KeyMaterialRecord {
    pub fn path_for(backup_folder: &Path, config_id: &str) -> PathBuf {
        backup_folder.join(format!("{KEY_FILE_PREFIX}{config_id}.json"))
    }

    pub fn salt_bytes(&self) -> Result<Vec<u8>> {
        let salt = BASE64
            .decode(&self.salt)
            .map_err(|e| EngineError::KeyMaterial(format!("invalid salt encoding: {e}")))?;
        if salt.len() != SALT_LEN {
            return Err(EngineError::KeyMaterial(format!(
                "salt is {} bytes, expected {}",
                salt.len(),
                SALT_LEN
            )));
        }
        Ok(salt)
    }
}

/// Read the key record for a backup folder. Fails if it does not exist.
pub async fn load(backup_folder: &Path, config_id: &str) -> Result<KeyMaterialRecord> {
    let path = KeyMaterialRecord::path_for(backup_folder, config_id);
    let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
        EngineError::KeyMaterial(format!("cannot read key record {}: {e}", path.display()))
    })?;
    parse_record(&path, &text)
}

/// Read the key record, creating it with a fresh salt on first use.
///
/// A record that exists but cannot be parsed is an error, not a trigger for
/// regeneration: overwriting it would silently break all prior sessions.
pub async fn load_or_create(backup_folder: &Path, config_id: &str) -> Result<KeyMaterialRecord> {
    let path = KeyMaterialRecord::path_for(backup_folder, config_id);
    match tokio::fs::read_to_string(&path).await {
        Ok(text) => parse_record(&path, &text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let record = KeyMaterialRecord {
                kdf: KDF_NAME.to_string(),
                salt: BASE64.encode(cipher::generate_salt()),
                iterations: PBKDF2_ITERATIONS,
            };
            tokio::fs::write(&path, serde_json::to_string_pretty(&record)?).await?;
            tracing::info!(config_id = %config_id, path = %path.display(), "Created key material record");
            Ok(record)
        }
        Err(e) => Err(EngineError::KeyMaterial(format!(
            "cannot read key record {}: {e}",
            path.display()
        ))),
    }
}

fn parse_record(path: &Path, text: &str) -> Result<KeyMaterialRecord> {
    let record: KeyMaterialRecord = serde_json::from_str(text).map_err(|e| {
        EngineError::KeyMaterial(format!("corrupt key record {}: {e}", path.display()))
    })?;
    record.salt_bytes()?;
    Ok(record)
}
