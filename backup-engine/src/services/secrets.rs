//! Backup password resolution for scheduled runs.
//!
//! Lookup order: in-process override, then `BACKUP_PASSWORD_<configId>`,
//! then the global `BACKUP_PASSWORD` default.

use dashmap::DashMap;

pub struct SecretStore {
    overrides: DashMap<String, String>,
    default: Option<String>,
}

impl SecretStore {
    pub fn from_env() -> Self {
        Self {
            overrides: DashMap::new(),
            default: std::env::var("BACKUP_PASSWORD").ok(),
        }
    }

    /// Register an in-process password for one config, shadowing the
    /// environment. Used by the embedding service.
    pub fn set_override(&self, config_id: &str, password: &str) {
        self.overrides
            .insert(config_id.to_string(), password.to_string());
    }

    pub fn clear_override(&self, config_id: &str) {
        self.overrides.remove(config_id);
    }

    pub fn resolve(&self, config_id: &str) -> Option<String> {
        if let Some(password) = self.overrides.get(config_id) {
            return Some(password.clone());
        }
        if let Ok(password) = std::env::var(format!("BACKUP_PASSWORD_{config_id}")) {
            return Some(password);
        }
        self.default.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_takes_precedence() {
        let store = SecretStore {
            overrides: DashMap::new(),
            default: Some("global".to_string()),
        };
        assert_eq!(store.resolve("cfg-1").as_deref(), Some("global"));

        store.set_override("cfg-1", "specific");
        assert_eq!(store.resolve("cfg-1").as_deref(), Some("specific"));
        assert_eq!(store.resolve("cfg-2").as_deref(), Some("global"));

        store.clear_override("cfg-1");
        assert_eq!(store.resolve("cfg-1").as_deref(), Some("global"));
    }

    #[test]
    fn test_resolve_without_any_source() {
        let store = SecretStore {
            overrides: DashMap::new(),
            default: None,
        };
        assert_eq!(store.resolve("cfg-without-password-anywhere"), None);
    }
}
