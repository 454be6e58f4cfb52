//! User settings (`config.toml`)
//!
//! ```toml
//! default_namespace = "edge"
//!
//! [airgap]
//! pool_size = 8
//! no_cache = false
//! plain_http = ["registry.local:5000"]
//!
//! [airgap.registries."registry.example.com"]
//! username = "bot"
//! password = "secret"
//!
//! [controller]
//! max_attempts = 20
//! base_delay_secs = 2
//! max_delay_secs = 30
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default = "default_namespace")]
    pub default_namespace: String,

    #[serde(default)]
    pub airgap: AirgapSettings,

    #[serde(default)]
    pub controller: ControllerSettings,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_namespace: default_namespace(),
            airgap: AirgapSettings::default(),
            controller: ControllerSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AirgapSettings {
    /// Concurrent SSH transfers
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Never reuse cached artifacts
    #[serde(default)]
    pub no_cache: bool,

    /// Registries reached over plain HTTP
    #[serde(default)]
    pub plain_http: Vec<String>,

    /// Credentials keyed by registry host
    #[serde(default)]
    pub registries: BTreeMap<String, RegistryCredential>,
}

fn default_pool_size() -> usize {
    airgap::transfer::DEFAULT_POOL_SIZE
}

impl Default for AirgapSettings {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            no_cache: false,
            plain_http: Vec::new(),
            registries: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryCredential {
    pub username: String,
    pub password: String,
}

/// Readiness polling after a Controller is installed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControllerSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    10
}

fn default_base_delay() -> u64 {
    1
}

fn default_max_delay() -> u64 {
    30
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
            max_delay_secs: default_max_delay(),
        }
    }
}

impl ControllerSettings {
    pub fn retry_config(&self) -> controller::RetryConfig {
        controller::RetryConfig {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_secs(self.base_delay_secs),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(self.max_delay_secs),
        }
    }
}

impl Settings {
    /// Load settings, or defaults if the file doesn't exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let settings: Settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Registry client with the configured credentials and plain-HTTP hosts
    pub fn oci_registry(&self) -> airgap::OciRegistry {
        let mut registry = airgap::OciRegistry::new();
        for (host, credential) in &self.airgap.registries {
            registry = registry.with_credentials(
                host.clone(),
                airgap::Credentials::new(&credential.username, &credential.password),
            );
        }
        for host in &self.airgap.plain_http {
            registry = registry.with_plain_http(host.clone());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let temp = TempDir::new().unwrap();
        let settings = Settings::load(&temp.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.default_namespace, "default");
        assert_eq!(settings.airgap.pool_size, 4);
    }

    #[test]
    fn test_load_full_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(
            &path,
            r#"
default_namespace = "edge"

[airgap]
pool_size = 8
plain_http = ["registry.local:5000"]

[airgap.registries."registry.example.com"]
username = "bot"
password = "secret"

[controller]
max_attempts = 3
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.default_namespace, "edge");
        assert_eq!(settings.airgap.pool_size, 8);
        assert!(!settings.airgap.no_cache);
        assert_eq!(
            settings.airgap.registries["registry.example.com"].username,
            "bot"
        );

        let retry = settings.controller.retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        fs::write(&path, "[airgap]\npool = 2\n").unwrap();
        let err = Settings::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }
}
