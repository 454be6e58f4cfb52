//! Centralized path resolution for fogctl
//!
//! # Environment Variables
//!
//! - `FOGCTL_CONFIG_DIR` - Override config directory (config.toml, namespaces)
//! - `FOGCTL_CACHE_DIR` - Override cache directory (air-gap image artifacts)
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `FOGCTL_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/fogctl` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\fogctl`
//!    - macOS/Linux: `~/.config/fogctl`
//!
//! For cache_dir():
//! 1. `FOGCTL_CACHE_DIR` environment variable
//! 2. `XDG_CACHE_HOME/fogctl` (if set)
//! 3. Platform default:
//!    - Windows: `%LOCALAPPDATA%\fogctl\cache`
//!    - macOS/Linux: `~/.cache/fogctl`

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "FOGCTL_CONFIG_DIR";

/// Environment variable for cache directory override
pub const ENV_CACHE_DIR: &str = "FOGCTL_CACHE_DIR";

const APP: &str = "fogctl";

/// Resolved locations used by one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub cache_dir: PathBuf,
}

impl Paths {
    /// Resolve from the process environment
    pub fn resolve() -> Result<Self> {
        let env = |key: &str| std::env::var(key).ok();
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(Self {
            config_dir: config_dir_from(&env, &home),
            cache_dir: cache_dir_from(&env, &home),
        })
    }

    #[cfg(test)]
    pub fn under(root: &Path) -> Self {
        Self {
            config_dir: root.join("config"),
            cache_dir: root.join("cache"),
        }
    }

    /// `config.toml`
    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    /// Directory holding one YAML record per namespace
    pub fn namespaces_dir(&self) -> PathBuf {
        self.config_dir.join("namespaces")
    }

    /// Root of the air-gap artifact cache
    pub fn airgap_cache_dir(&self) -> PathBuf {
        self.cache_dir.join("airgap")
    }
}

fn config_dir_from(env: &dyn Fn(&str) -> Option<String>, home: &Path) -> PathBuf {
    if let Some(dir) = env(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!("Using config dir from {}: {}", ENV_CONFIG_DIR, path.display());
        return path;
    }

    if let Some(xdg) = env("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join(APP);
    }

    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return app_data.join(APP);
        }
    }

    home.join(".config").join(APP)
}

fn cache_dir_from(env: &dyn Fn(&str) -> Option<String>, home: &Path) -> PathBuf {
    if let Some(dir) = env(ENV_CACHE_DIR) {
        let path = expand(&dir);
        log::debug!("Using cache dir from {}: {}", ENV_CACHE_DIR, path.display());
        return path;
    }

    if let Some(xdg) = env("XDG_CACHE_HOME") {
        return PathBuf::from(xdg).join(APP);
    }

    #[cfg(windows)]
    {
        if let Some(local) = dirs::data_local_dir() {
            return local.join(APP).join("cache");
        }
    }

    home.join(".cache").join(APP)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_override_wins() {
        let env = env_of(&[
            (ENV_CONFIG_DIR, "/custom/config"),
            ("XDG_CONFIG_HOME", "/xdg"),
        ]);
        assert_eq!(
            config_dir_from(&env, Path::new("/home/ops")),
            PathBuf::from("/custom/config")
        );
    }

    #[test]
    fn test_xdg_fallback() {
        let env = env_of(&[("XDG_CACHE_HOME", "/xdg-cache")]);
        assert_eq!(
            cache_dir_from(&env, Path::new("/home/ops")),
            PathBuf::from("/xdg-cache/fogctl")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_unix_defaults() {
        let env = env_of(&[]);
        let home = Path::new("/home/ops");
        assert_eq!(
            config_dir_from(&env, home),
            PathBuf::from("/home/ops/.config/fogctl")
        );
        assert_eq!(
            cache_dir_from(&env, home),
            PathBuf::from("/home/ops/.cache/fogctl")
        );
    }

    #[test]
    fn test_layout_under_root() {
        let paths = Paths::under(Path::new("/tmp/x"));
        assert_eq!(paths.config_file(), PathBuf::from("/tmp/x/config/config.toml"));
        assert_eq!(paths.namespaces_dir(), PathBuf::from("/tmp/x/config/namespaces"));
        assert_eq!(paths.airgap_cache_dir(), PathBuf::from("/tmp/x/cache/airgap"));
    }

    #[test]
    fn test_expand_absolute() {
        assert_eq!(expand("/absolute/path"), PathBuf::from("/absolute/path"));
    }

    #[test]
    fn test_expand_with_tilde() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand("~/keys/id_ed25519"), home.join("keys").join("id_ed25519"));
    }
}
