//! Target platforms and container engines.
//!
//! A [`Platform`] is the `os/arch[/variant]` triple registries use to pick an
//! image out of a multi-platform manifest list. Agents report their
//! architecture as a numeric fog type which maps onto one of the two
//! supported platforms.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target platform of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Platform {
    /// Operating system (e.g. "linux").
    pub os: String,
    /// CPU architecture in registry terms (e.g. "amd64", "arm64").
    pub architecture: String,
    /// Optional architecture variant (e.g. "v8").
    pub variant: Option<String>,
}

impl Platform {
    /// Create a platform without variant.
    #[must_use]
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: None,
        }
    }

    /// `linux/amd64`.
    #[must_use]
    pub fn linux_amd64() -> Self {
        Self::new("linux", "amd64")
    }

    /// `linux/arm64`.
    #[must_use]
    pub fn linux_arm64() -> Self {
        Self::new("linux", "arm64")
    }

    /// Parse `os/arch[/variant]`.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedPlatform` for anything that is not two or
    /// three non-empty segments.
    pub fn parse(value: &str) -> Result<Self> {
        let parts: Vec<&str> = value.trim().split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(Error::UnsupportedPlatform(value.to_string()));
        }
        match parts.as_slice() {
            [os, arch] => Ok(Self::new(*os, *arch)),
            [os, arch, variant] => Ok(Self {
                os: (*os).to_string(),
                architecture: (*arch).to_string(),
                variant: Some((*variant).to_string()),
            }),
            _ => Err(Error::UnsupportedPlatform(value.to_string())),
        }
    }

    /// Map an agent fog type onto its platform.
    ///
    /// | Fog type | Platform      |
    /// |----------|---------------|
    /// | 1        | `linux/amd64` |
    /// | 2        | `linux/arm64` |
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedFogType` for any other value, including
    /// `0` (auto-detect), which cannot be resolved without contacting the agent.
    pub fn from_fog_type(fog_type: i64) -> Result<Self> {
        match fog_type {
            1 => Ok(Self::linux_amd64()),
            2 => Ok(Self::linux_arm64()),
            other => Err(Error::UnsupportedFogType(other)),
        }
    }

    /// Variant used when matching manifests.
    ///
    /// arm64 images are published as `v8` when a variant is given at all.
    #[must_use]
    pub fn effective_variant(&self) -> Option<&str> {
        match (&self.variant, self.architecture.as_str()) {
            (Some(v), _) => Some(v.as_str()),
            (None, "arm64") => Some("v8"),
            (None, _) => None,
        }
    }

    /// Whether a manifest-list entry describes this platform.
    ///
    /// A missing variant on the candidate matches the default variant.
    #[must_use]
    pub fn matches(&self, os: &str, architecture: &str, variant: Option<&str>) -> bool {
        if self.os != os || self.architecture != architecture {
            return false;
        }
        match (self.effective_variant(), variant) {
            (_, None) => true,
            (Some(wanted), Some(candidate)) => wanted == candidate,
            (None, Some(_)) => false,
        }
    }

    /// Filesystem-safe form (e.g. `linux-arm64`).
    #[must_use]
    pub fn sanitized(&self) -> String {
        crate::sanitize(&self.to_string().replace('/', "-"))
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}/{}/{}", self.os, self.architecture, variant),
            None => write!(f, "{}/{}", self.os, self.architecture),
        }
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Container engine running on an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerEngine {
    /// Docker Engine.
    Docker,
    /// Podman.
    Podman,
}

impl ContainerEngine {
    /// Parse an engine name as reported by the Controller.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedEngine` for empty or unknown names.
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            _ => Err(Error::UnsupportedEngine(value.to_string())),
        }
    }

    /// Binary name.
    #[must_use]
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }

    /// Shell command loading an image archive into the engine.
    #[must_use]
    pub fn load_command(&self, archive: &str, sudo: bool) -> String {
        let prefix = if sudo { "sudo -n " } else { "" };
        format!(
            "{}{} load -i {}",
            prefix,
            self.binary(),
            crate::remote::shell_quote(archive)
        )
    }
}

impl fmt::Display for ContainerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary())
    }
}

impl FromStr for ContainerEngine {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_platform() {
        assert_eq!(Platform::parse("linux/amd64").unwrap(), Platform::linux_amd64());

        let arm = Platform::parse("linux/arm64/v8").unwrap();
        assert_eq!(arm.variant.as_deref(), Some("v8"));
        assert_eq!(arm.to_string(), "linux/arm64/v8");
    }

    #[test]
    fn test_parse_platform_rejects_garbage() {
        assert!(Platform::parse("linux").is_err());
        assert!(Platform::parse("linux//v8").is_err());
        assert!(Platform::parse("a/b/c/d").is_err());
        assert!("".parse::<Platform>().is_err());
    }

    #[test]
    fn test_from_fog_type() {
        assert_eq!(Platform::from_fog_type(1).unwrap(), Platform::linux_amd64());
        assert_eq!(Platform::from_fog_type(2).unwrap(), Platform::linux_arm64());
        assert!(matches!(
            Platform::from_fog_type(0),
            Err(Error::UnsupportedFogType(0))
        ));
    }

    #[test]
    fn test_effective_variant() {
        assert_eq!(Platform::linux_arm64().effective_variant(), Some("v8"));
        assert_eq!(Platform::linux_amd64().effective_variant(), None);
    }

    #[test]
    fn test_matches() {
        let arm = Platform::linux_arm64();
        assert!(arm.matches("linux", "arm64", Some("v8")));
        assert!(arm.matches("linux", "arm64", None));
        assert!(!arm.matches("linux", "arm64", Some("v7")));
        assert!(!arm.matches("linux", "amd64", None));

        let amd = Platform::linux_amd64();
        assert!(amd.matches("linux", "amd64", None));
        assert!(!amd.matches("linux", "amd64", Some("v3")));
    }

    #[test]
    fn test_sanitized() {
        assert_eq!(Platform::linux_arm64().sanitized(), "linux-arm64");
        assert_eq!(
            Platform::parse("linux/arm/v7").unwrap().sanitized(),
            "linux-arm-v7"
        );
    }

    #[test]
    fn test_container_engine() {
        assert_eq!(ContainerEngine::parse("Docker").unwrap(), ContainerEngine::Docker);
        assert_eq!(ContainerEngine::parse("podman").unwrap(), ContainerEngine::Podman);
        assert!(ContainerEngine::parse("").is_err());
        assert!(ContainerEngine::parse("containerd").is_err());
    }

    #[test]
    fn test_load_command() {
        assert_eq!(
            ContainerEngine::Podman.load_command("/tmp/x/image.tar.gz", false),
            "podman load -i '/tmp/x/image.tar.gz'"
        );
        assert_eq!(
            ContainerEngine::Docker.load_command("/tmp/x/image.tar.gz", true),
            "sudo -n docker load -i '/tmp/x/image.tar.gz'"
        );
    }
}
