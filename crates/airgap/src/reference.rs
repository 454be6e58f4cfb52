//! Image reference parsing.
//!
//! Accepts the usual short forms (`nginx`, `acme/agent:3.1`,
//! `ghcr.io/acme/agent@sha256:...`) and normalizes them to a registry host,
//! repository and tag or digest.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Name of Docker Hub in short references.
const DOCKER_HUB: &str = "docker.io";

/// Host actually serving the Docker Hub registry API.
const DOCKER_HUB_API: &str = "registry-1.docker.io";

/// A parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    registry: String,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageReference {
    /// Parse a reference.
    ///
    /// Without tag or digest the tag defaults to `latest`. A first path
    /// component containing `.` or `:` (or equal to `localhost`) is taken as
    /// the registry host; otherwise the image lives on Docker Hub, where
    /// single-component names get the `library/` prefix.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidReference` for empty names, upper-case
    /// repositories or malformed digests.
    pub fn parse(reference: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidReference {
            reference: reference.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty reference"));
        }

        let (name, digest) = match trimmed.split_once('@') {
            Some((name, digest)) => {
                let hex = digest
                    .strip_prefix("sha256:")
                    .ok_or_else(|| invalid("only sha256 digests are supported"))?;
                if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
                    return Err(invalid("digest must be 64 hex characters"));
                }
                (name, Some(digest.to_string()))
            }
            None => (trimmed, None),
        };

        // A ':' after the last '/' separates the tag; one before it is a port.
        let last_slash = name.rfind('/').map_or(0, |i| i + 1);
        let (name, tag) = match name[last_slash..].rfind(':') {
            Some(i) => {
                let split = last_slash + i;
                let tag = &name[split + 1..];
                if tag.is_empty() {
                    return Err(invalid("empty tag"));
                }
                (&name[..split], Some(tag.to_string()))
            }
            None => (name, None),
        };

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            _ => (DOCKER_HUB.to_string(), name.to_string()),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("empty repository path component"));
        }
        if repository.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid("repository must be lowercase"));
        }

        let repository = if registry == DOCKER_HUB && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };

        let tag = if tag.is_none() && digest.is_none() {
            Some("latest".to_string())
        } else {
            tag
        };

        Ok(Self {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Registry host as written (`docker.io` for Docker Hub).
    #[must_use]
    pub fn registry(&self) -> &str {
        &self.registry
    }

    /// Host serving the registry HTTP API.
    #[must_use]
    pub fn api_host(&self) -> &str {
        if self.registry == DOCKER_HUB {
            DOCKER_HUB_API
        } else {
            &self.registry
        }
    }

    /// Repository path (e.g. `library/nginx`).
    #[must_use]
    pub fn repository(&self) -> &str {
        &self.repository
    }

    /// Tag, if any.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Pinned digest, if any.
    #[must_use]
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    /// Manifest reference used in API paths; the digest wins over the tag.
    #[must_use]
    pub fn manifest_reference(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or("latest")
    }

    /// Name recorded in archives (`registry/repository:tag`).
    #[must_use]
    pub fn repo_tag(&self) -> String {
        format!(
            "{}/{}:{}",
            self.registry,
            self.repository,
            self.tag.as_deref().unwrap_or("latest")
        )
    }

    /// Directory name for this image inside the cache.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let reference = self.manifest_reference().replace(':', "-");
        crate::sanitize(&format!(
            "{}_{}_{}",
            self.registry,
            self.repository.replace('/', "_"),
            reference
        ))
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.registry, self.repository)?;
        if let Some(tag) = &self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(digest) = &self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl FromStr for ImageReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIGEST: &str = "sha256:0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_docker_hub_short_name() {
        let image = ImageReference::parse("nginx").unwrap();
        assert_eq!(image.registry(), "docker.io");
        assert_eq!(image.api_host(), "registry-1.docker.io");
        assert_eq!(image.repository(), "library/nginx");
        assert_eq!(image.tag(), Some("latest"));
        assert_eq!(image.to_string(), "docker.io/library/nginx:latest");
    }

    #[test]
    fn test_docker_hub_namespaced() {
        let image = ImageReference::parse("acme/agent:3.1").unwrap();
        assert_eq!(image.repository(), "acme/agent");
        assert_eq!(image.manifest_reference(), "3.1");
    }

    #[test]
    fn test_custom_registry_with_port() {
        let image = ImageReference::parse("registry.local:5000/fog/controller:1.0").unwrap();
        assert_eq!(image.registry(), "registry.local:5000");
        assert_eq!(image.api_host(), "registry.local:5000");
        assert_eq!(image.repository(), "fog/controller");
        assert_eq!(image.tag(), Some("1.0"));
    }

    #[test]
    fn test_localhost_registry() {
        let image = ImageReference::parse("localhost/agent").unwrap();
        assert_eq!(image.registry(), "localhost");
        assert_eq!(image.repository(), "agent");
    }

    #[test]
    fn test_digest_reference() {
        let image = ImageReference::parse(&format!("ghcr.io/acme/agent@{}", DIGEST)).unwrap();
        assert_eq!(image.tag(), None);
        assert_eq!(image.digest(), Some(DIGEST));
        assert_eq!(image.manifest_reference(), DIGEST);
    }

    #[test]
    fn test_invalid_references() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("nginx:").is_err());
        assert!(ImageReference::parse("Acme/Agent").is_err());
        assert!(ImageReference::parse("nginx@md5:abc").is_err());
        assert!(ImageReference::parse("nginx@sha256:abc").is_err());
        assert!(ImageReference::parse("ghcr.io//agent").is_err());
    }

    #[test]
    fn test_cache_key_is_path_safe() {
        let image = ImageReference::parse("registry.local:5000/fog/controller:1.0").unwrap();
        let key = image.cache_key();
        assert!(!key.contains('/'));
        assert!(!key.contains(':'));
        assert_eq!(key, "registry.local_5000_fog_controller_1.0");
    }
}
