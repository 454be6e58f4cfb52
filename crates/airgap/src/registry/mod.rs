//! Registry trait and implementations.
//!
//! [`oci::OciRegistry`] talks to any OCI distribution registry over HTTPS.
//! [`MockRegistry`] keeps digests in memory and writes small fake archives,
//! which is what the cache and distribution tests run against.
//!
//! ```
//! use airgap::{ImageReference, MockRegistry, Platform, Registry};
//!
//! let registry = MockRegistry::new();
//! let image = ImageReference::parse("nginx:1.25").unwrap();
//! registry.set_digest(&image, &Platform::linux_amd64(), "sha256:aaa");
//!
//! let digest = registry.resolve_digest(&image, &Platform::linux_amd64()).unwrap();
//! assert_eq!(digest, "sha256:aaa");
//! ```

pub mod oci;

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::reference::ImageReference;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Source of container images.
pub trait Registry: Send + Sync {
    /// Resolve the manifest digest of `image` for `platform`.
    ///
    /// Multi-platform images are narrowed to the platform's own manifest
    /// before the digest is taken.
    fn resolve_digest(&self, image: &ImageReference, platform: &Platform) -> Result<String>;

    /// Copy the full image into an uncompressed archive at `dest`.
    ///
    /// Returns the digest of the manifest that was copied. Cancellation is
    /// checked between blobs. On error `dest` may hold a partial file which
    /// the caller removes.
    fn pull(
        &self,
        image: &ImageReference,
        platform: &Platform,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<String>;
}

/// In-memory registry for tests.
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    digests: Arc<Mutex<HashMap<(String, Platform), String>>>,
    resolves: Arc<AtomicUsize>,
    pulls: Arc<AtomicUsize>,
    fail_pulls: Arc<AtomicBool>,
    pull_delay: Arc<Mutex<Duration>>,
}

impl MockRegistry {
    /// Create an empty mock registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `digest` for an image and platform, replacing any previous one.
    pub fn set_digest(&self, image: &ImageReference, platform: &Platform, digest: &str) {
        let mut digests = self.digests.lock().unwrap();
        digests.insert((image.to_string(), platform.clone()), digest.to_string());
    }

    /// Make every following pull fail with a network error.
    pub fn fail_pulls(&self, fail: bool) {
        self.fail_pulls.store(fail, Ordering::SeqCst);
    }

    /// Sleep this long inside every pull, like a slow network would.
    pub fn set_pull_delay(&self, delay: Duration) {
        *self.pull_delay.lock().unwrap() = delay;
    }

    /// Number of digest resolutions so far.
    #[must_use]
    pub fn resolve_count(&self) -> usize {
        self.resolves.load(Ordering::SeqCst)
    }

    /// Number of pulls so far.
    #[must_use]
    pub fn pull_count(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }

    fn lookup(&self, image: &ImageReference, platform: &Platform) -> Result<String> {
        let digests = self.digests.lock().unwrap();
        digests
            .get(&(image.to_string(), platform.clone()))
            .cloned()
            .ok_or_else(|| Error::PlatformNotFound {
                image: image.to_string(),
                platform: platform.to_string(),
            })
    }
}

impl Registry for MockRegistry {
    fn resolve_digest(&self, image: &ImageReference, platform: &Platform) -> Result<String> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        self.lookup(image, platform)
    }

    fn pull(
        &self,
        image: &ImageReference,
        platform: &Platform,
        dest: &Path,
        cancel: &CancelToken,
    ) -> Result<String> {
        self.pulls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.pull_delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        cancel.check()?;
        if self.fail_pulls.load(Ordering::SeqCst) {
            return Err(Error::http("connection reset by peer", None));
        }
        let digest = self.lookup(image, platform)?;

        // A one-entry archive whose content depends on the digest
        let file = File::create(dest).map_err(|e| Error::io(dest, e))?;
        let mut builder = tar::Builder::new(file);
        let content = format!("{} {} {}\n", image, platform, digest);
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "manifest.json", content.as_bytes())
            .map_err(|e| Error::io(dest, e))?;
        builder.finish().map_err(|e| Error::io(dest, e))?;

        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nginx() -> ImageReference {
        ImageReference::parse("nginx:1.25").unwrap()
    }

    #[test]
    fn test_unknown_image_is_not_found() {
        let registry = MockRegistry::new();
        let err = registry
            .resolve_digest(&nginx(), &Platform::linux_amd64())
            .unwrap_err();
        assert!(matches!(err, Error::PlatformNotFound { .. }));
        assert_eq!(registry.resolve_count(), 1);
    }

    #[test]
    fn test_pull_writes_archive() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("image.tar");
        let registry = MockRegistry::new();
        registry.set_digest(&nginx(), &Platform::linux_arm64(), "sha256:aaa");

        let digest = registry
            .pull(&nginx(), &Platform::linux_arm64(), &dest, &CancelToken::new())
            .unwrap();
        assert_eq!(digest, "sha256:aaa");
        assert!(dest.metadata().unwrap().len() > 0);
        assert_eq!(registry.pull_count(), 1);
    }

    #[test]
    fn test_pull_respects_cancel_and_failure_switch() {
        let temp = tempfile::tempdir().unwrap();
        let dest = temp.path().join("image.tar");
        let registry = MockRegistry::new();
        registry.set_digest(&nginx(), &Platform::linux_amd64(), "sha256:aaa");

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = registry
            .pull(&nginx(), &Platform::linux_amd64(), &dest, &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));

        registry.fail_pulls(true);
        let err = registry
            .pull(&nginx(), &Platform::linux_amd64(), &dest, &CancelToken::new())
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
