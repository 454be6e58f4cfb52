//! On-disk artifact cache.
//!
//! Layout: `<root>/<namespace>/<artifact>/<platform>/{image.tar.gz, metadata.json}`.
//!
//! An entry is reused only if all of the following hold:
//! - the metadata names the same image and platform
//! - the stored digest equals the digest the registry reports right now
//! - the archive on disk has the recorded SHA-256
//! - the archive on disk has the recorded size
//!
//! Anything else is a stale entry: it is deleted and fetched again. Metadata
//! is written last, through a temp file and a rename, so a failed refresh
//! never leaves metadata describing an archive that is not there.
//!
//! Validation and refresh of an entry run under an exclusive `fs2` lock on
//! `<platform>/.lock`, so concurrent callers (threads or processes) fetch
//! once and the rest reuse the result.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::fetch::{ARCHIVE_NAME, Fetcher, checksum_file};
use crate::platform::Platform;
use crate::reference::ImageReference;
use crate::registry::Registry;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use walkdir::WalkDir;

/// File name of the metadata record.
pub const METADATA_NAME: &str = "metadata.json";

/// Per-entry lock file.
const LOCK_NAME: &str = ".lock";

/// Record stored next to every cached archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetadata {
    /// Image reference as requested.
    pub image: String,
    /// Manifest digest of the cached image.
    pub digest: String,
    /// Platform string (`os/arch[/variant]`).
    pub platform: String,
    /// Hex SHA-256 of `image.tar.gz`.
    pub tar_checksum: String,
    /// Size of `image.tar.gz` in bytes.
    pub tar_size: u64,
    /// When the archive was fetched.
    pub updated_at: DateTime<Utc>,
}

/// Why a cached entry cannot be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
    /// No metadata, or metadata that does not parse.
    NoMetadata,
    /// Metadata belongs to another image or platform.
    ImageMismatch,
    /// The registry now serves a different digest.
    DigestDrift {
        /// Digest in the metadata.
        stored: String,
        /// Digest the registry reports.
        live: String,
    },
    /// The archive file is gone.
    MissingArchive,
    /// Archive size differs from the metadata.
    SizeMismatch {
        /// Recorded size.
        expected: u64,
        /// Size on disk.
        actual: u64,
    },
    /// Archive hash differs from the metadata.
    ChecksumMismatch,
}

impl fmt::Display for Staleness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMetadata => write!(f, "no metadata"),
            Self::ImageMismatch => write!(f, "image/platform mismatch"),
            Self::DigestDrift { stored, live } => {
                write!(f, "digest drift ({} -> {})", stored, live)
            }
            Self::MissingArchive => write!(f, "missing archive"),
            Self::SizeMismatch { expected, actual } => {
                write!(f, "size mismatch ({} != {})", actual, expected)
            }
            Self::ChecksumMismatch => write!(f, "checksum mismatch"),
        }
    }
}

/// A local image archive ready for transfer.
///
/// Artifacts fetched in no-cache mode own a scratch directory, removed by
/// [`cleanup`](Self::cleanup) or when the artifact is dropped.
#[derive(Debug)]
pub struct ImageArtifact {
    /// Platform of the image.
    pub platform: Platform,
    /// Image reference.
    pub image: ImageReference,
    /// Manifest digest.
    pub digest: String,
    /// Path of `image.tar.gz`.
    pub path: PathBuf,
    /// Hex SHA-256 of the archive.
    pub checksum: String,
    /// Archive size in bytes.
    pub size: u64,
    scratch: Option<TempDir>,
}

impl ImageArtifact {
    /// Whether the archive lives in a scratch directory.
    #[must_use]
    pub fn is_ephemeral(&self) -> bool {
        self.scratch.is_some()
    }

    /// Remove the scratch directory now, if any.
    pub fn cleanup(&mut self) -> Result<()> {
        if let Some(dir) = self.scratch.take() {
            let path = dir.path().to_path_buf();
            dir.close().map_err(|e| Error::io(path, e))?;
        }
        Ok(())
    }
}

/// One entry found by [`entries`].
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Namespace directory.
    pub namespace: String,
    /// Artifact directory.
    pub artifact: String,
    /// Directory holding the archive and metadata.
    pub path: PathBuf,
    /// Parsed metadata.
    pub metadata: CacheMetadata,
}

/// Cache of image archives for one namespace.
pub struct ArtifactCache {
    root: PathBuf,
    namespace: String,
    fetcher: Fetcher,
    no_cache: bool,
}

impl ArtifactCache {
    /// Create a cache rooted at `root` for `namespace`.
    pub fn new(root: impl Into<PathBuf>, namespace: impl Into<String>, registry: Arc<dyn Registry>) -> Self {
        Self {
            root: root.into(),
            namespace: namespace.into(),
            fetcher: Fetcher::new(registry),
            no_cache: false,
        }
    }

    /// Bypass the cache and fetch into scratch directories.
    #[must_use]
    pub fn no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    /// Whether the cache is bypassed.
    #[must_use]
    pub fn is_bypassed(&self) -> bool {
        self.no_cache
    }

    /// Directory for an image and platform.
    #[must_use]
    pub fn entry_dir(&self, image: &ImageReference, platform: &Platform) -> PathBuf {
        self.root
            .join(crate::sanitize(&self.namespace))
            .join(image.cache_key())
            .join(platform.sanitized())
    }

    /// Return a valid archive for `image` on `platform`, fetching if needed.
    ///
    /// The live digest is resolved on every cached call, so a moved tag is
    /// noticed even when the cached archive is intact. In no-cache mode the
    /// digest comes from the fetch itself.
    pub fn ensure(
        &self,
        platform: &Platform,
        image: &ImageReference,
        cancel: &CancelToken,
    ) -> Result<ImageArtifact> {
        if self.no_cache {
            let scratch = tempfile::Builder::new()
                .prefix("fogctl-airgap-")
                .tempdir()
                .map_err(|e| Error::io(std::env::temp_dir(), e))?;
            let fetched = self.fetcher.fetch(image, platform, scratch.path(), cancel)?;
            log::info!("Fetched {} for {} (no cache)", image, platform);
            return Ok(ImageArtifact {
                platform: platform.clone(),
                image: image.clone(),
                digest: fetched.digest,
                path: fetched.path,
                checksum: fetched.checksum,
                size: fetched.size,
                scratch: Some(scratch),
            });
        }

        let dir = self.entry_dir(image, platform);
        let archive = dir.join(ARCHIVE_NAME);
        let metadata_path = dir.join(METADATA_NAME);
        let _lock = EntryLock::acquire(&dir)?;

        let live = self.fetcher.registry().resolve_digest(image, platform)?;
        match validate(&metadata_path, &archive, image, platform, &live) {
            Ok(metadata) => {
                log::info!("Using cached {} for {} ({})", image, platform, metadata.digest);
                return Ok(ImageArtifact {
                    platform: platform.clone(),
                    image: image.clone(),
                    digest: metadata.digest,
                    path: archive,
                    checksum: metadata.tar_checksum,
                    size: metadata.tar_size,
                    scratch: None,
                });
            }
            Err(reason) => {
                log::info!("Refreshing {} for {}: {}", image, platform, reason);
            }
        }

        // Metadata first: a crash in between leaves an orphan archive, never
        // metadata without an archive.
        remove_if_exists(&metadata_path)?;
        remove_if_exists(&archive)?;

        let fetched = self.fetcher.fetch(image, platform, &dir, cancel)?;
        if fetched.digest != live {
            log::debug!(
                "{} moved during fetch ({} -> {})",
                image,
                live,
                fetched.digest
            );
        }

        let metadata = CacheMetadata {
            image: image.to_string(),
            digest: fetched.digest.clone(),
            platform: platform.to_string(),
            tar_checksum: fetched.checksum.clone(),
            tar_size: fetched.size,
            updated_at: Utc::now(),
        };
        write_metadata(&metadata_path, &metadata)?;

        Ok(ImageArtifact {
            platform: platform.clone(),
            image: image.clone(),
            digest: fetched.digest,
            path: fetched.path,
            checksum: fetched.checksum,
            size: fetched.size,
            scratch: None,
        })
    }
}

/// Exclusive advisory lock on one cache entry, released on drop
struct EntryLock {
    file: fs::File,
}

impl EntryLock {
    fn acquire(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
        let path = dir.join(LOCK_NAME);
        let file = fs::File::create(&path).map_err(|e| Error::io(&path, e))?;
        file.lock_exclusive().map_err(|e| Error::io(&path, e))?;
        Ok(Self { file })
    }
}

impl Drop for EntryLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Check a cached entry against the live digest.
fn validate(
    metadata_path: &Path,
    archive: &Path,
    image: &ImageReference,
    platform: &Platform,
    live: &str,
) -> std::result::Result<CacheMetadata, Staleness> {
    let metadata = read_metadata(metadata_path).ok_or(Staleness::NoMetadata)?;

    if metadata.image != image.to_string() || metadata.platform != platform.to_string() {
        return Err(Staleness::ImageMismatch);
    }
    if metadata.digest != live {
        return Err(Staleness::DigestDrift {
            stored: metadata.digest,
            live: live.to_string(),
        });
    }

    let actual_size = match fs::metadata(archive) {
        Ok(m) => m.len(),
        Err(_) => return Err(Staleness::MissingArchive),
    };
    if actual_size != metadata.tar_size {
        return Err(Staleness::SizeMismatch {
            expected: metadata.tar_size,
            actual: actual_size,
        });
    }

    match checksum_file(archive) {
        Ok((checksum, _)) if checksum == metadata.tar_checksum => Ok(metadata),
        Ok(_) => Err(Staleness::ChecksumMismatch),
        Err(_) => Err(Staleness::MissingArchive),
    }
}

fn read_metadata(path: &Path) -> Option<CacheMetadata> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            log::debug!("Ignoring unreadable metadata {}: {}", path.display(), e);
            None
        }
    }
}

/// Write metadata through a temp file in the same directory, then rename.
fn write_metadata(path: &Path, metadata: &CacheMetadata) -> Result<()> {
    let content = serde_json::to_string_pretty(metadata)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| Error::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::io(path, e)
    })
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// List every valid-looking entry under a cache root.
///
/// Entries without parseable metadata are skipped.
pub fn entries(root: &Path) -> Result<Vec<CacheEntry>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(4)
        .max_depth(4)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && e.file_name() == METADATA_NAME)
    {
        let Some(dir) = entry.path().parent() else {
            continue;
        };
        let Some(metadata) = read_metadata(entry.path()) else {
            continue;
        };
        let mut components = dir
            .strip_prefix(root)
            .unwrap_or(dir)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned());
        let namespace = components.next().unwrap_or_default();
        let artifact = components.next().unwrap_or_default();

        found.push(CacheEntry {
            namespace,
            artifact,
            path: dir.to_path_buf(),
            metadata,
        });
    }
    Ok(found)
}

/// Delete all cached archives of a namespace.
///
/// Returns the number of bytes freed.
pub fn prune(root: &Path, namespace: &str) -> Result<u64> {
    let dir = root.join(crate::sanitize(namespace));
    if !dir.exists() {
        return Ok(0);
    }
    let freed = WalkDir::new(&dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum();
    fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    log::info!("Pruned cache for namespace {}", namespace);
    Ok(freed)
}
