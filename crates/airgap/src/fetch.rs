//! Registry-to-archive fetcher.
//!
//! Pulls an image into `image.tar`, recompresses it to `image.tar.gz` and
//! measures the result. The intermediate tar never outlives the call, and a
//! failed fetch leaves no partial archive behind.

use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::reference::ImageReference;
use crate::registry::Registry;
use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File name of the compressed archive.
pub const ARCHIVE_NAME: &str = "image.tar.gz";

/// File name of the intermediate, uncompressed archive.
const INTERMEDIATE_NAME: &str = "image.tar";

/// A freshly fetched, compressed image archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedArchive {
    /// Path of `image.tar.gz`.
    pub path: PathBuf,
    /// Manifest digest that was copied.
    pub digest: String,
    /// Hex SHA-256 of the compressed archive.
    pub checksum: String,
    /// Size of the compressed archive in bytes.
    pub size: u64,
}

/// Removes a file when dropped unless disarmed.
struct RemoveOnDrop {
    path: PathBuf,
    armed: bool,
}

impl RemoveOnDrop {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    log::debug!("Failed to remove {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

/// Fetches images through a [`Registry`].
#[derive(Clone)]
pub struct Fetcher {
    registry: Arc<dyn Registry>,
}

impl Fetcher {
    /// Create a fetcher over a registry.
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self { registry }
    }

    /// The underlying registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    /// Fetch `image` for `platform` into `dir/image.tar.gz`.
    ///
    /// Registry errors are returned unchanged. On any error the compressed
    /// archive is removed; the intermediate tar is removed on every path.
    pub fn fetch(
        &self,
        image: &ImageReference,
        platform: &Platform,
        dir: &Path,
        cancel: &CancelToken,
    ) -> Result<FetchedArchive> {
        fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;

        let tar_path = dir.join(INTERMEDIATE_NAME);
        let archive_path = dir.join(ARCHIVE_NAME);
        let _intermediate = RemoveOnDrop::new(tar_path.clone());
        let mut archive_guard = RemoveOnDrop::new(archive_path.clone());

        log::debug!("Fetching {} for {} into {}", image, platform, dir.display());
        let digest = self.registry.pull(image, platform, &tar_path, cancel)?;
        cancel.check()?;

        compress(&tar_path, &archive_path)?;
        let (checksum, size) = checksum_file(&archive_path)?;

        archive_guard.disarm();
        Ok(FetchedArchive {
            path: archive_path,
            digest,
            checksum,
            size,
        })
    }
}

/// Gzip `source` into `dest`.
fn compress(source: &Path, dest: &Path) -> Result<()> {
    let input = File::open(source).map_err(|e| Error::io(source, e))?;
    let output = File::create(dest).map_err(|e| Error::io(dest, e))?;

    let mut encoder = GzEncoder::new(BufWriter::new(output), Compression::default());
    io::copy(&mut BufReader::new(input), &mut encoder).map_err(|e| Error::io(dest, e))?;
    let mut writer = encoder.finish().map_err(|e| Error::io(dest, e))?;
    writer.flush().map_err(|e| Error::io(dest, e))?;
    Ok(())
}

/// Hex SHA-256 and byte size of a file.
pub fn checksum_file(path: &Path) -> Result<(String, u64)> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader.read(&mut buffer).map_err(|e| Error::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        size += n as u64;
    }
    Ok((hex::encode(hasher.finalize()), size))
}
