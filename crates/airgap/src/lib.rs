//! # airgap
//!
//! Distribution of container images to edge agents that cannot reach a
//! registry themselves.
//!
//! The pipeline has three stages:
//! - **Fetch**: resolve an image for a platform and copy it from the registry
//!   into a single gzip-compressed archive loadable by docker and podman
//! - **Cache**: keep one archive per namespace, image and platform on disk and
//!   reuse it only while it still matches the registry and its own checksum
//! - **Transfer**: upload the archive to every agent over SSH and load it into
//!   the agent's container engine, with a bounded number of concurrent sessions
//!
//! ## Example
//!
//! ```no_run
//! use airgap::{
//!     ArtifactCache, CancelToken, ContainerEngine, Distributor, ImageReference,
//!     OciRegistry, Platform, SshConnector, SshTarget, TransferPlan,
//! };
//! use std::sync::Arc;
//!
//! let registry = Arc::new(OciRegistry::new());
//! let cache = ArtifactCache::new("/var/cache/fogctl", "default", registry);
//! let distributor = Distributor::new(cache, Arc::new(SshConnector::new()));
//!
//! let image = ImageReference::parse("ghcr.io/acme/agent:3.1").unwrap();
//! let plan = TransferPlan::new(
//!     "edge-1",
//!     SshTarget::new("10.0.0.5", "fog"),
//!     Platform::linux_arm64(),
//!     ContainerEngine::Docker,
//!     image,
//! );
//!
//! let summary = distributor.distribute(vec![plan], &CancelToken::new()).unwrap();
//! println!("{}", summary);
//! ```
//!
//! ## Testing
//!
//! [`MockRegistry`] and [`MockConnector`] stand in for the registry
//! and the SSH layer, so the cache and scheduler can be exercised offline.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod cancel;
pub mod distribute;
pub mod error;
pub mod fetch;
pub mod platform;
pub mod reference;
pub mod registry;
pub mod remote;
pub mod transfer;

pub use cache::{ArtifactCache, CacheEntry, CacheMetadata, ImageArtifact, Staleness};
pub use cancel::CancelToken;
pub use distribute::Distributor;
pub use error::{Error, ErrorCategory, Result};
pub use fetch::{FetchedArchive, Fetcher};
pub use platform::{ContainerEngine, Platform};
pub use reference::ImageReference;
pub use registry::oci::{Credentials, OciRegistry};
pub use registry::{MockRegistry, Registry};
pub use remote::{CommandOutput, Connector, MockConnector, RemoteSession, SshConnector, SshTarget};
pub use transfer::{TransferPlan, TransferResult, TransferScheduler, TransferSummary};

/// Make a string safe to use as a single path component.
///
/// ASCII alphanumerics, `.`, `-` and `_` are kept; everything else becomes `_`.
/// Leading dots are replaced so the result is never hidden or `..`.
#[must_use]
pub fn sanitize(value: &str) -> String {
    let mut out: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if out.starts_with('.') {
        out.replace_range(..1, "_");
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}
