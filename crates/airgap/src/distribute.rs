//! End-to-end image distribution.
//!
//! Plans are grouped by platform, one artifact is ensured per platform and
//! every plan is then handed to the [`TransferScheduler`]. Used by both the
//! generic push command and agent bootstrap.

use crate::cache::{ArtifactCache, ImageArtifact};
use crate::cancel::CancelToken;
use crate::error::{Error, Result};
use crate::platform::Platform;
use crate::reference::ImageReference;
use crate::remote::Connector;
use crate::transfer::{TransferPlan, TransferScheduler, TransferSummary};
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Fetch-once, deliver-many pipeline.
pub struct Distributor {
    cache: ArtifactCache,
    scheduler: TransferScheduler,
}

impl Distributor {
    /// Create a distributor with the default transfer pool size.
    pub fn new(cache: ArtifactCache, connector: Arc<dyn Connector>) -> Self {
        Self {
            cache,
            scheduler: TransferScheduler::new(connector),
        }
    }

    /// Change the number of concurrent SSH sessions.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.scheduler = self.scheduler.with_pool_size(pool_size);
        self
    }

    /// The artifact cache.
    #[must_use]
    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// Deliver every plan.
    ///
    /// Fails outright only for input errors (two images requested for the
    /// same platform), cancellation, or a transfer pool that cannot start.
    /// A platform whose fetch fails fails each of its plans; other platforms
    /// proceed.
    pub fn distribute(&self, plans: Vec<TransferPlan>, cancel: &CancelToken) -> Result<TransferSummary> {
        let wanted = images_by_platform(&plans)?;
        log::info!(
            "Distributing to {} target(s) across {} platform(s)",
            plans.len(),
            wanted.len()
        );

        let fetched: Vec<(Platform, Result<ImageArtifact>)> = wanted
            .into_par_iter()
            .map(|(platform, image)| {
                let artifact = self
                    .cache
                    .ensure(&platform, &image, cancel)
                    .map_err(|e| match e {
                        Error::Cancelled => Error::Cancelled,
                        other => Error::artifact(image.to_string(), &platform, other),
                    });
                (platform, artifact)
            })
            .collect();

        let mut artifacts = HashMap::new();
        let mut fetch_errors = HashMap::new();
        for (platform, result) in fetched {
            match result {
                Ok(artifact) => {
                    artifacts.insert(platform, artifact);
                }
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    log::debug!("Fetch failed for {}: {}", platform, e);
                    fetch_errors.insert(platform, e);
                }
            }
        }

        let mut summary = TransferSummary::default();
        let mut ready = Vec::with_capacity(plans.len());
        for plan in plans {
            match fetch_errors.get(&plan.platform) {
                Some(error) => summary.push_failure(plan.target, error),
                None => ready.push(plan),
            }
        }

        summary.merge(self.scheduler.run(&ready, &artifacts)?);
        summary.sort();

        for (platform, mut artifact) in artifacts {
            if let Err(e) = artifact.cleanup() {
                log::warn!("Failed to remove scratch files for {}: {}", platform, e);
            }
        }

        Ok(summary)
    }
}

/// One image per platform; a second, different image is an input error.
fn images_by_platform(plans: &[TransferPlan]) -> Result<BTreeMap<Platform, ImageReference>> {
    let mut wanted: BTreeMap<Platform, ImageReference> = BTreeMap::new();
    for plan in plans {
        match wanted.get(&plan.platform) {
            Some(existing) if *existing != plan.image => {
                return Err(Error::ConflictingImages {
                    platform: plan.platform.to_string(),
                    first: existing.to_string(),
                    second: plan.image.to_string(),
                });
            }
            Some(_) => {}
            None => {
                wanted.insert(plan.platform.clone(), plan.image.clone());
            }
        }
    }
    Ok(wanted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ContainerEngine;
    use crate::registry::MockRegistry;
    use crate::remote::{MockConnector, SshTarget};

    struct Fixture {
        temp: tempfile::TempDir,
        registry: MockRegistry,
        connector: MockConnector,
        image: ImageReference,
    }

    fn fixture() -> Fixture {
        let registry = MockRegistry::new();
        let image = ImageReference::parse("ghcr.io/acme/agent:3.1").unwrap();
        registry.set_digest(&image, &Platform::linux_arm64(), "sha256:aaa");
        registry.set_digest(&image, &Platform::linux_amd64(), "sha256:ccc");
        Fixture {
            temp: tempfile::tempdir().unwrap(),
            registry,
            connector: MockConnector::new(),
            image,
        }
    }

    impl Fixture {
        fn distributor(&self, no_cache: bool) -> Distributor {
            let cache = ArtifactCache::new(
                self.temp.path(),
                "default",
                Arc::new(self.registry.clone()),
            )
            .no_cache(no_cache);
            Distributor::new(cache, Arc::new(self.connector.clone()))
        }

        fn plan(&self, host: &str, platform: Platform) -> TransferPlan {
            TransferPlan::new(
                host,
                SshTarget::new(host, "fog"),
                platform,
                ContainerEngine::Podman,
                self.image.clone(),
            )
        }

        fn loads(&self) -> usize {
            self.connector
                .events()
                .iter()
                .filter(|e| matches!(e, crate::remote::MockEvent::Run { command, .. } if command.contains(" load ")))
                .count()
        }
    }

    #[test]
    fn test_fan_out_fetches_once_and_loads_everywhere() {
        let f = fixture();
        let plans = vec![
            f.plan("edge-1", Platform::linux_arm64()),
            f.plan("edge-2", Platform::linux_arm64()),
            f.plan("edge-3", Platform::linux_arm64()),
        ];

        let summary = f
            .distributor(false)
            .distribute(plans, &CancelToken::new())
            .unwrap();

        assert_eq!(summary.succeeded, vec!["edge-1", "edge-2", "edge-3"]);
        assert_eq!(f.registry.pull_count(), 1);
        assert_eq!(f.loads(), 3);
    }

    #[test]
    fn test_one_fetch_per_platform() {
        let f = fixture();
        let plans = vec![
            f.plan("amd-1", Platform::linux_amd64()),
            f.plan("amd-2", Platform::linux_amd64()),
            f.plan("arm-1", Platform::linux_arm64()),
        ];

        let summary = f
            .distributor(false)
            .distribute(plans, &CancelToken::new())
            .unwrap();
        assert!(summary.is_success());
        assert_eq!(f.registry.pull_count(), 2);
    }

    #[test]
    fn test_conflicting_images_rejected_before_any_work() {
        let f = fixture();
        let mut other = f.plan("edge-2", Platform::linux_arm64());
        other.image = ImageReference::parse("ghcr.io/acme/agent:3.2").unwrap();
        let plans = vec![f.plan("edge-1", Platform::linux_arm64()), other];

        let err = f
            .distributor(false)
            .distribute(plans, &CancelToken::new())
            .unwrap_err();
        assert!(err.is_input());
        assert_eq!(f.registry.resolve_count(), 0);
        assert!(f.connector.events().is_empty());
    }

    #[test]
    fn test_fetch_failure_fails_only_that_platform() {
        let f = fixture();
        let riscv = Platform::new("linux", "riscv64");
        let plans = vec![
            f.plan("arm-1", Platform::linux_arm64()),
            f.plan("riscv-1", riscv),
        ];

        let summary = f
            .distributor(false)
            .distribute(plans, &CancelToken::new())
            .unwrap();
        assert_eq!(summary.succeeded, vec!["arm-1"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "riscv-1");
        assert!(summary.failed[0].1.contains("linux/riscv64"));
        assert!(summary.failed[0].1.contains("ghcr.io/acme/agent:3.1"));
    }

    #[test]
    fn test_cancelled_distribution() {
        let f = fixture();
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = f
            .distributor(false)
            .distribute(vec![f.plan("edge-1", Platform::linux_arm64())], &cancel)
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(f.connector.events().is_empty());
    }

    #[test]
    fn test_no_cache_leaves_no_files() {
        let f = fixture();
        let summary = f
            .distributor(true)
            .distribute(
                vec![f.plan("edge-1", Platform::linux_arm64())],
                &CancelToken::new(),
            )
            .unwrap();
        assert!(summary.is_success());
        assert!(crate::cache::entries(f.temp.path()).unwrap().is_empty());
    }
}
