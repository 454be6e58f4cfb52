//! Transfer scheduler.
//!
//! Every plan is an independent task: connect, create the staging
//! directory, upload the archive, load it into the container engine and
//! remove the remote copy. At most `pool_size` sessions are open at once.
//! One host failing never affects another; the outcome is always a
//! [`TransferSummary`].

use crate::cache::ImageArtifact;
use crate::error::{Error, Result};
use crate::fetch::ARCHIVE_NAME;
use crate::platform::{ContainerEngine, Platform};
use crate::reference::ImageReference;
use crate::remote::{Connector, RemoteSession, SshTarget, shell_quote};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::mpsc;

/// Remote directory under which per-target staging directories are created.
pub const REMOTE_STAGING_ROOT: &str = "/tmp/fogctl-airgap";

/// Default number of concurrent sessions.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// One image delivery to one host.
#[derive(Debug, Clone)]
pub struct TransferPlan {
    /// Name reported in the summary (usually the agent name).
    pub target: String,
    /// How to reach the host.
    pub ssh: SshTarget,
    /// Platform of the host.
    pub platform: Platform,
    /// Container engine on the host.
    pub engine: ContainerEngine,
    /// Image to deliver.
    pub image: ImageReference,
}

impl TransferPlan {
    /// Create a plan.
    pub fn new(
        target: impl Into<String>,
        ssh: SshTarget,
        platform: Platform,
        engine: ContainerEngine,
        image: ImageReference,
    ) -> Self {
        Self {
            target: target.into(),
            ssh,
            platform,
            engine,
            image,
        }
    }

    /// Remote staging directory for this target.
    ///
    /// Names changed by sanitizing get a short hash of the original, so
    /// `a/b` and `a_b` never share a directory.
    #[must_use]
    pub fn staging_dir(&self) -> String {
        let sanitized = crate::sanitize(&self.target);
        if sanitized == self.target {
            return format!("{}/{}", REMOTE_STAGING_ROOT, sanitized);
        }
        let hash = hex::encode(Sha256::digest(self.target.as_bytes()));
        format!("{}/{}-{}", REMOTE_STAGING_ROOT, sanitized, &hash[..8])
    }

    /// Whether the load command needs `sudo`.
    #[must_use]
    pub fn needs_sudo(&self) -> bool {
        self.engine == ContainerEngine::Docker && !self.ssh.is_root()
    }
}

/// Outcome of one plan.
#[derive(Debug)]
pub struct TransferResult {
    /// Plan target.
    pub target: String,
    /// Failure, if any.
    pub error: Option<Error>,
}

/// Success/failure partition of a batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    /// Targets that loaded the image.
    pub succeeded: Vec<String>,
    /// Targets that failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl TransferSummary {
    /// Record a result.
    pub fn push(&mut self, result: TransferResult) {
        match result.error {
            None => self.succeeded.push(result.target),
            Some(error) => self.failed.push((result.target, error.to_string())),
        }
    }

    /// Record a failure that happened before scheduling.
    pub fn push_failure(&mut self, target: impl Into<String>, error: &Error) {
        self.failed.push((target.into(), error.to_string()));
    }

    /// Merge another summary into this one.
    pub fn merge(&mut self, other: Self) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
    }

    /// Whether nothing failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Number of plans accounted for.
    #[must_use]
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Sort both lists by target for stable output.
    pub fn sort(&mut self) {
        self.succeeded.sort();
        self.failed.sort();
    }
}

impl fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed",
            self.succeeded.len(),
            self.failed.len()
        )
    }
}

/// Removes the uploaded archive and staging directory when dropped.
struct StagedArchive {
    session: Box<dyn RemoteSession>,
    target: String,
    cleanup: String,
}

impl StagedArchive {
    fn new(session: Box<dyn RemoteSession>, target: &str, dir: &str, file: &str) -> Self {
        Self {
            session,
            target: target.to_string(),
            cleanup: format!(
                "rm -f {}; rmdir {} 2>/dev/null || true",
                shell_quote(file),
                shell_quote(dir)
            ),
        }
    }

    fn session(&mut self) -> &mut dyn RemoteSession {
        self.session.as_mut()
    }
}

impl Drop for StagedArchive {
    fn drop(&mut self) {
        match self.session.run(&self.cleanup) {
            Ok(output) if output.success() => {}
            Ok(output) => log::debug!(
                "{}: cleanup exited {}: {}",
                self.target,
                output.status,
                output.stderr.trim()
            ),
            Err(e) => log::debug!("{}: cleanup failed: {}", self.target, e),
        }
    }
}

/// Bounded fan-out of transfer plans.
pub struct TransferScheduler {
    connector: Arc<dyn Connector>,
    pool_size: usize,
}

impl TransferScheduler {
    /// Create a scheduler with the default pool size.
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Change the number of concurrent sessions (minimum 1).
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    /// Number of concurrent sessions.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Run every plan and partition the results.
    ///
    /// Plans whose platform has no artifact fail individually. The only
    /// error returned is a failure to start the worker pool.
    pub fn run(
        &self,
        plans: &[TransferPlan],
        artifacts: &HashMap<Platform, ImageArtifact>,
    ) -> Result<TransferSummary> {
        let mut summary = TransferSummary::default();
        if plans.is_empty() {
            return Ok(summary);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.pool_size.min(plans.len()))
            .thread_name(|i| format!("airgap-transfer-{}", i))
            .build()
            .map_err(|e| Error::Other(format!("failed to start transfer pool: {}", e)))?;

        // One slot per plan: workers never wait on the collector
        let (tx, rx) = mpsc::sync_channel::<TransferResult>(plans.len());

        std::thread::scope(|s| {
            s.spawn(move || {
                pool.scope(|ps| {
                    for plan in plans {
                        let tx = tx.clone();
                        ps.spawn(move |_| {
                            let error = self.deliver(plan, artifacts.get(&plan.platform)).err();
                            let _ = tx.send(TransferResult {
                                target: plan.target.clone(),
                                error,
                            });
                        });
                    }
                });
                drop(tx);
            });

            for result in rx {
                match &result.error {
                    None => log::info!("{}: loaded image", result.target),
                    Some(e) => log::debug!("{}: transfer failed: {}", result.target, e),
                }
                summary.push(result);
            }
        });

        summary.sort();
        Ok(summary)
    }

    fn deliver(&self, plan: &TransferPlan, artifact: Option<&ImageArtifact>) -> Result<()> {
        let artifact = artifact.ok_or_else(|| Error::MissingArtifact(plan.platform.to_string()))?;

        let session = self.connector.connect(&plan.ssh)?;
        let dir = plan.staging_dir();
        let remote = format!("{}/{}", dir, ARCHIVE_NAME);
        let mut staged = StagedArchive::new(session, &plan.target, &dir, &remote);

        staged
            .session()
            .run(&format!("mkdir -p {}", shell_quote(&dir)))?
            .check(&plan.target, "mkdir")?;

        log::debug!(
            "{}: uploading {} ({} bytes)",
            plan.target,
            artifact.path.display(),
            artifact.size
        );
        staged.session().upload(&artifact.path, &remote)?;

        staged
            .session()
            .run(&plan.engine.load_command(&remote, plan.needs_sudo()))?
            .check(&plan.target, &format!("{} load", plan.engine))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ArtifactCache;
    use crate::cancel::CancelToken;
    use crate::registry::MockRegistry;
    use crate::remote::MockConnector;
    use std::time::Duration;

    struct Fixture {
        _temp: tempfile::TempDir,
        artifacts: HashMap<Platform, ImageArtifact>,
        image: ImageReference,
    }

    fn fixture(platforms: &[Platform]) -> Fixture {
        let temp = tempfile::tempdir().unwrap();
        let registry = MockRegistry::new();
        let image = ImageReference::parse("ghcr.io/acme/agent:3.1").unwrap();
        let cache = ArtifactCache::new(temp.path(), "default", Arc::new(registry.clone()));
        let mut artifacts = HashMap::new();
        for platform in platforms {
            registry.set_digest(&image, platform, "sha256:aaa");
            let artifact = cache.ensure(platform, &image, &CancelToken::new()).unwrap();
            artifacts.insert(platform.clone(), artifact);
        }
        Fixture {
            _temp: temp,
            artifacts,
            image,
        }
    }

    fn plan(f: &Fixture, host: &str, user: &str, engine: ContainerEngine) -> TransferPlan {
        TransferPlan::new(
            host,
            SshTarget::new(host, user),
            Platform::linux_arm64(),
            engine,
            f.image.clone(),
        )
    }

    #[test]
    fn test_one_unreachable_host_does_not_affect_others() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new();
        connector.set_unreachable("edge-3");
        let scheduler = TransferScheduler::new(Arc::new(connector.clone()));

        let plans: Vec<_> = (1..=4)
            .map(|i| plan(&f, &format!("edge-{i}"), "fog", ContainerEngine::Podman))
            .collect();
        let summary = scheduler.run(&plans, &f.artifacts).unwrap();

        assert_eq!(summary.succeeded, vec!["edge-1", "edge-2", "edge-4"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "edge-3");
        assert!(summary.failed[0].1.contains("Connection refused"));
        assert_eq!(summary.to_string(), "3 succeeded, 1 failed");
    }

    #[test]
    fn test_plan_steps_and_cleanup() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new();
        let scheduler = TransferScheduler::new(Arc::new(connector.clone()));

        let summary = scheduler
            .run(&[plan(&f, "edge-1", "fog", ContainerEngine::Podman)], &f.artifacts)
            .unwrap();
        assert!(summary.is_success());

        let commands = connector.commands_for("edge-1");
        assert_eq!(
            commands,
            vec![
                "mkdir -p '/tmp/fogctl-airgap/edge-1'".to_string(),
                "podman load -i '/tmp/fogctl-airgap/edge-1/image.tar.gz'".to_string(),
                "rm -f '/tmp/fogctl-airgap/edge-1/image.tar.gz'; rmdir '/tmp/fogctl-airgap/edge-1' 2>/dev/null || true".to_string(),
            ]
        );
    }

    #[test]
    fn test_cleanup_runs_after_failed_load() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new();
        connector.fail_command("edge-1", " load ");
        let scheduler = TransferScheduler::new(Arc::new(connector.clone()));

        let summary = scheduler
            .run(&[plan(&f, "edge-1", "fog", ContainerEngine::Podman)], &f.artifacts)
            .unwrap();
        assert_eq!(summary.failed.len(), 1);
        assert!(summary.failed[0].1.contains("podman load failed"));

        let commands = connector.commands_for("edge-1");
        assert!(commands.last().unwrap().starts_with("rm -f "));
    }

    #[test]
    fn test_sudo_only_for_non_root_docker() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new();
        let scheduler = TransferScheduler::new(Arc::new(connector.clone()));

        let plans = vec![
            plan(&f, "docker-user", "fog", ContainerEngine::Docker),
            plan(&f, "docker-root", "root", ContainerEngine::Docker),
            plan(&f, "podman-user", "fog", ContainerEngine::Podman),
        ];
        scheduler.run(&plans, &f.artifacts).unwrap();

        let load = |host: &str| {
            connector
                .commands_for(host)
                .into_iter()
                .find(|c| c.contains(" load "))
                .unwrap()
        };
        assert!(load("docker-user").starts_with("sudo -n docker load"));
        assert!(load("docker-root").starts_with("docker load"));
        assert!(load("podman-user").starts_with("podman load"));
    }

    #[test]
    fn test_missing_artifact_is_per_plan_failure() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new();
        let scheduler = TransferScheduler::new(Arc::new(connector.clone()));

        let mut amd = plan(&f, "edge-amd", "fog", ContainerEngine::Docker);
        amd.platform = Platform::linux_amd64();
        let plans = vec![amd, plan(&f, "edge-arm", "fog", ContainerEngine::Docker)];

        let summary = scheduler.run(&plans, &f.artifacts).unwrap();
        assert_eq!(summary.succeeded, vec!["edge-arm"]);
        assert_eq!(summary.failed[0].0, "edge-amd");
        assert!(summary.failed[0].1.contains("linux/amd64"));
        assert!(connector.commands_for("edge-amd").is_empty());
    }

    #[test]
    fn test_pool_size_bounds_open_sessions() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new().with_delay(Duration::from_millis(20));
        let scheduler = TransferScheduler::new(Arc::new(connector.clone())).with_pool_size(2);

        let plans: Vec<_> = (0..8)
            .map(|i| plan(&f, &format!("edge-{i}"), "fog", ContainerEngine::Podman))
            .collect();
        let summary = scheduler.run(&plans, &f.artifacts).unwrap();

        assert_eq!(summary.succeeded.len(), 8);
        assert!(connector.peak_sessions() <= 2);
        assert!(connector.peak_sessions() >= 1);
    }

    #[test]
    fn test_staging_dir_is_sanitized() {
        let f = fixture(&[]);
        let odd = plan(&f, "edge 1/../x", "fog", ContainerEngine::Docker).staging_dir();
        assert!(odd.starts_with("/tmp/fogctl-airgap/edge_1_.._x-"));
        assert!(!odd[REMOTE_STAGING_ROOT.len() + 1..].contains('/'));

        let plain = plan(&f, "edge-1", "fog", ContainerEngine::Docker);
        assert_eq!(plain.staging_dir(), "/tmp/fogctl-airgap/edge-1");
    }

    #[test]
    fn test_distinct_targets_never_share_staging_dir() {
        let f = fixture(&[]);
        let slash = plan(&f, "a/b", "fog", ContainerEngine::Docker).staging_dir();
        let underscore = plan(&f, "a_b", "fog", ContainerEngine::Docker).staging_dir();
        let space = plan(&f, "a b", "fog", ContainerEngine::Docker).staging_dir();
        assert_eq!(underscore, "/tmp/fogctl-airgap/a_b");
        assert_ne!(slash, underscore);
        assert_ne!(slash, space);
        assert_ne!(space, underscore);
    }

    #[test]
    fn test_more_plans_than_workers_all_report() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new().with_delay(Duration::from_millis(5));
        let scheduler = TransferScheduler::new(Arc::new(connector.clone())).with_pool_size(1);

        let plans: Vec<_> = (0..6)
            .map(|i| plan(&f, &format!("edge-{i}"), "fog", ContainerEngine::Podman))
            .collect();
        let summary = scheduler.run(&plans, &f.artifacts).unwrap();

        assert_eq!(summary.total(), 6);
        assert_eq!(summary.succeeded.len(), 6);
        assert_eq!(connector.peak_sessions(), 1);
    }

    #[test]
    fn test_one_failed_load_in_batch() {
        let f = fixture(&[Platform::linux_arm64()]);
        let connector = MockConnector::new();
        connector.fail_command("edge-2", " load ");
        let scheduler = TransferScheduler::new(Arc::new(connector.clone()));

        let plans: Vec<_> = (1..=4)
            .map(|i| plan(&f, &format!("edge-{i}"), "fog", ContainerEngine::Podman))
            .collect();
        let summary = scheduler.run(&plans, &f.artifacts).unwrap();

        assert_eq!(summary.succeeded, vec!["edge-1", "edge-3", "edge-4"]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, "edge-2");
        assert_eq!(summary.to_string(), "3 succeeded, 1 failed");

        for i in 1..=4 {
            let host = format!("edge-{i}");
            let cleanup = format!("rm -f '/tmp/fogctl-airgap/{host}/image.tar.gz'");
            let commands = connector.commands_for(&host);
            assert!(
                commands.last().unwrap().starts_with(&cleanup),
                "{host}: {commands:?}"
            );
        }
    }

    #[test]
    fn test_empty_plan_list() {
        let f = fixture(&[]);
        let scheduler = TransferScheduler::new(Arc::new(MockConnector::new()));
        let summary = scheduler.run(&[], &f.artifacts).unwrap();
        assert_eq!(summary.total(), 0);
    }
}
