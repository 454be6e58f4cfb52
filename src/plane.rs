//! Control-plane backends
//!
//! A namespace owns at most one control plane. The variant is fixed when the
//! plane is first deployed and is dispatched once through [`ControlPlane`];
//! callers never re-inspect the backend per call.

use crate::paths;
use crate::runner::{CommandRunner, args};
use airgap::remote::shell_quote;
use airgap::{Connector, Platform, SshTarget};
use anyhow::{Context, Result, bail};
use executor::NotFound;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Port the Controller API listens on inside its container
pub const CONTROLLER_PORT: u16 = 51121;

pub const DEFAULT_CONTROLLER_IMAGE: &str = "ghcr.io/fogctl/controller:3";

const CONTROLLER_CONTAINER: &str = "fogctl-controller";
const K8S_DEPLOYMENT: &str = "fogctl-controller";

/// How to reach a host over SSH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SshSpec {
    pub user: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl SshSpec {
    pub fn target(&self, host: &str) -> SshTarget {
        let target = SshTarget::new(host, &self.user).with_port(self.port);
        match &self.key_file {
            Some(key) => target.with_key_file(paths::expand(key)),
            None => target,
        }
    }
}

/// Controller account created on install and used for API sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IofogUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub surname: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemoteControllerSpec {
    #[serde(default)]
    pub name: String,
    pub host: String,
    pub ssh: SshSpec,
    #[serde(default = "default_controller_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Ship the image over SSH instead of letting the host pull it
    #[serde(default)]
    pub airgap: bool,
    /// Host platform, e.g. `linux/arm64` (default `linux/amd64`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

fn default_controller_port() -> u16 {
    CONTROLLER_PORT
}

impl RemoteControllerSpec {
    pub fn image(&self) -> &str {
        self.image.as_deref().unwrap_or(DEFAULT_CONTROLLER_IMAGE)
    }

    pub fn platform(&self) -> Result<Platform> {
        match &self.platform {
            Some(value) => Ok(Platform::parse(value)?),
            None => Ok(Platform::linux_amd64()),
        }
    }

    fn install(&self, connector: &dyn Connector) -> Result<()> {
        let target = self.ssh.target(&self.host);
        let sudo = if target.is_root() { "" } else { "sudo -n " };
        let pull = if self.airgap { "--pull=never " } else { "" };
        let command = format!(
            "{sudo}docker rm -f {name} >/dev/null 2>&1; {sudo}docker run -d --restart=always --name {name} -p {port}:{inner} {pull}{image}",
            name = CONTROLLER_CONTAINER,
            port = self.port,
            inner = CONTROLLER_PORT,
            image = shell_quote(self.image()),
        );

        log::info!("Installing controller {} on {}", self.name, target);
        let mut session = connector.connect(&target)?;
        session.run(&command)?.check(&self.name, "controller install")?;
        Ok(())
    }

    fn uninstall(&self, connector: &dyn Connector) -> Result<()> {
        let target = self.ssh.target(&self.host);
        let sudo = if target.is_root() { "" } else { "sudo -n " };
        log::info!("Removing controller {} from {}", self.name, target);
        let mut session = connector.connect(&target)?;
        session
            .run(&format!("{}docker rm -f {}", sudo, CONTROLLER_CONTAINER))?
            .check(&self.name, "controller removal")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalControllerSpec {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default = "default_controller_port")]
    pub port: u16,
}

impl LocalControllerSpec {
    fn install(&self, runner: &dyn CommandRunner) -> Result<()> {
        let image = self.image.as_deref().unwrap_or(DEFAULT_CONTROLLER_IMAGE);
        // Absent container is fine
        let _ = runner.run_capture("docker", &args(["rm", "-f", CONTROLLER_CONTAINER]));
        runner
            .run_capture(
                "docker",
                &args([
                    "run".to_string(),
                    "-d".to_string(),
                    "--name".to_string(),
                    CONTROLLER_CONTAINER.to_string(),
                    "-p".to_string(),
                    format!("{}:{}", self.port, CONTROLLER_PORT),
                    image.to_string(),
                ]),
            )
            .with_context(|| format!("Failed to start local controller {}", self.name))?;
        Ok(())
    }

    fn uninstall(&self, runner: &dyn CommandRunner) -> Result<()> {
        runner
            .run_capture("docker", &args(["rm", "-f", CONTROLLER_CONTAINER]))
            .with_context(|| format!("Failed to remove local controller {}", self.name))?;
        Ok(())
    }
}

/// A controller to add to (or update in) an existing plane
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerSpec {
    Remote(RemoteControllerSpec),
    Local(LocalControllerSpec),
}

impl ControllerSpec {
    pub fn name(&self) -> &str {
        match self {
            Self::Remote(spec) => &spec.name,
            Self::Local(spec) => &spec.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KubernetesPlane {
    pub iofog_user: IofogUser,
    pub kube_config: String,
    #[serde(default = "default_k8s_namespace")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default = "default_replicas")]
    pub replicas: u32,
    /// Load balancer address, filled in after install
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

fn default_k8s_namespace() -> String {
    "fogctl".to_string()
}

fn default_replicas() -> u32 {
    1
}

impl KubernetesPlane {
    fn kubectl(&self, rest: &[&str]) -> Vec<String> {
        let mut out = args([
            "--kubeconfig",
            self.kube_config.as_str(),
            "-n",
            self.namespace.as_str(),
        ]);
        out.extend(rest.iter().map(|s| (*s).to_string()));
        out
    }

    fn install(&mut self, runner: &dyn CommandRunner, poll: &controller::RetryConfig) -> Result<()> {
        let image = self
            .image
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTROLLER_IMAGE.to_string());
        let image_flag = format!("--image={}", image);
        let replicas = format!("--replicas={}", self.replicas);
        let port = format!("--port={}", CONTROLLER_PORT);

        if let Err(e) = runner.run_capture("kubectl", &self.kubectl(&["create", "namespace", self.namespace.as_str()])) {
            if !e.to_string().contains("AlreadyExists") {
                return Err(e.context("Failed to create Kubernetes namespace"));
            }
        }
        runner.run_capture(
            "kubectl",
            &self.kubectl(&["delete", "deployment", K8S_DEPLOYMENT, "--ignore-not-found"]),
        )?;
        runner
            .run_capture(
                "kubectl",
                &self.kubectl(&[
                    "create",
                    "deployment",
                    K8S_DEPLOYMENT,
                    image_flag.as_str(),
                    replicas.as_str(),
                    port.as_str(),
                ]),
            )
            .context("Failed to create controller deployment")?;
        if let Err(e) = runner.run_capture(
            "kubectl",
            &self.kubectl(&[
                "expose",
                "deployment",
                K8S_DEPLOYMENT,
                "--type=LoadBalancer",
                port.as_str(),
            ]),
        ) {
            if !e.to_string().contains("AlreadyExists") {
                return Err(e.context("Failed to expose controller deployment"));
            }
        }

        let query = self.kubectl(&[
            "get",
            "service",
            K8S_DEPLOYMENT,
            "-o",
            "jsonpath={.status.loadBalancer.ingress[0].ip}",
        ]);
        for attempt in 0..poll.max_attempts.max(1) {
            let ip = runner.run_capture("kubectl", &query)?;
            if !ip.is_empty() {
                self.endpoint = Some(format!("http://{}:{}", ip, CONTROLLER_PORT));
                return Ok(());
            }
            log::debug!("Load balancer has no address yet (attempt {})", attempt + 1);
            std::thread::sleep(poll.delay_for_attempt(attempt).min(Duration::from_secs(10)));
        }
        bail!(
            "Kubernetes service {} never received a load balancer address",
            K8S_DEPLOYMENT
        )
    }

    fn uninstall(&self, runner: &dyn CommandRunner) -> Result<()> {
        runner
            .run_capture(
                "kubectl",
                &args([
                    "--kubeconfig",
                    self.kube_config.as_str(),
                    "delete",
                    "namespace",
                    self.namespace.as_str(),
                    "--ignore-not-found",
                ]),
            )
            .context("Failed to delete Kubernetes namespace")?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemotePlane {
    pub iofog_user: IofogUser,
    #[serde(default)]
    pub controllers: Vec<RemoteControllerSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalPlane {
    pub iofog_user: IofogUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<LocalControllerSpec>,
}

/// What a backend may touch
#[derive(Clone, Copy)]
pub struct Backends<'a> {
    pub connector: &'a dyn Connector,
    pub runner: &'a dyn CommandRunner,
    pub poll: &'a controller::RetryConfig,
}

/// The control plane of a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlPlane {
    Kubernetes(KubernetesPlane),
    Remote(RemotePlane),
    Local(LocalPlane),
}

impl ControlPlane {
    /// Resource kind this plane is declared with
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Kubernetes(_) => "KubernetesControlPlane",
            Self::Remote(_) => "RemoteControlPlane",
            Self::Local(_) => "LocalControlPlane",
        }
    }

    pub fn user(&self) -> &IofogUser {
        match self {
            Self::Kubernetes(plane) => &plane.iofog_user,
            Self::Remote(plane) => &plane.iofog_user,
            Self::Local(plane) => &plane.iofog_user,
        }
    }

    /// Controller API base URL
    pub fn endpoint(&self) -> Result<String> {
        match self {
            Self::Kubernetes(plane) => plane
                .endpoint
                .clone()
                .context("Kubernetes control plane has no endpoint yet"),
            Self::Remote(plane) => plane
                .controllers
                .first()
                .map(|c| format!("http://{}:{}", c.host, c.port))
                .context("Remote control plane has no controllers"),
            Self::Local(plane) => plane
                .controller
                .as_ref()
                .map(|c| format!("http://localhost:{}", c.port))
                .context("Local control plane has no controller"),
        }
    }

    /// Names of the controllers this plane runs
    pub fn controller_names(&self) -> Vec<String> {
        match self {
            Self::Kubernetes(_) => vec![K8S_DEPLOYMENT.to_string()],
            Self::Remote(plane) => plane.controllers.iter().map(|c| c.name.clone()).collect(),
            Self::Local(plane) => plane.controller.iter().map(|c| c.name.clone()).collect(),
        }
    }

    /// Remote controllers that want their image shipped over SSH
    pub fn airgap_controllers(&self) -> Vec<&RemoteControllerSpec> {
        match self {
            Self::Remote(plane) => plane.controllers.iter().filter(|c| c.airgap).collect(),
            _ => Vec::new(),
        }
    }

    /// Install every controller the plane declares
    pub fn install(&mut self, backends: Backends<'_>) -> Result<()> {
        match self {
            Self::Kubernetes(plane) => plane.install(backends.runner, backends.poll),
            Self::Remote(plane) => {
                for controller in &plane.controllers {
                    controller.install(backends.connector)?;
                }
                Ok(())
            }
            Self::Local(plane) => match &plane.controller {
                Some(controller) => controller.install(backends.runner),
                None => Ok(()),
            },
        }
    }

    /// Remove every controller
    pub fn uninstall(&self, backends: Backends<'_>) -> Result<()> {
        match self {
            Self::Kubernetes(plane) => plane.uninstall(backends.runner),
            Self::Remote(plane) => {
                for controller in &plane.controllers {
                    controller.uninstall(backends.connector)?;
                }
                Ok(())
            }
            Self::Local(plane) => match &plane.controller {
                Some(controller) => controller.uninstall(backends.runner),
                None => Ok(()),
            },
        }
    }

    pub fn has_controller(&self, name: &str) -> bool {
        self.controller_names().iter().any(|n| n == name)
    }

    /// Install a new controller into the plane
    pub fn add_controller(&mut self, spec: ControllerSpec, backends: Backends<'_>) -> Result<()> {
        if self.has_controller(spec.name()) {
            bail!("controller {} already exists", spec.name());
        }
        match (self, spec) {
            (Self::Remote(plane), ControllerSpec::Remote(spec)) => {
                spec.install(backends.connector)?;
                plane.controllers.push(spec);
                Ok(())
            }
            (Self::Local(plane), ControllerSpec::Local(spec)) => {
                if let Some(existing) = &plane.controller {
                    bail!(
                        "local control plane already runs controller {}",
                        existing.name
                    );
                }
                spec.install(backends.runner)?;
                plane.controller = Some(spec);
                Ok(())
            }
            (plane, spec) => bail!(
                "controller {} cannot be added to a {}",
                spec.name(),
                plane.kind()
            ),
        }
    }

    /// Reinstall an existing controller with a new spec
    pub fn update_controller(&mut self, spec: ControllerSpec, backends: Backends<'_>) -> Result<()> {
        let name = spec.name().to_string();
        match (self, spec) {
            (Self::Remote(plane), ControllerSpec::Remote(spec)) => {
                let slot = plane
                    .controllers
                    .iter_mut()
                    .find(|c| c.name == name)
                    .ok_or_else(|| NotFound::new("RemoteController", &name))?;
                spec.install(backends.connector)?;
                *slot = spec;
                Ok(())
            }
            (Self::Local(plane), ControllerSpec::Local(spec)) => {
                if plane.controller.as_ref().map(|c| c.name.as_str()) != Some(name.as_str()) {
                    return Err(NotFound::new("LocalController", &name).into());
                }
                spec.install(backends.runner)?;
                plane.controller = Some(spec);
                Ok(())
            }
            (plane, _) => bail!("controller {} cannot be updated on a {}", name, plane.kind()),
        }
    }

    /// Uninstall and forget one controller
    pub fn delete_controller(&mut self, name: &str, backends: Backends<'_>) -> Result<()> {
        match self {
            Self::Remote(plane) => {
                let index = plane
                    .controllers
                    .iter()
                    .position(|c| c.name == name)
                    .ok_or_else(|| NotFound::new("RemoteController", name))?;
                plane.controllers[index].uninstall(backends.connector)?;
                plane.controllers.remove(index);
                Ok(())
            }
            Self::Local(plane) => {
                let Some(controller) = plane.controller.as_ref().filter(|c| c.name == name) else {
                    return Err(NotFound::new("LocalController", name).into());
                };
                controller.uninstall(backends.runner)?;
                plane.controller = None;
                Ok(())
            }
            Self::Kubernetes(_) => bail!(
                "controllers of a Kubernetes control plane are managed through replicas"
            ),
        }
    }

    /// Normalize user input and reject what can never work
    pub fn sanitize(&mut self) -> Result<()> {
        let user = match self {
            Self::Kubernetes(plane) => &mut plane.iofog_user,
            Self::Remote(plane) => &mut plane.iofog_user,
            Self::Local(plane) => &mut plane.iofog_user,
        };
        user.email = user.email.trim().to_string();
        if user.email.is_empty() || user.password.is_empty() {
            bail!("control plane user needs an email and a password");
        }

        match self {
            Self::Kubernetes(plane) => {
                plane.kube_config = paths::expand(plane.kube_config.trim())
                    .to_string_lossy()
                    .into_owned();
                plane.replicas = plane.replicas.max(1);
            }
            Self::Remote(plane) => {
                let mut seen = std::collections::HashSet::new();
                for controller in &mut plane.controllers {
                    sanitize_remote_controller(controller)?;
                    if !seen.insert(controller.name.clone()) {
                        bail!("duplicate controller name {}", controller.name);
                    }
                }
            }
            Self::Local(plane) => {
                if let Some(controller) = &mut plane.controller {
                    if controller.name.trim().is_empty() {
                        controller.name = "local".to_string();
                    }
                    if controller.port == 0 {
                        controller.port = CONTROLLER_PORT;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Trim names and hosts, expand the key path, default the ports
pub fn sanitize_remote_controller(controller: &mut RemoteControllerSpec) -> Result<()> {
    controller.name = controller.name.trim().to_string();
    controller.host = controller.host.trim().to_string();
    if controller.name.is_empty() {
        bail!("remote controller needs a name");
    }
    if controller.host.is_empty() {
        bail!("remote controller {} needs a host", controller.name);
    }
    if controller.port == 0 {
        controller.port = CONTROLLER_PORT;
    }
    if controller.ssh.port == 0 {
        controller.ssh.port = 22;
    }
    if let Some(key) = &controller.ssh.key_file {
        controller.ssh.key_file = Some(paths::expand(key).to_string_lossy().into_owned());
    }
    controller.platform()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::testing::RecordingRunner;
    use airgap::MockConnector;

    fn user() -> IofogUser {
        IofogUser {
            name: "Ops".into(),
            surname: "Team".into(),
            email: " ops@example.com ".into(),
            password: "secret".into(),
        }
    }

    fn remote(name: &str, host: &str) -> RemoteControllerSpec {
        RemoteControllerSpec {
            name: name.into(),
            host: host.into(),
            ssh: SshSpec {
                user: "ubuntu".into(),
                port: 22,
                key_file: None,
            },
            port: CONTROLLER_PORT,
            image: None,
            airgap: false,
            platform: None,
        }
    }

    fn fast_poll() -> controller::RetryConfig {
        controller::RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            backoff_factor: 1.0,
            max_delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_remote_plane_lifecycle() {
        let connector = MockConnector::new();
        let runner = RecordingRunner::default();
        let poll = fast_poll();
        let backends = Backends {
            connector: &connector,
            runner: &runner,
            poll: &poll,
        };

        let mut plane = ControlPlane::Remote(RemotePlane {
            iofog_user: user(),
            controllers: vec![remote("alpha", "10.0.0.2")],
        });
        plane.sanitize().unwrap();
        assert_eq!(plane.user().email, "ops@example.com");
        plane.install(backends).unwrap();
        assert_eq!(plane.endpoint().unwrap(), "http://10.0.0.2:51121");

        let install = connector.commands_for("10.0.0.2");
        assert_eq!(install.len(), 1);
        assert!(install[0].starts_with("sudo -n docker rm -f fogctl-controller"));
        assert!(install[0].contains("-p 51121:51121 'ghcr.io/fogctl/controller:3'"));

        plane
            .add_controller(ControllerSpec::Remote(remote("beta", "10.0.0.3")), backends)
            .unwrap();
        assert_eq!(plane.controller_names(), vec!["alpha", "beta"]);
        assert!(
            plane
                .add_controller(ControllerSpec::Remote(remote("beta", "10.0.0.3")), backends)
                .is_err()
        );

        plane.delete_controller("alpha", backends).unwrap();
        assert_eq!(plane.endpoint().unwrap(), "http://10.0.0.3:51121");

        let err = plane.delete_controller("alpha", backends).unwrap_err();
        assert!(executor::is_not_found(&err));
    }

    #[test]
    fn test_update_missing_controller_is_not_found() {
        let connector = MockConnector::new();
        let runner = RecordingRunner::default();
        let poll = fast_poll();
        let backends = Backends {
            connector: &connector,
            runner: &runner,
            poll: &poll,
        };
        let mut plane = ControlPlane::Remote(RemotePlane {
            iofog_user: user(),
            controllers: vec![],
        });
        let err = plane
            .update_controller(ControllerSpec::Remote(remote("ghost", "10.0.0.9")), backends)
            .unwrap_err();
        assert!(executor::is_not_found(&err));
        assert!(connector.events().is_empty());
    }

    #[test]
    fn test_local_plane_uses_runner() {
        let connector = MockConnector::new();
        let runner = RecordingRunner::default();
        let poll = fast_poll();
        let backends = Backends {
            connector: &connector,
            runner: &runner,
            poll: &poll,
        };
        let mut plane = ControlPlane::Local(LocalPlane {
            iofog_user: user(),
            controller: Some(LocalControllerSpec {
                name: String::new(),
                image: Some("controller:dev".into()),
                port: 0,
            }),
        });
        plane.sanitize().unwrap();
        plane.install(backends).unwrap();
        assert_eq!(plane.endpoint().unwrap(), "http://localhost:51121");
        assert_eq!(
            runner.calls(),
            vec![
                "docker rm -f fogctl-controller",
                "docker run -d --name fogctl-controller -p 51121:51121 controller:dev",
            ]
        );

        plane.delete_controller("local", backends).unwrap();
        assert!(plane.endpoint().is_err());
    }

    #[test]
    fn test_kubernetes_install_resolves_endpoint() {
        let connector = MockConnector::new();
        let runner = RecordingRunner::default();
        runner.reply("jsonpath", "34.1.2.3");
        let poll = fast_poll();
        let backends = Backends {
            connector: &connector,
            runner: &runner,
            poll: &poll,
        };
        let mut plane = ControlPlane::Kubernetes(KubernetesPlane {
            iofog_user: user(),
            kube_config: "/etc/kube/config".into(),
            namespace: "edge".into(),
            image: None,
            replicas: 0,
            endpoint: None,
        });
        plane.sanitize().unwrap();
        plane.install(backends).unwrap();
        assert_eq!(plane.endpoint().unwrap(), "http://34.1.2.3:51121");
        assert!(
            runner
                .calls()
                .iter()
                .any(|c| c.contains("create deployment fogctl-controller") && c.contains("--replicas=1"))
        );
        assert!(
            plane
                .add_controller(ControllerSpec::Remote(remote("x", "h")), backends)
                .is_err()
        );
    }

    #[test]
    fn test_sanitize_rejects_bad_input() {
        let mut missing_host = ControlPlane::Remote(RemotePlane {
            iofog_user: user(),
            controllers: vec![remote("alpha", "  ")],
        });
        assert!(missing_host.sanitize().is_err());

        let mut duplicate = ControlPlane::Remote(RemotePlane {
            iofog_user: user(),
            controllers: vec![remote("alpha", "h1"), remote("alpha", "h2")],
        });
        assert!(duplicate.sanitize().is_err());

        let mut no_password = ControlPlane::Local(LocalPlane {
            iofog_user: IofogUser {
                password: String::new(),
                ..user()
            },
            controller: None,
        });
        assert!(no_password.sanitize().is_err());
    }

    #[test]
    fn test_record_round_trip_keeps_variant() {
        let plane = ControlPlane::Remote(RemotePlane {
            iofog_user: user(),
            controllers: vec![remote("alpha", "10.0.0.2")],
        });
        let yaml = serde_yaml_ng::to_string(&plane).unwrap();
        assert!(yaml.contains("type: remote"));
        let back: ControlPlane = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, plane);
    }
}
