//! Agents on remote hosts and on this machine
//!
//! Deploying an agent registers it with the Controller, optionally ships
//! the agent image over SSH, starts the agent container and records the
//! host in the namespace so later air-gap pushes can reach it.

use super::resources::controller_error;
use super::{Session, bootstrap, executor_name};
use crate::plane::SshSpec;
use crate::resource::Envelope;
use crate::resource::specs::{LocalAgentSpec, RemoteAgentSpec, decode};
use crate::runner::args;
use crate::store::AgentRecord;
use airgap::remote::shell_quote;
use airgap::{ContainerEngine, ImageReference, Platform, TransferPlan};
use anyhow::{Context, Result, bail};
use chrono::Utc;
use executor::{BoxedExecutor, Executor, FactoryInput, NotFound};
use serde_json::json;
use std::sync::Arc;

pub const DEFAULT_AGENT_IMAGE: &str = "ghcr.io/fogctl/agent:3";

/// Controller collection holding agents
const AGENTS: &str = "iofog";

const AGENT_CONTAINER: &str = "fogctl-agent";

/// Controller architecture code for a platform (1 x86-64, 2 arm64)
///
/// 32-bit arm has no fog type: mapping it to 2 would ship arm64 images.
pub fn fog_type(platform: &Platform) -> Result<i64> {
    match platform.architecture.as_str() {
        "amd64" | "x86_64" => Ok(1),
        "arm64" | "aarch64" => Ok(2),
        other => bail!("agents on {} ({}) are not supported", platform, other),
    }
}

/// Platform of this machine
fn host_platform() -> Result<Platform> {
    match std::env::consts::ARCH {
        "x86_64" => Ok(Platform::linux_amd64()),
        "aarch64" => Ok(Platform::linux_arm64()),
        other => bail!("local agents on {} are not supported", other),
    }
}

/// Default `docker run` line for the agent container
fn run_command(
    engine: ContainerEngine,
    sudo: bool,
    airgap: bool,
    endpoint: &str,
    name: &str,
    image: &str,
) -> String {
    let prefix = if sudo { "sudo -n " } else { "" };
    let binary = engine.binary();
    let pull = if airgap { "--pull=never " } else { "" };
    format!(
        "{prefix}{binary} rm -f {container} >/dev/null 2>&1; \
         {prefix}{binary} run -d --restart=always --name {container} {pull}\
         -e FOGCTL_CONTROLLER_URL={endpoint} -e FOGCTL_AGENT_NAME={name} {image}",
        container = AGENT_CONTAINER,
        endpoint = shell_quote(endpoint),
        name = shell_quote(name),
        image = shell_quote(image),
    )
}

fn register(
    session: &Session,
    name: &str,
    platform: &Platform,
    engine: ContainerEngine,
    host: &str,
) -> Result<String> {
    let api = session.controller()?;
    let body = json!({
        "name": name,
        "fogType": fog_type(platform)?,
        "containerEngine": engine.binary(),
        "host": host,
    });
    api.upsert_resource(AGENTS, name, &body)
        .with_context(|| format!("Failed to register agent {}", name))?;
    Ok(api.endpoint().to_string())
}

fn record(session: &Session, agent: AgentRecord) -> Result<()> {
    session.store().update(session.namespace(), |namespace| {
        namespace.upsert_agent(agent);
        Ok(())
    })
}

struct DeployRemoteAgent {
    name: String,
    session: Arc<Session>,
    agent: String,
    spec: RemoteAgentSpec,
    platform: Platform,
    image: ImageReference,
}

impl Executor for DeployRemoteAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let spec = &self.spec;
        let target = spec.ssh.target(&spec.host);
        let endpoint = register(
            &self.session,
            &self.agent,
            &self.platform,
            spec.container_engine,
            &spec.host,
        )?;

        if spec.airgap {
            bootstrap::ship(
                &self.session,
                vec![TransferPlan::new(
                    &self.agent,
                    target.clone(),
                    self.platform.clone(),
                    spec.container_engine,
                    self.image.clone(),
                )],
            )?;
        }

        let command = match &spec.install_command {
            Some(command) => command.clone(),
            None => run_command(
                spec.container_engine,
                spec.container_engine == ContainerEngine::Docker && !target.is_root(),
                spec.airgap,
                &endpoint,
                &self.agent,
                &self.image.to_string(),
            ),
        };
        log::info!("Installing agent {} on {}", self.agent, target);
        let mut remote = self.session.connector().connect(&target)?;
        remote.run(&command)?.check(&self.agent, "agent install")?;

        record(
            &self.session,
            AgentRecord {
                name: self.agent.clone(),
                host: spec.host.clone(),
                ssh: Some(spec.ssh.clone()),
                container_engine: spec.container_engine,
                created_at: Utc::now(),
            },
        )
    }
}

pub fn deploy_remote(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    let mut spec: RemoteAgentSpec = decode(input.kind, input.name, input.spec)?;
    spec.host = spec.host.trim().to_string();
    if spec.host.is_empty() {
        bail!("RemoteAgent {} needs a host", input.name);
    }
    // Canonical name, so `aarch64` fetches the `arm64` manifest
    let platform = Platform::from_fog_type(fog_type(&spec.platform()?)?)?;
    let image = ImageReference::parse(spec.image.as_deref().unwrap_or(DEFAULT_AGENT_IMAGE))?;

    Ok(Box::new(DeployRemoteAgent {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        agent: input.name.to_string(),
        spec,
        platform,
        image,
    }))
}

struct DeployLocalAgent {
    name: String,
    session: Arc<Session>,
    agent: String,
    engine: ContainerEngine,
    image: String,
}

impl Executor for DeployLocalAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let endpoint = register(
            &self.session,
            &self.agent,
            &host_platform()?,
            self.engine,
            "localhost",
        )?;

        let runner = self.session.runner();
        let binary = self.engine.binary();
        // Absent container is fine
        let _ = runner.run_capture(binary, &args(["rm", "-f", AGENT_CONTAINER]));
        runner
            .run_capture(
                binary,
                &args([
                    "run".to_string(),
                    "-d".to_string(),
                    "--name".to_string(),
                    AGENT_CONTAINER.to_string(),
                    "-e".to_string(),
                    format!("FOGCTL_CONTROLLER_URL={}", endpoint),
                    "-e".to_string(),
                    format!("FOGCTL_AGENT_NAME={}", self.agent),
                    self.image.clone(),
                ]),
            )
            .with_context(|| format!("Failed to start local agent {}", self.agent))?;

        record(
            &self.session,
            AgentRecord {
                name: self.agent.clone(),
                host: "localhost".to_string(),
                ssh: None,
                container_engine: self.engine,
                created_at: Utc::now(),
            },
        )
    }
}

pub fn deploy_local(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    let spec: LocalAgentSpec = decode(input.kind, input.name, input.spec)?;
    let image = spec
        .image
        .clone()
        .unwrap_or_else(|| DEFAULT_AGENT_IMAGE.to_string());
    ImageReference::parse(&image)?;
    Ok(Box::new(DeployLocalAgent {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        agent: input.name.to_string(),
        engine: spec.engine(),
        image,
    }))
}

fn uninstall(session: &Session, agent: &AgentRecord) -> Result<()> {
    let binary = agent.container_engine.binary();
    match &agent.ssh {
        Some(ssh) => {
            let target = ssh.target(&agent.host);
            let sudo = agent.container_engine == ContainerEngine::Docker && !target.is_root();
            let prefix = if sudo { "sudo -n " } else { "" };
            let mut remote = session.connector().connect(&target)?;
            remote
                .run(&format!("{}{} rm -f {}", prefix, binary, AGENT_CONTAINER))?
                .check(&agent.name, "agent removal")?;
        }
        None => {
            session
                .runner()
                .run_capture(binary, &args(["rm", "-f", AGENT_CONTAINER]))
                .with_context(|| format!("Failed to remove local agent {}", agent.name))?;
        }
    }
    Ok(())
}

struct DeleteAgent {
    name: String,
    session: Arc<Session>,
    kind: String,
    agent: String,
}

impl Executor for DeleteAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let api = self.session.controller()?;
        let deregistered = match api.delete_resource(AGENTS, &self.agent) {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(controller_error(&self.kind, &self.agent, e)),
        };

        let known = self
            .session
            .store()
            .load(self.session.namespace())?
            .agent(&self.agent)
            .cloned();
        match known {
            Some(agent) => {
                uninstall(&self.session, &agent)?;
                self.session
                    .store()
                    .update(self.session.namespace(), |namespace| {
                        namespace.remove_agent(&self.agent);
                        Ok(())
                    })?;
            }
            None if deregistered => {
                log::warn!(
                    "Agent {} was registered but never installed by fogctl",
                    self.agent
                );
            }
            None => return Err(NotFound::new(&self.kind, &self.agent).into()),
        }
        log::info!("Deleted {}", self.name);
        Ok(())
    }
}

pub fn delete(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DeleteAgent {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind: input.kind.to_string(),
        agent: input.name.to_string(),
    }))
}

struct DescribeAgent {
    name: String,
    session: Arc<Session>,
    kind: String,
    agent: String,
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentView<'a> {
    host: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ssh: Option<&'a SshSpec>,
    container_engine: ContainerEngine,
}

impl Executor for DescribeAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let namespace = self.session.store().load(self.session.namespace())?;
        let agent = namespace
            .agent(&self.agent)
            .ok_or_else(|| NotFound::new(&self.kind, &self.agent))?;
        let spec = serde_yaml_ng::to_value(AgentView {
            host: &agent.host,
            ssh: agent.ssh.as_ref(),
            container_engine: agent.container_engine,
        })?;

        let api = self.session.controller()?;
        let status = match api.get_agent(&self.agent) {
            Ok(remote) => json!({
                "uuid": remote.uuid,
                "fogType": remote.fog_type,
                "daemonStatus": remote.daemon_status,
                "createdAt": agent.created_at,
            }),
            Err(e) if e.is_not_found() => json!({
                "daemonStatus": "UNKNOWN",
                "createdAt": agent.created_at,
            }),
            Err(e) => return Err(controller_error(&self.kind, &self.agent, e)),
        };

        self.session.describe(
            Envelope::describe(&self.kind, &self.agent, self.session.namespace(), spec)
                .with_status(serde_yaml_ng::to_value(&status)?),
        );
        Ok(())
    }
}

pub fn describe(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DescribeAgent {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind: input.kind.to_string(),
        agent: input.name.to_string(),
    }))
}
