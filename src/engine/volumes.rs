//! Directories copied from this machine to agents

use super::{Session, executor_name};
use crate::paths;
use crate::resource::Envelope;
use crate::resource::specs::{VolumeSpec, decode};
use crate::runner::args;
use crate::store::{AgentRecord, VolumeRecord};
use airgap::remote::shell_quote;
use anyhow::{Context, Result, bail};
use executor::{BoxedExecutor, Executor, FactoryInput, NotFound};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

/// What a copy of `source` under `destination` consists of
#[derive(Debug, Default, PartialEq)]
struct CopyPlan {
    /// Remote directories to create, destination first
    dirs: Vec<String>,
    /// Local file and its remote path
    files: Vec<(PathBuf, String)>,
}

fn remote_path(destination: &str, relative: &Path) -> String {
    let relative: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    format!("{}/{}", destination.trim_end_matches('/'), relative.join("/"))
}

fn plan_copy(source: &Path, destination: &str) -> Result<CopyPlan> {
    let mut plan = CopyPlan {
        dirs: vec![destination.to_string()],
        files: Vec::new(),
    };
    if source.is_file() {
        let file_name = source
            .file_name()
            .with_context(|| format!("{} has no file name", source.display()))?;
        plan.files.push((
            source.to_path_buf(),
            remote_path(destination, Path::new(file_name)),
        ));
        return Ok(plan);
    }

    for entry in WalkDir::new(source).follow_links(true).sort_by_file_name() {
        let entry = entry.context("Failed to read directory entry")?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        if relative.as_os_str().is_empty() {
            continue;
        }
        let remote = remote_path(destination, relative);
        if entry.file_type().is_dir() {
            plan.dirs.push(remote);
        } else {
            plan.files.push((entry.path().to_path_buf(), remote));
        }
    }
    Ok(plan)
}

struct DeployVolume {
    name: String,
    session: Arc<Session>,
    volume: String,
    spec: VolumeSpec,
}

impl DeployVolume {
    fn copy_to(&self, agent: &AgentRecord, source: &Path) -> Result<()> {
        let Some(ssh) = &agent.ssh else {
            return self.copy_local(source);
        };
        let target = ssh.target(&agent.host);
        let sudo = if target.is_root() { "" } else { "sudo -n " };
        let destination = shell_quote(&self.spec.destination);
        let plan = plan_copy(source, &self.spec.destination)?;

        let mut remote = self.session.connector().connect(&target)?;
        let dirs: Vec<String> = plan.dirs.iter().map(|d| shell_quote(d)).collect();
        remote
            .run(&format!("{}mkdir -p {}", sudo, dirs.join(" ")))?
            .check(&agent.name, "volume setup")?;
        if !target.is_root() {
            remote
                .run(&format!(
                    "sudo -n chown -R {} {}",
                    shell_quote(&target.user),
                    destination
                ))?
                .check(&agent.name, "volume setup")?;
        }
        for (local, path) in &plan.files {
            self.session.cancel().check()?;
            remote.upload(local, path)?;
        }
        remote
            .run(&format!(
                "{}chmod -R {} {}",
                sudo, self.spec.permissions, destination
            ))?
            .check(&agent.name, "volume permissions")?;
        Ok(())
    }

    fn copy_local(&self, source: &Path) -> Result<()> {
        let runner = self.session.runner();
        let destination = self.spec.destination.as_str();
        runner.run_capture("mkdir", &args(["-p", destination]))?;
        let from = if source.is_dir() {
            source.join(".")
        } else {
            source.to_path_buf()
        };
        runner.run_capture(
            "cp",
            &args([
                "-R".to_string(),
                from.to_string_lossy().into_owned(),
                destination.to_string(),
            ]),
        )?;
        runner.run_capture(
            "chmod",
            &args(["-R", self.spec.permissions.as_str(), destination]),
        )?;
        Ok(())
    }
}

impl Executor for DeployVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let session = &self.session;
        let source = paths::expand(&self.spec.source);
        if !source.exists() {
            bail!("Volume source {} does not exist", source.display());
        }

        let namespace = session.store().load(session.namespace())?;
        let agents = self
            .spec
            .agents
            .iter()
            .map(|name| {
                namespace
                    .agent(name)
                    .cloned()
                    .ok_or_else(|| NotFound::new("Agent", name).into())
            })
            .collect::<Result<Vec<AgentRecord>>>()?;

        let failures: Vec<String> = agents
            .par_iter()
            .filter_map(|agent| {
                log::info!("Copying volume {} to {}", self.volume, agent.name);
                self.copy_to(agent, &source)
                    .err()
                    .map(|e| format!("  {}: {:#}", agent.name, e))
            })
            .collect();
        if !failures.is_empty() {
            bail!(
                "Failed to copy volume {} to {} agent(s):\n{}",
                self.volume,
                failures.len(),
                failures.join("\n")
            );
        }

        let record = VolumeRecord {
            name: self.volume.clone(),
            source: self.spec.source.clone(),
            destination: self.spec.destination.clone(),
            permissions: self.spec.permissions.clone(),
            agents: self.spec.agents.clone(),
        };
        session
            .store()
            .update(session.namespace(), |namespace| {
                namespace.upsert_volume(record);
                Ok(())
            })?;
        log::info!("Deployed {}", self.name);
        Ok(())
    }
}

pub fn deploy(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    let spec: VolumeSpec = decode(input.kind, input.name, input.spec)?;
    spec.validate(input.name)?;
    Ok(Box::new(DeployVolume {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        volume: input.name.to_string(),
        spec,
    }))
}

fn remove_from(session: &Session, agent: &AgentRecord, destination: &str) -> Result<()> {
    match &agent.ssh {
        Some(ssh) => {
            let target = ssh.target(&agent.host);
            let sudo = if target.is_root() { "" } else { "sudo -n " };
            let mut remote = session.connector().connect(&target)?;
            remote
                .run(&format!("{}rm -rf {}", sudo, shell_quote(destination)))?
                .check(&agent.name, "volume removal")?;
        }
        None => {
            session
                .runner()
                .run_capture("rm", &args(["-rf", destination]))?;
        }
    }
    Ok(())
}

struct DeleteVolume {
    name: String,
    session: Arc<Session>,
    volume: String,
}

impl Executor for DeleteVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let session = &self.session;
        let namespace = session.store().load(session.namespace())?;
        let record = namespace
            .volume(&self.volume)
            .ok_or_else(|| NotFound::new("Volume", &self.volume))?;

        for agent_name in &record.agents {
            match namespace.agent(agent_name) {
                Some(agent) => remove_from(session, agent, &record.destination)
                    .with_context(|| {
                        format!("Failed to remove volume {} from {}", self.volume, agent_name)
                    })?,
                None => log::warn!(
                    "Agent {} of volume {} no longer exists, skipping",
                    agent_name,
                    self.volume
                ),
            }
        }

        session.store().update(session.namespace(), |namespace| {
            namespace.remove_volume(&self.volume);
            Ok(())
        })?;
        log::info!("Deleted {}", self.name);
        Ok(())
    }
}

pub fn delete(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DeleteVolume {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        volume: input.name.to_string(),
    }))
}

struct DescribeVolume {
    name: String,
    session: Arc<Session>,
    volume: String,
}

impl Executor for DescribeVolume {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let namespace = self.session.store().load(self.session.namespace())?;
        let record = namespace
            .volume(&self.volume)
            .ok_or_else(|| NotFound::new("Volume", &self.volume))?;
        let spec = VolumeSpec {
            source: record.source.clone(),
            destination: record.destination.clone(),
            permissions: record.permissions.clone(),
            agents: record.agents.clone(),
        };
        self.session.describe(Envelope::describe(
            "Volume",
            &self.volume,
            self.session.namespace(),
            serde_yaml_ng::to_value(&spec)?,
        ));
        Ok(())
    }
}

pub fn describe(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DescribeVolume {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        volume: input.name.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Fixture, fixture};
    use crate::plane::SshSpec;
    use crate::resource::{Document, parse_documents};
    use airgap::ContainerEngine;
    use airgap::remote::MockEvent;
    use std::fs;

    fn add_agent(f: &Fixture, name: &str, ssh_user: Option<&str>) {
        let record = AgentRecord {
            name: name.into(),
            host: "10.0.0.5".into(),
            ssh: ssh_user.map(|user| SshSpec {
                user: user.into(),
                port: 22,
                key_file: None,
            }),
            container_engine: ContainerEngine::Docker,
            created_at: chrono::Utc::now(),
        };
        f.session
            .store()
            .update("edge", |namespace| {
                namespace.upsert_agent(record);
                Ok(())
            })
            .unwrap();
    }

    fn source_tree(f: &Fixture) -> PathBuf {
        let source = f.temp.path().join("config");
        fs::create_dir_all(source.join("sub")).unwrap();
        fs::write(source.join("a.txt"), "a").unwrap();
        fs::write(source.join("sub/b.txt"), "b").unwrap();
        source
    }

    fn volume_doc(source: &Path, agent: &str) -> Document {
        parse_documents(
            &format!(
                "apiVersion: fogctl.io/v3\nkind: Volume\nmetadata:\n  name: conf\nspec:\n  source: {}\n  destination: /opt/conf\n  agents: [{}]\n",
                source.display(),
                agent
            ),
            "edge",
        )
        .unwrap()
        .remove(0)
    }

    #[test]
    fn test_plan_copy_walks_tree() {
        let temp = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("sub/b.txt"), "b").unwrap();

        let plan = plan_copy(temp.path(), "/opt/conf/").unwrap();
        assert_eq!(plan.dirs, vec!["/opt/conf/", "/opt/conf/sub"]);
        let remotes: Vec<&str> = plan.files.iter().map(|(_, r)| r.as_str()).collect();
        assert_eq!(remotes, vec!["/opt/conf/a.txt", "/opt/conf/sub/b.txt"]);

        let single = plan_copy(&temp.path().join("a.txt"), "/opt/conf").unwrap();
        assert_eq!(single.files[0].1, "/opt/conf/a.txt");
    }

    #[test]
    fn test_deploy_to_remote_agent() {
        let f = fixture();
        add_agent(&f, "edge-1", Some("fog"));
        let source = source_tree(&f);

        deploy(&f.session, &volume_doc(&source, "edge-1").input("edge"))
            .unwrap()
            .execute()
            .unwrap();

        let commands = f.connector.commands_for("10.0.0.5");
        assert_eq!(
            commands,
            vec![
                "sudo -n mkdir -p '/opt/conf' '/opt/conf/sub'",
                "sudo -n chown -R 'fog' '/opt/conf'",
                "sudo -n chmod -R 0755 '/opt/conf'",
            ]
        );
        let uploads: Vec<String> = f
            .connector
            .events()
            .into_iter()
            .filter_map(|e| match e {
                MockEvent::Upload { remote, .. } => Some(remote),
                _ => None,
            })
            .collect();
        assert_eq!(uploads, vec!["/opt/conf/a.txt", "/opt/conf/sub/b.txt"]);

        let stored = f.session.store().load("edge").unwrap();
        assert_eq!(stored.volume("conf").unwrap().agents, vec!["edge-1"]);
    }

    #[test]
    fn test_deploy_to_local_agent() {
        let f = fixture();
        add_agent(&f, "laptop", None);
        let source = source_tree(&f);

        deploy(&f.session, &volume_doc(&source, "laptop").input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(
            f.runner.calls(),
            vec![
                "mkdir -p /opt/conf".to_string(),
                format!("cp -R {} /opt/conf", source.join(".").display()),
                "chmod -R 0755 /opt/conf".to_string(),
            ]
        );
    }

    #[test]
    fn test_failed_copy_is_not_recorded() {
        let f = fixture();
        add_agent(&f, "laptop", None);
        let source = source_tree(&f);
        f.runner.fail_on("cp -R");

        let err = deploy(&f.session, &volume_doc(&source, "laptop").input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(err.to_string().contains("Failed to copy volume conf"));
        let stored = f.session.store().load("edge").unwrap();
        assert!(stored.volume("conf").is_none());
    }

    #[test]
    fn test_unknown_agent_is_not_found() {
        let f = fixture();
        let source = source_tree(&f);
        let err = deploy(&f.session, &volume_doc(&source, "ghost").input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(executor::is_not_found(&err));
        assert!(f.connector.events().is_empty());
    }

    #[test]
    fn test_missing_source_fails() {
        let f = fixture();
        add_agent(&f, "edge-1", Some("root"));
        let err = deploy(
            &f.session,
            &volume_doc(&f.temp.path().join("nope"), "edge-1").input("edge"),
        )
        .unwrap()
        .execute()
        .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_relative_destination_rejected_at_build() {
        let f = fixture();
        let doc = parse_documents(
            "apiVersion: fogctl.io/v3\nkind: Volume\nmetadata:\n  name: conf\nspec:\n  source: /tmp\n  destination: opt/conf\n  agents: [edge-1]\n",
            "edge",
        )
        .unwrap()
        .remove(0);
        assert!(deploy(&f.session, &doc.input("edge")).is_err());
    }

    #[test]
    fn test_delete_and_describe() {
        let f = fixture();
        add_agent(&f, "edge-1", Some("root"));
        let source = source_tree(&f);
        deploy(&f.session, &volume_doc(&source, "edge-1").input("edge"))
            .unwrap()
            .execute()
            .unwrap();

        let reference = Document::reference("Volume", "conf");
        describe(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(
            f.session.described()[0].spec["destination"].as_str(),
            Some("/opt/conf")
        );

        delete(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(
            f.connector.commands_for("10.0.0.5").last().unwrap(),
            "rm -rf '/opt/conf'"
        );
        assert!(f.session.store().load("edge").unwrap().volume("conf").is_none());

        let err = delete(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(executor::is_not_found(&err));
    }
}
