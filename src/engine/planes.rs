//! Control planes and their controllers

use super::{Session, bootstrap, executor_name};
use crate::plane::{
    ControlPlane, ControllerSpec, KubernetesPlane, LocalControllerSpec, LocalPlane,
    RemoteControllerSpec, RemotePlane, sanitize_remote_controller,
};
use crate::resource::Envelope;
use crate::store::Namespace;
use crate::resource::specs::decode;
use airgap::{ContainerEngine, ImageReference, TransferPlan};
use anyhow::{Context, Result, bail};
use executor::{BoxedExecutor, Executor, FactoryInput, NotFound};
use serde_yaml_ng::Value;
use std::sync::Arc;

const REDACTED: &str = "********";

/// Image deliveries for air-gapped controllers
fn airgap_plans<'a>(
    controllers: impl IntoIterator<Item = &'a RemoteControllerSpec>,
) -> Result<Vec<TransferPlan>> {
    controllers
        .into_iter()
        .map(|controller| {
            Ok(TransferPlan::new(
                &controller.name,
                controller.ssh.target(&controller.host),
                controller.platform()?,
                ContainerEngine::Docker,
                ImageReference::parse(controller.image())?,
            ))
        })
        .collect()
}

/// Serialized plane without its type tag and with the password hidden
fn redacted(plane: &ControlPlane) -> Result<Value> {
    let mut value = serde_yaml_ng::to_value(plane)?;
    if let Some(mapping) = value.as_mapping_mut() {
        mapping.remove("type");
        if let Some(user) = mapping
            .get_mut("iofogUser")
            .and_then(Value::as_mapping_mut)
        {
            user.insert(Value::from("password"), Value::from(REDACTED));
        }
    }
    Ok(value)
}

fn decode_plane(input: &FactoryInput<'_>) -> Result<ControlPlane> {
    let (kind, name, spec) = (input.kind, input.name, input.spec);
    let mut plane = match kind {
        "KubernetesControlPlane" => ControlPlane::Kubernetes(decode::<KubernetesPlane>(kind, name, spec)?),
        "RemoteControlPlane" => ControlPlane::Remote(decode::<RemotePlane>(kind, name, spec)?),
        "LocalControlPlane" => ControlPlane::Local(decode::<LocalPlane>(kind, name, spec)?),
        other => bail!("{} is not a control plane kind", other),
    };
    plane
        .sanitize()
        .with_context(|| format!("Invalid {} {}", kind, name))?;
    Ok(plane)
}

/// A namespace keeps the plane kind it was first deployed with
fn check_kind(namespace: &Namespace, plane: &ControlPlane) -> Result<()> {
    match &namespace.control_plane {
        Some(existing) if existing.kind() != plane.kind() => bail!(
            "Namespace {} already has a {}, delete it before deploying a {}",
            namespace.name,
            existing.kind(),
            plane.kind()
        ),
        _ => Ok(()),
    }
}

struct DeployPlane {
    name: String,
    session: Arc<Session>,
    plane: ControlPlane,
}

impl Executor for DeployPlane {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let session = &self.session;
        let store = session.store();
        check_kind(&store.ensure(session.namespace())?, &self.plane)?;
        bootstrap::ship(session, airgap_plans(self.plane.airgap_controllers())?)?;

        let backends = session.backends();
        let mut plane = self.plane.clone();
        let plane = store.update(session.namespace(), |namespace| {
            check_kind(namespace, &plane)?;
            plane.install(backends)?;
            namespace.control_plane = Some(plane.clone());
            Ok(plane)
        })?;

        session.wait_for_controller(&plane)?;
        log::info!("Deployed {} at {}", self.name, plane.endpoint()?);
        Ok(())
    }
}

pub fn deploy_plane(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DeployPlane {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        plane: decode_plane(input)?,
    }))
}

struct DeletePlane {
    name: String,
    session: Arc<Session>,
    kind: String,
    plane: String,
}

impl Executor for DeletePlane {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let session = &self.session;
        let backends = session.backends();
        session.store().update(session.namespace(), |namespace| {
            let Some(plane) = namespace
                .control_plane
                .as_ref()
                .filter(|plane| plane.kind() == self.kind)
            else {
                return Err(NotFound::new(&self.kind, &self.plane).into());
            };
            plane.uninstall(backends)?;
            namespace.control_plane = None;
            Ok(())
        })?;
        log::info!("Deleted {}", self.name);
        Ok(())
    }
}

pub fn delete_plane(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DeletePlane {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind: input.kind.to_string(),
        plane: input.name.to_string(),
    }))
}

struct DescribePlane {
    name: String,
    session: Arc<Session>,
    kind: String,
    plane: String,
}

impl Executor for DescribePlane {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let namespace = self.session.store().load(self.session.namespace())?;
        let plane = namespace
            .control_plane
            .as_ref()
            .filter(|plane| plane.kind() == self.kind)
            .ok_or_else(|| NotFound::new(&self.kind, &self.plane))?;

        let mut envelope = Envelope::describe(
            &self.kind,
            &self.plane,
            self.session.namespace(),
            redacted(plane)?,
        );
        if let Ok(endpoint) = plane.endpoint() {
            let mut status = serde_yaml_ng::Mapping::new();
            status.insert(Value::from("endpoint"), Value::from(endpoint));
            envelope = envelope.with_status(Value::Mapping(status));
        }
        self.session.describe(envelope);
        Ok(())
    }
}

pub fn describe_plane(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DescribePlane {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind: input.kind.to_string(),
        plane: input.name.to_string(),
    }))
}

fn decode_controller(input: &FactoryInput<'_>) -> Result<ControllerSpec> {
    let (kind, name, spec) = (input.kind, input.name, input.spec);
    match kind {
        "RemoteController" => {
            let mut controller: RemoteControllerSpec = decode(kind, name, spec)?;
            controller.name = name.to_string();
            sanitize_remote_controller(&mut controller)
                .with_context(|| format!("Invalid {} {}", kind, name))?;
            Ok(ControllerSpec::Remote(controller))
        }
        "LocalController" => {
            let mut controller: LocalControllerSpec = decode(kind, name, spec)?;
            controller.name = name.to_string();
            if controller.port == 0 {
                controller.port = crate::plane::CONTROLLER_PORT;
            }
            Ok(ControllerSpec::Local(controller))
        }
        other => bail!("{} is not a controller kind", other),
    }
}

struct DeployController {
    name: String,
    session: Arc<Session>,
    spec: ControllerSpec,
}

impl Executor for DeployController {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let session = &self.session;
        if let ControllerSpec::Remote(remote) = &self.spec {
            bootstrap::ship(session, airgap_plans([remote].into_iter().filter(|c| c.airgap))?)?;
        }

        let backends = session.backends();
        let spec = self.spec.clone();
        session.store().update(session.namespace(), |namespace| {
            let plane = namespace.control_plane.as_mut().with_context(|| {
                format!(
                    "Namespace {} has no control plane, deploy one before adding controllers",
                    namespace.name
                )
            })?;
            if plane.has_controller(spec.name()) {
                plane.update_controller(spec, backends)
            } else {
                plane.add_controller(spec, backends)
            }
        })?;
        log::info!("Deployed {}", self.name);
        Ok(())
    }
}

pub fn deploy_controller(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DeployController {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        spec: decode_controller(input)?,
    }))
}

struct DeleteController {
    name: String,
    session: Arc<Session>,
    kind: String,
    controller: String,
}

impl Executor for DeleteController {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let session = &self.session;
        let backends = session.backends();
        session.store().update(session.namespace(), |namespace| {
            let plane = namespace
                .control_plane
                .as_mut()
                .ok_or_else(|| NotFound::new(&self.kind, &self.controller))?;
            plane.delete_controller(&self.controller, backends)
        })?;
        log::info!("Deleted {}", self.name);
        Ok(())
    }
}

pub fn delete_controller(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DeleteController {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind: input.kind.to_string(),
        controller: input.name.to_string(),
    }))
}

struct DescribeController {
    name: String,
    session: Arc<Session>,
    kind: String,
    controller: String,
}

impl Executor for DescribeController {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let namespace = self.session.store().load(self.session.namespace())?;
        let spec = match (&namespace.control_plane, self.kind.as_str()) {
            (Some(ControlPlane::Remote(plane)), "RemoteController") => plane
                .controllers
                .iter()
                .find(|c| c.name == self.controller)
                .map(serde_yaml_ng::to_value)
                .transpose()?,
            (Some(ControlPlane::Local(plane)), "LocalController") => plane
                .controller
                .as_ref()
                .filter(|c| c.name == self.controller)
                .map(serde_yaml_ng::to_value)
                .transpose()?,
            _ => None,
        };
        let mut spec = spec.ok_or_else(|| NotFound::new(&self.kind, &self.controller))?;
        if let Some(mapping) = spec.as_mapping_mut() {
            mapping.remove("name");
        }
        self.session.describe(Envelope::describe(
            &self.kind,
            &self.controller,
            self.session.namespace(),
            spec,
        ));
        Ok(())
    }
}

pub fn describe_controller(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DescribeController {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind: input.kind.to_string(),
        controller: input.name.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::fixture;
    use crate::resource::{Document, parse_documents};
    use airgap::Platform;

    const REMOTE_PLANE: &str = r#"
apiVersion: fogctl.io/v3
kind: RemoteControlPlane
metadata:
  name: cp
spec:
  iofogUser:
    email: ops@example.com
    password: secret
  controllers:
    - name: ctl-1
      host: 10.0.0.2
      ssh:
        user: root
      airgap: true
"#;

    fn fresh_namespace(f: &crate::engine::testing::Fixture) {
        f.session
            .store()
            .update("edge", |namespace| {
                namespace.control_plane = None;
                Ok(())
            })
            .unwrap();
    }

    fn one(yaml: &str) -> Document {
        parse_documents(yaml, "edge").unwrap().remove(0)
    }

    #[test]
    fn test_deploy_remote_plane_ships_installs_and_waits() {
        let f = fixture();
        fresh_namespace(&f);
        f.controller.set_unready(1);
        let image = ImageReference::parse(crate::plane::DEFAULT_CONTROLLER_IMAGE).unwrap();
        f.registry
            .set_digest(&image, &Platform::linux_amd64(), "sha256:aaa");

        deploy_plane(&f.session, &one(REMOTE_PLANE).input("edge"))
            .unwrap()
            .execute()
            .unwrap();

        let commands = f.connector.commands_for("10.0.0.2");
        let load = commands.iter().position(|c| c.contains("docker load -i")).unwrap();
        let run = commands.iter().position(|c| c.contains("docker run -d")).unwrap();
        assert!(load < run);
        assert!(commands[run].contains("--pull=never"));

        let status_calls = f
            .controller
            .calls()
            .iter()
            .filter(|c| *c == "GET status")
            .count();
        assert_eq!(status_calls, 2);

        let stored = f.session.store().load("edge").unwrap();
        assert_eq!(stored.control_plane.unwrap().kind(), "RemoteControlPlane");
    }

    #[test]
    fn test_plane_kind_conflict() {
        let f = fixture();
        let err = deploy_plane(&f.session, &one(REMOTE_PLANE).input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(err.to_string().contains("already has a LocalControlPlane"));
        assert!(f.connector.events().is_empty());
    }

    #[test]
    fn test_invalid_plane_rejected_at_build() {
        let f = fixture();
        let doc = one(
            "apiVersion: fogctl.io/v3\nkind: LocalControlPlane\nmetadata:\n  name: cp\nspec:\n  iofogUser:\n    email: ''\n    password: x\n",
        );
        assert!(deploy_plane(&f.session, &doc.input("edge")).is_err());
    }

    #[test]
    fn test_describe_plane_hides_password() {
        let f = fixture();
        let reference = Document::reference("LocalControlPlane", "cp");
        describe_plane(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        let described = f.session.described();
        let spec = &described[0].spec;
        assert_eq!(spec["iofogUser"]["password"].as_str(), Some(REDACTED));
        assert!(spec.get("type").is_none());
        assert_eq!(
            described[0].status.as_ref().unwrap()["endpoint"].as_str(),
            Some("http://localhost:51121")
        );
    }

    #[test]
    fn test_delete_plane_of_other_kind_is_not_found() {
        let f = fixture();
        let reference = Document::reference("RemoteControlPlane", "cp");
        let err = delete_plane(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(executor::is_not_found(&err));
        assert!(f.session.store().load("edge").unwrap().control_plane.is_some());
    }

    #[test]
    fn test_delete_local_plane() {
        let f = fixture();
        let reference = Document::reference("LocalControlPlane", "cp");
        delete_plane(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        assert!(f.session.store().load("edge").unwrap().control_plane.is_none());
        assert!(f.runner.calls().iter().any(|c| c == "docker rm -f fogctl-controller"));
    }

    #[test]
    fn test_remote_controller_added_then_updated() {
        let f = fixture();
        fresh_namespace(&f);
        let plane_doc = one(&REMOTE_PLANE.replace("      airgap: true\n", ""));
        deploy_plane(&f.session, &plane_doc.input("edge"))
            .unwrap()
            .execute()
            .unwrap();

        let controller_doc = one(
            "apiVersion: fogctl.io/v3\nkind: RemoteController\nmetadata:\n  name: ctl-2\nspec:\n  host: 10.0.0.3\n  ssh:\n    user: ubuntu\n",
        );
        for _ in 0..2 {
            deploy_controller(&f.session, &controller_doc.input("edge"))
                .unwrap()
                .execute()
                .unwrap();
        }
        let stored = f.session.store().load("edge").unwrap();
        let plane = stored.control_plane.unwrap();
        assert_eq!(plane.controller_names(), vec!["ctl-1", "ctl-2"]);
        assert_eq!(f.connector.commands_for("10.0.0.3").len(), 2);

        let reference = Document::reference("RemoteController", "ctl-2");
        describe_controller(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(
            f.session.described()[0].spec["host"].as_str(),
            Some("10.0.0.3")
        );

        delete_controller(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        let err = delete_controller(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(executor::is_not_found(&err));
    }

    #[test]
    fn test_controller_without_plane_fails() {
        let f = fixture();
        fresh_namespace(&f);
        let doc = one(
            "apiVersion: fogctl.io/v3\nkind: LocalController\nmetadata:\n  name: local\nspec: {}\n",
        );
        let err = deploy_controller(&f.session, &doc.input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(err.to_string().contains("no control plane"));
    }
}
