//! Kinds the Controller stores as-is
//!
//! Applications, microservices, secrets, RBAC and the like are forwarded
//! to the Controller API. Kinds with a known shape are decoded strictly
//! first so that typos fail before anything is sent.

use super::{Session, executor_name};
use crate::resource::specs::{
    DataMap, EmptySpec, RegistrySpec, RoleBindingSpec, RoleSpec, SecretSpec, SecretType,
    ServiceAccountSpec, VolumeMountSpec, decode,
};
use crate::resource::{self, Envelope, Kind};
use anyhow::{Context, Result};
use executor::{BoxedExecutor, Executor, FactoryInput, NotFound};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

pub type FactoryFn = fn(&Arc<Session>, &FactoryInput<'_>) -> Result<BoxedExecutor>;

/// Map a Controller not-found into the pipeline's marker
pub fn controller_error(kind: &str, name: &str, error: controller::Error) -> anyhow::Error {
    if error.is_not_found() {
        NotFound::new(kind, name).into()
    } else {
        anyhow::Error::new(error)
    }
}

fn kind_of(input: &FactoryInput<'_>) -> Result<(Kind, &'static str)> {
    let kind = Kind::parse(input.kind).with_context(|| format!("Unknown kind {}", input.kind))?;
    let collection = kind
        .collection()
        .with_context(|| format!("{} is not stored by the Controller", kind))?;
    Ok((kind, collection))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn required_data(input: &FactoryInput<'_>) -> Result<DataMap> {
    let data = input.data.ok_or_else(|| resource::Error::Spec {
        kind: input.kind.to_string(),
        name: input.name.to_string(),
        message: "data section is required".to_string(),
    })?;
    Ok(decode(input.kind, input.name, data)?)
}

/// Request body for a document
pub fn resource_body(kind: Kind, input: &FactoryInput<'_>) -> Result<Value> {
    let (kind_name, name, spec) = (input.kind, input.name, input.spec);
    let mut body = match kind {
        Kind::Secret => {
            let secret: SecretSpec = decode(kind_name, name, spec)?;
            let data = required_data(input)?;
            if secret.secret_type == SecretType::Tls
                && !(data.contains_key("tls.crt") && data.contains_key("tls.key"))
            {
                return Err(resource::Error::Spec {
                    kind: kind_name.to_string(),
                    name: name.to_string(),
                    message: "tls secrets need tls.crt and tls.key".to_string(),
                }
                .into());
            }
            json!({ "type": secret.secret_type, "data": data })
        }
        Kind::ConfigMap => {
            decode::<EmptySpec>(kind_name, name, spec)?;
            json!({ "data": required_data(input)? })
        }
        Kind::Role => to_json(&decode::<RoleSpec>(kind_name, name, spec)?)?,
        Kind::RoleBinding => to_json(&decode::<RoleBindingSpec>(kind_name, name, spec)?)?,
        Kind::ServiceAccount => to_json(&decode::<ServiceAccountSpec>(kind_name, name, spec)?)?,
        Kind::Registry => to_json(&decode::<RegistrySpec>(kind_name, name, spec)?)?,
        Kind::VolumeMount => {
            let mount: VolumeMountSpec = decode(kind_name, name, spec)?;
            mount.validate(name)?;
            to_json(&mount)?
        }
        _ => decode::<Value>(kind_name, name, spec)?,
    };

    let object = body.as_object_mut().ok_or_else(|| resource::Error::Spec {
        kind: kind_name.to_string(),
        name: name.to_string(),
        message: "spec must be a mapping".to_string(),
    })?;
    object.insert("name".to_string(), json!(name));
    if !input.tags.is_empty() {
        object.insert("tags".to_string(), json!(input.tags));
    }
    Ok(body)
}

struct ApplyResource {
    name: String,
    session: Arc<Session>,
    collection: &'static str,
    resource: String,
    body: Value,
}

impl Executor for ApplyResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let api = self.session.controller()?;
        api.upsert_resource(self.collection, &self.resource, &self.body)
            .with_context(|| format!("Failed to deploy {}", self.name))?;
        log::info!("Deployed {}", self.name);
        Ok(())
    }
}

pub fn deploy(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    let (kind, collection) = kind_of(input)?;
    Ok(Box::new(ApplyResource {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        collection,
        resource: input.name.to_string(),
        body: resource_body(kind, input)?,
    }))
}

struct DeleteResource {
    name: String,
    session: Arc<Session>,
    kind: Kind,
    collection: &'static str,
    resource: String,
}

impl Executor for DeleteResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let api = self.session.controller()?;
        api.delete_resource(self.collection, &self.resource)
            .map_err(|e| controller_error(self.kind.as_str(), &self.resource, e))?;
        log::info!("Deleted {}", self.name);
        Ok(())
    }
}

pub fn delete(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    let (kind, collection) = kind_of(input)?;
    Ok(Box::new(DeleteResource {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind,
        collection,
        resource: input.name.to_string(),
    }))
}

struct DescribeResource {
    name: String,
    session: Arc<Session>,
    kind: Kind,
    collection: &'static str,
    resource: String,
}

impl Executor for DescribeResource {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let api = self.session.controller()?;
        let mut body = api
            .get_resource(self.collection, &self.resource)
            .map_err(|e| controller_error(self.kind.as_str(), &self.resource, e))?;

        let data = match body.as_object_mut() {
            Some(object) => {
                object.remove("name");
                match self.kind {
                    Kind::Secret | Kind::ConfigMap => object.remove("data"),
                    _ => None,
                }
            }
            None => None,
        };

        let mut envelope = Envelope::describe(
            self.kind.as_str(),
            &self.resource,
            self.session.namespace(),
            serde_yaml_ng::to_value(&body)?,
        );
        if let Some(data) = data {
            envelope.data = Some(serde_yaml_ng::to_value(&data)?);
        }
        self.session.describe(envelope);
        Ok(())
    }
}

pub fn describe(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    let (kind, collection) = kind_of(input)?;
    Ok(Box::new(DescribeResource {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        kind,
        collection,
        resource: input.name.to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::fixture;
    use crate::resource::{Document, parse_documents};

    fn one(yaml: &str) -> Document {
        parse_documents(yaml, "edge").unwrap().remove(0)
    }

    #[test]
    fn test_secret_body_carries_type_and_data() {
        let doc = one(
            "apiVersion: fogctl.io/v3\nkind: Secret\nmetadata:\n  name: creds\n  tags: [prod]\nspec:\n  type: opaque\ndata:\n  token: abc\n",
        );
        let body = resource_body(Kind::Secret, &doc.input("edge")).unwrap();
        assert_eq!(body["type"], "opaque");
        assert_eq!(body["data"]["token"], "abc");
        assert_eq!(body["name"], "creds");
        assert_eq!(body["tags"][0], "prod");
    }

    #[test]
    fn test_secret_without_data_rejected() {
        let doc = one("apiVersion: fogctl.io/v3\nkind: Secret\nmetadata:\n  name: creds\n");
        assert!(resource_body(Kind::Secret, &doc.input("edge")).is_err());
    }

    #[test]
    fn test_tls_secret_needs_key_pair() {
        let doc = one(
            "apiVersion: fogctl.io/v3\nkind: Secret\nmetadata:\n  name: tls\nspec:\n  type: tls\ndata:\n  tls.crt: abc\n",
        );
        let err = resource_body(Kind::Secret, &doc.input("edge")).unwrap_err();
        assert!(err.to_string().contains("tls.key"));
    }

    #[test]
    fn test_generic_spec_passes_through() {
        let doc = one(
            "apiVersion: fogctl.io/v3\nkind: Microservice\nmetadata:\n  name: api\nspec:\n  agent: edge-1\n  images:\n    x86: ghcr.io/acme/api:1\n",
        );
        let body = resource_body(Kind::Microservice, &doc.input("edge")).unwrap();
        assert_eq!(body["agent"], "edge-1");
        assert_eq!(body["images"]["x86"], "ghcr.io/acme/api:1");
    }

    #[test]
    fn test_apply_then_describe() {
        let f = fixture();
        let doc = one(
            "apiVersion: fogctl.io/v3\nkind: ConfigMap\nmetadata:\n  name: settings\ndata:\n  level: debug\n",
        );
        deploy(&f.session, &doc.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        assert_eq!(
            f.controller.resource("configmaps", "settings").unwrap()["data"]["level"],
            "debug"
        );

        let reference = Document::reference("ConfigMap", "settings");
        describe(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap();
        let described = f.session.described();
        assert_eq!(described.len(), 1);
        assert_eq!(described[0].metadata.name, "settings");
        assert_eq!(
            described[0].data.as_ref().unwrap()["level"].as_str(),
            Some("debug")
        );
    }

    #[test]
    fn test_describe_missing_is_not_found() {
        let f = fixture();
        let reference = Document::reference("Application", "ghost");
        let err = describe(&f.session, &reference.input("edge"))
            .unwrap()
            .execute()
            .unwrap_err();
        assert!(executor::is_not_found(&err));
    }
}
