//! Typed `spec` sections
//!
//! Kinds that fogctl interprets itself (agents, volumes, catalog items,
//! RBAC and the secret-like kinds) decode strictly: unknown fields are an
//! input error. Everything else is forwarded to the Controller untouched.

use crate::plane::SshSpec;
use crate::resource::Error;
use airgap::{ContainerEngine, Platform};
use controller::{CatalogImage, CatalogItem};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Decode a serialized `spec` (or `data`) section into `T`
pub fn decode<T: DeserializeOwned>(kind: &str, name: &str, bytes: &[u8]) -> Result<T, Error> {
    let spec_error = |message: String| Error::Spec {
        kind: kind.to_string(),
        name: name.to_string(),
        message,
    };
    let text = std::str::from_utf8(bytes).map_err(|e| spec_error(e.to_string()))?;
    serde_yaml_ng::from_str(text).map_err(|e| spec_error(e.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    #[default]
    Opaque,
    Tls,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SecretSpec {
    #[serde(default, rename = "type")]
    pub secret_type: SecretType,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EmptySpec {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PolicyRule {
    #[serde(default)]
    pub api_groups: Vec<String>,
    pub resources: Vec<String>,
    pub verbs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleSpec {
    pub rules: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleRef {
    #[serde(default = "default_role_kind")]
    pub kind: String,
    pub name: String,
}

fn default_role_kind() -> String {
    "Role".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Subject {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleBindingSpec {
    pub role_ref: RoleRef,
    #[serde(default)]
    pub subjects: Vec<Subject>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ServiceAccountSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_ref: Option<RoleRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistrySpec {
    pub url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeMountSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map_name: Option<String>,
}

impl VolumeMountSpec {
    pub fn validate(&self, name: &str) -> Result<(), Error> {
        match (&self.secret_name, &self.config_map_name) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(Error::Spec {
                kind: "VolumeMount".to_string(),
                name: name.to_string(),
                message: "exactly one of secretName and configMapName is required".to_string(),
            }),
        }
    }
}

/// Where a catalog item's images are pulled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogRegistry {
    /// A remote registry (Docker Hub or a configured one)
    #[default]
    Remote,
    /// Images pre-loaded on the agents
    Local,
}

impl CatalogRegistry {
    pub fn id(self) -> u64 {
        match self {
            Self::Remote => 1,
            Self::Local => controller::LOCAL_CACHE_REGISTRY_ID,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatalogItemSpec {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub registry: CatalogRegistry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x86: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arm: Option<String>,
}

impl CatalogItemSpec {
    pub fn to_item(&self, name: &str) -> Result<CatalogItem, Error> {
        let mut images = Vec::new();
        if let Some(image) = self.x86.as_deref().filter(|i| !i.trim().is_empty()) {
            images.push(CatalogImage {
                container_image: image.trim().to_string(),
                fog_type_id: 1,
            });
        }
        if let Some(image) = self.arm.as_deref().filter(|i| !i.trim().is_empty()) {
            images.push(CatalogImage {
                container_image: image.trim().to_string(),
                fog_type_id: 2,
            });
        }
        if images.is_empty() {
            return Err(Error::Spec {
                kind: "CatalogItem".to_string(),
                name: name.to_string(),
                message: "at least one of x86 and arm images is required".to_string(),
            });
        }
        Ok(CatalogItem {
            id: None,
            name: name.to_string(),
            description: self.description.clone(),
            category: self.category.clone(),
            registry_id: self.registry.id(),
            images,
        })
    }

    pub fn from_item(item: &CatalogItem) -> Self {
        let image_for = |fog_type: i64| {
            item.images
                .iter()
                .find(|i| i.fog_type_id == fog_type)
                .map(|i| i.container_image.clone())
        };
        Self {
            description: item.description.clone(),
            category: item.category.clone(),
            registry: if item.is_offline() {
                CatalogRegistry::Local
            } else {
                CatalogRegistry::Remote
            },
            x86: image_for(1),
            arm: image_for(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemoteAgentSpec {
    pub host: String,
    pub ssh: SshSpec,
    #[serde(default = "default_engine")]
    pub container_engine: ContainerEngine,
    /// Host platform, e.g. `linux/arm64` (default `linux/amd64`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Ship the agent image over SSH instead of letting the host pull it
    #[serde(default)]
    pub airgap: bool,
    /// Operator-supplied install command, run verbatim on the host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_command: Option<String>,
}

fn default_engine() -> ContainerEngine {
    ContainerEngine::Docker
}

impl RemoteAgentSpec {
    pub fn platform(&self) -> airgap::Result<Platform> {
        match &self.platform {
            Some(value) => Platform::parse(value),
            None => Ok(Platform::linux_amd64()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalAgentSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_engine: Option<ContainerEngine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl LocalAgentSpec {
    pub fn engine(&self) -> ContainerEngine {
        self.container_engine.unwrap_or(ContainerEngine::Docker)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct VolumeSpec {
    pub source: String,
    pub destination: String,
    #[serde(default = "default_permissions")]
    pub permissions: String,
    pub agents: Vec<String>,
}

fn default_permissions() -> String {
    "0755".to_string()
}

impl VolumeSpec {
    pub fn validate(&self, name: &str) -> Result<(), Error> {
        let spec_error = |message: &str| Error::Spec {
            kind: "Volume".to_string(),
            name: name.to_string(),
            message: message.to_string(),
        };
        if self.source.trim().is_empty() || self.destination.trim().is_empty() {
            return Err(spec_error("source and destination are required"));
        }
        if !self.destination.starts_with('/') {
            return Err(spec_error("destination must be an absolute path"));
        }
        let octal = (3..=4).contains(&self.permissions.len())
            && self.permissions.chars().all(|c| ('0'..='7').contains(&c));
        if !octal {
            return Err(spec_error("permissions must be an octal mode such as 0755"));
        }
        if self.agents.is_empty() {
            return Err(spec_error("at least one agent is required"));
        }
        Ok(())
    }
}

/// `data` section of a Secret or ConfigMap
pub type DataMap = BTreeMap<String, String>;
