//! Resource documents
//!
//! Every deployable entity is a YAML document with the same envelope:
//!
//! ```yaml
//! apiVersion: fogctl.io/v3
//! kind: Application
//! metadata:
//!   name: shop
//!   namespace: edge      # optional, must match the command's namespace
//!   tags: [retail]
//! spec: { ... }
//! data: { ... }          # Secret / ConfigMap only
//! ```
//!
//! Documents are parsed and validated up front, so a bad document in a
//! multi-document file is rejected before anything is deployed.

pub mod kinds;
pub mod rbac;
pub mod specs;

use executor::FactoryInput;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::{Mapping, Value};

pub use kinds::{Kind, apply_order, delete_order};

/// Current API version, used when rendering documents
pub const API_VERSION: &str = "fogctl.io/v3";

/// Accepted `apiVersion` values, current first
pub const API_VERSIONS: &[&str] = &[API_VERSION, "fogctl.io/v2"];

/// Input errors found while reading documents
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("document {document}: {message}")]
    Yaml { document: usize, message: String },

    #[error(
        "document {document} ({kind} {name}): unsupported apiVersion '{api_version}', expected one of: {supported}",
        supported = API_VERSIONS.join(", ")
    )]
    UnsupportedApiVersion {
        document: usize,
        kind: String,
        name: String,
        api_version: String,
    },

    #[error(
        "{kind} {name} belongs to namespace '{found}' but the command targets namespace '{expected}'"
    )]
    NamespaceMismatch {
        kind: String,
        name: String,
        found: String,
        expected: String,
    },

    #[error("document {document} ({kind}) has no metadata.name")]
    MissingName { document: usize, kind: String },

    #[error("no resources of a supported kind found in input")]
    Empty,

    #[error("{kind} {name}: invalid spec: {message}")]
    Spec {
        kind: String,
        name: String,
        message: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Envelope {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub spec: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Value>,
}

impl Envelope {
    /// Rendered document for `describe`
    pub fn describe(kind: &str, name: &str, namespace: &str, spec: Value) -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: kind.to_string(),
            metadata: Metadata {
                name: name.to_string(),
                namespace: Some(namespace.to_string()),
                tags: Vec::new(),
            },
            spec,
            data: None,
            status: None,
        }
    }

    pub fn with_status(mut self, status: Value) -> Self {
        self.status = Some(status);
        self
    }

    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}

/// A validated document, ready to be handed to an executor factory
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: String,
    pub name: String,
    pub tags: Vec<String>,
    spec: Vec<u8>,
    data: Option<Vec<u8>>,
}

impl Document {
    /// A document carrying only a kind and a name (describe, delete by name)
    pub fn reference(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            tags: Vec::new(),
            spec: b"{}\n".to_vec(),
            data: None,
        }
    }

    fn from_envelope(envelope: Envelope) -> Result<Self, Error> {
        let encode = |value: &Value| {
            serde_yaml_ng::to_string(value).map_err(|e| Error::Spec {
                kind: envelope.kind.clone(),
                name: envelope.metadata.name.clone(),
                message: e.to_string(),
            })
        };
        let spec = match &envelope.spec {
            Value::Null => Value::Mapping(Mapping::new()),
            other => other.clone(),
        };
        let spec = encode(&spec)?.into_bytes();
        let data = match &envelope.data {
            Some(value) => Some(encode(value)?.into_bytes()),
            None => None,
        };
        Ok(Self {
            kind: envelope.kind,
            name: envelope.metadata.name,
            tags: envelope.metadata.tags,
            spec,
            data,
        })
    }

    pub fn known_kind(&self) -> Option<Kind> {
        Kind::parse(&self.kind)
    }

    /// Factory input bound to the command's namespace
    pub fn input<'a>(&'a self, namespace: &'a str) -> FactoryInput<'a> {
        FactoryInput {
            kind: &self.kind,
            namespace,
            name: &self.name,
            spec: &self.spec,
            data: self.data.as_deref(),
            tags: &self.tags,
        }
    }
}

/// Parse a multi-document YAML stream
///
/// Empty documents are skipped. Every document must carry a supported
/// `apiVersion`, a name, and either no namespace or `namespace`.
pub fn parse_documents(input: &str, namespace: &str) -> Result<Vec<Document>, Error> {
    let mut documents = Vec::new();

    for (index, raw) in serde_yaml_ng::Deserializer::from_str(input).enumerate() {
        let number = index + 1;
        let yaml_error = |e: serde_yaml_ng::Error| Error::Yaml {
            document: number,
            message: e.to_string(),
        };

        let mut value = Value::deserialize(raw).map_err(yaml_error)?;
        if value.is_null() {
            continue;
        }
        rbac::normalize(&mut value);
        let envelope: Envelope = serde_yaml_ng::from_value(value).map_err(yaml_error)?;

        if envelope.metadata.name.trim().is_empty() {
            return Err(Error::MissingName {
                document: number,
                kind: envelope.kind,
            });
        }
        if !API_VERSIONS.contains(&envelope.api_version.as_str()) {
            return Err(Error::UnsupportedApiVersion {
                document: number,
                kind: envelope.kind,
                name: envelope.metadata.name,
                api_version: envelope.api_version,
            });
        }
        if let Some(found) = &envelope.metadata.namespace
            && found != namespace
        {
            return Err(Error::NamespaceMismatch {
                kind: envelope.kind.clone(),
                name: envelope.metadata.name.clone(),
                found: found.clone(),
                expected: namespace.to_string(),
            });
        }
        let document = Document::from_envelope(envelope)?;
        if document.known_kind().is_none() {
            log::warn!(
                "Document {} has unknown kind '{}', it will be skipped",
                number,
                document.kind
            );
        }

        log::debug!(
            "Parsed document {}: {} {}",
            number,
            document.kind,
            document.name
        );
        documents.push(document);
    }

    Ok(documents)
}
