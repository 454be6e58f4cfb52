//! Controller API data types.

use serde::{Deserialize, Serialize};

/// Registry id the Controller uses for images pre-loaded on agents.
pub const LOCAL_CACHE_REGISTRY_ID: u64 = 2;

/// Catalog category reserved for Controller-managed items.
pub const SYSTEM_CATEGORY: &str = "SYSTEM";

/// Health of a Controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControllerStatus {
    /// Overall status string (`online` when ready).
    pub status: String,
    /// Controller version.
    #[serde(default)]
    pub version: String,
}

impl ControllerStatus {
    /// Whether the Controller accepts requests.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status.eq_ignore_ascii_case("online")
    }
}

/// An agent as reported by the Controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Agent id.
    #[serde(default)]
    pub uuid: String,
    /// Agent name.
    pub name: String,
    /// Architecture code: 0 auto, 1 x86, 2 arm.
    #[serde(default)]
    pub fog_type: i64,
    /// Container engine (`docker` or `podman`).
    #[serde(default)]
    pub container_engine: Option<String>,
    /// Host the agent runs on.
    #[serde(default)]
    pub host: Option<String>,
    /// Reported daemon status.
    #[serde(default)]
    pub daemon_status: Option<String>,
}

/// One per-architecture image of a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogImage {
    /// Image reference.
    pub container_image: String,
    /// Architecture code (1 x86, 2 arm).
    pub fog_type_id: i64,
}

/// A microservice catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogItem {
    /// Id assigned by the Controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    /// Unique name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Category (`SYSTEM` for Controller-managed items).
    #[serde(default)]
    pub category: String,
    /// Registry the images are pulled from.
    pub registry_id: u64,
    /// Images per architecture.
    #[serde(default)]
    pub images: Vec<CatalogImage>,
}

impl CatalogItem {
    /// Whether the item belongs to the system category.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.category.eq_ignore_ascii_case(SYSTEM_CATEGORY)
    }

    /// Whether images come from agents' local cache rather than a registry.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.registry_id == LOCAL_CACHE_REGISTRY_ID
    }
}
