//! In-memory Controller for tests.

use crate::client::ControllerApi;
use crate::error::{Error, Result};
use crate::types::{Agent, CatalogItem, ControllerStatus};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockState {
    resources: BTreeMap<(String, String), Value>,
    agents: Vec<Agent>,
    catalog: Vec<CatalogItem>,
    calls: Vec<String>,
    failing: HashSet<(String, String)>,
    unready_polls: u32,
    next_id: u64,
}

/// Controller keeping everything in memory.
///
/// Clones share state, so a test can hand one clone to the code under test
/// and inspect another.
///
/// ```
/// use controller::{ControllerApi, MockController};
/// use serde_json::json;
///
/// let mock = MockController::new();
/// mock.upsert_resource("secrets", "db", &json!({"type": "opaque"})).unwrap();
/// assert!(mock.resource("secrets", "db").is_some());
/// assert!(mock.delete_resource("secrets", "missing").unwrap_err().is_not_found());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockController {
    state: Arc<Mutex<MockState>>,
}

impl MockController {
    /// Create an empty, ready Controller.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent.
    pub fn add_agent(&self, agent: Agent) {
        self.state.lock().unwrap().agents.push(agent);
    }

    /// Seed a resource.
    pub fn insert_resource(&self, collection: &str, name: &str, body: Value) {
        self.state
            .lock()
            .unwrap()
            .resources
            .insert((collection.to_string(), name.to_string()), body);
    }

    /// Seed a catalog item.
    pub fn insert_catalog_item(&self, item: CatalogItem) {
        self.state.lock().unwrap().catalog.push(item);
    }

    /// Current body of a resource.
    #[must_use]
    pub fn resource(&self, collection: &str, name: &str) -> Option<Value> {
        self.state
            .lock()
            .unwrap()
            .resources
            .get(&(collection.to_string(), name.to_string()))
            .cloned()
    }

    /// Catalog item by name.
    #[must_use]
    pub fn catalog_item(&self, name: &str) -> Option<CatalogItem> {
        self.state
            .lock()
            .unwrap()
            .catalog
            .iter()
            .find(|item| item.name == name)
            .cloned()
    }

    /// Make every call on one resource fail with HTTP 500.
    pub fn fail_resource(&self, collection: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .failing
            .insert((collection.to_string(), name.to_string()));
    }

    /// Report `starting` for the next `polls` status calls.
    pub fn set_unready(&self, polls: u32) {
        self.state.lock().unwrap().unready_polls = polls;
    }

    /// Calls received, in order (`METHOD collection/name`).
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, method: &str, collection: &str, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("{} {}/{}", method, collection, name));
        if state
            .failing
            .contains(&(collection.to_string(), name.to_string()))
        {
            return Err(Error::Http {
                method: method.to_string(),
                path: format!("/api/v3/{}/{}", collection, name),
                message: "HTTP 500: internal error".to_string(),
                status: Some(500),
            });
        }
        Ok(())
    }
}

impl ControllerApi for MockController {
    fn endpoint(&self) -> &str {
        "mock://controller"
    }

    fn status(&self) -> Result<ControllerStatus> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("GET status".to_string());
        if state.unready_polls > 0 {
            state.unready_polls -= 1;
            return Ok(ControllerStatus {
                status: "starting".to_string(),
                version: String::new(),
            });
        }
        Ok(ControllerStatus {
            status: "online".to_string(),
            version: "mock".to_string(),
        })
    }

    fn get_resource(&self, collection: &str, name: &str) -> Result<Value> {
        self.record("GET", collection, name)?;
        self.resource(collection, name)
            .ok_or_else(|| Error::not_found(collection, name))
    }

    fn upsert_resource(&self, collection: &str, name: &str, body: &Value) -> Result<()> {
        self.record("PUT", collection, name)?;
        self.insert_resource(collection, name, body.clone());
        Ok(())
    }

    fn delete_resource(&self, collection: &str, name: &str) -> Result<()> {
        self.record("DELETE", collection, name)?;
        self.state
            .lock()
            .unwrap()
            .resources
            .remove(&(collection.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| Error::not_found(collection, name))
    }

    fn list_agents(&self) -> Result<Vec<Agent>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("GET iofog-list".to_string());
        Ok(state.agents.clone())
    }

    fn get_catalog_item(&self, name: &str) -> Result<Option<CatalogItem>> {
        self.record("GET", "catalog/microservices", name)?;
        Ok(self.catalog_item(name))
    }

    fn create_catalog_item(&self, item: &CatalogItem) -> Result<CatalogItem> {
        self.record("POST", "catalog/microservices", &item.name)?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let created = CatalogItem {
            id: Some(100 + state.next_id),
            ..item.clone()
        };
        state.catalog.push(created.clone());
        Ok(created)
    }

    fn update_catalog_item(&self, id: u64, item: &CatalogItem) -> Result<CatalogItem> {
        self.record("PATCH", "catalog/microservices", &item.name)?;
        let mut state = self.state.lock().unwrap();
        let slot = state
            .catalog
            .iter_mut()
            .find(|existing| existing.id == Some(id))
            .ok_or_else(|| Error::not_found("catalog item", id.to_string()))?;
        *slot = CatalogItem {
            id: Some(id),
            ..item.clone()
        };
        Ok(slot.clone())
    }

    fn delete_catalog_item(&self, id: u64) -> Result<()> {
        self.record("DELETE", "catalog/microservices", &id.to_string())?;
        let mut state = self.state.lock().unwrap();
        let before = state.catalog.len();
        state.catalog.retain(|item| item.id != Some(id));
        if state.catalog.len() == before {
            return Err(Error::not_found("catalog item", id.to_string()));
        }
        Ok(())
    }
}
