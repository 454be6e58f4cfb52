//! Controller API trait and HTTP implementation.

use crate::error::{Error, Result};
use crate::types::{Agent, CatalogItem, ControllerStatus};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Mutex;
use std::time::Duration;

/// Operations the CLI needs from a Controller.
///
/// Resources are addressed by collection (e.g. `applications`, `secrets`)
/// and name; bodies are passed through as JSON.
pub trait ControllerApi: Send + Sync {
    /// Base URL of the Controller.
    fn endpoint(&self) -> &str;

    /// Controller health; does not require a session.
    fn status(&self) -> Result<ControllerStatus>;

    /// Fetch one resource.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the resource does not exist.
    fn get_resource(&self, collection: &str, name: &str) -> Result<Value>;

    /// Create or replace a resource.
    fn upsert_resource(&self, collection: &str, name: &str, body: &Value) -> Result<()>;

    /// Delete a resource.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the resource does not exist.
    fn delete_resource(&self, collection: &str, name: &str) -> Result<()>;

    /// All agents known to the Controller.
    fn list_agents(&self) -> Result<Vec<Agent>>;

    /// One agent by name.
    fn get_agent(&self, name: &str) -> Result<Agent> {
        self.list_agents()?
            .into_iter()
            .find(|agent| agent.name == name)
            .ok_or_else(|| Error::not_found("agent", name))
    }

    /// Catalog item by name, if it exists.
    fn get_catalog_item(&self, name: &str) -> Result<Option<CatalogItem>>;

    /// Create a catalog item; returns it with its assigned id.
    fn create_catalog_item(&self, item: &CatalogItem) -> Result<CatalogItem>;

    /// Replace the catalog item with `id`.
    fn update_catalog_item(&self, id: u64, item: &CatalogItem) -> Result<CatalogItem>;

    /// Remove the catalog item with `id`.
    fn delete_catalog_item(&self, id: u64) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

/// Controller client over HTTP.
///
/// # Example
///
/// ```no_run
/// use controller::{ControllerApi, HttpController};
///
/// let client = HttpController::new("10.0.0.2:51121")
///     .with_credentials("ops@example.com", "secret");
/// let status = client.status().unwrap();
/// println!("{} {}", status.status, status.version);
/// ```
pub struct HttpController {
    agent: ureq::Agent,
    endpoint: String,
    credentials: Option<(String, String)>,
    token: Mutex<Option<String>>,
}

impl HttpController {
    /// Create a client; `http://` is assumed when no scheme is given.
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(60)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            endpoint: normalize_endpoint(&endpoint.into()),
            credentials: None,
            token: Mutex::new(None),
        }
    }

    /// Log in with these credentials when a session is needed.
    #[must_use]
    pub fn with_credentials(mut self, email: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some((email.into(), password.into()));
        self
    }

    /// Use an existing access token.
    #[must_use]
    pub fn with_token(self, token: impl Into<String>) -> Self {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.into());
        }
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v3/{}", self.endpoint, path.trim_start_matches('/'))
    }

    fn login(&self) -> Result<String> {
        let Some((email, password)) = &self.credentials else {
            return Err(Error::NotLoggedIn(self.endpoint.clone()));
        };
        log::debug!("Logging in to {} as {}", self.endpoint, email);
        let body = json!({ "email": email, "password": password });
        let response = self
            .raw(Method::Post, "user/login", Some(&body), None)?
            .ok_or_else(|| Error::InvalidResponse("empty login response".to_string()))?;
        let login: LoginResponse = serde_json::from_value(response)?;
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(login.access_token.clone());
        }
        Ok(login.access_token)
    }

    fn current_token(&self) -> Result<String> {
        let cached = self.token.lock().ok().and_then(|slot| slot.clone());
        match cached {
            Some(token) => Ok(token),
            None => self.login(),
        }
    }

    /// Authenticated request; logs in again once on 401.
    fn request(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        let token = self.current_token()?;
        match self.raw(method, path, body, Some(&token)) {
            Err(Error::Http {
                status: Some(401), ..
            }) if self.credentials.is_some() => {
                log::debug!("Session expired, logging in again");
                let token = self.login()?;
                self.raw(method, path, body, Some(&token))
            }
            other => other,
        }
    }

    fn raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<Option<Value>> {
        let url = self.url(path);
        let authorization = token.map(|t| format!("Bearer {}", t));
        log::trace!("{} {}", method.as_str(), url);

        macro_rules! authorized {
            ($builder:expr) => {{
                let builder = $builder.header("Accept", "application/json");
                match &authorization {
                    Some(value) => builder.header("Authorization", value.as_str()),
                    None => builder,
                }
            }};
        }

        let result = match method {
            Method::Get => authorized!(self.agent.get(&url)).call(),
            Method::Delete => authorized!(self.agent.delete(&url)).call(),
            Method::Post | Method::Put | Method::Patch => {
                let builder = match method {
                    Method::Post => self.agent.post(&url),
                    Method::Put => self.agent.put(&url),
                    _ => self.agent.patch(&url),
                };
                match body {
                    Some(body) => authorized!(builder).send_json(body),
                    None => authorized!(builder).send_empty(),
                }
            }
        };

        let http_error = |message: String, status: Option<u16>| Error::Http {
            method: method.as_str().to_string(),
            path: format!("/api/v3/{}", path.trim_start_matches('/')),
            message,
            status,
        };

        let mut response = result.map_err(|e| http_error(e.to_string(), None))?;
        let status = response.status().as_u16();
        let text = response
            .body_mut()
            .read_to_string()
            .map_err(|e| http_error(e.to_string(), Some(status)))?;

        if !(200..300).contains(&status) {
            return Err(http_error(error_message(status, &text), Some(status)));
        }
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }
}

impl ControllerApi for HttpController {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn status(&self) -> Result<ControllerStatus> {
        let value = self
            .raw(Method::Get, "status", None, None)?
            .ok_or_else(|| Error::InvalidResponse("empty status response".to_string()))?;
        Ok(serde_json::from_value(value)?)
    }

    fn get_resource(&self, collection: &str, name: &str) -> Result<Value> {
        self.request(Method::Get, &format!("{}/{}", collection, name), None)
            .map_err(|e| not_found_as(e, collection, name))?
            .ok_or_else(|| Error::not_found(collection, name))
    }

    fn upsert_resource(&self, collection: &str, name: &str, body: &Value) -> Result<()> {
        match self.request(Method::Put, &format!("{}/{}", collection, name), Some(body)) {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                log::debug!("{} {} does not exist yet, creating", collection, name);
                self.request(Method::Post, collection, Some(body)).map(|_| ())
            }
            Err(e) => Err(e),
        }
    }

    fn delete_resource(&self, collection: &str, name: &str) -> Result<()> {
        self.request(Method::Delete, &format!("{}/{}", collection, name), None)
            .map(|_| ())
            .map_err(|e| not_found_as(e, collection, name))
    }

    fn list_agents(&self) -> Result<Vec<Agent>> {
        let value = self.request(Method::Get, "iofog-list", None)?;
        let list: AgentList = match value {
            Some(value) => serde_json::from_value(value)?,
            None => AgentList::default(),
        };
        Ok(list.fogs)
    }

    fn get_catalog_item(&self, name: &str) -> Result<Option<CatalogItem>> {
        let value = self.request(Method::Get, "catalog/microservices", None)?;
        let list: CatalogList = match value {
            Some(value) => serde_json::from_value(value)?,
            None => CatalogList::default(),
        };
        Ok(list.catalog_items.into_iter().find(|item| item.name == name))
    }

    fn create_catalog_item(&self, item: &CatalogItem) -> Result<CatalogItem> {
        let body = serde_json::to_value(item)?;
        let created = self.request(Method::Post, "catalog/microservices", Some(&body))?;
        let id = created
            .as_ref()
            .and_then(|v| v.get("id"))
            .and_then(Value::as_u64);
        Ok(CatalogItem {
            id: id.or(item.id),
            ..item.clone()
        })
    }

    fn update_catalog_item(&self, id: u64, item: &CatalogItem) -> Result<CatalogItem> {
        let mut body = serde_json::to_value(item)?;
        if let Some(object) = body.as_object_mut() {
            object.remove("id");
        }
        self.request(
            Method::Patch,
            &format!("catalog/microservices/{}", id),
            Some(&body),
        )?;
        Ok(CatalogItem {
            id: Some(id),
            ..item.clone()
        })
    }

    fn delete_catalog_item(&self, id: u64) -> Result<()> {
        self.request(Method::Delete, &format!("catalog/microservices/{}", id), None)
            .map(|_| ())
            .map_err(|e| not_found_as(e, "catalog item", &id.to_string()))
    }
}

fn not_found_as(error: Error, kind: &str, name: &str) -> Error {
    if error.is_not_found() {
        Error::not_found(kind, name)
    } else {
        error
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

/// Prefer the Controller's `message` field over the raw body.
fn error_message(status: u16, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            let body = body.trim();
            if body.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, body)
            }
        })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct AgentList {
    #[serde(default)]
    fogs: Vec<Agent>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CatalogList {
    #[serde(default)]
    catalog_items: Vec<CatalogItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_endpoint() {
        assert_eq!(normalize_endpoint("10.0.0.2:51121/"), "http://10.0.0.2:51121");
        assert_eq!(
            normalize_endpoint("https://ctrl.example.com"),
            "https://ctrl.example.com"
        );
    }

    #[test]
    fn test_url() {
        let client = HttpController::new("localhost:51121");
        assert_eq!(
            client.url("/applications/shop"),
            "http://localhost:51121/api/v3/applications/shop"
        );
        assert_eq!(client.endpoint(), "http://localhost:51121");
    }

    #[test]
    fn test_error_message_prefers_json_message() {
        assert_eq!(
            error_message(400, r#"{"name":"ValidationError","message":"Invalid image"}"#),
            "Invalid image"
        );
        assert_eq!(error_message(502, ""), "HTTP 502");
        assert_eq!(error_message(500, "oops"), "HTTP 500: oops");
    }

    #[test]
    fn test_request_without_credentials_is_not_logged_in() {
        let client = HttpController::new("localhost:1");
        let err = client.list_agents().unwrap_err();
        assert!(matches!(err, Error::NotLoggedIn(_)));
    }

    #[test]
    fn test_not_found_as() {
        let http = Error::Http {
            method: "DELETE".into(),
            path: "/api/v3/secrets/db".into(),
            message: "HTTP 404".into(),
            status: Some(404),
        };
        let err = not_found_as(http, "secrets", "db");
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
