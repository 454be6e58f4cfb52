//! # controller
//!
//! Blocking client for the edge Controller REST API.
//!
//! The CLI only ever talks to a Controller through [`ControllerApi`], so
//! executors can run against [`HttpController`] in production and
//! [`MockController`] in tests.
//!
//! ## Example
//!
//! ```no_run
//! use controller::{ControllerApi, HttpController, RetryConfig, wait_until_ready};
//! use serde_json::json;
//!
//! let client = HttpController::new("http://10.0.0.2:51121")
//!     .with_credentials("ops@example.com", "secret");
//!
//! wait_until_ready(&client, &RetryConfig::default(), None).unwrap();
//! client
//!     .upsert_resource("secrets", "db", &json!({"name": "db", "type": "opaque"}))
//!     .unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod error;
pub mod mock;
pub mod retry;
pub mod types;

pub use client::{ControllerApi, HttpController};
pub use error::{Error, ErrorCategory, Result};
pub use mock::MockController;
pub use retry::{LogCallback, RetryCallback, RetryConfig, wait_until_ready, with_retry};
pub use types::{
    Agent, CatalogImage, CatalogItem, ControllerStatus, LOCAL_CACHE_REGISTRY_ID, SYSTEM_CATEGORY,
};
