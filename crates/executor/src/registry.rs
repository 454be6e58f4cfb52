//! Kind → factory dispatch table
//!
//! One registry is built per operation (deploy, delete, describe). Each
//! entry turns a decoded resource document into a concrete executor.

use crate::executor::BoxedExecutor;
use anyhow::Result;
use std::collections::BTreeMap;

/// Everything a factory needs to bind an executor
#[derive(Debug, Clone, Copy)]
pub struct FactoryInput<'a> {
    /// Resource kind (e.g. "Application")
    pub kind: &'a str,
    /// Namespace the command runs against
    pub namespace: &'a str,
    /// Resource name from `metadata.name`
    pub name: &'a str,
    /// Serialized `spec` section (YAML)
    pub spec: &'a [u8],
    /// Serialized `data` section (YAML), if present
    pub data: Option<&'a [u8]>,
    /// Tags from `metadata.tags`
    pub tags: &'a [String],
}

/// Factory building an executor from a context and a resource document
pub type Factory<C> = Box<dyn Fn(&C, &FactoryInput<'_>) -> Result<BoxedExecutor> + Send + Sync>;

/// Dispatch table from kind to executor factory
///
/// # Type Parameters
/// * `C` - Context handed to every factory (options, clients, stores)
pub struct ExecutorRegistry<C> {
    operation: &'static str,
    factories: BTreeMap<String, Factory<C>>,
}

impl<C> ExecutorRegistry<C> {
    /// Create an empty registry for the named operation ("deploy", "delete", ...)
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            factories: BTreeMap::new(),
        }
    }

    /// Register a factory for a kind, replacing any previous entry
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&C, &FactoryInput<'_>) -> Result<BoxedExecutor> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
        self
    }

    /// Builder-style variant of [`register`](Self::register)
    pub fn with<F>(mut self, kind: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&C, &FactoryInput<'_>) -> Result<BoxedExecutor> + Send + Sync + 'static,
    {
        self.register(kind, factory);
        self
    }

    /// Name of the operation this registry serves
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Whether a factory exists for `kind`
    pub fn supports(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// All registered kinds, sorted
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the executor for a document
    ///
    /// Unknown kinds are skipped with a warning and yield `Ok(None)`, so an
    /// older client can still process files containing newer kinds.
    /// Factory errors (e.g. a malformed spec) are returned as-is.
    pub fn build(&self, ctx: &C, input: &FactoryInput<'_>) -> Result<Option<BoxedExecutor>> {
        match self.factories.get(input.kind) {
            Some(factory) => factory(ctx, input).map(Some),
            None => {
                log::warn!(
                    "Skipping {} {}: kind is not supported by {}",
                    input.kind,
                    input.name,
                    self.operation
                );
                Ok(None)
            }
        }
    }
}
