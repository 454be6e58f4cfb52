//! Microservice catalog entries

use super::resources::controller_error;
use super::{Session, executor_name};
use crate::resource::Envelope;
use crate::resource::specs::{CatalogItemSpec, decode};
use anyhow::{Context, Result, bail};
use controller::{CatalogItem, ControllerApi};
use executor::{BoxedExecutor, Executor, FactoryInput, NotFound};
use std::sync::Arc;

/// Whether replacing `existing` needs the operator's consent
///
/// System items are managed by the Controller itself, and items bound to
/// a remote registry may be in use by running microservices.
pub fn needs_confirmation(existing: &CatalogItem) -> bool {
    existing.is_system() || !existing.is_offline()
}

/// Create the item, or update it in place if the name is taken
pub fn register(
    api: &dyn ControllerApi,
    item: &CatalogItem,
    confirm: &dyn Fn(&str) -> Result<bool>,
) -> Result<CatalogItem> {
    let Some(existing) = api.get_catalog_item(&item.name)? else {
        log::info!("Creating catalog item {}", item.name);
        return Ok(api.create_catalog_item(item)?);
    };

    let id = existing
        .id
        .with_context(|| format!("Catalog item {} has no id", existing.name))?;
    if needs_confirmation(&existing) {
        let question = if existing.is_system() {
            format!("Catalog item {} is a system item. Replace it?", item.name)
        } else {
            format!(
                "Catalog item {} pulls from registry {}. Replace it?",
                item.name, existing.registry_id
            )
        };
        if !confirm(&question)? {
            bail!("Update of catalog item {} declined", item.name);
        }
    }
    log::info!("Updating catalog item {} ({})", item.name, id);
    Ok(api.update_catalog_item(id, item)?)
}

struct DeployCatalogItem {
    name: String,
    session: Arc<Session>,
    item: CatalogItem,
}

impl Executor for DeployCatalogItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let api = self.session.controller()?;
        let confirm = |question: &str| self.session.confirm(question);
        let item = register(api.as_ref(), &self.item, &confirm)?;
        log::info!("Registered {} as catalog id {:?}", self.name, item.id);
        Ok(())
    }
}

pub fn deploy(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    let spec: CatalogItemSpec = decode(input.kind, input.name, input.spec)?;
    Ok(Box::new(DeployCatalogItem {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        item: spec.to_item(input.name)?,
    }))
}

fn lookup(api: &dyn ControllerApi, name: &str) -> Result<CatalogItem> {
    api.get_catalog_item(name)
        .map_err(|e| controller_error("CatalogItem", name, e))?
        .ok_or_else(|| NotFound::new("CatalogItem", name).into())
}

struct DeleteCatalogItem {
    name: String,
    session: Arc<Session>,
    item: String,
}

impl Executor for DeleteCatalogItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let api = self.session.controller()?;
        let existing = lookup(api.as_ref(), &self.item)?;
        let id = existing
            .id
            .with_context(|| format!("Catalog item {} has no id", self.item))?;
        if existing.is_system() {
            let question = format!("Catalog item {} is a system item. Delete it?", self.item);
            if !self.session.confirm(&question)? {
                bail!("Deletion of catalog item {} declined", self.item);
            }
        }
        api.delete_catalog_item(id)
            .map_err(|e| controller_error("CatalogItem", &self.item, e))?;
        log::info!("Deleted {}", self.name);
        Ok(())
    }
}

pub fn delete(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DeleteCatalogItem {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        item: input.name.to_string(),
    }))
}

struct DescribeCatalogItem {
    name: String,
    session: Arc<Session>,
    item: String,
}

impl Executor for DescribeCatalogItem {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        let api = self.session.controller()?;
        let item = lookup(api.as_ref(), &self.item)?;
        let spec = serde_yaml_ng::to_value(CatalogItemSpec::from_item(&item))?;
        let status = serde_yaml_ng::to_value(serde_json::json!({
            "id": item.id,
            "registryId": item.registry_id,
        }))?;
        self.session.describe(
            Envelope::describe("CatalogItem", &self.item, self.session.namespace(), spec)
                .with_status(status),
        );
        Ok(())
    }
}

pub fn describe(session: &Arc<Session>, input: &FactoryInput<'_>) -> Result<BoxedExecutor> {
    Ok(Box::new(DescribeCatalogItem {
        name: executor_name(input.kind, input.name),
        session: Arc::clone(session),
        item: input.name.to_string(),
    }))
}
