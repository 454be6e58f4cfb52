//! `namespace create|list|delete`

use crate::context::Context;
use crate::store::NamespaceStore;
use crate::ui;
use anyhow::{Result, bail};
use colored::Colorize;

pub fn create(ctx: &Context, name: &str) -> Result<()> {
    ctx.store().create(name)?;
    ui::success(&format!("Created namespace {}", name));
    Ok(())
}

pub fn list(ctx: &Context) -> Result<()> {
    let store = ctx.store();
    let names = store.list()?;
    if names.is_empty() {
        ui::info("No namespaces yet. Create one with 'fogctl namespace create <name>'");
        return Ok(());
    }

    ui::header("Namespaces");
    for name in names {
        let namespace = store.load(&name)?;
        let marker = if name == ctx.namespace { "*" } else { " " };
        let plane = namespace
            .control_plane
            .as_ref()
            .map(|plane| plane.kind())
            .unwrap_or("no control plane");
        let local = namespace.agents.iter().filter(|a| a.is_local()).count();
        println!(
            "{} {:<20} {:<24} {} agent(s) ({} local), {} volume(s)",
            marker.green(),
            name.cyan(),
            plane,
            namespace.agents.len(),
            local,
            namespace.volumes.len()
        );
    }
    Ok(())
}

/// Delete a namespace record; a namespace still owning resources needs `force`
pub fn remove(store: &NamespaceStore, name: &str, force: bool) -> Result<()> {
    let namespace = store.load(name)?;
    if !namespace.is_empty() && !force {
        bail!(
            "Namespace {} still has a control plane, agents or volumes; delete them first or pass --force",
            name
        );
    }
    store.delete(name)
}

pub fn delete(ctx: &Context, name: &str, force: bool) -> Result<()> {
    remove(&ctx.store(), name, force)?;
    if force {
        ui::warn(&format!(
            "Deleted namespace {}; remote hosts were not cleaned up",
            name
        ));
    } else {
        ui::success(&format!("Deleted namespace {}", name));
    }
    Ok(())
}
