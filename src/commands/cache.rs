//! `cache list` and `cache prune`

use crate::context::Context;
use crate::ui::{self, format_size};
use airgap::CacheEntry;
use anyhow::Result;
use colored::Colorize;
use std::path::Path;

/// Cached archives, optionally limited to one namespace
pub fn cached(root: &Path, namespace: Option<&str>) -> Result<Vec<CacheEntry>> {
    let mut entries = airgap::cache::entries(root)?;
    if let Some(namespace) = namespace {
        let dir = airgap::sanitize(namespace);
        entries.retain(|entry| entry.namespace == dir);
    }
    Ok(entries)
}

pub fn list(ctx: &Context, all: bool) -> Result<()> {
    let namespace = (!all).then_some(ctx.namespace.as_str());
    let entries = cached(&ctx.paths.airgap_cache_dir(), namespace)?;
    if entries.is_empty() {
        ui::info("Image cache is empty");
        return Ok(());
    }

    ui::header("Cached images");
    let mut total = 0;
    for entry in &entries {
        let meta = &entry.metadata;
        total += meta.tar_size;
        println!(
            "  {:<12} {:<40} {:<14} {:>10}  {}",
            entry.namespace.cyan(),
            meta.image,
            meta.platform,
            format_size(meta.tar_size),
            meta.updated_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
        log::debug!("{} digest {}", entry.path.display(), meta.digest);
    }
    println!();
    ui::kv("Archives", &entries.len().to_string());
    ui::kv("Total", &format_size(total));
    Ok(())
}

pub fn prune(ctx: &Context) -> Result<()> {
    let freed = airgap::cache::prune(&ctx.paths.airgap_cache_dir(), &ctx.namespace)?;
    if freed == 0 {
        ui::info(&format!("Nothing cached for namespace {}", ctx.namespace));
    } else {
        ui::success(&format!(
            "Freed {} from namespace {}",
            format_size(freed),
            ctx.namespace
        ));
    }
    Ok(())
}
