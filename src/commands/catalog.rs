//! `catalog register`

use crate::cli::RegistryArg;
use crate::context::Context;
use crate::engine::{Session, catalog};
use crate::resource::specs::{CatalogItemSpec, CatalogRegistry};
use crate::ui;
use anyhow::Result;

pub struct RegisterArgs {
    pub name: String,
    pub x86: Option<String>,
    pub arm: Option<String>,
    pub registry: RegistryArg,
    pub description: String,
    pub category: String,
}

impl RegisterArgs {
    fn spec(self) -> CatalogItemSpec {
        CatalogItemSpec {
            description: self.description,
            category: self.category,
            registry: match self.registry {
                RegistryArg::Remote => CatalogRegistry::Remote,
                RegistryArg::Local => CatalogRegistry::Local,
            },
            x86: self.x86,
            arm: self.arm,
        }
    }
}

pub fn register(ctx: &Context, args: RegisterArgs) -> Result<()> {
    let name = args.name.clone();
    let item = args.spec().to_item(&name)?;
    let session = Session::from_context(ctx);
    let api = session.controller()?;

    let confirm = |question: &str| session.confirm(question);
    let stored = catalog::register(api.as_ref(), &item, &confirm)?;
    match stored.id {
        Some(id) => ui::success(&format!("Catalog item {} registered (id {})", name, id)),
        None => ui::success(&format!("Catalog item {} registered", name)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_map_to_item() {
        let args = RegisterArgs {
            name: "router".into(),
            x86: Some("ghcr.io/acme/router:1".into()),
            arm: None,
            registry: RegistryArg::Local,
            description: "edge router".into(),
            category: String::new(),
        };
        let item = args.spec().to_item("router").unwrap();
        assert!(item.is_offline());
        assert_eq!(item.images.len(), 1);
        assert_eq!(item.images[0].fog_type_id, 1);
    }

    #[test]
    fn test_item_needs_an_image() {
        let args = RegisterArgs {
            name: "empty".into(),
            x86: None,
            arm: None,
            registry: RegistryArg::Remote,
            description: String::new(),
            category: String::new(),
        };
        assert!(args.spec().to_item("empty").is_err());
    }
}
