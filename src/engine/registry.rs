//! One executor registry per operation

use super::{Session, agents, catalog, planes, resources, volumes};
use crate::resource::Kind;
use executor::ExecutorRegistry;
use std::sync::Arc;

pub type SessionRegistry = ExecutorRegistry<Arc<Session>>;

fn with_controller_kinds(
    mut registry: SessionRegistry,
    factory: resources::FactoryFn,
) -> SessionRegistry {
    for kind in Kind::ALL.into_iter().filter(|k| k.collection().is_some()) {
        registry.register(kind.as_str(), factory);
    }
    registry
}

pub fn deploy() -> SessionRegistry {
    with_controller_kinds(ExecutorRegistry::new("deploy"), resources::deploy)
        .with("CatalogItem", catalog::deploy)
        .with("RemoteAgent", agents::deploy_remote)
        .with("LocalAgent", agents::deploy_local)
        .with("KubernetesControlPlane", planes::deploy_plane)
        .with("RemoteControlPlane", planes::deploy_plane)
        .with("LocalControlPlane", planes::deploy_plane)
        .with("RemoteController", planes::deploy_controller)
        .with("LocalController", planes::deploy_controller)
        .with("Volume", volumes::deploy)
}

pub fn delete() -> SessionRegistry {
    with_controller_kinds(ExecutorRegistry::new("delete"), resources::delete)
        .with("CatalogItem", catalog::delete)
        .with("RemoteAgent", agents::delete)
        .with("LocalAgent", agents::delete)
        .with("KubernetesControlPlane", planes::delete_plane)
        .with("RemoteControlPlane", planes::delete_plane)
        .with("LocalControlPlane", planes::delete_plane)
        .with("RemoteController", planes::delete_controller)
        .with("LocalController", planes::delete_controller)
        .with("Volume", volumes::delete)
}

pub fn describe() -> SessionRegistry {
    with_controller_kinds(ExecutorRegistry::new("describe"), resources::describe)
        .with("CatalogItem", catalog::describe)
        .with("RemoteAgent", agents::describe)
        .with("LocalAgent", agents::describe)
        .with("KubernetesControlPlane", planes::describe_plane)
        .with("RemoteControlPlane", planes::describe_plane)
        .with("LocalControlPlane", planes::describe_plane)
        .with("RemoteController", planes::describe_controller)
        .with("LocalController", planes::describe_controller)
        .with("Volume", volumes::describe)
}
