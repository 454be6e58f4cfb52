//! Resource kinds and their execution order

use executor::KindOrder;
use std::fmt;

/// Every kind a document may declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    CatalogItem,
    Service,
    RoleBinding,
    VolumeMount,
    Microservice,
    Application,
    ApplicationTemplate,
    Secret,
    ConfigMap,
    Certificate,
    CertificateAuthority,
    Role,
    ServiceAccount,
    Registry,
    AgentConfig,
    RemoteAgent,
    LocalAgent,
    RemoteController,
    LocalController,
    KubernetesControlPlane,
    RemoteControlPlane,
    LocalControlPlane,
    Volume,
}

/// Delete order, leaf to root. Apply runs the groups back to front.
pub const DELETE_GROUPS: &[&[Kind]] = &[
    &[Kind::CatalogItem],
    &[Kind::Service, Kind::RoleBinding, Kind::VolumeMount],
    &[Kind::Microservice],
    &[Kind::Application, Kind::ApplicationTemplate],
    &[Kind::Secret, Kind::ConfigMap, Kind::Certificate],
    &[Kind::CertificateAuthority, Kind::Role, Kind::ServiceAccount],
    &[Kind::Registry],
    &[Kind::AgentConfig],
    &[Kind::RemoteAgent, Kind::LocalAgent],
    &[Kind::RemoteController, Kind::LocalController],
    &[
        Kind::KubernetesControlPlane,
        Kind::RemoteControlPlane,
        Kind::LocalControlPlane,
    ],
    &[Kind::Volume],
];

impl Kind {
    pub const ALL: [Kind; 23] = [
        Kind::CatalogItem,
        Kind::Service,
        Kind::RoleBinding,
        Kind::VolumeMount,
        Kind::Microservice,
        Kind::Application,
        Kind::ApplicationTemplate,
        Kind::Secret,
        Kind::ConfigMap,
        Kind::Certificate,
        Kind::CertificateAuthority,
        Kind::Role,
        Kind::ServiceAccount,
        Kind::Registry,
        Kind::AgentConfig,
        Kind::RemoteAgent,
        Kind::LocalAgent,
        Kind::RemoteController,
        Kind::LocalController,
        Kind::KubernetesControlPlane,
        Kind::RemoteControlPlane,
        Kind::LocalControlPlane,
        Kind::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CatalogItem => "CatalogItem",
            Self::Service => "Service",
            Self::RoleBinding => "RoleBinding",
            Self::VolumeMount => "VolumeMount",
            Self::Microservice => "Microservice",
            Self::Application => "Application",
            Self::ApplicationTemplate => "ApplicationTemplate",
            Self::Secret => "Secret",
            Self::ConfigMap => "ConfigMap",
            Self::Certificate => "Certificate",
            Self::CertificateAuthority => "CertificateAuthority",
            Self::Role => "Role",
            Self::ServiceAccount => "ServiceAccount",
            Self::Registry => "Registry",
            Self::AgentConfig => "AgentConfig",
            Self::RemoteAgent => "RemoteAgent",
            Self::LocalAgent => "LocalAgent",
            Self::RemoteController => "RemoteController",
            Self::LocalController => "LocalController",
            Self::KubernetesControlPlane => "KubernetesControlPlane",
            Self::RemoteControlPlane => "RemoteControlPlane",
            Self::LocalControlPlane => "LocalControlPlane",
            Self::Volume => "Volume",
        }
    }

    /// Exact, case-sensitive match on the kind name
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }

    /// Case-insensitive lookup, for the `describe` command line
    pub fn lookup(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Controller API collection for kinds stored by the Controller as-is
    pub fn collection(&self) -> Option<&'static str> {
        match self {
            Self::Application => Some("applications"),
            Self::ApplicationTemplate => Some("application-templates"),
            Self::Microservice => Some("microservices"),
            Self::Secret => Some("secrets"),
            Self::ConfigMap => Some("configmaps"),
            Self::Certificate => Some("certificates"),
            Self::CertificateAuthority => Some("cas"),
            Self::Role => Some("roles"),
            Self::RoleBinding => Some("rolebindings"),
            Self::ServiceAccount => Some("serviceaccounts"),
            Self::Service => Some("services"),
            Self::VolumeMount => Some("volumeMounts"),
            Self::Registry => Some("registries"),
            Self::AgentConfig => Some("agent-configs"),
            _ => None,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn delete_order() -> KindOrder {
    KindOrder::new(
        DELETE_GROUPS
            .iter()
            .map(|group| group.iter().map(|kind| kind.as_str())),
    )
}

pub fn apply_order() -> KindOrder {
    delete_order().reversed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_one_group() {
        for kind in Kind::ALL {
            let groups = DELETE_GROUPS.iter().filter(|g| g.contains(&kind)).count();
            assert_eq!(groups, 1, "{} must appear in exactly one group", kind);
        }
        let listed: usize = DELETE_GROUPS.iter().map(|g| g.len()).sum();
        assert_eq!(listed, Kind::ALL.len());
    }

    #[test]
    fn test_delete_order_leaf_to_root() {
        let order = delete_order();
        assert_eq!(order.position("CatalogItem"), Some(0));
        assert_eq!(order.position("Microservice"), Some(2));
        assert_eq!(order.position("Application"), Some(3));
        assert_eq!(order.position("Volume"), Some(11));
        assert_eq!(order.position("RemoteAgent"), order.position("LocalAgent"));
    }

    #[test]
    fn test_apply_order_is_reverse() {
        let apply = apply_order();
        let delete = delete_order();
        let last = delete.groups().len() - 1;
        for kind in Kind::ALL {
            let d = delete.position(kind.as_str()).unwrap();
            assert_eq!(apply.position(kind.as_str()), Some(last - d));
        }
        assert!(apply.position("Application") < apply.position("Microservice"));
    }

    #[test]
    fn test_parse_and_lookup() {
        assert_eq!(Kind::parse("RoleBinding"), Some(Kind::RoleBinding));
        assert_eq!(Kind::parse("rolebinding"), None);
        assert_eq!(Kind::lookup("rolebinding"), Some(Kind::RoleBinding));
        assert_eq!(Kind::parse("Deployment"), None);
    }

    #[test]
    fn test_collections() {
        assert_eq!(Kind::CertificateAuthority.collection(), Some("cas"));
        assert_eq!(Kind::VolumeMount.collection(), Some("volumeMounts"));
        assert_eq!(Kind::RemoteAgent.collection(), None);
        assert_eq!(Kind::CatalogItem.collection(), None);
    }
}
