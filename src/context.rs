//! Per-invocation context handed to every command

use crate::config::Settings;
use crate::paths::Paths;
use crate::store::NamespaceStore;
use airgap::CancelToken;

/// Options shared by every command
///
/// Built once in `main` from global flags, settings and paths; nothing
/// downstream reads process-wide state.
pub struct Context {
    pub namespace: String,
    pub quiet: bool,
    pub jobs: usize,
    pub yes: bool,
    pub paths: Paths,
    pub settings: Settings,
    pub cancel: CancelToken,
}

impl Context {
    pub fn new(paths: Paths, settings: Settings) -> Self {
        Self {
            namespace: settings.default_namespace.clone(),
            quiet: false,
            jobs: 4,
            yes: false,
            paths,
            settings,
            cancel: CancelToken::default(),
        }
    }

    pub fn store(&self) -> NamespaceStore {
        NamespaceStore::new(self.paths.namespaces_dir())
    }
}
