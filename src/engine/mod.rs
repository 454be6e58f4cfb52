//! Deployment engine
//!
//! A [`Session`] carries everything executors need for one command: the
//! namespace, the store, remote and local backends, the air-gap pipeline
//! settings and a lazily created Controller client. [`execute`] turns
//! validated documents into executors through the operation's registry and
//! runs them in kind order.

pub mod agents;
pub mod bootstrap;
pub mod catalog;
pub mod planes;
pub mod registry;
pub mod resources;
pub mod volumes;

use crate::context::Context;
use crate::plane::{Backends, ControlPlane};
use crate::resource::{self, Document, Envelope, apply_order, delete_order};
use crate::runner::{CommandRunner, SystemRunner};
use crate::store::NamespaceStore;
use airgap::{
    ArtifactCache, CancelToken, Connector, Distributor, Registry, SshConnector, transfer,
};
use anyhow::{Context as _, Result};
use controller::{ControllerApi, HttpController, LogCallback, RetryConfig, wait_until_ready};
use executor::{Mode, Observer, PipelineOptions, RunReport, run_ordered};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

/// Asks the operator a yes/no question
pub type Confirm = dyn Fn(&str) -> Result<bool> + Send + Sync;

fn prompt_user(message: &str) -> Result<bool> {
    Ok(dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()?)
}

/// Shared state of one deploy, delete or describe run
pub struct Session {
    namespace: String,
    yes: bool,
    jobs: usize,
    store: Arc<NamespaceStore>,
    connector: Arc<dyn Connector>,
    runner: Arc<dyn CommandRunner>,
    registry: Arc<dyn Registry>,
    cache_root: PathBuf,
    pool_size: usize,
    no_cache: bool,
    poll: RetryConfig,
    cancel: CancelToken,
    controller: OnceLock<Arc<dyn ControllerApi>>,
    confirm: Box<Confirm>,
    prompt: Mutex<()>,
    described: Mutex<Vec<Envelope>>,
}

impl Session {
    /// Session with system backends (ssh, local processes, OCI registries)
    pub fn new(
        namespace: impl Into<String>,
        store: Arc<NamespaceStore>,
        cache_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            yes: false,
            jobs: 4,
            store,
            connector: Arc::new(SshConnector::new()),
            runner: Arc::new(SystemRunner),
            registry: Arc::new(airgap::OciRegistry::new()),
            cache_root: cache_root.into(),
            pool_size: transfer::DEFAULT_POOL_SIZE,
            no_cache: false,
            poll: RetryConfig::default(),
            cancel: CancelToken::default(),
            controller: OnceLock::new(),
            confirm: Box::new(prompt_user),
            prompt: Mutex::new(()),
            described: Mutex::new(Vec::new()),
        }
    }

    pub fn from_context(ctx: &Context) -> Self {
        Self::new(
            ctx.namespace.clone(),
            Arc::new(ctx.store()),
            ctx.paths.airgap_cache_dir(),
        )
        .with_registry(Arc::new(ctx.settings.oci_registry()))
        .with_pool_size(ctx.settings.airgap.pool_size)
        .with_no_cache(ctx.settings.airgap.no_cache)
        .with_poll(ctx.settings.controller.retry_config())
        .with_cancel(ctx.cancel.clone())
        .with_yes(ctx.yes)
        .with_jobs(ctx.jobs)
    }

    pub fn with_yes(mut self, yes: bool) -> Self {
        self.yes = yes;
        self
    }

    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    #[cfg(test)]
    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    #[cfg(test)]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_no_cache(mut self, no_cache: bool) -> Self {
        self.no_cache = no_cache;
        self
    }

    pub fn with_poll(mut self, poll: RetryConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use this client instead of one built from the stored control plane
    #[cfg(test)]
    pub fn with_controller(self, controller: Arc<dyn ControllerApi>) -> Self {
        let _ = self.controller.set(controller);
        self
    }

    #[cfg(test)]
    pub fn with_confirm<F>(mut self, confirm: F) -> Self
    where
        F: Fn(&str) -> Result<bool> + Send + Sync + 'static,
    {
        self.confirm = Box::new(confirm);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn store(&self) -> &NamespaceStore {
        &self.store
    }

    pub fn connector(&self) -> &dyn Connector {
        self.connector.as_ref()
    }

    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    pub fn backends(&self) -> Backends<'_> {
        Backends {
            connector: self.connector.as_ref(),
            runner: self.runner.as_ref(),
            poll: &self.poll,
        }
    }

    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    /// Air-gap pipeline over this session's cache, registry and connector
    pub fn distributor(&self) -> Distributor {
        let cache = ArtifactCache::new(
            &self.cache_root,
            &self.namespace,
            Arc::clone(&self.registry),
        )
        .no_cache(self.no_cache);
        Distributor::new(cache, Arc::clone(&self.connector)).with_pool_size(self.pool_size)
    }

    /// Controller client for the namespace's control plane
    ///
    /// Built on first use from the stored plane, so a plane deployed earlier
    /// in the same run is picked up.
    pub fn controller(&self) -> Result<Arc<dyn ControllerApi>> {
        if let Some(client) = self.controller.get() {
            return Ok(Arc::clone(client));
        }
        let namespace = self.store.load(&self.namespace)?;
        let plane = namespace.control_plane.with_context(|| {
            format!(
                "Namespace {} has no control plane, deploy one first",
                self.namespace
            )
        })?;
        self.client_for(&plane)
    }

    fn client_for(&self, plane: &ControlPlane) -> Result<Arc<dyn ControllerApi>> {
        if let Some(client) = self.controller.get() {
            return Ok(Arc::clone(client));
        }
        let user = plane.user();
        let client: Arc<dyn ControllerApi> =
            Arc::new(HttpController::new(plane.endpoint()?).with_credentials(&user.email, &user.password));
        Ok(Arc::clone(self.controller.get_or_init(|| client)))
    }

    /// Block until the plane's Controller reports online
    pub fn wait_for_controller(&self, plane: &ControlPlane) -> Result<()> {
        let client = self.client_for(plane)?;
        let status = wait_until_ready(client.as_ref(), &self.poll, Some(&LogCallback))
            .with_context(|| format!("Controller at {} is not ready", client.endpoint()))?;
        log::info!("Controller at {} is {}", client.endpoint(), status.status);
        Ok(())
    }

    /// Ask before a destructive change; `--yes` answers for the operator
    ///
    /// Prompts are serialized so parallel executors never interleave them.
    pub fn confirm(&self, message: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        let _guard = self.prompt.lock().unwrap_or_else(|e| e.into_inner());
        (self.confirm)(message)
    }

    /// Collect a rendered document for `describe`
    pub fn describe(&self, envelope: Envelope) {
        let mut described = self.described.lock().unwrap_or_else(|e| e.into_inner());
        described.push(envelope);
    }

    /// Documents collected by describe executors
    pub fn described(&self) -> Vec<Envelope> {
        self.described
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Build executors for every document and run them in kind order
///
/// All executors are built before the first one runs, so a malformed spec
/// anywhere in the input stops the run before any side effect.
pub fn execute(
    mode: Mode,
    session: &Arc<Session>,
    documents: &[Document],
    observer: &dyn Observer,
) -> Result<RunReport> {
    let registry = match mode {
        Mode::Apply => registry::deploy(),
        Mode::Delete => registry::delete(),
        Mode::Describe => registry::describe(),
    };

    let mut executors = Vec::with_capacity(documents.len());
    for document in documents {
        let input = document.input(session.namespace());
        if let Some(executor) = registry
            .build(session, &input)
            .with_context(|| format!("Invalid {} {}", document.kind, document.name))?
        {
            executors.push((document.kind.clone(), executor));
        }
    }
    if executors.is_empty() {
        return Err(resource::Error::Empty.into());
    }

    let order = match mode {
        Mode::Delete => delete_order(),
        Mode::Apply | Mode::Describe => apply_order(),
    };
    log::info!(
        "Running {} {} executor(s) in namespace {}",
        executors.len(),
        registry.operation(),
        session.namespace()
    );
    run_ordered(
        order,
        executors,
        &PipelineOptions::new(mode).jobs(session.jobs),
        observer,
    )
}

/// `Kind/name`, the identity every executor reports under
pub fn executor_name(kind: &str, name: &str) -> String {
    format!("{}/{}", kind, name)
}
