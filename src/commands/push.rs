//! `airgap push`: load an image on agents that cannot pull

use crate::context::Context;
use crate::engine::Session;
use crate::store::Namespace;
use crate::ui;
use airgap::{ContainerEngine, ImageReference, Platform, TransferPlan};
use anyhow::{Context as _, Result, bail};
use controller::ControllerApi;
use rayon::prelude::*;

/// Resolve one agent into a transfer plan
///
/// Platform and engine come from the Controller's view of the agent; the
/// SSH details come from the namespace record. An agent that reports no
/// engine is an input error.
fn plan_for(
    api: &dyn ControllerApi,
    namespace: &Namespace,
    name: &str,
    image: &ImageReference,
) -> Result<TransferPlan> {
    let agent = api
        .get_agent(name)
        .with_context(|| format!("Agent {} is not registered with the Controller", name))?;
    let platform = Platform::from_fog_type(agent.fog_type)
        .with_context(|| format!("Agent {} has no usable architecture", name))?;

    let record = namespace.agent(name).with_context(|| {
        format!("Agent {} is not managed in namespace {}", name, namespace.name)
    })?;
    let Some(engine) = &agent.container_engine else {
        bail!("Agent {} does not report a container engine", name);
    };
    let engine = ContainerEngine::parse(engine)
        .with_context(|| format!("Agent {} reports an unsupported engine", name))?;
    let Some(ssh) = &record.ssh else {
        bail!("Agent {} runs on this machine, there is nothing to push", name);
    };

    Ok(TransferPlan::new(
        name,
        ssh.target(&record.host),
        platform,
        engine,
        image.clone(),
    ))
}

/// Build every plan before any registry or SSH work
pub fn plan_push(
    api: &dyn ControllerApi,
    namespace: &Namespace,
    agents: &[String],
    image: &ImageReference,
) -> Result<Vec<TransferPlan>> {
    agents
        .par_iter()
        .map(|name| plan_for(api, namespace, name, image))
        .collect()
}

pub fn push(ctx: &Context, image: &str, agents: &[String], no_cache: bool) -> Result<()> {
    let image = ImageReference::parse(image)?;
    let session =
        Session::from_context(ctx).with_no_cache(no_cache || ctx.settings.airgap.no_cache);
    let namespace = session.store().load(session.namespace())?;
    let api = session.controller()?;
    let plans = plan_push(api.as_ref(), &namespace, agents, &image)?;

    ui::info(&format!("Pushing {} to {} agent(s)", image, plans.len()));
    let summary = session.distributor().distribute(plans, session.cancel())?;
    for (target, error) in &summary.failed {
        ui::error(&format!("{}: {}", target, error));
    }
    if !summary.is_success() {
        bail!("Push of {} incomplete: {}", image, summary);
    }
    ui::success(&format!("Pushed {}: {}", image, summary));
    Ok(())
}
