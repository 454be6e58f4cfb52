//! Ship bootstrap images (controller, agent) to air-gapped hosts

use super::Session;
use airgap::TransferPlan;
use anyhow::{Result, bail};

/// Deliver images through the session's air-gap pipeline
///
/// Any failed target fails the whole step: a host without its image cannot
/// be installed.
pub fn ship(session: &Session, plans: Vec<TransferPlan>) -> Result<()> {
    if plans.is_empty() {
        return Ok(());
    }
    let summary = session
        .distributor()
        .distribute(plans, session.cancel())?;
    log::info!("Bootstrap images: {}", summary);

    if !summary.is_success() {
        let failures: Vec<String> = summary
            .failed
            .iter()
            .map(|(target, error)| format!("  {}: {}", target, error))
            .collect();
        bail!(
            "Failed to ship bootstrap images ({}):\n{}",
            summary,
            failures.join("\n")
        );
    }
    Ok(())
}
