//! Observer trait for execution progress
//!
//! Lets callers surface progress (logging, terminal output) without the
//! engine depending on a UI crate.

use crate::error::{ErrorList, ExecutionFailure};

/// Receives progress updates from the pipeline
///
/// All methods have empty defaults, implement only what you need.
pub trait Observer: Sync {
    /// Called before a kind group starts
    fn on_group_start(&self, _kinds: &[String], _count: usize) {}

    /// Called for every executor that completed successfully
    fn on_success(&self, _name: &str) {}

    /// Called for every failure downgraded to a warning (not found during delete)
    fn on_warning(&self, _failure: &ExecutionFailure) {}

    /// Called for every hard failure
    fn on_failure(&self, _failure: &ExecutionFailure) {}

    /// Called after a group finished, with its hard failures
    fn on_group_complete(&self, _failures: &ErrorList) {}

    /// Called for executors never started because an earlier group failed
    fn on_skipped(&self, _name: &str) {}
}

/// No-op observer
pub struct NoObserver;

impl Observer for NoObserver {}
