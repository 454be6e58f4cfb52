//! Parallel execution engine - runs a group of executors with rayon

use crate::error::{ErrorList, ExecutionFailure};
use crate::executor::BoxedExecutor;
use anyhow::Result;
use rayon::prelude::*;

/// Outcome of one parallel group
#[derive(Debug, Default)]
pub struct GroupOutcome {
    /// Names of executors that succeeded
    pub succeeded: Vec<String>,
    /// Every failure of the group, unordered
    pub failures: ErrorList,
}

/// Run every executor of a group concurrently and join on all of them
///
/// `jobs` bounds the worker pool; `0` means one worker per executor.
/// A failing executor never stops its siblings: all failures are collected
/// into the returned [`GroupOutcome`]. The only error returned directly is
/// a failure to build the worker pool.
pub fn run_parallel(executors: &[BoxedExecutor], jobs: usize) -> Result<GroupOutcome> {
    if executors.is_empty() {
        return Ok(GroupOutcome::default());
    }

    if executors.len() == 1 {
        // No pool needed for a single executor
        let executor = &executors[0];
        return Ok(match run_one(executor) {
            Ok(name) => GroupOutcome {
                succeeded: vec![name],
                failures: ErrorList::new(),
            },
            Err(failure) => GroupOutcome {
                succeeded: Vec::new(),
                failures: std::iter::once(failure).collect(),
            },
        });
    }

    let threads = if jobs == 0 { executors.len() } else { jobs };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("executor-{i}"))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to create executor pool: {}", e))?;

    let results: Vec<Result<String, ExecutionFailure>> =
        pool.install(|| executors.par_iter().map(run_one).collect());

    let mut outcome = GroupOutcome::default();
    for result in results {
        match result {
            Ok(name) => outcome.succeeded.push(name),
            Err(failure) => outcome.failures.push(failure),
        }
    }

    Ok(outcome)
}

fn run_one(executor: &BoxedExecutor) -> Result<String, ExecutionFailure> {
    let name = executor.name().to_string();
    log::debug!("Executing {}", name);

    match executor.execute() {
        Ok(()) => {
            log::debug!("Finished {}", name);
            Ok(name)
        }
        Err(error) => {
            log::debug!("Failed {}: {:#}", name, error);
            Err(ExecutionFailure::new(name, error))
        }
    }
}
