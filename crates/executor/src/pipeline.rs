//! Ordered multi-kind pipeline
//!
//! Executors are bucketed by kind and the buckets are grouped by a
//! [`KindOrder`]. Groups run strictly one after another; executors inside a
//! group run concurrently through [`run_parallel`].

use crate::context::Observer;
use crate::error::ErrorList;
use crate::executor::BoxedExecutor;
use crate::parallel::run_parallel;
use anyhow::{Result, bail};
use std::collections::BTreeMap;

/// Total order over resource kinds
///
/// Kinds in the same group have no dependency on each other and run
/// together. Groups are executed front to back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindOrder {
    groups: Vec<Vec<String>>,
}

impl KindOrder {
    /// Create an order from groups of kinds
    pub fn new<G, K>(groups: impl IntoIterator<Item = G>) -> Self
    where
        G: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            groups: groups
                .into_iter()
                .map(|g| g.into_iter().map(Into::into).collect())
                .collect(),
        }
    }

    /// The same groups in the opposite order
    ///
    /// Delete order is leaf to root; apply order is its reverse.
    pub fn reversed(&self) -> Self {
        Self {
            groups: self.groups.iter().rev().cloned().collect(),
        }
    }

    /// Group index of a kind
    pub fn position(&self, kind: &str) -> Option<usize> {
        self.groups
            .iter()
            .position(|group| group.iter().any(|k| k == kind))
    }

    /// Whether the order knows `kind`
    pub fn contains(&self, kind: &str) -> bool {
        self.position(kind).is_some()
    }

    /// The groups, front to back
    pub fn groups(&self) -> &[Vec<String>] {
        &self.groups
    }
}

/// What the pipeline is doing, which decides not-found handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Create or update; a missing dependency is a hard failure
    Apply,
    /// Remove; an already-absent resource is only a warning
    Delete,
    /// Read-only lookups; a missing resource is a hard failure
    Describe,
}

impl Mode {
    fn tolerates_not_found(self) -> bool {
        matches!(self, Self::Delete)
    }
}

/// Options for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Apply, delete or describe
    pub mode: Mode,
    /// Worker pool size per group (0 = one worker per executor)
    pub jobs: usize,
}

impl PipelineOptions {
    /// Options with unbounded group parallelism
    pub fn new(mode: Mode) -> Self {
        Self { mode, jobs: 0 }
    }

    /// Bound the per-group worker pool
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }
}

/// Result of a pipeline run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Executors that completed
    pub succeeded: Vec<String>,
    /// Not-found failures downgraded to warnings
    pub warnings: ErrorList,
    /// Hard failures
    pub failed: ErrorList,
    /// Executors never started because an earlier group failed
    pub skipped: Vec<String>,
}

impl RunReport {
    /// Whether the run had no hard failures
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of executors the pipeline held
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.warnings.len() + self.failed.len() + self.skipped.len()
    }

    /// Convert hard failures into a single error
    pub fn into_result(self) -> Result<Self, ErrorList> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(self.failed)
        }
    }
}

/// Executors bucketed by kind, run in kind order
pub struct Pipeline {
    order: KindOrder,
    buckets: BTreeMap<usize, Vec<(String, BoxedExecutor)>>,
}

impl Pipeline {
    /// Create an empty pipeline for an order
    pub fn new(order: KindOrder) -> Self {
        Self {
            order,
            buckets: BTreeMap::new(),
        }
    }

    /// Add an executor under its kind
    ///
    /// Fails if the kind has no slot in the order.
    pub fn add(&mut self, kind: &str, executor: BoxedExecutor) -> Result<()> {
        let Some(position) = self.order.position(kind) else {
            bail!("kind {} has no place in the execution order", kind);
        };
        self.buckets
            .entry(position)
            .or_default()
            .push((kind.to_string(), executor));
        Ok(())
    }

    /// Number of executors held
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Whether no executor was added
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every group in order
    ///
    /// A group only starts if every previous group finished without hard
    /// failures. Executors of groups that never start are reported as
    /// skipped. The only error returned directly is a failure to build the
    /// worker pool; executor failures land in the [`RunReport`].
    pub fn run(self, opts: &PipelineOptions, observer: &dyn Observer) -> Result<RunReport> {
        let mut report = RunReport::default();
        let mut halted = false;

        for (position, entries) in self.buckets {
            let (kinds, executors): (Vec<String>, Vec<BoxedExecutor>) = entries.into_iter().unzip();

            if halted {
                for executor in &executors {
                    observer.on_skipped(executor.name());
                    report.skipped.push(executor.name().to_string());
                }
                continue;
            }

            let mut group_kinds = kinds;
            group_kinds.sort();
            group_kinds.dedup();
            log::info!(
                "Running group {} ({}) with {} executor(s)",
                position,
                group_kinds.join(", "),
                executors.len()
            );
            observer.on_group_start(&group_kinds, executors.len());

            let outcome = run_parallel(&executors, opts.jobs)?;
            drop(executors);

            for name in &outcome.succeeded {
                observer.on_success(name);
            }
            report.succeeded.extend(outcome.succeeded);

            let (not_found, hard) = if opts.mode.tolerates_not_found() {
                outcome.failures.partition()
            } else {
                (ErrorList::new(), outcome.failures)
            };

            for failure in not_found.iter() {
                log::debug!("Not found (tolerated): {}", failure);
                observer.on_warning(failure);
            }
            for failure in hard.iter() {
                log::debug!("Hard failure: {}", failure);
                observer.on_failure(failure);
            }
            observer.on_group_complete(&hard);

            if !hard.is_empty() {
                halted = true;
            }
            report.warnings.extend(not_found);
            report.failed.extend(hard);
        }

        Ok(report)
    }
}

/// Build a pipeline from `(kind, executor)` pairs and run it
pub fn run_ordered(
    order: KindOrder,
    executors: impl IntoIterator<Item = (String, BoxedExecutor)>,
    opts: &PipelineOptions,
    observer: &dyn Observer,
) -> Result<RunReport> {
    let mut pipeline = Pipeline::new(order);
    for (kind, executor) in executors {
        pipeline.add(&kind, executor)?;
    }
    pipeline.run(opts, observer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoObserver;
    use crate::error::NotFound;
    use crate::executor::FnExecutor;
    use std::sync::{Arc, Mutex};

    fn delete_order() -> KindOrder {
        KindOrder::new([
            vec!["Microservice"],
            vec!["Application"],
            vec!["Agent"],
            vec!["Controller"],
        ])
    }

    fn recording(name: &str, log: &Arc<Mutex<Vec<String>>>) -> BoxedExecutor {
        let log = Arc::clone(log);
        let label = name.to_string();
        Box::new(FnExecutor::new(name, move || {
            std::thread::sleep(std::time::Duration::from_millis(5));
            log.lock().unwrap().push(label.clone());
            Ok(())
        }))
    }

    #[test]
    fn test_kind_order_reversed() {
        let order = delete_order();
        let apply = order.reversed();
        assert_eq!(apply.position("Controller"), Some(0));
        assert_eq!(apply.position("Microservice"), Some(3));
        assert!(!apply.contains("Volume"));
    }

    #[test]
    fn test_add_unknown_kind_fails() {
        let mut pipeline = Pipeline::new(delete_order());
        let result = pipeline.add("Volume", Box::new(FnExecutor::new("v", || Ok(()))));
        assert!(result.is_err());
        assert!(pipeline.is_empty());
    }

    #[test]
    fn test_microservices_finish_before_applications_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new(delete_order());

        // Added out of order on purpose
        pipeline
            .add("Application", recording("app/shop", &log))
            .unwrap();
        for i in 0..4 {
            pipeline
                .add("Microservice", recording(&format!("ms/{i}"), &log))
                .unwrap();
        }

        let report = pipeline
            .run(&PipelineOptions::new(Mode::Delete), &NoObserver)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 5);

        let order = log.lock().unwrap().clone();
        assert_eq!(order.last().map(String::as_str), Some("app/shop"));
        assert!(order[..4].iter().all(|n| n.starts_with("ms/")));
    }

    #[test]
    fn test_not_found_is_warning_on_delete() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new(delete_order());
        pipeline
            .add(
                "Microservice",
                Box::new(FnExecutor::new("ms/gone", || {
                    Err(NotFound::new("Microservice", "gone").into())
                })),
            )
            .unwrap();
        pipeline.add("Application", recording("app/shop", &log)).unwrap();

        let report = pipeline
            .run(&PipelineOptions::new(Mode::Delete), &NoObserver)
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.succeeded, vec!["app/shop".to_string()]);
    }

    #[test]
    fn test_not_found_is_hard_on_apply() {
        let mut pipeline = Pipeline::new(delete_order().reversed());
        pipeline
            .add(
                "Application",
                Box::new(FnExecutor::new("app/shop", || {
                    Err(NotFound::new("Agent", "edge-1").into())
                })),
            )
            .unwrap();

        let report = pipeline
            .run(&PipelineOptions::new(Mode::Apply), &NoObserver)
            .unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failed.len(), 1);
    }

    #[test]
    fn test_hard_failure_halts_later_groups() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pipeline = Pipeline::new(delete_order());
        pipeline
            .add(
                "Microservice",
                Box::new(FnExecutor::new("ms/bad", || anyhow::bail!("HTTP 500"))),
            )
            .unwrap();
        pipeline.add("Microservice", recording("ms/ok", &log)).unwrap();
        pipeline.add("Application", recording("app/shop", &log)).unwrap();
        pipeline.add("Controller", recording("ctrl/main", &log)).unwrap();

        let report = pipeline
            .run(&PipelineOptions::new(Mode::Delete).jobs(2), &NoObserver)
            .unwrap();

        // Sibling in the failing group still ran
        assert_eq!(report.succeeded, vec!["ms/ok".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert_eq!(report.total(), 4);
        assert_eq!(*log.lock().unwrap(), vec!["ms/ok".to_string()]);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_run_ordered_helper() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executors = vec![
            ("Controller".to_string(), recording("ctrl", &log)),
            ("Agent".to_string(), recording("agent", &log)),
        ];
        let report = run_ordered(
            delete_order().reversed(),
            executors,
            &PipelineOptions::new(Mode::Apply),
            &NoObserver,
        )
        .unwrap();
        assert!(report.is_success());
        assert_eq!(*log.lock().unwrap(), vec!["ctrl".to_string(), "agent".to_string()]);
    }
}
