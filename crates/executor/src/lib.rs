//! # Executor
//!
//! Uniform units of work for deploy, delete and describe operations.
//!
//! This crate provides the pieces that let heterogeneous operations be
//! scheduled, parallelized and partially fail without losing progress.
//!
//! ## Core Concepts
//!
//! - **Executor**: a named, fallible unit of work, executed at most once
//! - **ExecutorRegistry**: maps a resource kind to the factory building its executor
//! - **run_parallel**: runs a group of executors concurrently and joins on all of them
//! - **ErrorList**: coalesces independent failures into one report
//! - **Pipeline**: runs kind groups strictly in the order of a [`KindOrder`]
//!
//! ## Example
//!
//! ```
//! use executor::{FnExecutor, KindOrder, Mode, NoObserver, Pipeline, PipelineOptions};
//!
//! let order = KindOrder::new([vec!["Microservice"], vec!["Application"]]);
//! let mut pipeline = Pipeline::new(order);
//!
//! pipeline
//!     .add("Microservice", Box::new(FnExecutor::new("ms/api", || Ok(()))))
//!     .unwrap();
//! pipeline
//!     .add("Application", Box::new(FnExecutor::new("app/shop", || Ok(()))))
//!     .unwrap();
//!
//! let report = pipeline.run(&PipelineOptions::new(Mode::Delete), &NoObserver).unwrap();
//! assert_eq!(report.succeeded.len(), 2);
//! ```
//!
//! ## Not-found tolerance
//!
//! Executors signal a missing remote resource by returning [`NotFound`]
//! (possibly wrapped in context). In [`Mode::Delete`] those failures are
//! downgraded to warnings so that delete-all stays idempotent.

pub mod context;
pub mod error;
pub mod executor;
pub mod parallel;
pub mod pipeline;
pub mod registry;

pub use context::{NoObserver, Observer};
pub use error::{ErrorList, ExecutionFailure, NotFound, is_not_found};
pub use executor::{BoxedExecutor, Executor, FnExecutor};
pub use parallel::{GroupOutcome, run_parallel};
pub use pipeline::{KindOrder, Mode, Pipeline, PipelineOptions, RunReport, run_ordered};
pub use registry::{ExecutorRegistry, Factory, FactoryInput};
