//! Executor trait for uniform units of work
//!
//! An Executor wraps one deploy/delete/describe operation regardless of the
//! backend it talks to (SSH host, local container runtime, Kubernetes or the
//! Controller API).

use anyhow::Result;
use std::fmt;

/// Core trait for all units of work
///
/// Executors are immutable once constructed: every input is bound at
/// construction time. The engine executes each executor at most once and
/// drops it afterwards.
///
/// # Example
///
/// ```
/// use executor::Executor;
///
/// struct Echo {
///     name: String,
/// }
///
/// impl Executor for Echo {
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     fn execute(&self) -> anyhow::Result<()> {
///         println!("running {}", self.name);
///         Ok(())
///     }
/// }
/// ```
pub trait Executor: Send + Sync {
    /// Identity used for log and report correlation (e.g. "Application/shop")
    fn name(&self) -> &str;

    /// Perform the operation
    fn execute(&self) -> Result<()>;
}

/// A boxed executor for type-erased storage
pub type BoxedExecutor = Box<dyn Executor>;

impl fmt::Debug for dyn Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor").field("name", &self.name()).finish()
    }
}

/// Executor backed by a closure
///
/// Handy for small one-off steps (and for tests) where a dedicated type
/// would be noise.
pub struct FnExecutor<F> {
    name: String,
    action: F,
}

impl<F> FnExecutor<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    /// Create an executor named `name` that runs `action`
    pub fn new(name: impl Into<String>, action: F) -> Self {
        Self {
            name: name.into(),
            action,
        }
    }
}

impl<F> Executor for FnExecutor<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self) -> Result<()> {
        (self.action)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_executor_runs_action() {
        let executor = FnExecutor::new("noop", || Ok(()));
        assert_eq!(executor.name(), "noop");
        assert!(executor.execute().is_ok());
    }

    #[test]
    fn test_fn_executor_propagates_error() {
        let executor = FnExecutor::new("boom", || anyhow::bail!("exploded"));
        let err = executor.execute().unwrap_err();
        assert_eq!(err.to_string(), "exploded");
    }

    #[test]
    fn test_boxed_executor_debug() {
        let boxed: BoxedExecutor = Box::new(FnExecutor::new("debug-me", || Ok(())));
        assert!(format!("{:?}", boxed).contains("debug-me"));
    }
}
