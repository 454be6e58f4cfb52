//! Failure types and coalescing
//!
//! The parallel engine never stops at the first failure. Every failure is
//! kept as an [`ExecutionFailure`] and the whole batch is reported through an
//! [`ErrorList`].

use std::fmt;

/// Marker error for a resource that does not exist
///
/// Return this (directly or wrapped in `anyhow` context) from an executor
/// to let the pipeline tell "already gone" apart from hard failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} {name} not found")]
pub struct NotFound {
    /// Resource kind (e.g. "Application")
    pub kind: String,
    /// Resource name
    pub name: String,
}

impl NotFound {
    /// Create a not-found marker
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Check whether an error chain contains a [`NotFound`] marker
pub fn is_not_found(error: &anyhow::Error) -> bool {
    error.downcast_ref::<NotFound>().is_some() || error.chain().any(|cause| cause.is::<NotFound>())
}

/// A single executor failure
#[derive(Debug)]
pub struct ExecutionFailure {
    /// Name of the executor that failed
    pub name: String,
    /// The error it returned
    pub error: anyhow::Error,
}

impl ExecutionFailure {
    /// Create a failure record
    pub fn new(name: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }

    /// Whether this failure only means the resource was already absent
    pub fn is_not_found(&self) -> bool {
        is_not_found(&self.error)
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:#}", self.name, self.error)
    }
}

/// Coalesced failures of a batch
///
/// Order is not meaningful: failures are correlated by executor name.
#[derive(Debug, Default)]
pub struct ErrorList {
    failures: Vec<ExecutionFailure>,
}

impl ErrorList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a failure
    pub fn push(&mut self, failure: ExecutionFailure) {
        self.failures.push(failure);
    }

    /// Move every failure of `other` into this list
    pub fn extend(&mut self, other: ErrorList) {
        self.failures.extend(other.failures);
    }

    /// Whether no failure was recorded
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Number of failures
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Iterate over all failures
    pub fn iter(&self) -> impl Iterator<Item = &ExecutionFailure> {
        self.failures.iter()
    }

    /// Failures that only report a missing resource
    pub fn not_found(&self) -> impl Iterator<Item = &ExecutionFailure> {
        self.failures.iter().filter(|f| f.is_not_found())
    }

    /// Failures that are not explained by a missing resource
    pub fn hard(&self) -> impl Iterator<Item = &ExecutionFailure> {
        self.failures.iter().filter(|f| !f.is_not_found())
    }

    /// Whether the list holds at least one hard failure
    pub fn has_hard(&self) -> bool {
        self.hard().next().is_some()
    }

    /// Split into (not-found, hard) lists
    pub fn partition(self) -> (ErrorList, ErrorList) {
        let (not_found, hard): (Vec<_>, Vec<_>) =
            self.failures.into_iter().partition(ExecutionFailure::is_not_found);
        (Self { failures: not_found }, Self { failures: hard })
    }

    /// `Ok(())` when empty, otherwise the list itself as an error
    pub fn into_result(self) -> Result<(), ErrorList> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl IntoIterator for ErrorList {
    type Item = ExecutionFailure;
    type IntoIter = std::vec::IntoIter<ExecutionFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.failures.into_iter()
    }
}

impl FromIterator<ExecutionFailure> for ErrorList {
    fn from_iter<I: IntoIterator<Item = ExecutionFailure>>(iter: I) -> Self {
        Self {
            failures: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self.failures.iter().map(ToString::to_string).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl std::error::Error for ErrorList {}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_is_not_found_direct() {
        let err = anyhow::Error::new(NotFound::new("Application", "shop"));
        assert!(is_not_found(&err));
        assert_eq!(err.to_string(), "Application shop not found");
    }

    #[test]
    fn test_is_not_found_through_context() {
        let result: anyhow::Result<()> = Err(NotFound::new("Microservice", "api").into());
        let err = result.context("Failed to delete Microservice api").unwrap_err();
        assert!(is_not_found(&err));
    }

    #[test]
    fn test_is_not_found_false_for_other_errors() {
        let err = anyhow::anyhow!("connection refused");
        assert!(!is_not_found(&err));
    }

    #[test]
    fn test_error_list_display_is_newline_joined() {
        let list: ErrorList = vec![
            ExecutionFailure::new("a", anyhow::anyhow!("first")),
            ExecutionFailure::new("b", anyhow::anyhow!("second")),
        ]
        .into_iter()
        .collect();

        assert_eq!(list.to_string(), "a: first\nb: second");
    }

    #[test]
    fn test_error_list_partition() {
        let list: ErrorList = vec![
            ExecutionFailure::new("gone", NotFound::new("Secret", "s").into()),
            ExecutionFailure::new("broken", anyhow::anyhow!("timeout")),
        ]
        .into_iter()
        .collect();

        assert_eq!(list.not_found().count(), 1);
        assert!(list.has_hard());

        let (not_found, hard) = list.partition();
        assert_eq!(not_found.len(), 1);
        assert_eq!(hard.len(), 1);
        assert_eq!(hard.iter().next().unwrap().name, "broken");
    }

    #[test]
    fn test_error_list_into_result() {
        assert!(ErrorList::new().into_result().is_ok());

        let mut list = ErrorList::new();
        list.push(ExecutionFailure::new("x", anyhow::anyhow!("bad")));
        assert!(list.into_result().is_err());
    }
}
