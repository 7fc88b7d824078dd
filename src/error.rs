// error.rs - Error types for the fixture lifecycle
//
// Every fallible operation in this crate returns `FixtureError`.
// Construction errors abort `before()`; teardown errors are collected
// so that every tester gets its chance to tear down.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::driver::ConnectionId;

/// Boxed error coming from an underlying database driver
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the crate
pub type Result<T, E = FixtureError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum FixtureError {
    /// Missing connection url, unusable credentials, malformed descriptor
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// A tester-typed field was already populated when `before()` ran
    #[error("field `{field}` already holds a tester; refusing to inject a second one")]
    Reinjection { field: &'static str },

    /// Any construction error, tagged with the field that caused it
    #[error("fixture field `{class}::{field}`: {source}")]
    InField {
        class: &'static str,
        field: &'static str,
        #[source]
        source: Box<FixtureError>,
    },

    #[error(transparent)]
    Teardown(TeardownFailures),

    #[error("lifecycle is {actual}, expected {expected}")]
    Lifecycle {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("could not read dataset {path:?}: {source}")]
    DatasetIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset `{resource}` is malformed: {source}")]
    DatasetParse {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("dataset `{resource}` is malformed: {reason}")]
    DatasetShape { resource: String, reason: String },

    #[error("`{name}` is not a valid table, column or schema identifier")]
    InvalidIdentifier { name: String },

    #[error("schema `{schema}` does not exist")]
    SchemaNotFound { schema: String },

    #[error("{backend} does not support {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("{context}: {source}")]
    Driver {
        context: String,
        #[source]
        source: BoxError,
    },
}

impl FixtureError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        FixtureError::Configuration {
            reason: reason.into(),
        }
    }

    pub fn driver(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        FixtureError::Driver {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Strips any `InField` wrappers
    pub fn root(&self) -> &FixtureError {
        match self {
            FixtureError::InField { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), FixtureError::Configuration { .. })
    }

    pub fn is_reinjection(&self) -> bool {
        matches!(self.root(), FixtureError::Reinjection { .. })
    }

    pub fn is_teardown(&self) -> bool {
        matches!(self.root(), FixtureError::Teardown(_))
    }
}

/// One tester whose teardown operation failed
#[derive(Debug)]
pub struct TeardownFailure {
    pub connection: ConnectionId,
    pub error: FixtureError,
}

/// Every teardown failure from a single `after()` call
#[derive(Debug, Default)]
pub struct TeardownFailures {
    failures: Vec<TeardownFailure>,
}

impl TeardownFailures {
    pub fn push(&mut self, connection: ConnectionId, error: FixtureError) {
        self.failures.push(TeardownFailure { connection, error });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TeardownFailure> {
        self.failures.iter()
    }

    /// `Ok(())` when nothing failed
    pub fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::Teardown(self))
        }
    }
}

impl fmt::Display for TeardownFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} teardown(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {}", failure.connection, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownFailures {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_sees_through_field_wrapper() {
        let err = FixtureError::InField {
            class: "MyTest",
            field: "conn",
            source: Box::new(FixtureError::configuration("no connection url")),
        };
        assert!(err.is_configuration());
        assert!(!err.is_reinjection());
        let message = err.to_string();
        assert!(message.contains("MyTest::conn"));
        assert!(message.contains("no connection url"));
    }

    #[test]
    fn test_teardown_failures_report_every_connection() {
        let mut failures = TeardownFailures::default();
        assert!(failures.is_empty());

        failures.push(ConnectionId::from_raw(3), FixtureError::configuration("first"));
        failures.push(ConnectionId::from_raw(7), FixtureError::configuration("second"));
        assert_eq!(failures.len(), 2);

        let err = failures.into_result().unwrap_err();
        assert!(err.is_teardown());
        let message = err.to_string();
        assert!(message.starts_with("2 teardown(s) failed"));
        assert!(message.contains("connection#3"));
        assert!(message.contains("connection#7"));
    }

    #[test]
    fn test_empty_failures_are_ok() {
        assert!(TeardownFailures::default().into_result().is_ok());
    }
}
