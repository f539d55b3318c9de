//! Error types for the resiliency addon
//!
//! Errors carry enough context to be actionable from logs alone. Kubernetes
//! API failures are classified into the taxonomy the controller and the
//! migration runner act on (see [`ErrorKind`]).

use thiserror::Error;

use crate::migration::MigrationReport;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Classification of an [`Error`] used to decide how a caller reacts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Object is absent; an expected control signal, never fatal on lookups
    NotFound,
    /// Network or API failure; fatal to the current cycle, retried externally
    TransientStore,
    /// Optimistic concurrency collision; handled like `TransientStore`
    Conflict,
    /// One or more migration actions failed
    PartialBatch,
    /// Malformed input that retrying cannot fix
    Validation,
    /// Encoding or decoding failure
    Serialization,
    /// The invocation was cancelled
    Cancelled,
}

/// Main error type for resiliency addon operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Invalid input (trigger, object without required metadata)
    #[error("validation error for {subject}: {message}")]
    Validation {
        /// The object or request that failed validation
        subject: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being serialized (if known)
        kind: Option<String>,
    },

    /// Some migration actions failed; the rest of the batch still ran
    #[error("migration batch had errors: {failed} of {total} actions failed")]
    PartialBatch {
        /// Number of actions that failed
        failed: usize,
        /// Number of actions that ran
        total: usize,
        /// Per-action outcome of the batch
        report: MigrationReport,
    },

    /// Some items handled by a single migration action failed
    #[error("{failed} of {total} items in {scope} failed: {names}")]
    ItemsFailed {
        /// What the items belong to
        scope: String,
        /// Number of items that failed
        failed: usize,
        /// Number of items processed
        total: usize,
        /// Comma-separated names of the failed items
        names: String,
    },

    /// The operation was cancelled before it completed
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a validation error without a specific subject
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            subject: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error naming the offending subject
    pub fn validation_for(subject: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            subject: subject.into(),
            message: msg.into(),
        }
    }

    /// Wrap a migration report that contains failures
    pub fn partial_batch(report: MigrationReport) -> Self {
        Self::PartialBatch {
            failed: report.failures.len(),
            total: report.total(),
            report,
        }
    }

    /// Summarise per-item failures of one action
    pub fn items_failed(scope: impl Into<String>, failed: &[String], total: usize) -> Self {
        Self::ItemsFailed {
            scope: scope.into(),
            failed: failed.len(),
            total,
            names: failed.join(", "),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Kube { source } if is_kube_not_found(source) => ErrorKind::NotFound,
            Error::Kube { source } if is_kube_conflict(source) => ErrorKind::Conflict,
            Error::Kube { .. } => ErrorKind::TransientStore,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::Serialization { .. } => ErrorKind::Serialization,
            Error::PartialBatch { .. } | Error::ItemsFailed { .. } => ErrorKind::PartialBatch,
            Error::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// True for a Kubernetes 404
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    /// True for a Kubernetes 409 (conflict or already exists)
    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Check if this error is retryable
    ///
    /// Store failures and conflicts converge on a later attempt, and a
    /// partially failed migration batch is safe to re-run. Validation,
    /// serialization and cancellation need a change before retrying helps.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientStore | ErrorKind::Conflict | ErrorKind::PartialBatch
        )
    }
}

/// True if a raw kube error is a 404
pub(crate) fn is_kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// True if a raw kube error is a 409
fn is_kube_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

#[cfg(test)]
pub(crate) fn api_error(code: u16, reason: &str) -> Error {
    Error::Kube {
        source: kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{reason} (test)"),
            reason: reason.to_string(),
            code,
        }),
    }
}
