//! Error types for the Blocky controller
//!
//! Errors carry the resource they concern so that log lines and condition
//! messages point at the object that failed. "Not found" is never an error:
//! reads return `Option` instead.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for Blocky operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error that was not classified as transient or conflict
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A read from the store failed for a transient reason (connectivity, timeout)
    #[error("transient fetch error for {resource}: {message}")]
    TransientFetch {
        /// Resource being read (e.g. "Deployment default/demo")
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// A write to the store failed for a transient reason (connectivity, timeout)
    #[error("transient write error for {resource}: {message}")]
    TransientWrite {
        /// Resource being written
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// The object was modified concurrently (optimistic concurrency failure)
    #[error("conflict on {resource}: {message}")]
    Conflict {
        /// Resource whose write conflicted
        resource: String,
        /// Description of the conflict
        message: String,
    },

    /// Desired state is outside the accepted domain
    #[error("validation error for {name}: {message}")]
    Validation {
        /// Name of the Blocky with invalid configuration
        name: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "spec.size")
        field: Option<String>,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Invalid controller configuration
    #[error("configuration error: {message}")]
    Config {
        /// Description of what's wrong
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g., "reconciler", "status")
        context: String,
    },
}

impl Error {
    /// Create a transient fetch error for a resource
    pub fn transient_fetch(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TransientFetch {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a transient write error for a resource
    pub fn transient_write(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TransientWrite {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a conflict error for a resource
    pub fn conflict(resource: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: msg.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            name: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error for a named Blocky and a field path
    pub fn validation_for_field(
        name: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            name: name.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation, serialization and configuration errors are not retryable
    /// (retrying cannot fix the input). Kubernetes errors are retryable unless
    /// the API server rejected the request with a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code)
            ),
            Error::TransientFetch { .. } => true,
            Error::TransientWrite { .. } => true,
            Error::Conflict { .. } => true,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Config { .. } => false,
            Error::Internal { .. } => true,
        }
    }

    /// Check if this error is a transient I/O failure worth an immediate retry
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TransientFetch { .. } | Error::TransientWrite { .. }
        )
    }

    /// Check if this error is an optimistic concurrency conflict
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Short machine-readable class name, used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Kube { .. } => "kube",
            Error::TransientFetch { .. } => "transient_fetch",
            Error::TransientWrite { .. } => "transient_write",
            Error::Conflict { .. } => "conflict",
            Error::Validation { .. } => "validation",
            Error::Serialization { .. } => "serialization",
            Error::Config { .. } => "config",
            Error::Internal { .. } => "internal",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::serialization(e.to_string())
    }
}
