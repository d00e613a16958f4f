//! Error types for the Spark operator
//!
//! Errors carry the application they concern where one is known, so log
//! lines and events can be correlated with a specific SparkApplication.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// HTTP status the API server returns for a stale resourceVersion
const CONFLICT_STATUS: u16 = 409;

/// HTTP status the API server returns for a missing object
const NOT_FOUND_STATUS: u16 = 404;

/// Main error type for Spark operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The application spec cannot be turned into a submission
    #[error("validation error for {app}: {message}")]
    Validation {
        /// Name of the application with invalid configuration
        app: String,
        /// Description of what's invalid
        message: String,
    },

    /// spark-submit could not be run or rejected the application
    #[error("submission error for {app}: {message}")]
    Submission {
        /// appID of the failed submission
        app: String,
        /// Output or reason of the failure
        message: String,
    },

    /// Every status write attempt was rejected
    #[error("status update for {app} dropped after {attempts} attempts")]
    UpdateRetriesExhausted {
        /// Name of the application whose status could not be persisted
        app: String,
        /// Number of write attempts made
        attempts: u32,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Context where the error occurred (e.g. "informer", "pod-monitor")
        context: String,
    },
}

impl Error {
    /// Create a validation error for an application
    pub fn validation_for(app: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            app: app.into(),
            message: msg.into(),
        }
    }

    /// Create a submission error for an application
    pub fn submission_for(app: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Submission {
            app: app.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
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

    /// Whether the API server rejected a write because the resourceVersion was stale
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == CONFLICT_STATUS
        )
    }

    /// Whether the API server reported the object as missing
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::Kube {
                source: kube::Error::Api(ae)
            } if ae.code == NOT_FOUND_STATUS
        )
    }

    /// Get the application name if this error is associated with one
    pub fn app(&self) -> Option<&str> {
        match self {
            Error::Validation { app, .. } => Some(app),
            Error::Submission { app, .. } => Some(app),
            Error::UpdateRetriesExhausted { app, .. } => Some(app),
            Error::Kube { .. } | Error::Serialization { .. } | Error::Internal { .. } => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
