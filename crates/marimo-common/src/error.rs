//! Error types for the marimo operator
//!
//! Only conditions the reconciler cannot resolve locally become errors.
//! "Not found" on read and "already exists" on create are expected outcomes
//! of a convergence pass and are modelled in the client abstraction instead.

use thiserror::Error;

/// Main error type for marimo operator operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// The notebook has no namespace (should never happen for a namespaced CRD)
    #[error("MarimoNotebook {name} is missing a namespace")]
    MissingNamespace {
        /// Name of the notebook
        name: String,
    },

    /// The notebook has no UID, so an owner reference cannot be built
    #[error("MarimoNotebook {name} has no uid; cannot set owner reference")]
    MissingOwnerUid {
        /// Name of the notebook
        name: String,
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
    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Returns true if the error wraps an API 409 Conflict.
    ///
    /// Status writes race with other writers; the next pass recomputes.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Kube { source: kube::Error::Api(ae) } if ae.code == 409)
    }

    /// Check if this error is retryable
    ///
    /// Rejected requests and a missing namespace need a spec or code fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
            ),
            Error::MissingNamespace { .. } => false,
            Error::MissingOwnerUid { .. } => true,
            Error::Internal { .. } => true,
        }
    }
}
