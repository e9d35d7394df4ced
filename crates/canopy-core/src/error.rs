//! Error types and result aliases for Canopy.
//!
//! The variants follow the pipeline's failure taxonomy: `InvalidSource` is
//! the single user-correctable error surfaced synchronously; `Conversion`
//! aborts a registration rather than storing a lossy artifact; `Execution`
//! and `Persistence` occur inside the detached lint continuation and are
//! recovered locally (logged, never surfaced to a caller).

use std::fmt;

/// The result type used throughout Canopy.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Canopy operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The submitted spec source could not be fetched, parsed, or validated.
    ///
    /// Covers malformed documents, unresolved references, validation
    /// violations, non-2xx fetches, and transport failures. Carries a
    /// human-readable detail; a partial document is never returned.
    #[error("invalid spec source: {message}")]
    InvalidSource {
        /// Description of what made the source invalid.
        message: String,
    },

    /// A cross-family artifact conversion cannot round-trip.
    ///
    /// The whole registration fails rather than silently storing a lossy
    /// artifact.
    #[error("artifact conversion failed: {message}")]
    Conversion {
        /// Description of the construct that cannot be converted.
        message: String,
    },

    /// The external rule checker could not be executed at all.
    ///
    /// A non-zero exit with findings is NOT this error; only failure to
    /// run the checker is.
    #[error("linter execution failed: {message}")]
    Execution {
        /// Description of the execution failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The persistence collaborator failed.
    #[error("persistence error: {message}")]
    Persistence {
        /// Description of the store failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// The requested entity was not found.
    #[error("not found: {resource_type} with id {id}")]
    NotFound {
        /// The type of resource that was not found.
        resource_type: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// An internal error that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new invalid-source error with the given detail.
    #[must_use]
    pub fn invalid_source(message: impl Into<String>) -> Self {
        Self::InvalidSource {
            message: message.into(),
        }
    }

    /// Creates a new conversion error with the given detail.
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion {
            message: message.into(),
        }
    }

    /// Creates a new execution error with the given message.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new execution error with a source cause.
    #[must_use]
    pub fn execution_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Execution {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new persistence error with the given message.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new not-found error.
    #[must_use]
    pub fn not_found(resource_type: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}
