//! Error taxonomy for provisioning
//!
//! Every error names the offending field or expression. All of them are
//! raised before any resource graph is produced; the pipeline never returns
//! a partial graph.

use thiserror::Error;

/// Main error type for Cadence provisioning
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Malformed or incomplete workload intent
    #[error("validation error for {field}: {message}")]
    Validation {
        /// Field path of the invalid value (e.g. "workload.secretRefs[0].source")
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Schedule expression is out of range or not expressible on a backend
    #[error("invalid schedule '{expression}': {message}")]
    InvalidSchedule {
        /// The schedule as written
        expression: String,
        /// Description of what's invalid
        message: String,
    },

    /// Missing trust principal or feature mapping for a backend
    #[error("unsupported on {backend}: {message}")]
    UnsupportedBackend {
        /// Backend name (kubernetes, aws)
        backend: String,
        /// Description of what has no mapping
        message: String,
    },

    /// A secret reference shares its name with a plain environment variable
    #[error("secret reference '{name}' collides with a plain environment variable")]
    SecretReferenceConflict {
        /// The colliding variable name
        name: String,
    },
}

impl Error {
    /// Create a validation error for a field
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a schedule error
    pub fn invalid_schedule(expression: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSchedule {
            expression: expression.into(),
            message: message.into(),
        }
    }

    /// Create an unsupported-backend error
    pub fn unsupported(backend: impl std::fmt::Display, message: impl Into<String>) -> Self {
        Self::UnsupportedBackend {
            backend: backend.to_string(),
            message: message.into(),
        }
    }

    /// Create a secret/env name collision error
    pub fn secret_conflict(name: impl Into<String>) -> Self {
        Self::SecretReferenceConflict { name: name.into() }
    }

    /// The field path or expression this error points at
    pub fn subject(&self) -> &str {
        match self {
            Self::Validation { field, .. } => field,
            Self::InvalidSchedule { expression, .. } => expression,
            Self::UnsupportedBackend { backend, .. } => backend,
            Self::SecretReferenceConflict { name } => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_display_names_field() {
        let err = Error::validation("workload.image", "must not be empty");
        let display = err.to_string();
        assert!(display.contains("workload.image"));
        assert!(display.contains("must not be empty"));
        assert_eq!(err.subject(), "workload.image");
    }

    #[test]
    fn schedule_display_includes_expression() {
        let err = Error::invalid_schedule("0 0 1 13 *", "month value 13 out of range 1-12");
        assert!(err.to_string().contains("0 0 1 13 *"));
        assert!(err.to_string().contains("month"));
    }

    #[test]
    fn unsupported_display_names_backend() {
        let err = Error::unsupported("aws", "k8s secret locators have no ECS mapping");
        assert_eq!(
            err.to_string(),
            "unsupported on aws: k8s secret locators have no ECS mapping"
        );
    }

    #[test]
    fn conflict_display_names_variable() {
        let err = Error::secret_conflict("TOKEN");
        assert!(err.to_string().contains("'TOKEN'"));
        assert_eq!(err.subject(), "TOKEN");
    }
}
