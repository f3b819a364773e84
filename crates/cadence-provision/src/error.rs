//! Provisioning error types

use thiserror::Error;

/// Errors from reading documents, provisioning and rendering
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Intent, schedule, role or emission error
    #[error(transparent)]
    Provision(#[from] cadence_common::Error),

    /// The document is not valid YAML or does not match the schema
    #[error("invalid provisioning document: {0}")]
    Document(#[from] serde_yaml::Error),

    /// JSON input or output failed
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
