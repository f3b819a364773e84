//! Secret locators
//!
//! A locator says where a secret lives, never what it is. The type has no
//! string conversion on purpose: emitters pattern-match it into their
//! native injection mechanism, and nothing can drop one into a plain
//! environment map by accident.

use std::fmt;

use crate::{Error, Result};

/// External store a locator points into
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SecretStore {
    /// AWS Systems Manager Parameter Store
    SsmParameterStore,
    /// AWS Secrets Manager
    SecretsManager,
    /// A Kubernetes Secret managed outside Cadence
    Kubernetes,
}

impl fmt::Display for SecretStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SsmParameterStore => write!(f, "ssm"),
            Self::SecretsManager => write!(f, "secretsmanager"),
            Self::Kubernetes => write!(f, "k8s"),
        }
    }
}

/// Opaque reference to a secret's location in an external store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SecretLocator {
    /// `ssm:<name or ARN>`
    SsmParameter {
        /// Parameter name (`/prod/token`) or full parameter ARN
        parameter: String,
    },
    /// `secretsmanager:<ARN>`, optionally with an ECS json-key suffix
    SecretsManager {
        /// Secret ARN as written, including any `:json-key:version-stage:version-id` suffix
        arn: String,
    },
    /// `k8s:<secret>/<key>`
    Kubernetes {
        /// Secret name
        secret: String,
        /// Key within the secret
        key: String,
    },
}

impl SecretLocator {
    /// Parse a `store:reference` locator.
    ///
    /// `field` is the path reported in errors.
    pub fn parse(field: &str, raw: &str) -> Result<Self> {
        let (store, reference) = raw.split_once(':').ok_or_else(|| {
            Error::validation(
                field,
                format!("locator '{raw}' must be of the form ssm:..., secretsmanager:... or k8s:..."),
            )
        })?;
        if reference.is_empty() {
            return Err(Error::validation(field, "locator reference is empty"));
        }

        match store {
            "ssm" => {
                if reference.starts_with("arn:") && !reference.contains(":ssm:") {
                    return Err(Error::validation(
                        field,
                        format!("'{reference}' is not an SSM parameter ARN"),
                    ));
                }
                Ok(Self::SsmParameter {
                    parameter: reference.to_string(),
                })
            }
            "secretsmanager" => {
                let parts: Vec<&str> = reference.split(':').collect();
                let is_secret_arn = parts.len() >= 7
                    && parts[0] == "arn"
                    && parts[2] == "secretsmanager"
                    && parts[5] == "secret"
                    && !parts[6].is_empty();
                if !is_secret_arn {
                    return Err(Error::validation(
                        field,
                        format!("'{reference}' is not a full Secrets Manager secret ARN"),
                    ));
                }
                Ok(Self::SecretsManager {
                    arn: reference.to_string(),
                })
            }
            "k8s" => match reference.split_once('/') {
                Some((secret, key)) if !secret.is_empty() && !key.is_empty() => {
                    Ok(Self::Kubernetes {
                        secret: secret.to_string(),
                        key: key.to_string(),
                    })
                }
                _ => Err(Error::validation(
                    field,
                    format!("kubernetes locator '{reference}' must be <secret>/<key>"),
                )),
            },
            other => Err(Error::validation(
                field,
                format!("unknown secret store '{other}'"),
            )),
        }
    }

    /// The store this locator points into
    pub fn store(&self) -> SecretStore {
        match self {
            Self::SsmParameter { .. } => SecretStore::SsmParameterStore,
            Self::SecretsManager { .. } => SecretStore::SecretsManager,
            Self::Kubernetes { .. } => SecretStore::Kubernetes,
        }
    }
}
