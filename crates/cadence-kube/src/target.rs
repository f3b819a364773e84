//! Kubernetes target settings and role vocabulary

use std::collections::BTreeSet;

use cadence_common::intent::is_dns_label;
use cadence_common::{
    BackendKind, Error, Grant, Identity, Result, RoleScope, SecretBinding, SecretLocator,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Identity of the built-in controller that launches CronJob ticks
pub const CRONJOB_CONTROLLER: &str = "system:serviceaccount:kube-system:cronjob-controller";

/// `targets.kubernetes` section of a provisioning document
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KubeTarget {
    /// Namespace for every emitted object; defaults to the workload name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Separately managed Secret holding values for `ssm:` and
    /// `secretsmanager:` references, keyed by variable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
}

impl KubeTarget {
    /// Namespace to emit into
    pub fn namespace_for<'a>(&'a self, workload: &'a str) -> &'a str {
        self.namespace.as_deref().unwrap_or(workload)
    }

    /// Reject malformed names
    pub fn validate(&self) -> Result<()> {
        if let Some(ns) = &self.namespace {
            if !is_dns_label(ns) {
                return Err(Error::validation(
                    "targets.kubernetes.namespace",
                    format!("'{ns}' is not a valid DNS label"),
                ));
            }
        }
        if let Some(secret) = &self.secret_name {
            if secret.is_empty() {
                return Err(Error::validation(
                    "targets.kubernetes.secretName",
                    "must not be empty",
                ));
            }
        }
        Ok(())
    }
}

/// Where a binding's value lives in the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretKeyRef {
    /// Secret name
    pub secret: String,
    /// Key within the Secret
    pub key: String,
}

/// Role vocabulary for one workload in one namespace
#[derive(Clone, Debug)]
pub struct KubeRoleScope {
    namespace: String,
    workload: String,
    external_secret: Option<String>,
}

impl KubeRoleScope {
    /// Scope for `workload` emitted under `target`
    pub fn new(workload: &str, target: &KubeTarget) -> Self {
        Self {
            namespace: target.namespace_for(workload).to_string(),
            workload: workload.to_string(),
            external_secret: target.secret_name.clone(),
        }
    }

    /// Map a binding onto the Secret key the pod reads.
    ///
    /// `k8s:` locators are used as written; external store locators read
    /// the separately managed Secret under the variable's own name.
    pub fn secret_key_ref(&self, binding: &SecretBinding) -> Result<SecretKeyRef> {
        match &binding.locator {
            SecretLocator::Kubernetes { secret, key } => Ok(SecretKeyRef {
                secret: secret.clone(),
                key: key.clone(),
            }),
            SecretLocator::SsmParameter { .. } | SecretLocator::SecretsManager { .. } => {
                let secret = self.external_secret.as_ref().ok_or_else(|| {
                    Error::validation(
                        "targets.kubernetes.secretName",
                        format!(
                            "required to inject '{}' from an external secret store",
                            binding.name
                        ),
                    )
                })?;
                Ok(SecretKeyRef {
                    secret: secret.clone(),
                    key: binding.name.clone(),
                })
            }
        }
    }
}

impl RoleScope for KubeRoleScope {
    fn backend(&self) -> BackendKind {
        BackendKind::Kubernetes
    }

    fn trust_principal(&self, identity: Identity) -> Result<String> {
        Ok(match identity {
            Identity::ExecutionAgent => format!(
                "system:serviceaccount:{}:{}",
                self.namespace, self.workload
            ),
            Identity::TriggerAgent => CRONJOB_CONTROLLER.to_string(),
        })
    }

    fn secret_read_grants(&self, bindings: &[SecretBinding]) -> Result<Vec<Grant>> {
        let mut names = BTreeSet::new();
        for binding in bindings {
            names.insert(self.secret_key_ref(binding)?.secret);
        }
        if names.is_empty() {
            return Ok(vec![]);
        }
        Ok(vec![Grant::new(["get"], names)])
    }

    /// The controller launches each run by creating a batch Job in the
    /// workload's namespace
    fn invoke_grant(&self) -> Grant {
        Grant::new(["create"], [format!("namespaces/{}/jobs.batch", self.namespace)])
    }
}
