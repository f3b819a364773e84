//! The provisioning document
//!
//! One YAML or JSON file per workload: the base workload definition, the
//! environment defaults, per-backend target settings and named overlays.

use std::collections::BTreeMap;

use cadence_aws::AwsTarget;
use cadence_common::{BackendKind, EnvDefaults, Error, WorkloadIntent, WorkloadManifest};
use cadence_kube::KubeTarget;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::overlay::Overlay;

/// Per-backend target settings; a backend without settings is not provisioned
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Targets {
    /// Kubernetes settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes: Option<KubeTarget>,
    /// AWS settings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws: Option<AwsTarget>,
}

impl Targets {
    /// Backends with settings, in a stable order
    pub fn configured(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                BackendKind::Kubernetes => self.kubernetes.is_some(),
                BackendKind::Aws => self.aws.is_some(),
            })
            .collect()
    }
}

/// A complete provisioning document
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionDocument {
    /// Base workload definition
    pub workload: WorkloadManifest,

    /// Environment applied beneath `workload.env`
    #[serde(default)]
    pub env_defaults: EnvDefaults,

    /// Backend settings
    #[serde(default)]
    pub targets: Targets,

    /// Named overrides such as `prod`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overlays: BTreeMap<String, Overlay>,
}

impl ProvisionDocument {
    /// Parse YAML; JSON documents parse too since JSON is a YAML subset
    pub fn from_yaml(text: &str) -> Result<Self, ProvisionError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Parse JSON
    pub fn from_json(text: &str) -> Result<Self, ProvisionError> {
        Ok(serde_json::from_str(text)?)
    }

    /// JSON Schema of the document format
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(ProvisionDocument)
    }

    /// Workload definition with `overlay` applied, if any
    pub fn effective_workload(&self, overlay: Option<&str>) -> cadence_common::Result<WorkloadManifest> {
        let Some(name) = overlay else {
            return Ok(self.workload.clone());
        };
        let overlay = self.overlays.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.overlays.keys().map(String::as_str).collect();
            Error::validation(
                "overlay",
                format!("unknown overlay '{name}' (known: {})", known.join(", ")),
            )
        })?;
        overlay.apply(name, &self.workload)
    }

    /// Validated intent for the workload with `overlay` applied
    pub fn intent(&self, overlay: Option<&str>) -> cadence_common::Result<WorkloadIntent> {
        WorkloadIntent::from_manifest(&self.effective_workload(overlay)?)
    }
}
