//! Resource metadata shared by emitted objects

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kubernetes-style object metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace; absent for cluster-scoped objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Namespaced metadata with the standard Cadence labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Self::cluster_scoped(name)
        }
    }

    /// Cluster-scoped metadata with the standard Cadence labels
    pub fn cluster_scoped(name: impl Into<String>) -> Self {
        let name = name.into();
        let labels = BTreeMap::from([
            (crate::LABEL_NAME.to_string(), name.clone()),
            (
                crate::LABEL_MANAGED_BY.to_string(),
                crate::LABEL_MANAGED_BY_CADENCE.to_string(),
            ),
        ]);
        Self {
            name,
            namespace: None,
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}
