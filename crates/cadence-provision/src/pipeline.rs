//! The provisioning pipeline
//!
//! Overlay, validate, then compile per backend. All-or-nothing: the first
//! error aborts the run and no graph is returned.

use cadence_common::BackendKind;
use tracing::{info, info_span};

use crate::document::ProvisionDocument;
use crate::error::ProvisionError;
use crate::target::{ResourceGraph, Target};

/// Provision `doc` for one backend, with an optional overlay.
pub fn provision(
    doc: &ProvisionDocument,
    kind: BackendKind,
    overlay: Option<&str>,
) -> Result<ResourceGraph, ProvisionError> {
    let span = info_span!("provision", workload = %doc.workload.name, backend = %kind);
    let _guard = span.enter();

    let intent = doc.intent(overlay)?;
    let target = Target::select(&doc.targets, kind)?;
    let graph = target.compile(&intent, &doc.env_defaults)?;

    info!(
        overlay = overlay.unwrap_or("none"),
        objects = graph.len(),
        "provisioned"
    );
    Ok(graph)
}

/// Provision `doc` for every configured backend.
///
/// Fails if no backend is configured, or if any backend fails.
pub fn provision_all(
    doc: &ProvisionDocument,
    overlay: Option<&str>,
) -> Result<Vec<ResourceGraph>, ProvisionError> {
    let kinds = doc.targets.configured();
    if kinds.is_empty() {
        return Err(cadence_common::Error::validation(
            "targets",
            "at least one backend must be configured",
        )
        .into());
    }
    kinds
        .into_iter()
        .map(|kind| provision(doc, kind, overlay))
        .collect()
}
