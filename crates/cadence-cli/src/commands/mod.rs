//! CLI commands

use std::path::{Path, PathBuf};

use clap::Args;
use tracing::debug;

use cadence_provision::ProvisionDocument;

use crate::{Error, Result};

pub mod render;
pub mod schema;
pub mod validate;

/// Where the provisioning document comes from
#[derive(Args, Debug)]
pub struct DocumentArgs {
    /// Provisioning document (YAML or JSON)
    #[arg(long, short, env = "CADENCE_FILE")]
    pub file: PathBuf,

    /// Overlay to apply on top of the base workload
    #[arg(long, short, env = "CADENCE_OVERLAY")]
    pub overlay: Option<String>,
}

/// Read and parse a provisioning document; `.json` files are parsed as JSON
pub fn load_document(path: &Path) -> Result<ProvisionDocument> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::ReadDocument {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = text.len(), "read provisioning document");

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let doc = if is_json {
        ProvisionDocument::from_json(&text)?
    } else {
        ProvisionDocument::from_yaml(&text)?
    };
    Ok(doc)
}

#[cfg(test)]
pub(crate) fn demo_document_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/email-assistant.yaml")
}
