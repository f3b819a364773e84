//! Provisioning for Cadence workloads
//!
//! Reads a provisioning document, applies an optional overlay to its
//! workload, validates the result into a `WorkloadIntent` and compiles it
//! for one or every configured backend. Nothing is returned unless every
//! stage succeeds.

#![deny(missing_docs)]

pub mod document;
pub mod error;
pub mod overlay;
pub mod pipeline;
pub mod target;

pub use document::{ProvisionDocument, Targets};
pub use error::ProvisionError;
pub use overlay::Overlay;
pub use pipeline::{provision, provision_all};
pub use target::{OutputFormat, ResourceGraph, Target};
