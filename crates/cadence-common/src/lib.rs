//! Common types for Cadence: workload intent, schedules, environment,
//! roles and the backend capability trait.
//!
//! Everything in this crate is a pure transformation of declarative input.
//! No I/O happens here; backend API calls belong to the apply tooling that
//! consumes the emitted resource graphs.

#![deny(missing_docs)]

pub mod backend;
pub mod env;
pub mod error;
pub mod hash;
pub mod iam;
pub mod intent;
pub mod meta;
pub mod schedule;
pub mod secret;

pub use backend::{Backend, BackendKind, EmitInput};
pub use env::{EnvDefaults, ResolvedEnvironment, SecretBinding};
pub use error::Error;
pub use hash::compute_config_hash;
pub use iam::{Grant, GrantCondition, Identity, RoleScope, RoleSet, RoleSpec};
pub use intent::{ScheduleInput, SecretRef, SecretRefSpec, WorkloadIntent, WorkloadManifest};
pub use meta::ObjectMeta;
pub use schedule::ScheduleSpec;
pub use secret::{SecretLocator, SecretStore};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Standard Kubernetes label for the application name
pub const LABEL_NAME: &str = "app.kubernetes.io/name";

/// Standard Kubernetes label for the managing tool
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on every emitted resource
pub const LABEL_MANAGED_BY_CADENCE: &str = "cadence";

/// Annotation carrying the hash of the plain environment
pub const CONFIG_HASH_ANNOTATION: &str = "cadence.dev/config-hash";

/// Name of the writable scratch volume mounted at the workload's scratch path
pub const SCRATCH_VOLUME_NAME: &str = "scratch";
