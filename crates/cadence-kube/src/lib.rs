//! Kubernetes backend for Cadence
//!
//! Emits a namespaced resource graph around a `batch/v1` CronJob:
//! - Namespace with restricted pod security
//! - ServiceAccount (the ExecutionAgent) and, when secrets are referenced,
//!   a Role + RoleBinding granting `get` on exactly those Secrets
//! - ConfigMap carrying the plain environment
//! - NetworkPolicy denying all ingress
//! - CronJob referencing Secrets by name, never embedding values

#![deny(missing_docs)]

pub mod compiler;
pub mod k8s;
pub mod target;

pub use compiler::{KubeBackend, KubeResourceGraph};
pub use target::{KubeRoleScope, KubeTarget};
