//! Backend capability trait
//!
//! A backend turns one validated [`WorkloadIntent`] into its own resource
//! graph. The pipeline (resolve, synthesize roles, translate schedule, emit)
//! is the same everywhere and lives in [`Backend::compile`]; backends only
//! supply the pieces that differ.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::env::{resolve, EnvDefaults, ResolvedEnvironment};
use crate::iam::RoleSet;
use crate::intent::WorkloadIntent;
use crate::{Error, Result};

/// Supported execution backends
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Kubernetes CronJob
    Kubernetes,
    /// AWS ECS Fargate task triggered by an EventBridge rule
    Aws,
}

impl BackendKind {
    /// All backends, in a stable order
    pub const ALL: [BackendKind; 2] = [BackendKind::Kubernetes, BackendKind::Aws];
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Kubernetes => write!(f, "kubernetes"),
            Self::Aws => write!(f, "aws"),
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "kubernetes" | "k8s" => Ok(Self::Kubernetes),
            "aws" | "ecs" => Ok(Self::Aws),
            other => Err(Error::validation(
                "target",
                format!("unknown backend '{other}', expected kubernetes or aws"),
            )),
        }
    }
}

/// Everything a backend needs to emit its graph
#[derive(Clone, Copy, Debug)]
pub struct EmitInput<'a> {
    /// The validated intent
    pub intent: &'a WorkloadIntent,
    /// Resolved environment
    pub env: &'a ResolvedEnvironment,
    /// Synthesized roles
    pub roles: &'a RoleSet,
    /// Schedule already in the backend's native syntax
    pub schedule: &'a str,
}

/// One execution backend
pub trait Backend {
    /// Resource graph this backend emits
    type Graph;

    /// Which backend this is
    fn kind(&self) -> BackendKind;

    /// Reject intents the backend cannot honor (sizing limits, missing
    /// target settings). Defaults to accepting everything.
    fn check_intent(&self, _intent: &WorkloadIntent) -> Result<()> {
        Ok(())
    }

    /// Derive the ExecutionAgent and TriggerAgent roles
    fn synthesize_roles(&self, intent: &WorkloadIntent, env: &ResolvedEnvironment)
        -> Result<RoleSet>;

    /// Build the resource graph
    fn emit(&self, input: &EmitInput<'_>) -> Result<Self::Graph>;

    /// Run the full pipeline for one intent.
    ///
    /// Pure: no backend APIs are called. The first failing stage aborts and
    /// nothing partial is returned.
    fn compile(&self, intent: &WorkloadIntent, defaults: &EnvDefaults) -> Result<Self::Graph> {
        let kind = self.kind();
        debug!(backend = %kind, workload = intent.name(), "checking intent");
        self.check_intent(intent)?;

        let env = resolve(defaults, intent.env(), intent.secret_refs())?;
        let roles = self.synthesize_roles(intent, &env)?;
        let schedule = intent.schedule().translate(kind)?;
        debug!(backend = %kind, schedule = %schedule, "translated schedule");

        let graph = self.emit(&EmitInput {
            intent,
            env: &env,
            roles: &roles,
            schedule: &schedule,
        })?;
        info!(
            backend = %kind,
            workload = intent.name(),
            secrets = env.secret_bindings().len(),
            "compiled workload"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_round_trips_through_text() {
        for kind in BackendKind::ALL {
            assert_eq!(kind.to_string().parse::<BackendKind>().unwrap(), kind);
        }
        assert_eq!("K8S".parse::<BackendKind>().unwrap(), BackendKind::Kubernetes);
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = "nomad".parse::<BackendKind>().unwrap_err();
        assert!(err.to_string().contains("nomad"));
    }
}
