//! Backend selection
//!
//! The target is chosen once from configuration; everything downstream
//! dispatches through [`Target`] and [`ResourceGraph`] rather than
//! branching on the backend in shared code.

use std::fmt;
use std::str::FromStr;

use cadence_aws::{AwsBackend, AwsResourceGraph};
use cadence_common::{Backend, BackendKind, EnvDefaults, Error, RoleSet, WorkloadIntent};
use cadence_kube::{KubeBackend, KubeResourceGraph};

use crate::document::Targets;
use crate::error::ProvisionError;

/// A configured backend
#[derive(Clone, Debug)]
pub enum Target {
    /// Kubernetes CronJob
    Kubernetes(KubeBackend),
    /// AWS Fargate + EventBridge
    Aws(AwsBackend),
}

impl Target {
    /// Select `kind` from the document's targets
    pub fn select(targets: &Targets, kind: BackendKind) -> cadence_common::Result<Self> {
        let missing = || {
            Error::validation(
                format!("targets.{kind}"),
                format!("no settings for the {kind} backend"),
            )
        };
        match kind {
            BackendKind::Kubernetes => targets
                .kubernetes
                .clone()
                .map(|t| Self::Kubernetes(KubeBackend::new(t)))
                .ok_or_else(missing),
            BackendKind::Aws => targets
                .aws
                .clone()
                .map(|t| Self::Aws(AwsBackend::new(t)))
                .ok_or_else(missing),
        }
    }

    /// Which backend this is
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Kubernetes(b) => b.kind(),
            Self::Aws(b) => b.kind(),
        }
    }

    /// Compile `intent` for this backend
    pub fn compile(
        &self,
        intent: &WorkloadIntent,
        defaults: &EnvDefaults,
    ) -> cadence_common::Result<ResourceGraph> {
        match self {
            Self::Kubernetes(b) => b.compile(intent, defaults).map(ResourceGraph::Kubernetes),
            Self::Aws(b) => b.compile(intent, defaults).map(ResourceGraph::Aws),
        }
    }
}

/// Rendered output encoding
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// YAML; multi-document for Kubernetes
    #[default]
    Yaml,
    /// JSON; a list of objects for Kubernetes
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yaml => write!(f, "yaml"),
            Self::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> cadence_common::Result<Self> {
        match s.to_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            other => Err(Error::validation(
                "format",
                format!("unknown output format '{other}', expected yaml or json"),
            )),
        }
    }
}

/// A compiled resource graph for one backend
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceGraph {
    /// Kubernetes objects
    Kubernetes(KubeResourceGraph),
    /// CloudFormation template
    Aws(AwsResourceGraph),
}

impl ResourceGraph {
    /// Backend the graph is for
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Kubernetes(_) => BackendKind::Kubernetes,
            Self::Aws(_) => BackendKind::Aws,
        }
    }

    /// Roles the graph was built with
    pub fn roles(&self) -> &RoleSet {
        match self {
            Self::Kubernetes(g) => &g.roles,
            Self::Aws(g) => &g.roles,
        }
    }

    /// Backend-native schedule string
    pub fn schedule(&self) -> Option<&str> {
        match self {
            Self::Kubernetes(g) => Some(g.cron_job.spec.schedule.as_str()),
            Self::Aws(g) => g.rule().map(|r| r.schedule_expression.as_str()),
        }
    }

    /// Number of emitted objects
    pub fn len(&self) -> usize {
        match self {
            Self::Kubernetes(g) => g.objects().len(),
            Self::Aws(g) => g.template.resources.len(),
        }
    }

    /// True if nothing was emitted
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize in `format`; output is byte-identical for identical input
    pub fn render(&self, format: OutputFormat) -> Result<String, ProvisionError> {
        Ok(match (self, format) {
            (Self::Kubernetes(g), OutputFormat::Yaml) => g.to_yaml()?,
            (Self::Kubernetes(g), OutputFormat::Json) => {
                serde_json::to_string_pretty(&g.objects())?
            }
            (Self::Aws(g), OutputFormat::Yaml) => g.to_yaml()?,
            (Self::Aws(g), OutputFormat::Json) => g.to_json()?,
        })
    }
}
