//! Workload intent: what should run and when
//!
//! `WorkloadManifest` is the declarative shape read from version-controlled
//! config. `WorkloadIntent` is the validated, immutable value built from it
//! once per provisioning run; every backend reads the same intent.

use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::schedule::ScheduleSpec;
use crate::secret::SecretLocator;
use crate::{Error, Result};

/// Smallest CPU reservation accepted for any backend (ECS units, 1024 = 1 vCPU)
pub const MIN_CPU_UNITS: u32 = 128;

/// Smallest memory reservation accepted for any backend (MiB)
pub const MIN_MEMORY_MIB: u32 = 64;

/// Longest workload name; keeps derived names (`<name>-execution`) within
/// Kubernetes and IAM limits
pub const MAX_NAME_LEN: usize = 48;

/// Scratch mount used when a workload names none
pub const DEFAULT_SCRATCH_PATH: &str = "/tmp";

// =============================================================================
// Declarative input
// =============================================================================

/// Schedule as written in the manifest
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(untagged)]
pub enum ScheduleInput {
    /// `15m`, `every 15 minutes`, `cron: */15 * * * *`, or a bare cron expression
    Text(String),
    /// `{cron: "*/15 * * * *"}`
    Cron {
        /// Five- or six-field cron expression
        cron: String,
    },
    /// `{interval: "15m"}`
    Interval {
        /// Interval such as `15m` or `2h`
        interval: String,
    },
}

impl ScheduleInput {
    /// Parse into a validated schedule
    pub fn parse(&self) -> Result<ScheduleSpec> {
        match self {
            Self::Text(text) | Self::Interval { interval: text } => ScheduleSpec::parse(text),
            Self::Cron { cron } => ScheduleSpec::parse(&format!("cron: {cron}")),
        }
    }
}

/// A secret reference as written in the manifest
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecretRefSpec {
    /// Environment variable name the secret is injected as
    pub name: String,
    /// Locator: `ssm:...`, `secretsmanager:<arn>` or `k8s:<secret>/<key>`
    pub source: String,
}

/// Declarative workload description
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadManifest {
    /// Workload name, a DNS label; every emitted resource is derived from it
    pub name: String,

    /// Container image URI
    pub image: String,

    /// Arguments passed to the image entrypoint
    #[serde(default)]
    pub command: Vec<String>,

    /// CPU units (1024 = 1 vCPU)
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    /// Memory in MiB
    #[serde(default = "default_memory")]
    pub memory: u32,

    /// Task instances launched per scheduled invocation
    #[serde(default = "default_one")]
    pub task_count: u32,

    /// When the workload runs
    pub schedule: ScheduleInput,

    /// Plain environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// Secrets injected as environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secret_refs: Vec<SecretRefSpec>,

    /// Days container logs are retained
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: u32,

    /// Writable directory mounted into the otherwise read-only container
    #[serde(default = "default_scratch_path")]
    pub scratch_path: String,
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    512
}

fn default_one() -> u32 {
    1
}

fn default_log_retention_days() -> u32 {
    14
}

fn default_scratch_path() -> String {
    DEFAULT_SCRATCH_PATH.to_string()
}

// =============================================================================
// Validated intent
// =============================================================================

/// A secret reference with a parsed locator
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretRef {
    /// Environment variable name
    pub name: String,
    /// Where the secret lives
    pub locator: SecretLocator,
}

/// Validated, immutable workload intent
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadIntent {
    name: String,
    image: String,
    command: Vec<String>,
    cpu: u32,
    memory: u32,
    task_count: u32,
    schedule: ScheduleSpec,
    env: BTreeMap<String, String>,
    secret_refs: Vec<SecretRef>,
    log_retention_days: u32,
    scratch_path: String,
}

impl WorkloadIntent {
    /// Validate a manifest into an intent.
    ///
    /// Field paths in errors are relative to the `workload` section.
    pub fn from_manifest(manifest: &WorkloadManifest) -> Result<Self> {
        validate_name(&manifest.name)?;

        if manifest.image.trim().is_empty() {
            return Err(Error::validation("workload.image", "must not be empty"));
        }
        if manifest.command.is_empty() {
            return Err(Error::validation(
                "workload.command",
                "must contain at least one argument",
            ));
        }
        if manifest.cpu < MIN_CPU_UNITS {
            return Err(Error::validation(
                "workload.cpu",
                format!("{} is below the minimum of {MIN_CPU_UNITS} units", manifest.cpu),
            ));
        }
        if manifest.memory < MIN_MEMORY_MIB {
            return Err(Error::validation(
                "workload.memory",
                format!(
                    "{} MiB is below the minimum of {MIN_MEMORY_MIB} MiB",
                    manifest.memory
                ),
            ));
        }
        if manifest.task_count < 1 {
            return Err(Error::validation("workload.taskCount", "must be at least 1"));
        }
        if manifest.log_retention_days < 1 {
            return Err(Error::validation(
                "workload.logRetentionDays",
                "must be at least 1",
            ));
        }

        validate_scratch_path(&manifest.scratch_path)?;

        for key in manifest.env.keys() {
            validate_env_name(&format!("workload.env.{key}"), key)?;
        }

        let mut seen = BTreeSet::new();
        let mut secret_refs = Vec::with_capacity(manifest.secret_refs.len());
        for (idx, spec) in manifest.secret_refs.iter().enumerate() {
            validate_env_name(&format!("workload.secretRefs[{idx}].name"), &spec.name)?;
            if manifest.env.contains_key(&spec.name) {
                return Err(Error::secret_conflict(&spec.name));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(Error::validation(
                    format!("workload.secretRefs[{idx}].name"),
                    format!("secret '{}' is referenced more than once", spec.name),
                ));
            }
            let locator =
                SecretLocator::parse(&format!("workload.secretRefs[{idx}].source"), &spec.source)?;
            secret_refs.push(SecretRef {
                name: spec.name.clone(),
                locator,
            });
        }

        let schedule = manifest.schedule.parse()?;

        Ok(Self {
            name: manifest.name.clone(),
            image: manifest.image.trim().to_string(),
            command: manifest.command.clone(),
            cpu: manifest.cpu,
            memory: manifest.memory,
            task_count: manifest.task_count,
            schedule,
            env: manifest.env.clone(),
            secret_refs,
            log_retention_days: manifest.log_retention_days,
            scratch_path: manifest.scratch_path.clone(),
        })
    }

    /// Workload name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Container image URI
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Arguments passed to the image entrypoint
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// CPU units (1024 = 1 vCPU)
    pub fn cpu(&self) -> u32 {
        self.cpu
    }

    /// Memory in MiB
    pub fn memory(&self) -> u32 {
        self.memory
    }

    /// Upper bound on task instances per invocation
    pub fn task_count(&self) -> u32 {
        self.task_count
    }

    /// When the workload runs
    pub fn schedule(&self) -> &ScheduleSpec {
        &self.schedule
    }

    /// Plain environment variables supplied by the user
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Secret references in declaration order
    pub fn secret_refs(&self) -> &[SecretRef] {
        &self.secret_refs
    }

    /// Days container logs are retained
    pub fn log_retention_days(&self) -> u32 {
        self.log_retention_days
    }

    /// Absolute container path backed by writable scratch storage
    pub fn scratch_path(&self) -> &str {
        &self.scratch_path
    }
}

/// True if `s` is a DNS label: `[a-z0-9]([-a-z0-9]*[a-z0-9])?`, at most 63 chars
pub fn is_dns_label(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 63
        && !s.starts_with('-')
        && !s.ends_with('-')
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn validate_scratch_path(path: &str) -> Result<()> {
    let field = "workload.scratchPath";
    if !path.starts_with('/') {
        return Err(Error::validation(field, "must be an absolute path"));
    }
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(Error::validation(field, "must not be the root directory"));
    }
    if segments.iter().any(|s| *s == "." || *s == "..") {
        return Err(Error::validation(field, "must not contain '.' or '..' segments"));
    }
    Ok(())
}

fn validate_name(name: &str) -> Result<()> {
    let field = "workload.name";
    if name.is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::validation(
            field,
            format!("must be at most {MAX_NAME_LEN} characters"),
        ));
    }
    if !is_dns_label(name) {
        return Err(Error::validation(
            field,
            format!("'{name}' is not a valid DNS label"),
        ));
    }
    Ok(())
}

/// POSIX-style variable name: `[A-Za-z_][A-Za-z0-9_]*`
fn validate_env_name(field: &str, name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if !valid {
        return Err(Error::validation(
            field,
            format!("'{name}' is not a valid environment variable name"),
        ));
    }
    Ok(())
}
