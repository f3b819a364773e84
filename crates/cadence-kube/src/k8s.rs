//! Kubernetes resource types emitted for a scheduled workload

use std::collections::BTreeMap;

use cadence_common::ObjectMeta;
use serde::{Deserialize, Serialize};

// =============================================================================
// Namespace, ServiceAccount, ConfigMap
// =============================================================================

/// Kubernetes Namespace
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
}

impl Namespace {
    /// Create a Namespace enforcing the `restricted` pod security standard
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "Namespace".to_string(),
            metadata: ObjectMeta::cluster_scoped(name)
                .with_label("pod-security.kubernetes.io/enforce", "restricted"),
        }
    }
}

/// Kubernetes ServiceAccount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Whether to automount the service account token into pods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automount_service_account_token: Option<bool>,
}

impl ServiceAccount {
    /// Create a ServiceAccount whose token is never mounted
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ServiceAccount".to_string(),
            metadata: ObjectMeta::new(name, namespace),
            automount_service_account_token: Some(false),
        }
    }
}

/// Kubernetes ConfigMap for non-sensitive configuration
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMap {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// String data
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Create a new ConfigMap
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata: ObjectMeta::new(name, namespace),
            data: BTreeMap::new(),
        }
    }

    /// Replace the data
    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data = data;
        self
    }
}

// =============================================================================
// RBAC
// =============================================================================

/// Namespaced RBAC Role
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Permission rules
    pub rules: Vec<PolicyRule>,
}

impl Role {
    /// Create a Role with the given rules
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, rules: Vec<PolicyRule>) -> Self {
        Self {
            api_version: "rbac.authorization.k8s.io/v1".to_string(),
            kind: "Role".to_string(),
            metadata: ObjectMeta::new(name, namespace),
            rules,
        }
    }
}

/// One RBAC rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// API groups (`""` is core)
    pub api_groups: Vec<String>,
    /// Resource kinds
    pub resources: Vec<String>,
    /// Specific object names; never empty for emitted rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_names: Vec<String>,
    /// Allowed verbs
    pub verbs: Vec<String>,
}

/// Binds a Role to subjects
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleBinding {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Role being granted
    pub role_ref: RoleRef,
    /// Who receives the role
    pub subjects: Vec<Subject>,
}

impl RoleBinding {
    /// Bind Role `role` to ServiceAccount `service_account` in `namespace`
    pub fn for_service_account(
        name: impl Into<String>,
        namespace: impl Into<String>,
        role: impl Into<String>,
        service_account: impl Into<String>,
    ) -> Self {
        let namespace = namespace.into();
        Self {
            api_version: "rbac.authorization.k8s.io/v1".to_string(),
            kind: "RoleBinding".to_string(),
            metadata: ObjectMeta::new(name, namespace.clone()),
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "Role".to_string(),
                name: role.into(),
            },
            subjects: vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: service_account.into(),
                namespace: Some(namespace),
            }],
        }
    }
}

/// Reference to a Role
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    /// API group of the role
    pub api_group: String,
    /// Role or ClusterRole
    pub kind: String,
    /// Role name
    pub name: String,
}

/// RBAC subject
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// Subject kind
    pub kind: String,
    /// Subject name
    pub name: String,
    /// Subject namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

// =============================================================================
// NetworkPolicy
// =============================================================================

/// Kubernetes NetworkPolicy
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicy {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: NetworkPolicySpec,
}

impl NetworkPolicy {
    /// Deny all ingress to pods matching `selector` while allowing egress
    pub fn deny_ingress(
        name: impl Into<String>,
        namespace: impl Into<String>,
        selector: BTreeMap<String, String>,
    ) -> Self {
        Self {
            api_version: "networking.k8s.io/v1".to_string(),
            kind: "NetworkPolicy".to_string(),
            metadata: ObjectMeta::new(name, namespace),
            spec: NetworkPolicySpec {
                pod_selector: LabelSelector {
                    match_labels: selector,
                },
                policy_types: vec!["Ingress".to_string(), "Egress".to_string()],
                egress: vec![NetworkPolicyEgressRule::default()],
            },
        }
    }
}

/// NetworkPolicy spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPolicySpec {
    /// Pods the policy applies to
    pub pod_selector: LabelSelector,
    /// Directions the policy governs
    pub policy_types: Vec<String>,
    /// Allowed egress; a single empty rule allows all
    #[serde(default)]
    pub egress: Vec<NetworkPolicyEgressRule>,
}

/// Egress rule; empty means any destination
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkPolicyEgressRule {}

/// Label selector
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Labels that must match
    #[serde(default)]
    pub match_labels: BTreeMap<String, String>,
}

// =============================================================================
// CronJob
// =============================================================================

/// `batch/v1` CronJob
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronJob {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: CronJobSpec,
}

/// CronJob spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CronJobSpec {
    /// Five-field cron schedule
    pub schedule: String,
    /// IANA zone the schedule is evaluated in
    pub time_zone: String,
    /// Allow, Forbid or Replace
    pub concurrency_policy: String,
    /// Completed jobs to keep
    pub successful_jobs_history_limit: u32,
    /// Failed jobs to keep
    pub failed_jobs_history_limit: u32,
    /// Job created on each tick
    pub job_template: JobTemplateSpec,
}

/// Template for the Job created on each tick
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct JobTemplateSpec {
    /// Job spec
    pub spec: JobSpec,
}

/// Job spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Pods running at once
    pub parallelism: u32,
    /// Successful pods required
    pub completions: u32,
    /// Retries before the Job is failed
    pub backoff_limit: u32,
    /// Seconds a finished Job (and its pod logs) is kept
    pub ttl_seconds_after_finished: i32,
    /// Pod template
    pub template: PodTemplateSpec,
}

/// Pod template
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PodTemplateSpec {
    /// Pod metadata
    pub metadata: PodTemplateMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Pod template metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PodTemplateMeta {
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// ServiceAccount the pod runs as
    pub service_account_name: String,
    /// Whether the token is mounted
    pub automount_service_account_token: bool,
    /// Never, OnFailure or Always
    pub restart_policy: String,
    /// Pod-level security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<PodSecurityContext>,
    /// Containers
    pub containers: Vec<Container>,
    /// Volumes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<Volume>,
}

/// Volume
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name
    pub name: String,
    /// EmptyDir source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub empty_dir: Option<EmptyDirVolumeSource>,
}

impl Volume {
    /// Create a Volume backed by an emptyDir on node storage.
    pub fn from_empty_dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
        }
    }
}

/// EmptyDir volume source
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmptyDirVolumeSource {
    /// Storage medium ("Memory" for tmpfs, empty for default)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medium: Option<String>,
    /// Size limit for the emptyDir (e.g., "1Gi")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_limit: Option<String>,
}

/// Volume mount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Mount path
    pub mount_path: String,
    /// Read only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

impl VolumeMount {
    /// Mount `name` read-write at `mount_path`
    pub fn writable(name: impl Into<String>, mount_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mount_path: mount_path.into(),
            read_only: Some(false),
        }
    }
}

// =============================================================================
// Container
// =============================================================================

/// Container spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// Args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Environment from ConfigMap references
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_from: Vec<EnvFromSource>,
    /// Resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Security context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_context: Option<SecurityContext>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Environment variable -- either a literal value or a reference to a secret key
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Literal value (mutually exclusive with `value_from`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Reference to a secret key (mutually exclusive with `value`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<EnvVarSource>,
}

impl EnvVar {
    /// Create an env var that references a secret key
    pub fn from_secret(
        name: impl Into<String>,
        secret_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: SecretKeySelector {
                    name: secret_name.into(),
                    key: key.into(),
                },
            }),
        }
    }
}

/// Source for an environment variable value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarSource {
    /// Reference to a specific key in a Secret
    pub secret_key_ref: SecretKeySelector,
}

/// Selector for a key within a Secret
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SecretKeySelector {
    /// Name of the Secret
    pub name: String,
    /// Key within the Secret
    pub key: String,
}

/// ConfigMap loaded wholesale into the environment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnvFromSource {
    /// ConfigMap reference
    pub config_map_ref: ConfigMapEnvSource,
}

/// Reference to a ConfigMap for env vars
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConfigMapEnvSource {
    /// ConfigMap name
    pub name: String,
}

/// Resource requirements
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    /// Requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requests: Option<ResourceQuantity>,
    /// Limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<ResourceQuantity>,
}

/// Resource quantity
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceQuantity {
    /// CPU, e.g. `250m`
    pub cpu: String,
    /// Memory, e.g. `512Mi`
    pub memory: String,
}

// =============================================================================
// Security context
// =============================================================================

/// Container security context
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityContext {
    /// Require the container to run as a non-root user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    /// Allow privilege escalation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_privilege_escalation: Option<bool>,
    /// Mount root filesystem as read-only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only_root_filesystem: Option<bool>,
    /// Capabilities to add/drop
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,
    /// Seccomp profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seccomp_profile: Option<SeccompProfile>,
}

impl SecurityContext {
    /// Settings satisfying the `restricted` pod security standard
    pub fn restricted() -> Self {
        Self {
            run_as_non_root: Some(true),
            allow_privilege_escalation: Some(false),
            read_only_root_filesystem: Some(true),
            capabilities: Some(Capabilities {
                drop: vec!["ALL".to_string()],
            }),
            seccomp_profile: Some(SeccompProfile::runtime_default()),
        }
    }
}

/// Pod-level security context
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSecurityContext {
    /// Require all containers to run as non-root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_as_non_root: Option<bool>,
    /// Pod-level seccomp profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seccomp_profile: Option<SeccompProfile>,
}

/// Linux capabilities to drop
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Capabilities {
    /// Capabilities to drop
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub drop: Vec<String>,
}

/// Seccomp profile
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SeccompProfile {
    /// Profile type: RuntimeDefault, Unconfined, or Localhost
    #[serde(rename = "type")]
    pub type_: String,
}

impl SeccompProfile {
    /// The container runtime's default profile
    pub fn runtime_default() -> Self {
        Self {
            type_: "RuntimeDefault".to_string(),
        }
    }
}
