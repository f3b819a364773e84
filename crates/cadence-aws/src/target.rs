//! AWS target settings, ARNs and role vocabulary

use std::collections::BTreeSet;

use cadence_common::{
    BackendKind, Error, Grant, Identity, Result, RoleScope, SecretBinding, SecretLocator,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Partitions whose service principals are known
pub const KNOWN_PARTITIONS: [&str; 2] = ["aws", "aws-us-gov"];

/// Managed policy granting image pull and log writes to the execution role
pub const TASK_EXECUTION_MANAGED_POLICY: &str = "service-role/AmazonECSTaskExecutionRolePolicy";

fn default_partition() -> String {
    "aws".to_string()
}

/// `targets.aws` section of a provisioning document
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AwsTarget {
    /// 12-digit account id
    pub account_id: String,

    /// Region, e.g. `us-east-1`
    pub region: String,

    /// `aws` or `aws-us-gov`
    #[serde(default = "default_partition")]
    pub partition: String,

    /// ECS cluster name; defaults to the workload name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    /// Subnets the task is placed in; required
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Security groups attached to the task; required
    #[serde(default)]
    pub security_groups: Vec<String>,

    /// Whether the task gets a public IP; required, never defaulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_public_ip: Option<bool>,

    /// Emit an ECR repository for the image
    #[serde(default)]
    pub create_repository: bool,
}

impl AwsTarget {
    /// Cluster to run in
    pub fn cluster_for<'a>(&'a self, workload: &'a str) -> &'a str {
        self.cluster_name.as_deref().unwrap_or(workload)
    }

    /// Check required settings; networking is never defaulted
    pub fn validate(&self) -> Result<()> {
        if self.account_id.len() != 12 || !self.account_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::validation(
                "targets.aws.accountId",
                format!("'{}' is not a 12-digit account id", self.account_id),
            ));
        }
        let region_ok = !self.region.is_empty()
            && self
                .region
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !region_ok {
            return Err(Error::validation(
                "targets.aws.region",
                format!("'{}' is not a region name", self.region),
            ));
        }
        if let Some(cluster) = &self.cluster_name {
            if cluster.is_empty() {
                return Err(Error::validation(
                    "targets.aws.clusterName",
                    "must not be empty",
                ));
            }
        }
        validate_ids("targets.aws.subnets", &self.subnets, "subnet-")?;
        validate_ids("targets.aws.securityGroups", &self.security_groups, "sg-")?;
        if self.assign_public_ip.is_none() {
            return Err(Error::validation(
                "targets.aws.assignPublicIp",
                "must be set explicitly",
            ));
        }
        Ok(())
    }
}

fn validate_ids(field: &str, ids: &[String], prefix: &str) -> Result<()> {
    if ids.is_empty() {
        return Err(Error::validation(field, "at least one entry is required"));
    }
    if let Some(bad) = ids.iter().find(|id| !id.starts_with(prefix)) {
        return Err(Error::validation(
            field,
            format!("'{bad}' does not look like a {prefix}* id"),
        ));
    }
    Ok(())
}

// =============================================================================
// Names and ARNs
// =============================================================================

/// Physical names and ARNs derived from the workload and target
#[derive(Clone, Debug)]
pub struct AwsRoleScope {
    partition: String,
    region: String,
    account_id: String,
    workload: String,
    cluster: String,
}

impl AwsRoleScope {
    /// Scope for `workload` emitted under `target`
    pub fn new(workload: &str, target: &AwsTarget) -> Self {
        Self {
            partition: target.partition.clone(),
            region: target.region.clone(),
            account_id: target.account_id.clone(),
            workload: workload.to_string(),
            cluster: target.cluster_for(workload).to_string(),
        }
    }

    /// ECS cluster name
    pub fn cluster_name(&self) -> &str {
        &self.cluster
    }

    fn role_name(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.workload)
    }

    /// Execution role name
    pub fn execution_role_name(&self) -> String {
        self.role_name("execution")
    }

    /// Task role name
    pub fn task_role_name(&self) -> String {
        self.role_name("task")
    }

    /// Events role name
    pub fn events_role_name(&self) -> String {
        self.role_name("events")
    }

    /// CloudWatch log group name
    pub fn log_group_name(&self) -> String {
        format!("/cadence/{}", self.workload)
    }

    /// ARN of an IAM role in this account
    pub fn role_arn(&self, role_name: &str) -> String {
        format!(
            "arn:{}:iam::{}:role/{role_name}",
            self.partition, self.account_id
        )
    }

    /// ARN of an AWS-managed policy
    pub fn managed_policy_arn(&self, policy: &str) -> String {
        format!("arn:{}:iam::aws:policy/{policy}", self.partition)
    }

    /// Task definition family ARN; EventBridge runs its latest active revision
    pub fn task_definition_arn(&self) -> String {
        format!(
            "arn:{}:ecs:{}:{}:task-definition/{}",
            self.partition, self.region, self.account_id, self.workload
        )
    }

    /// Cluster ARN
    pub fn cluster_arn(&self) -> String {
        format!(
            "arn:{}:ecs:{}:{}:cluster/{}",
            self.partition, self.region, self.account_id, self.cluster
        )
    }

    fn ssm_parameter_arn(&self, parameter: &str) -> String {
        if parameter.starts_with("arn:") {
            return parameter.to_string();
        }
        let path = parameter.strip_prefix('/').unwrap_or(parameter);
        format!(
            "arn:{}:ssm:{}:{}:parameter/{path}",
            self.partition, self.region, self.account_id
        )
    }

    /// `ValueFrom` for a container secret entry
    pub fn secret_value_from(&self, binding: &SecretBinding) -> Result<String> {
        match &binding.locator {
            SecretLocator::SsmParameter { parameter } => Ok(self.ssm_parameter_arn(parameter)),
            SecretLocator::SecretsManager { arn } => Ok(arn.clone()),
            SecretLocator::Kubernetes { .. } => Err(Error::unsupported(
                BackendKind::Aws,
                format!(
                    "secret '{}' lives in the '{}' store, which ECS cannot inject",
                    binding.name,
                    binding.locator.store()
                ),
            )),
        }
    }

    fn service_principal(&self, service: &str) -> Result<String> {
        if !KNOWN_PARTITIONS.contains(&self.partition.as_str()) {
            return Err(Error::unsupported(
                BackendKind::Aws,
                format!(
                    "no trust principal for {service} in partition '{}'",
                    self.partition
                ),
            ));
        }
        Ok(format!("{service}.amazonaws.com"))
    }
}

/// IAM resource for a Secrets Manager ARN: the secret itself, without any
/// ECS `:json-key:version-stage:version-id` suffix
fn secret_iam_resource(arn: &str) -> String {
    arn.split(':').take(7).collect::<Vec<_>>().join(":")
}

impl RoleScope for AwsRoleScope {
    fn backend(&self) -> BackendKind {
        BackendKind::Aws
    }

    fn trust_principal(&self, identity: Identity) -> Result<String> {
        match identity {
            Identity::ExecutionAgent => self.service_principal("ecs-tasks"),
            Identity::TriggerAgent => self.service_principal("events"),
        }
    }

    fn secret_read_grants(&self, bindings: &[SecretBinding]) -> Result<Vec<Grant>> {
        let mut parameters = BTreeSet::new();
        let mut secrets = BTreeSet::new();
        for binding in bindings {
            match &binding.locator {
                SecretLocator::SsmParameter { parameter } => {
                    parameters.insert(self.ssm_parameter_arn(parameter));
                }
                SecretLocator::SecretsManager { arn } => {
                    secrets.insert(secret_iam_resource(arn));
                }
                SecretLocator::Kubernetes { .. } => {
                    self.secret_value_from(binding)?;
                }
            }
        }

        let mut grants = Vec::new();
        if !parameters.is_empty() {
            grants.push(Grant::new(["ssm:GetParameters"], parameters));
        }
        if !secrets.is_empty() {
            grants.push(Grant::new(["secretsmanager:GetSecretValue"], secrets));
        }
        Ok(grants)
    }

    fn invoke_grant(&self) -> Grant {
        Grant::new(["ecs:RunTask"], [self.task_definition_arn()]).with_condition(
            "ArnEquals",
            "ecs:cluster",
            self.cluster_arn(),
        )
    }

    fn handoff_roles(&self) -> BTreeSet<String> {
        BTreeSet::from([
            self.role_arn(&self.execution_role_name()),
            self.role_arn(&self.task_role_name()),
        ])
    }

    fn pass_role_action(&self) -> Option<&'static str> {
        Some("iam:PassRole")
    }
}
