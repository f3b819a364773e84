//! CloudFormation template types
//!
//! Only the resource types and properties Cadence emits. Maps are
//! `BTreeMap` so templates serialize byte-identically across runs.

use std::collections::BTreeMap;

use serde::Serialize;

/// Template format version every emitted template declares
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// IAM policy language version
pub const POLICY_VERSION: &str = "2012-10-17";

// =============================================================================
// Template
// =============================================================================

/// A CloudFormation template
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Template {
    /// Format version
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub aws_template_format_version: String,
    /// Human-readable description
    pub description: String,
    /// Resources keyed by logical id
    pub resources: BTreeMap<String, Resource>,
}

impl Template {
    /// Empty template
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            aws_template_format_version: TEMPLATE_FORMAT_VERSION.to_string(),
            description: description.into(),
            resources: BTreeMap::new(),
        }
    }

    /// Add a resource under `logical_id`
    pub fn insert(&mut self, logical_id: impl Into<String>, resource: Resource) {
        self.resources.insert(logical_id.into(), resource);
    }
}

/// One template resource
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Resource {
    /// Type and properties
    #[serde(flatten)]
    pub kind: ResourceKind,
    /// Logical ids that must exist first
    #[serde(rename = "DependsOn", skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Resource {
    /// Resource with no dependencies
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            depends_on: Vec::new(),
        }
    }

    /// Declare dependencies
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = ids.into_iter().map(Into::into).collect();
        self
    }
}

/// Resource types Cadence emits
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "Type", content = "Properties")]
pub enum ResourceKind {
    /// `AWS::ECR::Repository`
    #[serde(rename = "AWS::ECR::Repository")]
    Repository(RepositoryProperties),
    /// `AWS::Logs::LogGroup`
    #[serde(rename = "AWS::Logs::LogGroup")]
    LogGroup(LogGroupProperties),
    /// `AWS::ECS::Cluster`
    #[serde(rename = "AWS::ECS::Cluster")]
    Cluster(ClusterProperties),
    /// `AWS::IAM::Role`
    #[serde(rename = "AWS::IAM::Role")]
    Role(RoleProperties),
    /// `AWS::ECS::TaskDefinition`
    #[serde(rename = "AWS::ECS::TaskDefinition")]
    TaskDefinition(Box<TaskDefinitionProperties>),
    /// `AWS::Events::Rule`
    #[serde(rename = "AWS::Events::Rule")]
    Rule(Box<RuleProperties>),
}

impl ResourceKind {
    /// CloudFormation type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Repository(_) => "AWS::ECR::Repository",
            Self::LogGroup(_) => "AWS::Logs::LogGroup",
            Self::Cluster(_) => "AWS::ECS::Cluster",
            Self::Role(_) => "AWS::IAM::Role",
            Self::TaskDefinition(_) => "AWS::ECS::TaskDefinition",
            Self::Rule(_) => "AWS::Events::Rule",
        }
    }
}

// =============================================================================
// ECR, Logs, ECS cluster
// =============================================================================

/// ECR repository
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RepositoryProperties {
    /// Repository name
    pub repository_name: String,
    /// MUTABLE or IMMUTABLE
    pub image_tag_mutability: String,
    /// Scan settings
    pub image_scanning_configuration: ImageScanningConfiguration,
}

/// ECR scan settings
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageScanningConfiguration {
    /// Scan every pushed image
    pub scan_on_push: bool,
}

/// CloudWatch log group
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LogGroupProperties {
    /// Log group name
    pub log_group_name: String,
    /// Days events are kept
    pub retention_in_days: u32,
}

/// ECS cluster
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ClusterProperties {
    /// Cluster name
    pub cluster_name: String,
}

// =============================================================================
// IAM
// =============================================================================

/// IAM role
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RoleProperties {
    /// Role name
    pub role_name: String,
    /// Who may assume the role
    pub assume_role_policy_document: PolicyDocument,
    /// AWS-managed policies attached to the role
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub managed_policy_arns: Vec<String>,
    /// Inline policies
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<InlinePolicy>,
}

/// Inline role policy
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct InlinePolicy {
    /// Policy name
    pub policy_name: String,
    /// Policy body
    pub policy_document: PolicyDocument,
}

/// IAM policy document
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    /// Policy language version
    pub version: String,
    /// Statements
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    /// Document with the given statements
    pub fn new(statement: Vec<Statement>) -> Self {
        Self {
            version: POLICY_VERSION.to_string(),
            statement,
        }
    }

    /// Trust policy letting `service` assume the role
    pub fn trust(service: impl Into<String>) -> Self {
        Self::new(vec![Statement {
            effect: "Allow".to_string(),
            principal: Some(Principal {
                service: vec![service.into()],
            }),
            action: vec!["sts:AssumeRole".to_string()],
            resource: Vec::new(),
            condition: BTreeMap::new(),
        }])
    }
}

/// One policy statement
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Allow or Deny
    pub effect: String,
    /// Principal, for trust policies
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Principal>,
    /// Actions
    pub action: Vec<String>,
    /// Resources; never `*`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resource: Vec<String>,
    /// Operator -> key -> value
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub condition: BTreeMap<String, BTreeMap<String, String>>,
}

/// Service principal
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Principal {
    /// Service principals
    pub service: Vec<String>,
}

// =============================================================================
// ECS task definition
// =============================================================================

/// Fargate task definition
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TaskDefinitionProperties {
    /// Family; revisions share it
    pub family: String,
    /// CPU units as a string
    pub cpu: String,
    /// Memory in MiB as a string
    pub memory: String,
    /// Always `awsvpc` on Fargate
    pub network_mode: String,
    /// Launch types
    pub requires_compatibilities: Vec<String>,
    /// Role ECS uses to pull the image, write logs and read secrets
    pub execution_role_arn: String,
    /// Role the application code runs as
    pub task_role_arn: String,
    /// Containers
    pub container_definitions: Vec<ContainerDefinition>,
    /// Task volumes
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<TaskVolume>,
}

/// Task volume; with no host or EFS source Fargate backs it with the
/// task's ephemeral storage
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TaskVolume {
    /// Volume name referenced by mount points
    pub name: String,
}

/// Where a task volume appears inside a container
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct MountPoint {
    /// Task volume name
    pub source_volume: String,
    /// Absolute path in the container
    pub container_path: String,
    /// Mount read-only
    pub read_only: bool,
}

/// One container of a task definition
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDefinition {
    /// Container name
    pub name: String,
    /// Image URI
    pub image: String,
    /// Task stops when this container stops
    pub essential: bool,
    /// Arguments
    pub command: Vec<String>,
    /// Plain environment
    pub environment: Vec<KeyValuePair>,
    /// Secrets resolved by ECS at launch
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretEntry>,
    /// Log routing
    pub log_configuration: LogConfiguration,
    /// Read-only root filesystem
    pub readonly_root_filesystem: bool,
    /// Writable mounts over the read-only root
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub mount_points: Vec<MountPoint>,
}

/// `{Name, Value}` pair
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct KeyValuePair {
    /// Variable name
    pub name: String,
    /// Value
    pub value: String,
}

/// `{Name, ValueFrom}` secret reference
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct SecretEntry {
    /// Variable name
    pub name: String,
    /// Parameter or secret ARN
    pub value_from: String,
}

/// Container log settings
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct LogConfiguration {
    /// Log driver
    pub log_driver: String,
    /// Driver options
    pub options: BTreeMap<String, String>,
}

// =============================================================================
// EventBridge
// =============================================================================

/// Scheduled EventBridge rule
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RuleProperties {
    /// Rule name
    pub name: String,
    /// `rate(...)` or `cron(...)`
    pub schedule_expression: String,
    /// ENABLED or DISABLED
    pub state: String,
    /// What fires
    pub targets: Vec<RuleTarget>,
}

/// Rule target
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RuleTarget {
    /// Target id, unique within the rule
    pub id: String,
    /// Cluster ARN
    pub arn: String,
    /// Role EventBridge assumes to launch the task
    pub role_arn: String,
    /// Task launch parameters
    pub ecs_parameters: EcsParameters,
}

/// ECS launch parameters of a rule target
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EcsParameters {
    /// Task definition to run
    pub task_definition_arn: String,
    /// Tasks launched per invocation
    pub task_count: u32,
    /// Always FARGATE
    pub launch_type: String,
    /// Required network settings
    pub network_configuration: NetworkConfiguration,
}

/// Network settings
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkConfiguration {
    /// awsvpc settings
    pub aws_vpc_configuration: AwsVpcConfiguration,
}

/// awsvpc settings
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct AwsVpcConfiguration {
    /// Subnet ids
    pub subnets: Vec<String>,
    /// Security group ids
    pub security_groups: Vec<String>,
    /// ENABLED or DISABLED
    pub assign_public_ip: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_serializes_type_properties_and_depends_on() {
        let resource = Resource::new(ResourceKind::LogGroup(LogGroupProperties {
            log_group_name: "/cadence/app".to_string(),
            retention_in_days: 14,
        }))
        .depends_on(["Cluster"]);
        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["Type"], "AWS::Logs::LogGroup");
        assert_eq!(json["Properties"]["LogGroupName"], "/cadence/app");
        assert_eq!(json["Properties"]["RetentionInDays"], 14);
        assert_eq!(json["DependsOn"], serde_json::json!(["Cluster"]));
    }

    #[test]
    fn template_header_is_pascal_case() {
        let json = serde_json::to_value(Template::new("x")).unwrap();
        assert_eq!(json["AWSTemplateFormatVersion"], TEMPLATE_FORMAT_VERSION);
        assert!(json["Resources"].as_object().unwrap().is_empty());
    }

    #[test]
    fn trust_policy_names_service_principal() {
        let doc = PolicyDocument::trust("events.amazonaws.com");
        let json = serde_json::to_value(&doc).unwrap();
        let statement = &json["Statement"][0];
        assert_eq!(statement["Principal"]["Service"][0], "events.amazonaws.com");
        assert_eq!(statement["Action"][0], "sts:AssumeRole");
        assert!(statement.get("Resource").is_none());
    }
}
