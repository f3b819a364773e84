//! AWS emitter
//!
//! Compiles a workload into a CloudFormation template. Ordering that matters
//! at apply time is declared with `DependsOn`: the log group exists before
//! the task definition that writes to it, and the rule is created last.

use std::collections::BTreeMap;

use cadence_common::backend::{Backend, EmitInput};
use cadence_common::iam::synthesize;
use cadence_common::{
    BackendKind, Grant, ResolvedEnvironment, Result, RoleSet, RoleSpec, WorkloadIntent,
    SCRATCH_VOLUME_NAME,
};
use tracing::debug;

use crate::cfn::{
    AwsVpcConfiguration, ClusterProperties, ContainerDefinition, EcsParameters,
    ImageScanningConfiguration, InlinePolicy, KeyValuePair, LogConfiguration, LogGroupProperties,
    MountPoint, NetworkConfiguration, PolicyDocument, RepositoryProperties, Resource, ResourceKind,
    RoleProperties, RuleProperties, RuleTarget, SecretEntry, Statement, TaskDefinitionProperties,
    TaskVolume, Template,
};
use crate::limits::{validate_fargate_size, validate_log_retention, validate_task_count};
use crate::target::{AwsRoleScope, AwsTarget, TASK_EXECUTION_MANAGED_POLICY};

/// Logical id of the ECR repository
pub const REPOSITORY_ID: &str = "Repository";
/// Logical id of the log group
pub const LOG_GROUP_ID: &str = "LogGroup";
/// Logical id of the ECS cluster
pub const CLUSTER_ID: &str = "Cluster";
/// Logical id of the execution role
pub const EXECUTION_ROLE_ID: &str = "ExecutionRole";
/// Logical id of the task role
pub const TASK_ROLE_ID: &str = "TaskRole";
/// Logical id of the events role
pub const EVENTS_ROLE_ID: &str = "EventsRole";
/// Logical id of the task definition
pub const TASK_DEFINITION_ID: &str = "TaskDefinition";
/// Logical id of the schedule rule
pub const RULE_ID: &str = "ScheduleRule";

/// Complete compiled output for one workload
#[derive(Clone, Debug, PartialEq)]
pub struct AwsResourceGraph {
    /// The template
    pub template: Template,
    /// Roles as synthesized
    pub roles: RoleSet,
}

impl AwsResourceGraph {
    /// The task definition
    pub fn task_definition(&self) -> Option<&TaskDefinitionProperties> {
        match self.template.resources.get(TASK_DEFINITION_ID).map(|r| &r.kind) {
            Some(ResourceKind::TaskDefinition(props)) => Some(props),
            _ => None,
        }
    }

    /// The schedule rule
    pub fn rule(&self) -> Option<&RuleProperties> {
        match self.template.resources.get(RULE_ID).map(|r| &r.kind) {
            Some(ResourceKind::Rule(props)) => Some(props),
            _ => None,
        }
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.template)
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.template)
    }
}

/// Emits workloads as EventBridge-scheduled Fargate tasks
#[derive(Clone, Debug)]
pub struct AwsBackend {
    target: AwsTarget,
}

impl AwsBackend {
    /// Backend emitting into `target`
    pub fn new(target: AwsTarget) -> Self {
        Self { target }
    }

    /// Target settings
    pub fn target(&self) -> &AwsTarget {
        &self.target
    }
}

impl Backend for AwsBackend {
    type Graph = AwsResourceGraph;

    fn kind(&self) -> BackendKind {
        BackendKind::Aws
    }

    fn check_intent(&self, intent: &WorkloadIntent) -> Result<()> {
        self.target.validate()?;
        validate_fargate_size(intent.cpu(), intent.memory())?;
        validate_task_count(intent.task_count())?;
        validate_log_retention(intent.log_retention_days())
    }

    fn synthesize_roles(
        &self,
        intent: &WorkloadIntent,
        env: &ResolvedEnvironment,
    ) -> Result<RoleSet> {
        synthesize(env, &AwsRoleScope::new(intent.name(), &self.target))
    }

    fn emit(&self, input: &EmitInput<'_>) -> Result<AwsResourceGraph> {
        let intent = input.intent;
        let name = intent.name();
        let scope = AwsRoleScope::new(name, &self.target);

        let mut secrets = Vec::with_capacity(input.env.secret_bindings().len());
        for binding in input.env.secret_bindings() {
            secrets.push(SecretEntry {
                name: binding.name.clone(),
                value_from: scope.secret_value_from(binding)?,
            });
        }

        let mut template = Template::new(format!("Cadence scheduled task {name}"));

        if self.target.create_repository {
            template.insert(
                REPOSITORY_ID,
                Resource::new(ResourceKind::Repository(RepositoryProperties {
                    repository_name: name.to_string(),
                    image_tag_mutability: "IMMUTABLE".to_string(),
                    image_scanning_configuration: ImageScanningConfiguration {
                        scan_on_push: true,
                    },
                })),
            );
        }

        let log_group_name = scope.log_group_name();
        template.insert(
            LOG_GROUP_ID,
            Resource::new(ResourceKind::LogGroup(LogGroupProperties {
                log_group_name: log_group_name.clone(),
                retention_in_days: intent.log_retention_days(),
            })),
        );

        template.insert(
            CLUSTER_ID,
            Resource::new(ResourceKind::Cluster(ClusterProperties {
                cluster_name: scope.cluster_name().to_string(),
            })),
        );

        let execution_role_name = scope.execution_role_name();
        let task_role_name = scope.task_role_name();
        let events_role_name = scope.events_role_name();

        template.insert(
            EXECUTION_ROLE_ID,
            Resource::new(ResourceKind::Role(RoleProperties {
                role_name: execution_role_name.clone(),
                assume_role_policy_document: PolicyDocument::trust(
                    &input.roles.execution.trust_principal,
                ),
                managed_policy_arns: vec![scope.managed_policy_arn(TASK_EXECUTION_MANAGED_POLICY)],
                policies: inline_policy(format!("{name}-read-secrets"), &input.roles.execution),
            })),
        );

        // Application code gets no AWS permissions of its own
        template.insert(
            TASK_ROLE_ID,
            Resource::new(ResourceKind::Role(RoleProperties {
                role_name: task_role_name.clone(),
                assume_role_policy_document: PolicyDocument::trust(
                    &input.roles.execution.trust_principal,
                ),
                managed_policy_arns: Vec::new(),
                policies: Vec::new(),
            })),
        );

        template.insert(
            EVENTS_ROLE_ID,
            Resource::new(ResourceKind::Role(RoleProperties {
                role_name: events_role_name,
                assume_role_policy_document: PolicyDocument::trust(
                    &input.roles.trigger.trust_principal,
                ),
                managed_policy_arns: Vec::new(),
                policies: inline_policy(format!("{name}-run-task"), &input.roles.trigger),
            })),
        );

        let container = ContainerDefinition {
            name: name.to_string(),
            image: intent.image().to_string(),
            essential: true,
            command: intent.command().to_vec(),
            environment: input
                .env
                .plain()
                .iter()
                .map(|(k, v)| KeyValuePair {
                    name: k.clone(),
                    value: v.clone(),
                })
                .collect(),
            secrets,
            log_configuration: LogConfiguration {
                log_driver: "awslogs".to_string(),
                options: BTreeMap::from([
                    ("awslogs-group".to_string(), log_group_name),
                    ("awslogs-region".to_string(), self.target.region.clone()),
                    ("awslogs-stream-prefix".to_string(), name.to_string()),
                ]),
            },
            readonly_root_filesystem: true,
            mount_points: vec![MountPoint {
                source_volume: SCRATCH_VOLUME_NAME.to_string(),
                container_path: intent.scratch_path().to_string(),
                read_only: false,
            }],
        };

        template.insert(
            TASK_DEFINITION_ID,
            Resource::new(ResourceKind::TaskDefinition(Box::new(
                TaskDefinitionProperties {
                    family: name.to_string(),
                    cpu: intent.cpu().to_string(),
                    memory: intent.memory().to_string(),
                    network_mode: "awsvpc".to_string(),
                    requires_compatibilities: vec!["FARGATE".to_string()],
                    execution_role_arn: scope.role_arn(&execution_role_name),
                    task_role_arn: scope.role_arn(&task_role_name),
                    container_definitions: vec![container],
                    volumes: vec![TaskVolume {
                        name: SCRATCH_VOLUME_NAME.to_string(),
                    }],
                },
            )))
            .depends_on([LOG_GROUP_ID, EXECUTION_ROLE_ID, TASK_ROLE_ID]),
        );

        let assign_public_ip = match self.target.assign_public_ip {
            Some(true) => "ENABLED",
            _ => "DISABLED",
        };
        template.insert(
            RULE_ID,
            Resource::new(ResourceKind::Rule(Box::new(RuleProperties {
                name: name.to_string(),
                schedule_expression: input.schedule.to_string(),
                state: "ENABLED".to_string(),
                targets: vec![RuleTarget {
                    id: name.to_string(),
                    arn: scope.cluster_arn(),
                    role_arn: scope.role_arn(&scope.events_role_name()),
                    ecs_parameters: EcsParameters {
                        task_definition_arn: scope.task_definition_arn(),
                        task_count: intent.task_count(),
                        launch_type: "FARGATE".to_string(),
                        network_configuration: NetworkConfiguration {
                            aws_vpc_configuration: AwsVpcConfiguration {
                                subnets: self.target.subnets.clone(),
                                security_groups: self.target.security_groups.clone(),
                                assign_public_ip: assign_public_ip.to_string(),
                            },
                        },
                    },
                }],
            })))
            .depends_on([CLUSTER_ID, EVENTS_ROLE_ID, TASK_DEFINITION_ID]),
        );

        debug!(
            workload = %name,
            resources = template.resources.len(),
            "emitted aws template"
        );

        Ok(AwsResourceGraph {
            template,
            roles: input.roles.clone(),
        })
    }
}

fn statement(grant: &Grant) -> Statement {
    let condition = grant
        .condition
        .iter()
        .map(|c| {
            (
                c.operator.clone(),
                BTreeMap::from([(c.key.clone(), c.value.clone())]),
            )
        })
        .collect();
    Statement {
        effect: "Allow".to_string(),
        principal: None,
        action: grant.actions.iter().cloned().collect(),
        resource: grant.resources.iter().cloned().collect(),
        condition,
    }
}

/// One inline policy holding every grant of `role`; none when it has no grants
fn inline_policy(policy_name: String, role: &RoleSpec) -> Vec<InlinePolicy> {
    if role.grants.is_empty() {
        return Vec::new();
    }
    vec![InlinePolicy {
        policy_name,
        policy_document: PolicyDocument::new(role.grants.iter().map(statement).collect()),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::{EnvDefaults, Error, WorkloadManifest};

    const SECRET_ARN: &str =
        "arn:aws:secretsmanager:us-east-1:123456789012:secret:gmail-token-AbCdEf";

    fn target() -> AwsTarget {
        serde_yaml::from_str(
            r#"
accountId: "123456789012"
region: us-east-1
subnets: [subnet-a]
securityGroups: [sg-a]
assignPublicIp: false
"#,
        )
        .unwrap()
    }

    fn manifest() -> WorkloadManifest {
        serde_yaml::from_str(&format!(
            r#"
name: email-assistant
image: repo/app:1.0
command: [label, --max-results, "50"]
schedule: every 15 minutes
env:
  LOG_LEVEL: INFO
secretRefs:
  - name: GOOGLE_TOKEN_B64
    source: "secretsmanager:{SECRET_ARN}"
"#
        ))
        .unwrap()
    }

    fn compile(manifest: &WorkloadManifest, target: AwsTarget) -> Result<AwsResourceGraph> {
        let intent = WorkloadIntent::from_manifest(manifest)?;
        AwsBackend::new(target).compile(&intent, &EnvDefaults::default())
    }

    #[test]
    fn end_to_end_task_definition_and_rule() {
        let graph = compile(&manifest(), target()).unwrap();
        let container = &graph.task_definition().unwrap().container_definitions[0];
        assert_eq!(container.secrets.len(), 1);
        assert_eq!(container.secrets[0].name, "GOOGLE_TOKEN_B64");
        assert_eq!(container.secrets[0].value_from, SECRET_ARN);
        assert_eq!(container.environment.len(), 1);
        assert_eq!(container.environment[0].name, "LOG_LEVEL");
        assert_eq!(container.command, ["label", "--max-results", "50"]);

        let rule = graph.rule().unwrap();
        assert_eq!(rule.schedule_expression, "rate(15 minutes)");
        assert_eq!(rule.targets[0].ecs_parameters.task_count, 1);
        assert_eq!(
            rule.targets[0]
                .ecs_parameters
                .network_configuration
                .aws_vpc_configuration
                .assign_public_ip,
            "DISABLED"
        );
    }

    #[test]
    fn read_only_root_gets_a_writable_scratch_mount() {
        let graph = compile(&manifest(), target()).unwrap();
        let td = graph.task_definition().unwrap();
        let container = &td.container_definitions[0];
        assert!(container.readonly_root_filesystem);
        assert_eq!(container.mount_points.len(), 1);
        assert_eq!(container.mount_points[0].container_path, "/tmp");
        assert!(!container.mount_points[0].read_only);
        assert_eq!(td.volumes.len(), 1);
        assert_eq!(td.volumes[0].name, container.mount_points[0].source_volume);

        let json = serde_json::to_value(&graph.template).unwrap();
        let props = &json["Resources"][TASK_DEFINITION_ID]["Properties"];
        assert_eq!(props["Volumes"][0]["Name"], "scratch");
        assert_eq!(
            props["ContainerDefinitions"][0]["MountPoints"][0]["ContainerPath"],
            "/tmp"
        );
    }

    #[test]
    fn log_group_precedes_task_definition() {
        let graph = compile(&manifest(), target()).unwrap();
        let td = &graph.template.resources[TASK_DEFINITION_ID];
        assert!(td.depends_on.iter().any(|d| d == LOG_GROUP_ID));
        assert!(td.depends_on.iter().any(|d| d == EXECUTION_ROLE_ID));
        assert!(td.depends_on.iter().all(|d| d != EVENTS_ROLE_ID));
        let rule = &graph.template.resources[RULE_ID];
        assert!(rule.depends_on.iter().any(|d| d == TASK_DEFINITION_ID));
        assert!(rule.depends_on.iter().any(|d| d == EVENTS_ROLE_ID));
    }

    #[test]
    fn events_role_policy_is_scoped() {
        let graph = compile(&manifest(), target()).unwrap();
        let json = serde_json::to_value(&graph.template).unwrap();
        let statements =
            &json["Resources"][EVENTS_ROLE_ID]["Properties"]["Policies"][0]["PolicyDocument"]
                ["Statement"];
        assert_eq!(statements[0]["Action"], serde_json::json!(["ecs:RunTask"]));
        assert_eq!(
            statements[0]["Resource"],
            serde_json::json!(["arn:aws:ecs:us-east-1:123456789012:task-definition/email-assistant"])
        );
        assert_eq!(
            statements[0]["Condition"]["ArnEquals"]["ecs:cluster"],
            "arn:aws:ecs:us-east-1:123456789012:cluster/email-assistant"
        );
        assert_eq!(statements[1]["Action"], serde_json::json!(["iam:PassRole"]));
        assert_eq!(statements[1]["Resource"].as_array().unwrap().len(), 2);
        assert!(!json.to_string().contains('*'));
    }

    #[test]
    fn execution_role_reads_only_the_referenced_secret() {
        let graph = compile(&manifest(), target()).unwrap();
        let json = serde_json::to_value(&graph.template).unwrap();
        let role = &json["Resources"][EXECUTION_ROLE_ID]["Properties"];
        let statement = &role["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(
            statement["Action"],
            serde_json::json!(["secretsmanager:GetSecretValue"])
        );
        assert_eq!(statement["Resource"], serde_json::json!([SECRET_ARN]));
        assert!(role["ManagedPolicyArns"][0]
            .as_str()
            .unwrap()
            .ends_with("AmazonECSTaskExecutionRolePolicy"));
    }

    #[test]
    fn task_role_has_no_permissions() {
        let graph = compile(&manifest(), target()).unwrap();
        let json = serde_json::to_value(&graph.template).unwrap();
        let role = &json["Resources"][TASK_ROLE_ID]["Properties"];
        assert!(role.get("Policies").is_none());
        assert!(role.get("ManagedPolicyArns").is_none());
    }

    #[test]
    fn repository_is_optional() {
        let graph = compile(&manifest(), target()).unwrap();
        assert!(!graph.template.resources.contains_key(REPOSITORY_ID));

        let mut t = target();
        t.create_repository = true;
        let graph = compile(&manifest(), t).unwrap();
        assert!(graph.template.resources.contains_key(REPOSITORY_ID));
    }

    #[test]
    fn invalid_fargate_size_is_rejected_before_emission() {
        let mut m = manifest();
        m.cpu = 300;
        let err = compile(&m, target()).unwrap_err();
        assert_eq!(err.subject(), "workload.cpu");
    }

    #[test]
    fn missing_public_ip_flag_is_rejected() {
        let mut t = target();
        t.assign_public_ip = None;
        let err = compile(&manifest(), t).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn weekday_cron_is_shifted() {
        let mut m = manifest();
        m.schedule = cadence_common::ScheduleInput::Cron {
            cron: "0 9 * * 1-5".to_string(),
        };
        let graph = compile(&m, target()).unwrap();
        assert_eq!(
            graph.rule().unwrap().schedule_expression,
            "cron(0 9 ? * 2,3,4,5,6 *)"
        );
    }

    #[test]
    fn rendering_is_deterministic() {
        let a = compile(&manifest(), target()).unwrap();
        let b = compile(&manifest(), target()).unwrap();
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
        assert!(a.to_yaml().unwrap().contains("AWSTemplateFormatVersion"));
    }
}
