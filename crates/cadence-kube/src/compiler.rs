//! Kubernetes emitter
//!
//! Pure compilation of a workload into its namespaced resource graph. The
//! graph is rendered in apply order: Namespace first, CronJob last, so every
//! object the CronJob references already exists when it is created.

use std::collections::BTreeMap;

use cadence_common::backend::{Backend, EmitInput};
use cadence_common::iam::synthesize;
use cadence_common::{
    compute_config_hash, BackendKind, Error, ObjectMeta, ResolvedEnvironment, Result, RoleSet,
    WorkloadIntent, CONFIG_HASH_ANNOTATION, LABEL_NAME, SCRATCH_VOLUME_NAME,
};
use serde::Serialize;
use tracing::debug;

use crate::k8s::{
    ConfigMap, ConfigMapEnvSource, Container, CronJob, CronJobSpec, EnvFromSource, EnvVar,
    JobSpec, JobTemplateSpec, Namespace, NetworkPolicy, PodSecurityContext, PodSpec,
    PodTemplateMeta, PodTemplateSpec, PolicyRule, ResourceQuantity, ResourceRequirements, Role,
    RoleBinding, SeccompProfile, SecurityContext, ServiceAccount, Volume, VolumeMount,
};
use crate::target::{KubeRoleScope, KubeTarget};

/// Zone CronJob schedules are evaluated in; matches EventBridge (UTC)
pub const SCHEDULE_TIME_ZONE: &str = "Etc/UTC";

const SECONDS_PER_DAY: i32 = 86_400;

/// Longest retention whose `ttlSecondsAfterFinished` still fits the API's int32
pub const MAX_LOG_RETENTION_DAYS: u32 = (i32::MAX / SECONDS_PER_DAY) as u32;

/// Complete compiled output for one workload
#[derive(Clone, Debug, PartialEq)]
pub struct KubeResourceGraph {
    /// Namespace holding everything else
    pub namespace: Namespace,
    /// ExecutionAgent identity
    pub service_account: ServiceAccount,
    /// Secret read permissions; absent when no secrets are referenced.
    ///
    /// The kubelet resolves `secretKeyRef` itself and the pod mounts no
    /// token, so this Role only records the ExecutionAgent's scope in the
    /// cluster's RBAC.
    pub role: Option<Role>,
    /// Binds [`Self::role`] to the ServiceAccount
    pub role_binding: Option<RoleBinding>,
    /// Plain environment
    pub config_map: ConfigMap,
    /// Ingress isolation
    pub network_policy: NetworkPolicy,
    /// The scheduled job
    pub cron_job: CronJob,
    /// Roles as synthesized; the TriggerAgent is the cluster's own
    /// CronJob controller and is not materialised
    pub roles: RoleSet,
}

/// One emitted object, borrowed from a [`KubeResourceGraph`]
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(untagged)]
pub enum KubeObject<'a> {
    /// Namespace
    Namespace(&'a Namespace),
    /// ServiceAccount
    ServiceAccount(&'a ServiceAccount),
    /// Role
    Role(&'a Role),
    /// RoleBinding
    RoleBinding(&'a RoleBinding),
    /// ConfigMap
    ConfigMap(&'a ConfigMap),
    /// NetworkPolicy
    NetworkPolicy(&'a NetworkPolicy),
    /// CronJob
    CronJob(&'a CronJob),
}

impl KubeObject<'_> {
    /// Object kind
    pub fn kind(&self) -> &str {
        match self {
            Self::Namespace(o) => &o.kind,
            Self::ServiceAccount(o) => &o.kind,
            Self::Role(o) => &o.kind,
            Self::RoleBinding(o) => &o.kind,
            Self::ConfigMap(o) => &o.kind,
            Self::NetworkPolicy(o) => &o.kind,
            Self::CronJob(o) => &o.kind,
        }
    }
}

impl KubeResourceGraph {
    /// Objects in apply order
    pub fn objects(&self) -> Vec<KubeObject<'_>> {
        let mut objects = vec![
            KubeObject::Namespace(&self.namespace),
            KubeObject::ServiceAccount(&self.service_account),
        ];
        if let Some(role) = &self.role {
            objects.push(KubeObject::Role(role));
        }
        if let Some(binding) = &self.role_binding {
            objects.push(KubeObject::RoleBinding(binding));
        }
        objects.push(KubeObject::ConfigMap(&self.config_map));
        objects.push(KubeObject::NetworkPolicy(&self.network_policy));
        objects.push(KubeObject::CronJob(&self.cron_job));
        objects
    }

    /// Render as a multi-document YAML stream
    pub fn to_yaml(&self) -> std::result::Result<String, serde_yaml::Error> {
        let docs = self
            .objects()
            .iter()
            .map(serde_yaml::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(docs.join("---\n"))
    }
}

/// Emits workloads as Kubernetes CronJobs
#[derive(Clone, Debug, Default)]
pub struct KubeBackend {
    target: KubeTarget,
}

impl KubeBackend {
    /// Backend emitting into `target`
    pub fn new(target: KubeTarget) -> Self {
        Self { target }
    }

    /// Target settings
    pub fn target(&self) -> &KubeTarget {
        &self.target
    }
}

impl Backend for KubeBackend {
    type Graph = KubeResourceGraph;

    fn kind(&self) -> BackendKind {
        BackendKind::Kubernetes
    }

    fn check_intent(&self, intent: &WorkloadIntent) -> Result<()> {
        self.target.validate()?;
        ttl_seconds(intent.log_retention_days()).map(|_| ())
    }

    fn synthesize_roles(
        &self,
        intent: &WorkloadIntent,
        env: &ResolvedEnvironment,
    ) -> Result<RoleSet> {
        synthesize(env, &KubeRoleScope::new(intent.name(), &self.target))
    }

    fn emit(&self, input: &EmitInput<'_>) -> Result<KubeResourceGraph> {
        let intent = input.intent;
        let name = intent.name();
        let namespace = self.target.namespace_for(name);
        let scope = KubeRoleScope::new(name, &self.target);

        let (role, role_binding) = compile_rbac(name, namespace, input.roles);
        let config_map_name = format!("{name}-env");
        let config_map =
            ConfigMap::new(&config_map_name, namespace).with_data(input.env.plain().clone());

        let mut secret_env = Vec::with_capacity(input.env.secret_bindings().len());
        for binding in input.env.secret_bindings() {
            let key_ref = scope.secret_key_ref(binding)?;
            secret_env.push(EnvVar::from_secret(&binding.name, key_ref.secret, key_ref.key));
        }

        let pod_labels = ObjectMeta::new(name, namespace).labels;
        let selector = BTreeMap::from([(LABEL_NAME.to_string(), name.to_string())]);
        let network_policy = NetworkPolicy::deny_ingress(name, namespace, selector);

        let container = Container {
            name: name.to_string(),
            image: intent.image().to_string(),
            args: Some(intent.command().to_vec()),
            env: secret_env,
            env_from: vec![EnvFromSource {
                config_map_ref: ConfigMapEnvSource {
                    name: config_map_name,
                },
            }],
            resources: Some(compile_resources(intent.cpu(), intent.memory())),
            security_context: Some(SecurityContext::restricted()),
            volume_mounts: vec![VolumeMount::writable(
                SCRATCH_VOLUME_NAME,
                intent.scratch_path(),
            )],
        };

        let config_hash = compute_config_hash(input.env.plain());
        let cron_job = CronJob {
            api_version: "batch/v1".to_string(),
            kind: "CronJob".to_string(),
            metadata: ObjectMeta::new(name, namespace),
            spec: CronJobSpec {
                schedule: input.schedule.to_string(),
                time_zone: SCHEDULE_TIME_ZONE.to_string(),
                // Overlapping ticks are not deduplicated here; the workload
                // must tolerate concurrent runs.
                concurrency_policy: "Allow".to_string(),
                successful_jobs_history_limit: 3,
                failed_jobs_history_limit: 1,
                job_template: JobTemplateSpec {
                    spec: JobSpec {
                        parallelism: intent.task_count(),
                        completions: intent.task_count(),
                        backoff_limit: 0,
                        ttl_seconds_after_finished: ttl_seconds(intent.log_retention_days())?,
                        template: PodTemplateSpec {
                            metadata: PodTemplateMeta {
                                labels: pod_labels,
                                annotations: BTreeMap::from([(
                                    CONFIG_HASH_ANNOTATION.to_string(),
                                    config_hash,
                                )]),
                            },
                            spec: PodSpec {
                                service_account_name: name.to_string(),
                                automount_service_account_token: false,
                                restart_policy: "Never".to_string(),
                                security_context: Some(PodSecurityContext {
                                    run_as_non_root: Some(true),
                                    seccomp_profile: Some(SeccompProfile::runtime_default()),
                                }),
                                containers: vec![container],
                                volumes: vec![Volume::from_empty_dir(SCRATCH_VOLUME_NAME)],
                            },
                        },
                    },
                },
            },
        };

        debug!(
            workload = %name,
            namespace = %namespace,
            rbac = role.is_some(),
            "emitted kubernetes graph"
        );

        Ok(KubeResourceGraph {
            namespace: Namespace::new(namespace),
            service_account: ServiceAccount::new(name, namespace),
            role,
            role_binding,
            config_map,
            network_policy,
            cron_job,
            roles: input.roles.clone(),
        })
    }
}

/// Role + RoleBinding from the ExecutionAgent's grants; none without secrets
fn compile_rbac(name: &str, namespace: &str, roles: &RoleSet) -> (Option<Role>, Option<RoleBinding>) {
    if roles.execution.grants.is_empty() {
        return (None, None);
    }
    let rules = roles
        .execution
        .grants
        .iter()
        .map(|grant| PolicyRule {
            api_groups: vec![String::new()],
            resources: vec!["secrets".to_string()],
            resource_names: grant.resources.iter().cloned().collect(),
            verbs: grant.actions.iter().cloned().collect(),
        })
        .collect();
    let role_name = format!("{name}-secret-reader");
    let role = Role::new(&role_name, namespace, rules);
    let binding = RoleBinding::for_service_account(&role_name, namespace, &role_name, name);
    (Some(role), Some(binding))
}

fn ttl_seconds(retention_days: u32) -> Result<i32> {
    i32::try_from(retention_days)
        .ok()
        .and_then(|days| days.checked_mul(SECONDS_PER_DAY))
        .ok_or_else(|| {
            Error::validation(
                "workload.logRetentionDays",
                format!(
                    "{retention_days} days exceeds the kubernetes maximum of {MAX_LOG_RETENTION_DAYS}"
                ),
            )
        })
}

/// Requests equal limits: ECS CPU units to millicores, MiB to `Mi`
fn compile_resources(cpu_units: u32, memory_mib: u32) -> ResourceRequirements {
    let millicores = (u64::from(cpu_units) * 1000).div_ceil(1024);
    let quantity = ResourceQuantity {
        cpu: format!("{millicores}m"),
        memory: format!("{memory_mib}Mi"),
    };
    ResourceRequirements {
        requests: Some(quantity.clone()),
        limits: Some(quantity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::{EnvDefaults, Identity, ScheduleInput, SecretRefSpec, WorkloadManifest};

    fn manifest() -> WorkloadManifest {
        serde_yaml::from_str(
            r#"
name: email-assistant
image: repo/app:1.0
command: [label, --max-results, "50"]
schedule: 15m
env:
  MODE: batch
secretRefs:
  - name: GOOGLE_TOKEN_B64
    source: k8s:gmail/token
"#,
        )
        .unwrap()
    }

    fn compile(manifest: &WorkloadManifest, target: KubeTarget) -> Result<KubeResourceGraph> {
        let intent = WorkloadIntent::from_manifest(manifest)?;
        KubeBackend::new(target).compile(&intent, &EnvDefaults::default())
    }

    #[test]
    fn cronjob_carries_translated_schedule_and_bounds() {
        let graph = compile(&manifest(), KubeTarget::default()).unwrap();
        let spec = &graph.cron_job.spec;
        assert_eq!(spec.schedule, "*/15 * * * *");
        assert_eq!(spec.time_zone, "Etc/UTC");
        assert_eq!(spec.concurrency_policy, "Allow");
        assert_eq!(spec.job_template.spec.parallelism, 1);
        assert_eq!(spec.job_template.spec.completions, 1);
        assert_eq!(spec.job_template.spec.ttl_seconds_after_finished, 14 * 86_400);
    }

    #[test]
    fn container_gets_args_env_and_resources() {
        let graph = compile(&manifest(), KubeTarget::default()).unwrap();
        let pod = &graph.cron_job.spec.job_template.spec.template;
        let container = &pod.spec.containers[0];
        assert_eq!(
            container.args.as_deref().unwrap(),
            ["label", "--max-results", "50"]
        );
        assert_eq!(container.env.len(), 1);
        assert_eq!(container.env[0].name, "GOOGLE_TOKEN_B64");
        assert_eq!(container.env_from[0].config_map_ref.name, "email-assistant-env");

        let resources = container.resources.as_ref().unwrap();
        assert_eq!(resources.requests, resources.limits);
        let limits = resources.limits.as_ref().unwrap();
        assert_eq!(limits.cpu, "250m");
        assert_eq!(limits.memory, "512Mi");

        assert!(pod.metadata.annotations.contains_key(CONFIG_HASH_ANNOTATION));
        assert!(!pod.spec.automount_service_account_token);
    }

    #[test]
    fn read_only_root_gets_a_writable_scratch_mount() {
        let mut m = manifest();
        m.scratch_path = "/app/data".to_string();
        let graph = compile(&m, KubeTarget::default()).unwrap();
        let pod = &graph.cron_job.spec.job_template.spec.template.spec;
        let container = &pod.containers[0];

        let security = container.security_context.as_ref().unwrap();
        assert_eq!(security.read_only_root_filesystem, Some(true));
        assert_eq!(container.volume_mounts.len(), 1);
        assert_eq!(container.volume_mounts[0].mount_path, "/app/data");
        assert_eq!(container.volume_mounts[0].read_only, Some(false));

        assert_eq!(pod.volumes.len(), 1);
        assert_eq!(pod.volumes[0].name, container.volume_mounts[0].name);
        assert!(pod.volumes[0].empty_dir.is_some());
    }

    #[test]
    fn retention_beyond_int32_ttl_is_rejected() {
        let mut m = manifest();
        m.log_retention_days = MAX_LOG_RETENTION_DAYS;
        let graph = compile(&m, KubeTarget::default()).unwrap();
        let ttl = graph.cron_job.spec.job_template.spec.ttl_seconds_after_finished;
        assert!(ttl > 0);

        m.log_retention_days = 30_000;
        let err = compile(&m, KubeTarget::default()).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert_eq!(err.subject(), "workload.logRetentionDays");
    }

    #[test]
    fn config_map_holds_only_plain_environment() {
        let graph = compile(&manifest(), KubeTarget::default()).unwrap();
        let data = &graph.config_map.data;
        assert_eq!(data.get("LOG_LEVEL").map(String::as_str), Some("INFO"));
        assert_eq!(data.get("MODE").map(String::as_str), Some("batch"));
        assert!(!data.contains_key("GOOGLE_TOKEN_B64"));
    }

    #[test]
    fn rbac_grants_get_on_referenced_secret_only() {
        let graph = compile(&manifest(), KubeTarget::default()).unwrap();
        let role = graph.role.as_ref().unwrap();
        assert_eq!(role.rules.len(), 1);
        assert_eq!(role.rules[0].resource_names, ["gmail"]);
        assert_eq!(role.rules[0].verbs, ["get"]);
        let binding = graph.role_binding.as_ref().unwrap();
        assert_eq!(binding.subjects[0].name, "email-assistant");
        assert_eq!(graph.roles.trigger.identity, Identity::TriggerAgent);
    }

    #[test]
    fn no_secrets_means_no_rbac() {
        let mut m = manifest();
        m.secret_refs.clear();
        let graph = compile(&m, KubeTarget::default()).unwrap();
        assert!(graph.role.is_none());
        assert!(graph.role_binding.is_none());
        let kinds: Vec<_> = graph.objects().iter().map(|o| o.kind().to_string()).collect();
        assert_eq!(
            kinds,
            ["Namespace", "ServiceAccount", "ConfigMap", "NetworkPolicy", "CronJob"]
        );
    }

    #[test]
    fn objects_are_in_apply_order() {
        let graph = compile(&manifest(), KubeTarget::default()).unwrap();
        let kinds: Vec<_> = graph.objects().iter().map(|o| o.kind().to_string()).collect();
        assert_eq!(
            kinds,
            [
                "Namespace",
                "ServiceAccount",
                "Role",
                "RoleBinding",
                "ConfigMap",
                "NetworkPolicy",
                "CronJob"
            ]
        );
    }

    #[test]
    fn external_secret_without_secret_name_fails() {
        let mut m = manifest();
        m.secret_refs = vec![SecretRefSpec {
            name: "TOKEN".to_string(),
            source: "ssm:/app/token".to_string(),
        }];
        let err = compile(&m, KubeTarget::default()).unwrap_err();
        assert_eq!(err.subject(), "targets.kubernetes.secretName");
    }

    #[test]
    fn drifting_interval_is_rejected() {
        let mut m = manifest();
        m.schedule = ScheduleInput::Text("7m".to_string());
        let err = compile(&m, KubeTarget::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidSchedule { .. }));
    }

    #[test]
    fn yaml_is_multi_document_and_stable() {
        let graph = compile(&manifest(), KubeTarget::default()).unwrap();
        let yaml = graph.to_yaml().unwrap();
        assert_eq!(yaml.matches("---\n").count(), 6);
        assert!(yaml.contains("kind: CronJob"));
        assert_eq!(yaml, graph.to_yaml().unwrap());
    }

    #[test]
    fn namespace_override_applies_everywhere() {
        let target = KubeTarget {
            namespace: Some("batch".to_string()),
            secret_name: None,
        };
        let graph = compile(&manifest(), target).unwrap();
        assert_eq!(graph.namespace.metadata.name, "batch");
        assert_eq!(graph.cron_job.metadata.namespace.as_deref(), Some("batch"));
        assert_eq!(
            graph.roles.execution.trust_principal,
            "system:serviceaccount:batch:email-assistant"
        );
    }

    #[test]
    fn cpu_units_round_up_to_millicores() {
        let r = compile_resources(384, 1024);
        assert_eq!(r.limits.unwrap().cpu, "375m");
        assert_eq!(compile_resources(100, 64).requests.unwrap().cpu, "98m");
    }
}
