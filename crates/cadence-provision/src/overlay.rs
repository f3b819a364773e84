//! Named-environment overlays
//!
//! An overlay replaces fields of the base workload definition before it is
//! validated, so every derived artifact (IAM scopes included) follows the
//! overridden values. Fields present replace the base field entirely;
//! `env` and `secretSources` replace per key. Applying an overlay is a pure
//! function of the base, so applying it twice equals applying it once.

use std::collections::BTreeMap;

use cadence_common::{Error, Result, ScheduleInput, WorkloadManifest};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Overrides for one named environment
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Overlay {
    /// Replacement schedule
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleInput>,

    /// Replacement image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Tag pinned onto the image, replacing any tag or digest
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,

    /// Replacement CPU units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,

    /// Replacement memory in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,

    /// Replacement task count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_count: Option<u32>,

    /// Replacement command; never merged with the base
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Variables replaced or added by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,

    /// New locators for secrets already referenced by the base
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_sources: BTreeMap<String, String>,
}

impl Overlay {
    /// Apply to `base`, reporting errors under `overlays.<name>`.
    pub fn apply(&self, name: &str, base: &WorkloadManifest) -> Result<WorkloadManifest> {
        let mut out = base.clone();

        if let Some(schedule) = &self.schedule {
            out.schedule = schedule.clone();
        }
        if let Some(image) = &self.image {
            out.image = image.clone();
        }
        if let Some(tag) = &self.image_tag {
            if tag.is_empty() || tag.contains(['/', '@', ':']) {
                return Err(Error::validation(
                    format!("overlays.{name}.imageTag"),
                    format!("'{tag}' is not an image tag"),
                ));
            }
            out.image = format!("{}:{tag}", image_repository(&out.image));
        }
        if let Some(cpu) = self.cpu {
            out.cpu = cpu;
        }
        if let Some(memory) = self.memory {
            out.memory = memory;
        }
        if let Some(task_count) = self.task_count {
            out.task_count = task_count;
        }
        if let Some(command) = &self.command {
            out.command = command.clone();
        }
        for (key, value) in &self.env {
            out.env.insert(key.clone(), value.clone());
        }
        for (secret, source) in &self.secret_sources {
            let entry = out
                .secret_refs
                .iter_mut()
                .find(|r| &r.name == secret)
                .ok_or_else(|| {
                    Error::validation(
                        format!("overlays.{name}.secretSources.{secret}"),
                        "overrides a secret the workload does not reference",
                    )
                })?;
            entry.source = source.clone();
        }

        Ok(out)
    }
}

/// Image reference without its tag or digest.
///
/// A `:` only starts a tag after the last `/`; before it, it is a registry port.
fn image_repository(image: &str) -> &str {
    let image = image.split_once('@').map_or(image, |(repo, _)| repo);
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => &image[..name_start + i],
        None => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::SecretRefSpec;

    fn base() -> WorkloadManifest {
        serde_yaml::from_str(
            r#"
name: sync
image: registry:5000/team/sync:1.0
command: [run, --all]
schedule: 15m
env: { LOG_LEVEL: INFO, MODE: batch }
secretRefs:
  - name: TOKEN
    source: ssm:/dev/token
"#,
        )
        .unwrap()
    }

    fn prod() -> Overlay {
        serde_yaml::from_str(
            r#"
schedule: 5m
imageTag: "1.1"
cpu: 512
memory: 1024
command: [run]
env: { LOG_LEVEL: WARN }
secretSources: { TOKEN: "ssm:/prod/token" }
"#,
        )
        .unwrap()
    }

    #[test]
    fn overlay_replaces_fields() {
        let out = prod().apply("prod", &base()).unwrap();
        assert_eq!(out.schedule, ScheduleInput::Text("5m".to_string()));
        assert_eq!(out.image, "registry:5000/team/sync:1.1");
        assert_eq!(out.cpu, 512);
        assert_eq!(out.memory, 1024);
        assert_eq!(out.command, ["run"]);
        assert_eq!(out.env["LOG_LEVEL"], "WARN");
        assert_eq!(out.env["MODE"], "batch");
        assert_eq!(
            out.secret_refs,
            [SecretRefSpec {
                name: "TOKEN".to_string(),
                source: "ssm:/prod/token".to_string()
            }]
        );
    }

    #[test]
    fn unspecified_fields_are_inherited() {
        let out = Overlay::default().apply("noop", &base()).unwrap();
        assert_eq!(out, base());
    }

    #[test]
    fn overlay_is_idempotent() {
        let overlay = prod();
        let once = overlay.apply("prod", &base()).unwrap();
        let twice = overlay.apply("prod", &once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn image_tag_replaces_digest() {
        let mut b = base();
        b.image = "repo/app@sha256:abc".to_string();
        let out = prod().apply("prod", &b).unwrap();
        assert_eq!(out.image, "repo/app:1.1");
    }

    #[test]
    fn image_repository_handles_ports_and_bare_names() {
        assert_eq!(image_repository("app"), "app");
        assert_eq!(image_repository("app:1"), "app");
        assert_eq!(image_repository("host:5000/app"), "host:5000/app");
        assert_eq!(image_repository("host:5000/app:2"), "host:5000/app");
    }

    #[test]
    fn unknown_secret_source_is_rejected() {
        let overlay = Overlay {
            secret_sources: BTreeMap::from([("OTHER".to_string(), "ssm:/x".to_string())]),
            ..Default::default()
        };
        let err = overlay.apply("prod", &base()).unwrap_err();
        assert_eq!(err.subject(), "overlays.prod.secretSources.OTHER");
    }

    #[test]
    fn bad_image_tag_is_rejected() {
        let overlay = Overlay {
            image_tag: Some("a/b".to_string()),
            ..Default::default()
        };
        let err = overlay.apply("prod", &base()).unwrap_err();
        assert_eq!(err.subject(), "overlays.prod.imageTag");
    }

    #[test]
    fn unknown_overlay_fields_are_rejected() {
        assert!(serde_yaml::from_str::<Overlay>("replicas: 3").is_err());
    }
}
