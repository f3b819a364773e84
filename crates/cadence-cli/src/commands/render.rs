//! Render command

use std::io::Write;

use clap::Args;
use tracing::info;

use cadence_common::BackendKind;
use cadence_provision::{provision, OutputFormat};

use super::{load_document, DocumentArgs};
use crate::Result;

#[derive(Args, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub doc: DocumentArgs,

    /// Backend to render for (kubernetes or aws)
    #[arg(long, short, env = "CADENCE_TARGET")]
    pub target: BackendKind,

    /// Output format (yaml or json)
    #[arg(long, default_value = "yaml")]
    pub format: OutputFormat,
}

/// Compile and serialize the resource graph
pub fn render(args: &RenderArgs) -> Result<String> {
    let doc = load_document(&args.doc.file)?;
    let graph = provision(&doc, args.target, args.doc.overlay.as_deref())?;
    info!(backend = %args.target, format = %args.format, "rendering");
    Ok(graph.render(args.format)?)
}

pub fn run(args: RenderArgs) -> Result<()> {
    let output = render(&args)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(output.as_bytes())?;
    if !output.ends_with('\n') {
        writeln!(stdout)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::demo_document_path;

    fn args(target: BackendKind, overlay: Option<&str>, format: OutputFormat) -> RenderArgs {
        RenderArgs {
            doc: DocumentArgs {
                file: demo_document_path(),
                overlay: overlay.map(str::to_string),
            },
            target,
            format,
        }
    }

    #[test]
    fn renders_kubernetes_yaml() {
        let out = render(&args(BackendKind::Kubernetes, None, OutputFormat::Yaml)).unwrap();
        assert!(out.contains("kind: CronJob"));
        assert!(out.contains("schedule: '*/15 * * * *'") || out.contains("schedule: \"*/15 * * * *\""));
    }

    #[test]
    fn renders_aws_json_with_overlay() {
        let out = render(&args(BackendKind::Aws, Some("prod"), OutputFormat::Json)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(
            json["Resources"]["ScheduleRule"]["Properties"]["ScheduleExpression"],
            "rate(5 minutes)"
        );
    }

    #[test]
    fn demo_job_can_write_its_state_on_both_backends() {
        let out = render(&args(BackendKind::Kubernetes, None, OutputFormat::Json)).unwrap();
        let objects: serde_json::Value = serde_json::from_str(&out).unwrap();
        let cron_job = objects
            .as_array()
            .unwrap()
            .iter()
            .find(|o| o["kind"] == "CronJob")
            .unwrap();
        let pod = &cron_job["spec"]["jobTemplate"]["spec"]["template"]["spec"];
        assert_eq!(
            pod["containers"][0]["volumeMounts"][0]["mountPath"],
            "/var/lib/email-assistant"
        );
        assert!(pod["volumes"][0]["emptyDir"].is_object());

        let out = render(&args(BackendKind::Aws, None, OutputFormat::Json)).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out).unwrap();
        let props = &json["Resources"]["TaskDefinition"]["Properties"];
        assert_eq!(
            props["ContainerDefinitions"][0]["MountPoints"][0]["ContainerPath"],
            "/var/lib/email-assistant"
        );
        assert_eq!(props["Volumes"][0]["Name"], "scratch");
    }

    #[test]
    fn unknown_overlay_fails() {
        assert!(render(&args(BackendKind::Aws, Some("qa"), OutputFormat::Yaml)).is_err());
    }
}
