//! Cadence CLI library

pub mod commands;
pub mod error;

pub use error::{Error, Result};

use clap::{Parser, Subcommand};

/// Cadence - provision one scheduled container on Kubernetes or AWS
#[derive(Parser, Debug)]
#[command(name = "cadence")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the resource graph for one backend to stdout
    Render(commands::render::RenderArgs),
    /// Run the full pipeline for every configured backend
    Validate(commands::validate::ValidateArgs),
    /// Print the JSON Schema of the provisioning document
    Schema,
}

impl Cli {
    /// Run the CLI command
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Render(args) => commands::render::run(args),
            Commands::Validate(args) => commands::validate::run(args),
            Commands::Schema => commands::schema::run(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_common::BackendKind;
    use cadence_provision::OutputFormat;

    #[test]
    fn render_args_parse() {
        let cli = Cli::try_parse_from([
            "cadence", "render", "--file", "doc.yaml", "--target", "aws", "--overlay", "prod",
            "--format", "json",
        ])
        .unwrap();
        match cli.command {
            Commands::Render(args) => {
                assert_eq!(args.doc.file.to_str(), Some("doc.yaml"));
                assert_eq!(args.target, BackendKind::Aws);
                assert_eq!(args.doc.overlay.as_deref(), Some("prod"));
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn format_defaults_to_yaml() {
        let cli = Cli::try_parse_from([
            "cadence", "render", "--file", "doc.yaml", "--target", "k8s",
        ])
        .unwrap();
        match cli.command {
            Commands::Render(args) => {
                assert_eq!(args.format, OutputFormat::Yaml);
                assert_eq!(args.target, BackendKind::Kubernetes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn unknown_target_is_rejected() {
        assert!(Cli::try_parse_from([
            "cadence", "render", "--file", "doc.yaml", "--target", "nomad",
        ])
        .is_err());
    }
}
