//! Validate command

use clap::Args;

use cadence_provision::provision_all;

use super::{load_document, DocumentArgs};
use crate::Result;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub doc: DocumentArgs,
}

/// Provision every configured backend; returns one summary line each
pub fn validate(args: &ValidateArgs) -> Result<Vec<String>> {
    let doc = load_document(&args.doc.file)?;
    let graphs = provision_all(&doc, args.doc.overlay.as_deref())?;
    Ok(graphs
        .iter()
        .map(|graph| {
            format!(
                "  {} valid: {} objects, schedule {}",
                graph.kind(),
                graph.len(),
                graph.schedule().unwrap_or("-")
            )
        })
        .collect())
}

pub fn run(args: ValidateArgs) -> Result<()> {
    for line in validate(&args)? {
        println!("{line}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::demo_document_path;

    #[test]
    fn validates_every_configured_backend() {
        let args = ValidateArgs {
            doc: DocumentArgs {
                file: demo_document_path(),
                overlay: None,
            },
        };
        let lines = validate(&args).unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("kubernetes valid"));
        assert!(lines[1].contains("aws valid"));
    }
}
