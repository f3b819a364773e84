//! Schema command

use cadence_provision::ProvisionDocument;

use crate::Result;

pub fn run() -> Result<()> {
    let schema = serde_json::to_string_pretty(&ProvisionDocument::json_schema())?;
    println!("{schema}");
    Ok(())
}
