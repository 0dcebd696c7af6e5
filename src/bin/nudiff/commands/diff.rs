//! `nudiff diff` command

use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::cli::{DiffArgs, OutputFormat};
use nudiff::ops::compare_versions;
use nudiff::format_report;

pub async fn execute(
    args: DiffArgs,
    config: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let registry = super::client(config)?;

    let result = compare_versions(&registry, &args.package, &args.from, &args.to, cancel).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print!("{}", format_report(&result)),
    }

    Ok(())
}
