//! `nudiff surface` command

use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::cli::{OutputFormat, SurfaceArgs};
use nudiff::ops::extract_surface;
use nudiff::PackageId;

pub async fn execute(
    args: SurfaceArgs,
    config: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let registry = super::client(config)?;
    let package = PackageId::new(args.package, args.version);

    let surface = extract_surface(&registry, &package, args.include_non_public, cancel).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&surface)?),
        OutputFormat::Text => {
            if surface.is_meta_package {
                println!("{} is a meta-package with no code modules", package);
            } else {
                println!("{}: {} types", package, surface.types.len());
                for ty in &surface.types {
                    let marker = if ty.is_obsolete() { " [obsolete]" } else { "" };
                    println!("  {:?} {}{}", ty.kind, ty.full_name, marker);
                }
            }
            if let Some(warning) = &surface.warning {
                println!("\nWarning: partial surface: {}", warning);
            }
        }
    }

    Ok(())
}
