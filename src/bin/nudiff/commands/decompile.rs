//! `nudiff decompile` command

use std::path::Path;

use anyhow::Result;
use tokio_util::sync::CancellationToken;

use crate::cli::DecompileArgs;
use nudiff::ops::decompile;
use nudiff::PackageId;

pub async fn execute(
    args: DecompileArgs,
    config: Option<&Path>,
    cancel: &CancellationToken,
) -> Result<()> {
    let registry = super::client(config)?;
    let package = PackageId::new(args.package, args.version);

    let outline = decompile(&registry, &package, args.type_name.as_deref(), cancel).await?;
    print!("{}", outline);

    Ok(())
}
