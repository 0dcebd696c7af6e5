//! Command implementations.

pub mod decompile;
pub mod diff;
pub mod surface;

use std::path::{Path, PathBuf};

use anyhow::Result;

use nudiff::{Config, NuGetClient};

/// Build a registry client from configuration. A missing config file is
/// fine; defaults point at nuget.org.
pub(crate) fn client(config_path: Option<&Path>) -> Result<NuGetClient> {
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("nudiff.toml"));
    let config = Config::load_or_default(&path);
    NuGetClient::new(&config)
}
