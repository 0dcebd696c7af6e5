//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// nudiff - inspect and diff NuGet package API surfaces
#[derive(Parser)]
#[command(name = "nudiff")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a nudiff.toml configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract the API surface of one package version
    Surface(SurfaceArgs),

    /// Compare the API surfaces of two package versions
    Diff(DiffArgs),

    /// Render a source-like outline of a package version
    Decompile(DecompileArgs),
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
pub struct SurfaceArgs {
    /// Package id, e.g. Newtonsoft.Json
    pub package: String,

    /// Package version, e.g. 13.0.3
    pub version: String,

    /// Include non-public types and members
    #[arg(long)]
    pub include_non_public: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct DiffArgs {
    /// Package id
    pub package: String,

    /// Version to upgrade from
    pub from: String,

    /// Version to upgrade to
    pub to: String,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Args)]
pub struct DecompileArgs {
    /// Package id
    pub package: String,

    /// Package version
    pub version: String,

    /// Restrict output to one type (full or simple name)
    #[arg(long = "type")]
    pub type_name: Option<String>,
}
