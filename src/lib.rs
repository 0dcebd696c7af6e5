//! nudiff - NuGet package API-surface extraction and version diffing
//!
//! This crate downloads two published versions of a NuGet package, parses
//! the raw ECMA-335 metadata of their modules without executing any code,
//! and computes a structural diff classifying changes as breaking,
//! additive, or advisory.

pub mod archive;
pub mod core;
pub mod decompile;
pub mod diff;
pub mod error;
pub mod extract;
pub mod metadata;
pub mod ops;
pub mod registry;
pub mod util;

pub use self::core::{ChangeSet, DiffResult, MethodSurface, PackageId, TypeKind, TypeSurface};

pub use diff::report::format_report;
pub use error::{Error, Result};
pub use ops::{compare_versions, decompile as decompile_package, extract_surface};
pub use registry::{NuGetClient, RegistryClient};
pub use util::Config;
