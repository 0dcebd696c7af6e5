//! Package registry access.
//!
//! The operations layer only depends on the [`RegistryClient`] trait, so
//! tests substitute an in-memory registry and never touch the network.

pub mod nuget;

pub use nuget::NuGetClient;

use async_trait::async_trait;

use crate::core::PackageId;
use crate::error::RegistryError;

/// Resolves a package identity to raw archive bytes.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Download the full package archive. The archive is buffered in
    /// memory; registry packages are small relative to available memory.
    async fn download_package(&self, package: &PackageId) -> Result<Vec<u8>, RegistryError>;
}
