//! Caller-facing operations.
//!
//! Each operation is self-contained: it downloads what it needs, builds
//! a fresh metadata context in a per-call scratch directory, copies every
//! fact out, and tears everything down before returning. There is no
//! cross-call cache; the registry is the source of truth and calls are
//! rare relative to their cost.
//!
//! The two extractions of a version comparison are independent and run
//! concurrently. All operations take a cancellation token, checked at
//! download boundaries and between module iterations.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::core::{ChangeSet, DiffResult, PackageId, TypeSurface};
use crate::decompile::{Decompiler, OutlineDecompiler};
use crate::diff::diff_surfaces;
use crate::error::{Error, MetadataError, RegistryError, Result};
use crate::extract::extract_types;
use crate::metadata::MetadataContext;
use crate::registry::RegistryClient;
use crate::util::ScratchDir;

/// Outcome of [`extract_surface`].
#[derive(Debug, Serialize)]
pub struct SurfaceExtraction {
    pub package_id: String,
    pub version: String,

    /// True when the package ships no code modules at all.
    pub is_meta_package: bool,

    pub types: Vec<TypeSurface>,

    /// Advisory note when recoverable failures reduced coverage.
    pub warning: Option<String>,
}

/// One version's extraction outcome, shared by all operations.
struct ExtractedVersion {
    types: Vec<TypeSurface>,
    candidate_count: usize,
    /// Declared dependency ids; read only when no modules qualified.
    dependencies: Vec<String>,
    warnings: Vec<String>,
}

impl ExtractedVersion {
    fn is_meta_package(&self) -> bool {
        self.candidate_count == 0
    }

    fn warning(&self) -> Option<String> {
        if self.warnings.is_empty() {
            None
        } else {
            Some(self.warnings.join("; "))
        }
    }
}

async fn fetch_and_extract(
    registry: &dyn RegistryClient,
    package: &PackageId,
    include_non_public: bool,
    cancel: &CancellationToken,
) -> Result<ExtractedVersion> {
    let bytes = registry.download_package(package).await?;
    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    // Scratch lives exactly as long as this call; modules are parsed and
    // flattened before it drops.
    let scratch = ScratchDir::new()?;
    let candidates = archive::extract_modules(&bytes, scratch.path())?;

    if candidates.is_empty() {
        let dependencies = archive::read_manifest_dependencies(&bytes)?;
        tracing::info!(
            "{} is a meta-package with {} dependencies",
            package,
            dependencies.len()
        );
        return Ok(ExtractedVersion {
            types: Vec::new(),
            candidate_count: 0,
            dependencies,
            warnings: Vec::new(),
        });
    }

    let paths: Vec<std::path::PathBuf> = candidates.iter().map(|c| c.path.clone()).collect();
    let context = MetadataContext::open(&paths, cancel).map_err(|e| match e {
        MetadataError::Cancelled => Error::Cancelled,
        other => Error::Metadata(other),
    })?;

    if context.is_empty() {
        return Err(Error::NoLoadableModules {
            id: package.id().to_string(),
            version: package.version().to_string(),
            candidates: candidates.len(),
        });
    }

    let types = extract_types(&context, include_non_public);
    tracing::info!(
        "extracted {} types from {} modules of {}",
        types.len(),
        context.modules().len(),
        package
    );

    Ok(ExtractedVersion {
        types,
        candidate_count: candidates.len(),
        dependencies: Vec::new(),
        warnings: context.skipped().to_vec(),
    })
}

/// Extract the API surface of one package version.
pub async fn extract_surface(
    registry: &dyn RegistryClient,
    package: &PackageId,
    include_non_public: bool,
    cancel: &CancellationToken,
) -> Result<SurfaceExtraction> {
    let extracted = fetch_and_extract(registry, package, include_non_public, cancel).await?;
    Ok(SurfaceExtraction {
        package_id: package.id().to_string(),
        version: package.version().to_string(),
        is_meta_package: extracted.is_meta_package(),
        warning: extracted.warning(),
        types: extracted.types,
    })
}

/// A side that fails on transport or IO degrades to `None` with an
/// advisory note instead of aborting the comparison. A missing version,
/// cancellation, and a code package whose modules all fail to load stay
/// fatal.
fn absorb_failure(
    side: Result<ExtractedVersion>,
    package: &PackageId,
    warnings: &mut Vec<String>,
) -> Result<Option<ExtractedVersion>> {
    match side {
        Ok(extracted) => Ok(Some(extracted)),
        Err(
            e @ (Error::Registry(RegistryError::NotFound { .. })
            | Error::Cancelled
            | Error::NoLoadableModules { .. }),
        ) => Err(e),
        Err(e) => {
            tracing::warn!("extraction of {} failed: {}", package, e);
            warnings.push(format!("{}: {}", package, e));
            Ok(None)
        }
    }
}

/// Compare two versions of a package into a [`DiffResult`].
///
/// The upgrade target decides meta-package classification: when the new
/// version ships no code modules the diff short-circuits to its declared
/// dependencies instead of reporting every type as removed.
pub async fn compare_versions(
    registry: &dyn RegistryClient,
    id: &str,
    from_version: &str,
    to_version: &str,
    cancel: &CancellationToken,
) -> Result<DiffResult> {
    let from = PackageId::new(id, from_version);
    let to = PackageId::new(id, to_version);

    let (old, new) = tokio::join!(
        fetch_and_extract(registry, &from, false, cancel),
        fetch_and_extract(registry, &to, false, cancel),
    );

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let mut warnings: Vec<String> = Vec::new();
    let old = absorb_failure(old, &from, &mut warnings)?;
    let new = absorb_failure(new, &to, &mut warnings)?;

    let mut changes = match (&old, &new) {
        (_, Some(new)) if new.is_meta_package() => {
            let mut changes = ChangeSet::new();
            changes.is_meta_package = true;
            changes.meta_dependencies = new.dependencies.clone();
            changes
        }
        (Some(old), Some(new)) => diff_surfaces(&old.types, &new.types),
        // A side that never arrived yields no evidence; report only the
        // advisory error, not a fabricated removal or addition of every
        // type on the surviving side.
        _ => ChangeSet::new(),
    };

    if let Some(old) = old {
        warnings.extend(old.warnings);
    }
    if let Some(new) = new {
        warnings.extend(new.warnings);
    }
    if !warnings.is_empty() {
        changes.comparison_error = Some(warnings.join("; "));
    }

    Ok(DiffResult::new(&from, &to, changes))
}

/// Render a source-like outline for a package version, optionally
/// narrowed to one type. Never on the diff path.
pub async fn decompile(
    registry: &dyn RegistryClient,
    package: &PackageId,
    type_name: Option<&str>,
    cancel: &CancellationToken,
) -> Result<String> {
    let extracted = fetch_and_extract(registry, package, false, cancel).await?;
    OutlineDecompiler.render(&extracted.types, type_name)
}
