//! Error taxonomy for the extraction and diffing pipeline.
//!
//! Only two conditions are fatal to a whole request: the registry not
//! knowing the requested package/version, and a non-meta-package where no
//! module could be loaded at all. Everything below that granularity is
//! recovered and surfaced as an advisory `comparison_error` on the result.

use thiserror::Error;

/// Result alias for the operations layer.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures talking to the package registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The (id, version) pair does not exist at the registry.
    #[error("package `{id}` version `{version}` not found in registry")]
    NotFound { id: String, version: String },

    /// Transport-level failure (DNS, connect, timeout, mid-body abort).
    #[error("network failure downloading `{id}` {version}")]
    Network {
        id: String,
        version: String,
        #[source]
        source: reqwest::Error,
    },

    /// Registry answered, but not with the package.
    #[error("registry returned HTTP {status} for `{id}` {version}")]
    Http {
        id: String,
        version: String,
        status: u16,
    },
}

impl RegistryError {
    /// Whether this failure means the package simply does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

/// Failures reading the package archive container.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("package archive is not a valid zip container")]
    BadContainer(#[source] zip::result::ZipError),

    #[error("archive entry `{0}` not found")]
    EntryNotFound(String),

    #[error("failed to read archive entry `{entry}`")]
    EntryRead {
        entry: String,
        #[source]
        source: std::io::Error,
    },

    #[error("package has no .nuspec manifest")]
    MissingManifest,

    #[error("malformed .nuspec manifest: {0}")]
    BadManifest(String),

    #[error("failed to write extracted module `{path}`")]
    ScratchWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures parsing a single managed module's metadata.
///
/// These are always recovered at module granularity: a module that fails to
/// parse is skipped and logged, never fatal to the extraction.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read module file")]
    Io(#[from] std::io::Error),

    #[error("not a PE image: {0}")]
    NotPe(&'static str),

    #[error("PE image has no CLI header (not a managed module)")]
    NotManaged,

    #[error("image truncated while reading {0}")]
    Truncated(&'static str),

    #[error("RVA {0:#x} maps to no section")]
    BadRva(u32),

    #[error("malformed metadata root: {0}")]
    BadRoot(&'static str),

    #[error("metadata stream `{0}` missing")]
    MissingStream(&'static str),

    #[error("metadata tables contain unknown table {0:#x}")]
    UnknownTable(u8),

    #[error("malformed metadata table heap: {0}")]
    BadTables(&'static str),

    #[error("operation cancelled")]
    Cancelled,
}

/// Top-level error for the caller-facing operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// A non-meta-package whose modules all failed to load. A package with
    /// zero candidate modules is a meta-package, not an error.
    #[error("no loadable modules in `{id}` {version} ({candidates} candidates, all failed)")]
    NoLoadableModules {
        id: String,
        version: String,
        candidates: usize,
    },

    #[error("type `{0}` not found in package")]
    TypeNotFound(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("scratch directory setup failed")]
    Scratch(#[source] std::io::Error),

    /// Escapes only for cancellation; ordinary module parse failures are
    /// absorbed at module granularity inside the extraction loop.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}
