//! Core data model: package identity, surface records, change sets.

pub mod changeset;
pub mod package_id;
pub mod surface;

pub use changeset::{ChangeSet, DiffResult};
pub use package_id::PackageId;
pub use surface::{MethodSurface, TypeKind, TypeSurface};
