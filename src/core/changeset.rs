//! Change-set accumulator and the immutable diff result.
//!
//! Buckets are independent evidence, never a partition: one type may
//! contribute a namespace change, an interface removal, and a deprecation
//! in the same run. Entries keep insertion order from the diff engine and
//! are never deduplicated across buckets.

use serde::{Deserialize, Serialize};

use crate::core::package_id::PackageId;

/// The structured outcome of comparing two surfaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChangeSet {
    pub removed_types: Vec<String>,
    pub added_types: Vec<String>,

    /// Entries are `Type.FullName.signature` strings.
    pub removed_methods: Vec<String>,
    pub added_methods: Vec<String>,

    /// Entries are `Type.FullName.PropertyName`.
    pub removed_properties: Vec<String>,
    pub added_properties: Vec<String>,

    /// Entries are `Type.FullName: InterfaceName`.
    pub removed_interfaces: Vec<String>,
    pub added_interfaces: Vec<String>,

    /// Entries are `Type.FullName: OldBase -> NewBase`.
    pub base_class_changes: Vec<String>,

    pub obsolete_types: Vec<String>,
    pub obsolete_methods: Vec<String>,

    /// Entries are `Type.FullName: Name -> NameAsync`.
    pub async_migrations: Vec<String>,

    /// Probably-breaking advisory entries, `old-namespace -> new-namespace`.
    pub namespace_changes: Vec<String>,

    /// True iff the classified archive contained zero managed modules.
    pub is_meta_package: bool,

    /// Declared dependency ids; populated only for meta-packages.
    pub meta_dependencies: Vec<String>,

    /// Advisory: set when recoverable failures reduced coverage. Never
    /// replaces the partial results that were still produced.
    pub comparison_error: Option<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    /// True iff any removal, base-class-change, or async-migration bucket
    /// is non-empty. Namespace changes are advisory and deliberately not
    /// counted here.
    pub fn has_breaking_changes(&self) -> bool {
        !self.removed_types.is_empty()
            || !self.removed_methods.is_empty()
            || !self.removed_properties.is_empty()
            || !self.removed_interfaces.is_empty()
            || !self.base_class_changes.is_empty()
            || !self.async_migrations.is_empty()
    }

    /// True iff any addition bucket is non-empty.
    pub fn has_additions(&self) -> bool {
        !self.added_types.is_empty()
            || !self.added_methods.is_empty()
            || !self.added_properties.is_empty()
            || !self.added_interfaces.is_empty()
    }

    /// True iff any deprecation bucket is non-empty.
    pub fn has_deprecations(&self) -> bool {
        !self.obsolete_types.is_empty() || !self.obsolete_methods.is_empty()
    }

    /// Whether every bucket is empty (meta-package status aside).
    pub fn is_empty(&self) -> bool {
        !self.has_breaking_changes()
            && !self.has_additions()
            && !self.has_deprecations()
            && self.namespace_changes.is_empty()
            && self.meta_dependencies.is_empty()
    }
}

/// Immutable result of one version comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub package_id: String,
    pub from_version: String,
    pub to_version: String,
    pub changes: ChangeSet,
}

impl DiffResult {
    pub fn new(from: &PackageId, to: &PackageId, changes: ChangeSet) -> Self {
        DiffResult {
            package_id: from.id().to_string(),
            from_version: from.version().to_string(),
            to_version: to.version().to_string(),
            changes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_changeset_flags() {
        let cs = ChangeSet::new();
        assert!(!cs.has_breaking_changes());
        assert!(!cs.has_additions());
        assert!(!cs.has_deprecations());
        assert!(cs.is_empty());
    }

    #[test]
    fn test_breaking_flag_per_bucket() {
        for bucket in 0..6 {
            let mut cs = ChangeSet::new();
            let entry = "X".to_string();
            match bucket {
                0 => cs.removed_types.push(entry),
                1 => cs.removed_methods.push(entry),
                2 => cs.removed_properties.push(entry),
                3 => cs.removed_interfaces.push(entry),
                4 => cs.base_class_changes.push(entry),
                _ => cs.async_migrations.push(entry),
            }
            assert!(cs.has_breaking_changes(), "bucket {bucket}");
            assert!(!cs.has_additions());
        }
    }

    #[test]
    fn test_namespace_changes_are_advisory() {
        let mut cs = ChangeSet::new();
        cs.namespace_changes.push("A -> B".to_string());
        assert!(!cs.has_breaking_changes());
        assert!(!cs.is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut cs = ChangeSet::new();
        cs.removed_types.push("Pkg.Widget".to_string());
        cs.added_types.push("Pkg.Gadget".to_string());
        cs.comparison_error = Some("partial".to_string());

        let json = serde_json::to_string(&cs).unwrap();
        let back: ChangeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(cs, back);
    }
}
