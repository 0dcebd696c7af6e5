//! Human-readable rendering of a diff result.
//!
//! Output is stable: sections appear in a fixed order, lists keep the
//! diff engine's insertion order and are never re-sorted, and long lists
//! truncate with an explicit overflow suffix.

use std::fmt::Write;

use crate::core::DiffResult;

/// Per-bucket display cap inside the change sections.
const BUCKET_LIMIT: usize = 10;

/// Display cap for meta-package dependency listings.
const DEPENDENCY_LIMIT: usize = 20;

/// Render a [`DiffResult`] as plain text.
pub fn format_report(result: &DiffResult) -> String {
    let changes = &result.changes;
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{}: {} -> {}",
        result.package_id, result.from_version, result.to_version
    );

    if changes.is_empty() && !changes.is_meta_package {
        let _ = writeln!(out, "\nNo API changes detected.");
    }

    if changes.has_breaking_changes() {
        let _ = writeln!(out, "\nBreaking Changes");
        bucket(&mut out, "Removed types", &changes.removed_types, BUCKET_LIMIT);
        bucket(&mut out, "Removed methods", &changes.removed_methods, BUCKET_LIMIT);
        bucket(&mut out, "Removed properties", &changes.removed_properties, BUCKET_LIMIT);
        bucket(&mut out, "Removed interfaces", &changes.removed_interfaces, BUCKET_LIMIT);
        bucket(&mut out, "Base class changes", &changes.base_class_changes, BUCKET_LIMIT);
        bucket(&mut out, "Sync to async migrations", &changes.async_migrations, BUCKET_LIMIT);
    }

    if changes.has_deprecations() {
        let _ = writeln!(out, "\nDeprecations");
        bucket(&mut out, "Obsolete types", &changes.obsolete_types, BUCKET_LIMIT);
        bucket(&mut out, "Obsolete methods", &changes.obsolete_methods, BUCKET_LIMIT);
    }

    if changes.has_additions() {
        let _ = writeln!(out, "\nNew Features");
        bucket(&mut out, "Added types", &changes.added_types, BUCKET_LIMIT);
        bucket(&mut out, "Added methods", &changes.added_methods, BUCKET_LIMIT);
        bucket(&mut out, "Added properties", &changes.added_properties, BUCKET_LIMIT);
        bucket(&mut out, "Added interfaces", &changes.added_interfaces, BUCKET_LIMIT);
    }

    if !changes.namespace_changes.is_empty() {
        let _ = writeln!(out, "\nNamespace Changes (probably breaking)");
        bucket(&mut out, "Moved namespaces", &changes.namespace_changes, BUCKET_LIMIT);
    }

    if changes.is_meta_package {
        let _ = writeln!(out, "\nMeta-Package");
        let _ = writeln!(
            out,
            "This package contains no code modules; it only declares dependencies."
        );
        bucket(&mut out, "Dependencies", &changes.meta_dependencies, DEPENDENCY_LIMIT);
    }

    if let Some(error) = &changes.comparison_error {
        let _ = writeln!(out, "\nWarning: comparison was partial: {}", error);
    }

    out
}

fn bucket(out: &mut String, title: &str, entries: &[String], limit: usize) {
    if entries.is_empty() {
        return;
    }
    let _ = writeln!(out, "  {} ({}):", title, entries.len());
    for entry in entries.iter().take(limit) {
        let _ = writeln!(out, "    - {}", entry);
    }
    if entries.len() > limit {
        let extra = entries.len() - limit;
        if extra == 1 {
            let _ = writeln!(out, "    ... and 1 more entry");
        } else {
            let _ = writeln!(out, "    ... and {} more entries", extra);
        }
    }
}
