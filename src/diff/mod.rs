//! Structural diff over two extracted surfaces.
//!
//! Pure and synchronous: both inputs are plain data, so the comparison
//! itself does no I/O and needs no cancellation points. Buckets collect
//! independent evidence; the same type may contribute entries to several
//! buckets in one run and nothing is deduplicated across buckets.

pub mod report;

use std::collections::{HashMap, HashSet};

use crate::core::{ChangeSet, MethodSurface, TypeSurface};

/// Compare the `old` surface against `new` into a fresh [`ChangeSet`].
///
/// Entry order follows input order, so deterministic extraction gives
/// reproducible diffs.
pub fn diff_surfaces(old: &[TypeSurface], new: &[TypeSurface]) -> ChangeSet {
    let mut changes = ChangeSet::new();

    let old_by_name: HashMap<&str, &TypeSurface> =
        old.iter().map(|t| (t.full_name.as_str(), t)).collect();
    let new_by_name: HashMap<&str, &TypeSurface> =
        new.iter().map(|t| (t.full_name.as_str(), t)).collect();

    let mut removed: Vec<&TypeSurface> = Vec::new();
    for ty in old {
        match new_by_name.get(ty.full_name.as_str()) {
            // Removed wholesale: member-level comparison would only echo
            // the type removal.
            None => {
                changes.removed_types.push(ty.full_name.clone());
                removed.push(ty);
            }
            Some(counterpart) => diff_type(ty, counterpart, &mut changes),
        }
    }

    let mut added: Vec<&TypeSurface> = Vec::new();
    for ty in new {
        if !old_by_name.contains_key(ty.full_name.as_str()) {
            changes.added_types.push(ty.full_name.clone());
            added.push(ty);
        }
    }

    // A removed type reappearing under another namespace is advisory
    // evidence of a namespace move; the removal and addition above stand.
    for r in &removed {
        if let Some(moved) = added
            .iter()
            .find(|a| a.name == r.name && a.namespace != r.namespace)
        {
            let entry = format!("{} -> {}", r.namespace, moved.namespace);
            if !changes.namespace_changes.contains(&entry) {
                changes.namespace_changes.push(entry);
            }
        }
    }

    changes
}

fn diff_type(old: &TypeSurface, new: &TypeSurface, changes: &mut ChangeSet) {
    for iface in old.interfaces.difference(&new.interfaces) {
        changes
            .removed_interfaces
            .push(format!("{}: {}", old.full_name, iface));
    }
    for iface in new.interfaces.difference(&old.interfaces) {
        changes
            .added_interfaces
            .push(format!("{}: {}", old.full_name, iface));
    }

    if let (Some(old_base), Some(new_base)) = (&old.base_type, &new.base_type) {
        if old_base != new_base {
            changes
                .base_class_changes
                .push(format!("{}: {} -> {}", old.full_name, old_base, new_base));
        }
    }

    let old_sigs: HashSet<&str> = old.methods.iter().map(|m| m.signature.as_str()).collect();
    let new_sigs: HashSet<&str> = new.methods.iter().map(|m| m.signature.as_str()).collect();

    // Names consumed by a migration entry; their Async counterparts are
    // not reported again as plain additions.
    let mut migrated: HashSet<String> = HashSet::new();

    for method in &old.methods {
        if new_sigs.contains(method.signature.as_str()) {
            continue;
        }
        if let Some(counterpart) = async_counterpart(method, &new.methods) {
            changes.async_migrations.push(format!(
                "{}: {} -> {}",
                old.full_name, method.name, counterpart.name
            ));
            migrated.insert(counterpart.name.clone());
        } else {
            changes
                .removed_methods
                .push(format!("{}.{}", old.full_name, method.signature));
        }
    }

    for method in &new.methods {
        if old_sigs.contains(method.signature.as_str()) {
            continue;
        }
        if migrated.contains(&method.name) {
            continue;
        }
        changes
            .added_methods
            .push(format!("{}.{}", old.full_name, method.signature));
    }

    for prop in old.property_names.difference(&new.property_names) {
        changes
            .removed_properties
            .push(format!("{}.{}", old.full_name, prop));
    }
    for prop in new.property_names.difference(&old.property_names) {
        changes
            .added_properties
            .push(format!("{}.{}", old.full_name, prop));
    }

    // Deprecations are reported off the new surface whether or not the
    // shape changed.
    if let Some(message) = &new.obsolete_message {
        changes
            .obsolete_types
            .push(obsolete_entry(&new.full_name, message));
    }
    for method in &new.methods {
        if let Some(message) = &method.obsolete_message {
            changes.obsolete_methods.push(obsolete_entry(
                &format!("{}.{}", new.full_name, method.signature),
                message,
            ));
        }
    }
}

fn obsolete_entry(subject: &str, message: &str) -> String {
    if message.is_empty() {
        subject.to_string()
    } else {
        format!("{}: {}", subject, message)
    }
}

/// The sync-to-async migration heuristic, kept as one pure function so it
/// can be tuned without touching the rest of the engine.
///
/// A removed non-async method matches any new method named `{name}Async`
/// whose return type is awaitable-shaped, regardless of parameter list.
/// Best effort; false positives are acceptable.
pub fn async_counterpart<'a>(
    removed: &MethodSurface,
    candidates: &'a [MethodSurface],
) -> Option<&'a MethodSurface> {
    if removed.is_async {
        return None;
    }
    let wanted = format!("{}Async", removed.name);
    candidates.iter().find(|m| m.name == wanted && m.is_async)
}
