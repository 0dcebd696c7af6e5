//! Metadata loading - an isolated introspection context per package version.
//!
//! Each version's modules are parsed as raw ECMA-335 metadata, so the
//! "resolution universe" is exactly the closed module set plus textual
//! references to the platform baseline (`System.*` names resolve to their
//! spelled-out names, never to live host types). Nothing is executed and
//! no handle escapes: the surface extractor copies every fact into plain
//! data before the context is dropped.
//!
//! A module that fails to parse is skipped and recorded, yielding a
//! partial context; only cancellation aborts the whole load.

pub mod pe;
pub mod signature;
pub mod streams;
pub mod tables;

#[cfg(test)]
pub(crate) mod test_fixtures;

use std::cell::RefCell;
use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::error::MetadataError;
use signature::TypeNameLookup;
use streams::{heap_blob, heap_string};
use tables::{Coded, Table, TableDirectory};

/// TypeDef visibility mask and values (ECMA-335 II.23.1.15).
const VISIBILITY_MASK: u32 = 0x7;
const VIS_PUBLIC: u32 = 0x1;
const VIS_NESTED_PUBLIC: u32 = 0x2;
const SEMANTICS_INTERFACE: u32 = 0x20;

/// Method flags.
const METHOD_STATIC: u16 = 0x0010;
const METHOD_SPECIAL_NAME: u16 = 0x0800;
const METHOD_ACCESS_MASK: u16 = 0x0007;
const METHOD_PUBLIC: u16 = 0x0006;

/// One successfully parsed module. Owns its metadata bytes; all lookups
/// are offset-based so the struct carries no self-references.
pub struct LoadedModule {
    file_name: String,
    md: Vec<u8>,
    strings: Range<usize>,
    blobs: Range<usize>,
    tables_range: Range<usize>,
    directory: TableDirectory,
    /// Nested TypeDef row -> enclosing TypeDef row.
    nested: HashMap<u32, u32>,
    /// Guards against cyclic TypeSpec blobs during name resolution.
    spec_guard: RefCell<Vec<u32>>,
}

impl LoadedModule {
    /// Parse a module from its on-disk image.
    pub fn open(path: &Path) -> Result<LoadedModule, MetadataError> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let image = std::fs::read(path)?;
        Self::from_image(file_name, &image)
    }

    /// Parse a module from raw image bytes.
    pub fn from_image(file_name: String, image: &[u8]) -> Result<LoadedModule, MetadataError> {
        let md = pe::metadata_slice(image)?.to_vec();
        let dir = streams::parse_root(&md)?;

        let tables_range = dir.tables.ok_or(MetadataError::MissingStream("#~"))?;
        let strings = dir.strings.ok_or(MetadataError::MissingStream("#Strings"))?;
        let blobs = dir.blobs.unwrap_or(0..0);

        let directory = TableDirectory::parse(&md[tables_range.clone()])?;

        let mut module = LoadedModule {
            file_name,
            md,
            strings,
            blobs,
            tables_range,
            directory,
            nested: HashMap::new(),
            spec_guard: RefCell::new(Vec::new()),
        };

        let mut nested = HashMap::new();
        for row in 1..=module.row_count(Table::NestedClass) {
            if let (Some(inner), Some(outer)) = (
                module.cell(Table::NestedClass, row, 0),
                module.cell(Table::NestedClass, row, 1),
            ) {
                nested.insert(inner, outer);
            }
        }
        module.nested = nested;

        Ok(module)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn row_count(&self, table: Table) -> u32 {
        self.directory.row_count(table)
    }

    pub fn cell(&self, table: Table, row: u32, col: usize) -> Option<u32> {
        self.directory
            .cell(&self.md[self.tables_range.clone()], table, row, col)
    }

    pub fn string(&self, offset: u32) -> &str {
        heap_string(&self.md[self.strings.clone()], offset)
    }

    pub fn blob(&self, offset: u32) -> Option<&[u8]> {
        heap_blob(&self.md[self.blobs.clone()], offset)
    }

    /// Fully-qualified TypeDef name: `Namespace.Name`, `Outer+Nested` for
    /// nested types.
    pub fn type_def_full_name(&self, row: u32) -> String {
        let mut chain = vec![row];
        let mut current = row;
        // Nesting chains are short; the cap only guards corrupt cycles.
        while let Some(&outer) = self.nested.get(&current) {
            if chain.len() > 64 || chain.contains(&outer) {
                break;
            }
            chain.push(outer);
            current = outer;
        }

        let mut parts = Vec::with_capacity(chain.len());
        for &r in chain.iter().rev() {
            let name = self
                .cell(Table::TypeDef, r, 1)
                .map(|i| self.string(i))
                .unwrap_or("");
            if parts.is_empty() {
                let ns = self
                    .cell(Table::TypeDef, r, 2)
                    .map(|i| self.string(i))
                    .unwrap_or("");
                if ns.is_empty() {
                    parts.push(name.to_string());
                } else {
                    parts.push(format!("{}.{}", ns, name));
                }
            } else {
                parts.push(name.to_string());
            }
        }
        parts.join("+")
    }

    /// Fully-qualified TypeRef name, following nested resolution scopes.
    pub fn type_ref_full_name(&self, row: u32) -> Option<String> {
        let name = self.cell(Table::TypeRef, row, 1).map(|i| self.string(i))?;
        let scope = self
            .cell(Table::TypeRef, row, 0)
            .and_then(|v| Coded::ResolutionScope.decode(v));

        if let Some((Table::TypeRef, parent)) = scope {
            if parent != row {
                return Some(format!("{}+{}", self.type_ref_full_name(parent)?, name));
            }
        }

        let ns = self
            .cell(Table::TypeRef, row, 2)
            .map(|i| self.string(i))
            .unwrap_or("");
        if ns.is_empty() {
            Some(name.to_string())
        } else {
            Some(format!("{}.{}", ns, name))
        }
    }

    /// Whether a TypeDef (including its enclosing chain) is public.
    pub fn is_public_type(&self, row: u32) -> bool {
        let Some(flags) = self.cell(Table::TypeDef, row, 0) else {
            return false;
        };
        match flags & VISIBILITY_MASK {
            VIS_PUBLIC => true,
            VIS_NESTED_PUBLIC => self
                .nested
                .get(&row)
                .map(|&outer| outer != row && self.is_public_type(outer))
                .unwrap_or(false),
            _ => false,
        }
    }

    pub fn is_interface(&self, row: u32) -> bool {
        self.cell(Table::TypeDef, row, 0)
            .map(|flags| flags & SEMANTICS_INTERFACE != 0)
            .unwrap_or(false)
    }

    /// MethodDef row range `[start, end)` owned by a TypeDef.
    pub fn method_range(&self, typedef_row: u32) -> Range<u32> {
        self.member_range(typedef_row, 5, Table::MethodDef)
    }

    fn member_range(&self, typedef_row: u32, col: usize, member: Table) -> Range<u32> {
        let start = self.cell(Table::TypeDef, typedef_row, col).unwrap_or(1);
        let end = if typedef_row < self.row_count(Table::TypeDef) {
            self.cell(Table::TypeDef, typedef_row + 1, col)
                .unwrap_or(start)
        } else {
            self.row_count(member) + 1
        };
        start..end.max(start)
    }

    /// TypeDef row owning a MethodDef row.
    pub fn method_owner(&self, method_row: u32) -> Option<u32> {
        (1..=self.row_count(Table::TypeDef))
            .find(|&t| self.method_range(t).contains(&method_row))
    }

    /// Property rows declared by a TypeDef, via PropertyMap.
    pub fn properties_of(&self, typedef_row: u32) -> Vec<u32> {
        let map_count = self.row_count(Table::PropertyMap);
        for map_row in 1..=map_count {
            if self.cell(Table::PropertyMap, map_row, 0) != Some(typedef_row) {
                continue;
            }
            let start = self.cell(Table::PropertyMap, map_row, 1).unwrap_or(1);
            let end = if map_row < map_count {
                self.cell(Table::PropertyMap, map_row + 1, 1).unwrap_or(start)
            } else {
                self.row_count(Table::Property) + 1
            };
            return (start..end.max(start)).collect();
        }
        Vec::new()
    }

    /// Display names of interfaces a TypeDef directly implements.
    pub fn interfaces_of(&self, typedef_row: u32) -> Vec<String> {
        let mut names = Vec::new();
        for row in 1..=self.row_count(Table::InterfaceImpl) {
            if self.cell(Table::InterfaceImpl, row, 0) != Some(typedef_row) {
                continue;
            }
            let resolved = self
                .cell(Table::InterfaceImpl, row, 1)
                .and_then(|v| Coded::TypeDefOrRef.decode(v))
                .and_then(|(table, r)| self.type_name(table, r));
            if let Some(name) = resolved {
                names.push(name);
            }
        }
        names
    }

    /// Base type display name of a TypeDef, if any.
    pub fn base_type_of(&self, typedef_row: u32) -> Option<String> {
        self.cell(Table::TypeDef, typedef_row, 3)
            .and_then(|v| Coded::TypeDefOrRef.decode(v))
            .and_then(|(table, row)| self.type_name(table, row))
    }

    pub fn method_flags(&self, method_row: u32) -> u16 {
        self.cell(Table::MethodDef, method_row, 2)
            .map(|v| v as u16)
            .unwrap_or(0)
    }

    pub fn method_name(&self, method_row: u32) -> &str {
        self.cell(Table::MethodDef, method_row, 3)
            .map(|i| self.string(i))
            .unwrap_or("")
    }

    pub fn method_signature_blob(&self, method_row: u32) -> Option<&[u8]> {
        self.cell(Table::MethodDef, method_row, 4)
            .and_then(|i| self.blob(i))
    }

    pub fn property_name(&self, property_row: u32) -> &str {
        self.cell(Table::Property, property_row, 1)
            .map(|i| self.string(i))
            .unwrap_or("")
    }

    pub fn is_static_method(&self, method_row: u32) -> bool {
        self.method_flags(method_row) & METHOD_STATIC != 0
    }

    pub fn is_public_method(&self, method_row: u32) -> bool {
        self.method_flags(method_row) & METHOD_ACCESS_MASK == METHOD_PUBLIC
    }

    /// Property/event accessors and type initializers surface through
    /// their owning declarations, not as standalone methods.
    pub fn is_accessor_or_ctor(&self, method_row: u32) -> bool {
        let name = self.method_name(method_row);
        if name == ".ctor" || name == ".cctor" || name.starts_with('<') {
            return true;
        }
        self.method_flags(method_row) & METHOD_SPECIAL_NAME != 0
            && (name.starts_with("get_")
                || name.starts_with("set_")
                || name.starts_with("add_")
                || name.starts_with("remove_"))
    }

    /// Deprecation markers, read from raw CustomAttribute rows rather
    /// than any live-type accessor. Returns messages keyed by TypeDef and
    /// MethodDef row; an attribute without a message maps to `""`.
    pub fn obsolete_markers(&self) -> (HashMap<u32, String>, HashMap<u32, String>) {
        let mut types = HashMap::new();
        let mut methods = HashMap::new();

        for row in 1..=self.row_count(Table::CustomAttribute) {
            let parent = self
                .cell(Table::CustomAttribute, row, 0)
                .and_then(|v| Coded::HasCustomAttribute.decode(v));
            let target = match parent {
                Some((Table::TypeDef, r)) => (true, r),
                Some((Table::MethodDef, r)) => (false, r),
                _ => continue,
            };

            let Some(ctor) = self
                .cell(Table::CustomAttribute, row, 1)
                .and_then(|v| Coded::CustomAttributeType.decode(v))
            else {
                continue;
            };
            let Some((attr_type, ctor_sig)) = self.attribute_ctor(ctor) else {
                continue;
            };
            if attr_type != "System.ObsoleteAttribute" {
                continue;
            }

            let message = self
                .cell(Table::CustomAttribute, row, 2)
                .and_then(|i| self.blob(i))
                .map(|value| decode_obsolete_message(value, ctor_sig.as_deref()))
                .unwrap_or_default();

            let (is_type, r) = target;
            if is_type {
                types.entry(r).or_insert(message);
            } else {
                methods.entry(r).or_insert(message);
            }
        }

        (types, methods)
    }

    /// Resolve an attribute constructor to (declaring type name, sig blob).
    fn attribute_ctor(&self, ctor: (Table, u32)) -> Option<(String, Option<Vec<u8>>)> {
        match ctor {
            (Table::MemberRef, row) => {
                let parent = self
                    .cell(Table::MemberRef, row, 0)
                    .and_then(|v| Coded::MemberRefParent.decode(v))?;
                let name = match parent {
                    (Table::TypeRef, r) => self.type_ref_full_name(r)?,
                    (Table::TypeDef, r) => self.type_def_full_name(r),
                    _ => return None,
                };
                let sig = self
                    .cell(Table::MemberRef, row, 2)
                    .and_then(|i| self.blob(i))
                    .map(|b| b.to_vec());
                Some((name, sig))
            }
            (Table::MethodDef, row) => {
                let owner = self.method_owner(row)?;
                let sig = self.method_signature_blob(row).map(|b| b.to_vec());
                Some((self.type_def_full_name(owner), sig))
            }
            _ => None,
        }
    }
}

impl TypeNameLookup for LoadedModule {
    fn type_name(&self, table: Table, row: u32) -> Option<String> {
        match table {
            Table::TypeDef => Some(self.type_def_full_name(row)),
            Table::TypeRef => self.type_ref_full_name(row),
            Table::TypeSpec => {
                if self.spec_guard.borrow().contains(&row) {
                    return None;
                }
                self.spec_guard.borrow_mut().push(row);
                let result = self
                    .cell(Table::TypeSpec, row, 0)
                    .and_then(|i| self.blob(i))
                    .and_then(|b| signature::parse_type_blob(b, self).ok());
                self.spec_guard.borrow_mut().pop();
                result
            }
            _ => None,
        }
    }
}

/// Decode the Obsolete message out of a custom-attribute value blob.
///
/// The ctor signature disambiguates a `()` overload followed by named
/// arguments from a `(string)` overload; when the signature is missing
/// the value is read optimistically and falls back to empty.
fn decode_obsolete_message(value: &[u8], ctor_sig: Option<&[u8]>) -> String {
    // Fixed prolog 0x0001.
    if value.len() < 2 || value[0] != 0x01 || value[1] != 0x00 {
        return String::new();
    }
    if let Some(sig) = ctor_sig {
        if !ctor_first_param_is_string(sig) {
            return String::new();
        }
    } else if value.len() <= 4 {
        return String::new();
    }

    let rest = &value[2..];
    if rest.first() == Some(&0xFF) {
        // Explicit null string.
        return String::new();
    }
    let mut pos = 0usize;
    let Some(len) = streams::read_compressed_u32(rest, &mut pos) else {
        return String::new();
    };
    rest.get(pos..pos + len as usize)
        .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
        .unwrap_or_default()
}

fn ctor_first_param_is_string(sig: &[u8]) -> bool {
    // MethodDefSig: conv byte, param count, return type, then params.
    let mut pos = 1usize;
    let Some(param_count) = streams::read_compressed_u32(sig, &mut pos) else {
        return false;
    };
    if param_count == 0 {
        return false;
    }
    // Return type of a ctor is void, one byte.
    sig.get(pos) == Some(&0x01) && sig.get(pos + 1) == Some(&0x0E)
}

/// A closed set of loaded modules for one package version.
///
/// Valid only for the duration of one extraction call; the caller copies
/// all facts out before dropping it.
pub struct MetadataContext {
    modules: Vec<LoadedModule>,
    skipped: Vec<String>,
}

impl MetadataContext {
    /// Load every parseable module from the given paths, in path order.
    /// Parse failures skip the module; only cancellation aborts.
    pub fn open(
        paths: &[std::path::PathBuf],
        cancel: &CancellationToken,
    ) -> Result<MetadataContext, MetadataError> {
        let mut modules = Vec::with_capacity(paths.len());
        let mut skipped = Vec::new();

        for path in paths {
            if cancel.is_cancelled() {
                return Err(MetadataError::Cancelled);
            }
            match LoadedModule::open(path) {
                Ok(module) => {
                    tracing::debug!("loaded module {}", module.file_name());
                    modules.push(module);
                }
                Err(err) => {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| path.display().to_string());
                    tracing::warn!("skipping module {}: {}", name, err);
                    skipped.push(format!("{}: {}", name, err));
                }
            }
        }

        Ok(MetadataContext { modules, skipped })
    }

    pub fn modules(&self) -> &[LoadedModule] {
        &self.modules
    }

    /// Human-readable reasons for each module that failed to load.
    pub fn skipped(&self) -> &[String] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
