//! Plain-data API surface records.
//!
//! Everything the diff engine needs is flattened into these records while
//! the metadata context is still alive; after extraction they are immutable
//! and carry no handles back into the loaded modules.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What sort of type a [`TypeSurface`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeKind {
    Class,
    Interface,
    Struct,
    Enum,
    Delegate,
}

/// One visible type in one package version.
///
/// `full_name` is unique within an extracted surface; when the same name
/// appears in more than one module of a package, the first module wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSurface {
    /// Fully-qualified name, `Namespace.Name` (`Outer+Nested` for nested).
    pub full_name: String,

    /// Namespace portion, empty for the global namespace.
    pub namespace: String,

    /// Simple name including any generic arity suffix (`List`1`).
    pub name: String,

    pub kind: TypeKind,

    /// Whether the type (and its whole enclosing chain) is public.
    pub is_public: bool,

    /// Full name of the base type, if any. Interfaces and `System.Object`
    /// itself have none.
    pub base_type: Option<String>,

    /// Full names of directly implemented interfaces.
    pub interfaces: BTreeSet<String>,

    /// Message from `System.ObsoleteAttribute`, empty string when the
    /// attribute carries no message. `None` means not obsolete.
    pub obsolete_message: Option<String>,

    pub methods: Vec<MethodSurface>,

    /// Declared property names. Shape (type, accessors) is deliberately
    /// not captured; the diff compares properties by name only.
    pub property_names: BTreeSet<String>,
}

impl TypeSurface {
    /// Whether the type carried a deprecation marker.
    pub fn is_obsolete(&self) -> bool {
        self.obsolete_message.is_some()
    }

    /// Look up a method by exact signature.
    pub fn method(&self, signature: &str) -> Option<&MethodSurface> {
        self.methods.iter().find(|m| m.signature == signature)
    }
}

/// One method on a [`TypeSurface`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSurface {
    pub name: String,

    /// Identity key across versions: `name(paramType, paramType, ...)`.
    /// Return type is intentionally absent, so a change in return type
    /// alone is invisible to the diff. Same-name overloads with different
    /// parameter lists are always distinct.
    pub signature: String,

    /// Rendered return type, kept for the async-shape heuristic and for
    /// outline rendering.
    pub return_type: String,

    pub is_static: bool,

    /// Whether the return type is awaitable-shaped (`Task`, `ValueTask`,
    /// `IAsyncEnumerable`1`).
    pub is_async: bool,

    /// Message from `System.ObsoleteAttribute`; `None` means not obsolete.
    pub obsolete_message: Option<String>,
}

impl MethodSurface {
    pub fn is_obsolete(&self) -> bool {
        self.obsolete_message.is_some()
    }
}

/// Build the cross-version identity signature for a method.
pub fn method_signature(name: &str, parameter_types: &[String]) -> String {
    format!("{}({})", name, parameter_types.join(", "))
}

/// Whether a rendered return type is awaitable-shaped.
///
/// Structural only: a method returning `Task` that was never declared
/// `async` still counts, which is exactly what the migration heuristic
/// wants.
pub fn is_async_shaped(return_type: &str) -> bool {
    return_type == "System.Threading.Tasks.Task"
        || return_type.starts_with("System.Threading.Tasks.Task`")
        || return_type == "System.Threading.Tasks.ValueTask"
        || return_type.starts_with("System.Threading.Tasks.ValueTask`")
        || return_type.starts_with("System.Collections.Generic.IAsyncEnumerable`")
}
