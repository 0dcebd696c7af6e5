//! Auxiliary outline rendering, off the diff path.
//!
//! Renders extracted surfaces as a C#-like declaration outline. This is
//! a readability aid over the same structural facts the diff consumes,
//! not a real decompilation of method bodies.

use std::fmt::Write;

use crate::core::{TypeKind, TypeSurface};
use crate::error::Error;

/// Renders surfaces to source-like text.
pub trait Decompiler {
    /// Render all types, or just the one matching `type_name`.
    fn render(&self, types: &[TypeSurface], type_name: Option<&str>) -> Result<String, Error>;
}

/// Declaration-outline renderer over extracted surfaces.
#[derive(Default)]
pub struct OutlineDecompiler;

impl Decompiler for OutlineDecompiler {
    fn render(&self, types: &[TypeSurface], type_name: Option<&str>) -> Result<String, Error> {
        let selected: Vec<&TypeSurface> = match type_name {
            Some(wanted) => {
                let matched: Vec<&TypeSurface> = types
                    .iter()
                    .filter(|t| t.full_name == wanted || t.name == wanted)
                    .collect();
                if matched.is_empty() {
                    return Err(Error::TypeNotFound(wanted.to_string()));
                }
                matched
            }
            None => types.iter().collect(),
        };

        let mut out = String::new();
        for (i, ty) in selected.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            render_type(&mut out, ty);
        }
        Ok(out)
    }
}

fn render_type(out: &mut String, ty: &TypeSurface) {
    if let Some(message) = &ty.obsolete_message {
        if message.is_empty() {
            let _ = writeln!(out, "[Obsolete]");
        } else {
            let _ = writeln!(out, "[Obsolete(\"{}\")]", message);
        }
    }

    let visibility = if ty.is_public { "public" } else { "internal" };
    let keyword = match ty.kind {
        TypeKind::Class => "class",
        TypeKind::Interface => "interface",
        TypeKind::Struct => "struct",
        TypeKind::Enum => "enum",
        TypeKind::Delegate => "delegate",
    };

    let mut bases: Vec<&str> = Vec::new();
    if let Some(base) = &ty.base_type {
        // System.Object adds nothing to the outline.
        if base != "System.Object" {
            bases.push(base);
        }
    }
    bases.extend(ty.interfaces.iter().map(String::as_str));

    if bases.is_empty() {
        let _ = writeln!(out, "{} {} {}", visibility, keyword, ty.full_name);
    } else {
        let _ = writeln!(
            out,
            "{} {} {} : {}",
            visibility,
            keyword,
            ty.full_name,
            bases.join(", ")
        );
    }
    let _ = writeln!(out, "{{");

    for prop in &ty.property_names {
        let _ = writeln!(out, "    property {};", prop);
    }

    for method in &ty.methods {
        if let Some(message) = &method.obsolete_message {
            if message.is_empty() {
                let _ = writeln!(out, "    [Obsolete]");
            } else {
                let _ = writeln!(out, "    [Obsolete(\"{}\")]", message);
            }
        }
        let modifier = if method.is_static { "static " } else { "" };
        let _ = writeln!(
            out,
            "    {}{} {};",
            modifier, method.return_type, method.signature
        );
    }

    let _ = writeln!(out, "}}");
}
