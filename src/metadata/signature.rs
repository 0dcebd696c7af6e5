//! Signature blob decoding (ECMA-335 II.23.2).
//!
//! Renders parameter and return types as stable, fully-qualified display
//! strings. Fidelity only has to be high enough that the same declaration
//! renders identically across two versions of a package; an exotic
//! construct we cannot decode fails the one member carrying it, never the
//! whole type.

use thiserror::Error;

use crate::metadata::streams::read_compressed_u32;
use crate::metadata::tables::Table;

/// Resolve a `TypeDefOrRef` target to a display name. Implemented by the
/// loaded module, which resolves purely within its own tables.
pub trait TypeNameLookup {
    fn type_name(&self, table: Table, row: u32) -> Option<String>;
}

#[derive(Debug, Error, PartialEq)]
pub enum SigError {
    #[error("signature truncated")]
    Truncated,
    #[error("unsupported element type {0:#04x}")]
    Unsupported(u8),
    #[error("signature recursion limit reached")]
    TooDeep,
    #[error("unresolvable type reference in signature")]
    BadRef,
}

/// A decoded method definition signature.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub has_this: bool,
    pub generic_arity: u32,
    pub return_type: String,
    pub params: Vec<String>,
}

const MAX_DEPTH: u32 = 32;

// Element type constants (ECMA-335 II.23.1.16).
const ELEM_VOID: u8 = 0x01;
const ELEM_PTR: u8 = 0x0F;
const ELEM_BYREF: u8 = 0x10;
const ELEM_VALUETYPE: u8 = 0x11;
const ELEM_CLASS: u8 = 0x12;
const ELEM_VAR: u8 = 0x13;
const ELEM_ARRAY: u8 = 0x14;
const ELEM_GENERICINST: u8 = 0x15;
const ELEM_TYPEDBYREF: u8 = 0x16;
const ELEM_FNPTR: u8 = 0x1B;
const ELEM_SZARRAY: u8 = 0x1D;
const ELEM_MVAR: u8 = 0x1E;
const ELEM_CMOD_REQD: u8 = 0x1F;
const ELEM_CMOD_OPT: u8 = 0x20;
const ELEM_SENTINEL: u8 = 0x41;
const ELEM_PINNED: u8 = 0x45;

const SIG_GENERIC: u8 = 0x10;
const SIG_HASTHIS: u8 = 0x20;

/// Decode a MethodDefSig blob.
pub fn parse_method_sig(blob: &[u8], lookup: &dyn TypeNameLookup) -> Result<MethodSig, SigError> {
    let mut pos = 0usize;
    let conv = next(blob, &mut pos)?;

    let generic_arity = if conv & SIG_GENERIC != 0 {
        compressed(blob, &mut pos)?
    } else {
        0
    };
    let param_count = compressed(blob, &mut pos)?;
    let return_type = parse_type(blob, &mut pos, lookup, 0)?;

    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        // Vararg declarations separate fixed and variable parameters.
        if blob.get(pos) == Some(&ELEM_SENTINEL) {
            pos += 1;
        }
        params.push(parse_type(blob, &mut pos, lookup, 0)?);
    }

    Ok(MethodSig {
        has_this: conv & SIG_HASTHIS != 0,
        generic_arity,
        return_type,
        params,
    })
}

/// Decode a TypeSpec blob into a display name.
pub fn parse_type_blob(blob: &[u8], lookup: &dyn TypeNameLookup) -> Result<String, SigError> {
    let mut pos = 0usize;
    parse_type(blob, &mut pos, lookup, 0)
}

fn parse_type(
    blob: &[u8],
    pos: &mut usize,
    lookup: &dyn TypeNameLookup,
    depth: u32,
) -> Result<String, SigError> {
    if depth > MAX_DEPTH {
        return Err(SigError::TooDeep);
    }

    let elem = next(blob, pos)?;
    if let Some(primitive) = primitive_name(elem) {
        return Ok(primitive.to_string());
    }

    match elem {
        ELEM_PTR => Ok(format!("{}*", parse_type(blob, pos, lookup, depth + 1)?)),
        ELEM_BYREF => Ok(format!("{}&", parse_type(blob, pos, lookup, depth + 1)?)),
        ELEM_SZARRAY => Ok(format!("{}[]", parse_type(blob, pos, lookup, depth + 1)?)),
        ELEM_PINNED => parse_type(blob, pos, lookup, depth + 1),
        ELEM_CMOD_REQD | ELEM_CMOD_OPT => {
            // Custom modifier: consume its type token, then the real type.
            let _ = type_def_or_ref(blob, pos)?;
            parse_type(blob, pos, lookup, depth + 1)
        }
        ELEM_VALUETYPE | ELEM_CLASS => {
            let (table, row) = type_def_or_ref(blob, pos)?;
            lookup.type_name(table, row).ok_or(SigError::BadRef)
        }
        ELEM_VAR => Ok(format!("!{}", compressed(blob, pos)?)),
        ELEM_MVAR => Ok(format!("!!{}", compressed(blob, pos)?)),
        ELEM_GENERICINST => {
            let kind = next(blob, pos)?;
            if kind != ELEM_CLASS && kind != ELEM_VALUETYPE {
                return Err(SigError::Unsupported(kind));
            }
            let (table, row) = type_def_or_ref(blob, pos)?;
            let name = lookup.type_name(table, row).ok_or(SigError::BadRef)?;
            let argc = compressed(blob, pos)?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(parse_type(blob, pos, lookup, depth + 1)?);
            }
            Ok(format!("{}<{}>", name, args.join(", ")))
        }
        ELEM_ARRAY => {
            let inner = parse_type(blob, pos, lookup, depth + 1)?;
            let rank = compressed(blob, pos)?;
            let num_sizes = compressed(blob, pos)?;
            for _ in 0..num_sizes {
                let _ = compressed(blob, pos)?;
            }
            let num_lo_bounds = compressed(blob, pos)?;
            for _ in 0..num_lo_bounds {
                let _ = compressed(blob, pos)?;
            }
            let commas = ",".repeat(rank.saturating_sub(1) as usize);
            Ok(format!("{}[{}]", inner, commas))
        }
        ELEM_FNPTR => {
            // Consume the nested method signature; the rendered form does
            // not try to reproduce it.
            let _ = parse_nested_method(blob, pos, lookup, depth + 1)?;
            Ok("fnptr".to_string())
        }
        other => Err(SigError::Unsupported(other)),
    }
}

fn parse_nested_method(
    blob: &[u8],
    pos: &mut usize,
    lookup: &dyn TypeNameLookup,
    depth: u32,
) -> Result<(), SigError> {
    let conv = next(blob, pos)?;
    if conv & SIG_GENERIC != 0 {
        let _ = compressed(blob, pos)?;
    }
    let param_count = compressed(blob, pos)?;
    let _ = parse_type(blob, pos, lookup, depth)?;
    for _ in 0..param_count {
        if blob.get(*pos) == Some(&ELEM_SENTINEL) {
            *pos += 1;
        }
        let _ = parse_type(blob, pos, lookup, depth)?;
    }
    Ok(())
}

fn type_def_or_ref(blob: &[u8], pos: &mut usize) -> Result<(Table, u32), SigError> {
    let encoded = compressed(blob, pos)?;
    let row = encoded >> 2;
    if row == 0 {
        return Err(SigError::BadRef);
    }
    let table = match encoded & 0x3 {
        0 => Table::TypeDef,
        1 => Table::TypeRef,
        2 => Table::TypeSpec,
        _ => return Err(SigError::BadRef),
    };
    Ok((table, row))
}

fn primitive_name(elem: u8) -> Option<&'static str> {
    Some(match elem {
        ELEM_VOID => "System.Void",
        0x02 => "System.Boolean",
        0x03 => "System.Char",
        0x04 => "System.SByte",
        0x05 => "System.Byte",
        0x06 => "System.Int16",
        0x07 => "System.UInt16",
        0x08 => "System.Int32",
        0x09 => "System.UInt32",
        0x0A => "System.Int64",
        0x0B => "System.UInt64",
        0x0C => "System.Single",
        0x0D => "System.Double",
        0x0E => "System.String",
        ELEM_TYPEDBYREF => "System.TypedReference",
        0x18 => "System.IntPtr",
        0x19 => "System.UIntPtr",
        0x1C => "System.Object",
        _ => return None,
    })
}

fn next(blob: &[u8], pos: &mut usize) -> Result<u8, SigError> {
    let b = *blob.get(*pos).ok_or(SigError::Truncated)?;
    *pos += 1;
    Ok(b)
}

fn compressed(blob: &[u8], pos: &mut usize) -> Result<u32, SigError> {
    read_compressed_u32(blob, pos).ok_or(SigError::Truncated)
}
