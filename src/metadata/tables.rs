//! Physical metadata tables (`#~` stream).
//!
//! Row sizes depend on the whole table directory: heap index widths come
//! from the header's heap-size flags, simple indices widen past 64k rows,
//! and coded indices widen based on the largest member table. Every table
//! the format defines therefore needs a schema here, even the ones the
//! surface extractor never reads, so that byte offsets stay correct.

use crate::error::MetadataError;
use crate::metadata::streams::{read_u16, read_u32, read_u64};

/// Metadata table identifiers (ECMA-335 II.22).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Table {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

pub const TABLE_COUNT: usize = 0x2D;

const ALL_TABLES: [Table; TABLE_COUNT] = [
    Table::Module,
    Table::TypeRef,
    Table::TypeDef,
    Table::FieldPtr,
    Table::Field,
    Table::MethodPtr,
    Table::MethodDef,
    Table::ParamPtr,
    Table::Param,
    Table::InterfaceImpl,
    Table::MemberRef,
    Table::Constant,
    Table::CustomAttribute,
    Table::FieldMarshal,
    Table::DeclSecurity,
    Table::ClassLayout,
    Table::FieldLayout,
    Table::StandAloneSig,
    Table::EventMap,
    Table::EventPtr,
    Table::Event,
    Table::PropertyMap,
    Table::PropertyPtr,
    Table::Property,
    Table::MethodSemantics,
    Table::MethodImpl,
    Table::ModuleRef,
    Table::TypeSpec,
    Table::ImplMap,
    Table::FieldRva,
    Table::EncLog,
    Table::EncMap,
    Table::Assembly,
    Table::AssemblyProcessor,
    Table::AssemblyOs,
    Table::AssemblyRef,
    Table::AssemblyRefProcessor,
    Table::AssemblyRefOs,
    Table::File,
    Table::ExportedType,
    Table::ManifestResource,
    Table::NestedClass,
    Table::GenericParam,
    Table::MethodSpec,
    Table::GenericParamConstraint,
];

impl Table {
    pub fn from_id(id: u8) -> Option<Table> {
        ALL_TABLES.get(id as usize).copied()
    }
}

/// Coded index families (ECMA-335 II.24.2.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl Coded {
    pub fn tag_bits(self) -> u32 {
        match self {
            Coded::HasFieldMarshal
            | Coded::HasSemantics
            | Coded::MethodDefOrRef
            | Coded::MemberForwarded
            | Coded::TypeOrMethodDef => 1,
            Coded::TypeDefOrRef
            | Coded::HasConstant
            | Coded::HasDeclSecurity
            | Coded::Implementation
            | Coded::ResolutionScope => 2,
            Coded::MemberRefParent | Coded::CustomAttributeType => 3,
            Coded::HasCustomAttribute => 5,
        }
    }

    /// Member tables by tag value. `None` marks tags the format reserves.
    pub fn members(self) -> &'static [Option<Table>] {
        match self {
            Coded::TypeDefOrRef => &[
                Some(Table::TypeDef),
                Some(Table::TypeRef),
                Some(Table::TypeSpec),
                None,
            ],
            Coded::HasConstant => &[
                Some(Table::Field),
                Some(Table::Param),
                Some(Table::Property),
                None,
            ],
            Coded::HasCustomAttribute => &[
                Some(Table::MethodDef),
                Some(Table::Field),
                Some(Table::TypeRef),
                Some(Table::TypeDef),
                Some(Table::Param),
                Some(Table::InterfaceImpl),
                Some(Table::MemberRef),
                Some(Table::Module),
                Some(Table::DeclSecurity),
                Some(Table::Property),
                Some(Table::Event),
                Some(Table::StandAloneSig),
                Some(Table::ModuleRef),
                Some(Table::TypeSpec),
                Some(Table::Assembly),
                Some(Table::AssemblyRef),
                Some(Table::File),
                Some(Table::ExportedType),
                Some(Table::ManifestResource),
                Some(Table::GenericParam),
                Some(Table::GenericParamConstraint),
                Some(Table::MethodSpec),
            ],
            Coded::HasFieldMarshal => &[Some(Table::Field), Some(Table::Param)],
            Coded::HasDeclSecurity => &[
                Some(Table::TypeDef),
                Some(Table::MethodDef),
                Some(Table::Assembly),
                None,
            ],
            Coded::MemberRefParent => &[
                Some(Table::TypeDef),
                Some(Table::TypeRef),
                Some(Table::ModuleRef),
                Some(Table::MethodDef),
                Some(Table::TypeSpec),
                None,
                None,
                None,
            ],
            Coded::HasSemantics => &[Some(Table::Event), Some(Table::Property)],
            Coded::MethodDefOrRef => &[Some(Table::MethodDef), Some(Table::MemberRef)],
            Coded::MemberForwarded => &[Some(Table::Field), Some(Table::MethodDef)],
            Coded::Implementation => &[
                Some(Table::File),
                Some(Table::AssemblyRef),
                Some(Table::ExportedType),
                None,
            ],
            Coded::CustomAttributeType => &[
                None,
                None,
                Some(Table::MethodDef),
                Some(Table::MemberRef),
                None,
                None,
                None,
                None,
            ],
            Coded::ResolutionScope => &[
                Some(Table::Module),
                Some(Table::ModuleRef),
                Some(Table::AssemblyRef),
                Some(Table::TypeRef),
            ],
            Coded::TypeOrMethodDef => &[Some(Table::TypeDef), Some(Table::MethodDef)],
        }
    }

    /// Split a raw coded value into (table, 1-based row). Zero means null.
    pub fn decode(self, value: u32) -> Option<(Table, u32)> {
        if value == 0 {
            return None;
        }
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let row = value >> bits;
        if row == 0 {
            return None;
        }
        let table = self.members().get(tag).copied().flatten()?;
        Some((table, row))
    }
}

/// Column kinds, enough to compute widths and read raw values.
#[derive(Debug, Clone, Copy)]
enum Col {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Idx(Table),
    CodedIdx(Coded),
}

fn schema(table: Table) -> &'static [Col] {
    use Col::*;
    match table {
        Table::Module => &[U16, Str, Guid, Guid, Guid],
        Table::TypeRef => &[CodedIdx(Coded::ResolutionScope), Str, Str],
        Table::TypeDef => &[
            U32,
            Str,
            Str,
            CodedIdx(Coded::TypeDefOrRef),
            Idx(Table::Field),
            Idx(Table::MethodDef),
        ],
        Table::FieldPtr => &[Idx(Table::Field)],
        Table::Field => &[U16, Str, Blob],
        Table::MethodPtr => &[Idx(Table::MethodDef)],
        Table::MethodDef => &[U32, U16, U16, Str, Blob, Idx(Table::Param)],
        Table::ParamPtr => &[Idx(Table::Param)],
        Table::Param => &[U16, U16, Str],
        Table::InterfaceImpl => &[Idx(Table::TypeDef), CodedIdx(Coded::TypeDefOrRef)],
        Table::MemberRef => &[CodedIdx(Coded::MemberRefParent), Str, Blob],
        Table::Constant => &[U16, CodedIdx(Coded::HasConstant), Blob],
        Table::CustomAttribute => &[
            CodedIdx(Coded::HasCustomAttribute),
            CodedIdx(Coded::CustomAttributeType),
            Blob,
        ],
        Table::FieldMarshal => &[CodedIdx(Coded::HasFieldMarshal), Blob],
        Table::DeclSecurity => &[U16, CodedIdx(Coded::HasDeclSecurity), Blob],
        Table::ClassLayout => &[U16, U32, Idx(Table::TypeDef)],
        Table::FieldLayout => &[U32, Idx(Table::Field)],
        Table::StandAloneSig => &[Blob],
        Table::EventMap => &[Idx(Table::TypeDef), Idx(Table::Event)],
        Table::EventPtr => &[Idx(Table::Event)],
        Table::Event => &[U16, Str, CodedIdx(Coded::TypeDefOrRef)],
        Table::PropertyMap => &[Idx(Table::TypeDef), Idx(Table::Property)],
        Table::PropertyPtr => &[Idx(Table::Property)],
        Table::Property => &[U16, Str, Blob],
        Table::MethodSemantics => &[U16, Idx(Table::MethodDef), CodedIdx(Coded::HasSemantics)],
        Table::MethodImpl => &[
            Idx(Table::TypeDef),
            CodedIdx(Coded::MethodDefOrRef),
            CodedIdx(Coded::MethodDefOrRef),
        ],
        Table::ModuleRef => &[Str],
        Table::TypeSpec => &[Blob],
        Table::ImplMap => &[
            U16,
            CodedIdx(Coded::MemberForwarded),
            Str,
            Idx(Table::ModuleRef),
        ],
        Table::FieldRva => &[U32, Idx(Table::Field)],
        Table::EncLog => &[U32, U32],
        Table::EncMap => &[U32],
        Table::Assembly => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        Table::AssemblyProcessor => &[U32],
        Table::AssemblyOs => &[U32, U32, U32],
        Table::AssemblyRef => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        Table::AssemblyRefProcessor => &[U32, Idx(Table::AssemblyRef)],
        Table::AssemblyRefOs => &[U32, U32, U32, Idx(Table::AssemblyRef)],
        Table::File => &[U32, Str, Blob],
        Table::ExportedType => &[U32, U32, Str, Str, CodedIdx(Coded::Implementation)],
        Table::ManifestResource => &[U32, U32, Str, CodedIdx(Coded::Implementation)],
        Table::NestedClass => &[Idx(Table::TypeDef), Idx(Table::TypeDef)],
        Table::GenericParam => &[U16, U16, CodedIdx(Coded::TypeOrMethodDef), Str],
        Table::MethodSpec => &[CodedIdx(Coded::MethodDefOrRef), Blob],
        Table::GenericParamConstraint => &[Idx(Table::GenericParam), CodedIdx(Coded::TypeDefOrRef)],
    }
}

/// Parsed layout of the `#~` stream: row counts, per-table start offsets
/// (relative to the stream) and per-column (offset, width) pairs.
#[derive(Debug)]
pub struct TableDirectory {
    row_counts: [u32; TABLE_COUNT],
    table_offsets: [usize; TABLE_COUNT],
    row_sizes: [usize; TABLE_COUNT],
    columns: Vec<Vec<(usize, usize)>>,
}

impl TableDirectory {
    /// Parse the `#~` stream header and lay out every present table.
    pub fn parse(tables: &[u8]) -> Result<TableDirectory, MetadataError> {
        // Header: reserved u32, version u8+u8, heap-size flags u8,
        // reserved u8, valid mask u64, sorted mask u64.
        let heap_sizes = *tables
            .get(6)
            .ok_or(MetadataError::Truncated("tables header"))?;
        let valid = read_u64(tables, 8)?;

        for bit in TABLE_COUNT..64 {
            if valid & (1u64 << bit) != 0 {
                return Err(MetadataError::UnknownTable(bit as u8));
            }
        }

        let mut row_counts = [0u32; TABLE_COUNT];
        let mut pos = 24;
        for (id, count) in row_counts.iter_mut().enumerate() {
            if valid & (1u64 << id) != 0 {
                *count = read_u32(tables, pos)?;
                pos += 4;
            }
        }

        let wide_str = heap_sizes & 0x1 != 0;
        let wide_guid = heap_sizes & 0x2 != 0;
        let wide_blob = heap_sizes & 0x4 != 0;

        let idx_width = |t: Table| -> usize {
            if row_counts[t as usize] < 0x1_0000 {
                2
            } else {
                4
            }
        };
        let coded_width = |c: Coded| -> usize {
            let limit = 1u32 << (16 - c.tag_bits());
            let max = c
                .members()
                .iter()
                .flatten()
                .map(|t| row_counts[*t as usize])
                .max()
                .unwrap_or(0);
            if max < limit {
                2
            } else {
                4
            }
        };

        let mut table_offsets = [0usize; TABLE_COUNT];
        let mut row_sizes = [0usize; TABLE_COUNT];
        let mut columns = vec![Vec::new(); TABLE_COUNT];

        for table in ALL_TABLES {
            let id = table as usize;
            let mut cols = Vec::new();
            let mut offset = 0usize;
            for col in schema(table) {
                let width = match col {
                    Col::U16 => 2,
                    Col::U32 => 4,
                    Col::Str => {
                        if wide_str {
                            4
                        } else {
                            2
                        }
                    }
                    Col::Guid => {
                        if wide_guid {
                            4
                        } else {
                            2
                        }
                    }
                    Col::Blob => {
                        if wide_blob {
                            4
                        } else {
                            2
                        }
                    }
                    Col::Idx(t) => idx_width(*t),
                    Col::CodedIdx(c) => coded_width(*c),
                };
                cols.push((offset, width));
                offset += width;
            }
            row_sizes[id] = offset;
            columns[id] = cols;

            table_offsets[id] = pos;
            pos += row_sizes[id] * row_counts[id] as usize;
        }

        if pos > tables.len() {
            return Err(MetadataError::BadTables("rows extend past stream"));
        }

        Ok(TableDirectory {
            row_counts,
            table_offsets,
            row_sizes,
            columns,
        })
    }

    pub fn row_count(&self, table: Table) -> u32 {
        self.row_counts[table as usize]
    }

    /// Read one raw cell. `row` is 1-based per the format's convention;
    /// out-of-range access yields `None` rather than panicking, since row
    /// indices come from untrusted input.
    pub fn cell(&self, tables: &[u8], table: Table, row: u32, col: usize) -> Option<u32> {
        let id = table as usize;
        if row == 0 || row > self.row_counts[id] {
            return None;
        }
        let (col_offset, width) = *self.columns[id].get(col)?;
        let offset =
            self.table_offsets[id] + (row as usize - 1) * self.row_sizes[id] + col_offset;
        match width {
            2 => read_u16(tables, offset).ok().map(u32::from),
            _ => read_u32(tables, offset).ok(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_build::build_tables;
    use super::*;

    fn u16le(v: u16) -> [u8; 2] {
        v.to_le_bytes()
    }

    #[test]
    fn test_coded_decode() {
        // TypeDefOrRef: tag 0 TypeDef, 1 TypeRef, 2 TypeSpec.
        assert_eq!(
            Coded::TypeDefOrRef.decode((5 << 2) | 1),
            Some((Table::TypeRef, 5))
        );
        assert_eq!(
            Coded::TypeDefOrRef.decode(4), // (1 << 2) | 0
            Some((Table::TypeDef, 1))
        );
        assert_eq!(Coded::TypeDefOrRef.decode(0), None);
        assert_eq!(Coded::TypeDefOrRef.decode(3), None); // reserved tag

        // CustomAttributeType: tag 2 MethodDef, 3 MemberRef.
        assert_eq!(
            Coded::CustomAttributeType.decode((7 << 3) | 3),
            Some((Table::MemberRef, 7))
        );
    }

    #[test]
    fn test_rejects_unknown_table_bits() {
        let mut stream = build_tables(&[]);
        // Set bit 0x30, past the last defined table.
        let valid = 1u64 << 0x30;
        stream[8..16].copy_from_slice(&valid.to_le_bytes());
        assert!(matches!(
            TableDirectory::parse(&stream),
            Err(MetadataError::UnknownTable(0x30))
        ));
    }

    #[test]
    fn test_layout_and_cell_access() {
        // Module: Generation, Name(str), Mvid(guid), EncId, EncBaseId.
        let module_row: Vec<u8> = [
            u16le(0).as_slice(),
            u16le(1).as_slice(), // name -> strings[1]
            u16le(1).as_slice(),
            u16le(0).as_slice(),
            u16le(0).as_slice(),
        ]
        .concat();

        // TypeDef: Flags(u32), Name, Namespace, Extends(coded),
        // FieldList, MethodList.
        let typedef_row: Vec<u8> = [
            1u32.to_le_bytes().as_slice(), // public
            u16le(7).as_slice(),           // name
            u16le(3).as_slice(),           // namespace
            u16le(0).as_slice(),           // extends: null
            u16le(1).as_slice(),
            u16le(1).as_slice(),
        ]
        .concat();

        let stream = build_tables(&[
            (Table::Module, vec![module_row]),
            (Table::TypeDef, vec![typedef_row]),
        ]);

        let dir = TableDirectory::parse(&stream).unwrap();
        assert_eq!(dir.row_count(Table::Module), 1);
        assert_eq!(dir.row_count(Table::TypeDef), 1);
        assert_eq!(dir.row_count(Table::MethodDef), 0);

        assert_eq!(dir.cell(&stream, Table::TypeDef, 1, 0), Some(1)); // flags
        assert_eq!(dir.cell(&stream, Table::TypeDef, 1, 1), Some(7)); // name
        assert_eq!(dir.cell(&stream, Table::TypeDef, 1, 2), Some(3)); // ns
        assert_eq!(dir.cell(&stream, Table::TypeDef, 1, 3), Some(0)); // extends

        // Row indices are 1-based and bounds-checked.
        assert_eq!(dir.cell(&stream, Table::TypeDef, 0, 0), None);
        assert_eq!(dir.cell(&stream, Table::TypeDef, 2, 0), None);
    }
}
