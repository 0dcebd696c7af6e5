//! Synthetic managed-assembly images for loader and extractor tests.
//!
//! Builds a minimal but well-formed metadata root (narrow heaps, 2-byte
//! indices throughout) and wraps it in a PE32 image, so tests exercise
//! the real parsing path end to end without binary test data on disk.

use std::collections::HashMap;

use super::pe::test_image::wrap_metadata;
use super::streams::test_root::build_root;
use super::tables::test_build::build_tables;
use super::tables::Table;

/// Parameter and return types expressible by the fixture signatures.
#[derive(Clone)]
pub(crate) enum Ty {
    Void,
    Bool,
    Int,
    Str,
    /// Non-generic reference type, by namespace and name.
    Named(&'static str, &'static str),
    Task,
    TaskOfInt,
}

pub(crate) struct MethodFixture {
    pub name: &'static str,
    pub is_static: bool,
    pub params: Vec<Ty>,
    pub ret: Ty,
    pub obsolete: Option<&'static str>,
    /// Raw access flags low bits; 0x6 is public.
    pub access: u16,
}

impl MethodFixture {
    pub fn public_instance(name: &'static str, params: Vec<Ty>, ret: Ty) -> MethodFixture {
        MethodFixture {
            name,
            is_static: false,
            params,
            ret,
            obsolete: None,
            access: 0x6,
        }
    }

    pub fn public_static(name: &'static str, params: Vec<Ty>, ret: Ty) -> MethodFixture {
        MethodFixture {
            is_static: true,
            ..Self::public_instance(name, params, ret)
        }
    }

    pub fn private_instance(name: &'static str, params: Vec<Ty>, ret: Ty) -> MethodFixture {
        MethodFixture {
            access: 0x1,
            ..Self::public_instance(name, params, ret)
        }
    }
}

pub(crate) struct TypeFixture {
    pub namespace: &'static str,
    pub name: &'static str,
    pub public: bool,
    pub is_interface: bool,
    /// Extend System.Object; interfaces and special bases set this false.
    pub has_base: bool,
    /// Implemented interfaces as full names, e.g. `System.IDisposable`.
    pub interfaces: Vec<&'static str>,
    pub methods: Vec<MethodFixture>,
    pub properties: Vec<&'static str>,
    pub obsolete: Option<&'static str>,
}

impl TypeFixture {
    pub fn public_class(namespace: &'static str, name: &'static str) -> TypeFixture {
        TypeFixture {
            namespace,
            name,
            public: true,
            is_interface: false,
            has_base: true,
            interfaces: vec![],
            methods: vec![],
            properties: vec![],
            obsolete: None,
        }
    }
}

/// The standing fixture used across loader tests: one public class with a
/// method, a property, an interface and an Obsolete marker.
pub(crate) fn widget_assembly() -> Vec<u8> {
    build_assembly(&[TypeFixture {
        interfaces: vec!["System.IDisposable"],
        methods: vec![MethodFixture::public_instance(
            "Frob",
            vec![Ty::Str],
            Ty::Void,
        )],
        properties: vec!["Name"],
        obsolete: Some("use Gadget"),
        ..TypeFixture::public_class("Example", "Widget")
    }])
}

struct StringHeap {
    data: Vec<u8>,
    seen: HashMap<String, u32>,
}

impl StringHeap {
    fn new() -> StringHeap {
        StringHeap {
            data: vec![0],
            seen: HashMap::new(),
        }
    }

    fn add(&mut self, s: &str) -> u32 {
        if s.is_empty() {
            return 0;
        }
        if let Some(&offset) = self.seen.get(s) {
            return offset;
        }
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        self.seen.insert(s.to_string(), offset);
        offset
    }
}

struct BlobHeap {
    data: Vec<u8>,
}

impl BlobHeap {
    fn new() -> BlobHeap {
        BlobHeap { data: vec![0] }
    }

    // Fixture blobs stay under 0x80 bytes, so one length byte suffices.
    fn add(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.push(bytes.len() as u8);
        self.data.extend_from_slice(bytes);
        offset
    }
}

struct TypeRefs {
    rows: Vec<(String, String)>,
}

impl TypeRefs {
    fn new() -> TypeRefs {
        TypeRefs { rows: Vec::new() }
    }

    fn row(&mut self, namespace: &str, name: &str) -> u32 {
        for (i, (ns, n)) in self.rows.iter().enumerate() {
            if ns == namespace && n == name {
                return i as u32 + 1;
            }
        }
        self.rows.push((namespace.to_string(), name.to_string()));
        self.rows.len() as u32
    }
}

fn compress(v: u32) -> Vec<u8> {
    if v < 0x80 {
        vec![v as u8]
    } else if v < 0x4000 {
        vec![(0x80 | (v >> 8)) as u8, v as u8]
    } else {
        vec![
            (0xC0 | (v >> 24)) as u8,
            (v >> 16) as u8,
            (v >> 8) as u8,
            v as u8,
        ]
    }
}

/// TypeDefOrRef coded form of a TypeRef row, signature encoding.
fn sig_typeref(row: u32) -> Vec<u8> {
    compress((row << 2) | 1)
}

fn encode_ty(ty: &Ty, refs: &mut TypeRefs) -> Vec<u8> {
    match ty {
        Ty::Void => vec![0x01],
        Ty::Bool => vec![0x02],
        Ty::Int => vec![0x08],
        Ty::Str => vec![0x0E],
        Ty::Named(ns, name) => {
            let row = refs.row(ns, name);
            let mut out = vec![0x12];
            out.extend(sig_typeref(row));
            out
        }
        Ty::Task => encode_ty(&Ty::Named("System.Threading.Tasks", "Task"), refs),
        Ty::TaskOfInt => {
            let row = refs.row("System.Threading.Tasks", "Task`1");
            let mut out = vec![0x15, 0x12];
            out.extend(sig_typeref(row));
            out.push(0x01); // one argument
            out.push(0x08); // System.Int32
            out
        }
    }
}

fn b16(v: u32) -> [u8; 2] {
    (v as u16).to_le_bytes()
}

/// Assemble a PE image containing the given types. Row 1 of TypeDef is
/// the synthetic `<Module>` row, fixtures follow in order from row 2.
pub(crate) fn build_assembly(types: &[TypeFixture]) -> Vec<u8> {
    let mut strings = StringHeap::new();
    let mut blobs = BlobHeap::new();
    let mut refs = TypeRefs::new();

    // Row 1 by construction, referenced as the default base.
    let object_ref = refs.row("System", "Object");

    let mut typedef_rows: Vec<Vec<u8>> = Vec::new();
    let mut method_rows: Vec<Vec<u8>> = Vec::new();
    let mut interface_rows: Vec<Vec<u8>> = Vec::new();
    let mut property_map_rows: Vec<Vec<u8>> = Vec::new();
    let mut property_rows: Vec<Vec<u8>> = Vec::new();
    // (HasCustomAttribute coded parent, message)
    let mut obsolete_targets: Vec<(u32, &str)> = Vec::new();

    let module_name = strings.add("<Module>");
    typedef_rows.push(typedef_row(0, module_name, 0, 0, 1, 1));

    let mut next_method = 1u32;
    let mut next_property = 1u32;
    let prop_sig = blobs.add(&[0x28, 0x00, 0x0E]); // property string, no params

    for (i, ty) in types.iter().enumerate() {
        let typedef = i as u32 + 2;
        let mut flags = if ty.public { 0x1 } else { 0x0 };
        if ty.is_interface {
            flags |= 0x20 | 0x80; // interface, abstract
        }
        let extends = if ty.has_base && !ty.is_interface {
            (object_ref << 2) | 1
        } else {
            0
        };

        let name = strings.add(ty.name);
        let ns = strings.add(ty.namespace);
        typedef_rows.push(typedef_row(flags, name, ns, extends, 1, next_method));

        for method in &ty.methods {
            let mut sig = vec![if method.is_static { 0x00 } else { 0x20 }];
            sig.extend(compress(method.params.len() as u32));
            sig.extend(encode_ty(&method.ret, &mut refs));
            for param in &method.params {
                sig.extend(encode_ty(param, &mut refs));
            }
            let sig_idx = blobs.add(&sig);
            let name_idx = strings.add(method.name);

            let mut m = Vec::new();
            m.extend_from_slice(&0u32.to_le_bytes()); // rva
            m.extend(b16(0)); // impl flags
            let mflags = method.access | if method.is_static { 0x0010 } else { 0 };
            m.extend(b16(u32::from(mflags)));
            m.extend(b16(name_idx));
            m.extend(b16(sig_idx));
            m.extend(b16(1)); // param list
            method_rows.push(m);

            if let Some(msg) = method.obsolete {
                // HasCustomAttribute tag 0 is MethodDef.
                obsolete_targets.push((next_method << 5, msg));
            }
            next_method += 1;
        }

        for iface in &ty.interfaces {
            let (ins, iname) = iface.rsplit_once('.').unwrap_or(("", iface));
            let iref = refs.row(ins, iname);
            let mut r = Vec::new();
            r.extend(b16(typedef));
            r.extend(b16((iref << 2) | 1));
            interface_rows.push(r);
        }

        if !ty.properties.is_empty() {
            let mut map = Vec::new();
            map.extend(b16(typedef));
            map.extend(b16(next_property));
            property_map_rows.push(map);
            for prop in &ty.properties {
                let pname = strings.add(prop);
                let mut p = Vec::new();
                p.extend(b16(0));
                p.extend(b16(pname));
                p.extend(b16(prop_sig));
                property_rows.push(p);
                next_property += 1;
            }
        }

        if let Some(msg) = ty.obsolete {
            // HasCustomAttribute tag 3 is TypeDef.
            obsolete_targets.push(((typedef << 5) | 3, msg));
        }
    }

    // Obsolete markers go through a MemberRef to the framework ctor.
    let mut member_ref_rows: Vec<Vec<u8>> = Vec::new();
    let mut attribute_rows: Vec<Vec<u8>> = Vec::new();
    if !obsolete_targets.is_empty() {
        let attr_ref = refs.row("System", "ObsoleteAttribute");
        let ctor_sig = blobs.add(&[0x20, 0x01, 0x01, 0x0E]); // instance void(string)
        let ctor_name = strings.add(".ctor");
        let mut mr = Vec::new();
        mr.extend(b16((attr_ref << 3) | 1)); // MemberRefParent: TypeRef
        mr.extend(b16(ctor_name));
        mr.extend(b16(ctor_sig));
        member_ref_rows.push(mr);

        for (parent, msg) in &obsolete_targets {
            let mut value = vec![0x01, 0x00];
            value.extend(compress(msg.len() as u32));
            value.extend_from_slice(msg.as_bytes());
            value.extend_from_slice(&[0x00, 0x00]); // no named arguments
            let value_idx = blobs.add(&value);

            let mut ca = Vec::new();
            ca.extend(b16(*parent));
            ca.extend(b16((1 << 3) | 3)); // CustomAttributeType: MemberRef row 1
            ca.extend(b16(value_idx));
            attribute_rows.push(ca);
        }
    }

    let type_ref_rows: Vec<Vec<u8>> = refs
        .rows
        .clone()
        .into_iter()
        .map(|(ns, name)| {
            let mut r = Vec::new();
            r.extend(b16((1 << 2) | 2)); // ResolutionScope: AssemblyRef row 1
            r.extend(b16(strings.add(&name)));
            r.extend(b16(strings.add(&ns)));
            r
        })
        .collect();

    let module_row = {
        let name = strings.add("Example.dll");
        let mut r = Vec::new();
        r.extend(b16(0)); // generation
        r.extend(b16(name));
        r.extend(b16(0)); // mvid
        r.extend(b16(0));
        r.extend(b16(0));
        r
    };

    let assembly_ref_row = {
        let name = strings.add("System.Runtime");
        let mut r = Vec::new();
        for _ in 0..4 {
            r.extend(b16(0)); // version
        }
        r.extend_from_slice(&0u32.to_le_bytes()); // flags
        r.extend(b16(0)); // public key
        r.extend(b16(name));
        r.extend(b16(0)); // culture
        r.extend(b16(0)); // hash
        r
    };

    let mut present: Vec<(Table, Vec<Vec<u8>>)> = vec![
        (Table::Module, vec![module_row]),
        (Table::TypeRef, type_ref_rows),
        (Table::TypeDef, typedef_rows),
    ];
    if !method_rows.is_empty() {
        present.push((Table::MethodDef, method_rows));
    }
    if !interface_rows.is_empty() {
        present.push((Table::InterfaceImpl, interface_rows));
    }
    if !member_ref_rows.is_empty() {
        present.push((Table::MemberRef, member_ref_rows));
    }
    if !attribute_rows.is_empty() {
        present.push((Table::CustomAttribute, attribute_rows));
    }
    if !property_map_rows.is_empty() {
        present.push((Table::PropertyMap, property_map_rows));
        present.push((Table::Property, property_rows));
    }
    present.push((Table::AssemblyRef, vec![assembly_ref_row]));

    let tables = build_tables(&present);
    let root = build_root(&[
        ("#~", &tables),
        ("#Strings", &strings.data),
        ("#Blob", &blobs.data),
    ]);
    wrap_metadata(&root)
}

fn typedef_row(
    flags: u32,
    name: u32,
    namespace: u32,
    extends: u32,
    field_list: u32,
    method_list: u32,
) -> Vec<u8> {
    let mut row = Vec::new();
    row.extend_from_slice(&flags.to_le_bytes());
    row.extend(b16(name));
    row.extend(b16(namespace));
    row.extend(b16(extends));
    row.extend(b16(field_list));
    row.extend(b16(method_list));
    row
}
