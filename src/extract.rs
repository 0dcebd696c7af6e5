//! Surface extraction.
//!
//! Walks every TypeDef of every loaded module and flattens the visible
//! API into [`TypeSurface`] records. All facts are copied out while the
//! metadata context is alive; the result carries no handles back into
//! the module bytes.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::core::surface::{is_async_shaped, method_signature};
use crate::core::{MethodSurface, TypeKind, TypeSurface};
use crate::metadata::tables::Table;
use crate::metadata::{signature, LoadedModule, MetadataContext};

/// Extract the API surface of a package version.
///
/// Public types only by default; `include_non_public` widens the walk to
/// every type and member. Order is deterministic: modules in load order,
/// types in TypeDef row order, first occurrence of a duplicate full name
/// wins.
pub fn extract_types(ctx: &MetadataContext, include_non_public: bool) -> Vec<TypeSurface> {
    let mut surfaces = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for module in ctx.modules() {
        let (obsolete_types, obsolete_methods) = module.obsolete_markers();

        for row in 1..=module.row_count(Table::TypeDef) {
            let name = module
                .cell(Table::TypeDef, row, 1)
                .map(|i| module.string(i))
                .unwrap_or("");
            // <Module> and compiler-generated types are implementation
            // detail, never surface.
            if name.is_empty() || name.starts_with('<') {
                continue;
            }
            if !include_non_public && !module.is_public_type(row) {
                continue;
            }

            let full_name = module.type_def_full_name(row);
            if !seen.insert(full_name.clone()) {
                tracing::debug!(
                    "duplicate type {} in {}, keeping first occurrence",
                    full_name,
                    module.file_name()
                );
                continue;
            }

            surfaces.push(extract_type(
                module,
                row,
                full_name,
                name.to_string(),
                include_non_public,
                &obsolete_types,
                &obsolete_methods,
            ));
        }
    }

    surfaces
}

fn extract_type(
    module: &LoadedModule,
    row: u32,
    full_name: String,
    name: String,
    include_non_public: bool,
    obsolete_types: &HashMap<u32, String>,
    obsolete_methods: &HashMap<u32, String>,
) -> TypeSurface {
    let namespace = module
        .cell(Table::TypeDef, row, 2)
        .map(|i| module.string(i).to_string())
        .unwrap_or_default();
    let base_type = module.base_type_of(row);
    let kind = classify(module, row, base_type.as_deref());

    let mut methods = Vec::new();
    for method_row in module.method_range(row) {
        if module.is_accessor_or_ctor(method_row) {
            continue;
        }
        if !include_non_public && !module.is_public_method(method_row) {
            continue;
        }
        let method_name = module.method_name(method_row);
        if method_name.is_empty() || method_name.starts_with('<') {
            continue;
        }

        let Some(blob) = module.method_signature_blob(method_row) else {
            continue;
        };
        let sig = match signature::parse_method_sig(blob, module) {
            Ok(sig) => sig,
            Err(err) => {
                // A member whose signature cannot be rendered is dropped,
                // never fatal for the type.
                tracing::debug!(
                    "skipping {}.{}: unrenderable signature ({:?})",
                    full_name,
                    method_name,
                    err
                );
                continue;
            }
        };

        methods.push(MethodSurface {
            name: method_name.to_string(),
            signature: method_signature(method_name, &sig.params),
            is_async: is_async_shaped(&sig.return_type),
            return_type: sig.return_type,
            is_static: module.is_static_method(method_row),
            obsolete_message: obsolete_methods.get(&method_row).cloned(),
        });
    }

    let property_names: BTreeSet<String> = module
        .properties_of(row)
        .into_iter()
        .map(|p| module.property_name(p).to_string())
        .filter(|n| !n.is_empty())
        .collect();

    TypeSurface {
        full_name,
        namespace,
        name,
        kind,
        is_public: module.is_public_type(row),
        base_type,
        interfaces: module.interfaces_of(row).into_iter().collect(),
        obsolete_message: obsolete_types.get(&row).cloned(),
        methods,
        property_names,
    }
}

fn classify(module: &LoadedModule, row: u32, base: Option<&str>) -> TypeKind {
    if module.is_interface(row) {
        return TypeKind::Interface;
    }
    match base {
        Some("System.Enum") => TypeKind::Enum,
        Some("System.ValueType") => TypeKind::Struct,
        Some("System.MulticastDelegate") => TypeKind::Delegate,
        _ => TypeKind::Class,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::test_fixtures::{
        build_assembly, widget_assembly, MethodFixture, TypeFixture, Ty,
    };
    use crate::metadata::MetadataContext;
    use tokio_util::sync::CancellationToken;

    fn context_of(images: &[Vec<u8>]) -> MetadataContext {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut paths = Vec::new();
        for (i, image) in images.iter().enumerate() {
            let path = tmp.path().join(format!("Mod{}.dll", i));
            std::fs::write(&path, image).unwrap();
            paths.push(path);
        }
        MetadataContext::open(&paths, &CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_extract_widget_surface() {
        let ctx = context_of(&[widget_assembly()]);
        let types = extract_types(&ctx, false);
        assert_eq!(types.len(), 1);

        let widget = &types[0];
        assert_eq!(widget.full_name, "Example.Widget");
        assert_eq!(widget.namespace, "Example");
        assert_eq!(widget.kind, TypeKind::Class);
        assert!(widget.is_public);
        assert_eq!(widget.base_type.as_deref(), Some("System.Object"));
        assert!(widget.interfaces.contains("System.IDisposable"));
        assert_eq!(widget.obsolete_message.as_deref(), Some("use Gadget"));
        assert!(widget.property_names.contains("Name"));

        assert_eq!(widget.methods.len(), 1);
        let frob = &widget.methods[0];
        assert_eq!(frob.signature, "Frob(System.String)");
        assert_eq!(frob.return_type, "System.Void");
        assert!(!frob.is_static);
        assert!(!frob.is_async);
    }

    #[test]
    fn test_non_public_filtering() {
        let image = build_assembly(&[
            TypeFixture::public_class("Example", "Open"),
            TypeFixture {
                public: false,
                ..TypeFixture::public_class("Example", "Hidden")
            },
        ]);
        let ctx = context_of(&[image]);

        let public_only = extract_types(&ctx, false);
        assert_eq!(public_only.len(), 1);
        assert_eq!(public_only[0].full_name, "Example.Open");

        let all = extract_types(&ctx, true);
        let names: Vec<&str> = all.iter().map(|t| t.full_name.as_str()).collect();
        assert_eq!(names, vec!["Example.Open", "Example.Hidden"]);
    }

    #[test]
    fn test_private_members_excluded_by_default() {
        let image = build_assembly(&[TypeFixture {
            methods: vec![
                MethodFixture::public_instance("Visible", vec![], Ty::Void),
                MethodFixture::private_instance("Internal", vec![], Ty::Void),
            ],
            ..TypeFixture::public_class("Example", "Widget")
        }]);
        let ctx = context_of(&[image]);

        let types = extract_types(&ctx, false);
        assert_eq!(types[0].methods.len(), 1);
        assert_eq!(types[0].methods[0].name, "Visible");

        let all = extract_types(&ctx, true);
        assert_eq!(all[0].methods.len(), 2);
    }

    #[test]
    fn test_async_shaped_return_detection() {
        let image = build_assembly(&[TypeFixture {
            methods: vec![
                MethodFixture::public_instance("FetchAsync", vec![Ty::Str], Ty::TaskOfInt),
                MethodFixture::public_static("Run", vec![], Ty::Task),
            ],
            ..TypeFixture::public_class("Example", "Client")
        }]);
        let ctx = context_of(&[image]);
        let types = extract_types(&ctx, false);
        let client = &types[0];

        let fetch = client.method("FetchAsync(System.String)").unwrap();
        assert!(fetch.is_async);
        assert_eq!(
            fetch.return_type,
            "System.Threading.Tasks.Task`1<System.Int32>"
        );

        let run = client.method("Run()").unwrap();
        assert!(run.is_async);
        assert!(run.is_static);
    }

    #[test]
    fn test_duplicate_type_first_module_wins() {
        let first = build_assembly(&[TypeFixture {
            methods: vec![MethodFixture::public_instance("One", vec![], Ty::Void)],
            ..TypeFixture::public_class("Example", "Shared")
        }]);
        let second = build_assembly(&[TypeFixture {
            methods: vec![MethodFixture::public_instance("Two", vec![], Ty::Void)],
            ..TypeFixture::public_class("Example", "Shared")
        }]);
        let ctx = context_of(&[first, second]);

        let types = extract_types(&ctx, false);
        assert_eq!(types.len(), 1);
        assert_eq!(types[0].methods[0].name, "One");
    }

    #[test]
    fn test_obsolete_method_metadata() {
        let image = build_assembly(&[TypeFixture {
            methods: vec![MethodFixture {
                obsolete: Some("prefer RunAsync"),
                ..MethodFixture::public_instance("Run", vec![Ty::Bool], Ty::Void)
            }],
            ..TypeFixture::public_class("Example", "Runner")
        }]);
        let ctx = context_of(&[image]);

        let types = extract_types(&ctx, false);
        let run = types[0].method("Run(System.Boolean)").unwrap();
        assert_eq!(run.obsolete_message.as_deref(), Some("prefer RunAsync"));
        assert!(run.is_obsolete());
    }

    #[test]
    fn test_interface_classification() {
        let image = build_assembly(&[TypeFixture {
            is_interface: true,
            has_base: false,
            methods: vec![MethodFixture::public_instance("Handle", vec![], Ty::Void)],
            ..TypeFixture::public_class("Example", "IHandler")
        }]);
        let ctx = context_of(&[image]);
        let types = extract_types(&ctx, false);
        assert_eq!(types[0].kind, TypeKind::Interface);
        assert_eq!(types[0].base_type, None);
    }
}
