//! Size and alignment computation tests.

mod common;

use common::*;
use ds_ast::{AlignDirective, Expr, Module, NodeIdGen, SourcePos, StructItem, UnionCase, UnionDef};

#[test]
fn primitive_fields_pad_to_their_size() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Aligned",
        vec![field(u8(), "a"), field(u32(), "b"), field(u8(), "c")],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let analyzed = analyze_ok(&mut set);

    let layout = &analyzed.struct_layouts["Aligned"];
    assert_eq!(layout.field_offsets["a"], 0);
    assert_eq!(layout.field_offsets["b"], 4);
    assert_eq!(layout.field_offsets["c"], 8);
    assert_eq!(layout.total_size, Some(12));
    assert_eq!(layout.alignment, 4);
}

#[test]
fn bitfield_run_packs_into_shared_bytes() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Packed",
        vec![field(bit(3), "priority"), field(bit(5), "reserved"), field(u8(), "tail")],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let analyzed = analyze_ok(&mut set);

    let layout = &analyzed.struct_layouts["Packed"];
    assert_eq!(layout.field_offsets["priority"], 0);
    assert_eq!(layout.field_offsets["reserved"], 0, "same storage byte");
    assert_eq!(layout.field_offsets["tail"], 1, "run forces the next byte boundary");
    assert_eq!(layout.total_size, Some(2));
}

#[test]
fn nested_struct_contributes_size_and_alignment() {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Inner",
        vec![field(u16(), "x"), field(u16(), "y")],
    ));
    module.structs.push(struct_def(
        "Outer",
        vec![field(u8(), "tag"), field(named(&mut ids, "Inner"), "inner")],
    ));

    let mut set = make_set(module, ids);
    let analyzed = analyze_ok(&mut set);

    let inner = &analyzed.struct_layouts["Inner"];
    assert_eq!(inner.total_size, Some(4));
    assert_eq!(inner.alignment, 2);

    let outer = &analyzed.struct_layouts["Outer"];
    assert_eq!(outer.field_offsets["inner"], 2, "aligned to Inner's alignment");
    assert_eq!(outer.total_size, Some(6));
}

#[test]
fn fixed_array_strides_by_element_size() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Table",
        vec![field(array(u32(), Expr::int(4)), "entries"), field(u8(), "tail")],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let analyzed = analyze_ok(&mut set);

    let layout = &analyzed.struct_layouts["Table"];
    assert_eq!(layout.field_offsets["entries"], 0);
    assert_eq!(layout.field_offsets["tail"], 16);
    assert_eq!(layout.total_size, Some(20), "padded to the array's alignment");
}

#[test]
fn alignment_directive_pads_the_next_field() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Directive",
        vec![
            field(u8(), "header"),
            StructItem::Align(AlignDirective {
                pos: SourcePos::default(),
                boundary: 8,
            }),
            field(u8(), "late"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let analyzed = analyze_ok(&mut set);

    let layout = &analyzed.struct_layouts["Directive"];
    assert_eq!(layout.field_offsets["late"], 8);
}

#[test]
fn string_field_makes_later_offsets_unknown() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Mixed",
        vec![
            field(u16(), "id"),
            field(
                ds_ast::Type::new(SourcePos::default(), ds_ast::TypeKind::String),
                "name",
            ),
            field(u16(), "after"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let analyzed = analyze_ok(&mut set);

    let layout = &analyzed.struct_layouts["Mixed"];
    assert_eq!(layout.field_offsets.get("id"), Some(&0));
    assert_eq!(layout.field_offsets.get("name"), Some(&2));
    assert_eq!(layout.field_offsets.get("after"), None);
    assert_eq!(layout.total_size, None);
}

#[test]
fn union_takes_maximum_case_size_and_alignment() {
    let mut module = Module::default();
    module.unions.push(UnionDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Value".to_string(),
        parameters: Vec::new(),
        cases: vec![
            UnionCase {
                pos: SourcePos::default(),
                name: "small".to_string(),
                condition: None,
                items: vec![field(u8(), "b")],
            },
            UnionCase {
                pos: SourcePos::default(),
                name: "wide".to_string(),
                condition: None,
                items: vec![field(u32(), "w")],
            },
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let analyzed = analyze_ok(&mut set);

    let layout = &analyzed.union_layouts["Value"];
    assert_eq!(layout.total_size, Some(4));
    assert_eq!(layout.alignment, 4);
}

#[test]
fn guarded_field_breaks_static_layout_downstream() {
    let mut module = Module::default();
    let mut holder = struct_def("Holder", vec![field(u8(), "flag"), field(u32(), "opt"), field(u8(), "after")]);
    if let StructItem::Field(f) = &mut holder.body[1] {
        f.condition = Some(Expr::binary(
            ds_ast::BinaryOp::Eq,
            Expr::ident("flag"),
            Expr::int(1),
        ));
    }
    module.structs.push(holder);

    let mut set = make_set(module, NodeIdGen::new());
    let analyzed = analyze_ok(&mut set);

    let layout = &analyzed.struct_layouts["Holder"];
    assert_eq!(layout.field_offsets.get("flag"), Some(&0));
    assert_eq!(layout.field_offsets.get("opt"), Some(&4));
    assert_eq!(layout.field_offsets.get("after"), None);
    assert_eq!(layout.total_size, None);
}
