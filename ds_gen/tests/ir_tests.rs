//! IR builder tests: lowering, enum folding, monomorphization,
//! constraint synthesis, and the restore-position rule.

mod common;

use common::*;
use ds_ast::{
    BinaryOp, CasePayload, ChoiceCase, ChoiceDef, ChoiceSelector, EnumDef, EnumItem, Expr,
    FieldDef, InlineStructField, Module, NodeIdGen, Param, SelectorMode, SourcePos, SubtypeDef,
};
use ds_gen::ir::{IrExpr, IrSelector, IrType, NamedKind};

fn enum_item(name: &str, value: Option<Expr>) -> EnumItem {
    EnumItem {
        pos: SourcePos::default(),
        doc: None,
        name: name.to_string(),
        value,
    }
}

#[test]
fn constants_are_copied_into_the_bundle() {
    let mut module = Module::default();
    module.constants.push(constant("BASE", u32(), Expr::int(4)));
    module.constants.push(constant(
        "DOUBLED",
        u32(),
        Expr::binary(BinaryOp::Mul, Expr::ident("BASE"), Expr::int(2)),
    ));
    // Reference them so reachability stays quiet.
    module.structs.push(struct_def(
        "Payload",
        vec![field(array(u8(), Expr::ident("DOUBLED")), "data")],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let bundle = build_bundle(&mut set);

    assert_eq!(bundle.constants["BASE"], 4);
    assert_eq!(bundle.constants["DOUBLED"], 8);
}

#[test]
fn enum_items_auto_increment_and_bitmasks_double() {
    let mut module = Module::default();
    module.enums.push(EnumDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Color".to_string(),
        base: u8(),
        is_bitmask: false,
        items: vec![
            enum_item("RED", None),
            enum_item("GREEN", Some(Expr::int(5))),
            enum_item("BLUE", None),
        ],
    });
    module.enums.push(EnumDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Flags".to_string(),
        base: u8(),
        is_bitmask: true,
        items: vec![
            enum_item("READ", None),
            enum_item("WRITE", None),
            enum_item("EXEC", None),
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let bundle = build_bundle(&mut set);

    let color = bundle.find_enum("Color").unwrap();
    let values: Vec<u64> = color.items.iter().map(|i| i.value).collect();
    assert_eq!(values, vec![0, 5, 6]);

    let flags = bundle.find_enum("Flags").unwrap();
    let values: Vec<u64> = flags.items.iter().map(|i| i.value).collect();
    assert_eq!(values, vec![1, 2, 4]);
    assert!(flags.is_bitmask);
}

fn parameterized_module() -> (Module, NodeIdGen) {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();

    let mut block = struct_def("Block", vec![field(array(u8(), Expr::ident("n")), "data")]);
    block.parameters.push(Param {
        pos: SourcePos::default(),
        name: "n".to_string(),
        param_type: u8(),
    });
    module.structs.push(block);

    module.structs.push(struct_def(
        "Use",
        vec![
            field(named_args(&mut ids, "Block", vec![Expr::int(4)]), "a"),
            field(named_args(&mut ids, "Block", vec![Expr::int(8)]), "b"),
            field(named_args(&mut ids, "Block", vec![Expr::int(4)]), "c"),
        ],
    ));
    (module, ids)
}

#[test]
fn monomorphization_creates_suffixed_instances() {
    let (module, ids) = parameterized_module();
    let mut set = make_set(module, ids);
    let bundle = build_bundle(&mut set);

    let names: Vec<&str> = bundle.structs.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"Use"));
    assert!(names.contains(&"Block_4"));
    assert!(names.contains(&"Block_8"));
    assert!(!names.contains(&"Block"), "the parameterized base is never emitted");

    assert_eq!(bundle.mono_instances["Block_4"], "Block");
    assert_eq!(bundle.mono_instances["Block_8"], "Block");

    // The substituted argument folds inside the clone.
    let block4 = bundle.find_struct("Block_4").unwrap();
    match &block4.fields[0].field_type {
        IrType::ArrayFixed { size, .. } => assert_eq!(size.as_int(), Some(4)),
        other => panic!("expected a fixed array, got {:?}", other),
    }
}

#[test]
fn monomorphization_is_deterministic_across_runs() {
    let (module_a, ids_a) = parameterized_module();
    let (module_b, ids_b) = parameterized_module();

    let mut set_a = make_set(module_a, ids_a);
    let mut set_b = make_set(module_b, ids_b);

    let bundle_a = build_bundle(&mut set_a);
    let bundle_b = build_bundle(&mut set_b);
    assert_eq!(bundle_a, bundle_b);
}

#[test]
fn subtype_predicate_becomes_a_bundle_constraint() {
    let mut module = Module::default();
    module.subtypes.push(SubtypeDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Percentage".to_string(),
        base: u8(),
        predicate: Expr::binary(BinaryOp::Le, Expr::ident("this"), Expr::int(100)),
    });

    let mut set = make_set(module, NodeIdGen::new());
    let bundle = build_bundle(&mut set);

    let subtype = bundle.find_subtype("Percentage").unwrap();
    let constraint = &bundle.constraints[subtype.constraint];
    assert_eq!(constraint.name, "Percentage");
    assert_eq!(constraint.params.len(), 1);
    assert_eq!(constraint.params[0].name, "value");
    assert_eq!(
        constraint.condition,
        IrExpr::Binary {
            op: BinaryOp::Le,
            left: Box::new(IrExpr::ParameterRef("value".to_string())),
            right: Box::new(IrExpr::IntLiteral(100)),
        }
    );
}

#[test]
fn subtype_typed_field_gets_a_constraint_application() {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();
    module.subtypes.push(SubtypeDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Percentage".to_string(),
        base: u8(),
        predicate: Expr::binary(BinaryOp::Le, Expr::ident("this"), Expr::int(100)),
    });
    module.structs.push(struct_def(
        "Report",
        vec![field(named(&mut ids, "Percentage"), "progress")],
    ));

    let mut set = make_set(module, ids);
    let bundle = build_bundle(&mut set);

    let report = bundle.find_struct("Report").unwrap();
    let applies = &report.fields[0].constraints;
    assert_eq!(applies.len(), 1);
    assert_eq!(
        applies[0].arguments,
        vec![IrExpr::FieldRef("progress".to_string())]
    );
    assert_eq!(bundle.constraints[applies[0].constraint].name, "Percentage");
}

fn inline_payload(name: &str, items: Vec<ds_ast::StructItem>) -> CasePayload {
    CasePayload::InlineStruct(InlineStructField {
        pos: SourcePos::default(),
        doc: None,
        name: name.to_string(),
        items,
        condition: None,
        constraint: None,
    })
}

fn name_or_id_module() -> (Module, NodeIdGen) {
    let ids = NodeIdGen::new();
    let mut module = Module::default();
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "NameOrId".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::Inline(u8()),
        cases: vec![
            ChoiceCase {
                pos: SourcePos::default(),
                mode: SelectorMode::Exact,
                values: vec![Expr::int(0xFF)],
                is_default: false,
                payload: inline_payload(
                    "ordinal_value",
                    vec![field(u8(), "marker"), field(u16(), "ordinal")],
                ),
            },
            ChoiceCase {
                pos: SourcePos::default(),
                mode: SelectorMode::Exact,
                values: Vec::new(),
                is_default: true,
                payload: inline_payload(
                    "string_value",
                    vec![
                        field(u8(), "length"),
                        field(array(u8(), Expr::ident("length")), "chars"),
                    ],
                ),
            },
        ],
    });
    (module, ids)
}

#[test]
fn inline_discriminator_payloads_rereading_the_selector_restore_position() {
    let (module, ids) = name_or_id_module();
    let mut set = make_set(module, ids);
    let bundle = build_bundle(&mut set);

    let choice = bundle.find_choice("NameOrId").unwrap();
    assert!(matches!(choice.selector, IrSelector::Inline(_)));

    // Both payloads start with a uint8, the discriminator's own width.
    assert!(choice.cases[0].restore_position);
    assert!(choice.cases[1].restore_position);
    assert!(choice.cases[1].is_default);

    // The synthesized payload types carry the case/default markers.
    assert!(matches!(
        &choice.cases[0].payload,
        IrType::Named { kind: NamedKind::Struct, name } if name == "NameOrId__ordinal_value_case__type"
    ));
    assert!(matches!(
        &choice.cases[1].payload,
        IrType::Named { kind: NamedKind::Struct, name } if name == "NameOrId__string_value_default__type"
    ));
}

#[test]
fn wider_payload_leaves_the_cursor_past_the_discriminator() {
    let mut module = Module::default();
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "SimpleChoice".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::Inline(u16()),
        cases: vec![
            ChoiceCase {
                pos: SourcePos::default(),
                mode: SelectorMode::Exact,
                values: vec![Expr::int(0x1234)],
                is_default: false,
                payload: CasePayload::Field(FieldDef::plain(u32(), "data")),
            },
            ChoiceCase {
                pos: SourcePos::default(),
                mode: SelectorMode::Exact,
                values: Vec::new(),
                is_default: true,
                payload: CasePayload::Field(FieldDef::plain(u16(), "fallback")),
            },
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let bundle = build_bundle(&mut set);

    let choice = bundle.find_choice("SimpleChoice").unwrap();
    assert!(!choice.cases[0].restore_position, "uint32 payload does not re-read a uint16");
    assert!(
        choice.cases[1].restore_position,
        "uint16 payload is the discriminator itself"
    );
}

#[test]
fn enum_item_case_values_fold_to_integers() {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();
    module.enums.push(EnumDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Kind".to_string(),
        base: u8(),
        is_bitmask: false,
        items: vec![enum_item("ALPHA", None), enum_item("BETA", None)],
    });
    module.structs.push(struct_def(
        "Message",
        vec![
            field(named(&mut ids, "Kind"), "kind"),
            field(named(&mut ids, "Body"), "body"),
        ],
    ));
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Body".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::On(Expr::ident("kind")),
        cases: vec![ChoiceCase {
            pos: SourcePos::default(),
            mode: SelectorMode::Exact,
            values: vec![Expr {
                pos: SourcePos::default(),
                kind: ds_ast::ExprKind::FieldAccess(ds_ast::FieldAccessExpr {
                    object: Box::new(Expr::ident("Kind")),
                    field: "BETA".to_string(),
                }),
            }],
            is_default: false,
            payload: CasePayload::Field(FieldDef::plain(u8(), "beta_byte")),
        }],
    });

    let mut set = make_set(module, ids);
    let bundle = build_bundle(&mut set);

    let choice = bundle.find_choice("Body").unwrap();
    assert_eq!(choice.cases[0].values, vec![IrExpr::IntLiteral(1)]);
}
