//! Choice rendering tests: inline discriminators with position restore,
//! range selectors, default-case else blocks, and external selectors.

mod common;

use common::*;
use ds_ast::{
    CasePayload, ChoiceCase, ChoiceDef, ChoiceSelector, Expr, FieldDef, InlineStructField, Module,
    NodeIdGen, SelectorMode, SourcePos,
};

fn exact_case(values: Vec<Expr>, payload: CasePayload) -> ChoiceCase {
    ChoiceCase {
        pos: SourcePos::default(),
        mode: SelectorMode::Exact,
        values,
        is_default: false,
        payload,
    }
}

fn default_case(payload: CasePayload) -> ChoiceCase {
    ChoiceCase {
        pos: SourcePos::default(),
        mode: SelectorMode::Exact,
        values: Vec::new(),
        is_default: true,
        payload,
    }
}

fn inline_struct(name: &str, items: Vec<ds_ast::StructItem>) -> CasePayload {
    CasePayload::InlineStruct(InlineStructField {
        pos: SourcePos::default(),
        doc: None,
        name: name.to_string(),
        items,
        condition: None,
        constraint: None,
    })
}

#[test]
fn inline_discriminator_saves_and_restores_the_cursor() {
    let mut module = Module::default();
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "NameOrId".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::Inline(u8()),
        cases: vec![
            exact_case(
                vec![Expr::int(0xFF)],
                inline_struct(
                    "ordinal_value",
                    vec![field(u8(), "marker"), field(u16(), "ordinal")],
                ),
            ),
            default_case(inline_struct(
                "string_value",
                vec![
                    field(u8(), "length"),
                    field(array(u8(), Expr::ident("length")), "chars"),
                ],
            )),
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    // Synthesized payload types exist and are defined before the choice.
    assert!(code.contains("struct NameOrId__ordinal_value_case__type {"));
    assert!(code.contains("struct NameOrId__string_value_default__type {"));

    // Save, read, dispatch, restore.
    assert!(code.contains("const uint8_t* saved_data_pos = data;"));
    assert!(code.contains("uint8_t selector_value = read_uint8(data, end);"));
    assert!(code.contains("if (selector_value == (255))"));
    assert!(code.contains("data = saved_data_pos;"));

    // The default case lives in an else block, never unconditionally.
    let read_pos = code
        .find("static NameOrId read(const uint8_t*& data, const uint8_t* end)")
        .expect("unified reader present");
    let if_pos = code[read_pos..].find("if (selector_value").unwrap() + read_pos;
    let else_pos = code[if_pos..].find("} else {").map(|p| p + if_pos);
    assert!(else_pos.is_some(), "default case needs an else block");
    let default_read = code[if_pos..]
        .find("read_as_string_value(data, end)")
        .map(|p| p + if_pos)
        .expect("default payload is read");
    assert!(else_pos.unwrap() < default_read, "default read happens inside the else");
}

#[test]
fn range_selector_modes_compare_against_the_bound() {
    let mut module = Module::default();
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "ControlClass".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::Inline(u8()),
        cases: vec![
            ChoiceCase {
                pos: SourcePos::default(),
                mode: SelectorMode::Ge,
                values: vec![Expr::int(0x80)],
                is_default: false,
                payload: CasePayload::Field(FieldDef::plain(u8(), "class_id")),
            },
            default_case(CasePayload::Field(FieldDef::plain(u8(), "string_length"))),
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("if (selector_value >= (128))"));
    // Both payloads are the discriminator byte itself: the cursor rewinds
    // before either arm reads.
    let dispatch = code
        .find("if (selector_value >= (128))")
        .unwrap();
    let arm = &code[dispatch..];
    assert!(arm.contains("data = saved_data_pos;"));
    assert!(code.contains("read_as_class_id(data, end)"));
    assert!(code.contains("read_as_string_length(data, end)"));
}

#[test]
fn choice_without_default_reports_unmatched_selector() {
    let mut module = Module::default();
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Strict".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::Inline(u8()),
        cases: vec![
            exact_case(
                vec![Expr::int(1), Expr::int(2)],
                CasePayload::Field(FieldDef::plain(u16(), "word")),
            ),
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    // OR-joined exact values, final else raises.
    assert!(code.contains("if (selector_value == (1) || selector_value == (2))"));
    assert!(code.contains("} else {"));
    assert!(code.contains("throw UnmatchedChoice(\"No case matched selector in 'Strict'\");"));
}

#[test]
fn multiple_cases_chain_with_else_if() {
    let mut module = Module::default();
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "MultiCase".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::Inline(u16()),
        cases: vec![
            exact_case(vec![Expr::int(1)], CasePayload::Field(FieldDef::plain(u32(), "case1"))),
            exact_case(vec![Expr::int(2)], CasePayload::Field(FieldDef::plain(u32(), "case2"))),
            exact_case(vec![Expr::int(3)], CasePayload::Field(FieldDef::plain(u32(), "case3"))),
            default_case(CasePayload::Field(FieldDef::plain(u32(), "default_val"))),
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    let else_if_count = code.matches("} else if (selector_value ==").count();
    assert_eq!(else_if_count, 2, "cases after the first chain as else if");
    assert!(code.contains("} else {"), "default is a plain else");
}

#[test]
fn external_selector_is_evaluated_in_the_enclosing_scope() {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();
    module.choices.push(ChoiceDef {
        pos: SourcePos::default(),
        doc: None,
        name: "MessagePayload".to_string(),
        parameters: Vec::new(),
        selector: ChoiceSelector::On(Expr::ident("msg_type")),
        cases: vec![
            exact_case(vec![Expr::int(1)], CasePayload::Field(FieldDef::plain(u32(), "value"))),
            default_case(CasePayload::Field(FieldDef::plain(u8(), "byte_value"))),
        ],
    });
    module.structs.push(struct_def(
        "Container",
        vec![
            field(u8(), "msg_type"),
            field(named(&mut ids, "MessagePayload"), "payload"),
        ],
    ));

    let mut set = make_set(module, ids);
    let code = compile_cpp(&mut set);

    // The choice takes the selector as a parameter; the enclosing struct
    // passes its already-read field.
    assert!(code.contains(
        "static MessagePayload read(const uint8_t*& data, const uint8_t* end, uint64_t selector_value)"
    ));
    assert!(code.contains(
        "obj.payload = MessagePayload::read(data, end, static_cast<uint64_t>(obj.msg_type));"
    ));
    // No inline discriminator, so no cursor bookkeeping.
    let choice_read = code
        .find("static MessagePayload read(")
        .unwrap();
    let choice_end = code[choice_read..].find("static ReadResult<MessagePayload>").unwrap() + choice_read;
    assert!(!code[choice_read..choice_end].contains("saved_data_pos"));
}

#[test]
fn union_reader_tries_cases_in_declaration_order() {
    let mut module = Module::default();
    module.unions.push(ds_ast::UnionDef {
        pos: SourcePos::default(),
        doc: None,
        name: "IntOrPair".to_string(),
        parameters: Vec::new(),
        cases: vec![
            ds_ast::UnionCase {
                pos: SourcePos::default(),
                name: "single".to_string(),
                condition: None,
                items: vec![field(u32(), "word")],
            },
            ds_ast::UnionCase {
                pos: SourcePos::default(),
                name: "pair".to_string(),
                condition: None,
                items: vec![field(u16(), "first"), field(u16(), "second")],
            },
        ],
    });

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("struct single_t {"));
    assert!(code.contains("struct pair_t {"));
    assert!(code.contains("std::variant<std::monostate, single_t, pair_t> value;"));
    assert!(code.contains("static IntOrPair read_as_single(const uint8_t*& data, const uint8_t* end)"));
    assert!(code.contains("catch (const ConstraintViolation&)"));

    let single_try = code.find("return read_as_single(data, end);").unwrap();
    let pair_try = code.find("return read_as_pair(data, end);").unwrap();
    assert!(single_try < pair_try, "declaration order preserved");
    assert!(code.contains("throw ConstraintViolation(\"No union case matched in 'IntOrPair'\");"));
}
