//! Analyzer pipeline tests: symbol collection, folding, constraint
//! validation, reachability, and diagnostic filtering.

mod common;

use common::*;
use ds_ast::{
    BinaryOp, ConstraintDef, Expr, ImportDecl, Module, NodeIdGen, Param, SourcePos,
};
use ds_gen::semantic::diagnostics::{codes, DiagnosticLevel};
use ds_gen::semantic::{analyze, AnalysisOptions};

#[test]
fn duplicate_constant_reports_one_diagnostic_with_related_location() {
    let mut module = Module::default();
    module.constants.push(constant(
        "X",
        u32(),
        Expr::int(1),
    ));
    let mut second = constant("X", u32(), Expr::int(2));
    second.pos = SourcePos::new("test.ds", 2, 1);
    module.constants.push(second);

    let mut set = make_set(module, NodeIdGen::new());
    let result = analyze(&mut set, &AnalysisOptions::default());

    let duplicates = result.diagnostics_with_code(codes::E_DUPLICATE_DEFINITION);
    assert_eq!(duplicates.len(), 1, "exactly one duplicate report");
    let diag = duplicates[0];
    assert!(
        diag.message.contains("Constant 'X'"),
        "message names the constant: {}",
        diag.message
    );
    assert!(diag.related.is_some(), "related location points at the first definition");
    assert!(result.analyzed.is_none());
}

#[test]
fn circular_constants_report_exactly_one_diagnostic() {
    let mut module = Module::default();
    module.constants.push(constant(
        "A",
        u32(),
        Expr::binary(BinaryOp::Add, Expr::ident("B"), Expr::int(1)),
    ));
    module.constants.push(constant(
        "B",
        u32(),
        Expr::binary(BinaryOp::Add, Expr::ident("A"), Expr::int(1)),
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let result = analyze(&mut set, &AnalysisOptions::default());

    let circular = result.diagnostics_with_code(codes::E_CIRCULAR_CONSTANT);
    assert_eq!(circular.len(), 1, "one report per cycle: {:?}", result.diagnostics);
    assert!(
        circular[0].message.contains("'A'") || circular[0].message.contains("'B'"),
        "message names a participant"
    );
}

#[test]
fn constant_division_by_zero_is_reported() {
    let mut module = Module::default();
    module.constants.push(constant(
        "BAD",
        u32(),
        Expr::binary(BinaryOp::Div, Expr::int(10), Expr::int(0)),
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let result = analyze(&mut set, &AnalysisOptions::default());
    assert_eq!(result.diagnostics_with_code(codes::E_DIVISION_BY_ZERO).len(), 1);
}

#[test]
fn undefined_type_gets_suggestion() {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();
    module
        .structs
        .push(struct_def("Holder", vec![field(named(&mut ids, "Missing"), "x")]));

    let mut set = make_set(module, ids);
    let result = analyze(&mut set, &AnalysisOptions::default());

    let undefined = result.diagnostics_with_code(codes::E_UNDEFINED_TYPE);
    assert_eq!(undefined.len(), 1);
    assert!(undefined[0].message.contains("'Missing'"));
    assert_eq!(
        undefined[0].suggestion.as_deref(),
        Some("Check spelling and imports")
    );
}

#[test]
fn parameter_count_mismatch_names_both_counts() {
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
        vec![field(
            named_args(&mut ids, "Block", vec![Expr::int(1), Expr::int(2)]),
            "a",
        )],
    ));

    let mut set = make_set(module, ids);
    let result = analyze(&mut set, &AnalysisOptions::default());

    let mismatches = result.diagnostics_with_code(codes::E_PARAMETER_COUNT_MISMATCH);
    assert_eq!(mismatches.len(), 1);
    assert!(mismatches[0].message.contains("expects 1 argument(s), 2 supplied"));
}

#[test]
fn keyword_collision_warns_with_sanitized_suggestion() {
    let mut module = Module::default();
    module
        .structs
        .push(struct_def("Holder", vec![field(u8(), "class")]));

    let mut set = make_set(module, NodeIdGen::new());
    let opts = AnalysisOptions {
        target_languages: vec!["cpp".to_string()],
        ..Default::default()
    };
    let result = analyze(&mut set, &opts);

    let collisions = result.diagnostics_with_code(codes::W_KEYWORD_COLLISION);
    assert_eq!(collisions.len(), 1);
    assert!(collisions[0].message.contains("'class'"));
    assert_eq!(collisions[0].suggestion.as_deref(), Some("Rename to 'class_'"));
    assert!(result.analyzed.is_some(), "warnings do not fail the run");
}

#[test]
fn unknown_target_language_lists_available_backends() {
    let mut set = make_set(Module::default(), NodeIdGen::new());
    let opts = AnalysisOptions {
        target_languages: vec!["cobol".to_string()],
        ..Default::default()
    };
    let result = analyze(&mut set, &opts);

    let unknown = result.diagnostics_with_code(codes::E_UNKNOWN_TARGET_LANGUAGE);
    assert_eq!(unknown.len(), 1);
    assert!(unknown[0].message.contains("cpp"));
    assert!(unknown[0].message.contains("datascript"));
}

#[test]
fn unused_constant_and_import_warn() {
    let mut module = Module::default();
    module.constants.push(constant("UNUSED", u32(), Expr::int(7)));
    module.imports.push(ImportDecl {
        pos: SourcePos::default(),
        parts: vec!["net".to_string(), "types".to_string()],
        wildcard: true,
    });

    let mut set = make_set(module, NodeIdGen::new());
    let result = analyze(&mut set, &AnalysisOptions::default());

    assert_eq!(result.diagnostics_with_code(codes::W_UNUSED_CONSTANT).len(), 1);
    let unused_import = result.diagnostics_with_code(codes::W_UNUSED_IMPORT);
    assert_eq!(unused_import.len(), 1);
    assert!(unused_import[0].message.contains("net.types.*"));
}

#[test]
fn referenced_constant_is_not_flagged() {
    let mut module = Module::default();
    module.constants.push(constant("LEN", u32(), Expr::int(4)));
    module.structs.push(struct_def(
        "Payload",
        vec![field(array(u8(), Expr::ident("LEN")), "data")],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let result = analyze(&mut set, &AnalysisOptions::default());
    assert!(result.diagnostics_with_code(codes::W_UNUSED_CONSTANT).is_empty());
}

#[test]
fn always_true_constraint_warns_and_always_false_errors() {
    let mut module = Module::default();
    module.constraints.push(ConstraintDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Tautology".to_string(),
        params: vec![Param {
            pos: SourcePos::default(),
            name: "x".to_string(),
            param_type: u8(),
        }],
        condition: Expr::binary(BinaryOp::Eq, Expr::ident("x"), Expr::ident("x")),
    });
    module.constraints.push(ConstraintDef {
        pos: SourcePos::default(),
        doc: None,
        name: "Contradiction".to_string(),
        params: vec![Param {
            pos: SourcePos::default(),
            name: "x".to_string(),
            param_type: u8(),
        }],
        condition: Expr::binary(BinaryOp::Ne, Expr::ident("x"), Expr::ident("x")),
    });

    let mut set = make_set(module, NodeIdGen::new());
    let result = analyze(&mut set, &AnalysisOptions::default());

    let warned = result.diagnostics_with_code(codes::W_DEPRECATED);
    assert!(warned.iter().any(|d| d.message.contains("Tautology")));
    let errors = result.diagnostics_with_code(codes::E_CONSTRAINT_VIOLATION);
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("Contradiction"));
}

#[test]
fn dead_field_guard_downgrades_to_warning() {
    let mut module = Module::default();
    let mut holder = struct_def("Holder", vec![field(u8(), "x")]);
    if let ds_ast::StructItem::Field(f) = &mut holder.body[0] {
        f.condition = Some(Expr {
            pos: SourcePos::default(),
            kind: ds_ast::ExprKind::BoolLiteral(false),
        });
    }
    module.structs.push(holder);

    let mut set = make_set(module, NodeIdGen::new());
    let result = analyze(&mut set, &AnalysisOptions::default());

    assert!(!result.has_errors(), "a dead field is legal");
    let warned = result.diagnostics_with_code(codes::W_DEPRECATED);
    assert!(warned.iter().any(|d| d.message.contains("'x'")));
}

#[test]
fn warnings_as_errors_fails_the_run() {
    let mut module = Module::default();
    module.constants.push(constant("UNUSED", u32(), Expr::int(7)));

    let mut set = make_set(module, NodeIdGen::new());
    let opts = AnalysisOptions {
        warnings_as_errors: true,
        ..Default::default()
    };
    let result = analyze(&mut set, &opts);

    assert!(result.has_errors());
    assert!(result.analyzed.is_none());
    assert_eq!(
        result.diagnostics_with_code(codes::W_UNUSED_CONSTANT)[0].level,
        DiagnosticLevel::Error
    );
}

#[test]
fn disabled_warnings_are_silenced() {
    let mut module = Module::default();
    module.constants.push(constant("UNUSED", u32(), Expr::int(7)));

    let mut set = make_set(module, NodeIdGen::new());
    let opts = AnalysisOptions {
        disabled_warnings: [codes::W_UNUSED_CONSTANT.to_string()].into_iter().collect(),
        ..Default::default()
    };
    let result = analyze(&mut set, &opts);
    assert!(result.diagnostics_with_code(codes::W_UNUSED_CONSTANT).is_empty());
}

#[test]
fn min_level_error_drops_warnings() {
    let mut module = Module::default();
    module.constants.push(constant("UNUSED", u32(), Expr::int(7)));

    let mut set = make_set(module, NodeIdGen::new());
    let opts = AnalysisOptions {
        min_level: DiagnosticLevel::Error,
        ..Default::default()
    };
    let result = analyze(&mut set, &opts);
    assert!(result.diagnostics.is_empty());
    assert!(result.analyzed.is_some());
}

#[test]
fn stop_on_first_error_halts_after_the_failing_phase() {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();
    // Phase 1 error (duplicate) plus a phase 2 error (undefined type).
    module.constants.push(constant("X", u32(), Expr::int(1)));
    module.constants.push(constant("X", u32(), Expr::int(2)));
    module
        .structs
        .push(struct_def("Holder", vec![field(named(&mut ids, "Missing"), "x")]));

    let mut set = make_set(module, ids);
    let opts = AnalysisOptions {
        stop_on_first_error: true,
        ..Default::default()
    };
    let result = analyze(&mut set, &opts);

    assert!(!result.diagnostics_with_code(codes::E_DUPLICATE_DEFINITION).is_empty());
    assert!(
        result.diagnostics_with_code(codes::E_UNDEFINED_TYPE).is_empty(),
        "later phases did not run"
    );
}

#[test]
fn desugared_inline_union_gets_synthesized_name() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Container",
        vec![ds_ast::StructItem::InlineUnion(ds_ast::InlineUnionField {
            pos: SourcePos::default(),
            doc: None,
            name: "payload".to_string(),
            cases: vec![ds_ast::UnionCase {
                pos: SourcePos::default(),
                name: "raw".to_string(),
                condition: None,
                items: vec![field(u8(), "byte_value")],
            }],
            condition: None,
            constraint: None,
        })],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    analyze_ok(&mut set);

    let unions: Vec<&str> = set.main.module.unions.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(unions, vec!["Container__payload__type"]);
    let replacement = set.main.module.structs[0].fields().next().unwrap();
    assert_eq!(replacement.name, "payload");
}
