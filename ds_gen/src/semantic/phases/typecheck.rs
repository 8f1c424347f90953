//! Phase 3: type checking.
//!
//! Verifies argument counts at parameterized-type uses and
//! primitive-vs-non-primitive compatibility for operator operands and enum
//! base types. Checks are best-effort: unresolved names left behind by
//! Phase 2 are skipped, not re-reported.

use crate::semantic::diagnostics::{codes, Diagnostic};
use crate::semantic::{AnalyzedModuleSet, ResolvedTarget};
use ds_ast::{
    BinaryOp, Expr, ExprKind, Module, ModuleSet, StructItem, Type, TypeKind,
};

pub fn check_types(
    modules: &ModuleSet,
    analyzed: &AnalyzedModuleSet,
    diags: &mut Vec<Diagnostic>,
) {
    for (_, module) in modules.modules() {
        check_module(modules, module, analyzed, diags);
    }
}

fn check_module(
    modules: &ModuleSet,
    module: &Module,
    analyzed: &AnalyzedModuleSet,
    diags: &mut Vec<Diagnostic>,
) {
    for struct_def in &module.structs {
        for item in &struct_def.body {
            if let StructItem::Field(field) = item {
                check_type_use(modules, &field.field_type, analyzed, diags);
                if let Some(condition) = &field.condition {
                    check_expr(condition, diags);
                }
            }
        }
    }

    for union_def in &module.unions {
        for case in &union_def.cases {
            for item in &case.items {
                if let StructItem::Field(field) = item {
                    check_type_use(modules, &field.field_type, analyzed, diags);
                }
            }
        }
    }

    for choice_def in &module.choices {
        for case in &choice_def.cases {
            if let Some(field) = case.payload.as_field() {
                check_type_use(modules, &field.field_type, analyzed, diags);
            }
        }
    }

    for enum_def in &module.enums {
        match &enum_def.base.kind {
            TypeKind::Primitive { .. } => {}
            _ => diags.push(Diagnostic::error(
                codes::E_TYPE_MISMATCH,
                format!(
                    "Enum '{}' must have an integer primitive base type",
                    enum_def.name
                ),
                enum_def.pos.clone(),
            )),
        }
    }

    for constraint in &module.constraints {
        check_expr(&constraint.condition, diags);
    }
}

fn check_type_use(
    modules: &ModuleSet,
    ty: &Type,
    analyzed: &AnalyzedModuleSet,
    diags: &mut Vec<Diagnostic>,
) {
    match &ty.kind {
        TypeKind::Named { name, args } => {
            let declared = match analyzed.resolved_types.get(&name.id) {
                Some(ResolvedTarget::Struct(def)) => {
                    Some(modules.module(def.module).structs[def.index].parameters.len())
                }
                Some(ResolvedTarget::Choice(def)) => {
                    Some(modules.module(def.module).choices[def.index].parameters.len())
                }
                Some(ResolvedTarget::Union(def)) => {
                    Some(modules.module(def.module).unions[def.index].parameters.len())
                }
                // Enums and subtypes take no parameters; an argument list
                // on them is a mismatch against zero.
                Some(ResolvedTarget::Enum(_)) | Some(ResolvedTarget::Subtype(_)) => Some(0),
                None => None,
            };

            if let Some(declared) = declared {
                if declared != args.len() {
                    diags.push(Diagnostic::error(
                        codes::E_PARAMETER_COUNT_MISMATCH,
                        format!(
                            "Type '{}' expects {} argument(s), {} supplied",
                            name.joined(),
                            declared,
                            args.len()
                        ),
                        name.pos.clone(),
                    ));
                }
            }
        }
        TypeKind::ArrayFixed { element, .. }
        | TypeKind::ArrayRanged { element, .. }
        | TypeKind::ArrayUnsized { element } => {
            check_type_use(modules, element, analyzed, diags);
        }
        _ => {}
    }
}

/// Shallow operand compatibility: only literal operands carry enough type
/// information to judge here, and that is exactly where mixed-kind mistakes
/// show up in practice.
fn check_expr(expr: &Expr, diags: &mut Vec<Diagnostic>) {
    match &expr.kind {
        ExprKind::Binary(binary) => {
            check_expr(&binary.left, diags);
            check_expr(&binary.right, diags);

            let left_kind = literal_kind(&binary.left);
            let right_kind = literal_kind(&binary.right);

            if binary.op.is_logical() {
                for (side, kind) in [(&binary.left, left_kind), (&binary.right, right_kind)] {
                    if matches!(kind, Some(LiteralKind::Int) | Some(LiteralKind::Str)) {
                        diags.push(Diagnostic::error(
                            codes::E_TYPE_MISMATCH,
                            format!(
                                "Operand of '{}' must be boolean",
                                binary.op.symbol()
                            ),
                            side.pos.clone(),
                        ));
                    }
                }
            } else if let (Some(l), Some(r)) = (left_kind, right_kind) {
                if l != r && binary.op != BinaryOp::Eq && binary.op != BinaryOp::Ne {
                    diags.push(Diagnostic::error(
                        codes::E_TYPE_MISMATCH,
                        format!(
                            "Operands of '{}' have incompatible types",
                            binary.op.symbol()
                        ),
                        expr.pos.clone(),
                    ));
                }
            }
        }
        ExprKind::Unary(unary) => check_expr(&unary.operand, diags),
        ExprKind::Ternary(ternary) => {
            check_expr(&ternary.condition, diags);
            check_expr(&ternary.true_expr, diags);
            check_expr(&ternary.false_expr, diags);
        }
        _ => {}
    }
}

#[derive(PartialEq, Eq, Clone, Copy)]
enum LiteralKind {
    Int,
    Bool,
    Str,
}

fn literal_kind(expr: &Expr) -> Option<LiteralKind> {
    match &expr.kind {
        ExprKind::IntLiteral(_) => Some(LiteralKind::Int),
        ExprKind::BoolLiteral(_) => Some(LiteralKind::Bool),
        ExprKind::StringLiteral(_) => Some(LiteralKind::Str),
        _ => None,
    }
}
