//! Phase 6: constraint validation.
//!
//! Flags constraints that can never fire or never pass, dead guarded
//! fields, and duplicate choice case values. Field guards and union case
//! conditions get the same tautology analysis as constraint definitions,
//! downgraded to warnings: a dead field is legal, just useless.

use crate::semantic::diagnostics::{codes, Diagnostic};
use crate::semantic::phases::fold::evaluate_constant_uint;
use crate::semantic::AnalyzedModuleSet;
use ds_ast::{
    BinaryOp, ChoiceDef, ConstraintDef, Expr, ExprKind, Module, ModuleSet, SourcePos, StructDef,
    StructItem, UnionDef,
};
use std::collections::BTreeMap;

pub fn validate_constraints(
    modules: &ModuleSet,
    analyzed: &AnalyzedModuleSet,
    diags: &mut Vec<Diagnostic>,
) {
    for (_, module) in modules.modules() {
        validate_module(module, analyzed, diags);
    }
}

fn validate_module(module: &Module, analyzed: &AnalyzedModuleSet, diags: &mut Vec<Diagnostic>) {
    for constraint in &module.constraints {
        validate_constraint_condition(constraint, diags);
    }
    for struct_def in &module.structs {
        validate_struct_field_conditions(struct_def, diags);
    }
    for union_def in &module.unions {
        validate_union_conditions(union_def, diags);
    }
    for choice_def in &module.choices {
        validate_choice(choice_def, analyzed, diags);
    }
}

/// Truth value of an expression that is decidable without context: boolean
/// literals and self-comparisons of one identifier.
fn constant_truth(expr: &Expr) -> Option<bool> {
    match &expr.kind {
        ExprKind::BoolLiteral(value) => Some(*value),
        ExprKind::Binary(binary) => {
            let (ExprKind::Identifier(left), ExprKind::Identifier(right)) =
                (&binary.left.kind, &binary.right.kind)
            else {
                return None;
            };
            if left != right {
                return None;
            }
            match binary.op {
                BinaryOp::Eq | BinaryOp::Le | BinaryOp::Ge => Some(true),
                BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Gt => Some(false),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Human-readable reason attached to tautology reports.
fn truth_reason(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::BoolLiteral(value) => format!("literal '{}'", value),
        ExprKind::Binary(binary) => {
            if let ExprKind::Identifier(name) = &binary.left.kind {
                format!(
                    "comparing '{}' with itself using {}",
                    name,
                    binary.op.symbol()
                )
            } else {
                String::new()
            }
        }
        _ => String::new(),
    }
}

fn validate_constraint_condition(constraint: &ConstraintDef, diags: &mut Vec<Diagnostic>) {
    match constant_truth(&constraint.condition) {
        Some(true) => diags.push(Diagnostic::warning(
            codes::W_DEPRECATED,
            format!(
                "Constraint '{}' is always true and has no effect ({})",
                constraint.name,
                truth_reason(&constraint.condition)
            ),
            constraint.pos.clone(),
        )),
        Some(false) => diags.push(Diagnostic::error(
            codes::E_CONSTRAINT_VIOLATION,
            format!(
                "Constraint '{}' is always false ({})",
                constraint.name,
                truth_reason(&constraint.condition)
            ),
            constraint.pos.clone(),
        )),
        None => {}
    }
}

fn warn_dead_condition(
    condition: &Expr,
    what: String,
    pos: &SourcePos,
    diags: &mut Vec<Diagnostic>,
) {
    match constant_truth(condition) {
        Some(false) => diags.push(Diagnostic::warning(
            codes::W_DEPRECATED,
            format!("{} has a condition that is always false", what),
            pos.clone(),
        )),
        Some(true) => diags.push(Diagnostic::warning(
            codes::W_DEPRECATED,
            format!("{} has a condition that is always true", what),
            pos.clone(),
        )),
        None => {}
    }
}

fn validate_struct_field_conditions(struct_def: &StructDef, diags: &mut Vec<Diagnostic>) {
    for item in &struct_def.body {
        if let StructItem::Field(field) = item {
            if let Some(condition) = &field.condition {
                warn_dead_condition(condition, format!("Field '{}'", field.name), &field.pos, diags);
            }
        }
    }
}

fn validate_union_conditions(union_def: &UnionDef, diags: &mut Vec<Diagnostic>) {
    for case in &union_def.cases {
        if let Some(condition) = &case.condition {
            warn_dead_condition(
                condition,
                format!("Union case '{}'", case.name),
                &case.pos,
                diags,
            );
        }
        for item in &case.items {
            if let StructItem::Field(field) = item {
                if let Some(condition) = &field.condition {
                    warn_dead_condition(
                        condition,
                        format!("Union field '{}'", field.name),
                        &field.pos,
                        diags,
                    );
                }
            }
        }
    }
}

fn validate_choice(choice_def: &ChoiceDef, analyzed: &AnalyzedModuleSet, diags: &mut Vec<Diagnostic>) {
    // Exact-match case values that fold to constants must be unique.
    let mut seen: BTreeMap<u64, SourcePos> = BTreeMap::new();

    for case in &choice_def.cases {
        if let Some(field) = case.payload.as_field() {
            if let Some(condition) = &field.condition {
                if constant_truth(condition) == Some(false) {
                    diags.push(Diagnostic::warning(
                        codes::W_DEPRECATED,
                        "Choice case field has a condition that is always false (field will never be read)",
                        field.pos.clone(),
                    ));
                }
            }
        }
        if case.is_default || case.values.is_empty() {
            continue;
        }
        if case.mode != ds_ast::SelectorMode::Exact {
            continue;
        }
        for value in &case.values {
            let Some(folded) = evaluate_constant_uint(value, &analyzed.constant_values) else {
                continue;
            };
            if let Some(previous) = seen.get(&folded) {
                diags.push(
                    Diagnostic::error(
                        codes::E_DUPLICATE_DEFINITION,
                        format!("Duplicate choice case value: {}", folded),
                        case.pos.clone(),
                    )
                    .with_related(previous.clone(), "Previous case with same value here"),
                );
            } else {
                seen.insert(folded, case.pos.clone());
            }
        }
    }
}
