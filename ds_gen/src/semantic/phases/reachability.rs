//! Phase 7: reachability analysis.
//!
//! Marks constants and imports referenced anywhere in the module set and
//! warns about the rest. Types are deliberately not flagged: in a schema
//! language, top-level types are legitimate entry points even when nothing
//! else references them.

use crate::semantic::diagnostics::{codes, Diagnostic};
use crate::semantic::AnalyzedModuleSet;
use ds_ast::{Expr, ExprKind, Module, ModuleSet, StructItem, Type, TypeKind};
use std::collections::HashSet;

#[derive(Default)]
struct UsageTracker {
    used_constants: HashSet<String>,
    used_imports: HashSet<String>,
}

pub fn analyze_reachability(
    modules: &ModuleSet,
    analyzed: &AnalyzedModuleSet,
    diags: &mut Vec<Diagnostic>,
) {
    let mut tracker = UsageTracker::default();

    for (_, module) in modules.modules() {
        track_module(module, analyzed, &mut tracker);
    }

    for (_, module) in modules.modules() {
        for constant in &module.constants {
            if !tracker.used_constants.contains(&constant.name) {
                diags.push(Diagnostic::warning(
                    codes::W_UNUSED_CONSTANT,
                    format!("Constant '{}' is declared but never used", constant.name),
                    constant.pos.clone(),
                ));
            }
        }
        for import in &module.imports {
            let package = import.package_name();
            if !package.is_empty() && !tracker.used_imports.contains(&package) {
                diags.push(Diagnostic::warning(
                    codes::W_UNUSED_IMPORT,
                    format!("Import '{}' is declared but never used", import.display_name()),
                    import.pos.clone(),
                ));
            }
        }
    }
}

fn track_expr(expr: &Expr, analyzed: &AnalyzedModuleSet, tracker: &mut UsageTracker) {
    match &expr.kind {
        ExprKind::Identifier(name) => {
            if analyzed.symbols.find_constant(name).is_some() {
                tracker.used_constants.insert(name.clone());
            }
        }
        ExprKind::Unary(unary) => track_expr(&unary.operand, analyzed, tracker),
        ExprKind::Binary(binary) => {
            track_expr(&binary.left, analyzed, tracker);
            track_expr(&binary.right, analyzed, tracker);
        }
        ExprKind::Ternary(ternary) => {
            track_expr(&ternary.condition, analyzed, tracker);
            track_expr(&ternary.true_expr, analyzed, tracker);
            track_expr(&ternary.false_expr, analyzed, tracker);
        }
        ExprKind::FieldAccess(access) => track_expr(&access.object, analyzed, tracker),
        ExprKind::ArrayIndex(index) => {
            track_expr(&index.array, analyzed, tracker);
            track_expr(&index.index, analyzed, tracker);
        }
        ExprKind::FunctionCall(call) => {
            track_expr(&call.function, analyzed, tracker);
            for arg in &call.arguments {
                track_expr(arg, analyzed, tracker);
            }
        }
        _ => {}
    }
}

fn track_type(ty: &Type, analyzed: &AnalyzedModuleSet, tracker: &mut UsageTracker) {
    match &ty.kind {
        TypeKind::ArrayFixed { element, size } => {
            track_type(element, analyzed, tracker);
            track_expr(size, analyzed, tracker);
        }
        TypeKind::ArrayRanged { element, min, max } => {
            track_type(element, analyzed, tracker);
            if let Some(min) = min {
                track_expr(min, analyzed, tracker);
            }
            track_expr(max, analyzed, tracker);
        }
        TypeKind::ArrayUnsized { element } => track_type(element, analyzed, tracker),
        TypeKind::BitFieldExpr { width } => track_expr(width, analyzed, tracker),
        TypeKind::Named { name, args } => {
            // A resolved qualified use of `pkg.Type` marks the package's
            // import as used.
            if analyzed.resolved_types.contains_key(&name.id) && name.parts.len() > 1 {
                tracker
                    .used_imports
                    .insert(name.parts[..name.parts.len() - 1].join("."));
            }
            for arg in args {
                track_expr(arg, analyzed, tracker);
            }
        }
        _ => {}
    }
}

fn track_items(items: &[StructItem], analyzed: &AnalyzedModuleSet, tracker: &mut UsageTracker) {
    for item in items {
        match item {
            StructItem::Field(field) => {
                track_type(&field.field_type, analyzed, tracker);
                if let Some(condition) = &field.condition {
                    track_expr(condition, analyzed, tracker);
                }
                if let Some(constraint) = &field.constraint {
                    track_expr(constraint, analyzed, tracker);
                }
            }
            StructItem::Label(label) => track_expr(&label.expr, analyzed, tracker),
            StructItem::Function(func) => {
                for stmt in &func.body {
                    match stmt {
                        ds_ast::Statement::Return(expr) => track_expr(expr, analyzed, tracker),
                        ds_ast::Statement::Expression(expr) => track_expr(expr, analyzed, tracker),
                    }
                }
            }
            _ => {}
        }
    }
}

fn track_module(module: &Module, analyzed: &AnalyzedModuleSet, tracker: &mut UsageTracker) {
    for constant in &module.constants {
        track_type(&constant.ctype, analyzed, tracker);
        track_expr(&constant.value, analyzed, tracker);
    }

    for subtype in &module.subtypes {
        track_type(&subtype.base, analyzed, tracker);
        track_expr(&subtype.predicate, analyzed, tracker);
    }

    for struct_def in &module.structs {
        track_items(&struct_def.body, analyzed, tracker);
    }

    for union_def in &module.unions {
        for case in &union_def.cases {
            track_items(&case.items, analyzed, tracker);
            if let Some(condition) = &case.condition {
                track_expr(condition, analyzed, tracker);
            }
        }
    }

    for enum_def in &module.enums {
        track_type(&enum_def.base, analyzed, tracker);
        for item in &enum_def.items {
            if let Some(value) = &item.value {
                track_expr(value, analyzed, tracker);
            }
        }
    }

    for choice_def in &module.choices {
        match &choice_def.selector {
            ds_ast::ChoiceSelector::On(selector) => track_expr(selector, analyzed, tracker),
            ds_ast::ChoiceSelector::Inline(disc) => track_type(disc, analyzed, tracker),
        }
        for case in &choice_def.cases {
            for value in &case.values {
                track_expr(value, analyzed, tracker);
            }
            if let Some(field) = case.payload.as_field() {
                track_type(&field.field_type, analyzed, tracker);
                if let Some(condition) = &field.condition {
                    track_expr(condition, analyzed, tracker);
                }
            }
        }
    }

    for constraint in &module.constraints {
        for param in &constraint.params {
            track_type(&param.param_type, analyzed, tracker);
        }
        track_expr(&constraint.condition, analyzed, tracker);
    }
}
