//! Phase 2: name resolution.
//!
//! Resolves every qualified name in type position through the symbol table
//! and records the result in `resolved_types`. Lookup tries the symbol
//! kinds in fixed order: struct, union, enum, subtype, choice.
//!
//! Identifiers in expression position are deliberately not errored here:
//! they may be parameters or field references whose resolution depends on
//! the enclosing reader scope.

use crate::semantic::diagnostics::{codes, Diagnostic};
use crate::semantic::symbols::SymbolTable;
use crate::semantic::{AnalyzedModuleSet, ResolvedTarget};
use ds_ast::{Expr, ExprKind, Module, ModuleSet, QualifiedName, StructItem, Type, TypeKind};

pub fn resolve_names(
    modules: &ModuleSet,
    analyzed: &mut AnalyzedModuleSet,
    diags: &mut Vec<Diagnostic>,
) {
    for (_, module) in modules.modules() {
        resolve_module(module, analyzed, diags);
    }
}

fn resolve_qualified_name(
    qname: &QualifiedName,
    symbols: &SymbolTable,
    diags: &mut Vec<Diagnostic>,
) -> Option<ResolvedTarget> {
    if let Some(def) = symbols.find_struct_qualified(&qname.parts) {
        return Some(ResolvedTarget::Struct(def));
    }
    if let Some(def) = symbols.find_union_qualified(&qname.parts) {
        return Some(ResolvedTarget::Union(def));
    }
    if let Some(def) = symbols.find_enum_qualified(&qname.parts) {
        return Some(ResolvedTarget::Enum(def));
    }
    if let Some(def) = symbols.find_subtype_qualified(&qname.parts) {
        return Some(ResolvedTarget::Subtype(def));
    }
    if let Some(def) = symbols.find_choice_qualified(&qname.parts) {
        return Some(ResolvedTarget::Choice(def));
    }

    diags.push(
        Diagnostic::error(
            codes::E_UNDEFINED_TYPE,
            format!("Type '{}' not found", qname.joined()),
            qname.pos.clone(),
        )
        .with_suggestion("Check spelling and imports"),
    );
    None
}

fn resolve_type(ty: &Type, analyzed: &mut AnalyzedModuleSet, diags: &mut Vec<Diagnostic>) {
    match &ty.kind {
        TypeKind::Named { name, args } => {
            if let Some(target) = resolve_qualified_name(name, &analyzed.symbols, diags) {
                analyzed.resolved_types.insert(name.id, target);
            }
            for arg in args {
                resolve_expr(arg, analyzed, diags);
            }
        }
        TypeKind::ArrayFixed { element, size } => {
            resolve_type(element, analyzed, diags);
            resolve_expr(size, analyzed, diags);
        }
        TypeKind::ArrayRanged { element, min, max } => {
            resolve_type(element, analyzed, diags);
            if let Some(min) = min {
                resolve_expr(min, analyzed, diags);
            }
            resolve_expr(max, analyzed, diags);
        }
        TypeKind::ArrayUnsized { element } => {
            resolve_type(element, analyzed, diags);
        }
        TypeKind::BitFieldExpr { width } => {
            resolve_expr(width, analyzed, diags);
        }
        // Primitives, bool, string, fixed bitfields: nothing to resolve.
        _ => {}
    }
}

fn resolve_expr(expr: &Expr, analyzed: &mut AnalyzedModuleSet, diags: &mut Vec<Diagnostic>) {
    match &expr.kind {
        ExprKind::Unary(unary) => resolve_expr(&unary.operand, analyzed, diags),
        ExprKind::Binary(binary) => {
            resolve_expr(&binary.left, analyzed, diags);
            resolve_expr(&binary.right, analyzed, diags);
        }
        ExprKind::Ternary(ternary) => {
            resolve_expr(&ternary.condition, analyzed, diags);
            resolve_expr(&ternary.true_expr, analyzed, diags);
            resolve_expr(&ternary.false_expr, analyzed, diags);
        }
        ExprKind::FieldAccess(access) => resolve_expr(&access.object, analyzed, diags),
        ExprKind::ArrayIndex(index) => {
            resolve_expr(&index.array, analyzed, diags);
            resolve_expr(&index.index, analyzed, diags);
        }
        ExprKind::FunctionCall(call) => {
            resolve_expr(&call.function, analyzed, diags);
            for arg in &call.arguments {
                resolve_expr(arg, analyzed, diags);
            }
        }
        // Literals and bare identifiers: nothing to record here.
        _ => {}
    }
}

fn resolve_items(items: &[StructItem], analyzed: &mut AnalyzedModuleSet, diags: &mut Vec<Diagnostic>) {
    for item in items {
        match item {
            StructItem::Field(field) => {
                resolve_type(&field.field_type, analyzed, diags);
                if let Some(condition) = &field.condition {
                    resolve_expr(condition, analyzed, diags);
                }
                if let Some(constraint) = &field.constraint {
                    resolve_expr(constraint, analyzed, diags);
                }
            }
            StructItem::Function(func) => {
                resolve_type(&func.return_type, analyzed, diags);
                for param in &func.parameters {
                    resolve_type(&param.param_type, analyzed, diags);
                }
                for stmt in &func.body {
                    match stmt {
                        ds_ast::Statement::Return(expr) => resolve_expr(expr, analyzed, diags),
                        ds_ast::Statement::Expression(expr) => resolve_expr(expr, analyzed, diags),
                    }
                }
            }
            StructItem::Label(label) => resolve_expr(&label.expr, analyzed, diags),
            // Alignment carries a literal; inline items are gone after
            // Phase 0 and silently skipped if they somehow remain.
            _ => {}
        }
    }
}

fn resolve_module(module: &Module, analyzed: &mut AnalyzedModuleSet, diags: &mut Vec<Diagnostic>) {
    for constant in &module.constants {
        resolve_type(&constant.ctype, analyzed, diags);
        resolve_expr(&constant.value, analyzed, diags);
    }

    for subtype in &module.subtypes {
        resolve_type(&subtype.base, analyzed, diags);
        resolve_expr(&subtype.predicate, analyzed, diags);
    }

    for struct_def in &module.structs {
        for param in &struct_def.parameters {
            resolve_type(&param.param_type, analyzed, diags);
        }
        resolve_items(&struct_def.body, analyzed, diags);
    }

    for union_def in &module.unions {
        for case in &union_def.cases {
            resolve_items(&case.items, analyzed, diags);
            if let Some(condition) = &case.condition {
                resolve_expr(condition, analyzed, diags);
            }
        }
    }

    for enum_def in &module.enums {
        resolve_type(&enum_def.base, analyzed, diags);
        for item in &enum_def.items {
            if let Some(value) = &item.value {
                resolve_expr(value, analyzed, diags);
            }
        }
    }

    for choice_def in &module.choices {
        match &choice_def.selector {
            ds_ast::ChoiceSelector::On(selector) => resolve_expr(selector, analyzed, diags),
            ds_ast::ChoiceSelector::Inline(disc) => resolve_type(disc, analyzed, diags),
        }
        for case in &choice_def.cases {
            for value in &case.values {
                resolve_expr(value, analyzed, diags);
            }
            if let Some(field) = case.payload.as_field() {
                resolve_type(&field.field_type, analyzed, diags);
                if let Some(condition) = &field.condition {
                    resolve_expr(condition, analyzed, diags);
                }
            }
        }
    }

    for constraint in &module.constraints {
        for param in &constraint.params {
            resolve_type(&param.param_type, analyzed, diags);
        }
        resolve_expr(&constraint.condition, analyzed, diags);
    }
}
