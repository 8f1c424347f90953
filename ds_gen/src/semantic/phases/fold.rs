//! Phase 4: constant evaluation.
//!
//! Folds constant definitions and compile-time array sizes in the 64-bit
//! unsigned domain with wraparound. Signed negation stays representable as
//! a `negate` over the wrapped value and survives into codegen untouched.
//! Cycles are detected with an in-progress mark; each cycle reports exactly
//! one `E_CIRCULAR_CONSTANT` naming the constant whose folding re-entered.

use crate::semantic::diagnostics::{codes, Diagnostic};
use crate::semantic::AnalyzedModuleSet;
use ds_ast::{BinaryOp, ConstantDef, Expr, ExprKind, ModuleSet, StructItem, Type, TypeKind, UnaryOp};
use indexmap::IndexMap;
use std::collections::HashMap;

pub fn evaluate_constants(
    modules: &ModuleSet,
    analyzed: &mut AnalyzedModuleSet,
    diags: &mut Vec<Diagnostic>,
) {
    let mut defs: IndexMap<String, &ConstantDef> = IndexMap::new();
    for (_, module) in modules.modules() {
        for constant in &module.constants {
            defs.entry(constant.name.clone()).or_insert(constant);
        }
    }

    let mut folder = Folder {
        defs: &defs,
        status: HashMap::new(),
        diags,
    };

    let names: Vec<String> = defs.keys().cloned().collect();
    for name in &names {
        folder.fold(name);
    }

    for (name, status) in folder.status {
        if let Status::Done(value) = status {
            analyzed.constant_values.insert(name, value);
        }
    }
    analyzed
        .constant_values
        .sort_by(|a, _, b, _| defs.get_index_of(a).cmp(&defs.get_index_of(b)));

    // Array sizes that must be static are folded here too, so errors such
    // as division by zero surface in this phase rather than during layout.
    for (_, module) in modules.modules() {
        for struct_def in &module.structs {
            for item in &struct_def.body {
                if let StructItem::Field(field) = item {
                    fold_static_array_sizes(&field.field_type, analyzed, diags);
                }
            }
        }
    }
}

fn fold_static_array_sizes(ty: &Type, analyzed: &AnalyzedModuleSet, diags: &mut Vec<Diagnostic>) {
    match &ty.kind {
        TypeKind::ArrayFixed { element, size } => {
            eval_expr(size, &analyzed.constant_values, Some(diags));
            fold_static_array_sizes(element, analyzed, diags);
        }
        TypeKind::ArrayRanged { element, .. } | TypeKind::ArrayUnsized { element } => {
            fold_static_array_sizes(element, analyzed, diags);
        }
        _ => {}
    }
}

#[derive(Clone, Copy)]
enum Status {
    InProgress,
    Done(u64),
    Failed,
}

struct Folder<'a, 'd> {
    defs: &'a IndexMap<String, &'a ConstantDef>,
    status: HashMap<String, Status>,
    diags: &'d mut Vec<Diagnostic>,
}

impl Folder<'_, '_> {
    fn fold(&mut self, name: &str) -> Option<u64> {
        match self.status.get(name) {
            Some(Status::Done(value)) => return Some(*value),
            Some(Status::Failed) => return None,
            Some(Status::InProgress) => {
                let pos = self
                    .defs
                    .get(name)
                    .map(|def| def.pos.clone())
                    .unwrap_or_default();
                self.diags.push(Diagnostic::error(
                    codes::E_CIRCULAR_CONSTANT,
                    format!("Constant '{}' has a circular definition", name),
                    pos,
                ));
                self.status.insert(name.to_string(), Status::Failed);
                return None;
            }
            None => {}
        }

        let Some(def) = self.defs.get(name).copied() else {
            return None;
        };

        self.status.insert(name.to_string(), Status::InProgress);
        let value = self.eval(&def.value);
        let entry = self
            .status
            .get_mut(name)
            .expect("constant status present during fold");
        // A cycle report may already have flipped this to Failed; keep it.
        if matches!(entry, Status::InProgress) {
            *entry = match value {
                Some(v) => Status::Done(v),
                None => Status::Failed,
            };
        }
        value.filter(|_| matches!(self.status.get(name), Some(Status::Done(_))))
    }

    fn eval(&mut self, expr: &Expr) -> Option<u64> {
        match &expr.kind {
            ExprKind::IntLiteral(value) => Some(*value),
            ExprKind::Identifier(name) => {
                let name = name.clone();
                self.fold(&name)
            }
            ExprKind::Unary(unary) => {
                let operand = self.eval(&unary.operand)?;
                match unary.op {
                    UnaryOp::Negate => Some(operand.wrapping_neg()),
                    UnaryOp::Positive => Some(operand),
                    UnaryOp::BitNot => Some(!operand),
                    UnaryOp::Not => None,
                }
            }
            ExprKind::Binary(binary) => {
                let left = self.eval(&binary.left)?;
                let right = self.eval(&binary.right)?;
                apply_binary(binary.op, left, right, &expr.pos, Some(&mut *self.diags))
            }
            _ => None,
        }
    }
}

fn apply_binary(
    op: BinaryOp,
    left: u64,
    right: u64,
    pos: &ds_ast::SourcePos,
    diags: Option<&mut Vec<Diagnostic>>,
) -> Option<u64> {
    match op {
        BinaryOp::Add => Some(left.wrapping_add(right)),
        BinaryOp::Sub => Some(left.wrapping_sub(right)),
        BinaryOp::Mul => Some(left.wrapping_mul(right)),
        BinaryOp::Div | BinaryOp::Mod => {
            if right == 0 {
                if let Some(diags) = diags {
                    diags.push(Diagnostic::error(
                        codes::E_DIVISION_BY_ZERO,
                        format!(
                            "Constant expression divides by zero ('{}')",
                            op.symbol()
                        ),
                        pos.clone(),
                    ));
                }
                None
            } else if op == BinaryOp::Div {
                Some(left / right)
            } else {
                Some(left % right)
            }
        }
        BinaryOp::BitAnd => Some(left & right),
        BinaryOp::BitOr => Some(left | right),
        BinaryOp::BitXor => Some(left ^ right),
        BinaryOp::Shl => Some(left.wrapping_shl(right as u32)),
        BinaryOp::Shr => Some(left.wrapping_shr(right as u32)),
        // Comparisons and logical operators fall outside the integer
        // folding domain.
        _ => None,
    }
}

/// Folds an expression using the already-computed constant values. Used by
/// later phases and the IR builder; never reports diagnostics.
pub fn evaluate_constant_uint(expr: &Expr, values: &IndexMap<String, u64>) -> Option<u64> {
    eval_expr(expr, values, None)
}

fn eval_expr(
    expr: &Expr,
    values: &IndexMap<String, u64>,
    mut diags: Option<&mut Vec<Diagnostic>>,
) -> Option<u64> {
    match &expr.kind {
        ExprKind::IntLiteral(value) => Some(*value),
        ExprKind::Identifier(name) => values.get(name).copied(),
        ExprKind::Unary(unary) => {
            let operand = eval_expr(&unary.operand, values, diags)?;
            match unary.op {
                UnaryOp::Negate => Some(operand.wrapping_neg()),
                UnaryOp::Positive => Some(operand),
                UnaryOp::BitNot => Some(!operand),
                UnaryOp::Not => None,
            }
        }
        ExprKind::Binary(binary) => {
            let left = eval_expr(&binary.left, values, diags.as_deref_mut())?;
            let right = eval_expr(&binary.right, values, diags.as_deref_mut())?;
            apply_binary(binary.op, left, right, &expr.pos, diags)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_ast::Expr;

    #[test]
    fn folds_wrapping_arithmetic() {
        let values = IndexMap::new();
        let expr = Expr::binary(BinaryOp::Add, Expr::int(u64::MAX), Expr::int(1));
        assert_eq!(evaluate_constant_uint(&expr, &values), Some(0));
    }

    #[test]
    fn negation_wraps_in_unsigned_domain() {
        let values = IndexMap::new();
        let expr = Expr::unary(UnaryOp::Negate, Expr::int(1));
        assert_eq!(evaluate_constant_uint(&expr, &values), Some(u64::MAX));
    }

    #[test]
    fn identifier_resolves_through_values() {
        let mut values = IndexMap::new();
        values.insert("WIDTH".to_string(), 16u64);
        let expr = Expr::binary(BinaryOp::Mul, Expr::ident("WIDTH"), Expr::int(2));
        assert_eq!(evaluate_constant_uint(&expr, &values), Some(32));
    }
}
