//! IR expression → C++ text.
//!
//! Context-aware: field references are prefixed with the current object
//! name in standalone readers and left bare inside struct methods, where
//! members are in scope.

use crate::codegen::ExprContext;
use crate::ir::{Bundle, IrExpr, UnaryOp};

pub struct CppExpressionRenderer<'a> {
    ctx: &'a ExprContext,
    bundle: &'a Bundle,
}

impl<'a> CppExpressionRenderer<'a> {
    pub fn new(ctx: &'a ExprContext, bundle: &'a Bundle) -> Self {
        Self { ctx, bundle }
    }

    pub fn render(&self, expr: &IrExpr) -> String {
        match expr {
            IrExpr::IntLiteral(value) => value.to_string(),
            IrExpr::BoolLiteral(value) => value.to_string(),
            IrExpr::StringLiteral(value) => format!("\"{}\"", escape_string(value)),
            IrExpr::ParameterRef(name) => name.clone(),
            IrExpr::ConstantRef(name) => name.clone(),
            IrExpr::FieldRef(name) => self.render_field_ref(name),
            IrExpr::Unary { op, operand } => {
                format!("{}({})", unary_symbol(*op), self.render(operand))
            }
            IrExpr::Binary { op, left, right } => format!(
                "({} {} {})",
                self.render(left),
                op.symbol(),
                self.render(right)
            ),
            IrExpr::Ternary {
                condition,
                true_expr,
                false_expr,
            } => format!(
                "(({}) ? ({}) : ({}))",
                self.render(condition),
                self.render(true_expr),
                self.render(false_expr)
            ),
            IrExpr::FieldAccess { object, field } => {
                format!("{}.{}", self.render(object), field)
            }
            IrExpr::ArrayIndex { array, index } => {
                format!("{}[{}]", self.render(array), self.render(index))
            }
            IrExpr::FunctionCall {
                function,
                arguments,
            } => {
                let args: Vec<String> = arguments.iter().map(|arg| self.render(arg)).collect();
                format!("{}({})", function, args.join(", "))
            }
        }
    }

    fn render_field_ref(&self, name: &str) -> String {
        // Constants referenced through a field ref (possible after
        // substitution) still render bare.
        if self.bundle.constants.contains_key(name) {
            return name.to_string();
        }
        if self.ctx.prefix_fields && !self.ctx.object_name.is_empty() {
            format!("{}.{}", self.ctx.object_name, name)
        } else {
            name.to_string()
        }
    }
}

fn unary_symbol(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Negate => "-",
        UnaryOp::Positive => "+",
        UnaryOp::Not => "!",
        UnaryOp::BitNot => "~",
    }
}

fn escape_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinaryOp;

    #[test]
    fn field_refs_prefix_in_reader_context() {
        let bundle = Bundle::new("t");
        let ctx = ExprContext::reader("obj");
        let renderer = CppExpressionRenderer::new(&ctx, &bundle);
        let expr = IrExpr::Binary {
            op: BinaryOp::Gt,
            left: Box::new(IrExpr::FieldRef("count".into())),
            right: Box::new(IrExpr::IntLiteral(4)),
        };
        assert_eq!(renderer.render(&expr), "(obj.count > 4)");
    }

    #[test]
    fn field_refs_stay_bare_in_methods() {
        let bundle = Bundle::new("t");
        let ctx = ExprContext::method();
        let renderer = CppExpressionRenderer::new(&ctx, &bundle);
        let expr = IrExpr::FieldRef("count".into());
        assert_eq!(renderer.render(&expr), "count");
    }
}
