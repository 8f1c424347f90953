use crate::SourcePos;
use serde_derive::{Deserialize, Serialize};

/// An expression node with its source position.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Expr {
    pub pos: SourcePos,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(pos: SourcePos, kind: ExprKind) -> Self {
        Self { pos, kind }
    }

    /// Convenience constructor used by synthesized nodes and tests.
    pub fn int(value: u64) -> Self {
        Self {
            pos: SourcePos::default(),
            kind: ExprKind::IntLiteral(value),
        }
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self {
            pos: SourcePos::default(),
            kind: ExprKind::Identifier(name.into()),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Self {
            pos: left.pos.clone(),
            kind: ExprKind::Binary(BinaryExpr {
                op,
                left: Box::new(left),
                right: Box::new(right),
            }),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Self {
            pos: operand.pos.clone(),
            kind: ExprKind::Unary(UnaryExpr {
                op,
                operand: Box::new(operand),
            }),
        }
    }
}

/// Closed sum of every expression form the surface grammar produces.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum ExprKind {
    IntLiteral(u64),
    BoolLiteral(bool),
    StringLiteral(String),
    /// Unresolved name; resolution is context-sensitive (constant,
    /// parameter, or field reference).
    Identifier(String),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Ternary(TernaryExpr),
    FieldAccess(FieldAccessExpr),
    ArrayIndex(ArrayIndexExpr),
    FunctionCall(FunctionCallExpr),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum UnaryOp {
    Negate,
    Positive,
    Not,
    BitNot,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    /// Surface spelling, used in diagnostics.
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub operand: Box<Expr>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct TernaryExpr {
    pub condition: Box<Expr>,
    pub true_expr: Box<Expr>,
    pub false_expr: Box<Expr>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FieldAccessExpr {
    pub object: Box<Expr>,
    pub field: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ArrayIndexExpr {
    pub array: Box<Expr>,
    pub index: Box<Expr>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionCallExpr {
    pub function: Box<Expr>,
    pub arguments: Vec<Expr>,
}

impl ExprKind {
    /// True when the expression cannot depend on runtime data. Identifiers
    /// count as potentially-constant because they may name constants; the
    /// analyzer decides during folding.
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            ExprKind::IntLiteral(_) | ExprKind::BoolLiteral(_) | ExprKind::StringLiteral(_)
        )
    }
}
