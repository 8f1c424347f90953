use crate::expr::Expr;
use crate::{NodeId, SourcePos};
use serde_derive::{Deserialize, Serialize};

/// Byte order of a multi-byte primitive. `Unspec` means "inherit the
/// module's default endianness directive".
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ByteOrder {
    #[default]
    Unspec,
    Little,
    Big,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "kebab-case")]
pub enum PrimitiveType {
    U8,
    U16,
    U32,
    U64,
    U128,
    I8,
    I16,
    I32,
    I64,
    I128,
}

impl PrimitiveType {
    pub fn width_bits(&self) -> u32 {
        match self {
            PrimitiveType::U8 | PrimitiveType::I8 => 8,
            PrimitiveType::U16 | PrimitiveType::I16 => 16,
            PrimitiveType::U32 | PrimitiveType::I32 => 32,
            PrimitiveType::U64 | PrimitiveType::I64 => 64,
            PrimitiveType::U128 | PrimitiveType::I128 => 128,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        (self.width_bits() / 8) as u64
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            PrimitiveType::I8
                | PrimitiveType::I16
                | PrimitiveType::I32
                | PrimitiveType::I64
                | PrimitiveType::I128
        )
    }

    /// Surface keyword (`uint8`, `int64`, ...), used by diagnostics and the
    /// pretty-printer.
    pub fn keyword(&self) -> &'static str {
        match self {
            PrimitiveType::U8 => "uint8",
            PrimitiveType::U16 => "uint16",
            PrimitiveType::U32 => "uint32",
            PrimitiveType::U64 => "uint64",
            PrimitiveType::U128 => "uint128",
            PrimitiveType::I8 => "int8",
            PrimitiveType::I16 => "int16",
            PrimitiveType::I32 => "int32",
            PrimitiveType::I64 => "int64",
            PrimitiveType::I128 => "int128",
        }
    }
}

/// A dotted name in type position, resolved by the analyzer. Carries a
/// [`NodeId`] so resolution results can live in side tables instead of
/// mutable node fields.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct QualifiedName {
    pub id: NodeId,
    pub pos: SourcePos,
    pub parts: Vec<String>,
}

impl QualifiedName {
    pub fn joined(&self) -> String {
        self.parts.join(".")
    }

    /// Last component; the type name proper.
    pub fn simple_name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }
}

/// A type node with its source position.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Type {
    pub pos: SourcePos,
    pub kind: TypeKind,
}

impl Type {
    pub fn new(pos: SourcePos, kind: TypeKind) -> Self {
        Self { pos, kind }
    }

    pub fn primitive(prim: PrimitiveType) -> Self {
        Self {
            pos: SourcePos::default(),
            kind: TypeKind::Primitive {
                prim,
                byte_order: ByteOrder::Unspec,
            },
        }
    }
}

/// Closed sum of every type form the surface grammar produces.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum TypeKind {
    Primitive {
        prim: PrimitiveType,
        byte_order: ByteOrder,
    },
    Bool,
    String,
    /// `bit:N` with a literal width.
    BitFieldFixed { width: u32 },
    /// `bit<expr>`; the width may fold to a constant or reference an
    /// earlier field for runtime widths.
    BitFieldExpr { width: Box<Expr> },
    /// `T[N]`; size must fold at compile time.
    ArrayFixed {
        element: Box<Type>,
        size: Box<Expr>,
    },
    /// `T[lo..hi]` / `T[..hi]`; upper bound exclusive.
    ArrayRanged {
        element: Box<Type>,
        min: Option<Box<Expr>>,
        max: Box<Expr>,
    },
    /// `T[]`; must be the last field of its struct.
    ArrayUnsized { element: Box<Type> },
    /// A user-defined type use, with type arguments when the target is
    /// parameterized (`Header(n, 2) hdr;`).
    Named {
        name: QualifiedName,
        args: Vec<Expr>,
    },
}

impl TypeKind {
    pub fn as_named(&self) -> Option<(&QualifiedName, &[Expr])> {
        match self {
            TypeKind::Named { name, args } => Some((name, args)),
            _ => None,
        }
    }

    pub fn is_bitfield(&self) -> bool {
        matches!(
            self,
            TypeKind::BitFieldFixed { .. } | TypeKind::BitFieldExpr { .. }
        )
    }
}
