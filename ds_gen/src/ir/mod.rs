//! Language-neutral intermediate representation.
//!
//! The bundle owns everything it references: names instead of pointers,
//! indices instead of back-references, expressions re-expressed in an
//! IR-owned tree. It is the boundary consumed by every backend and by the
//! Kaitai front-end, so the whole model serializes (JSON via `serde_json`,
//! YAML via `serde_yml`).
//!
//! A bundle is created once by the builder and immutable afterwards; the
//! command builder and renderers never mutate it.

pub mod builder;

pub use ds_ast::{BinaryOp, SelectorMode, UnaryOp};
use indexmap::IndexMap;
use serde_derive::{Deserialize, Serialize};

/// Schema version stamped on every serialized bundle.
pub const IR_SCHEMA_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Endianness {
    #[default]
    Little,
    Big,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PrimitiveKind {
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint128,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
}

impl PrimitiveKind {
    pub fn size_bytes(&self) -> u32 {
        match self {
            PrimitiveKind::Uint8 | PrimitiveKind::Int8 => 1,
            PrimitiveKind::Uint16 | PrimitiveKind::Int16 => 2,
            PrimitiveKind::Uint32 | PrimitiveKind::Int32 => 4,
            PrimitiveKind::Uint64 | PrimitiveKind::Int64 => 8,
            PrimitiveKind::Uint128 | PrimitiveKind::Int128 => 16,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int8
                | PrimitiveKind::Int16
                | PrimitiveKind::Int32
                | PrimitiveKind::Int64
                | PrimitiveKind::Int128
        )
    }
}

/// Which kind of definition a named type reference targets.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum NamedKind {
    Struct,
    Union,
    Enum,
    Choice,
    Subtype,
}

/// Discriminated type reference. Every array kind carries exactly the
/// expressions it requires.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum IrType {
    Primitive {
        kind: PrimitiveKind,
        byte_order: Endianness,
        size_bytes: u32,
    },
    Bool,
    String,
    /// Width folds to a literal where possible; otherwise it references an
    /// earlier field and is evaluated at runtime.
    Bitfield { width: Box<IrExpr> },
    /// Compile-time element count.
    ArrayFixed {
        element: Box<IrType>,
        size: Box<IrExpr>,
    },
    /// Runtime element count.
    ArrayVariable {
        element: Box<IrType>,
        size: Box<IrExpr>,
    },
    /// `min..max`, upper bound exclusive.
    ArrayRanged {
        element: Box<IrType>,
        min: Option<Box<IrExpr>>,
        max: Box<IrExpr>,
    },
    /// Read until the end of the buffer.
    ArrayUnsized { element: Box<IrType> },
    Named { kind: NamedKind, name: String },
}

impl IrType {
    pub fn primitive(kind: PrimitiveKind, byte_order: Endianness) -> Self {
        IrType::Primitive {
            kind,
            byte_order,
            size_bytes: kind.size_bytes(),
        }
    }

    pub fn as_primitive(&self) -> Option<(PrimitiveKind, Endianness)> {
        match self {
            IrType::Primitive {
                kind, byte_order, ..
            } => Some((*kind, *byte_order)),
            _ => None,
        }
    }
}

/// IR expression tree: the AST algebra plus explicit reference kinds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum IrExpr {
    IntLiteral(u64),
    BoolLiteral(bool),
    StringLiteral(String),
    ParameterRef(String),
    FieldRef(String),
    ConstantRef(String),
    Unary {
        op: UnaryOp,
        operand: Box<IrExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<IrExpr>,
        right: Box<IrExpr>,
    },
    Ternary {
        condition: Box<IrExpr>,
        true_expr: Box<IrExpr>,
        false_expr: Box<IrExpr>,
    },
    FieldAccess {
        object: Box<IrExpr>,
        field: String,
    },
    ArrayIndex {
        array: Box<IrExpr>,
        index: Box<IrExpr>,
    },
    FunctionCall {
        function: String,
        arguments: Vec<IrExpr>,
    },
}

impl IrExpr {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            IrExpr::IntLiteral(value) => Some(*value),
            _ => None,
        }
    }
}

/// Application of a bundle constraint to a freshly read value. The index
/// points into [`Bundle::constraints`]; arguments are caller-scope
/// expressions.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ConstraintApply {
    pub constraint: usize,
    pub arguments: Vec<IrExpr>,
}

/// Placement of a bitfield inside its run. Adjacent bitfields share a run
/// and are extracted from one batched read; a runtime-width bitfield gets
/// `run_bytes: None` and is read through the `read_bits` helper instead.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct BitfieldSlot {
    pub run: usize,
    pub first_in_run: bool,
    pub run_bytes: Option<u32>,
    pub bit_offset: u32,
    pub width_bits: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrField {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub field_type: IrType,
    /// Guard condition; the field is only read when it holds.
    #[serde(default)]
    pub guard: Option<IrExpr>,
    /// Value assigned when a guard suppresses the read.
    #[serde(default)]
    pub default: Option<IrExpr>,
    #[serde(default)]
    pub constraints: Vec<ConstraintApply>,
    /// Label directive preceding the field: seek to `start + label`.
    #[serde(default)]
    pub label: Option<IrExpr>,
    /// Alignment directive preceding the field: pad to this boundary.
    #[serde(default)]
    pub align_to: Option<u32>,
    /// Static byte offset within the aggregate, when layout could compute
    /// one.
    #[serde(default)]
    pub offset: Option<u64>,
    #[serde(default)]
    pub bit_info: Option<BitfieldSlot>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrParamDef {
    pub name: String,
    pub param_type: IrType,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum IrStatement {
    Return(IrExpr),
    Expression(IrExpr),
}

/// A struct method lowered from a DataScript `function` definition.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrFunction {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub parameters: Vec<IrParamDef>,
    pub return_type: IrType,
    pub body: Vec<IrStatement>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrStruct {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    /// Fields in the exact order they must be read.
    pub fields: Vec<IrField>,
    #[serde(default)]
    pub functions: Vec<IrFunction>,
    #[serde(default)]
    pub total_size: Option<u64>,
    #[serde(default = "default_alignment")]
    pub alignment: u64,
}

fn default_alignment() -> u64 {
    1
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrUnionCase {
    pub name: String,
    #[serde(default)]
    pub condition: Option<IrExpr>,
    pub fields: Vec<IrField>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrUnion {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub cases: Vec<IrUnionCase>,
    #[serde(default)]
    pub total_size: Option<u64>,
    #[serde(default = "default_alignment")]
    pub alignment: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrEnumItem {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub value: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrEnum {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub base: IrType,
    #[serde(default)]
    pub is_bitmask: bool,
    pub items: Vec<IrEnumItem>,
}

/// A primitive narrowed by a predicate. The predicate lives in the
/// bundle's constraint list (single parameter `value`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrSubtype {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub base: IrType,
    pub constraint: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum IrSelector {
    /// Expression evaluated in the enclosing scope before the payload.
    External(IrExpr),
    /// Discriminator the choice reads itself.
    Inline(IrType),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrChoiceCase {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub mode: SelectorMode,
    /// Case values; empty for the default case. Enum-item values are
    /// folded to integers during IR build.
    pub values: Vec<IrExpr>,
    #[serde(default)]
    pub is_default: bool,
    pub payload: IrType,
    /// Rewind the cursor to the pre-discriminator position before reading
    /// the payload (inline-discriminator choices whose payload re-reads
    /// the discriminator storage).
    #[serde(default)]
    pub restore_position: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrChoice {
    pub name: String,
    #[serde(default)]
    pub doc: Option<String>,
    pub selector: IrSelector,
    pub cases: Vec<IrChoiceCase>,
    #[serde(default)]
    pub total_size: Option<u64>,
    #[serde(default = "default_alignment")]
    pub alignment: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct IrConstraint {
    pub name: String,
    pub params: Vec<IrParamDef>,
    pub condition: IrExpr,
}

/// The full IR for one compilation: self-contained, immutable after
/// construction, deterministic in ordering.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Bundle {
    #[serde(default)]
    pub version: u32,
    pub name: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub constants: IndexMap<String, u64>,
    #[serde(default)]
    pub enums: Vec<IrEnum>,
    #[serde(default)]
    pub subtypes: Vec<IrSubtype>,
    #[serde(default)]
    pub structs: Vec<IrStruct>,
    #[serde(default)]
    pub unions: Vec<IrUnion>,
    #[serde(default)]
    pub choices: Vec<IrChoice>,
    #[serde(default)]
    pub constraints: Vec<IrConstraint>,
    /// Monomorphization suffix table: instance name to the parameterized
    /// base it was cloned from. Keeps instance naming deterministic and
    /// lets tooling trace instances back.
    #[serde(default)]
    pub mono_instances: IndexMap<String, String>,
}

impl Bundle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: IR_SCHEMA_VERSION,
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn find_struct(&self, name: &str) -> Option<&IrStruct> {
        self.structs.iter().find(|s| s.name == name)
    }

    pub fn find_enum(&self, name: &str) -> Option<&IrEnum> {
        self.enums.iter().find(|e| e.name == name)
    }

    pub fn find_union(&self, name: &str) -> Option<&IrUnion> {
        self.unions.iter().find(|u| u.name == name)
    }

    pub fn find_choice(&self, name: &str) -> Option<&IrChoice> {
        self.choices.iter().find(|c| c.name == name)
    }

    pub fn find_subtype(&self, name: &str) -> Option<&IrSubtype> {
        self.subtypes.iter().find(|s| s.name == name)
    }
}
