use crate::expr::Expr;
use crate::types::{ByteOrder, QualifiedName, Type};
use crate::{NodeIdGen, SourcePos};
use serde_derive::{Deserialize, Serialize};

/// A parsed source file plus its packaging metadata.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct Module {
    /// Package declared by `package a.b.c;`, empty when absent.
    pub package: Vec<String>,
    /// Default endianness from a leading `little;` / `big;` directive.
    pub default_byte_order: ByteOrder,
    pub imports: Vec<ImportDecl>,
    pub constants: Vec<ConstantDef>,
    pub subtypes: Vec<SubtypeDef>,
    pub enums: Vec<EnumDef>,
    pub structs: Vec<StructDef>,
    pub unions: Vec<UnionDef>,
    pub choices: Vec<ChoiceDef>,
    pub constraints: Vec<ConstraintDef>,
}

impl Module {
    pub fn package_name(&self) -> String {
        self.package.join(".")
    }
}

/// One entry of a [`ModuleSet`]: a module plus the file it came from.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleEntry {
    pub file_path: String,
    pub module: Module,
}

/// The unit of compilation: one main module plus its imports, already
/// parsed. The analyzer takes this by mutable reference (Phase 0 is the
/// only mutating pass) and addresses definitions by module index, main
/// module first.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ModuleSet {
    pub main: ModuleEntry,
    pub imported: Vec<ModuleEntry>,
    /// Continues the parser's id sequence for nodes synthesized during
    /// desugaring.
    pub node_ids: NodeIdGen,
}

impl ModuleSet {
    pub fn from_main(module: Module) -> Self {
        Self {
            main: ModuleEntry {
                file_path: String::new(),
                module,
            },
            imported: Vec::new(),
            node_ids: NodeIdGen::new(),
        }
    }

    pub fn module_count(&self) -> usize {
        1 + self.imported.len()
    }

    /// Module by index; 0 is the main module.
    pub fn module(&self, index: usize) -> &Module {
        if index == 0 {
            &self.main.module
        } else {
            &self.imported[index - 1].module
        }
    }

    pub fn module_mut(&mut self, index: usize) -> &mut Module {
        if index == 0 {
            &mut self.main.module
        } else {
            &mut self.imported[index - 1].module
        }
    }

    pub fn modules(&self) -> impl Iterator<Item = (usize, &Module)> {
        std::iter::once(&self.main.module)
            .chain(self.imported.iter().map(|entry| &entry.module))
            .enumerate()
    }
}

/// `import x.y;` or `import x.*;`
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ImportDecl {
    pub pos: SourcePos,
    pub parts: Vec<String>,
    pub wildcard: bool,
}

impl ImportDecl {
    /// Package named by the import: everything for wildcard imports, all
    /// but the final type name otherwise.
    pub fn package_name(&self) -> String {
        if self.wildcard {
            self.parts.join(".")
        } else if self.parts.len() > 1 {
            self.parts[..self.parts.len() - 1].join(".")
        } else {
            String::new()
        }
    }

    pub fn display_name(&self) -> String {
        let mut name = self.parts.join(".");
        if self.wildcard {
            name.push_str(".*");
        }
        name
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ConstantDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub ctype: Type,
    pub name: String,
    pub value: Expr,
}

/// `subtype BaseType Name : <predicate over 'this'>;`
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct SubtypeDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub base: Type,
    pub predicate: Expr,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EnumItem {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub value: Option<Expr>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct EnumDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub base: Type,
    pub is_bitmask: bool,
    pub items: Vec<EnumItem>,
}

/// Declared parameter of a struct, choice, or constraint.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Param {
    pub pos: SourcePos,
    pub name: String,
    pub param_type: Type,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FieldDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub field_type: Type,
    pub name: String,
    /// Guard: the field is only read when the condition holds.
    pub condition: Option<Expr>,
    /// Inline constraint over the freshly read value.
    pub constraint: Option<Expr>,
    pub default: Option<Expr>,
}

impl FieldDef {
    pub fn plain(field_type: Type, name: impl Into<String>) -> Self {
        Self {
            pos: SourcePos::default(),
            doc: None,
            field_type,
            name: name.into(),
            condition: None,
            constraint: None,
            default: None,
        }
    }
}

/// `expr:` — seek to `start + expr` before reading the next field.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct LabelDirective {
    pub pos: SourcePos,
    pub expr: Expr,
}

/// `align(N):` — pad to the next N-byte boundary.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct AlignDirective {
    pub pos: SourcePos,
    pub boundary: u32,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum Statement {
    Return(Expr),
    Expression(Expr),
}

/// A named method on a struct; body is a statement list.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FunctionDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub parameters: Vec<Param>,
    pub return_type: Type,
    pub body: Vec<Statement>,
}

/// Anonymous `union { ... } name;` field, removed by desugaring.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct InlineUnionField {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub cases: Vec<UnionCase>,
    pub condition: Option<Expr>,
    pub constraint: Option<Expr>,
}

/// Anonymous `{ ... } name;` struct field, removed by desugaring.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct InlineStructField {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub items: Vec<StructItem>,
    pub condition: Option<Expr>,
    pub constraint: Option<Expr>,
}

/// One item of a struct or union-case body.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum StructItem {
    Field(FieldDef),
    InlineUnion(InlineUnionField),
    InlineStruct(InlineStructField),
    Label(LabelDirective),
    Align(AlignDirective),
    Function(FunctionDef),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct StructDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub parameters: Vec<Param>,
    pub body: Vec<StructItem>,
}

impl StructDef {
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.body.iter().filter_map(|item| match item {
            StructItem::Field(field) => Some(field),
            _ => None,
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDef> {
        self.body.iter().filter_map(|item| match item {
            StructItem::Function(func) => Some(func),
            _ => None,
        })
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct UnionCase {
    pub pos: SourcePos,
    pub name: String,
    pub condition: Option<Expr>,
    pub items: Vec<StructItem>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct UnionDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub parameters: Vec<Param>,
    pub cases: Vec<UnionCase>,
}

/// How a choice case matches the selector value.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SelectorMode {
    #[default]
    Exact,
    Ge,
    Gt,
    Le,
    Lt,
    Ne,
}

impl SelectorMode {
    pub fn symbol(&self) -> &'static str {
        match self {
            SelectorMode::Exact => "==",
            SelectorMode::Ge => ">=",
            SelectorMode::Gt => ">",
            SelectorMode::Le => "<=",
            SelectorMode::Lt => "<",
            SelectorMode::Ne => "!=",
        }
    }
}

/// Payload of a choice case: a regular field or an inline aggregate that
/// desugaring rewrites into a named type.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum CasePayload {
    Field(FieldDef),
    InlineStruct(InlineStructField),
    InlineUnion(InlineUnionField),
}

impl CasePayload {
    pub fn as_field(&self) -> Option<&FieldDef> {
        match self {
            CasePayload::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            CasePayload::Field(field) => &field.name,
            CasePayload::InlineStruct(inline) => &inline.name,
            CasePayload::InlineUnion(inline) => &inline.name,
        }
    }

    pub fn pos(&self) -> &SourcePos {
        match self {
            CasePayload::Field(field) => &field.pos,
            CasePayload::InlineStruct(inline) => &inline.pos,
            CasePayload::InlineUnion(inline) => &inline.pos,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ChoiceCase {
    pub pos: SourcePos,
    pub mode: SelectorMode,
    /// Case values; empty for the default case. Exact-mode cases may list
    /// several values (OR-joined); range modes carry exactly one bound.
    pub values: Vec<Expr>,
    pub is_default: bool,
    pub payload: CasePayload,
}

/// Selector of a choice: either an expression over the enclosing scope or
/// an inline discriminator the choice reads itself.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub enum ChoiceSelector {
    On(Expr),
    Inline(Type),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ChoiceDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub parameters: Vec<Param>,
    pub selector: ChoiceSelector,
    pub cases: Vec<ChoiceCase>,
}

impl ChoiceDef {
    pub fn default_case(&self) -> Option<&ChoiceCase> {
        self.cases.iter().find(|case| case.is_default)
    }
}

/// Named boolean predicate with typed parameters.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ConstraintDef {
    pub pos: SourcePos,
    pub doc: Option<String>,
    pub name: String,
    pub params: Vec<Param>,
    pub condition: Expr,
}
