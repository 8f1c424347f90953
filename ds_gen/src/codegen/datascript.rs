//! DataScript pretty-printer backend.
//!
//! Renders a bundle back to DataScript source, used by the Kaitai mirror
//! path and for round-tripping. Unlike the C++ backend it writes straight
//! from the IR: flat declarations need no block-level command stream.

use crate::codegen::writer::{BlockKind, CodeWriter};
use crate::codegen::{
    Backend, CodegenError, ExprContext, LanguageMetadata, OutputFile, RenderOptions,
};
use crate::ir::{
    Bundle, Endianness, IrChoice, IrEnum, IrExpr, IrField, IrFunction, IrSelector, IrStatement,
    IrStruct, IrSubtype, IrType, IrUnion, PrimitiveKind, SelectorMode, UnaryOp,
};

const DATASCRIPT_KEYWORDS: &[&str] = &[
    "package", "import", "const", "struct", "union", "choice", "enum", "subtype", "bitmask",
    "function", "if", "else", "return", "true", "false", "this", "little", "big", "bit", "case",
    "default", "on", "align", "uint8", "uint16", "uint32", "uint64", "uint128", "int8", "int16",
    "int32", "int64", "int128", "string", "bool",
];

pub struct DataScriptBackend;

impl DataScriptBackend {
    pub fn new() -> Self {
        Self
    }

    fn render_module(&self, bundle: &Bundle) -> Result<String, CodegenError> {
        let mut w = CodeWriter::new();

        if !bundle.name.is_empty() {
            w.line(&format!("package {};", bundle.name));
            w.blank();
        }
        for import in &bundle.imports {
            w.line(&format!("import {};", import));
        }
        if !bundle.imports.is_empty() {
            w.blank();
        }

        if !bundle.constants.is_empty() {
            for (name, value) in &bundle.constants {
                w.line(&format!("const uint64 {} = {};", name, value));
            }
            w.blank();
        }

        for enum_def in &bundle.enums {
            self.render_enum(enum_def, &mut w)?;
            w.blank();
        }
        for subtype in &bundle.subtypes {
            self.render_subtype(subtype, bundle, &mut w);
            w.blank();
        }
        for struct_def in &bundle.structs {
            self.render_struct(struct_def, &mut w)?;
            w.blank();
        }
        for union_def in &bundle.unions {
            self.render_union(union_def, &mut w)?;
            w.blank();
        }
        for choice in &bundle.choices {
            self.render_choice(choice, &mut w)?;
            w.blank();
        }

        w.finish()
    }

    fn render_enum(&self, enum_def: &IrEnum, w: &mut CodeWriter) -> Result<(), CodegenError> {
        if let Some(doc) = &enum_def.doc {
            w.doc_comment(doc);
        }
        let keyword = if enum_def.is_bitmask { "bitmask" } else { "enum" };
        w.start_block(
            BlockKind::Enum,
            &format!("{} {} {}", keyword, self.ds_type(&enum_def.base), enum_def.name),
            "};",
        );
        for item in &enum_def.items {
            if let Some(doc) = &item.doc {
                w.doc_comment(doc);
            }
            w.line(&format!("{} = {},", item.name, item.value));
        }
        w.end_block(BlockKind::Enum)
    }

    fn render_subtype(&self, subtype: &IrSubtype, bundle: &Bundle, w: &mut CodeWriter) {
        if let Some(doc) = &subtype.doc {
            w.doc_comment(doc);
        }
        let predicate = bundle
            .constraints
            .get(subtype.constraint)
            .map(|constraint| render_expr_subtype(&constraint.condition))
            .unwrap_or_else(|| "true".to_string());
        w.line(&format!(
            "subtype {} {} : {};",
            self.ds_type(&subtype.base),
            subtype.name,
            predicate
        ));
    }

    fn render_field(&self, field: &IrField, w: &mut CodeWriter) {
        if let Some(label) = &field.label {
            w.line(&format!("{}:", render_expr(label)));
        }
        if let Some(boundary) = field.align_to {
            w.line(&format!("align({}):", boundary));
        }
        if let Some(doc) = &field.doc {
            w.doc_comment(doc);
        }
        let mut line = format!("{} {}", self.ds_type(&field.field_type), field.name);
        if let Some(guard) = &field.guard {
            line.push_str(&format!(" if {}", render_expr(guard)));
        }
        line.push(';');
        w.line(&line);
    }

    fn render_function(&self, function: &IrFunction, w: &mut CodeWriter) -> Result<(), CodegenError> {
        let params: Vec<String> = function
            .parameters
            .iter()
            .map(|p| format!("{} {}", self.ds_type(&p.param_type), p.name))
            .collect();
        w.start_block(
            BlockKind::Function,
            &format!(
                "function {} {}({})",
                self.ds_type(&function.return_type),
                function.name,
                params.join(", ")
            ),
            "}",
        );
        for statement in &function.body {
            match statement {
                IrStatement::Return(expr) => w.line(&format!("return {};", render_expr(expr))),
                IrStatement::Expression(expr) => w.line(&format!("{};", render_expr(expr))),
            }
        }
        w.end_block(BlockKind::Function)
    }

    fn render_struct(&self, struct_def: &IrStruct, w: &mut CodeWriter) -> Result<(), CodegenError> {
        if let Some(doc) = &struct_def.doc {
            w.doc_comment(doc);
        }
        w.start_block(
            BlockKind::Struct,
            &format!("struct {}", struct_def.name),
            "};",
        );
        for field in &struct_def.fields {
            self.render_field(field, w);
        }
        for function in &struct_def.functions {
            self.render_function(function, w)?;
        }
        w.end_block(BlockKind::Struct)
    }

    fn render_union(&self, union_def: &IrUnion, w: &mut CodeWriter) -> Result<(), CodegenError> {
        if let Some(doc) = &union_def.doc {
            w.doc_comment(doc);
        }
        w.start_block(BlockKind::Struct, &format!("union {}", union_def.name), "};");
        for case in &union_def.cases {
            let mut header = case.name.clone();
            if let Some(condition) = &case.condition {
                header.push_str(&format!(" if {}", render_expr(condition)));
            }
            w.start_block(BlockKind::Scope, &header, "}");
            for field in &case.fields {
                self.render_field(field, w);
            }
            w.end_block(BlockKind::Scope)?;
        }
        w.end_block(BlockKind::Struct)
    }

    fn render_choice(&self, choice: &IrChoice, w: &mut CodeWriter) -> Result<(), CodegenError> {
        if let Some(doc) = &choice.doc {
            w.doc_comment(doc);
        }
        let header = match &choice.selector {
            IrSelector::External(selector) => {
                format!("choice {} on {}", choice.name, render_expr(selector))
            }
            IrSelector::Inline(disc) => {
                format!("choice {} : {}", choice.name, self.ds_type(disc))
            }
        };
        w.start_block(BlockKind::Struct, &header, "};");
        for case in &choice.cases {
            let payload = format!("{} {};", self.ds_type(&case.payload), case.name);
            if case.is_default {
                w.line(&format!("default: {}", payload));
            } else {
                let selector = match case.mode {
                    SelectorMode::Exact => case
                        .values
                        .iter()
                        .map(render_expr)
                        .collect::<Vec<_>>()
                        .join(", "),
                    mode => format!(
                        "{} {}",
                        mode.symbol(),
                        case.values.first().map(render_expr).unwrap_or_default()
                    ),
                };
                w.line(&format!("case {}: {}", selector, payload));
            }
        }
        w.end_block(BlockKind::Struct)
    }

    /// DataScript type text, endianness prefix included.
    fn ds_type(&self, ty: &IrType) -> String {
        match ty {
            IrType::Primitive {
                kind, byte_order, ..
            } => {
                let base = ds_primitive(*kind);
                if kind.size_bytes() > 1 {
                    match byte_order {
                        Endianness::Little => format!("little {}", base),
                        Endianness::Big => format!("big {}", base),
                    }
                } else {
                    base.to_string()
                }
            }
            IrType::Bool => "bool".to_string(),
            IrType::String => "string".to_string(),
            IrType::Bitfield { width } => match width.as_int() {
                Some(w) => format!("bit:{}", w),
                None => format!("bit<{}>", render_expr(width)),
            },
            IrType::ArrayFixed { element, size } => {
                format!("{}[{}]", self.ds_type(element), render_expr(size))
            }
            IrType::ArrayVariable { element, size } => {
                format!("{}[{}]", self.ds_type(element), render_expr(size))
            }
            IrType::ArrayRanged { element, min, max } => {
                let min = min.as_ref().map(|m| render_expr(m)).unwrap_or_default();
                format!("{}[{}..{}]", self.ds_type(element), min, render_expr(max))
            }
            IrType::ArrayUnsized { element } => format!("{}[]", self.ds_type(element)),
            IrType::Named { name, .. } => name.clone(),
        }
    }
}

impl Default for DataScriptBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for DataScriptBackend {
    fn metadata(&self) -> LanguageMetadata {
        LanguageMetadata {
            name: "datascript",
            version: "1.0",
            file_extension: ".ds",
            is_case_sensitive: true,
            default_object_name: "this",
            supports_generics: true,
            supports_exceptions: false,
        }
    }

    fn reserved_keywords(&self) -> &'static [&'static str] {
        DATASCRIPT_KEYWORDS
    }

    fn type_name(&self, ty: &IrType, _bundle: &Bundle) -> String {
        self.ds_type(ty)
    }

    fn render_expression(&self, expr: &IrExpr, _ctx: &ExprContext, _bundle: &Bundle) -> String {
        render_expr(expr)
    }

    fn generate(
        &self,
        bundle: &Bundle,
        _options: &RenderOptions,
    ) -> Result<Vec<OutputFile>, CodegenError> {
        let filename = if bundle.name.is_empty() {
            "formatted".to_string()
        } else {
            bundle.name.replace('.', "_")
        };
        let content = self.render_module(bundle)?;
        Ok(vec![OutputFile {
            path: format!("{}.ds", filename),
            content,
        }])
    }
}

fn ds_primitive(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Uint8 => "uint8",
        PrimitiveKind::Uint16 => "uint16",
        PrimitiveKind::Uint32 => "uint32",
        PrimitiveKind::Uint64 => "uint64",
        PrimitiveKind::Uint128 => "uint128",
        PrimitiveKind::Int8 => "int8",
        PrimitiveKind::Int16 => "int16",
        PrimitiveKind::Int32 => "int32",
        PrimitiveKind::Int64 => "int64",
        PrimitiveKind::Int128 => "int128",
    }
}

fn render_expr(expr: &IrExpr) -> String {
    match expr {
        IrExpr::IntLiteral(value) => value.to_string(),
        IrExpr::BoolLiteral(value) => value.to_string(),
        IrExpr::StringLiteral(value) => format!("\"{}\"", value),
        IrExpr::ParameterRef(name) | IrExpr::FieldRef(name) | IrExpr::ConstantRef(name) => {
            name.clone()
        }
        IrExpr::Unary { op, operand } => {
            let symbol = match op {
                UnaryOp::Negate => "-",
                UnaryOp::Positive => "+",
                UnaryOp::Not => "!",
                UnaryOp::BitNot => "~",
            };
            format!("{}({})", symbol, render_expr(operand))
        }
        IrExpr::Binary { op, left, right } => format!(
            "({} {} {})",
            render_expr(left),
            op.symbol(),
            render_expr(right)
        ),
        IrExpr::Ternary {
            condition,
            true_expr,
            false_expr,
        } => format!(
            "({} ? {} : {})",
            render_expr(condition),
            render_expr(true_expr),
            render_expr(false_expr)
        ),
        IrExpr::FieldAccess { object, field } => format!("{}.{}", render_expr(object), field),
        IrExpr::ArrayIndex { array, index } => {
            format!("{}[{}]", render_expr(array), render_expr(index))
        }
        IrExpr::FunctionCall {
            function,
            arguments,
        } => {
            let args: Vec<String> = arguments.iter().map(render_expr).collect();
            format!("{}({})", function, args.join(", "))
        }
    }
}

/// Subtype predicates print `this` for their `value` parameter.
fn render_expr_subtype(expr: &IrExpr) -> String {
    render_expr(&replace_value(expr))
}

fn replace_value(expr: &IrExpr) -> IrExpr {
    match expr {
        IrExpr::ParameterRef(name) if name == "value" => IrExpr::FieldRef("this".to_string()),
        IrExpr::Unary { op, operand } => IrExpr::Unary {
            op: *op,
            operand: Box::new(replace_value(operand)),
        },
        IrExpr::Binary { op, left, right } => IrExpr::Binary {
            op: *op,
            left: Box::new(replace_value(left)),
            right: Box::new(replace_value(right)),
        },
        IrExpr::Ternary {
            condition,
            true_expr,
            false_expr,
        } => IrExpr::Ternary {
            condition: Box::new(replace_value(condition)),
            true_expr: Box::new(replace_value(true_expr)),
            false_expr: Box::new(replace_value(false_expr)),
        },
        other => other.clone(),
    }
}
