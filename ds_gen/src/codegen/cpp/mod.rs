//! Reference backend: C++-shaped parser generation.
//!
//! Renders the command stream into a pragma-once header with a runtime
//! helper preamble, or three artifacts in library mode. Struct readers
//! follow the cursor protocol of the generated-code contract: a mutable
//! `data` pointer plus a past-the-end sentinel, every primitive read
//! bounds-checked.

pub mod expr;
pub mod helpers;
pub mod library_mode;

use crate::codegen::command_builder::{bitfield_storage, CommandBuilder};
use crate::codegen::commands::Command;
use crate::codegen::writer::{BlockKind, CodeWriter};
use crate::codegen::{
    Backend, CodegenError, ErrorHandling, ExprContext, LanguageMetadata, OutputFile, RenderOptions,
};
use crate::ir::{Bundle, IrExpr, IrType, NamedKind, PrimitiveKind};
use expr::CppExpressionRenderer;
use helpers::CppHelperGenerator;

const CPP_KEYWORDS: &[&str] = &[
    "alignas", "alignof", "and", "and_eq", "asm", "auto", "bitand", "bitor", "bool", "break",
    "case", "catch", "char", "char8_t", "char16_t", "char32_t", "class", "co_await", "co_return",
    "co_yield", "compl", "concept", "const", "const_cast", "consteval", "constexpr", "constinit",
    "continue", "decltype", "default", "delete", "do", "double", "dynamic_cast", "else", "enum",
    "explicit", "export", "extern", "false", "float", "for", "friend", "goto", "if", "inline",
    "int", "long", "mutable", "namespace", "new", "noexcept", "not", "not_eq", "nullptr",
    "operator", "or", "or_eq", "private", "protected", "public", "register", "reinterpret_cast",
    "requires", "return", "short", "signed", "sizeof", "static", "static_assert", "static_cast",
    "struct", "switch", "template", "this", "thread_local", "throw", "true", "try", "typedef",
    "typeid", "typename", "union", "unsigned", "using", "virtual", "void", "volatile", "wchar_t",
    "while", "xor", "xor_eq",
];

pub struct CppBackend;

impl CppBackend {
    pub fn new() -> Self {
        Self
    }

    /// Renders a command stream through the code writer.
    pub fn render_commands(
        &self,
        commands: &[Command],
        writer: &mut CodeWriter,
    ) -> Result<(), CodegenError> {
        for command in commands {
            self.render_command(command, writer)?;
        }
        Ok(())
    }

    fn render_command(&self, command: &Command, w: &mut CodeWriter) -> Result<(), CodegenError> {
        match command {
            Command::StartNamespace(name) => {
                let name = name.replace('.', "::");
                w.start_block(
                    BlockKind::Namespace,
                    &format!("namespace {}", name),
                    format!("}} // namespace {}", name),
                );
            }
            Command::EndNamespace => w.end_block(BlockKind::Namespace)?,
            Command::StartStruct { name, doc } => {
                if let Some(doc) = doc {
                    w.doc_comment(doc);
                }
                w.start_block(BlockKind::Struct, &format!("struct {}", name), "};");
            }
            Command::EndStruct => w.end_block(BlockKind::Struct)?,
            Command::StartClass { name, doc } => {
                if let Some(doc) = doc {
                    w.doc_comment(doc);
                }
                w.start_block(BlockKind::Class, &format!("class {}", name), "};");
            }
            Command::EndClass => w.end_block(BlockKind::Class)?,
            Command::StartEnum { name, base, doc } => {
                if let Some(doc) = doc {
                    w.doc_comment(doc);
                }
                w.start_block(
                    BlockKind::Enum,
                    &format!("enum class {} : {}", name, base),
                    "};",
                );
            }
            Command::EnumItem { name, value, doc } => {
                if let Some(doc) = doc {
                    w.doc_comment(doc);
                }
                w.line(&format!("{} = {},", name, value));
            }
            Command::EndEnum => w.end_block(BlockKind::Enum)?,
            Command::Constant { name, value } => {
                w.line(&format!("inline constexpr uint64_t {} = {};", name, value));
            }
            Command::StartFunction { signature } => {
                w.start_block(BlockKind::Function, signature, "}");
            }
            Command::EndFunction => w.end_block(BlockKind::Function)?,
            Command::StartScope => w.start_block(BlockKind::Scope, "", "}"),
            Command::EndScope => w.end_block(BlockKind::Scope)?,
            Command::DeclareField {
                type_name,
                name,
                doc,
            } => {
                if let Some(doc) = doc {
                    w.doc_comment(doc);
                }
                w.line(&format!("{} {};", type_name, name));
            }
            Command::WriteLine(text) => w.line(text),
            Command::Comment(text) => w.comment(text),
            Command::Blank => w.blank(),
            Command::StartIf(condition) => {
                w.start_block(BlockKind::If, &format!("if ({})", condition), "}");
            }
            Command::StartElseIf(condition) => {
                w.continue_block(
                    &[BlockKind::If],
                    BlockKind::If,
                    &format!("else if ({})", condition),
                )?;
            }
            Command::StartElse => {
                w.continue_block(&[BlockKind::If], BlockKind::Else, "else")?;
            }
            Command::EndIf => w.end_block_any(&[BlockKind::If, BlockKind::Else])?,
            Command::StartFor {
                init,
                condition,
                increment,
            } => {
                w.start_block(
                    BlockKind::For,
                    &format!("for ({}; {}; {})", init, condition, increment),
                    "}",
                );
            }
            Command::EndFor => w.end_block(BlockKind::For)?,
            Command::StartWhile(condition) => {
                w.start_block(BlockKind::While, &format!("while ({})", condition), "}");
            }
            Command::EndWhile => w.end_block(BlockKind::While)?,
            Command::StartTry => w.start_block(BlockKind::Try, "try", "}"),
            Command::StartCatch {
                exception_type,
                var_name,
            } => {
                let header = if var_name.is_empty() {
                    format!("catch (const {}&)", exception_type)
                } else {
                    format!("catch (const {}& {})", exception_type, var_name)
                };
                w.continue_block(&[BlockKind::Try, BlockKind::Catch], BlockKind::Catch, &header)?;
            }
            Command::EndTry => w.end_block_any(&[BlockKind::Try, BlockKind::Catch])?,
        }
        Ok(())
    }

    /// Helper preamble wrapped in the target namespace.
    fn runtime_preamble(
        &self,
        namespace: &str,
        error_handling: ErrorHandling,
    ) -> Result<String, CodegenError> {
        let mut writer = CodeWriter::new();
        let namespaced = !namespace.is_empty();
        if namespaced {
            let ns = namespace.replace('.', "::");
            writer.start_block(
                BlockKind::Namespace,
                &format!("namespace {}", ns),
                format!("}} // namespace {}", ns),
            );
        }
        CppHelperGenerator::new(&mut writer, error_handling).generate_all()?;
        if namespaced {
            writer.end_block(BlockKind::Namespace)?;
        }
        writer.finish()
    }

    fn file_prelude(&self) -> String {
        let mut out = String::new();
        out.push_str("#pragma once\n\n");
        for include in [
            "<cstdint>",
            "<cstddef>",
            "<string>",
            "<vector>",
            "<array>",
            "<variant>",
            "<utility>",
            "<stdexcept>",
        ] {
            out.push_str(&format!("#include {}\n", include));
        }
        out.push('\n');
        out
    }

    fn file_base(bundle: &Bundle) -> String {
        if bundle.name.is_empty() {
            "generated".to_string()
        } else {
            bundle.name.replace('.', "_")
        }
    }
}

impl Default for CppBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for CppBackend {
    fn metadata(&self) -> LanguageMetadata {
        LanguageMetadata {
            name: "cpp",
            version: "1.0",
            file_extension: ".h",
            is_case_sensitive: true,
            default_object_name: "obj",
            supports_generics: true,
            supports_exceptions: true,
        }
    }

    fn reserved_keywords(&self) -> &'static [&'static str] {
        CPP_KEYWORDS
    }

    fn type_name(&self, ty: &IrType, bundle: &Bundle) -> String {
        match ty {
            IrType::Primitive { kind, .. } => cpp_primitive(*kind).to_string(),
            IrType::Bool => "bool".to_string(),
            IrType::String => "std::string".to_string(),
            IrType::Bitfield { width } => {
                bitfield_storage(width.as_int().map(|w| w as u32)).to_string()
            }
            IrType::ArrayFixed { element, size } => match size.as_int() {
                Some(count) => format!(
                    "std::array<{}, {}>",
                    self.type_name(element, bundle),
                    count
                ),
                None => format!("std::vector<{}>", self.type_name(element, bundle)),
            },
            IrType::ArrayVariable { element, .. }
            | IrType::ArrayRanged { element, .. }
            | IrType::ArrayUnsized { element } => {
                format!("std::vector<{}>", self.type_name(element, bundle))
            }
            IrType::Named { kind, name } => match kind {
                // Subtype storage is its base primitive.
                NamedKind::Subtype => match bundle.find_subtype(name) {
                    Some(subtype) => self.type_name(&subtype.base, bundle),
                    None => name.clone(),
                },
                _ => name.clone(),
            },
        }
    }

    fn render_expression(&self, expr: &IrExpr, ctx: &ExprContext, bundle: &Bundle) -> String {
        CppExpressionRenderer::new(ctx, bundle).render(expr)
    }

    fn generate(
        &self,
        bundle: &Bundle,
        options: &RenderOptions,
    ) -> Result<Vec<OutputFile>, CodegenError> {
        if options.library_mode {
            return library_mode::generate(self, bundle, options);
        }

        let commands = CommandBuilder::new(self, bundle, options).build_module()?;

        let mut content = self.file_prelude();
        content.push_str(&self.runtime_preamble(&options.namespace, options.error_handling)?);
        content.push('\n');

        let mut writer = CodeWriter::new();
        self.render_commands(&commands, &mut writer)?;
        content.push_str(&writer.finish()?);

        Ok(vec![OutputFile {
            path: format!("{}.h", Self::file_base(bundle)),
            content,
        }])
    }
}

pub(crate) fn cpp_primitive(kind: PrimitiveKind) -> &'static str {
    match kind {
        PrimitiveKind::Uint8 => "uint8_t",
        PrimitiveKind::Uint16 => "uint16_t",
        PrimitiveKind::Uint32 => "uint32_t",
        PrimitiveKind::Uint64 => "uint64_t",
        PrimitiveKind::Uint128 => "uint128_t",
        PrimitiveKind::Int8 => "int8_t",
        PrimitiveKind::Int16 => "int16_t",
        PrimitiveKind::Int32 => "int32_t",
        PrimitiveKind::Int64 => "int64_t",
        PrimitiveKind::Int128 => "int128_t",
    }
}
