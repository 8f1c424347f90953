//! Code generation: command builder, code writer, backends, registry.

pub mod command_builder;
pub mod commands;
pub mod cpp;
pub mod datascript;
pub mod registry;
pub mod writer;

use crate::ir::{Bundle, IrExpr, IrType};
use thiserror::Error;

/// Self-describing backend metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageMetadata {
    pub name: &'static str,
    pub version: &'static str,
    pub file_extension: &'static str,
    pub is_case_sensitive: bool,
    pub default_object_name: &'static str,
    pub supports_generics: bool,
    pub supports_exceptions: bool,
}

/// One generated artifact: path relative to the output directory plus the
/// complete file text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: String,
    pub content: String,
}

/// Error taxonomy of the generated readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandling {
    /// `read` only; failures raise typed exceptions.
    ExceptionsOnly,
    /// `read_safe` returning a result value.
    ResultsOnly,
    /// Both entry points.
    #[default]
    Both,
}

#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Namespace the generated module lives in; empty for none.
    pub namespace: String,
    pub error_handling: ErrorHandling,
    /// Multi-artifact library mode for backends that offer it.
    pub library_mode: bool,
}

/// Rendering context for the expression sub-renderer: what the current
/// object is called and whether field references need prefixing.
#[derive(Debug, Clone)]
pub struct ExprContext {
    pub object_name: String,
    pub prefix_fields: bool,
    pub in_method: bool,
}

impl ExprContext {
    /// Context of a standalone reader with a local result object.
    pub fn reader(object_name: impl Into<String>) -> Self {
        Self {
            object_name: object_name.into(),
            prefix_fields: true,
            in_method: false,
        }
    }

    /// Context inside a struct method: members are in scope unprefixed.
    pub fn method() -> Self {
        Self {
            object_name: "this".into(),
            prefix_fields: false,
            in_method: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("no backend registered for language '{language}' (available: {})", available.join(", "))]
    UnknownLanguage {
        language: String,
        available: Vec<String>,
    },

    // Block-stack violations are programmer errors in the builder, not
    // user-visible diagnostics; they propagate without recovery.
    #[error("mismatched block end: expected '{expected}', found '{found}'")]
    MismatchedBlock {
        expected: &'static str,
        found: &'static str,
    },

    #[error("block end with empty stack: expected '{expected}'")]
    EmptyBlockStack { expected: &'static str },

    #[error("unclosed '{kind}' block at end of rendering")]
    UnclosedBlock { kind: &'static str },

    #[error("invalid IR: {0}")]
    InvalidIr(String),
}

/// A language backend: keyword knowledge, identifier sanitization, type
/// mapping, expression rendering, and the main render entry.
pub trait Backend: Send + Sync {
    fn metadata(&self) -> LanguageMetadata;

    /// Complete reserved keyword set of the target language.
    fn reserved_keywords(&self) -> &'static [&'static str];

    fn is_reserved_keyword(&self, identifier: &str) -> bool {
        self.reserved_keywords().contains(&identifier)
    }

    /// Maps a conflicting identifier to a non-conflicting form.
    fn sanitize_identifier(&self, identifier: &str) -> String {
        if self.is_reserved_keyword(identifier) {
            format!("{}_", identifier)
        } else {
            identifier.to_string()
        }
    }

    /// Concrete type text for an IR type reference.
    fn type_name(&self, ty: &IrType, bundle: &Bundle) -> String;

    /// Renders an IR expression in the given context.
    fn render_expression(&self, expr: &IrExpr, ctx: &ExprContext, bundle: &Bundle) -> String;

    /// Main entry: produce the output artifacts for a bundle.
    fn generate(
        &self,
        bundle: &Bundle,
        options: &RenderOptions,
    ) -> Result<Vec<OutputFile>, CodegenError>;
}

/// Generates code for a bundle through the registry-selected backend.
pub fn generate(
    bundle: &Bundle,
    language: &str,
    options: &RenderOptions,
) -> Result<Vec<OutputFile>, CodegenError> {
    let registry = registry::BackendRegistry::global()
        .read()
        .expect("backend registry poisoned");
    let backend = registry
        .get(language)
        .ok_or_else(|| CodegenError::UnknownLanguage {
            language: language.to_string(),
            available: registry.available_languages(),
        })?;
    backend.generate(bundle, options)
}
