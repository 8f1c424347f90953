//! Structured analyzer messages.
//!
//! Failures inside the analyzer are values on a diagnostics list, never
//! control flow; every diagnostic carries enough structure for a language
//! server to render an underline, a related-location link, and a fix.

use ds_ast::SourcePos;
use serde_derive::{Deserialize, Serialize};

/// Stable diagnostic codes. Codes are part of the public surface; tooling
/// keys off them (`disabled_warnings`, test assertions).
pub mod codes {
    pub const E_DUPLICATE_DEFINITION: &str = "E_DUPLICATE_DEFINITION";
    pub const E_UNDEFINED_TYPE: &str = "E_UNDEFINED_TYPE";
    pub const E_PARAMETER_COUNT_MISMATCH: &str = "E_PARAMETER_COUNT_MISMATCH";
    pub const E_TYPE_MISMATCH: &str = "E_TYPE_MISMATCH";
    pub const E_DIVISION_BY_ZERO: &str = "E_DIVISION_BY_ZERO";
    pub const E_CIRCULAR_CONSTANT: &str = "E_CIRCULAR_CONSTANT";
    pub const E_CONSTRAINT_VIOLATION: &str = "E_CONSTRAINT_VIOLATION";
    pub const E_UNKNOWN_TARGET_LANGUAGE: &str = "E_UNKNOWN_TARGET_LANGUAGE";
    pub const W_KEYWORD_COLLISION: &str = "W_KEYWORD_COLLISION";
    pub const W_UNUSED_CONSTANT: &str = "W_UNUSED_CONSTANT";
    pub const W_UNUSED_IMPORT: &str = "W_UNUSED_IMPORT";
    pub const W_DEPRECATED: &str = "W_DEPRECATED";
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Note,
}

impl DiagnosticLevel {
    /// Rank for `min_level` filtering; lower is more severe.
    pub fn rank(&self) -> u8 {
        match self {
            DiagnosticLevel::Error => 0,
            DiagnosticLevel::Warning => 1,
            DiagnosticLevel::Note => 2,
        }
    }
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticLevel::Error => write!(f, "error"),
            DiagnosticLevel::Warning => write!(f, "warning"),
            DiagnosticLevel::Note => write!(f, "note"),
        }
    }
}

/// Secondary location attached to a diagnostic (e.g. the previous
/// definition in a duplicate-name report).
#[derive(Serialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct RelatedInfo {
    pub pos: SourcePos,
    pub message: String,
}

// Serialize-only: the stable code strings are static data.
#[derive(Serialize, Debug, PartialEq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: &'static str,
    pub message: String,
    pub pos: SourcePos,
    pub related: Option<RelatedInfo>,
    pub suggestion: Option<String>,
}

impl Diagnostic {
    pub fn error(code: &'static str, message: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            level: DiagnosticLevel::Error,
            code,
            message: message.into(),
            pos,
            related: None,
            suggestion: None,
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>, pos: SourcePos) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            code,
            message: message.into(),
            pos,
            related: None,
            suggestion: None,
        }
    }

    pub fn with_related(mut self, pos: SourcePos, message: impl Into<String>) -> Self {
        self.related = Some(RelatedInfo {
            pos,
            message: message.into(),
        });
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.level == DiagnosticLevel::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} [{}] at {}",
            self.level, self.message, self.code, self.pos
        )
    }
}
