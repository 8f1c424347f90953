//! DataScript AST Definitions
//!
//! This crate contains the node types produced by the DataScript parser.
//! It provides pure data structures for representing parsed schemas without
//! any analysis or code generation logic.

pub mod defs;
pub mod expr;
pub mod types;

use serde_derive::{Deserialize, Serialize};

// Re-export commonly used types at the crate root
pub use defs::*;
pub use expr::*;
pub use types::*;

/// Position of a node in its source file.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl std::fmt::Display for SourcePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// Identity of a type-use node, used to key analyzer side tables.
///
/// The parser assigns ids through a [`NodeIdGen`]; the desugar phase mints
/// fresh ids for synthesized nodes from the same generator, carried on the
/// [`defs::ModuleSet`].
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub struct NodeId(pub u32);

/// Monotonic [`NodeId`] source.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Default, Clone)]
pub struct NodeIdGen {
    next: u32,
}

impl NodeIdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self) -> NodeId {
        let id = NodeId(self.next);
        self.next += 1;
        id
    }
}
