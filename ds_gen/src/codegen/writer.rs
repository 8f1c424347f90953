//! Indented code writer with stack-disciplined block management.
//!
//! Every `start_*` pushes a block, every `end_*` pops and validates the
//! kind. A mismatch is a bug in the caller, surfaced as
//! [`CodegenError::MismatchedBlock`] and never recovered from. This writer
//! is the only way a backend produces source characters.

use crate::codegen::CodegenError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Namespace,
    Struct,
    Class,
    Enum,
    Function,
    If,
    Else,
    For,
    While,
    Scope,
    Try,
    Catch,
}

impl BlockKind {
    pub fn name(&self) -> &'static str {
        match self {
            BlockKind::Namespace => "namespace",
            BlockKind::Struct => "struct",
            BlockKind::Class => "class",
            BlockKind::Enum => "enum",
            BlockKind::Function => "function",
            BlockKind::If => "if",
            BlockKind::Else => "else",
            BlockKind::For => "for",
            BlockKind::While => "while",
            BlockKind::Scope => "scope",
            BlockKind::Try => "try",
            BlockKind::Catch => "catch",
        }
    }
}

struct Block {
    kind: BlockKind,
    /// Text written when the block closes, e.g. `}` or `};`.
    terminator: String,
}

pub struct CodeWriter {
    out: String,
    indent: usize,
    stack: Vec<Block>,
}

impl CodeWriter {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
            stack: Vec::new(),
        }
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
    }

    /// One complete source line at the current indentation.
    pub fn line(&mut self, text: &str) {
        if text.is_empty() {
            self.out.push('\n');
            return;
        }
        self.write_indent();
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn blank(&mut self) {
        self.out.push('\n');
    }

    pub fn comment(&mut self, text: &str) {
        self.line(&format!("// {}", text));
    }

    pub fn block_comment(&mut self, lines: &[String]) {
        self.line("/*");
        for line in lines {
            self.line(&format!(" * {}", line));
        }
        self.line(" */");
    }

    pub fn doc_comment(&mut self, text: &str) {
        self.line("/**");
        for line in text.lines() {
            self.line(&format!(" * {}", line));
        }
        self.line(" */");
    }

    /// Opens a block: `header {` and pushes the kind.
    pub fn start_block(&mut self, kind: BlockKind, header: &str, terminator: impl Into<String>) {
        if header.is_empty() {
            self.line("{");
        } else {
            self.line(&format!("{} {{", header));
        }
        self.indent += 1;
        self.stack.push(Block {
            kind,
            terminator: terminator.into(),
        });
    }

    /// Closes the innermost block, validating its kind.
    pub fn end_block(&mut self, expected: BlockKind) -> Result<(), CodegenError> {
        self.end_block_any(&[expected])
    }

    /// Closes the innermost block, accepting any of the listed kinds
    /// (e.g. `end_if` terminates either the `if` or its `else`).
    pub fn end_block_any(&mut self, expected: &[BlockKind]) -> Result<(), CodegenError> {
        let block = self.stack.pop().ok_or(CodegenError::EmptyBlockStack {
            expected: expected[0].name(),
        })?;
        if !expected.contains(&block.kind) {
            return Err(CodegenError::MismatchedBlock {
                expected: expected[0].name(),
                found: block.kind.name(),
            });
        }
        self.indent -= 1;
        let terminator = block.terminator;
        self.line(&terminator);
        Ok(())
    }

    /// Replaces the innermost block in a chain: writes
    /// `} header {` at the outer indentation (used for `else if` / `else` /
    /// `catch` continuations).
    pub fn continue_block(
        &mut self,
        expected: &[BlockKind],
        kind: BlockKind,
        header: &str,
    ) -> Result<(), CodegenError> {
        let block = self.stack.pop().ok_or(CodegenError::EmptyBlockStack {
            expected: expected[0].name(),
        })?;
        if !expected.contains(&block.kind) {
            return Err(CodegenError::MismatchedBlock {
                expected: expected[0].name(),
                found: block.kind.name(),
            });
        }
        self.indent -= 1;
        self.line(&format!("}} {} {{", header));
        self.indent += 1;
        self.stack.push(Block {
            kind,
            terminator: block.terminator,
        });
        Ok(())
    }

    /// Consumes the writer; open blocks at this point are a builder bug.
    pub fn finish(self) -> Result<String, CodegenError> {
        if let Some(block) = self.stack.last() {
            return Err(CodegenError::UnclosedBlock {
                kind: block.kind.name(),
            });
        }
        Ok(self.out)
    }

    /// Current contents without consuming; used by helper generators that
    /// append into a shared writer.
    pub fn as_str(&self) -> &str {
        &self.out
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new()
    }
}
