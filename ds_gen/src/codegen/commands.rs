//! The language-neutral command stream.
//!
//! The command builder converts IR into an ordered sequence of these
//! records; a backend renders them through its code writer. Structural
//! commands carry structured data; statement bodies that would gain
//! nothing from further abstraction travel as `WriteLine` text, already
//! rendered through the backend's expression sub-renderer.

/// One entry of the command stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    StartNamespace(String),
    EndNamespace,

    StartStruct { name: String, doc: Option<String> },
    EndStruct,
    StartClass { name: String, doc: Option<String> },
    EndClass,

    StartEnum {
        name: String,
        base: String,
        doc: Option<String>,
    },
    EnumItem {
        name: String,
        value: u64,
        doc: Option<String>,
    },
    EndEnum,

    /// Module-level constant definition.
    Constant { name: String, value: u64 },

    StartFunction { signature: String },
    EndFunction,

    StartScope,
    EndScope,

    /// Member declaration inside the current struct/class.
    DeclareField {
        type_name: String,
        name: String,
        doc: Option<String>,
    },

    /// Literal statement line.
    WriteLine(String),
    Comment(String),
    Blank,

    StartIf(String),
    StartElseIf(String),
    StartElse,
    EndIf,

    StartFor {
        init: String,
        condition: String,
        increment: String,
    },
    EndFor,

    StartWhile(String),
    EndWhile,

    StartTry,
    StartCatch {
        exception_type: String,
        var_name: String,
    },
    EndTry,
}
