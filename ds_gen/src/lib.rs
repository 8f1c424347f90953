//! DataScript compiler core.
//!
//! The pipeline runs in three stages over a parsed [`ds_ast::ModuleSet`]:
//!
//! 1. [`semantic::analyze`] — seven ordered phases producing an analyzed
//!    module set plus diagnostics.
//! 2. [`ir::builder::build_ir`] — projection of the analyzed AST into a
//!    self-contained, serializable IR bundle.
//! 3. [`codegen`] — command-stream code generation through a
//!    registry-selected language backend.

pub mod codegen;
pub mod ir;
pub mod semantic;
