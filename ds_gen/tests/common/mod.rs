#![allow(dead_code)]

//! Shared builders for pipeline tests: programmatic AST construction,
//! analysis, and C++ generation.

use ds_ast::{
    ConstantDef, Expr, FieldDef, Module, ModuleSet, NodeIdGen, PrimitiveType, QualifiedName,
    SourcePos, StructDef, StructItem, Type, TypeKind,
};
use ds_gen::codegen::{self, ErrorHandling, RenderOptions};
use ds_gen::ir::{builder::build_ir, Bundle};
use ds_gen::semantic::{analyze, AnalysisOptions, AnalyzedModuleSet};

pub fn u8() -> Type {
    Type::primitive(PrimitiveType::U8)
}

pub fn u16() -> Type {
    Type::primitive(PrimitiveType::U16)
}

pub fn u32() -> Type {
    Type::primitive(PrimitiveType::U32)
}

pub fn u64() -> Type {
    Type::primitive(PrimitiveType::U64)
}

pub fn bit(width: u32) -> Type {
    Type::new(SourcePos::default(), TypeKind::BitFieldFixed { width })
}

pub fn bit_expr(width: Expr) -> Type {
    Type::new(
        SourcePos::default(),
        TypeKind::BitFieldExpr {
            width: Box::new(width),
        },
    )
}

pub fn named(ids: &mut NodeIdGen, name: &str) -> Type {
    named_args(ids, name, Vec::new())
}

pub fn named_args(ids: &mut NodeIdGen, name: &str, args: Vec<Expr>) -> Type {
    Type::new(
        SourcePos::default(),
        TypeKind::Named {
            name: QualifiedName {
                id: ids.fresh(),
                pos: SourcePos::default(),
                parts: vec![name.to_string()],
            },
            args,
        },
    )
}

/// `T[expr]`; folds to a fixed array when the size is constant.
pub fn array(element: Type, size: Expr) -> Type {
    Type::new(
        SourcePos::default(),
        TypeKind::ArrayFixed {
            element: Box::new(element),
            size: Box::new(size),
        },
    )
}

/// `T[min..max]`, upper bound exclusive.
pub fn array_ranged(element: Type, min: Option<Expr>, max: Expr) -> Type {
    Type::new(
        SourcePos::default(),
        TypeKind::ArrayRanged {
            element: Box::new(element),
            min: min.map(Box::new),
            max: Box::new(max),
        },
    )
}

pub fn field(ty: Type, name: &str) -> StructItem {
    StructItem::Field(FieldDef::plain(ty, name))
}

pub fn struct_def(name: &str, body: Vec<StructItem>) -> StructDef {
    StructDef {
        pos: SourcePos::default(),
        doc: None,
        name: name.to_string(),
        parameters: Vec::new(),
        body,
    }
}

pub fn constant(name: &str, ctype: Type, value: Expr) -> ConstantDef {
    ConstantDef {
        pos: SourcePos::default(),
        doc: None,
        ctype,
        name: name.to_string(),
        value,
    }
}

pub fn make_set(module: Module, ids: NodeIdGen) -> ModuleSet {
    let mut set = ModuleSet::from_main(module);
    set.node_ids = ids;
    set
}

/// Runs the analyzer with default options and asserts success.
pub fn analyze_ok(set: &mut ModuleSet) -> AnalyzedModuleSet {
    let result = analyze(set, &AnalysisOptions::default());
    assert!(
        !result.has_errors(),
        "analysis failed: {:?}",
        result.diagnostics
    );
    result.analyzed.expect("analyzed set present without errors")
}

/// Full pipeline: analyze, build IR.
pub fn build_bundle(set: &mut ModuleSet) -> Bundle {
    let analyzed = analyze_ok(set);
    build_ir(set, &analyzed).expect("IR build succeeds on a clean analysis")
}

/// Full pipeline through the C++ backend; returns the generated header.
pub fn compile_cpp(set: &mut ModuleSet) -> String {
    compile_cpp_with(set, ErrorHandling::Both)
}

pub fn compile_cpp_with(set: &mut ModuleSet, error_handling: ErrorHandling) -> String {
    let bundle = build_bundle(set);
    let options = RenderOptions {
        namespace: "test".to_string(),
        error_handling,
        library_mode: false,
    };
    let files = codegen::generate(&bundle, "cpp", &options).expect("C++ generation succeeds");
    assert_eq!(files.len(), 1);
    files.into_iter().next().unwrap().content
}
