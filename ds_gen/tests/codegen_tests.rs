//! Generated C++ shape tests: bitfields, labels, alignment, arrays,
//! error-handling modes, methods, and library mode.

mod common;

use common::*;
use ds_ast::{
    BinaryOp, Expr, FunctionDef, LabelDirective, Module, NodeIdGen, SourcePos, Statement,
    StructItem,
};
use ds_gen::codegen::{self, CodegenError, ErrorHandling, RenderOptions};

#[test]
fn adjacent_bitfields_share_one_read() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Flags",
        vec![
            field(bit_expr(Expr::int(3)), "priority"),
            field(bit_expr(Expr::int(5)), "reserved"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    // One byte read for the whole run, then mask/shift extraction in
    // declaration order.
    assert!(code.contains("uint64_t bits0 = read_bits(data, end, 8);"), "{}", code);
    assert!(code.contains("obj.priority = static_cast<uint8_t>(bits0 & 0x7);"));
    assert!(code.contains("obj.reserved = static_cast<uint8_t>((bits0 >> 3) & 0x1F);"));
    let priority_pos = code.find("obj.priority").unwrap();
    let reserved_pos = code.find("obj.reserved").unwrap();
    assert!(priority_pos < reserved_pos);
}

#[test]
fn runtime_width_bitfield_reads_through_the_helper() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Dynamic",
        vec![
            field(u8(), "width"),
            field(bit_expr(Expr::ident("width")), "value"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("obj.value = read_bits(data, end, static_cast<uint32_t>(obj.width));"));
    assert!(code.contains("class InvalidBitWidth"), "dedicated error type exists");
}

#[test]
fn label_directive_seeks_from_start() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "FileHeader",
        vec![
            field(u32(), "magic"),
            field(u32(), "data_offset"),
            StructItem::Label(LabelDirective {
                pos: SourcePos::default(),
                expr: Expr::ident("data_offset"),
            }),
            field(u8(), "data"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("// Seek to labeled position"));
    assert!(code.contains("size_t label_pos = static_cast<size_t>(obj.data_offset);"));
    assert!(code.contains("data = start + label_pos;"));
    assert!(code.contains("Label position out of bounds"));
}

#[test]
fn alignment_directive_rounds_the_cursor_up() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "AlignedData",
        vec![
            field(u8(), "header"),
            StructItem::Align(ds_ast::AlignDirective {
                pos: SourcePos::default(),
                boundary: 4,
            }),
            field(u32(), "aligned_field"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("// Align to 4-byte boundary"));
    assert!(code.contains("size_t offset = data - start;"));
    assert!(code.contains("size_t aligned_offset = (offset + 3) & ~static_cast<size_t>(3);"));
    assert!(code.contains("data = start + aligned_offset;"));
}

#[test]
fn ranged_array_computes_size_and_bounds_checks() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Data",
        vec![
            field(u8(), "count"),
            field(
                array_ranged(u32(), Some(Expr::int(0)), Expr::ident("count")),
                "items",
            ),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("std::vector<uint32_t> items;"));
    assert!(code.contains("uint64_t array_size = (obj.count - 0);"));
    assert!(code.contains("obj.items.resize(static_cast<size_t>(array_size));"));
    assert!(code.contains("Array bounds exceed buffer"));
}

#[test]
fn variable_array_resizes_to_the_field_count() {
    let mut module = Module::default();
    module.structs.push(struct_def(
        "Packet",
        vec![
            field(u8(), "length"),
            field(array(u8(), Expr::ident("length")), "chars"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("size_t array_count = static_cast<size_t>(obj.length);"));
    assert!(code.contains("obj.chars.resize(array_count);"));
    assert!(code.contains("obj.chars[i] = read_uint8(data, end);"));
}

#[test]
fn endianness_selects_the_reader_variant() {
    let mut big = u16();
    if let ds_ast::TypeKind::Primitive { byte_order, .. } = &mut big.kind {
        *byte_order = ds_ast::ByteOrder::Big;
    }

    let mut module = Module::default();
    module.structs.push(struct_def(
        "Mixed",
        vec![field(u16(), "little_field"), field(big, "big_field")],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("obj.little_field = read_uint16_le(data, end);"));
    assert!(code.contains("obj.big_field = read_uint16_be(data, end);"));
}

#[test]
fn exceptions_only_mode_omits_the_safe_reader() {
    let mut module = Module::default();
    module.structs.push(struct_def("Simple", vec![field(u8(), "x")]));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp_with(&mut set, ErrorHandling::ExceptionsOnly);

    assert!(code.contains("static Simple read(const uint8_t*& data, const uint8_t* end)"));
    assert!(!code.contains("read_safe"));
    assert!(!code.contains("ReadResult"));
}

#[test]
fn both_mode_wraps_the_reader_in_a_result() {
    let mut module = Module::default();
    module.structs.push(struct_def("Simple", vec![field(u8(), "x")]));

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp_with(&mut set, ErrorHandling::Both);

    assert!(code.contains("static ReadResult<Simple> read_safe(const uint8_t*& data, const uint8_t* end)"));
    assert!(code.contains("return ReadResult<Simple>::success(read(data, end));"));
    assert!(code.contains("catch (const std::exception& e)"));
    assert!(code.contains("return ReadResult<Simple>::failure(e.what());"));
}

#[test]
fn struct_methods_render_as_const_members() {
    let mut module = Module::default();
    let mut versioned = struct_def(
        "VersionBits",
        vec![field(bit_expr(Expr::int(3)), "major"), field(bit_expr(Expr::int(5)), "minor")],
    );
    versioned.body.push(StructItem::Function(FunctionDef {
        pos: SourcePos::default(),
        doc: None,
        name: "get_version".to_string(),
        parameters: Vec::new(),
        return_type: u8(),
        body: vec![Statement::Return(Expr::binary(
            BinaryOp::BitOr,
            Expr::binary(BinaryOp::Shl, Expr::ident("major"), Expr::int(5)),
            Expr::ident("minor"),
        ))],
    }));
    module.structs.push(versioned);

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("uint8_t get_version() const {"));
    assert!(code.contains("return ((major << 5) | minor);"), "members unprefixed in methods");
}

#[test]
fn inline_field_constraint_generates_a_validator_call() {
    let mut module = Module::default();
    let mut header = struct_def("Header", vec![field(u8(), "version")]);
    if let StructItem::Field(f) = &mut header.body[0] {
        f.constraint = Some(Expr::binary(
            BinaryOp::Eq,
            Expr::ident("this"),
            Expr::int(1),
        ));
    }
    module.structs.push(header);

    let mut set = make_set(module, NodeIdGen::new());
    let code = compile_cpp(&mut set);

    assert!(code.contains("inline bool check_Header_version_check(uint8_t value)"));
    assert!(code.contains("return (value == 1);"));
    assert!(code.contains("if (!check_Header_version_check(obj.version))"));
    assert!(code.contains("throw ConstraintViolation"));
}

#[test]
fn nested_types_are_emitted_before_their_users() {
    let mut ids = NodeIdGen::new();
    let mut module = Module::default();
    // Declared after its user; the emitter must reorder.
    module.structs.push(struct_def(
        "Outer",
        vec![field(named(&mut ids, "Inner"), "inner")],
    ));
    module.structs.push(struct_def("Inner", vec![field(u16(), "x")]));

    let mut set = make_set(module, ids);
    let code = compile_cpp(&mut set);

    let inner_pos = code.find("struct Inner {").unwrap();
    let outer_pos = code.find("struct Outer {").unwrap();
    assert!(inner_pos < outer_pos, "definitions precede uses");
    assert!(code.contains("obj.inner = Inner::read(data, end);"));
}

#[test]
fn library_mode_produces_three_artifacts() {
    let mut module = Module::default();
    module.constants.push(constant("MAGIC", u32(), Expr::int(0x4D5A)));
    module.structs.push(struct_def(
        "Aligned",
        vec![
            field(u8(), "a"),
            field(u32(), "b"),
            field(array(u8(), Expr::ident("MAGIC")), "blob"),
        ],
    ));

    let mut set = make_set(module, NodeIdGen::new());
    let bundle = build_bundle(&mut set);
    let options = RenderOptions {
        namespace: "demo".to_string(),
        error_handling: ErrorHandling::Both,
        library_mode: true,
    };
    let files = codegen::generate(&bundle, "cpp", &options).unwrap();

    assert_eq!(files.len(), 3);
    let runtime = &files[0];
    let public = &files[1];
    let implementation = &files[2];

    assert_eq!(runtime.path, "generated_runtime.h");
    assert!(runtime.content.contains("read_uint8"));
    assert!(runtime.content.contains("class OutOfBounds"));
    assert!(!runtime.content.contains("struct Aligned"), "no schema code in the runtime");

    assert_eq!(public.path, "generated.h");
    assert!(public.content.contains("#include \"generated_runtime.h\""));
    assert!(public.content.contains("struct Aligned;"), "forward declaration only");
    assert!(public.content.contains("inline constexpr uint64_t MAGIC = 19802;"));

    assert_eq!(implementation.path, "generated_impl.h");
    assert!(implementation.content.contains("#include \"generated.h\""));
    assert!(implementation.content.contains("struct Aligned {"));
    assert!(implementation.content.contains("struct FieldInfo"));
    assert!(implementation.content.contains("Aligned_fields[]"));
    assert!(implementation.content.contains("{\"a\", \"uint8_t\", true, 0}"));
    assert!(implementation.content.contains("{\"b\", \"uint32_t\", true, 4}"));
}

#[test]
fn unknown_language_is_a_codegen_error() {
    let bundle = ds_gen::ir::Bundle::new("t");
    let err = codegen::generate(&bundle, "cobol", &RenderOptions::default()).unwrap_err();
    match err {
        CodegenError::UnknownLanguage { language, available } => {
            assert_eq!(language, "cobol");
            assert!(available.contains(&"cpp".to_string()));
        }
        other => panic!("unexpected error: {}", other),
    }
}
