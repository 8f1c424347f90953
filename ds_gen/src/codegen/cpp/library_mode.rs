//! Library mode: three artifacts instead of one header.
//!
//! 1. `<name>_runtime.h` — reading helpers and error types, no
//!    schema-specific code.
//! 2. `<name>.h` — public surface: enums, constants, forward declarations.
//! 3. `<name>_impl.h` — full struct bodies, readers, and per-struct
//!    introspection metadata.
//!
//! The split lets consumers include the public surface in many
//! translation units without paying for the implementation.

use crate::codegen::command_builder::CommandBuilder;
use crate::codegen::cpp::CppBackend;
use crate::codegen::writer::{BlockKind, CodeWriter};
use crate::codegen::{Backend, CodegenError, OutputFile, RenderOptions};
use crate::ir::{Bundle, IrStruct};

struct LibraryFiles {
    runtime_header: String,
    public_header: String,
    impl_header: String,
}

fn filenames(bundle: &Bundle) -> LibraryFiles {
    let base = if bundle.name.is_empty() {
        "generated".to_string()
    } else {
        bundle.name.replace('.', "_")
    };
    LibraryFiles {
        runtime_header: format!("{}_runtime.h", base),
        public_header: format!("{}.h", base),
        impl_header: format!("{}_impl.h", base),
    }
}

pub fn generate(
    backend: &CppBackend,
    bundle: &Bundle,
    options: &RenderOptions,
) -> Result<Vec<OutputFile>, CodegenError> {
    let files = filenames(bundle);

    // Runtime: helpers only.
    let mut runtime = backend.file_prelude();
    runtime.push_str(&backend.runtime_preamble(&options.namespace, options.error_handling)?);

    // Public surface: enums, constants, forward declarations.
    let mut public = String::new();
    public.push_str("#pragma once\n\n");
    public.push_str(&format!("#include \"{}\"\n\n", files.runtime_header));
    let public_commands = CommandBuilder::new(backend, bundle, options).build_public_surface()?;
    let mut writer = CodeWriter::new();
    backend.render_commands(&public_commands, &mut writer)?;
    public.push_str(&writer.finish()?);

    // Implementation: full definitions plus introspection metadata.
    let mut implementation = String::new();
    implementation.push_str("#pragma once\n\n");
    implementation.push_str(&format!("#include \"{}\"\n\n", files.public_header));
    let impl_commands = CommandBuilder::new(backend, bundle, options).build_implementation()?;
    let mut writer = CodeWriter::new();
    backend.render_commands(&impl_commands, &mut writer)?;
    implementation.push_str(&writer.finish()?);
    implementation.push('\n');
    implementation.push_str(&metadata_section(backend, bundle, options)?);

    Ok(vec![
        OutputFile {
            path: files.runtime_header,
            content: runtime,
        },
        OutputFile {
            path: files.public_header,
            content: public,
        },
        OutputFile {
            path: files.impl_header,
            content: implementation,
        },
    ])
}

/// Ordered `(field name, declared type, offset)` records per struct.
fn metadata_section(
    backend: &CppBackend,
    bundle: &Bundle,
    options: &RenderOptions,
) -> Result<String, CodegenError> {
    let mut writer = CodeWriter::new();
    let namespaced = !options.namespace.is_empty();
    if namespaced {
        let ns = options.namespace.replace('.', "::");
        writer.start_block(
            BlockKind::Namespace,
            &format!("namespace {}", ns),
            format!("}} // namespace {}", ns),
        );
    }

    writer.comment("Introspection metadata");
    writer.start_block(BlockKind::Struct, "struct FieldInfo", "};");
    writer.line("const char* name;");
    writer.line("const char* type_name;");
    writer.line("bool has_offset;");
    writer.line("size_t offset;");
    writer.end_block(BlockKind::Struct)?;
    writer.blank();

    for struct_def in &bundle.structs {
        emit_struct_metadata(backend, bundle, struct_def, &mut writer)?;
    }

    if namespaced {
        writer.end_block(BlockKind::Namespace)?;
    }
    writer.finish()
}

fn emit_struct_metadata(
    backend: &CppBackend,
    bundle: &Bundle,
    struct_def: &IrStruct,
    writer: &mut CodeWriter,
) -> Result<(), CodegenError> {
    if struct_def.fields.is_empty() {
        writer.line(&format!(
            "inline constexpr FieldInfo {}_fields[] = {{{{nullptr, nullptr, false, 0}}}};",
            struct_def.name
        ));
        writer.blank();
        return Ok(());
    }

    writer.line(&format!(
        "inline constexpr FieldInfo {}_fields[] = {{",
        struct_def.name
    ));
    for field in &struct_def.fields {
        let type_name = backend.type_name(&field.field_type, bundle);
        let (has_offset, offset) = match field.offset {
            Some(offset) => (true, offset),
            None => (false, 0),
        };
        writer.line(&format!(
            "    {{\"{}\", \"{}\", {}, {}}},",
            field.name, type_name, has_offset, offset
        ));
    }
    writer.line("};");
    writer.blank();
    Ok(())
}
