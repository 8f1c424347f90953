//! Runtime helper preamble for generated C++ parsers.
//!
//! Emits, in order: exception classes, binary readers (8/16/32/64/128 bit
//! with endianness variants), peek helpers, the bit reader, the
//! null-terminated string reader, and the `ReadResult<T>` template when
//! safe mode is enabled. Every read validates remaining bytes before
//! consuming.

use crate::codegen::writer::{BlockKind, CodeWriter};
use crate::codegen::{CodegenError, ErrorHandling};

pub struct CppHelperGenerator<'a> {
    writer: &'a mut CodeWriter,
    error_handling: ErrorHandling,
}

impl<'a> CppHelperGenerator<'a> {
    pub fn new(writer: &'a mut CodeWriter, error_handling: ErrorHandling) -> Self {
        Self {
            writer,
            error_handling,
        }
    }

    pub fn generate_all(&mut self) -> Result<(), CodegenError> {
        self.generate_exception_classes()?;
        self.generate_binary_readers()?;
        self.generate_peek_helpers()?;
        self.generate_bit_reader()?;
        self.generate_string_reader()?;
        if self.error_handling != ErrorHandling::ExceptionsOnly {
            self.generate_read_result()?;
        }
        Ok(())
    }

    fn exception_class(&mut self, name: &str, doc: &str) -> Result<(), CodegenError> {
        let w = &mut *self.writer;
        w.comment(doc);
        w.start_block(BlockKind::Class, &format!("class {} : public std::runtime_error", name), "};");
        w.line("public:");
        w.line(&format!(
            "explicit {}(const std::string& msg) : std::runtime_error(msg) {{}}",
            name
        ));
        w.end_block(BlockKind::Class)?;
        w.blank();
        Ok(())
    }

    fn generate_exception_classes(&mut self) -> Result<(), CodegenError> {
        self.exception_class("OutOfBounds", "Read ran past the end of the buffer")?;
        self.exception_class("ConstraintViolation", "A value failed its constraint")?;
        self.exception_class("UnmatchedChoice", "No choice case matched the selector")?;
        self.exception_class("InvalidBitWidth", "Runtime bit width outside 1..64")?;
        Ok(())
    }

    fn generate_binary_readers(&mut self) -> Result<(), CodegenError> {
        let w = &mut *self.writer;
        w.line("using uint128_t = unsigned __int128;");
        w.line("using int128_t = __int128;");
        w.blank();

        w.start_block(
            BlockKind::Function,
            "inline void require_bytes(const uint8_t* data, const uint8_t* end, size_t count)",
            "}",
        );
        w.start_block(
            BlockKind::If,
            "if (count > static_cast<size_t>(end - data))",
            "}",
        );
        w.line("throw OutOfBounds(\"Read past end of buffer\");");
        w.end_block(BlockKind::If)?;
        w.end_block(BlockKind::Function)?;
        w.blank();

        w.start_block(
            BlockKind::Function,
            "inline uint8_t read_uint8(const uint8_t*& data, const uint8_t* end)",
            "}",
        );
        w.line("require_bytes(data, end, 1);");
        w.line("return *data++;");
        w.end_block(BlockKind::Function)?;
        w.blank();

        for bits in [16u32, 32, 64, 128] {
            for little in [true, false] {
                self.multi_byte_reader(bits, little)?;
            }
        }

        // Signed variants reinterpret the unsigned read.
        let w = &mut *self.writer;
        w.start_block(
            BlockKind::Function,
            "inline int8_t read_int8(const uint8_t*& data, const uint8_t* end)",
            "}",
        );
        w.line("return static_cast<int8_t>(read_uint8(data, end));");
        w.end_block(BlockKind::Function)?;
        w.blank();

        for bits in [16u32, 32, 64, 128] {
            for suffix in ["le", "be"] {
                let w = &mut *self.writer;
                w.start_block(
                    BlockKind::Function,
                    &format!(
                        "inline int{bits}_t read_int{bits}_{suffix}(const uint8_t*& data, const uint8_t* end)"
                    ),
                    "}",
                );
                w.line(&format!(
                    "return static_cast<int{bits}_t>(read_uint{bits}_{suffix}(data, end));"
                ));
                w.end_block(BlockKind::Function)?;
                w.blank();
            }
        }
        Ok(())
    }

    fn multi_byte_reader(&mut self, bits: u32, little: bool) -> Result<(), CodegenError> {
        let w = &mut *self.writer;
        let bytes = bits / 8;
        let suffix = if little { "le" } else { "be" };
        w.start_block(
            BlockKind::Function,
            &format!(
                "inline uint{bits}_t read_uint{bits}_{suffix}(const uint8_t*& data, const uint8_t* end)"
            ),
            "}",
        );
        w.line(&format!("require_bytes(data, end, {});", bytes));
        w.line(&format!("uint{}_t value = 0;", bits));
        w.start_block(
            BlockKind::For,
            &format!("for (size_t i = 0; i < {}; i++)", bytes),
            "}",
        );
        if little {
            w.line(&format!(
                "value |= static_cast<uint{}_t>(data[i]) << (8 * i);",
                bits
            ));
        } else {
            w.line("value = (value << 8) | data[i];");
        }
        w.end_block(BlockKind::For)?;
        w.line(&format!("data += {};", bytes));
        w.line("return value;");
        w.end_block(BlockKind::Function)?;
        w.blank();
        Ok(())
    }

    fn generate_peek_helpers(&mut self) -> Result<(), CodegenError> {
        let w = &mut *self.writer;
        w.comment("Non-consuming reads");
        w.start_block(
            BlockKind::Function,
            "inline uint8_t peek_uint8(const uint8_t* data, const uint8_t* end)",
            "}",
        );
        w.line("require_bytes(data, end, 1);");
        w.line("return *data;");
        w.end_block(BlockKind::Function)?;
        w.blank();

        for (suffix, little) in [("le", true), ("be", false)] {
            w.start_block(
                BlockKind::Function,
                &format!("inline uint16_t peek_uint16_{}(const uint8_t* data, const uint8_t* end)", suffix),
                "}",
            );
            w.line("require_bytes(data, end, 2);");
            if little {
                w.line("return static_cast<uint16_t>(data[0]) | (static_cast<uint16_t>(data[1]) << 8);");
            } else {
                w.line("return static_cast<uint16_t>(data[1]) | (static_cast<uint16_t>(data[0]) << 8);");
            }
            w.end_block(BlockKind::Function)?;
            w.blank();
        }
        Ok(())
    }

    fn generate_bit_reader(&mut self) -> Result<(), CodegenError> {
        let w = &mut *self.writer;
        w.comment("Reads ceil(width / 8) bytes, little-endian bit order, lowest `width` bits");
        w.start_block(
            BlockKind::Function,
            "inline uint64_t read_bits(const uint8_t*& data, const uint8_t* end, uint32_t width)",
            "}",
        );
        w.start_block(BlockKind::If, "if (width < 1 || width > 64)", "}");
        w.line("throw InvalidBitWidth(\"Bit width must be between 1 and 64\");");
        w.end_block(BlockKind::If)?;
        w.line("uint32_t bytes = (width + 7) / 8;");
        w.line("require_bytes(data, end, bytes);");
        w.line("uint64_t value = 0;");
        w.start_block(BlockKind::For, "for (uint32_t i = 0; i < bytes; i++)", "}");
        w.line("value |= static_cast<uint64_t>(data[i]) << (8 * i);");
        w.end_block(BlockKind::For)?;
        w.line("data += bytes;");
        w.start_block(BlockKind::If, "if (width < 64)", "}");
        w.line("value &= (1ULL << width) - 1;");
        w.end_block(BlockKind::If)?;
        w.line("return value;");
        w.end_block(BlockKind::Function)?;
        w.blank();
        Ok(())
    }

    fn generate_string_reader(&mut self) -> Result<(), CodegenError> {
        let w = &mut *self.writer;
        w.comment("Null-terminated string; consumes the terminator");
        w.start_block(
            BlockKind::Function,
            "inline std::string read_string(const uint8_t*& data, const uint8_t* end)",
            "}",
        );
        w.line("std::string value;");
        w.start_block(BlockKind::While, "while (true)", "}");
        w.line("require_bytes(data, end, 1);");
        w.line("uint8_t c = *data++;");
        w.start_block(BlockKind::If, "if (c == 0)", "}");
        w.line("break;");
        w.end_block(BlockKind::If)?;
        w.line("value.push_back(static_cast<char>(c));");
        w.end_block(BlockKind::While)?;
        w.line("return value;");
        w.end_block(BlockKind::Function)?;
        w.blank();
        Ok(())
    }

    fn generate_read_result(&mut self) -> Result<(), CodegenError> {
        let w = &mut *self.writer;
        w.comment("Value-or-error carrier for the safe read entry points");
        w.line("template <typename T>");
        w.start_block(BlockKind::Struct, "struct ReadResult", "};");
        w.line("T value{};");
        w.line("bool ok = false;");
        w.line("std::string error_message;");
        w.blank();
        w.start_block(BlockKind::Function, "static ReadResult success(T v)", "}");
        w.line("ReadResult r;");
        w.line("r.value = std::move(v);");
        w.line("r.ok = true;");
        w.line("return r;");
        w.end_block(BlockKind::Function)?;
        w.blank();
        w.start_block(
            BlockKind::Function,
            "static ReadResult failure(std::string msg)",
            "}",
        );
        w.line("ReadResult r;");
        w.line("r.ok = false;");
        w.line("r.error_message = std::move(msg);");
        w.line("return r;");
        w.end_block(BlockKind::Function)?;
        w.end_block(BlockKind::Struct)?;
        w.blank();
        Ok(())
    }
}
