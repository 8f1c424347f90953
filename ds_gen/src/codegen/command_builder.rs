//! IR → command stream conversion.
//!
//! Builds the ordered command sequence for a bundle: constants, enums,
//! constraint validators, and one definition block per struct, union, and
//! choice, each with its generated reader(s). Structural commands are
//! language-neutral; statement text inside readers is composed with the
//! backend's expression sub-renderer and the fixed runtime-helper names of
//! the generated-code contract (`read_uint16_le`, `read_string`,
//! `read_bits`, ...).
//!
//! The builder is exception-safe in the commit/rollback sense: each
//! logical unit (one type's definition) accumulates at the end of the
//! stream and is truncated away if its construction fails, so a failed
//! build never leaves half a definition behind.

use crate::codegen::commands::Command;
use crate::codegen::{Backend, CodegenError, ErrorHandling, ExprContext, RenderOptions};
use crate::ir::{
    Bundle, Endianness, IrChoice, IrChoiceCase, IrConstraint, IrEnum, IrExpr, IrField, IrFunction,
    IrSelector, IrStruct, IrType, IrUnion, NamedKind, PrimitiveKind, SelectorMode,
};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

pub struct CommandBuilder<'a> {
    backend: &'a dyn Backend,
    bundle: &'a Bundle,
    options: &'a RenderOptions,
    commands: Vec<Command>,
}

impl<'a> CommandBuilder<'a> {
    pub fn new(backend: &'a dyn Backend, bundle: &'a Bundle, options: &'a RenderOptions) -> Self {
        Self {
            backend,
            bundle,
            options,
            commands: Vec::new(),
        }
    }

    /// Builds the complete command stream for a single-file module.
    pub fn build_module(mut self) -> Result<Vec<Command>, CodegenError> {
        let namespaced = !self.options.namespace.is_empty();
        if namespaced {
            self.commands
                .push(Command::StartNamespace(self.options.namespace.clone()));
        }

        self.build_constants();
        self.build_enums();
        self.build_validators()?;
        self.build_type_definitions()?;

        if namespaced {
            self.commands.push(Command::EndNamespace);
        }
        Ok(self.commands)
    }

    /// Public-surface subset used by library mode: constants, enums, and
    /// forward declarations.
    pub fn build_public_surface(mut self) -> Result<Vec<Command>, CodegenError> {
        let namespaced = !self.options.namespace.is_empty();
        if namespaced {
            self.commands
                .push(Command::StartNamespace(self.options.namespace.clone()));
        }

        self.build_constants();
        self.build_enums();

        self.commands
            .push(Command::Comment("Forward declarations".into()));
        for name in self.definition_order() {
            self.commands
                .push(Command::WriteLine(format!("struct {};", name)));
        }

        if namespaced {
            self.commands.push(Command::EndNamespace);
        }
        Ok(self.commands)
    }

    /// Implementation subset used by library mode: validators plus full
    /// type definitions.
    pub fn build_implementation(mut self) -> Result<Vec<Command>, CodegenError> {
        let namespaced = !self.options.namespace.is_empty();
        if namespaced {
            self.commands
                .push(Command::StartNamespace(self.options.namespace.clone()));
        }

        self.build_validators()?;
        self.build_type_definitions()?;

        if namespaced {
            self.commands.push(Command::EndNamespace);
        }
        Ok(self.commands)
    }

    // ------------------------------------------------------------------
    // Transactional units
    // ------------------------------------------------------------------

    /// Runs one logical unit; on failure the partially built commands are
    /// discarded before the error propagates.
    fn unit(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), CodegenError>,
    ) -> Result<(), CodegenError> {
        let mark = self.commands.len();
        match f(self) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.commands.truncate(mark);
                Err(err)
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn command_count(&self) -> usize {
        self.commands.len()
    }

    #[cfg(test)]
    pub(crate) fn unit_for_test(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), CodegenError>,
    ) -> Result<(), CodegenError> {
        self.unit(f)
    }

    #[cfg(test)]
    pub(crate) fn push_for_test(&mut self, command: Command) {
        self.commands.push(command);
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    fn build_constants(&mut self) {
        if self.bundle.constants.is_empty() {
            return;
        }
        for (name, value) in &self.bundle.constants {
            self.commands.push(Command::Constant {
                name: name.clone(),
                value: *value,
            });
        }
        self.commands.push(Command::Blank);
    }

    fn build_enums(&mut self) {
        for enum_def in &self.bundle.enums {
            self.build_enum(enum_def);
            self.commands.push(Command::Blank);
        }
    }

    fn build_enum(&mut self, enum_def: &IrEnum) {
        self.commands.push(Command::StartEnum {
            name: enum_def.name.clone(),
            base: self.backend.type_name(&enum_def.base, self.bundle),
            doc: enum_def.doc.clone(),
        });
        for item in &enum_def.items {
            self.commands.push(Command::EnumItem {
                name: item.name.clone(),
                value: item.value,
                doc: item.doc.clone(),
            });
        }
        self.commands.push(Command::EndEnum);
    }

    /// One `check_<name>` predicate function per bundle constraint.
    fn build_validators(&mut self) -> Result<(), CodegenError> {
        for constraint in &self.bundle.constraints {
            self.unit(|b| b.build_validator(constraint))?;
        }
        Ok(())
    }

    fn build_validator(&mut self, constraint: &IrConstraint) -> Result<(), CodegenError> {
        let params: Vec<String> = constraint
            .params
            .iter()
            .map(|param| {
                format!(
                    "{} {}",
                    self.backend.type_name(&param.param_type, self.bundle),
                    param.name
                )
            })
            .collect();
        self.commands.push(Command::StartFunction {
            signature: format!(
                "inline bool check_{}({})",
                constraint.name,
                params.join(", ")
            ),
        });
        let ctx = ExprContext {
            object_name: String::new(),
            prefix_fields: false,
            in_method: false,
        };
        let condition = self
            .backend
            .render_expression(&constraint.condition, &ctx, self.bundle);
        self.commands
            .push(Command::WriteLine(format!("return {};", condition)));
        self.commands.push(Command::EndFunction);
        self.commands.push(Command::Blank);
        Ok(())
    }

    /// Struct/union/choice names ordered so definitions precede their
    /// uses (Kahn's algorithm, declaration order among independents).
    fn definition_order(&self) -> Vec<String> {
        let mut declared: Vec<String> = Vec::new();
        let mut deps: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

        let mut add = |name: &str, names: BTreeSet<String>, declared: &mut Vec<String>| {
            declared.push(name.to_string());
            deps.insert(name.to_string(), names);
        };

        for s in &self.bundle.structs {
            let mut names = BTreeSet::new();
            for field in &s.fields {
                collect_named_deps(&field.field_type, &mut names);
            }
            names.remove(&s.name);
            add(&s.name, names, &mut declared);
        }
        for u in &self.bundle.unions {
            let mut names = BTreeSet::new();
            for case in &u.cases {
                for field in &case.fields {
                    collect_named_deps(&field.field_type, &mut names);
                }
            }
            names.remove(&u.name);
            add(&u.name, names, &mut declared);
        }
        for c in &self.bundle.choices {
            let mut names = BTreeSet::new();
            for case in &c.cases {
                collect_named_deps(&case.payload, &mut names);
            }
            names.remove(&c.name);
            add(&c.name, names, &mut declared);
        }

        // Kahn's algorithm over the declared set only; unknown names
        // (enums, subtypes) were filtered by the dep collector.
        let declared_set: BTreeSet<String> = declared.iter().cloned().collect();
        let mut in_degree: BTreeMap<String, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for name in &declared {
            let node_deps: Vec<String> = deps[name]
                .iter()
                .filter(|dep| declared_set.contains(*dep))
                .cloned()
                .collect();
            in_degree.insert(name.clone(), node_deps.len());
            for dep in node_deps {
                dependents.entry(dep).or_default().push(name.clone());
            }
        }

        let mut queue: VecDeque<String> = declared
            .iter()
            .filter(|name| in_degree[*name] == 0)
            .cloned()
            .collect();
        let mut order = Vec::with_capacity(declared.len());
        while let Some(name) = queue.pop_front() {
            order.push(name.clone());
            if let Some(children) = dependents.get(&name) {
                for child in children.clone() {
                    let degree = in_degree.get_mut(&child).expect("degree tracked");
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }
        // A dependency cycle leaves stragglers; append them in declaration
        // order so every definition is still emitted.
        for name in declared {
            if !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }

    fn build_type_definitions(&mut self) -> Result<(), CodegenError> {
        for name in self.definition_order() {
            if let Some(struct_def) = self.bundle.find_struct(&name) {
                self.unit(|b| b.build_struct(struct_def))?;
            } else if let Some(union_def) = self.bundle.find_union(&name) {
                self.unit(|b| b.build_union(union_def))?;
            } else if let Some(choice_def) = self.bundle.find_choice(&name) {
                self.unit(|b| b.build_choice(choice_def))?;
            }
            self.commands.push(Command::Blank);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Structs
    // ------------------------------------------------------------------

    fn build_struct(&mut self, struct_def: &IrStruct) -> Result<(), CodegenError> {
        self.commands.push(Command::StartStruct {
            name: struct_def.name.clone(),
            doc: struct_def.doc.clone(),
        });

        for field in &struct_def.fields {
            self.commands.push(Command::DeclareField {
                type_name: self.backend.type_name(&field.field_type, self.bundle),
                name: field.name.clone(),
                doc: field.doc.clone(),
            });
        }
        self.commands.push(Command::Blank);

        self.build_reader(&struct_def.name, |b| {
            b.commands
                .push(Command::WriteLine(format!("{} obj{{}};", struct_def.name)));
            let needs_start = struct_def
                .fields
                .iter()
                .any(|f| f.label.is_some() || f.align_to.is_some());
            if needs_start {
                b.commands
                    .push(Command::WriteLine("const uint8_t* start = data;".into()));
            }
            let ctx = ExprContext::reader("obj");
            for field in &struct_def.fields {
                b.build_field_read(field, &format!("obj.{}", field.name), &ctx)?;
            }
            b.commands.push(Command::WriteLine("return obj;".into()));
            Ok(())
        })?;

        for function in &struct_def.functions {
            self.commands.push(Command::Blank);
            self.build_method(function)?;
        }

        self.commands.push(Command::EndStruct);
        Ok(())
    }

    /// Emits `read` (and `read_safe` when the error mode asks for it)
    /// around a body builder. The safe entry wraps the throwing engine, so
    /// the body is emitted once.
    fn build_reader(
        &mut self,
        type_name: &str,
        body: impl FnOnce(&mut Self) -> Result<(), CodegenError>,
    ) -> Result<(), CodegenError> {
        self.build_reader_with_signature(
            type_name,
            &format!(
                "static {} read(const uint8_t*& data, const uint8_t* end)",
                type_name
            ),
            "read(data, end)",
            body,
        )
    }

    fn build_reader_with_signature(
        &mut self,
        type_name: &str,
        read_signature: &str,
        safe_call: &str,
        body: impl FnOnce(&mut Self) -> Result<(), CodegenError>,
    ) -> Result<(), CodegenError> {
        self.commands.push(Command::StartFunction {
            signature: read_signature.to_string(),
        });
        body(self)?;
        self.commands.push(Command::EndFunction);

        if self.options.error_handling != ErrorHandling::ExceptionsOnly {
            let safe_signature = read_signature.replacen(
                &format!("static {} read(", type_name),
                &format!("static ReadResult<{}> read_safe(", type_name),
                1,
            );
            self.commands.push(Command::Blank);
            self.commands.push(Command::StartFunction {
                signature: safe_signature,
            });
            self.commands.push(Command::StartTry);
            self.commands.push(Command::WriteLine(format!(
                "return ReadResult<{}>::success({});",
                type_name, safe_call
            )));
            self.commands.push(Command::StartCatch {
                exception_type: "std::exception".into(),
                var_name: "e".into(),
            });
            self.commands.push(Command::WriteLine(format!(
                "return ReadResult<{}>::failure(e.what());",
                type_name
            )));
            self.commands.push(Command::EndTry);
            self.commands.push(Command::EndFunction);
        }
        Ok(())
    }

    fn build_method(&mut self, function: &IrFunction) -> Result<(), CodegenError> {
        let params: Vec<String> = function
            .parameters
            .iter()
            .map(|param| {
                format!(
                    "{} {}",
                    self.backend.type_name(&param.param_type, self.bundle),
                    param.name
                )
            })
            .collect();
        self.commands.push(Command::StartFunction {
            signature: format!(
                "{} {}({}) const",
                self.backend.type_name(&function.return_type, self.bundle),
                function.name,
                params.join(", ")
            ),
        });
        let ctx = ExprContext::method();
        for statement in &function.body {
            let line = match statement {
                crate::ir::IrStatement::Return(expr) => format!(
                    "return {};",
                    self.backend.render_expression(expr, &ctx, self.bundle)
                ),
                crate::ir::IrStatement::Expression(expr) => format!(
                    "{};",
                    self.backend.render_expression(expr, &ctx, self.bundle)
                ),
            };
            self.commands.push(Command::WriteLine(line));
        }
        self.commands.push(Command::EndFunction);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Field reads
    // ------------------------------------------------------------------

    fn build_field_read(
        &mut self,
        field: &IrField,
        target: &str,
        ctx: &ExprContext,
    ) -> Result<(), CodegenError> {
        if let Some(label) = &field.label {
            let rendered = self.backend.render_expression(label, ctx, self.bundle);
            self.commands
                .push(Command::Comment("Seek to labeled position".into()));
            self.commands.push(Command::StartScope);
            self.commands.push(Command::WriteLine(format!(
                "size_t label_pos = static_cast<size_t>({});",
                rendered
            )));
            self.commands
                .push(Command::StartIf("start + label_pos > end".into()));
            self.commands.push(Command::WriteLine(
                "throw OutOfBounds(\"Label position out of bounds\");".into(),
            ));
            self.commands.push(Command::EndIf);
            self.commands
                .push(Command::WriteLine("data = start + label_pos;".into()));
            self.commands.push(Command::EndScope);
        }

        if let Some(boundary) = field.align_to {
            let mask = boundary.saturating_sub(1);
            self.commands.push(Command::Comment(format!(
                "Align to {}-byte boundary",
                boundary
            )));
            self.commands.push(Command::StartScope);
            self.commands
                .push(Command::WriteLine("size_t offset = data - start;".into()));
            self.commands.push(Command::WriteLine(format!(
                "size_t aligned_offset = (offset + {}) & ~static_cast<size_t>({});",
                mask, mask
            )));
            self.commands
                .push(Command::StartIf("start + aligned_offset > end".into()));
            self.commands.push(Command::WriteLine(
                "throw OutOfBounds(\"Alignment padding out of bounds\");".into(),
            ));
            self.commands.push(Command::EndIf);
            self.commands
                .push(Command::WriteLine("data = start + aligned_offset;".into()));
            self.commands.push(Command::EndScope);
        }

        let guarded = field.guard.is_some();
        if let Some(guard) = &field.guard {
            let rendered = self.backend.render_expression(guard, ctx, self.bundle);
            self.commands.push(Command::StartIf(rendered));
        }

        self.build_read_into(target, &field.field_type, field.bit_info.as_ref(), ctx)?;

        for apply in &field.constraints {
            let constraint = self.bundle.constraints.get(apply.constraint).ok_or_else(|| {
                CodegenError::InvalidIr(format!(
                    "constraint index {} out of range for field '{}'",
                    apply.constraint, field.name
                ))
            })?;
            let args: Vec<String> = apply
                .arguments
                .iter()
                .map(|arg| self.backend.render_expression(arg, ctx, self.bundle))
                .collect();
            self.commands.push(Command::StartIf(format!(
                "!check_{}({})",
                constraint.name,
                args.join(", ")
            )));
            self.commands.push(Command::WriteLine(format!(
                "throw ConstraintViolation(\"Constraint '{}' violated for field '{}'\");",
                constraint.name, field.name
            )));
            self.commands.push(Command::EndIf);
        }

        if guarded {
            if let Some(default) = &field.default {
                let rendered = self.backend.render_expression(default, ctx, self.bundle);
                self.commands.push(Command::StartElse);
                self.commands
                    .push(Command::WriteLine(format!("{} = {};", target, rendered)));
            }
            self.commands.push(Command::EndIf);
        }
        Ok(())
    }

    /// Expression-form read for types that need no statement sequence.
    fn read_expr_for(&self, ty: &IrType, ctx: &ExprContext) -> Option<String> {
        match ty {
            IrType::Primitive {
                kind, byte_order, ..
            } => Some(primitive_read_call(*kind, *byte_order)),
            IrType::Bool => Some("read_uint8(data, end) != 0".into()),
            IrType::String => Some("read_string(data, end)".into()),
            IrType::Named { kind, name } => match kind {
                NamedKind::Struct | NamedKind::Union => {
                    Some(format!("{}::read(data, end)", name))
                }
                NamedKind::Enum => {
                    let enum_def = self.bundle.find_enum(name)?;
                    let (base_kind, base_order) = enum_def.base.as_primitive()?;
                    Some(format!(
                        "static_cast<{}>({})",
                        name,
                        primitive_read_call(base_kind, base_order)
                    ))
                }
                NamedKind::Subtype => {
                    let subtype = self.bundle.find_subtype(name)?;
                    let (base_kind, base_order) = subtype.base.as_primitive()?;
                    Some(primitive_read_call(base_kind, base_order))
                }
                NamedKind::Choice => {
                    let choice = self.bundle.find_choice(name)?;
                    match &choice.selector {
                        IrSelector::Inline(_) => Some(format!("{}::read(data, end)", name)),
                        IrSelector::External(selector) => {
                            let rendered =
                                self.backend.render_expression(selector, ctx, self.bundle);
                            Some(format!(
                                "{}::read(data, end, static_cast<uint64_t>({}))",
                                name, rendered
                            ))
                        }
                    }
                }
            },
            _ => None,
        }
    }

    fn build_read_into(
        &mut self,
        target: &str,
        ty: &IrType,
        bit_info: Option<&crate::ir::BitfieldSlot>,
        ctx: &ExprContext,
    ) -> Result<(), CodegenError> {
        if let Some(expr) = self.read_expr_for(ty, ctx) {
            self.commands
                .push(Command::WriteLine(format!("{} = {};", target, expr)));
            return Ok(());
        }

        match ty {
            IrType::Bitfield { width } => {
                self.build_bitfield_read(target, width, bit_info, ctx);
                Ok(())
            }
            IrType::ArrayFixed { element, size } => {
                let count = size.as_int().ok_or_else(|| {
                    CodegenError::InvalidIr(format!(
                        "fixed array '{}' without a folded size",
                        target
                    ))
                })?;
                self.build_element_loop(target, element, &count.to_string(), ctx)
            }
            IrType::ArrayVariable { element, size } => {
                let rendered = self.backend.render_expression(size, ctx, self.bundle);
                self.commands.push(Command::StartScope);
                self.commands.push(Command::WriteLine(format!(
                    "size_t array_count = static_cast<size_t>({});",
                    rendered
                )));
                self.commands.push(Command::StartIf(
                    "array_count > static_cast<size_t>(end - data)".into(),
                ));
                self.commands.push(Command::WriteLine(
                    "throw OutOfBounds(\"Array bounds exceed buffer\");".into(),
                ));
                self.commands.push(Command::EndIf);
                self.commands
                    .push(Command::WriteLine(format!("{}.resize(array_count);", target)));
                self.build_element_loop(target, element, "array_count", ctx)?;
                self.commands.push(Command::EndScope);
                Ok(())
            }
            IrType::ArrayRanged { element, min, max } => {
                let max_rendered = self.backend.render_expression(max, ctx, self.bundle);
                let min_rendered = match min {
                    Some(min) => self.backend.render_expression(min, ctx, self.bundle),
                    None => "0".to_string(),
                };
                self.commands.push(Command::StartScope);
                self.commands.push(Command::WriteLine(format!(
                    "uint64_t array_size = ({} - {});",
                    max_rendered, min_rendered
                )));
                self.commands.push(Command::StartIf(
                    "array_size > static_cast<uint64_t>(end - data)".into(),
                ));
                self.commands.push(Command::WriteLine(
                    "throw OutOfBounds(\"Array bounds exceed buffer\");".into(),
                ));
                self.commands.push(Command::EndIf);
                self.commands.push(Command::WriteLine(format!(
                    "{}.resize(static_cast<size_t>(array_size));",
                    target
                )));
                self.build_element_loop(
                    target,
                    element,
                    "static_cast<size_t>(array_size)",
                    ctx,
                )?;
                self.commands.push(Command::EndScope);
                Ok(())
            }
            IrType::ArrayUnsized { element } => {
                self.commands.push(Command::StartWhile("data < end".into()));
                if let Some(expr) = self.read_expr_for(element, ctx) {
                    self.commands
                        .push(Command::WriteLine(format!("{}.push_back({});", target, expr)));
                } else {
                    self.commands.push(Command::StartScope);
                    let elem_type = self.backend.type_name(element, self.bundle);
                    self.commands
                        .push(Command::WriteLine(format!("{} elem{{}};", elem_type)));
                    self.build_read_into("elem", element, None, ctx)?;
                    self.commands.push(Command::WriteLine(format!(
                        "{}.push_back(std::move(elem));",
                        target
                    )));
                    self.commands.push(Command::EndScope);
                }
                self.commands.push(Command::EndWhile);
                Ok(())
            }
            _ => Err(CodegenError::InvalidIr(format!(
                "no reader for target '{}'",
                target
            ))),
        }
    }

    fn build_element_loop(
        &mut self,
        target: &str,
        element: &IrType,
        count: &str,
        ctx: &ExprContext,
    ) -> Result<(), CodegenError> {
        self.commands.push(Command::StartFor {
            init: "size_t i = 0".into(),
            condition: format!("i < {}", count),
            increment: "i++".into(),
        });
        let elem_target = format!("{}[i]", target);
        if let Some(expr) = self.read_expr_for(element, ctx) {
            self.commands
                .push(Command::WriteLine(format!("{} = {};", elem_target, expr)));
        } else {
            self.build_read_into(&elem_target, element, None, ctx)?;
        }
        self.commands.push(Command::EndFor);
        Ok(())
    }

    fn build_bitfield_read(
        &mut self,
        target: &str,
        width: &IrExpr,
        bit_info: Option<&crate::ir::BitfieldSlot>,
        ctx: &ExprContext,
    ) {
        match bit_info {
            Some(slot) if slot.run_bytes.is_some() => {
                let run_bytes = slot.run_bytes.expect("checked above");
                let local = format!("bits{}", slot.run);
                if slot.first_in_run {
                    self.commands.push(Command::WriteLine(format!(
                        "uint64_t {} = read_bits(data, end, {});",
                        local,
                        run_bytes * 8
                    )));
                }
                let width_bits = slot.width_bits.expect("const width inside batched run");
                let mask = if width_bits >= 64 {
                    u64::MAX
                } else {
                    (1u64 << width_bits) - 1
                };
                let storage = bitfield_storage(Some(width_bits));
                let extracted = if slot.bit_offset == 0 {
                    format!("{} & 0x{:X}", local, mask)
                } else {
                    format!("({} >> {}) & 0x{:X}", local, slot.bit_offset, mask)
                };
                self.commands.push(Command::WriteLine(format!(
                    "{} = static_cast<{}>({});",
                    target, storage, extracted
                )));
            }
            _ => {
                // Runtime width (or a standalone/guarded bitfield): the
                // helper validates the width and consumes whole bytes.
                let rendered = self.backend.render_expression(width, ctx, self.bundle);
                self.commands.push(Command::WriteLine(format!(
                    "{} = read_bits(data, end, static_cast<uint32_t>({}));",
                    target, rendered
                )));
            }
        }
    }

    // ------------------------------------------------------------------
    // Unions
    // ------------------------------------------------------------------

    fn build_union(&mut self, union_def: &IrUnion) -> Result<(), CodegenError> {
        self.commands.push(Command::StartStruct {
            name: union_def.name.clone(),
            doc: union_def.doc.clone(),
        });

        // One nested struct per case, then the variant storage.
        for case in &union_def.cases {
            self.commands.push(Command::StartStruct {
                name: format!("{}_t", case.name),
                doc: None,
            });
            for field in &case.fields {
                self.commands.push(Command::DeclareField {
                    type_name: self.backend.type_name(&field.field_type, self.bundle),
                    name: field.name.clone(),
                    doc: field.doc.clone(),
                });
            }
            self.commands.push(Command::EndStruct);
        }

        let variant_args: Vec<String> = std::iter::once("std::monostate".to_string())
            .chain(
                union_def
                    .cases
                    .iter()
                    .map(|case| format!("{}_t", case.name)),
            )
            .collect();
        self.commands.push(Command::DeclareField {
            type_name: format!("std::variant<{}>", variant_args.join(", ")),
            name: "value".into(),
            doc: None,
        });
        self.commands.push(Command::Blank);

        // Per-case readers.
        for case in &union_def.cases {
            self.commands.push(Command::StartFunction {
                signature: format!(
                    "static {} read_as_{}(const uint8_t*& data, const uint8_t* end)",
                    union_def.name, case.name
                ),
            });
            self.commands.push(Command::WriteLine(format!(
                "{} obj{{}};",
                union_def.name
            )));
            let needs_start = case
                .fields
                .iter()
                .any(|f| f.label.is_some() || f.align_to.is_some());
            if needs_start {
                self.commands
                    .push(Command::WriteLine("const uint8_t* start = data;".into()));
            }
            self.commands
                .push(Command::WriteLine(format!("{}_t c{{}};", case.name)));
            let ctx = ExprContext::reader("c");
            for field in &case.fields {
                self.build_field_read(field, &format!("c.{}", field.name), &ctx)?;
            }
            self.commands
                .push(Command::WriteLine("obj.value = std::move(c);".into()));
            self.commands.push(Command::WriteLine("return obj;".into()));
            self.commands.push(Command::EndFunction);
            self.commands.push(Command::Blank);
        }

        // Unified reader: try cases in declaration order, falling through
        // on constraint violations.
        self.build_reader(&union_def.name, |b| {
            b.commands
                .push(Command::WriteLine("const uint8_t* saved_data_pos = data;".into()));
            for case in &union_def.cases {
                let conditioned = case.condition.is_some();
                if let Some(condition) = &case.condition {
                    let ctx = ExprContext {
                        object_name: String::new(),
                        prefix_fields: false,
                        in_method: false,
                    };
                    let rendered = b.backend.render_expression(condition, &ctx, b.bundle);
                    b.commands.push(Command::StartIf(rendered));
                }
                b.commands.push(Command::StartTry);
                b.commands.push(Command::WriteLine(format!(
                    "return read_as_{}(data, end);",
                    case.name
                )));
                b.commands.push(Command::StartCatch {
                    exception_type: "ConstraintViolation".into(),
                    var_name: String::new(),
                });
                b.commands
                    .push(Command::WriteLine("data = saved_data_pos;".into()));
                b.commands.push(Command::EndTry);
                if conditioned {
                    b.commands.push(Command::EndIf);
                }
            }
            b.commands.push(Command::WriteLine(format!(
                "throw ConstraintViolation(\"No union case matched in '{}'\");",
                union_def.name
            )));
            Ok(())
        })?;

        self.commands.push(Command::EndStruct);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Choices
    // ------------------------------------------------------------------

    fn case_condition(&self, case: &IrChoiceCase, ctx: &ExprContext) -> String {
        match case.mode {
            SelectorMode::Exact => case
                .values
                .iter()
                .map(|value| {
                    format!(
                        "selector_value == ({})",
                        self.backend.render_expression(value, ctx, self.bundle)
                    )
                })
                .collect::<Vec<_>>()
                .join(" || "),
            mode => {
                let bound = case
                    .values
                    .first()
                    .map(|value| self.backend.render_expression(value, ctx, self.bundle))
                    .unwrap_or_else(|| "0".to_string());
                format!("selector_value {} ({})", mode.symbol(), bound)
            }
        }
    }

    fn build_choice(&mut self, choice_def: &IrChoice) -> Result<(), CodegenError> {
        self.commands.push(Command::StartStruct {
            name: choice_def.name.clone(),
            doc: choice_def.doc.clone(),
        });

        let variant_args: Vec<String> = std::iter::once("std::monostate".to_string())
            .chain(
                choice_def
                    .cases
                    .iter()
                    .map(|case| self.backend.type_name(&case.payload, self.bundle)),
            )
            .collect();
        self.commands.push(Command::DeclareField {
            type_name: format!("std::variant<{}>", variant_args.join(", ")),
            name: "value".into(),
            doc: None,
        });
        self.commands.push(Command::Blank);

        // One reader per arm.
        let ctx = ExprContext::reader("obj");
        for case in &choice_def.cases {
            self.commands.push(Command::StartFunction {
                signature: format!(
                    "static {} read_as_{}(const uint8_t*& data, const uint8_t* end)",
                    choice_def.name, case.name
                ),
            });
            self.commands.push(Command::WriteLine(format!(
                "{} obj{{}};",
                choice_def.name
            )));
            let payload_type = self.backend.type_name(&case.payload, self.bundle);
            self.commands
                .push(Command::WriteLine(format!("{} payload{{}};", payload_type)));
            self.build_read_into("payload", &case.payload, None, &ctx)?;
            self.commands
                .push(Command::WriteLine("obj.value = std::move(payload);".into()));
            self.commands.push(Command::WriteLine("return obj;".into()));
            self.commands.push(Command::EndFunction);
            self.commands.push(Command::Blank);
        }

        // Unified reader with selector dispatch.
        let (signature, safe_call, inline_disc) = match &choice_def.selector {
            IrSelector::Inline(disc) => (
                format!(
                    "static {} read(const uint8_t*& data, const uint8_t* end)",
                    choice_def.name
                ),
                "read(data, end)".to_string(),
                Some(disc.clone()),
            ),
            IrSelector::External(_) => (
                format!(
                    "static {} read(const uint8_t*& data, const uint8_t* end, uint64_t selector_value)",
                    choice_def.name
                ),
                "read(data, end, selector_value)".to_string(),
                None,
            ),
        };

        self.build_reader_with_signature(&choice_def.name, &signature, &safe_call, |b| {
            if let Some(disc) = &inline_disc {
                let (kind, byte_order) = disc.as_primitive().ok_or_else(|| {
                    CodegenError::InvalidIr(format!(
                        "choice '{}' has a non-primitive inline discriminator",
                        choice_def.name
                    ))
                })?;
                // Save the cursor so cases whose payload re-reads the
                // discriminator can rewind.
                b.commands.push(Command::WriteLine(
                    "const uint8_t* saved_data_pos = data;".into(),
                ));
                b.commands.push(Command::WriteLine(format!(
                    "{} selector_value = {};",
                    b.backend.type_name(disc, b.bundle),
                    primitive_read_call(kind, byte_order)
                )));
            }

            let ctx = ExprContext::reader("obj");
            let listed: Vec<&IrChoiceCase> = choice_def
                .cases
                .iter()
                .filter(|case| !case.is_default)
                .collect();
            let default = choice_def.cases.iter().find(|case| case.is_default);

            for (index, case) in listed.iter().enumerate() {
                let condition = b.case_condition(case, &ctx);
                if index == 0 {
                    b.commands.push(Command::StartIf(condition));
                } else {
                    b.commands.push(Command::StartElseIf(condition));
                }
                if case.restore_position {
                    b.commands
                        .push(Command::WriteLine("data = saved_data_pos;".into()));
                }
                b.commands.push(Command::WriteLine(format!(
                    "return read_as_{}(data, end);",
                    case.name
                )));
            }

            // A default-bearing choice always ends in a final `else`; a
            // defaultless one reports the unmatched selector there.
            let tail = |b: &mut Self| {
                if let Some(case) = default {
                    if case.restore_position {
                        b.commands
                            .push(Command::WriteLine("data = saved_data_pos;".into()));
                    }
                    b.commands.push(Command::WriteLine(format!(
                        "return read_as_{}(data, end);",
                        case.name
                    )));
                } else {
                    b.commands.push(Command::WriteLine(format!(
                        "throw UnmatchedChoice(\"No case matched selector in '{}'\");",
                        choice_def.name
                    )));
                }
            };

            if listed.is_empty() {
                tail(b);
            } else {
                b.commands.push(Command::StartElse);
                tail(b);
                b.commands.push(Command::EndIf);
            }
            Ok(())
        })?;

        self.commands.push(Command::EndStruct);
        Ok(())
    }

}

/// Runtime helper call for one primitive read, per the generated-code
/// contract: `read_uint8`, `read_uint16_le`, `read_int64_be`, ...
pub fn primitive_read_call(kind: PrimitiveKind, byte_order: Endianness) -> String {
    let sign = if kind.is_signed() { "int" } else { "uint" };
    let bits = kind.size_bytes() * 8;
    if bits == 8 {
        format!("read_{}8(data, end)", sign)
    } else {
        let suffix = match byte_order {
            Endianness::Little => "le",
            Endianness::Big => "be",
        };
        format!("read_{}{}_{}(data, end)", sign, bits, suffix)
    }
}

/// Smallest unsigned storage covering a bitfield width.
pub fn bitfield_storage(width_bits: Option<u32>) -> &'static str {
    match width_bits {
        Some(w) if w <= 8 => "uint8_t",
        Some(w) if w <= 16 => "uint16_t",
        Some(w) if w <= 32 => "uint32_t",
        _ => "uint64_t",
    }
}

fn collect_named_deps(ty: &IrType, out: &mut BTreeSet<String>) {
    match ty {
        IrType::Named { kind, name } => match kind {
            NamedKind::Struct | NamedKind::Union | NamedKind::Choice => {
                out.insert(name.clone());
            }
            _ => {}
        },
        IrType::ArrayFixed { element, .. }
        | IrType::ArrayVariable { element, .. }
        | IrType::ArrayRanged { element, .. }
        | IrType::ArrayUnsized { element } => collect_named_deps(element, out),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::cpp::CppBackend;
    use crate::ir::{ConstraintApply, IrField};

    fn u8_field(name: &str) -> IrField {
        IrField {
            name: name.to_string(),
            doc: None,
            field_type: IrType::primitive(PrimitiveKind::Uint8, Endianness::Little),
            guard: None,
            default: None,
            constraints: Vec::new(),
            label: None,
            align_to: None,
            offset: None,
            bit_info: None,
        }
    }

    #[test]
    fn failed_unit_discards_partial_commands() {
        let backend = CppBackend::new();
        let bundle = Bundle::new("t");
        let options = RenderOptions::default();
        let mut builder = CommandBuilder::new(&backend, &bundle, &options);

        builder.push_for_test(Command::Comment("kept".into()));
        let before = builder.command_count();

        let result = builder.unit_for_test(|b| {
            b.push_for_test(Command::StartScope);
            b.push_for_test(Command::WriteLine("half-built".into()));
            Err(CodegenError::InvalidIr("mid-unit failure".into()))
        });

        assert!(result.is_err());
        assert_eq!(builder.command_count(), before, "partial unit rolled back");
    }

    #[test]
    fn out_of_range_constraint_rolls_back_the_whole_struct() {
        let backend = CppBackend::new();
        let mut bundle = Bundle::new("t");
        let mut bad = u8_field("x");
        bad.constraints.push(ConstraintApply {
            constraint: 99,
            arguments: Vec::new(),
        });
        bundle.structs.push(IrStruct {
            name: "Broken".to_string(),
            doc: None,
            fields: vec![u8_field("ok"), bad],
            functions: Vec::new(),
            total_size: None,
            alignment: 1,
        });

        let options = RenderOptions::default();
        let result = CommandBuilder::new(&backend, &bundle, &options).build_module();
        assert!(matches!(result, Err(CodegenError::InvalidIr(_))));
    }
}
