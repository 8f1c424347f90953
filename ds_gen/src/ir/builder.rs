//! Projects an analyzed module set into a self-contained IR bundle.
//!
//! Responsibilities:
//!
//! - lower AST expressions into the IR tree, classifying identifiers as
//!   parameter, constant, or field references;
//! - monomorphize parameterized structs, unions, and choices into concrete
//!   `Base_a1_a2` instances (the parameterized base is never emitted);
//! - synthesize bundle constraints from subtype predicates and inline field
//!   constraints, and attach constraint applications to fields;
//! - batch adjacent bitfields into runs and precompute their slots;
//! - compute the restore-position flag for inline-discriminator choices;
//! - copy sizes, alignments, and offsets from the analyzer's side tables.
//!
//! Failure here means the analyzed set was inconsistent; it is a
//! precondition violation, not a user-visible error mode.

use crate::ir::*;
use crate::semantic::phases::fold::evaluate_constant_uint;
use crate::semantic::{AnalyzedModuleSet, ResolvedTarget};
use ds_ast::{
    self as ast, ChoiceDef, ChoiceSelector, ConstraintDef, EnumDef, Expr, ExprKind, FieldDef,
    ModuleSet, StructDef, StructItem, SubtypeDef, Type, TypeKind, UnionDef,
};
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrBuildError {
    /// A qualified name survived analysis without a resolution entry.
    #[error("type '{0}' has no resolution; analyzed set is inconsistent")]
    UnresolvedType(String),

    /// Argument list length does not match the declaration.
    #[error("type '{name}' instantiated with {supplied} argument(s), {declared} declared")]
    ArgumentCountMismatch {
        name: String,
        supplied: usize,
        declared: usize,
    },

    /// Expression shape the IR cannot carry (e.g. computed call targets).
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),
}

/// Builds the IR bundle from an error-free analysis.
pub fn build_ir(modules: &ModuleSet, analyzed: &AnalyzedModuleSet) -> Result<Bundle, IrBuildError> {
    IrBuilder::new(modules, analyzed).run()
}

/// Identifier classification scope for expression lowering.
#[derive(Default, Clone)]
struct Scope {
    params: HashSet<String>,
    /// Monomorphization substitution: parameter name to the argument
    /// expression supplied at the instantiation site.
    subst: HashMap<String, Expr>,
}

impl Scope {
    fn with_params<'p>(names: impl Iterator<Item = &'p str>) -> Self {
        Self {
            params: names.map(str::to_string).collect(),
            subst: HashMap::new(),
        }
    }
}

struct MonoRequest {
    target: ResolvedTarget,
    instance: String,
    subst: HashMap<String, Expr>,
}

struct IrBuilder<'a> {
    modules: &'a ModuleSet,
    analyzed: &'a AnalyzedModuleSet,
    bundle: Bundle,
    /// (enum name, item name) → folded value, filled while lowering enums.
    enum_values: HashMap<(String, String), u64>,
    /// Subtype name → index of its predicate in `bundle.constraints`.
    subtype_constraints: HashMap<String, usize>,
    mono_queue: VecDeque<MonoRequest>,
    mono_done: HashSet<String>,
    /// Default endianness of the module currently being lowered.
    default_endianness: Endianness,
}

impl<'a> IrBuilder<'a> {
    fn new(modules: &'a ModuleSet, analyzed: &'a AnalyzedModuleSet) -> Self {
        Self {
            modules,
            analyzed,
            bundle: Bundle::new(String::new()),
            enum_values: HashMap::new(),
            subtype_constraints: HashMap::new(),
            mono_queue: VecDeque::new(),
            mono_done: HashSet::new(),
            default_endianness: Endianness::Little,
        }
    }

    fn run(mut self) -> Result<Bundle, IrBuildError> {
        let modules = self.modules;
        self.bundle.name = modules.main.module.package_name();
        self.bundle.constants = self.analyzed.constant_values.clone();
        self.bundle.imports = modules
            .main
            .module
            .imports
            .iter()
            .map(|import| import.display_name())
            .collect();

        // Definition kinds in deterministic bundle order: constraints are
        // lowered first because subtypes and fields reference them by
        // index; monomorphized instances append after the plain defs.
        for (idx, module) in modules.modules() {
            self.default_endianness = module_endianness(modules, idx);
            for constraint in &module.constraints {
                self.lower_constraint(constraint)?;
            }
        }
        for (idx, module) in modules.modules() {
            self.default_endianness = module_endianness(modules, idx);
            for enum_def in &module.enums {
                self.lower_enum(enum_def)?;
            }
        }
        for (idx, module) in modules.modules() {
            self.default_endianness = module_endianness(modules, idx);
            for subtype in &module.subtypes {
                self.lower_subtype(subtype)?;
            }
        }
        for (idx, module) in modules.modules() {
            self.default_endianness = module_endianness(modules, idx);
            for struct_def in &module.structs {
                if struct_def.parameters.is_empty() {
                    let lowered = self.lower_struct(struct_def, None, Scope::default())?;
                    self.bundle.structs.push(lowered);
                }
            }
        }
        for (idx, module) in modules.modules() {
            self.default_endianness = module_endianness(modules, idx);
            for union_def in &module.unions {
                if union_def.parameters.is_empty() {
                    let lowered = self.lower_union(union_def, None, Scope::default())?;
                    self.bundle.unions.push(lowered);
                }
            }
        }
        for (idx, module) in modules.modules() {
            self.default_endianness = module_endianness(modules, idx);
            for choice_def in &module.choices {
                if choice_def.parameters.is_empty() {
                    let lowered = self.lower_choice(choice_def, None, Scope::default())?;
                    self.bundle.choices.push(lowered);
                }
            }
        }

        // Drain instantiation requests; lowering an instance may enqueue
        // further instances.
        while let Some(request) = self.mono_queue.pop_front() {
            let scope = Scope {
                params: HashSet::new(),
                subst: request.subst,
            };
            match request.target {
                ResolvedTarget::Struct(def) => {
                    self.default_endianness = module_endianness(modules, def.module);
                    let base = &modules.module(def.module).structs[def.index];
                    let base_name = base.name.clone();
                    let lowered =
                        self.lower_struct(base, Some(request.instance.clone()), scope)?;
                    self.bundle.structs.push(lowered);
                    self.bundle.mono_instances.insert(request.instance, base_name);
                }
                ResolvedTarget::Union(def) => {
                    self.default_endianness = module_endianness(modules, def.module);
                    let base = &modules.module(def.module).unions[def.index];
                    let base_name = base.name.clone();
                    let lowered = self.lower_union(base, Some(request.instance.clone()), scope)?;
                    self.bundle.unions.push(lowered);
                    self.bundle.mono_instances.insert(request.instance, base_name);
                }
                ResolvedTarget::Choice(def) => {
                    self.default_endianness = module_endianness(modules, def.module);
                    let base = &modules.module(def.module).choices[def.index];
                    let base_name = base.name.clone();
                    let lowered =
                        self.lower_choice(base, Some(request.instance.clone()), scope)?;
                    self.bundle.choices.push(lowered);
                    self.bundle.mono_instances.insert(request.instance, base_name);
                }
                _ => {}
            }
        }

        Ok(self.bundle)
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn lower_expr(&mut self, expr: &Expr, scope: &Scope) -> Result<IrExpr, IrBuildError> {
        match &expr.kind {
            ExprKind::IntLiteral(value) => Ok(IrExpr::IntLiteral(*value)),
            ExprKind::BoolLiteral(value) => Ok(IrExpr::BoolLiteral(*value)),
            ExprKind::StringLiteral(value) => Ok(IrExpr::StringLiteral(value.clone())),
            ExprKind::Identifier(name) => {
                if let Some(arg) = scope.subst.get(name) {
                    // The argument expression belongs to the instantiation
                    // site; classify its identifiers without this scope.
                    let arg = arg.clone();
                    return self.lower_expr(&arg, &Scope::default());
                }
                if scope.params.contains(name) {
                    Ok(IrExpr::ParameterRef(name.clone()))
                } else if self.analyzed.constant_values.contains_key(name) {
                    Ok(IrExpr::ConstantRef(name.clone()))
                } else {
                    Ok(IrExpr::FieldRef(name.clone()))
                }
            }
            ExprKind::Unary(unary) => Ok(IrExpr::Unary {
                op: unary.op,
                operand: Box::new(self.lower_expr(&unary.operand, scope)?),
            }),
            ExprKind::Binary(binary) => Ok(IrExpr::Binary {
                op: binary.op,
                left: Box::new(self.lower_expr(&binary.left, scope)?),
                right: Box::new(self.lower_expr(&binary.right, scope)?),
            }),
            ExprKind::Ternary(ternary) => Ok(IrExpr::Ternary {
                condition: Box::new(self.lower_expr(&ternary.condition, scope)?),
                true_expr: Box::new(self.lower_expr(&ternary.true_expr, scope)?),
                false_expr: Box::new(self.lower_expr(&ternary.false_expr, scope)?),
            }),
            ExprKind::FieldAccess(access) => Ok(IrExpr::FieldAccess {
                object: Box::new(self.lower_expr(&access.object, scope)?),
                field: access.field.clone(),
            }),
            ExprKind::ArrayIndex(index) => Ok(IrExpr::ArrayIndex {
                array: Box::new(self.lower_expr(&index.array, scope)?),
                index: Box::new(self.lower_expr(&index.index, scope)?),
            }),
            ExprKind::FunctionCall(call) => {
                let function = match &call.function.kind {
                    ExprKind::Identifier(name) => name.clone(),
                    ExprKind::FieldAccess(access) => match &access.object.kind {
                        ExprKind::Identifier(object) => {
                            format!("{}.{}", object, access.field)
                        }
                        _ => {
                            return Err(IrBuildError::UnsupportedExpression(
                                "computed call target".into(),
                            ))
                        }
                    },
                    _ => {
                        return Err(IrBuildError::UnsupportedExpression(
                            "computed call target".into(),
                        ))
                    }
                };
                let mut arguments = Vec::with_capacity(call.arguments.len());
                for arg in &call.arguments {
                    arguments.push(self.lower_expr(arg, scope)?);
                }
                Ok(IrExpr::FunctionCall {
                    function,
                    arguments,
                })
            }
        }
    }

    /// Choice case values resolve enum items to their folded integer form
    /// so the emitted matcher compares integers, never symbols.
    fn lower_case_value(&mut self, expr: &Expr, scope: &Scope) -> Result<IrExpr, IrBuildError> {
        match &expr.kind {
            ExprKind::Identifier(name) => {
                let found = self
                    .enum_values
                    .iter()
                    .find(|((_, item), _)| item == name)
                    .map(|(_, value)| *value);
                if let Some(value) = found {
                    return Ok(IrExpr::IntLiteral(value));
                }
            }
            ExprKind::FieldAccess(access) => {
                if let ExprKind::Identifier(enum_name) = &access.object.kind {
                    let key = (enum_name.clone(), access.field.clone());
                    if let Some(value) = self.enum_values.get(&key) {
                        return Ok(IrExpr::IntLiteral(*value));
                    }
                }
            }
            _ => {}
        }
        self.lower_expr(expr, scope)
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn endianness_of(&self, byte_order: ast::ByteOrder) -> Endianness {
        match byte_order {
            ast::ByteOrder::Little => Endianness::Little,
            ast::ByteOrder::Big => Endianness::Big,
            ast::ByteOrder::Unspec => self.default_endianness,
        }
    }

    fn lower_type(&mut self, ty: &Type, scope: &Scope) -> Result<IrType, IrBuildError> {
        match &ty.kind {
            TypeKind::Primitive { prim, byte_order } => Ok(IrType::primitive(
                primitive_kind(*prim),
                self.endianness_of(*byte_order),
            )),
            TypeKind::Bool => Ok(IrType::Bool),
            TypeKind::String => Ok(IrType::String),
            TypeKind::BitFieldFixed { width } => Ok(IrType::Bitfield {
                width: Box::new(IrExpr::IntLiteral(*width as u64)),
            }),
            TypeKind::BitFieldExpr { width } => {
                let folded = evaluate_constant_uint(width, &self.analyzed.constant_values);
                let lowered = match folded {
                    Some(value) => IrExpr::IntLiteral(value),
                    None => self.lower_expr(width, scope)?,
                };
                Ok(IrType::Bitfield {
                    width: Box::new(lowered),
                })
            }
            TypeKind::ArrayFixed { element, size } => {
                let element = Box::new(self.lower_type(element, scope)?);
                // `T[expr]` is a static array only when the size folds;
                // otherwise the count comes from an earlier field at
                // runtime.
                let substituted = subst_expr(size, &scope.subst);
                match evaluate_constant_uint(&substituted, &self.analyzed.constant_values) {
                    Some(value) => Ok(IrType::ArrayFixed {
                        element,
                        size: Box::new(IrExpr::IntLiteral(value)),
                    }),
                    None => Ok(IrType::ArrayVariable {
                        element,
                        size: Box::new(self.lower_expr(&substituted, scope)?),
                    }),
                }
            }
            TypeKind::ArrayRanged { element, min, max } => Ok(IrType::ArrayRanged {
                element: Box::new(self.lower_type(element, scope)?),
                min: match min {
                    Some(min) => Some(Box::new(self.lower_expr(min, scope)?)),
                    None => None,
                },
                max: Box::new(self.lower_expr(max, scope)?),
            }),
            TypeKind::ArrayUnsized { element } => Ok(IrType::ArrayUnsized {
                element: Box::new(self.lower_type(element, scope)?),
            }),
            TypeKind::Named { name, args } => self.lower_named_type(name, args, scope),
        }
    }

    fn lower_named_type(
        &mut self,
        name: &ast::QualifiedName,
        args: &[Expr],
        scope: &Scope,
    ) -> Result<IrType, IrBuildError> {
        let target = *self
            .analyzed
            .resolved_types
            .get(&name.id)
            .ok_or_else(|| IrBuildError::UnresolvedType(name.joined()))?;

        let modules = self.modules;
        let (kind, base_name, param_names): (NamedKind, String, Vec<String>) = match target {
            ResolvedTarget::Struct(def) => {
                let base = &modules.module(def.module).structs[def.index];
                (
                    NamedKind::Struct,
                    base.name.clone(),
                    base.parameters.iter().map(|p| p.name.clone()).collect(),
                )
            }
            ResolvedTarget::Union(def) => {
                let base = &modules.module(def.module).unions[def.index];
                (
                    NamedKind::Union,
                    base.name.clone(),
                    base.parameters.iter().map(|p| p.name.clone()).collect(),
                )
            }
            ResolvedTarget::Enum(def) => {
                let base = &modules.module(def.module).enums[def.index];
                (NamedKind::Enum, base.name.clone(), Vec::new())
            }
            ResolvedTarget::Subtype(def) => {
                let base = &modules.module(def.module).subtypes[def.index];
                (NamedKind::Subtype, base.name.clone(), Vec::new())
            }
            ResolvedTarget::Choice(def) => {
                let base = &modules.module(def.module).choices[def.index];
                (
                    NamedKind::Choice,
                    base.name.clone(),
                    base.parameters.iter().map(|p| p.name.clone()).collect(),
                )
            }
        };

        if param_names.is_empty() {
            return Ok(IrType::Named {
                kind,
                name: base_name,
            });
        }

        if param_names.len() != args.len() {
            return Err(IrBuildError::ArgumentCountMismatch {
                name: base_name,
                supplied: args.len(),
                declared: param_names.len(),
            });
        }

        // Arguments are written at the instantiation site; substitute the
        // enclosing instance's parameters into them before naming.
        let args: Vec<Expr> = args
            .iter()
            .map(|arg| subst_expr(arg, &scope.subst))
            .collect();

        let mut instance = base_name.clone();
        for arg in &args {
            instance.push('_');
            instance.push_str(&self.argument_suffix(arg));
        }

        if self.mono_done.insert(instance.clone()) {
            let subst = param_names.into_iter().zip(args).collect();
            self.mono_queue.push_back(MonoRequest {
                target,
                instance: instance.clone(),
                subst,
            });
        }

        Ok(IrType::Named {
            kind,
            name: instance,
        })
    }

    /// Deterministic, identifier-safe rendering of one type argument:
    /// folded constants in decimal, symbolic expressions sanitized.
    fn argument_suffix(&self, arg: &Expr) -> String {
        if let Some(value) = evaluate_constant_uint(arg, &self.analyzed.constant_values) {
            return value.to_string();
        }
        sanitize_symbol(&expr_token(arg))
    }

    // ------------------------------------------------------------------
    // Definitions
    // ------------------------------------------------------------------

    fn lower_constraint(&mut self, def: &ConstraintDef) -> Result<(), IrBuildError> {
        let scope = Scope::with_params(def.params.iter().map(|p| p.name.as_str()));
        let mut params = Vec::with_capacity(def.params.len());
        for param in &def.params {
            params.push(IrParamDef {
                name: param.name.clone(),
                param_type: self.lower_type(&param.param_type, &scope)?,
            });
        }
        let condition = self.lower_expr(&def.condition, &scope)?;
        self.bundle.constraints.push(IrConstraint {
            name: def.name.clone(),
            params,
            condition,
        });
        Ok(())
    }

    fn lower_enum(&mut self, def: &EnumDef) -> Result<(), IrBuildError> {
        let base = self.lower_type(&def.base, &Scope::default())?;

        let mut items = Vec::with_capacity(def.items.len());
        let mut previous: Option<u64> = None;
        for item in &def.items {
            let value = match &item.value {
                Some(expr) => evaluate_constant_uint(expr, &self.analyzed.constant_values)
                    .unwrap_or_else(|| next_enum_value(previous, def.is_bitmask)),
                None => next_enum_value(previous, def.is_bitmask),
            };
            previous = Some(value);
            self.enum_values
                .insert((def.name.clone(), item.name.clone()), value);
            items.push(IrEnumItem {
                name: item.name.clone(),
                doc: item.doc.clone(),
                value,
            });
        }

        self.bundle.enums.push(IrEnum {
            name: def.name.clone(),
            doc: def.doc.clone(),
            base,
            is_bitmask: def.is_bitmask,
            items,
        });
        Ok(())
    }

    fn lower_subtype(&mut self, def: &SubtypeDef) -> Result<(), IrBuildError> {
        let base = self.lower_type(&def.base, &Scope::default())?;

        // The predicate becomes a bundle constraint over one `value`
        // parameter; `this` denotes the value under validation.
        let mut scope = Scope::with_params(std::iter::once("value"));
        scope.subst.insert("this".into(), Expr::ident("value"));
        let condition = self.lower_expr(&def.predicate, &scope)?;

        let constraint_index = self.bundle.constraints.len();
        self.bundle.constraints.push(IrConstraint {
            name: def.name.clone(),
            params: vec![IrParamDef {
                name: "value".into(),
                param_type: base.clone(),
            }],
            condition,
        });
        self.subtype_constraints
            .insert(def.name.clone(), constraint_index);

        self.bundle.subtypes.push(IrSubtype {
            name: def.name.clone(),
            doc: def.doc.clone(),
            base,
            constraint: constraint_index,
        });
        Ok(())
    }

    fn lower_field(
        &mut self,
        field: &FieldDef,
        owner_name: &str,
        layout_owner: &str,
        scope: &Scope,
    ) -> Result<IrField, IrBuildError> {
        let field_type = self.lower_type(&field.field_type, scope)?;

        let guard = match &field.condition {
            Some(condition) => Some(self.lower_expr(condition, scope)?),
            None => None,
        };
        let default = match &field.default {
            Some(expr) => Some(self.lower_expr(expr, scope)?),
            None => None,
        };

        let mut constraints = Vec::new();

        // Subtype-typed fields validate through the subtype's predicate.
        if let IrType::Named {
            kind: NamedKind::Subtype,
            name,
        } = &field_type
        {
            if let Some(&constraint) = self.subtype_constraints.get(name) {
                constraints.push(ConstraintApply {
                    constraint,
                    arguments: vec![IrExpr::FieldRef(field.name.clone())],
                });
            }
        }

        // An inline constraint becomes an anonymous bundle constraint with
        // one `value` parameter; `this` and the field's own name both
        // denote the fresh value.
        if let Some(expr) = &field.constraint {
            let mut check_scope = scope.clone();
            check_scope.params.insert("value".into());
            check_scope.subst.insert("this".into(), Expr::ident("value"));
            check_scope
                .subst
                .insert(field.name.clone(), Expr::ident("value"));
            let condition = self.lower_expr(expr, &check_scope)?;
            let constraint = self.bundle.constraints.len();
            self.bundle.constraints.push(IrConstraint {
                name: format!("{}_{}_check", owner_name, field.name),
                params: vec![IrParamDef {
                    name: "value".into(),
                    param_type: field_type.clone(),
                }],
                condition,
            });
            constraints.push(ConstraintApply {
                constraint,
                arguments: vec![IrExpr::FieldRef(field.name.clone())],
            });
        }

        let offset = self
            .analyzed
            .struct_layouts
            .get(layout_owner)
            .and_then(|layout| layout.field_offsets.get(&field.name).copied());

        Ok(IrField {
            name: field.name.clone(),
            doc: field.doc.clone(),
            field_type,
            guard,
            default,
            constraints,
            label: None,
            align_to: None,
            offset,
            bit_info: None,
        })
    }

    fn lower_items(
        &mut self,
        items: &[StructItem],
        owner_name: &str,
        layout_owner: &str,
        scope: &Scope,
    ) -> Result<(Vec<IrField>, Vec<IrFunction>), IrBuildError> {
        let mut fields = Vec::new();
        let mut functions = Vec::new();
        let mut pending_label: Option<IrExpr> = None;
        let mut pending_align: Option<u32> = None;

        for item in items {
            match item {
                StructItem::Field(field) => {
                    let mut lowered = self.lower_field(field, owner_name, layout_owner, scope)?;
                    lowered.label = pending_label.take();
                    lowered.align_to = pending_align.take();
                    fields.push(lowered);
                }
                StructItem::Label(label) => {
                    pending_label = Some(self.lower_expr(&label.expr, scope)?);
                }
                StructItem::Align(align) => {
                    pending_align = Some(align.boundary);
                }
                StructItem::Function(func) => {
                    functions.push(self.lower_function(func, scope)?);
                }
                // Inline items are removed by Phase 0.
                _ => {}
            }
        }

        assign_bitfield_runs(&mut fields);
        Ok((fields, functions))
    }

    fn lower_function(
        &mut self,
        func: &ast::FunctionDef,
        outer: &Scope,
    ) -> Result<IrFunction, IrBuildError> {
        let mut scope = outer.clone();
        scope
            .params
            .extend(func.parameters.iter().map(|p| p.name.clone()));

        let mut parameters = Vec::with_capacity(func.parameters.len());
        for param in &func.parameters {
            parameters.push(IrParamDef {
                name: param.name.clone(),
                param_type: self.lower_type(&param.param_type, &scope)?,
            });
        }

        let mut body = Vec::with_capacity(func.body.len());
        for stmt in &func.body {
            body.push(match stmt {
                ast::Statement::Return(expr) => IrStatement::Return(self.lower_expr(expr, &scope)?),
                ast::Statement::Expression(expr) => {
                    IrStatement::Expression(self.lower_expr(expr, &scope)?)
                }
            });
        }

        Ok(IrFunction {
            name: func.name.clone(),
            doc: func.doc.clone(),
            parameters,
            return_type: self.lower_type(&func.return_type, &scope)?,
            body,
        })
    }

    fn lower_struct(
        &mut self,
        def: &StructDef,
        name_override: Option<String>,
        mut scope: Scope,
    ) -> Result<IrStruct, IrBuildError> {
        // Parameters not substituted away stay as runtime parameters.
        for param in &def.parameters {
            if !scope.subst.contains_key(&param.name) {
                scope.params.insert(param.name.clone());
            }
        }

        let name = name_override.unwrap_or_else(|| def.name.clone());
        let (fields, functions) = self.lower_items(&def.body, &name, &def.name, &scope)?;

        let layout = self.analyzed.struct_layouts.get(&def.name);
        Ok(IrStruct {
            name,
            doc: def.doc.clone(),
            fields,
            functions,
            total_size: layout.and_then(|l| l.total_size),
            alignment: layout.map(|l| l.alignment).unwrap_or(1),
        })
    }

    fn lower_union(
        &mut self,
        def: &UnionDef,
        name_override: Option<String>,
        mut scope: Scope,
    ) -> Result<IrUnion, IrBuildError> {
        for param in &def.parameters {
            if !scope.subst.contains_key(&param.name) {
                scope.params.insert(param.name.clone());
            }
        }

        let name = name_override.unwrap_or_else(|| def.name.clone());
        let mut cases = Vec::with_capacity(def.cases.len());
        for case in &def.cases {
            let (fields, _) = self.lower_items(&case.items, &name, &def.name, &scope)?;
            let condition = match &case.condition {
                Some(condition) => Some(self.lower_expr(condition, &scope)?),
                None => None,
            };
            cases.push(IrUnionCase {
                name: case.name.clone(),
                condition,
                fields,
            });
        }

        let layout = self.analyzed.union_layouts.get(&def.name);
        Ok(IrUnion {
            name,
            doc: def.doc.clone(),
            cases,
            total_size: layout.and_then(|l| l.total_size),
            alignment: layout.map(|l| l.alignment).unwrap_or(1),
        })
    }

    fn lower_choice(
        &mut self,
        def: &ChoiceDef,
        name_override: Option<String>,
        mut scope: Scope,
    ) -> Result<IrChoice, IrBuildError> {
        for param in &def.parameters {
            if !scope.subst.contains_key(&param.name) {
                scope.params.insert(param.name.clone());
            }
        }

        let name = name_override.unwrap_or_else(|| def.name.clone());

        let selector = match &def.selector {
            ChoiceSelector::On(expr) => IrSelector::External(self.lower_expr(expr, &scope)?),
            ChoiceSelector::Inline(disc) => IrSelector::Inline(self.lower_type(disc, &scope)?),
        };

        // Byte width of the inline discriminator, for the restore rule.
        let disc_width = match (&selector, &def.selector) {
            (IrSelector::Inline(ty), _) => ty.as_primitive().map(|(kind, _)| kind.size_bytes()),
            _ => None,
        };

        let mut cases = Vec::with_capacity(def.cases.len());
        for case in &def.cases {
            let Some(field) = case.payload.as_field() else {
                continue;
            };
            let payload = self.lower_type(&field.field_type, &scope)?;

            let mut values = Vec::with_capacity(case.values.len());
            for value in &case.values {
                values.push(self.lower_case_value(value, &scope)?);
            }

            // Restore rule: the payload begins with the discriminator
            // storage itself, either directly (primitive of the same
            // width) or as the first field of a named struct.
            let restore_position = match disc_width {
                Some(width) => self.payload_leads_with_width(&field.field_type, width),
                None => false,
            };

            cases.push(IrChoiceCase {
                name: field.name.clone(),
                doc: field.doc.clone(),
                mode: case.mode,
                values,
                is_default: case.is_default,
                payload,
                restore_position,
            });
        }

        let layout = self.analyzed.choice_layouts.get(&def.name);
        Ok(IrChoice {
            name,
            doc: def.doc.clone(),
            selector,
            cases,
            total_size: layout.and_then(|l| l.total_size),
            alignment: layout.map(|l| l.alignment).unwrap_or(1),
        })
    }

    /// Byte width of the first primitive read performed by a payload type,
    /// compared against the discriminator width.
    fn payload_leads_with_width(&self, ty: &Type, width: u32) -> bool {
        self.first_primitive_width(ty, 0) == Some(width)
    }

    fn first_primitive_width(&self, ty: &Type, depth: usize) -> Option<u32> {
        if depth > 16 {
            return None;
        }
        match &ty.kind {
            TypeKind::Primitive { prim, .. } => Some(prim.size_bytes() as u32),
            TypeKind::Named { name, .. } => {
                match self.analyzed.resolved_types.get(&name.id)? {
                    ResolvedTarget::Struct(def) => {
                        let struct_def = &self.modules.module(def.module).structs[def.index];

                        let first = struct_def.fields().next()?;
                        self.first_primitive_width(&first.field_type, depth + 1)
                    }
                    ResolvedTarget::Enum(def) => {
                        let enum_def = &self.modules.module(def.module).enums[def.index];
                        self.first_primitive_width(&enum_def.base, depth + 1)
                    }
                    ResolvedTarget::Subtype(def) => {
                        let subtype = &self.modules.module(def.module).subtypes[def.index];
                        self.first_primitive_width(&subtype.base, depth + 1)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

fn module_endianness(modules: &ModuleSet, index: usize) -> Endianness {
    match modules.module(index).default_byte_order {
        ast::ByteOrder::Big => Endianness::Big,
        _ => Endianness::Little,
    }
}

fn primitive_kind(prim: ast::PrimitiveType) -> PrimitiveKind {
    match prim {
        ast::PrimitiveType::U8 => PrimitiveKind::Uint8,
        ast::PrimitiveType::U16 => PrimitiveKind::Uint16,
        ast::PrimitiveType::U32 => PrimitiveKind::Uint32,
        ast::PrimitiveType::U64 => PrimitiveKind::Uint64,
        ast::PrimitiveType::U128 => PrimitiveKind::Uint128,
        ast::PrimitiveType::I8 => PrimitiveKind::Int8,
        ast::PrimitiveType::I16 => PrimitiveKind::Int16,
        ast::PrimitiveType::I32 => PrimitiveKind::Int32,
        ast::PrimitiveType::I64 => PrimitiveKind::Int64,
        ast::PrimitiveType::I128 => PrimitiveKind::Int128,
    }
}

fn next_enum_value(previous: Option<u64>, is_bitmask: bool) -> u64 {
    match previous {
        None => {
            if is_bitmask {
                1
            } else {
                0
            }
        }
        Some(prev) => {
            if is_bitmask {
                if prev == 0 {
                    1
                } else {
                    prev.wrapping_shl(1)
                }
            } else {
                prev.wrapping_add(1)
            }
        }
    }
}

/// Replaces identifier occurrences per the substitution map. Used when
/// cloning parameterized bodies during monomorphization.
fn subst_expr(expr: &Expr, subst: &HashMap<String, Expr>) -> Expr {
    if subst.is_empty() {
        return expr.clone();
    }
    let kind = match &expr.kind {
        ExprKind::Identifier(name) => match subst.get(name) {
            Some(replacement) => replacement.kind.clone(),
            None => expr.kind.clone(),
        },
        ExprKind::Unary(unary) => ExprKind::Unary(ast::UnaryExpr {
            op: unary.op,
            operand: Box::new(subst_expr(&unary.operand, subst)),
        }),
        ExprKind::Binary(binary) => ExprKind::Binary(ast::BinaryExpr {
            op: binary.op,
            left: Box::new(subst_expr(&binary.left, subst)),
            right: Box::new(subst_expr(&binary.right, subst)),
        }),
        ExprKind::Ternary(ternary) => ExprKind::Ternary(ast::TernaryExpr {
            condition: Box::new(subst_expr(&ternary.condition, subst)),
            true_expr: Box::new(subst_expr(&ternary.true_expr, subst)),
            false_expr: Box::new(subst_expr(&ternary.false_expr, subst)),
        }),
        ExprKind::FieldAccess(access) => ExprKind::FieldAccess(ast::FieldAccessExpr {
            object: Box::new(subst_expr(&access.object, subst)),
            field: access.field.clone(),
        }),
        ExprKind::ArrayIndex(index) => ExprKind::ArrayIndex(ast::ArrayIndexExpr {
            array: Box::new(subst_expr(&index.array, subst)),
            index: Box::new(subst_expr(&index.index, subst)),
        }),
        ExprKind::FunctionCall(call) => ExprKind::FunctionCall(ast::FunctionCallExpr {
            function: Box::new(subst_expr(&call.function, subst)),
            arguments: call
                .arguments
                .iter()
                .map(|arg| subst_expr(arg, subst))
                .collect(),
        }),
        other => other.clone(),
    };
    Expr::new(expr.pos.clone(), kind)
}

/// Compact token rendering of a symbolic argument, fed to the sanitizer.
fn expr_token(expr: &Expr) -> String {
    match &expr.kind {
        ExprKind::IntLiteral(value) => value.to_string(),
        ExprKind::BoolLiteral(value) => value.to_string(),
        ExprKind::StringLiteral(value) => value.clone(),
        ExprKind::Identifier(name) => name.clone(),
        ExprKind::Unary(unary) => format!("neg_{}", expr_token(&unary.operand)),
        ExprKind::Binary(binary) => format!(
            "{}_{}_{}",
            expr_token(&binary.left),
            binary_op_token(binary.op),
            expr_token(&binary.right)
        ),
        ExprKind::FieldAccess(access) => {
            format!("{}_{}", expr_token(&access.object), access.field)
        }
        _ => "expr".to_string(),
    }
}

fn binary_op_token(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "plus",
        BinaryOp::Sub => "minus",
        BinaryOp::Mul => "mul",
        BinaryOp::Div => "div",
        BinaryOp::Mod => "mod",
        BinaryOp::Shl => "shl",
        BinaryOp::Shr => "shr",
        BinaryOp::BitAnd => "and",
        BinaryOp::BitOr => "or",
        BinaryOp::BitXor => "xor",
        _ => "op",
    }
}

fn sanitize_symbol(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len());
    for c in symbol.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        out.push('x');
    }
    out
}

/// Groups adjacent bitfields into runs and precomputes each slot. Runs
/// break at non-bitfield fields, guards, labels, and alignment directives;
/// a run containing a runtime width falls back to per-field `read_bits`
/// handling (`run_bytes: None`).
fn assign_bitfield_runs(fields: &mut [IrField]) {
    let mut run_id = 0usize;
    let mut i = 0usize;

    while i < fields.len() {
        let is_bitfield = matches!(fields[i].field_type, IrType::Bitfield { .. });
        if !is_bitfield {
            i += 1;
            continue;
        }

        let mut j = i;
        while j < fields.len() {
            let next = &fields[j];
            let next_is_bitfield = matches!(next.field_type, IrType::Bitfield { .. });
            if !next_is_bitfield || next.guard.is_some() {
                break;
            }
            if j > i && (next.label.is_some() || next.align_to.is_some()) {
                break;
            }
            j += 1;
        }

        if j == i {
            // A guarded bitfield is its own run.
            j = i + 1;
        }

        let widths: Vec<Option<u32>> = fields[i..j]
            .iter()
            .map(|field| match &field.field_type {
                IrType::Bitfield { width } => width.as_int().map(|w| w as u32),
                _ => None,
            })
            .collect();
        let all_const = widths.iter().all(Option::is_some);

        let total_const_bits: u32 = widths.iter().map(|w| w.unwrap_or(0)).sum();
        // Batched extraction works through a single u64; wider runs fall
        // back to sequential reads.
        if all_const && fields[i].guard.is_none() && total_const_bits <= 64 {
            let total_bits = total_const_bits;
            let run_bytes = total_bits.div_ceil(8).max(1);
            let mut bit_cursor = 0u32;
            for (k, field) in fields[i..j].iter_mut().enumerate() {
                let width = widths[k].unwrap();
                field.bit_info = Some(BitfieldSlot {
                    run: run_id,
                    first_in_run: k == 0,
                    run_bytes: Some(run_bytes),
                    bit_offset: bit_cursor,
                    width_bits: Some(width),
                });
                bit_cursor += width;
            }
            run_id += 1;
        } else {
            // Runtime widths (or a guard) force sequential bit reads.
            for (k, field) in fields[i..j].iter_mut().enumerate() {
                field.bit_info = Some(BitfieldSlot {
                    run: run_id,
                    first_in_run: true,
                    run_bytes: None,
                    bit_offset: 0,
                    width_bits: widths[k],
                });
                run_id += 1;
            }
        }

        i = j;
    }
}
