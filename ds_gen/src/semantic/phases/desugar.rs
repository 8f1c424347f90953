//! Phase 0: desugar inline types.
//!
//! Rewrites every inline union/struct field into a named definition plus a
//! regular field of that type:
//!
//! ```text
//! Container {
//!     union { ... } payload;
//! }
//! ```
//! becomes
//! ```text
//! Container__payload__type { ... }   // generated union
//! Container {
//!     Container__payload__type payload;
//! }
//! ```
//!
//! Union case bodies use a `Parent_<case>` context prefix. Choice case
//! payloads desugar with a `_case` / `_default` suffix on the field part of
//! the generated name, so case and default payloads of one choice cannot
//! collide. This is the only phase that mutates the AST.

use ds_ast::{
    CasePayload, FieldDef, InlineStructField, InlineUnionField, Module, ModuleSet, NodeIdGen,
    QualifiedName, SourcePos, StructDef, StructItem, Type, TypeKind, UnionDef,
};

pub fn desugar_inline_types(modules: &mut ModuleSet) {
    // The id generator is taken out for the duration so synthesized
    // qualified names can mint ids while a module is mutably borrowed.
    let mut ids = std::mem::take(&mut modules.node_ids);
    for index in 0..modules.module_count() {
        desugar_module(modules.module_mut(index), &mut ids);
    }
    modules.node_ids = ids;
}

fn desugar_module(module: &mut Module, ids: &mut NodeIdGen) {
    // Synthesized definitions are appended while iterating; index loops
    // pick them up as they appear. Choices run first and unions second so
    // that every definition they synthesize still gets its own body
    // desugared by a later loop.
    let mut i = 0;
    while i < module.choices.len() {
        let cases = std::mem::take(&mut module.choices[i].cases);
        let parent = module.choices[i].name.clone();
        let mut new_cases = Vec::with_capacity(cases.len());
        for mut case in cases {
            let suffix = if case.is_default { "default" } else { "case" };
            case.payload = match case.payload {
                CasePayload::Field(field) => CasePayload::Field(field),
                CasePayload::InlineStruct(inline) => {
                    let type_name =
                        generate_inline_type_name(&parent, &format!("{}_{}", inline.name, suffix));
                    CasePayload::Field(desugar_inline_struct(type_name, inline, module, ids))
                }
                CasePayload::InlineUnion(inline) => {
                    let type_name =
                        generate_inline_type_name(&parent, &format!("{}_{}", inline.name, suffix));
                    CasePayload::Field(desugar_inline_union(type_name, inline, module, ids))
                }
            };
            new_cases.push(case);
        }
        module.choices[i].cases = new_cases;
        i += 1;
    }

    let mut i = 0;
    while i < module.unions.len() {
        let mut cases = std::mem::take(&mut module.unions[i].cases);
        let parent = module.unions[i].name.clone();
        for case in &mut cases {
            let context = format!("{}_{}", parent, case.name);
            desugar_items(&mut case.items, &context, module, ids);
        }
        module.unions[i].cases = cases;
        i += 1;
    }

    let mut i = 0;
    while i < module.structs.len() {
        let mut body = std::mem::take(&mut module.structs[i].body);
        let parent = module.structs[i].name.clone();
        desugar_items(&mut body, &parent, module, ids);
        module.structs[i].body = body;
        i += 1;
    }
}

fn desugar_items(
    items: &mut Vec<StructItem>,
    parent: &str,
    module: &mut Module,
    ids: &mut NodeIdGen,
) {
    let old = std::mem::take(items);
    items.reserve(old.len());
    for item in old {
        match item {
            StructItem::InlineUnion(inline) => {
                let type_name = generate_inline_type_name(parent, &inline.name);
                items.push(StructItem::Field(desugar_inline_union(
                    type_name, inline, module, ids,
                )));
            }
            StructItem::InlineStruct(inline) => {
                let type_name = generate_inline_type_name(parent, &inline.name);
                items.push(StructItem::Field(desugar_inline_struct(
                    type_name, inline, module, ids,
                )));
            }
            other => items.push(other),
        }
    }
}

/// `ParentStruct__fieldname__type`
fn generate_inline_type_name(parent: &str, field: &str) -> String {
    format!("{}__{}__type", parent, field)
}

fn synthesized_type(name: String, pos: &SourcePos, ids: &mut NodeIdGen) -> Type {
    Type::new(
        pos.clone(),
        TypeKind::Named {
            name: QualifiedName {
                id: ids.fresh(),
                pos: pos.clone(),
                parts: vec![name],
            },
            args: Vec::new(),
        },
    )
}

fn desugar_inline_union(
    type_name: String,
    inline: InlineUnionField,
    module: &mut Module,
    ids: &mut NodeIdGen,
) -> FieldDef {
    module.unions.push(UnionDef {
        pos: inline.pos.clone(),
        doc: None,
        name: type_name.clone(),
        parameters: Vec::new(),
        cases: inline.cases,
    });

    FieldDef {
        field_type: synthesized_type(type_name, &inline.pos, ids),
        pos: inline.pos,
        doc: inline.doc,
        name: inline.name,
        condition: inline.condition,
        constraint: inline.constraint,
        default: None,
    }
}

fn desugar_inline_struct(
    type_name: String,
    inline: InlineStructField,
    module: &mut Module,
    ids: &mut NodeIdGen,
) -> FieldDef {
    module.structs.push(StructDef {
        pos: inline.pos.clone(),
        doc: None,
        name: type_name.clone(),
        parameters: Vec::new(),
        body: inline.items,
    });

    FieldDef {
        field_type: synthesized_type(type_name, &inline.pos, ids),
        pos: inline.pos,
        doc: inline.doc,
        name: inline.name,
        condition: inline.condition,
        constraint: inline.constraint,
        default: None,
    }
}
