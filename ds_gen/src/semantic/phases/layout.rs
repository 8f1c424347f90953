//! Phase 5: size and alignment.
//!
//! Computes the binary layout the generated readers must reproduce:
//!
//! - a primitive of size S sits at an offset divisible by S (padding is
//!   inserted to get there);
//! - consecutive bitfields pack into the minimum number of bytes covering
//!   their total width; a non-bitfield field forces the next byte boundary;
//! - a struct-valued field contributes its computed size and alignment;
//! - a fixed array strides by the element size rounded to the element
//!   alignment;
//! - a struct is padded to its own alignment (the max of its fields');
//! - a union takes the maximum of its case sizes and alignments;
//! - a choice takes its selector storage (4 bytes when an external
//!   selector's type is unknown) plus the maximum case payload size.
//!
//! Runtime-sized content (strings, non-constant array sizes, guarded
//! fields, runtime bitfield widths) makes every later offset unknown;
//! such types get `total_size: None` and only the statically known field
//! offsets are recorded.

use crate::semantic::diagnostics::Diagnostic;
use crate::semantic::phases::fold::evaluate_constant_uint;
use crate::semantic::symbols::DefRef;
use crate::semantic::{AnalyzedModuleSet, ResolvedTarget, StructLayout, TypeLayout};
use ds_ast::{ChoiceSelector, Expr, ModuleSet, StructItem, Type, TypeKind};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

pub fn calculate_sizes(
    modules: &ModuleSet,
    analyzed: &mut AnalyzedModuleSet,
    _diags: &mut Vec<Diagnostic>,
) {
    let mut resolver = LayoutResolver {
        modules,
        analyzed,
        struct_layouts: HashMap::new(),
        union_layouts: HashMap::new(),
        choice_layouts: HashMap::new(),
        in_progress: HashSet::new(),
    };

    for (module_idx, module) in modules.modules() {
        for index in 0..module.structs.len() {
            resolver.struct_layout(DefRef {
                module: module_idx,
                index,
            });
        }
        for index in 0..module.unions.len() {
            resolver.union_layout(DefRef {
                module: module_idx,
                index,
            });
        }
        for index in 0..module.choices.len() {
            resolver.choice_layout(DefRef {
                module: module_idx,
                index,
            });
        }
    }

    let LayoutResolver {
        struct_layouts,
        union_layouts,
        choice_layouts,
        ..
    } = resolver;
    analyzed.struct_layouts = struct_layouts;
    analyzed.union_layouts = union_layouts;
    analyzed.choice_layouts = choice_layouts;
}

fn round_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

struct LayoutResolver<'a> {
    modules: &'a ModuleSet,
    analyzed: &'a AnalyzedModuleSet,
    struct_layouts: HashMap<String, StructLayout>,
    union_layouts: HashMap<String, TypeLayout>,
    choice_layouts: HashMap<String, TypeLayout>,
    /// Guards against self-referential types; a re-entered layout is
    /// reported as unknown rather than recursing forever.
    in_progress: HashSet<String>,
}

/// Result of laying out one item sequence.
struct ItemsLayout {
    size: Option<u64>,
    alignment: u64,
    offsets: IndexMap<String, u64>,
}

impl LayoutResolver<'_> {
    fn eval(&self, expr: &Expr) -> Option<u64> {
        evaluate_constant_uint(expr, &self.analyzed.constant_values)
    }

    fn bitfield_width(&self, ty: &Type) -> Option<u64> {
        match &ty.kind {
            TypeKind::BitFieldFixed { width } => Some(*width as u64),
            TypeKind::BitFieldExpr { width } => self.eval(width),
            _ => None,
        }
    }

    fn type_layout(&mut self, ty: &Type) -> TypeLayout {
        match &ty.kind {
            TypeKind::Primitive { prim, .. } => {
                let size = prim.size_bytes();
                TypeLayout {
                    total_size: Some(size),
                    alignment: size,
                }
            }
            TypeKind::Bool => TypeLayout {
                total_size: Some(1),
                alignment: 1,
            },
            TypeKind::String => TypeLayout {
                total_size: None,
                alignment: 1,
            },
            TypeKind::BitFieldFixed { .. } | TypeKind::BitFieldExpr { .. } => {
                let size = self.bitfield_width(ty).map(|bits| bits.div_ceil(8));
                TypeLayout {
                    total_size: size,
                    alignment: 1,
                }
            }
            TypeKind::ArrayFixed { element, size } => {
                let elem = self.type_layout(element);
                let count = self.eval(size);
                let total = match (elem.total_size, count) {
                    (Some(elem_size), Some(count)) => {
                        Some(round_up(elem_size, elem.alignment) * count)
                    }
                    _ => None,
                };
                TypeLayout {
                    total_size: total,
                    alignment: elem.alignment,
                }
            }
            TypeKind::ArrayRanged { element, .. } | TypeKind::ArrayUnsized { element } => {
                let elem = self.type_layout(element);
                TypeLayout {
                    total_size: None,
                    alignment: elem.alignment,
                }
            }
            TypeKind::Named { name, .. } => match self.analyzed.resolved_types.get(&name.id) {
                Some(ResolvedTarget::Struct(def)) => self.struct_layout(*def),
                Some(ResolvedTarget::Union(def)) => self.union_layout(*def),
                Some(ResolvedTarget::Choice(def)) => self.choice_layout(*def),
                Some(ResolvedTarget::Enum(def)) => {
                    let base = &self.modules.module(def.module).enums[def.index].base;
                    self.type_layout(base)
                }
                Some(ResolvedTarget::Subtype(def)) => {
                    let base = &self.modules.module(def.module).subtypes[def.index].base;
                    self.type_layout(base)
                }
                None => TypeLayout {
                    total_size: None,
                    alignment: 1,
                },
            },
        }
    }

    fn items_layout(&mut self, items: &[StructItem]) -> ItemsLayout {
        let mut offset: Option<u64> = Some(0);
        let mut max_align: u64 = 1;
        let mut offsets = IndexMap::new();

        let mut i = 0;
        while i < items.len() {
            match &items[i] {
                StructItem::Label(label) => {
                    offset = self.eval(&label.expr);
                    i += 1;
                }
                StructItem::Align(align) => {
                    offset = offset.map(|o| round_up(o, align.boundary as u64));
                    i += 1;
                }
                StructItem::Function(_) => {
                    i += 1;
                }
                StructItem::Field(field) if field.field_type.kind.is_bitfield() => {
                    // A maximal bitfield run packs into shared bytes.
                    let mut run_bits: Option<u64> = Some(0);
                    let mut j = i;
                    while j < items.len() {
                        let StructItem::Field(next) = &items[j] else {
                            break;
                        };
                        if !next.field_type.kind.is_bitfield() {
                            break;
                        }
                        let width = self.bitfield_width(&next.field_type);
                        if let (Some(start), Some(total), Some(width)) =
                            (offset, run_bits, width)
                        {
                            offsets.insert(next.name.clone(), start + total / 8);
                            run_bits = Some(total + width);
                        } else {
                            run_bits = None;
                        }
                        j += 1;
                    }
                    offset = match (offset, run_bits) {
                        (Some(o), Some(bits)) => Some(o + bits.div_ceil(8)),
                        _ => None,
                    };
                    i = j;
                }
                StructItem::Field(field) => {
                    let layout = self.type_layout(&field.field_type);
                    max_align = max_align.max(layout.alignment);
                    offset = offset.map(|o| round_up(o, layout.alignment));
                    if let Some(o) = offset {
                        offsets.insert(field.name.clone(), o);
                    }
                    offset = match (offset, layout.total_size) {
                        (Some(o), Some(size)) => Some(o + size),
                        _ => None,
                    };
                    // A guard makes the field's presence a runtime fact;
                    // everything after it loses its static offset.
                    if field.condition.is_some() {
                        offset = None;
                    }
                    i += 1;
                }
                // Inline items are removed by Phase 0.
                _ => {
                    i += 1;
                }
            }
        }

        ItemsLayout {
            size: offset,
            alignment: max_align,
            offsets,
        }
    }

    fn struct_layout(&mut self, def: DefRef) -> TypeLayout {
        let struct_def = &self.modules.module(def.module).structs[def.index];
        let name = struct_def.name.clone();

        if let Some(existing) = self.struct_layouts.get(&name) {
            return TypeLayout {
                total_size: existing.total_size,
                alignment: existing.alignment,
            };
        }
        if !self.in_progress.insert(name.clone()) {
            return TypeLayout {
                total_size: None,
                alignment: 1,
            };
        }

        let items = self.items_layout(&struct_def.body);
        let total = items.size.map(|s| round_up(s, items.alignment));

        self.in_progress.remove(&name);
        let layout = StructLayout {
            total_size: total,
            alignment: items.alignment,
            field_offsets: items.offsets,
        };
        let result = TypeLayout {
            total_size: layout.total_size,
            alignment: layout.alignment,
        };
        self.struct_layouts.insert(name, layout);
        result
    }

    fn union_layout(&mut self, def: DefRef) -> TypeLayout {
        let union_def = &self.modules.module(def.module).unions[def.index];
        let name = union_def.name.clone();

        if let Some(existing) = self.union_layouts.get(&name) {
            return *existing;
        }
        if !self.in_progress.insert(name.clone()) {
            return TypeLayout {
                total_size: None,
                alignment: 1,
            };
        }

        let cases = &union_def.cases;
        let mut max_size: Option<u64> = Some(0);
        let mut max_align: u64 = 1;
        for case in cases {
            let items = self.items_layout(&case.items);
            max_align = max_align.max(items.alignment);
            max_size = match (max_size, items.size) {
                (Some(a), Some(b)) => Some(a.max(b)),
                _ => None,
            };
        }

        self.in_progress.remove(&name);
        let layout = TypeLayout {
            total_size: max_size.map(|s| round_up(s, max_align)),
            alignment: max_align,
        };
        self.union_layouts.insert(name, layout);
        layout
    }

    fn choice_layout(&mut self, def: DefRef) -> TypeLayout {
        let choice_def = &self.modules.module(def.module).choices[def.index];
        let name = choice_def.name.clone();

        if let Some(existing) = self.choice_layouts.get(&name) {
            return *existing;
        }
        if !self.in_progress.insert(name.clone()) {
            return TypeLayout {
                total_size: None,
                alignment: 1,
            };
        }

        // External selectors of unknown type reserve 4 bytes of storage.
        let (sel_size, sel_align) = match &choice_def.selector {
            ChoiceSelector::Inline(disc) => {
                let layout = self.type_layout(disc);
                (layout.total_size, layout.alignment)
            }
            ChoiceSelector::On(_) => (Some(4), 4),
        };

        let mut max_payload: Option<u64> = Some(0);
        let mut max_align = sel_align;
        for case in &choice_def.cases {
            if let Some(field) = case.payload.as_field() {
                let layout = self.type_layout(&field.field_type);
                max_align = max_align.max(layout.alignment);
                max_payload = match (max_payload, layout.total_size) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                };
            }
        }

        self.in_progress.remove(&name);
        let layout = TypeLayout {
            total_size: match (sel_size, max_payload) {
                (Some(s), Some(p)) => Some(round_up(s + p, max_align)),
                _ => None,
            },
            alignment: max_align,
        };
        self.choice_layouts.insert(name, layout);
        layout
    }
}
