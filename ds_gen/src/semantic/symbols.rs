//! Per-module symbol tables.
//!
//! Definitions are addressed by [`DefRef`] (module index + index into the
//! module's per-kind vector) so the analyzed set never borrows the AST.

use ds_ast::{Module, ModuleSet};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Address of a definition inside a [`ModuleSet`].
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub struct DefRef {
    pub module: usize,
    pub index: usize,
}

/// The seven symbol kinds, in the fixed lookup order of name resolution.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SymbolKind {
    Constant,
    Struct,
    Union,
    Enum,
    Subtype,
    Choice,
    Constraint,
}

impl SymbolKind {
    pub fn noun(&self) -> &'static str {
        match self {
            SymbolKind::Constant => "Constant",
            SymbolKind::Struct => "Struct",
            SymbolKind::Union => "Union",
            SymbolKind::Enum => "Enum",
            SymbolKind::Subtype => "Subtype",
            SymbolKind::Choice => "Choice",
            SymbolKind::Constraint => "Constraint",
        }
    }
}

/// Name → definition maps for one module, one map per symbol kind.
/// Insertion order matches declaration order.
#[derive(Debug, Default, Clone)]
pub struct ModuleSymbols {
    pub constants: IndexMap<String, usize>,
    pub structs: IndexMap<String, usize>,
    pub unions: IndexMap<String, usize>,
    pub enums: IndexMap<String, usize>,
    pub subtypes: IndexMap<String, usize>,
    pub choices: IndexMap<String, usize>,
    pub constraints: IndexMap<String, usize>,
}

impl ModuleSymbols {
    /// Kind of an already-registered name, if any. Used for duplicate
    /// detection across kinds.
    pub fn kind_of(&self, name: &str) -> Option<(SymbolKind, usize)> {
        if let Some(&idx) = self.constants.get(name) {
            return Some((SymbolKind::Constant, idx));
        }
        if let Some(&idx) = self.structs.get(name) {
            return Some((SymbolKind::Struct, idx));
        }
        if let Some(&idx) = self.unions.get(name) {
            return Some((SymbolKind::Union, idx));
        }
        if let Some(&idx) = self.enums.get(name) {
            return Some((SymbolKind::Enum, idx));
        }
        if let Some(&idx) = self.subtypes.get(name) {
            return Some((SymbolKind::Subtype, idx));
        }
        if let Some(&idx) = self.choices.get(name) {
            return Some((SymbolKind::Choice, idx));
        }
        if let Some(&idx) = self.constraints.get(name) {
            return Some((SymbolKind::Constraint, idx));
        }
        None
    }

    pub fn map_for(&mut self, kind: SymbolKind) -> &mut IndexMap<String, usize> {
        match kind {
            SymbolKind::Constant => &mut self.constants,
            SymbolKind::Struct => &mut self.structs,
            SymbolKind::Union => &mut self.unions,
            SymbolKind::Enum => &mut self.enums,
            SymbolKind::Subtype => &mut self.subtypes,
            SymbolKind::Choice => &mut self.choices,
            SymbolKind::Constraint => &mut self.constraints,
        }
    }
}

/// Symbol tables for a whole module set, plus the package → module index
/// used by qualified lookup.
#[derive(Debug, Default, Clone)]
pub struct SymbolTable {
    pub modules: Vec<ModuleSymbols>,
    pub packages: HashMap<String, usize>,
}

impl SymbolTable {
    pub fn with_module_count(count: usize) -> Self {
        Self {
            modules: vec![ModuleSymbols::default(); count],
            packages: HashMap::new(),
        }
    }

    /// Splits a dotted name into the module it targets and the simple name.
    /// Single-part names search every module, main first; multi-part names
    /// target the module whose package matches the leading parts.
    fn candidate_modules(&self, parts: &[String]) -> (Vec<usize>, Option<String>) {
        if parts.len() == 1 {
            ((0..self.modules.len()).collect(), Some(parts[0].clone()))
        } else {
            let package = parts[..parts.len() - 1].join(".");
            let name = parts.last().cloned();
            match self.packages.get(&package) {
                Some(&module) => (vec![module], name),
                None => (Vec::new(), name),
            }
        }
    }

    fn find_in(
        &self,
        parts: &[String],
        select: impl Fn(&ModuleSymbols) -> &IndexMap<String, usize>,
    ) -> Option<DefRef> {
        let (modules, name) = self.candidate_modules(parts);
        let name = name?;
        for module in modules {
            if let Some(&index) = select(&self.modules[module]).get(&name) {
                return Some(DefRef { module, index });
            }
        }
        None
    }

    pub fn find_constant(&self, name: &str) -> Option<DefRef> {
        self.find_in(std::slice::from_ref(&name.to_string()), |m| &m.constants)
    }

    pub fn find_struct_qualified(&self, parts: &[String]) -> Option<DefRef> {
        self.find_in(parts, |m| &m.structs)
    }

    pub fn find_union_qualified(&self, parts: &[String]) -> Option<DefRef> {
        self.find_in(parts, |m| &m.unions)
    }

    pub fn find_enum_qualified(&self, parts: &[String]) -> Option<DefRef> {
        self.find_in(parts, |m| &m.enums)
    }

    pub fn find_subtype_qualified(&self, parts: &[String]) -> Option<DefRef> {
        self.find_in(parts, |m| &m.subtypes)
    }

    pub fn find_choice_qualified(&self, parts: &[String]) -> Option<DefRef> {
        self.find_in(parts, |m| &m.choices)
    }

    pub fn find_constraint(&self, name: &str) -> Option<DefRef> {
        self.find_in(std::slice::from_ref(&name.to_string()), |m| &m.constraints)
    }

    /// Enum containing an item with the given name, together with the item
    /// index. Used when choice case values name enum items.
    pub fn find_enum_item(&self, modules: &ModuleSet, item: &str) -> Option<(DefRef, usize)> {
        for (module_idx, symbols) in self.modules.iter().enumerate() {
            for &enum_idx in symbols.enums.values() {
                let enum_def = &module_ref(modules, module_idx).enums[enum_idx];
                if let Some(pos) = enum_def.items.iter().position(|it| it.name == item) {
                    return Some((
                        DefRef {
                            module: module_idx,
                            index: enum_idx,
                        },
                        pos,
                    ));
                }
            }
        }
        None
    }
}

fn module_ref(modules: &ModuleSet, index: usize) -> &Module {
    modules.module(index)
}
