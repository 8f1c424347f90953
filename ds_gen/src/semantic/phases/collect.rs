//! Phase 1: symbol collection.
//!
//! Populates the per-module symbol tables and validates user-chosen
//! identifiers against target-language keyword sets through the backend
//! registry.

use crate::codegen::registry::BackendRegistry;
use crate::semantic::diagnostics::{codes, Diagnostic};
use crate::semantic::symbols::{SymbolKind, SymbolTable};
use crate::semantic::AnalysisOptions;
use ds_ast::{Module, ModuleSet, SourcePos, StructItem};

pub fn collect_symbols(
    modules: &ModuleSet,
    diags: &mut Vec<Diagnostic>,
    opts: &AnalysisOptions,
) -> SymbolTable {
    let mut symbols = SymbolTable::with_module_count(modules.module_count());

    for (module_idx, module) in modules.modules() {
        let package = module.package_name();
        if !package.is_empty() {
            symbols.packages.entry(package).or_insert(module_idx);
        }
        collect_module(module, module_idx, &mut symbols, diags);
    }

    validate_keywords(modules, diags, opts);

    symbols
}

fn collect_module(
    module: &Module,
    module_idx: usize,
    symbols: &mut SymbolTable,
    diags: &mut Vec<Diagnostic>,
) {
    let defs: Vec<(SymbolKind, usize, &str, &SourcePos)> = module
        .constants
        .iter()
        .enumerate()
        .map(|(i, d)| (SymbolKind::Constant, i, d.name.as_str(), &d.pos))
        .chain(
            module
                .structs
                .iter()
                .enumerate()
                .map(|(i, d)| (SymbolKind::Struct, i, d.name.as_str(), &d.pos)),
        )
        .chain(
            module
                .unions
                .iter()
                .enumerate()
                .map(|(i, d)| (SymbolKind::Union, i, d.name.as_str(), &d.pos)),
        )
        .chain(
            module
                .enums
                .iter()
                .enumerate()
                .map(|(i, d)| (SymbolKind::Enum, i, d.name.as_str(), &d.pos)),
        )
        .chain(
            module
                .subtypes
                .iter()
                .enumerate()
                .map(|(i, d)| (SymbolKind::Subtype, i, d.name.as_str(), &d.pos)),
        )
        .chain(
            module
                .choices
                .iter()
                .enumerate()
                .map(|(i, d)| (SymbolKind::Choice, i, d.name.as_str(), &d.pos)),
        )
        .chain(
            module
                .constraints
                .iter()
                .enumerate()
                .map(|(i, d)| (SymbolKind::Constraint, i, d.name.as_str(), &d.pos)),
        )
        .collect();

    for (kind, index, name, pos) in defs {
        let table = &mut symbols.modules[module_idx];
        if let Some((prev_kind, prev_index)) = table.kind_of(name) {
            let prev_pos = definition_pos(module, prev_kind, prev_index);
            diags.push(
                Diagnostic::error(
                    codes::E_DUPLICATE_DEFINITION,
                    format!("{} '{}' is already defined in this module", kind.noun(), name),
                    pos.clone(),
                )
                .with_related(prev_pos, "Previous definition here"),
            );
            continue;
        }
        table.map_for(kind).insert(name.to_string(), index);
    }
}

fn definition_pos(module: &Module, kind: SymbolKind, index: usize) -> SourcePos {
    match kind {
        SymbolKind::Constant => module.constants[index].pos.clone(),
        SymbolKind::Struct => module.structs[index].pos.clone(),
        SymbolKind::Union => module.unions[index].pos.clone(),
        SymbolKind::Enum => module.enums[index].pos.clone(),
        SymbolKind::Subtype => module.subtypes[index].pos.clone(),
        SymbolKind::Choice => module.choices[index].pos.clone(),
        SymbolKind::Constraint => module.constraints[index].pos.clone(),
    }
}

/// Every user-chosen identifier that will surface in generated code.
fn user_identifiers(module: &Module) -> Vec<(String, SourcePos)> {
    let mut out = Vec::new();
    for c in &module.constants {
        out.push((c.name.clone(), c.pos.clone()));
    }
    for s in &module.subtypes {
        out.push((s.name.clone(), s.pos.clone()));
    }
    for e in &module.enums {
        out.push((e.name.clone(), e.pos.clone()));
        for item in &e.items {
            out.push((item.name.clone(), item.pos.clone()));
        }
    }
    for s in &module.structs {
        out.push((s.name.clone(), s.pos.clone()));
        for item in &s.body {
            if let StructItem::Field(field) = item {
                out.push((field.name.clone(), field.pos.clone()));
            }
        }
    }
    for u in &module.unions {
        out.push((u.name.clone(), u.pos.clone()));
        for case in &u.cases {
            for item in &case.items {
                if let StructItem::Field(field) = item {
                    out.push((field.name.clone(), field.pos.clone()));
                }
            }
        }
    }
    for c in &module.choices {
        out.push((c.name.clone(), c.pos.clone()));
        for case in &c.cases {
            out.push((case.payload.name().to_string(), case.payload.pos().clone()));
        }
    }
    for c in &module.constraints {
        out.push((c.name.clone(), c.pos.clone()));
    }
    out
}

fn validate_keywords(modules: &ModuleSet, diags: &mut Vec<Diagnostic>, opts: &AnalysisOptions) {
    let registry = BackendRegistry::global()
        .read()
        .expect("backend registry poisoned");

    let available = registry.available_languages();
    let targets: Vec<String> = if opts.target_languages.is_empty() {
        available.clone()
    } else {
        let mut known = Vec::new();
        let mut reported_unknown = false;
        for lang in &opts.target_languages {
            if registry.has(lang) {
                known.push(lang.to_lowercase());
            } else if !reported_unknown {
                diags.push(Diagnostic::error(
                    codes::E_UNKNOWN_TARGET_LANGUAGE,
                    format!(
                        "Target language '{}' is not registered (available: {})",
                        lang,
                        available.join(", ")
                    ),
                    SourcePos::default(),
                ));
                reported_unknown = true;
            }
        }
        known
    };

    for (_, module) in modules.modules() {
        for (identifier, pos) in user_identifiers(module) {
            for lang in &targets {
                if registry.is_keyword(lang, &identifier) {
                    let suggestion = registry
                        .get(lang)
                        .map(|backend| backend.sanitize_identifier(&identifier))
                        .unwrap_or_else(|| format!("{}_", identifier));
                    diags.push(
                        Diagnostic::warning(
                            codes::W_KEYWORD_COLLISION,
                            format!(
                                "Identifier '{}' is a reserved keyword in {}",
                                identifier, lang
                            ),
                            pos.clone(),
                        )
                        .with_suggestion(format!("Rename to '{}'", suggestion)),
                    );
                }
            }
        }
    }
}
