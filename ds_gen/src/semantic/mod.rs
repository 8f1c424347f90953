//! Semantic analysis pipeline.
//!
//! Seven ordered phases over a shared AST. Phase 0 is the only pass that
//! mutates the module set; every later phase reads it and records facts in
//! side tables keyed by node id or definition name. Failures are
//! diagnostics, never early returns: a run always produces a result, and a
//! result with no errors always carries an analyzed set.

pub mod diagnostics;
pub mod phases;
pub mod symbols;

use crate::semantic::diagnostics::{Diagnostic, DiagnosticLevel};
use crate::semantic::symbols::{DefRef, SymbolTable};
use ds_ast::{ModuleSet, NodeId};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};

/// Analyzer configuration.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Abort after the first phase that reported an error.
    pub stop_on_first_error: bool,
    /// Messages below this level are dropped before returning.
    pub min_level: DiagnosticLevel,
    /// Promote surviving warnings to errors.
    pub warnings_as_errors: bool,
    /// Diagnostic codes to silence (warnings only).
    pub disabled_warnings: HashSet<String>,
    /// Backend tags to consult for keyword-collision checks; empty means
    /// every registered backend.
    pub target_languages: Vec<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            stop_on_first_error: false,
            min_level: DiagnosticLevel::Note,
            warnings_as_errors: false,
            disabled_warnings: HashSet::new(),
            target_languages: Vec::new(),
        }
    }
}

/// What a qualified name in type position resolved to.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ResolvedTarget {
    Struct(DefRef),
    Union(DefRef),
    Enum(DefRef),
    Subtype(DefRef),
    Choice(DefRef),
}

/// Computed size/alignment of a union or choice. `total_size` is `None`
/// when the type has runtime-sized content.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct TypeLayout {
    pub total_size: Option<u64>,
    pub alignment: u64,
}

/// Computed layout of a struct, including per-field byte offsets.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct StructLayout {
    pub total_size: Option<u64>,
    pub alignment: u64,
    pub field_offsets: IndexMap<String, u64>,
}

/// The analyzer's output: symbol table plus side tables. Index-based, so it
/// can outlive or be dropped independently of the AST it describes.
#[derive(Debug, Default, Clone)]
pub struct AnalyzedModuleSet {
    pub symbols: SymbolTable,
    pub resolved_types: HashMap<NodeId, ResolvedTarget>,
    pub constant_values: IndexMap<String, u64>,
    pub struct_layouts: HashMap<String, StructLayout>,
    pub union_layouts: HashMap<String, TypeLayout>,
    pub choice_layouts: HashMap<String, TypeLayout>,
}

#[derive(Debug, Default)]
pub struct AnalysisResult {
    /// Present iff no errors survived filtering.
    pub analyzed: Option<AnalyzedModuleSet>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AnalysisResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn diagnostics_with_code(&self, code: &str) -> Vec<&Diagnostic> {
        self.diagnostics.iter().filter(|d| d.code == code).collect()
    }
}

/// Runs the full phase pipeline over a parsed module set.
pub fn analyze(modules: &mut ModuleSet, opts: &AnalysisOptions) -> AnalysisResult {
    let mut diagnostics = Vec::new();

    // Phase 0: desugar inline aggregates into named definitions.
    phases::desugar::desugar_inline_types(modules);

    // Phase 1: symbol collection, with keyword validation.
    let symbols = phases::collect::collect_symbols(modules, &mut diagnostics, opts);

    let stop = |diags: &[Diagnostic]| opts.stop_on_first_error && diags.iter().any(Diagnostic::is_error);

    if stop(&diagnostics) {
        return finish(None, diagnostics, opts);
    }

    let mut analyzed = AnalyzedModuleSet {
        symbols,
        ..Default::default()
    };

    // Phase 2: name resolution.
    phases::resolve::resolve_names(modules, &mut analyzed, &mut diagnostics);
    if stop(&diagnostics) {
        return finish(None, diagnostics, opts);
    }

    // Phase 3: type checking.
    phases::typecheck::check_types(modules, &analyzed, &mut diagnostics);
    if stop(&diagnostics) {
        return finish(None, diagnostics, opts);
    }

    // Phase 4: constant evaluation.
    phases::fold::evaluate_constants(modules, &mut analyzed, &mut diagnostics);
    if stop(&diagnostics) {
        return finish(None, diagnostics, opts);
    }

    // Phase 5: size and alignment.
    phases::layout::calculate_sizes(modules, &mut analyzed, &mut diagnostics);
    if stop(&diagnostics) {
        return finish(None, diagnostics, opts);
    }

    // Phase 6: constraint validation.
    phases::constraints::validate_constraints(modules, &analyzed, &mut diagnostics);
    if stop(&diagnostics) {
        return finish(None, diagnostics, opts);
    }

    // Phase 7: reachability analysis.
    phases::reachability::analyze_reachability(modules, &analyzed, &mut diagnostics);

    finish(Some(analyzed), diagnostics, opts)
}

fn finish(
    analyzed: Option<AnalyzedModuleSet>,
    diagnostics: Vec<Diagnostic>,
    opts: &AnalysisOptions,
) -> AnalysisResult {
    let mut filtered = Vec::with_capacity(diagnostics.len());
    for mut diag in diagnostics {
        if diag.level.rank() > opts.min_level.rank() {
            continue;
        }
        if diag.level == DiagnosticLevel::Warning && opts.disabled_warnings.contains(diag.code) {
            continue;
        }
        if opts.warnings_as_errors && diag.level == DiagnosticLevel::Warning {
            diag.level = DiagnosticLevel::Error;
        }
        filtered.push(diag);
    }

    let has_errors = filtered.iter().any(Diagnostic::is_error);
    AnalysisResult {
        analyzed: if has_errors { None } else { analyzed },
        diagnostics: filtered,
    }
}
