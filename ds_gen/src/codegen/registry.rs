//! Process-wide backend registry.
//!
//! Seeded with the built-in backends on first access; embedders may
//! register additional backends at startup, before the first compilation
//! queries it. Registration is idempotent (re-registering a language
//! replaces the instance); lookup lower-cases the language tag.

use crate::codegen::cpp::CppBackend;
use crate::codegen::datascript::DataScriptBackend;
use crate::codegen::Backend;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock, RwLock};

static REGISTRY: LazyLock<RwLock<BackendRegistry>> = LazyLock::new(|| {
    let mut registry = BackendRegistry::empty();
    registry.register(Arc::new(CppBackend::new()));
    registry.register(Arc::new(DataScriptBackend::new()));
    RwLock::new(registry)
});

pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
        }
    }

    /// The process-wide instance. Writes (registration) must happen before
    /// concurrent compilations start; that ordering is the embedder's
    /// contract.
    pub fn global() -> &'static RwLock<BackendRegistry> {
        &REGISTRY
    }

    fn normalize(name: &str) -> String {
        name.to_lowercase()
    }

    /// Registers a backend under its metadata name, replacing any previous
    /// instance for that language.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        let name = Self::normalize(backend.metadata().name);
        self.backends.insert(name, backend);
    }

    pub fn get(&self, language: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(&Self::normalize(language))
    }

    pub fn has(&self, language: &str) -> bool {
        self.backends.contains_key(&Self::normalize(language))
    }

    pub fn available_languages(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    pub fn is_keyword(&self, language: &str, identifier: &str) -> bool {
        self.get(language)
            .map(|backend| backend.is_reserved_keyword(identifier))
            .unwrap_or(false)
    }

    /// Languages in which the identifier is reserved.
    pub fn conflicting_languages(&self, identifier: &str) -> Vec<String> {
        self.backends
            .iter()
            .filter(|(_, backend)| backend.is_reserved_keyword(identifier))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Union of every registered backend's keyword set.
    pub fn all_keywords(&self) -> BTreeSet<String> {
        self.backends
            .values()
            .flat_map(|backend| backend.reserved_keywords().iter().map(|kw| kw.to_string()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_backends_are_seeded() {
        let registry = BackendRegistry::global().read().unwrap();
        assert!(registry.has("cpp"));
        assert!(registry.has("CPP"), "lookup is case-insensitive");
        assert!(registry.has("datascript"));
        assert!(registry.get("cobol").is_none());
    }

    #[test]
    fn keyword_queries_cross_languages() {
        let registry = BackendRegistry::global().read().unwrap();
        // `class` is a C++ keyword, not a DataScript one.
        assert!(registry.is_keyword("cpp", "class"));
        let conflicts = registry.conflicting_languages("struct");
        assert!(conflicts.contains(&"cpp".to_string()));
        assert!(conflicts.contains(&"datascript".to_string()));
        assert!(registry.all_keywords().contains("namespace"));
    }
}
