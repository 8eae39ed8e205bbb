//! Per-document symbol tables and the queries answered from them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use url::Url;

use crate::extract::{extract_symbols_with, ModuleSyntax};
use crate::registry::ModuleRegistry;
use crate::scope::Position;
use crate::symbols::{DocumentSymbolTable, Symbol};

/// Owns one [`DocumentSymbolTable`] per tracked document.
///
/// Tables are immutable once built; an update swaps in a fresh `Arc` so a
/// reader holding the previous table keeps a consistent snapshot.
#[derive(Debug, Default)]
pub struct SymbolService {
    tables: RwLock<HashMap<Url, Arc<DocumentSymbolTable>>>,
    syntax: RwLock<Arc<ModuleSyntax>>,
}

impl SymbolService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module-path syntax used for documents indexed from now on.
    pub fn set_syntax(&self, syntax: Arc<ModuleSyntax>) {
        *self
            .syntax
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = syntax;
    }

    /// Re-index `uri` from its full text.
    pub fn update(&self, uri: &Url, text: &str) -> Arc<DocumentSymbolTable> {
        let syntax = self
            .syntax
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let table = Arc::new(extract_symbols_with(uri, text, &syntax));
        tracing::debug!(%uri, symbols = table.symbols.len(), "indexed document");
        self.tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(uri.clone(), table.clone());
        table
    }

    pub fn remove(&self, uri: &Url) {
        self.tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(uri);
    }

    pub fn table(&self, uri: &Url) -> Option<Arc<DocumentSymbolTable>> {
        self.tables
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(uri)
            .cloned()
    }

    pub fn is_tracked(&self, uri: &Url) -> bool {
        self.table(uri).is_some()
    }

    /// All symbols of a document, or nothing if it is not tracked.
    pub fn symbols_in_file(&self, uri: &Url) -> Vec<Symbol> {
        self.table(uri)
            .map(|table| table.symbols.clone())
            .unwrap_or_default()
    }

    /// Symbols whose scope contains `point`.
    pub fn symbols_in_scope(&self, uri: &Url, point: Position) -> Vec<Symbol> {
        self.symbols_in_file(uri)
            .into_iter()
            .filter(|symbol| symbol.scope().contains(point))
            .collect()
    }

    /// In-scope symbols at `point` after shadowing is applied.
    pub fn visible_symbols(&self, uri: &Url, point: Position) -> Vec<Symbol> {
        resolve_shadowing(self.symbols_in_file(uri), point)
    }

    pub fn used_modules(&self, uri: &Url) -> Vec<String> {
        self.table(uri)
            .map(|table| table.used_modules.clone())
            .unwrap_or_default()
    }

    /// Top-level functions of the module named `module`.
    pub fn module_functions(&self, registry: &ModuleRegistry, module: &str) -> Vec<Symbol> {
        registry
            .find(module)
            .iter()
            .filter_map(|entry| entry.uri())
            .filter_map(|uri| self.table(&uri))
            .flat_map(|table| {
                table
                    .top_level_functions()
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Resolve `name` as a function exported by another module.
    ///
    /// A qualified name `a::b::f` (written with the registry's separator)
    /// looks only in module `a::b`; a bare name looks in every module
    /// imported by `uri`. Every match is returned, in import order.
    pub fn find_across_imports(&self, registry: &ModuleRegistry, uri: &Url, name: &str) -> Vec<Symbol> {
        if let Some((module, member)) = registry.syntax().split_qualified(name) {
            return self
                .module_functions(registry, module)
                .into_iter()
                .filter(|symbol| symbol.name == member)
                .collect();
        }

        self.used_modules(uri)
            .iter()
            .flat_map(|module| self.module_functions(registry, module))
            .filter(|symbol| symbol.name == name)
            .collect()
    }

    /// Local lookup first, then imported modules. `accept` narrows the
    /// candidates (e.g. to functions at a call site) before shadowing.
    pub fn find_symbol(
        &self,
        registry: &ModuleRegistry,
        uri: &Url,
        name: &str,
        point: Position,
        accept: impl Fn(&Symbol) -> bool,
    ) -> Vec<Symbol> {
        let candidates: Vec<Symbol> = self
            .symbols_in_file(uri)
            .into_iter()
            .filter(|symbol| symbol.name == name && accept(symbol))
            .collect();
        let local = resolve_shadowing(candidates, point);
        if !local.is_empty() {
            return local;
        }
        self.find_across_imports(registry, uri, name)
            .into_iter()
            .filter(|symbol| accept(symbol))
            .collect()
    }
}

/// Drop candidates that are out of scope at `point` or shadowed by a more
/// deeply nested declaration of the same name.
///
/// For each name only the symbols whose scope starts latest survive; several
/// may survive when they tie.
pub fn resolve_shadowing(candidates: Vec<Symbol>, point: Position) -> Vec<Symbol> {
    let in_scope: Vec<Symbol> = candidates
        .into_iter()
        .filter(|symbol| symbol.scope().contains(point))
        .collect();

    let mut innermost: HashMap<&str, Position> = HashMap::new();
    for symbol in &in_scope {
        let start = symbol.scope().start;
        innermost
            .entry(symbol.name.as_str())
            .and_modify(|best| *best = (*best).max(start))
            .or_insert(start);
    }

    let keep: Vec<bool> = in_scope
        .iter()
        .map(|symbol| innermost.get(symbol.name.as_str()) == Some(&symbol.scope().start))
        .collect();

    in_scope
        .into_iter()
        .zip(keep)
        .filter_map(|(symbol, keep)| keep.then_some(symbol))
        .collect()
}
