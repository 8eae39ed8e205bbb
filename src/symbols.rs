// Symbol table data model

use crate::scope::{Position, Range};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Variable,
    Param,
    Module,
}

/// Kind-specific data attached to a [`Symbol`].
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolMeta {
    Function {
        params: Vec<String>,
        doc: Option<String>,
        /// Scope the function is visible in: the block enclosing the `def`.
        scope: Range,
        /// The `{ ... }` body.
        body: Range,
        is_top_level: bool,
    },
    Variable {
        doc: Option<String>,
        /// From the assignment to the end of the enclosing block.
        scope: Range,
    },
    Param {
        function: String,
        /// The owning function's body.
        scope: Range,
    },
    Module {
        scope: Range,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    /// Start of the declared name.
    pub position: Position,
    /// Extent of the declared name.
    pub range: Range,
    pub uri: Url,
    pub meta: SymbolMeta,
}

impl Symbol {
    pub fn kind(&self) -> SymbolKind {
        match self.meta {
            SymbolMeta::Function { .. } => SymbolKind::Function,
            SymbolMeta::Variable { .. } => SymbolKind::Variable,
            SymbolMeta::Param { .. } => SymbolKind::Param,
            SymbolMeta::Module { .. } => SymbolKind::Module,
        }
    }

    /// The range in which this symbol can be referenced.
    pub fn scope(&self) -> Range {
        match &self.meta {
            SymbolMeta::Function { scope, .. }
            | SymbolMeta::Variable { scope, .. }
            | SymbolMeta::Param { scope, .. }
            | SymbolMeta::Module { scope } => *scope,
        }
    }

    pub fn is_top_level_function(&self) -> bool {
        matches!(self.meta, SymbolMeta::Function { is_top_level: true, .. })
    }

    pub fn params(&self) -> &[String] {
        match &self.meta {
            SymbolMeta::Function { params, .. } => params,
            _ => &[],
        }
    }

    pub fn doc(&self) -> Option<&str> {
        match &self.meta {
            SymbolMeta::Function { doc, .. } | SymbolMeta::Variable { doc, .. } => doc.as_deref(),
            _ => None,
        }
    }
}

/// Everything extracted from one document, replaced wholesale on each change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentSymbolTable {
    /// Name from a leading `module a::b` line.
    pub declared_module: Option<String>,
    /// Line of the `module` declaration, when present.
    pub module_line: Option<u32>,
    /// Modules named by `use` statements, in source order.
    pub used_modules: Vec<String>,
    pub symbols: Vec<Symbol>,
}

impl DocumentSymbolTable {
    pub fn functions(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols
            .iter()
            .filter(|symbol| symbol.kind() == SymbolKind::Function)
    }

    pub fn top_level_functions(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|symbol| symbol.is_top_level_function())
    }

    pub fn imports(&self, module: &str) -> bool {
        self.used_modules.iter().any(|used| used == module)
    }
}
