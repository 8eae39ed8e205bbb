//! Ties the symbol service, module registry and metadata cache together.
//!
//! [`Analysis`] owns all indexing state and answers language-feature queries
//! with plain data. It knows nothing about the transport; the LSP backend
//! feeds it document events and converts the answers.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tower_lsp::lsp_types::{CompletionItem, Diagnostic};
use url::Url;

use crate::completion;
use crate::config::ServerConfig;
use crate::database::DatabaseClient;
use crate::diagnostics::unknown_module_diagnostics;
use crate::error::{Error, Result};
use crate::metadata::MetadataCache;
use crate::registry::{ModuleEvent, ModuleRegistry};
use crate::resolve::{self, describe};
use crate::scope::{Position, Range};
use crate::service::SymbolService;
use crate::symbols::Symbol;

#[derive(Debug)]
pub struct Analysis {
    pub symbols: SymbolService,
    pub registry: Arc<ModuleRegistry>,
    pub metadata: Arc<MetadataCache>,
    config: RwLock<ServerConfig>,
    /// Documents the editor owns; their tables come from the editor's text,
    /// never from disk.
    open: RwLock<HashSet<Url>>,
}

/// Hover text and the extent of the token it describes.
#[derive(Debug, Clone, PartialEq)]
pub struct HoverText {
    pub markdown: String,
    pub range: Range,
}

impl Analysis {
    pub fn new(config: ServerConfig, db: Arc<dyn DatabaseClient>) -> Self {
        let registry = Arc::new(ModuleRegistry::new(config.registry_settings()));
        let symbols = SymbolService::new();
        symbols.set_syntax(registry.syntax());
        Self {
            symbols,
            registry,
            metadata: Arc::new(MetadataCache::new(db, config.refresh_interval())),
            config: RwLock::new(config),
            open: RwLock::new(HashSet::new()),
        }
    }

    pub fn config(&self) -> ServerConfig {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Apply new settings. Returns true when the module layout changed and
    /// the registry must be rescanned; open documents then need re-indexing
    /// by the caller, which holds their text.
    pub fn configure(&self, config: ServerConfig) -> bool {
        let previous = self.config();
        let rescan = previous.registry_settings() != config.registry_settings()
            || previous.module_root != config.module_root;
        self.registry.configure(config.registry_settings());
        self.symbols.set_syntax(self.registry.syntax());
        self.metadata.set_interval(config.refresh_interval());
        *self
            .config
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = config;
        rescan
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.open
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains(uri)
    }

    pub fn open_documents(&self) -> Vec<Url> {
        self.open
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    pub fn open_document(&self, uri: &Url, text: &str) {
        self.open
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(uri.clone());
        self.symbols.update(uri, text);
    }

    pub fn change_document(&self, uri: &Url, text: &str) {
        self.symbols.update(uri, text);
    }

    /// Stop tracking editor text for `uri`. A registered module falls back to
    /// its file on disk so other documents can still import from it.
    pub fn close_document(&self, uri: &Url) {
        self.open
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(uri);

        let registered = uri
            .to_file_path()
            .ok()
            .and_then(|path| self.registry.entry_for_path(&path));
        match registered {
            Some(entry) => {
                if let Err(err) = self.index_file(&entry.path) {
                    tracing::warn!(%uri, error = %err, "failed to reload closed module");
                    self.symbols.remove(uri);
                }
            }
            None => self.symbols.remove(uri),
        }
    }

    /// Index a module file from disk, unless the editor has it open.
    pub fn index_file(&self, path: &Path) -> Result<()> {
        let uri = Url::from_file_path(path)
            .map_err(|_| Error::NotAFile(path.display().to_string()))?;
        if self.is_open(&uri) {
            return Ok(());
        }
        let text = fs::read_to_string(path)?;
        self.symbols.update(&uri, &text);
        Ok(())
    }

    /// Scan `root` and index every module found. Returns the directories to
    /// watch.
    pub fn scan_modules(&self, root: &Path) -> Result<Vec<PathBuf>> {
        let outcome = self.registry.scan(root)?;
        self.apply_module_events(&outcome.events);
        Ok(outcome.new_dirs)
    }

    /// Re-register one directory after a change notification. Returns newly
    /// discovered directories to watch.
    pub fn rescan_directory(&self, dir: &Path) -> Vec<PathBuf> {
        let outcome = self.registry.rescan_dir(dir);
        self.apply_module_events(&outcome.events);
        outcome.new_dirs
    }

    /// Keep symbol tables in step with registry changes.
    pub fn apply_module_events(&self, events: &[ModuleEvent]) {
        for event in events {
            let entry = event.entry();
            match event {
                ModuleEvent::Added(_) | ModuleEvent::Changed(_) => {
                    if let Err(err) = self.index_file(&entry.path) {
                        tracing::warn!(path = %entry.path.display(), error = %err, "failed to index module file");
                    }
                }
                ModuleEvent::Removed(_) => {
                    if let Some(uri) = entry.uri() {
                        if !self.is_open(&uri) {
                            self.symbols.remove(&uri);
                        }
                    }
                }
            }
        }
    }

    pub async fn completion(&self, uri: &Url, text: &str, position: Position) -> Vec<CompletionItem> {
        if !self.symbols.is_tracked(uri) {
            return Vec::new();
        }
        completion::completions(self, uri, text, position).await
    }

    pub fn hover(&self, uri: &Url, text: &str, position: Position) -> Option<HoverText> {
        let (token, found) = resolve::resolve(self, uri, text, position);
        let token = token?;
        if found.is_empty() {
            return None;
        }
        let markdown = found
            .iter()
            .map(describe)
            .collect::<Vec<_>>()
            .join("\n\n");
        Some(HoverText {
            markdown,
            range: token.range,
        })
    }

    /// Declarations of the identifier under the cursor; several when the
    /// name is exported by more than one imported module.
    pub fn definition(&self, uri: &Url, text: &str, position: Position) -> Vec<Symbol> {
        resolve::resolve(self, uri, text, position).1
    }

    pub fn diagnostics(&self, text: &str) -> Vec<Diagnostic> {
        let severity = self.config().unknown_module_severity.into();
        unknown_module_diagnostics(&self.registry, text, severity)
    }
}
