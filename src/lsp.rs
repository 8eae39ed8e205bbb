// DolphinDB script language server

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tower_lsp::lsp_types::*;

use crate::analysis::Analysis;
use crate::config::ServerConfig;
use crate::database::{DatabaseClient, EditorDatabase};
use crate::watch::{next_batch, ModuleWatcher};

#[derive(Debug, Clone)]
pub struct Backend {
    pub client: tower_lsp::Client,
    /// Editor text of every open document
    pub documents: Arc<RwLock<HashMap<url::Url, String>>>,
    pub analysis: Arc<Analysis>,
    workspace_root: Arc<std::sync::RwLock<Option<PathBuf>>>,
    watcher: Arc<Mutex<Option<ModuleWatcher>>>,
}

impl Backend {
    pub fn new(client: tower_lsp::Client) -> Self {
        let db = Arc::new(EditorDatabase::new(client.clone()));
        Self::with_database(client, db)
    }

    /// Backend with a custom metadata source instead of the editor.
    pub fn with_database(client: tower_lsp::Client, db: Arc<dyn DatabaseClient>) -> Self {
        Self {
            client,
            documents: Arc::new(RwLock::new(HashMap::new())),
            analysis: Arc::new(Analysis::new(ServerConfig::default(), db)),
            workspace_root: Arc::new(std::sync::RwLock::new(None)),
            watcher: Arc::new(Mutex::new(None)),
        }
    }

    fn module_root(&self) -> Option<PathBuf> {
        let workspace = self
            .workspace_root
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        let config = self.analysis.config();
        match (workspace, &config.module_root) {
            (Some(workspace), _) => Some(config.module_root(&workspace)),
            (None, Some(root)) if root.is_absolute() => Some(root.clone()),
            _ => None,
        }
    }

    fn apply_settings(&self, settings: serde_json::Value) -> bool {
        match ServerConfig::from_value(settings) {
            Ok(config) => self.analysis.configure(config),
            Err(err) => {
                tracing::warn!(error = %err, "ignoring invalid configuration");
                false
            }
        }
    }

    /// Scan the module root, index every module and watch its directories.
    pub async fn index_workspace(&self) {
        let Some(root) = self.module_root() else {
            tracing::info!("no workspace root, module registry disabled");
            return;
        };

        let analysis = self.analysis.clone();
        let scan_root = root.clone();
        let scanned = tokio::task::spawn_blocking(move || analysis.scan_modules(&scan_root)).await;
        let dirs = match scanned {
            Ok(Ok(dirs)) => dirs,
            Ok(Err(err)) => {
                tracing::warn!(root = %root.display(), error = %err, "module scan failed");
                let _ = self
                    .client
                    .log_message(MessageType::WARNING, format!("Module scan failed: {}", err))
                    .await;
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "module scan task failed");
                return;
            }
        };

        self.start_watcher().await;
        {
            let mut watcher = self.watcher.lock().await;
            if let Some(watcher) = watcher.as_mut() {
                watcher.clear();
            }
        }
        self.watch_directories(&dirs).await;

        let modules = self.analysis.registry.snapshot().entries().len();
        let _ = self
            .client
            .log_message(
                MessageType::INFO,
                format!("Indexed {} modules under {}", modules, root.display()),
            )
            .await;
        self.republish_diagnostics().await;
    }

    /// Create the directory watcher and its event loop on first use.
    async fn start_watcher(&self) {
        let mut guard = self.watcher.lock().await;
        if guard.is_some() {
            return;
        }
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        match ModuleWatcher::new(tx) {
            Ok(watcher) => {
                *guard = Some(watcher);
                let backend = self.clone();
                tokio::spawn(async move {
                    while let Some(batch) = next_batch(&mut rx).await {
                        backend.on_directories_changed(batch).await;
                    }
                });
            }
            Err(err) => tracing::warn!(error = %err, "file watching unavailable"),
        }
    }

    async fn watch_directories(&self, dirs: &[PathBuf]) {
        let mut guard = self.watcher.lock().await;
        if let Some(watcher) = guard.as_mut() {
            for dir in dirs {
                if let Err(err) = watcher.watch(dir) {
                    tracing::warn!(dir = %dir.display(), error = %err, "failed to watch directory");
                }
            }
        }
    }

    async fn on_directories_changed(&self, dirs: BTreeSet<PathBuf>) {
        let analysis = self.analysis.clone();
        let rescanned = tokio::task::spawn_blocking(move || {
            dirs.iter()
                .flat_map(|dir| analysis.rescan_directory(dir))
                .collect::<Vec<_>>()
        })
        .await;
        let new_dirs = match rescanned {
            Ok(new_dirs) => new_dirs,
            Err(err) => {
                tracing::warn!(error = %err, "directory rescan task failed");
                return;
            }
        };

        {
            let mut watcher = self.watcher.lock().await;
            if let Some(watcher) = watcher.as_mut() {
                watcher.prune();
            }
        }
        self.watch_directories(&new_dirs).await;
        self.republish_diagnostics().await;
    }

    async fn document_text(&self, uri: &url::Url) -> Option<String> {
        let docs = self.documents.read().await;
        docs.get(uri).cloned()
    }

    async fn on_change(&self, uri: url::Url, text: String) {
        let diagnostics = self.check_document(&text);
        self.client.publish_diagnostics(uri, diagnostics, None).await;
    }

    pub fn check_document(&self, text: &str) -> Vec<Diagnostic> {
        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.analysis.diagnostics(text)))
            .unwrap_or_else(|_| {
                tracing::warn!("diagnostics pass panicked, publishing none");
                Vec::new()
            })
    }

    pub async fn republish_diagnostics(&self) {
        let docs: Vec<(url::Url, String)> = {
            let docs = self.documents.read().await;
            docs.iter().map(|(uri, text)| (uri.clone(), text.clone())).collect()
        };
        for (uri, text) in docs {
            self.on_change(uri, text).await;
        }
    }

    async fn store_document(&self, uri: url::Url, text: String, opened: bool) {
        let max_size = self.analysis.config().max_document_size;
        if text.len() > max_size {
            let _ = self
                .client
                .log_message(
                    MessageType::WARNING,
                    format!("Document {} is too large ({} bytes), skipping", uri, text.len()),
                )
                .await;
            self.forget_document(uri).await;
            return;
        }

        {
            let mut docs = self.documents.write().await;
            docs.insert(uri.clone(), text.clone());
        }

        // a document dropped for its size comes back through a later change
        if opened || !self.analysis.is_open(&uri) {
            self.analysis.open_document(&uri, &text);
        } else {
            self.analysis.change_document(&uri, &text);
        }
        self.on_change(uri, text).await;
    }

    /// Drop the editor text of `uri` and everything derived from it.
    async fn forget_document(&self, uri: url::Url) {
        {
            let mut docs = self.documents.write().await;
            docs.remove(&uri);
        }
        self.analysis.close_document(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    /// Re-index every open document from its stored text.
    async fn reindex_documents(&self) {
        let docs = self.documents.read().await;
        for (uri, text) in docs.iter() {
            self.analysis.change_document(uri, text);
        }
    }
}

#[tower_lsp::async_trait]
impl tower_lsp::LanguageServer for Backend {
    async fn initialize(
        &self,
        params: InitializeParams,
    ) -> Result<InitializeResult, tower_lsp::jsonrpc::Error> {
        let root = params
            .workspace_folders
            .as_ref()
            .and_then(|folders| folders.first())
            .map(|folder| folder.uri.clone())
            .or(params.root_uri.clone())
            .and_then(|uri| uri.to_file_path().ok());
        *self
            .workspace_root
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = root;

        if let Some(options) = params.initialization_options {
            self.apply_settings(options);
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec![
                        ".".to_string(),
                        ":".to_string(),
                        "\"".to_string(),
                    ]),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let _ = self
            .client
            .log_message(MessageType::INFO, "DolphinDB language server initialized")
            .await;

        let backend = self.clone();
        tokio::spawn(async move { backend.index_workspace().await });

        let metadata = self.analysis.metadata.clone();
        tokio::spawn(async move {
            metadata.refresh().await;
        });
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.store_document(params.text_document.uri, params.text_document.text, true)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        // full sync: the last change carries the whole document
        let Some(text) = params.content_changes.into_iter().last().map(|change| change.text) else {
            return;
        };
        self.store_document(params.text_document.uri, text, false).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        self.forget_document(params.text_document.uri).await;
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let rescan = self.apply_settings(params.settings);
        if rescan {
            self.reindex_documents().await;
        }
        if rescan && self.analysis.registry.is_ready() {
            let backend = self.clone();
            tokio::spawn(async move { backend.index_workspace().await });
        } else {
            self.republish_diagnostics().await;
        }
    }

    async fn completion(
        &self,
        params: CompletionParams,
    ) -> Result<Option<CompletionResponse>, tower_lsp::jsonrpc::Error> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;

        let Some(text) = self.document_text(&uri).await else {
            return Ok(None);
        };
        let items = self.analysis.completion(&uri, &text, position.into()).await;
        Ok(Some(CompletionResponse::Array(items)))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>, tower_lsp::jsonrpc::Error> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(text) = self.document_text(&uri).await else {
            return Ok(None);
        };
        Ok(self
            .analysis
            .hover(&uri, &text, position.into())
            .map(|hover| Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: hover.markdown,
                }),
                range: Some(hover.range.into()),
            }))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>, tower_lsp::jsonrpc::Error> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(text) = self.document_text(&uri).await else {
            return Ok(None);
        };
        let mut locations: Vec<Location> = self
            .analysis
            .definition(&uri, &text, position.into())
            .into_iter()
            .map(|symbol| Location::new(symbol.uri, symbol.range.into()))
            .collect();

        Ok(match locations.len() {
            0 => None,
            1 => locations.pop().map(GotoDefinitionResponse::Scalar),
            _ => Some(GotoDefinitionResponse::Array(locations)),
        })
    }

    async fn shutdown(&self) -> Result<(), tower_lsp::jsonrpc::Error> {
        {
            let mut watcher = self.watcher.lock().await;
            if let Some(mut watcher) = watcher.take() {
                watcher.clear();
            }
        }
        {
            let mut docs = self.documents.write().await;
            docs.clear();
        }
        Ok(())
    }
}
