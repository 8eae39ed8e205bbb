// Document lifecycle tests - driving the backend through its handlers


use dos_lsp::Backend;
use lsp_test_helpers::*;
use serde_json::json;
use tower_lsp::lsp_types::*;
use tower_lsp::{LanguageServer, LspService};
use url::Url;

fn open_params(uri: &Url, text: &str) -> DidOpenTextDocumentParams {
    DidOpenTextDocumentParams {
        text_document: TextDocumentItem {
            uri: uri.clone(),
            language_id: "dos".to_string(),
            version: 1,
            text: text.to_string(),
        },
    }
}

fn change_params(uri: &Url, version: i32, text: &str) -> DidChangeTextDocumentParams {
    DidChangeTextDocumentParams {
        text_document: VersionedTextDocumentIdentifier {
            uri: uri.clone(),
            version,
        },
        content_changes: vec![TextDocumentContentChangeEvent {
            range: None,
            range_length: None,
            text: text.to_string(),
        }],
    }
}

fn hover_params(uri: &Url, line: u32, character: u32) -> HoverParams {
    HoverParams {
        text_document_position_params: TextDocumentPositionParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            position: Position::new(line, character),
        },
        work_done_progress_params: Default::default(),
    }
}

fn settings(value: serde_json::Value) -> DidChangeConfigurationParams {
    DidChangeConfigurationParams { settings: value }
}

#[tokio::test]
async fn test_oversized_change_drops_document() {
    let (service, _socket) = LspService::new(Backend::new);
    let backend = service.inner();
    backend
        .did_change_configuration(settings(json!({ "maxDocumentSize": 64 })))
        .await;

    let uri = test_uri("big.dos");
    backend.did_open(open_params(&uri, "def f() { }\nx = f()\n")).await;
    assert!(backend.analysis.symbols.is_tracked(&uri));

    backend
        .did_change(change_params(&uri, 2, &"x = 1\n".repeat(20)))
        .await;
    assert!(
        !backend.documents.read().await.contains_key(&uri),
        "Oversized text must not be stored"
    );
    assert!(
        !backend.analysis.symbols.is_tracked(&uri),
        "Symbols of the previous version must be dropped"
    );
    let hover = backend.hover(hover_params(&uri, 1, 4)).await.unwrap();
    assert!(hover.is_none(), "Stale text must not answer hover");

    backend.did_change(change_params(&uri, 3, "y = 2\n")).await;
    assert!(backend.analysis.is_open(&uri), "A small change brings the document back");
    assert!(backend.analysis.symbols.is_tracked(&uri));
    assert_eq!(
        backend.documents.read().await.get(&uri).map(String::as_str),
        Some("y = 2\n")
    );
}

#[tokio::test]
async fn test_oversized_open_is_ignored() {
    let (service, _socket) = LspService::new(Backend::new);
    let backend = service.inner();
    backend
        .did_change_configuration(settings(json!({ "maxDocumentSize": 8 })))
        .await;

    let uri = test_uri("huge.dos");
    backend.did_open(open_params(&uri, "value = 123456789\n")).await;
    assert!(backend.documents.read().await.is_empty());
    assert!(!backend.analysis.symbols.is_tracked(&uri));
}

#[tokio::test]
async fn test_separator_change_reindexes_open_documents() {
    let (service, _socket) = LspService::new(Backend::new);
    let backend = service.inner();

    let uri = test_uri("main.dos");
    backend.did_open(open_params(&uri, "use a.b\n")).await;
    assert_eq!(backend.analysis.symbols.used_modules(&uri), vec!["a"]);

    backend
        .did_change_configuration(settings(json!({ "moduleSeparator": "." })))
        .await;
    assert_eq!(backend.analysis.symbols.used_modules(&uri), vec!["a.b"]);
}
