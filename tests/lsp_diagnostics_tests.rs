// Diagnostics tests - unknown module imports


use std::sync::Arc;

use dos_lsp::config::Severity;
use dos_lsp::diagnostics::unknown_module_diagnostics;
use dos_lsp::registry::RegistrySettings;
use dos_lsp::{Analysis, ModuleRegistry, NullDatabase, ServerConfig};
use lsp_test_helpers::*;
use tower_lsp::lsp_types::*;

#[test]
fn test_no_diagnostics_until_registry_ready() {
    let tree = ModuleTree::new();
    tree.write("known.dos", "");
    let registry = ModuleRegistry::new(RegistrySettings::default());
    let code = "use missingModule\n";

    let before = unknown_module_diagnostics(&registry, code, DiagnosticSeverity::WARNING);
    assert!(before.is_empty(), "Diagnostics must be suppressed while the registry is not ready");

    registry.scan(tree.root()).unwrap();
    let after = unknown_module_diagnostics(&registry, code, DiagnosticSeverity::WARNING);
    assert_eq!(after.len(), 1, "Exactly one diagnostic once the registry is ready");
    assert!(after[0].message.contains("missingModule"), "Message should name the module");
    assert_eq!(after[0].source.as_deref(), Some("dos"));
}

#[test]
fn test_diagnostic_spans_whole_line() {
    let tree = ModuleTree::new();
    let registry = ModuleRegistry::new(RegistrySettings::default());
    registry.scan(tree.root()).unwrap();

    let code = "x = 1\n  use  nowhere::here  \n";
    let diagnostics = unknown_module_diagnostics(&registry, code, DiagnosticSeverity::ERROR);
    assert_eq!(diagnostics.len(), 1);
    let d = &diagnostics[0];
    assert_eq!(d.range.start, Position::new(1, 0));
    assert_eq!(d.range.end, Position::new(1, 22));
    assert_eq!(d.severity, Some(DiagnosticSeverity::ERROR));
    assert!(d.message.contains("nowhere::here"));
}

#[test]
fn test_known_modules_and_comments_are_clean() {
    let tree = ModuleTree::new();
    tree.write("util.dos", "");
    tree.write("other.dos", "module named::lib\n");
    let registry = ModuleRegistry::new(RegistrySettings::default());
    registry.scan(tree.root()).unwrap();

    let code = "use util\nuse named::lib\n// use ghost\n/*\nuse phantom\n*/\nx = use_count\n";
    let diagnostics = unknown_module_diagnostics(&registry, code, DiagnosticSeverity::WARNING);
    assert!(diagnostics.is_empty(), "Got unexpected diagnostics: {:?}", diagnostics);
}

#[test]
fn test_one_diagnostic_per_unknown_import() {
    let tree = ModuleTree::new();
    tree.write("util.dos", "");
    let registry = ModuleRegistry::new(RegistrySettings::default());
    registry.scan(tree.root()).unwrap();

    let code = "use a\nuse util\nuse b\n";
    let diagnostics = unknown_module_diagnostics(&registry, code, DiagnosticSeverity::WARNING);
    let lines: Vec<u32> = diagnostics.iter().map(|d| d.range.start.line).collect();
    assert_eq!(lines, vec![0, 2]);
}

#[test]
fn test_severity_follows_configuration() {
    let tree = ModuleTree::new();
    let config = ServerConfig {
        unknown_module_severity: Severity::Error,
        ..Default::default()
    };
    let analysis = Analysis::new(config, Arc::new(NullDatabase));
    analysis.scan_modules(tree.root()).unwrap();

    let diagnostics = analysis.diagnostics("use missing\n");
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::ERROR));

    analysis.configure(ServerConfig::default());
    let diagnostics = analysis.diagnostics("use missing\n");
    assert_eq!(diagnostics[0].severity, Some(DiagnosticSeverity::WARNING));
}

#[test]
fn test_new_module_file_clears_diagnostic() {
    let tree = ModuleTree::new();
    let analysis = analysis();
    analysis.scan_modules(tree.root()).unwrap();
    assert_eq!(analysis.diagnostics("use later\n").len(), 1);

    tree.write("later.dos", "def f() { }\n");
    analysis.rescan_directory(tree.root());
    assert!(analysis.diagnostics("use later\n").is_empty());
}

#[test]
fn test_dotted_module_separator() {
    let tree = ModuleTree::new();
    tree.write("a/b.dos", "def f() { }\n");
    let config = ServerConfig {
        module_separator: ".".to_string(),
        ..Default::default()
    };
    let analysis = Analysis::new(config, Arc::new(NullDatabase));
    analysis.scan_modules(tree.root()).unwrap();

    let uri = tree.uri("main.dos");
    let code = "use a.b\nx = f()\ny = a.b.f()\n";
    analysis.open_document(&uri, code);

    let diagnostics = analysis.diagnostics(code);
    assert!(diagnostics.is_empty(), "Dotted import should be known: {:?}", diagnostics);
    assert_eq!(analysis.symbols.used_modules(&uri), vec!["a.b"]);

    let imported = analysis.definition(&uri, code, position(1, 4));
    assert_eq!(imported.len(), 1, "Bare call should resolve through the dotted import");
    assert_eq!(imported[0].uri, tree.uri("a/b.dos"));

    let qualified = analysis.definition(&uri, code, position(2, 8));
    assert_eq!(qualified.len(), 1, "Qualified call should split on the dot");
    assert_eq!(qualified[0].name, "f");

    let ghost = analysis.diagnostics("use a.c\n");
    assert_eq!(ghost.len(), 1);
    assert!(ghost[0].message.contains("a.c"));
}
