// Symbol extraction and lookup tests


use dos_lsp::extract::{extract_symbols, ModuleSyntax};
use dos_lsp::service::resolve_shadowing;
use dos_lsp::symbols::SymbolKind;
use dos_lsp::SymbolService;
use lsp_test_helpers::*;

fn names_in_scope(service: &SymbolService, uri: &url::Url, line: u32, column: u32) -> Vec<String> {
    service
        .symbols_in_scope(uri, position(line, column))
        .into_iter()
        .map(|symbol| symbol.name)
        .collect()
}

#[test]
fn test_function_visible_throughout_enclosing_block() {
    let code = r#"x = 0
def outer() {
    r = helper(1)
    def helper(v) {
        return v + 1
    }
    return r
}
y = 1"#;
    let uri = test_uri("visibility.dos");
    let service = SymbolService::new();
    service.update(&uri, code);

    let before_def = names_in_scope(&service, &uri, 2, 8);
    assert!(before_def.contains(&"helper".to_string()), "Nested function should be visible before its def line");
    let after_block = names_in_scope(&service, &uri, 8, 0);
    assert!(!after_block.contains(&"helper".to_string()), "Nested function should not leak out of its block");
    assert!(after_block.contains(&"outer".to_string()));
}

#[test]
fn test_top_level_flag() {
    let code = "def outer() {\n    def inner() { }\n}\n";
    let table = extract_symbols(&test_uri("top.dos"), code);
    let top: Vec<&str> = table.top_level_functions().map(|s| s.name.as_str()).collect();
    assert_eq!(top, vec!["outer"]);
    assert_eq!(table.functions().count(), 2);
}

#[test]
fn test_variable_visibility_window() {
    let code = "a = 1\n{\n  b = 2\n  c = b\n}\nd = 3";
    let uri = test_uri("window.dos");
    let service = SymbolService::new();
    service.update(&uri, code);

    let has_b = |line, column| names_in_scope(&service, &uri, line, column).contains(&"b".to_string());
    assert!(!has_b(1, 0), "Variable should be absent before its block");
    assert!(!has_b(2, 0), "Variable should be absent before its declaration");
    assert!(has_b(2, 2), "Variable should be visible at its declaration");
    assert!(has_b(3, 6));
    assert!(has_b(4, 0), "Variable should be visible up to the closing brace");
    assert!(!has_b(5, 0), "Variable should be absent after its block");
}

#[test]
fn test_nested_declaration_shadows_outer() {
    let code = "x = 1\ndef f() {\n    x = 2\n    y = x\n}\n";
    let uri = test_uri("shadow.dos");
    let service = SymbolService::new();
    service.update(&uri, code);

    let xs: Vec<_> = service
        .visible_symbols(&uri, position(3, 8))
        .into_iter()
        .filter(|symbol| symbol.name == "x")
        .collect();
    assert_eq!(xs.len(), 1, "Only the nested x should survive shadowing");
    assert_eq!(xs[0].position, position(2, 4));

    let outside: Vec<_> = service
        .visible_symbols(&uri, position(5, 0))
        .into_iter()
        .filter(|symbol| symbol.name == "x")
        .collect();
    assert_eq!(outside.len(), 1);
    assert_eq!(outside[0].position, position(0, 0));
}

#[test]
fn test_shadowing_is_a_pure_function_of_candidates() {
    let code = "v = 1\n{\n  v = 2\n}\n";
    let table = extract_symbols(&test_uri("pure.dos"), code);
    let inside = resolve_shadowing(table.symbols.clone(), position(2, 5));
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].position.line, 2);

    let reversed: Vec<_> = table.symbols.iter().rev().cloned().collect();
    let again = resolve_shadowing(reversed, position(2, 5));
    assert_eq!(again, inside, "Candidate order must not change the result");
}

#[test]
fn test_reassignment_adds_symbols() {
    let code = "x = 1\nx = 2\nif (x == 2) { print(x) }";
    let table = extract_symbols(&test_uri("reassign.dos"), code);
    let xs = table.symbols.iter().filter(|s| s.name == "x").count();
    assert_eq!(xs, 2, "Each assignment should produce its own symbol, comparisons none");
}

#[test]
fn test_malformed_function_is_dropped() {
    let code = r#"def broken(a, b {
    return a
}
def good(c) {
    return c
}"#;
    let table = extract_symbols(&test_uri("broken.dos"), code);
    assert!(table.symbols.iter().all(|s| s.name != "broken"), "Malformed function must not be extracted");
    assert!(table.symbols.iter().all(|s| s.name != "a"), "Its parameters must not be extracted either");

    let good = table.symbols.iter().find(|s| s.name == "good").expect("Later function should be extracted");
    assert_eq!(good.kind(), SymbolKind::Function);
    assert_eq!(good.params(), ["c".to_string()]);
}

#[test]
fn test_function_without_body_is_dropped() {
    let code = "def declared(a);\nz = 1";
    let table = extract_symbols(&test_uri("nobody.dos"), code);
    assert_eq!(table.functions().count(), 0);
    assert!(table.symbols.iter().any(|s| s.name == "z"));
}

#[test]
fn test_multiline_parameters() {
    let code = "def load(path,\n         mutable t,\n         n = 10) {\n    return t\n}";
    let table = extract_symbols(&test_uri("params.dos"), code);
    let function = table.functions().next().unwrap();
    assert_eq!(function.params(), ["path", "t", "n"].map(String::from));

    let params: Vec<_> = table.symbols.iter().filter(|s| s.kind() == SymbolKind::Param).collect();
    assert_eq!(params.len(), 3);
    assert_eq!(params[0].position, position(0, 9));
    assert_eq!(params[1].position, position(1, 17));
    assert_eq!(params[2].position, position(2, 9));
    assert!(params.iter().all(|p| p.scope().start == position(2, 17)), "Params are scoped to the body");
}

#[test]
fn test_leading_comment_becomes_doc() {
    let code = r#"// Computes the sum.
// Second line.
def add(a, b) { return a + b }

/*
 * Block doc
 */
def blk() { }

// Latest price per symbol
last = 0"#;
    let table = extract_symbols(&test_uri("docs.dos"), code);
    let doc = |name: &str| {
        table
            .symbols
            .iter()
            .find(|s| s.name == name)
            .and_then(|s| s.doc().map(str::to_string))
    };
    assert_eq!(doc("add").as_deref(), Some("Computes the sum.\nSecond line."));
    assert_eq!(doc("blk").as_deref(), Some("Block doc"));
    assert_eq!(doc("last").as_deref(), Some("Latest price per symbol"));
}

#[test]
fn test_blank_line_detaches_comment() {
    let code = "// detached\n\ndef lone() { }";
    let table = extract_symbols(&test_uri("detached.dos"), code);
    let lone = table.functions().next().unwrap();
    assert_eq!(lone.doc(), None, "A blank line ends the comment block");
}

#[test]
fn test_commented_code_is_not_extracted() {
    let code = "// def ghost() { }\n/* hidden = 1\n   def also() { } */\nreal = \"http://x\"";
    let table = extract_symbols(&test_uri("masked.dos"), code);
    let names: Vec<&str> = table.symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["real"]);
}

#[test]
fn test_module_and_use_statements() {
    let code = "module app::core\nuse util\nuse  a :: b // trailing\n// use commented\n";
    let table = extract_symbols(&test_uri("mods.dos"), code);
    assert_eq!(table.declared_module.as_deref(), Some("app::core"));
    assert_eq!(table.module_line, Some(0));
    assert_eq!(table.used_modules, vec!["util", "a::b"]);
    assert_eq!(table.symbols.iter().filter(|s| s.kind() == SymbolKind::Module).count(), 3);
}

#[test]
fn test_module_declaration_must_lead() {
    let syntax = ModuleSyntax::default();
    assert_eq!(syntax.parse_module_declaration("\n  // header\nmodule x::y\n").as_deref(), Some("x::y"));
    assert_eq!(syntax.parse_module_declaration("a = 1\nmodule x\n"), None);
}

#[test]
fn test_untracked_file_is_empty() {
    let service = SymbolService::new();
    assert!(service.symbols_in_file(&test_uri("nothing.dos")).is_empty());
}

#[test]
fn test_cross_module_lookup() {
    let tree = ModuleTree::new();
    tree.write("util.dos", "def helper(a) { return a }\ndef outer() {\n    def inner() { }\n}\n");
    tree.write("tools.dos", "def helper(b) { return b }\n");
    tree.write("main.dos", "use util\nuse tools\nhelper(1)\n");

    let analysis = analysis();
    analysis.scan_modules(tree.root()).unwrap();
    let main = tree.uri("main.dos");

    let found = analysis.symbols.find_across_imports(&analysis.registry, &main, "helper");
    assert_eq!(found.len(), 2, "Ambiguous imports return every match");
    assert_eq!(found[0].uri, tree.uri("util.dos"), "Matches follow import order");
    assert_eq!(found[1].uri, tree.uri("tools.dos"));

    let qualified = analysis.symbols.find_across_imports(&analysis.registry, &main, "tools::helper");
    assert_eq!(qualified.len(), 1);
    assert_eq!(qualified[0].uri, tree.uri("tools.dos"));

    let nested = analysis.symbols.find_across_imports(&analysis.registry, &main, "inner");
    assert!(nested.is_empty(), "Nested functions are not exported");
}

#[test]
fn test_dropped_header_lines_hold_no_variables() {
    let code = "def broken(a,\n    n = 10 {\n    return a\n}\nm = 1\n";
    let table = extract_symbols(&test_uri("header.dos"), code);
    let variables: Vec<&str> = table
        .symbols
        .iter()
        .filter(|s| s.kind() == SymbolKind::Variable)
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(variables, vec!["m"], "Default values inside a broken header are not assignments");
}

#[test]
fn test_string_contents_are_not_code() {
    let code = "print(\"def f(\")\ns = \"a = 1 {\"\nx = 1\nif (x) { t = \"}\"; y = 2 }";
    let table = extract_symbols(&test_uri("strings.dos"), code);
    assert_eq!(table.functions().count(), 0, "A def inside a string is not a declaration");

    let names: Vec<&str> = table.symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["s", "x", "t", "y"]);
    let y = table.symbols.iter().find(|s| s.name == "y").unwrap();
    assert_eq!(y.scope().end, position(3, 24), "Brace inside a string must not close the block");
}

#[test]
fn test_unicode_identifiers() {
    let code = "prix_é = 1\ny = prix_é";
    let table = extract_symbols(&test_uri("unicode.dos"), code);
    let names: Vec<&str> = table.symbols.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&"prix_é"), "Got {:?}", names);
}
