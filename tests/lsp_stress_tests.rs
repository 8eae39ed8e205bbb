// LSP stress tests - large inputs, deep nesting and malformed source

use dos_lsp::extract::extract_symbols;
use dos_lsp::scope::build_scopes;
use dos_lsp::symbols::SymbolKind;
use url::Url;

fn uri() -> Url {
    Url::parse("file:///ws/stress.dos").unwrap()
}

#[test]
fn test_large_file_extraction() {
    // Generate large file (1000 functions)
    let mut code = String::new();
    for i in 0..1000 {
        code.push_str(&format!("// function {i}\ndef func_{i}(a, b) {{\n    v_{i} = a + b\n    return v_{i}\n}}\n\n"));
    }

    let start = std::time::Instant::now();
    let table = extract_symbols(&uri(), &code);
    let elapsed = start.elapsed();

    assert_eq!(table.functions().count(), 1000);
    assert_eq!(table.symbols.iter().filter(|s| s.kind() == SymbolKind::Variable).count(), 1000);
    assert!(elapsed.as_millis() < 5000, "Large file extraction should be reasonable (< 5s)");
}

#[test]
fn test_very_deep_nesting() {
    let depth = 200;
    let mut code = String::from("def main() {\n");
    for i in 0..depth {
        code.push_str(&format!("{}if (true) {{\n", "    ".repeat(i + 1)));
    }
    code.push_str(&format!("{}deepest = 1\n", "    ".repeat(depth + 1)));
    for i in (0..depth).rev() {
        code.push_str(&format!("{}}}\n", "    ".repeat(i + 1)));
    }
    code.push_str("}\n");

    let scopes = build_scopes(&code);
    assert_eq!(scopes.len(), depth + 1);

    let table = extract_symbols(&uri(), &code);
    let deepest = table.symbols.iter().find(|s| s.name == "deepest").unwrap();
    assert_eq!(deepest.scope().end.line as usize, depth + 2, "Scope ends at the innermost closing brace");
}

#[test]
fn test_very_long_line() {
    let mut code = String::from("x = ");
    for i in 0..5000 {
        code.push_str(&format!("{} + ", i));
    }
    code.push_str("0; y = 2; z = { 'k': 3 }");

    let table = extract_symbols(&uri(), &code);
    let names: Vec<&str> = table.symbols.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y", "z"]);
}

#[test]
fn test_unbalanced_source_never_panics() {
    let samples = [
        "{{{{",
        "}}}}",
        "def f(",
        "def f(a, b",
        "def f() ",
        "def f() {",
        "def (a) { }",
        "/* never closed\ndef g() { }",
        "\"unterminated string\ndef h() { }",
        "x ==== y",
        "use",
        "module",
        "def 😀() {}\n😀 = 1",
    ];
    for sample in samples {
        let table = extract_symbols(&uri(), sample);
        assert!(table.functions().count() <= 1, "Unexpected functions in {:?}", sample);
    }
}

#[test]
fn test_many_small_documents() {
    for i in 0..500 {
        let code = format!("module m{i}\nuse util\ndef f{i}(x) {{ return x }}\nv = f{i}(1)\n");
        let uri = Url::parse(&format!("file:///ws/m{i}.dos")).unwrap();
        let table = extract_symbols(&uri, &code);
        assert_eq!(table.declared_module, Some(format!("m{i}")));
        assert_eq!(table.used_modules, vec!["util"]);
        assert_eq!(table.functions().count(), 1);
    }
}
