// Scope builder tests - brace pairing, nesting and innermost lookup

use dos_lsp::scope::{build_scopes, global_scope, innermost_scope};
use dos_lsp::{Position, Range};

#[test]
fn test_scopes_are_properly_nested() {
    let code = r#"
def outer(a) {
    if (a > 0) {
        for (i in 0:a) { print(i) }
    } else {
        x = { "k": 1 }
    }
}
def other() { return 1 }
"#;

    let scopes = build_scopes(code);
    assert_eq!(scopes.len(), 6, "Every matched brace pair should produce a scope");

    for (i, a) in scopes.iter().enumerate() {
        for b in scopes.iter().skip(i + 1) {
            let nested = a.encloses(b) || b.encloses(a);
            let disjoint = !a.overlaps(b);
            assert!(nested || disjoint, "Scopes {:?} and {:?} partially overlap", a, b);
        }
    }
}

#[test]
fn test_unmatched_open_brace_is_dropped() {
    let code = "def f() {\n    x = 1\n";
    let scopes = build_scopes(code);
    assert!(scopes.is_empty(), "An unclosed brace should not produce a scope");
}

#[test]
fn test_stray_close_brace_is_ignored() {
    let code = "}\n{ a = 1 }\n}";
    let scopes = build_scopes(code);
    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes[0].start, Position::new(1, 0));
    assert_eq!(scopes[0].end, Position::new(1, 8));
}

#[test]
fn test_braces_in_comments_are_ignored() {
    let code = "// {\n{\n/* } */\n}";
    let scopes = build_scopes(code);
    assert_eq!(scopes, vec![Range::new(Position::new(1, 0), Position::new(3, 0))]);
}

#[test]
fn test_innermost_scope_prefers_greatest_start() {
    let outer = Range::new(Position::new(0, 0), Position::new(10, 0));
    let inner = Range::new(Position::new(2, 4), Position::new(5, 0));
    let global = Range::new(Position::new(0, 0), Position::new(20, 0));

    // Order of the candidates must not matter.
    for scopes in [vec![outer, inner], vec![inner, outer]] {
        let found = innermost_scope(&scopes, Position::new(3, 0), global);
        assert_eq!(found, inner);
    }
}

#[test]
fn test_innermost_scope_falls_back_to_global() {
    let code = "a = 1\n{ b = 2 }\nc = 3";
    let scopes = build_scopes(code);
    let global = global_scope(code);
    let found = innermost_scope(&scopes, Position::new(2, 0), global);
    assert_eq!(found, global);
    assert_eq!(global.end, Position::new(2, 5));
}

#[test]
fn test_scope_boundaries_are_inclusive() {
    let code = "{\n}";
    let scopes = build_scopes(code);
    assert!(scopes[0].contains(Position::new(0, 0)));
    assert!(scopes[0].contains(Position::new(1, 0)));
    assert!(!scopes[0].contains(Position::new(1, 1)));
}

#[test]
fn test_braces_in_strings_are_ignored() {
    let code = "s = \"{\"\nt = '}'\n{ }";
    let scopes = build_scopes(code);
    assert_eq!(scopes, vec![Range::new(Position::new(2, 0), Position::new(2, 2))]);
}
