// Identifier lookup for hover and go-to-definition

use crate::analysis::Analysis;
use crate::scope::{Position, Range};
use crate::symbols::{Symbol, SymbolKind, SymbolMeta};
use crate::text::{byte_offset, split_lines, utf16_column};
use url::Url;

/// The identifier under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Identifier characters plus module separators, e.g. `util::load`.
    pub text: String,
    pub range: Range,
    /// Immediately followed by `(`.
    pub is_call: bool,
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Start of the identifier run ending at byte `idx`.
fn ident_start(line: &str, idx: usize) -> usize {
    line[..idx]
        .char_indices()
        .rev()
        .take_while(|&(_, ch)| is_ident_char(ch))
        .last()
        .map_or(idx, |(at, _)| at)
}

/// End of the identifier run starting at byte `idx`.
fn ident_end(line: &str, idx: usize) -> usize {
    line[idx..]
        .char_indices()
        .find(|&(_, ch)| !is_ident_char(ch))
        .map_or(line.len(), |(at, _)| idx + at)
}

/// Extract the token touching `position`, if any. Identifiers joined by
/// `separator` form one qualified token.
pub fn token_at(text: &str, position: Position, separator: &str) -> Option<Token> {
    let lines = split_lines(text);
    let line = *lines.get(position.line as usize)?;
    let cursor = byte_offset(line, position.column);

    let mut start = ident_start(line, cursor);
    let mut end = ident_end(line, cursor);
    if start == end {
        return None;
    }

    if !separator.is_empty() {
        while let Some(before) = line[..start].strip_suffix(separator) {
            let extended = ident_start(line, before.len());
            if extended == before.len() {
                break;
            }
            start = extended;
        }
        while line[end..].starts_with(separator) {
            let after = end + separator.len();
            let extended = ident_end(line, after);
            if extended == after {
                break;
            }
            end = extended;
        }
    }

    Some(Token {
        text: line[start..end].to_string(),
        range: Range::new(
            Position::new(position.line, utf16_column(line, start)),
            Position::new(position.line, utf16_column(line, end)),
        ),
        is_call: line[end..].starts_with('('),
    })
}

/// Resolve the token at `position` to its declarations.
///
/// At a call site only functions are considered, elsewhere only variables
/// and parameters. A module name resolves to the module's `module` line or,
/// failing that, to the start of its file.
pub fn resolve(analysis: &Analysis, uri: &Url, text: &str, position: Position) -> (Option<Token>, Vec<Symbol>) {
    let syntax = analysis.registry.syntax();
    let Some(token) = token_at(text, position, syntax.separator()) else {
        return (None, Vec::new());
    };

    let is_call = token.is_call;
    let mut found = analysis.symbols.find_symbol(
        &analysis.registry,
        uri,
        &token.text,
        position,
        |symbol| match symbol.kind() {
            SymbolKind::Module => false,
            kind => (kind == SymbolKind::Function) == is_call,
        },
    );

    if found.is_empty() && !is_call {
        found = module_targets(analysis, &token.text);
    }

    (Some(token), found)
}

fn module_targets(analysis: &Analysis, name: &str) -> Vec<Symbol> {
    analysis
        .registry
        .find(name)
        .into_iter()
        .filter_map(|entry| {
            let uri = entry.uri()?;
            let declared = analysis.symbols.table(&uri).and_then(|table| {
                table
                    .symbols
                    .iter()
                    .find(|symbol| {
                        symbol.kind() == SymbolKind::Module && Some(symbol.name.as_str()) == table.declared_module.as_deref()
                    })
                    .cloned()
            });
            Some(declared.unwrap_or_else(|| Symbol {
                name: entry.name().to_string(),
                position: Position::default(),
                range: Range::default(),
                uri,
                meta: SymbolMeta::Module {
                    scope: Range::default(),
                },
            }))
        })
        .collect()
}

/// Markdown shown on hover for one symbol.
pub fn describe(symbol: &Symbol) -> String {
    match &symbol.meta {
        SymbolMeta::Function { params, doc, .. } => {
            let mut out = format!("```dolphindb\ndef {}({})\n```", symbol.name, params.join(", "));
            if let Some(doc) = doc {
                out.push_str("\n---\n");
                out.push_str(doc);
            }
            out
        }
        SymbolMeta::Variable { doc, .. } => {
            let mut out = format!("(variable) {}", symbol.name);
            if let Some(doc) = doc {
                out.push_str("\n---\n");
                out.push_str(doc);
            }
            out
        }
        SymbolMeta::Param { function, .. } => {
            format!("(parameter) {} of function {}", symbol.name, function)
        }
        SymbolMeta::Module { .. } => format!("(module) {}", symbol.name),
    }
}
