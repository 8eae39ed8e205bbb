//! Line-based symbol extraction.
//!
//! This is a best-effort scan, not a parser. Function declarations,
//! parameters, variable assignments, `module` declarations and `use`
//! statements are recognized with regular expressions over lines whose
//! comments and string bodies are blanked, and attached to the brace scopes found by [`crate::scope`].
//! A malformed declaration is dropped on its own; the rest of the file is
//! still indexed.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::scope::{build_scopes, global_scope, innermost_scope, Position, Range, Scope};
use crate::symbols::{DocumentSymbolTable, Symbol, SymbolMeta};
use crate::text::{mask_code, mask_comments, split_lines, utf16_column};

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bdef\s+([A-Za-z_]\w*)\s*\(").expect("function declaration regex")
});

static ASSIGN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|[;{])\s*([A-Za-z_]\w*)\s*=(?:[^=]|$)").expect("assignment regex")
});

static DEFAULT_SYNTAX: LazyLock<ModuleSyntax> =
    LazyLock::new(|| ModuleSyntax::build("::").expect("default module syntax"));

/// How module paths are written for one configured separator: the
/// `module`/`use` patterns plus qualified-name splitting.
#[derive(Debug, Clone)]
pub struct ModuleSyntax {
    separator: String,
    module_re: Regex,
    use_re: Regex,
}

impl Default for ModuleSyntax {
    fn default() -> Self {
        DEFAULT_SYNTAX.clone()
    }
}

impl PartialEq for ModuleSyntax {
    fn eq(&self, other: &Self) -> bool {
        self.separator == other.separator
    }
}

impl ModuleSyntax {
    /// Syntax for `separator`. A blank or unusable separator falls back to `::`.
    pub fn new(separator: &str) -> Self {
        let separator = separator.trim();
        if separator.is_empty() {
            tracing::warn!("empty module separator, using `::`");
            return Self::default();
        }
        Self::build(separator).unwrap_or_else(|err| {
            tracing::warn!(separator, error = %err, "unusable module separator, using `::`");
            Self::default()
        })
    }

    fn build(separator: &str) -> std::result::Result<Self, regex::Error> {
        let path = format!(
            r"[A-Za-z_]\w*(?:\s*{}\s*[A-Za-z_]\w*)*",
            regex::escape(separator)
        );
        Ok(Self {
            separator: separator.to_string(),
            module_re: Regex::new(&format!(r"^\s*module\s+({path})"))?,
            use_re: Regex::new(&format!(r"^\s*use\s+({path})"))?,
        })
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Strip whitespace around separators: `a :: b` becomes `a::b`.
    pub fn normalize(&self, path: &str) -> String {
        path.split(self.separator.as_str())
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(&self.separator)
    }

    /// `a::b::f` splits into module `a::b` and member `f`.
    pub fn split_qualified<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        name.rsplit_once(self.separator.as_str())
    }

    /// Module name declared by the first code line of `text`, if any.
    pub fn parse_module_declaration(&self, text: &str) -> Option<String> {
        let lines = split_lines(text);
        let masked = mask_comments(&lines);
        first_code_line(&masked).and_then(|(_, line)| {
            self.module_re
                .captures(line)
                .map(|caps| self.normalize(&caps[1]))
        })
    }

    /// Module named by a `use` statement on a comment-free line.
    pub fn parse_use_statement(&self, line: &str) -> Option<String> {
        self.use_re
            .captures(line)
            .map(|caps| self.normalize(&caps[1]))
    }
}

fn first_code_line(masked: &[String]) -> Option<(usize, &str)> {
    masked
        .iter()
        .enumerate()
        .find(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| (idx, line.as_str()))
}

/// Build the symbol table for one document using `::` module paths.
pub fn extract_symbols(uri: &Url, text: &str) -> DocumentSymbolTable {
    extract_symbols_with(uri, text, &ModuleSyntax::default())
}

/// Build the symbol table for one document.
pub fn extract_symbols_with(uri: &Url, text: &str, syntax: &ModuleSyntax) -> DocumentSymbolTable {
    let source = Source::new(uri, text);
    let mut table = DocumentSymbolTable::default();

    if let Some((line_no, line)) = first_code_line(&source.masked) {
        if let Some(m) = syntax.module_re.captures(line).and_then(|caps| caps.get(1)) {
            let module = syntax.normalize(m.as_str());
            table
                .symbols
                .push(source.module_symbol(&module, line_no, m.start(), m.end()));
            table.declared_module = Some(module);
            table.module_line = Some(line_no as u32);
        }
    }

    // lines spanned by a declaration header, kept or dropped, hold no assignments
    let mut skip_until: Option<usize> = None;

    for (line_no, line) in source.masked.iter().enumerate() {
        if let Some(m) = syntax.use_re.captures(line).and_then(|caps| caps.get(1)) {
            let module = syntax.normalize(m.as_str());
            table
                .symbols
                .push(source.module_symbol(&module, line_no, m.start(), m.end()));
            table.used_modules.push(module);
            continue;
        }

        let mut has_def = false;
        for caps in DEF_RE.captures_iter(line) {
            has_def = true;
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            match source.function_at(line_no, whole.start(), name.start(), name.end(), whole.end() - 1) {
                Ok((symbols, close_line)) => {
                    skip_until = skip_until.max(Some(close_line));
                    table.symbols.extend(symbols);
                }
                Err(gave_up) => {
                    skip_until = skip_until.max(Some(gave_up));
                    tracing::debug!(
                        function = name.as_str(),
                        line = line_no,
                        gave_up,
                        "dropping malformed function declaration"
                    );
                }
            }
        }
        if has_def || skip_until.is_some_and(|end| line_no <= end) {
            continue;
        }

        for caps in ASSIGN_RE.captures_iter(line) {
            if let Some(name) = caps.get(1) {
                table.symbols.push(source.variable_at(line_no, name.start(), name.end()));
            }
        }
    }

    table
}

/// Per-document scanning state.
struct Source<'a> {
    uri: &'a Url,
    lines: Vec<&'a str>,
    masked: Vec<String>,
    scopes: Vec<Scope>,
    global: Scope,
}

impl<'a> Source<'a> {
    fn new(uri: &'a Url, text: &'a str) -> Self {
        let lines = split_lines(text);
        let masked = mask_code(&lines);
        Self {
            uri,
            lines,
            masked,
            scopes: build_scopes(text),
            global: global_scope(text),
        }
    }

    fn pos(&self, line: usize, byte: usize) -> Position {
        Position::new(line as u32, utf16_column(self.lines[line], byte))
    }

    fn name_range(&self, line: usize, start: usize, end: usize) -> Range {
        Range::new(self.pos(line, start), self.pos(line, end))
    }

    fn module_symbol(&self, name: &str, line: usize, start: usize, end: usize) -> Symbol {
        Symbol {
            name: name.to_string(),
            position: self.pos(line, start),
            range: self.name_range(line, start, end),
            uri: self.uri.clone(),
            meta: SymbolMeta::Module { scope: self.global },
        }
    }

    fn variable_at(&self, line: usize, start: usize, end: usize) -> Symbol {
        let position = self.pos(line, start);
        let block = innermost_scope(&self.scopes, position, self.global);
        Symbol {
            name: self.lines[line][start..end].to_string(),
            position,
            range: self.name_range(line, start, end),
            uri: self.uri.clone(),
            meta: SymbolMeta::Variable {
                doc: leading_comment(&self.lines, line),
                scope: Range::new(position, block.end),
            },
        }
    }

    /// Recognize a function whose `def` keyword starts at `def_byte` and whose
    /// parameter list opens at `paren_byte`. Returns the function symbol
    /// followed by its parameters plus the line closing the parameter list.
    /// A malformed declaration yields the last line the scan looked at.
    fn function_at(
        &self,
        line: usize,
        def_byte: usize,
        name_start: usize,
        name_end: usize,
        paren_byte: usize,
    ) -> Result<(Vec<Symbol>, usize), usize> {
        let name = self.lines[line][name_start..name_end].to_string();
        let (params, close) = self.parameter_list(line, paren_byte)?;
        let open_brace = self.find_body_open(close)?;
        let close_brace = self.find_matching_close(open_brace).ok_or(open_brace.0)?;
        let body = Range::new(
            self.pos(open_brace.0, open_brace.1),
            self.pos(close_brace.0, close_brace.1),
        );

        let def_pos = self.pos(line, def_byte);
        let is_top_level = !self.scopes.iter().any(|scope| scope.contains(def_pos));
        let scope = innermost_scope(&self.scopes, def_pos, self.global);

        let mut symbols = Vec::with_capacity(params.len() + 1);
        symbols.push(Symbol {
            name: name.clone(),
            position: self.pos(line, name_start),
            range: self.name_range(line, name_start, name_end),
            uri: self.uri.clone(),
            meta: SymbolMeta::Function {
                params: params.clone(),
                doc: leading_comment(&self.lines, line),
                scope,
                body,
                is_top_level,
            },
        });

        let mut search_from = (line, paren_byte + 1);
        for param in params {
            let found = self.find_word(&param, search_from, close);
            let (p_line, p_byte) = found.unwrap_or((line, name_start));
            if found.is_some() {
                search_from = (p_line, p_byte + param.len());
            }
            symbols.push(Symbol {
                position: self.pos(p_line, p_byte),
                range: match found {
                    Some(_) => self.name_range(p_line, p_byte, p_byte + param.len()),
                    None => self.name_range(line, name_start, name_end),
                },
                name: param,
                uri: self.uri.clone(),
                meta: SymbolMeta::Param {
                    function: name.clone(),
                    scope: body,
                },
            });
        }

        Ok((symbols, close.0))
    }

    /// Accumulate the parameter text after `(` until the parentheses balance.
    ///
    /// Returns the parameter names and the (line, byte) just past the closing
    /// `)`. A `{` or `;` before the list closes means the declaration is
    /// broken; the error carries the line where that was found.
    fn parameter_list(&self, line: usize, paren_byte: usize) -> Result<(Vec<String>, (usize, usize)), usize> {
        let mut captured = String::new();
        let mut depth = 1usize;

        for (line_no, text) in self.masked.iter().enumerate().skip(line) {
            let start = if line_no == line { paren_byte + 1 } else { 0 };
            let segment = &text[start..];
            if line_no != line && !captured.is_empty() {
                captured.push(' ');
            }

            let segment_text = if line_no == line { segment } else { segment.trim_start() };
            let offset = start + (segment.len() - segment_text.len());

            for (idx, ch) in segment_text.char_indices() {
                match ch {
                    '(' => depth += 1,
                    ')' => {
                        depth -= 1;
                        if depth == 0 {
                            captured.push_str(&segment_text[..idx]);
                            return Ok((split_params(&captured), (line_no, offset + idx + 1)));
                        }
                    }
                    '{' | ';' => return Err(line_no),
                    _ => {}
                }
            }
            captured.push_str(segment_text.trim_end());
        }

        Err(self.masked.len().saturating_sub(1))
    }

    /// First `{` at or after `from`, giving up at a line that ends a statement.
    fn find_body_open(&self, from: (usize, usize)) -> Result<(usize, usize), usize> {
        for (line_no, text) in self.masked.iter().enumerate().skip(from.0) {
            let start = if line_no == from.0 { from.1 } else { 0 };
            let segment = &text[start..];
            if let Some(idx) = segment.find('{') {
                return Ok((line_no, start + idx));
            }
            if segment.contains(';') {
                return Err(line_no);
            }
        }
        Err(self.masked.len().saturating_sub(1))
    }

    /// Matching `}` for the `{` at `open`, counted locally.
    fn find_matching_close(&self, open: (usize, usize)) -> Option<(usize, usize)> {
        let mut depth = 0usize;
        for (line_no, text) in self.masked.iter().enumerate().skip(open.0) {
            let start = if line_no == open.0 { open.1 } else { 0 };
            for (idx, ch) in text[start..].char_indices() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            return Some((line_no, start + idx));
                        }
                    }
                    _ => {}
                }
            }
        }
        None
    }

    /// Locate `word` as a whole identifier between `from` and `until`.
    fn find_word(&self, word: &str, from: (usize, usize), until: (usize, usize)) -> Option<(usize, usize)> {
        for line_no in from.0..=until.0.min(self.masked.len().saturating_sub(1)) {
            let text = &self.masked[line_no];
            let start = if line_no == from.0 { from.1.min(text.len()) } else { 0 };
            let end = if line_no == until.0 { until.1.min(text.len()) } else { text.len() };
            if start > end {
                continue;
            }
            let haystack = &text[start..end];
            let mut search = 0;
            while let Some(found) = haystack[search..].find(word) {
                let at = search + found;
                let before = haystack[..at].chars().next_back();
                let after = haystack[at + word.len()..].chars().next();
                if !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char) {
                    return Some((line_no, start + at));
                }
                search = at + word.len();
            }
        }
        None
    }
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// Split a captured parameter list on commas, keeping the name left of any
/// default value.
fn split_params(captured: &str) -> Vec<String> {
    captured
        .split(',')
        .map(|piece| piece.split('=').next().unwrap_or(piece).trim())
        .map(|piece| piece.strip_prefix("mutable ").map(str::trim).unwrap_or(piece))
        .filter(|piece| !piece.is_empty())
        .map(str::to_string)
        .collect()
}

/// Contiguous comment block directly above `line`, top to bottom.
///
/// Any non-comment line, including a blank one, ends the block.
pub fn leading_comment(lines: &[&str], line: usize) -> Option<String> {
    let mut collected: Vec<String> = Vec::new();
    let mut idx = line;

    while idx > 0 {
        idx -= 1;
        let trimmed = lines[idx].trim();

        if let Some(rest) = trimmed.strip_prefix("//") {
            collected.push(rest.trim_start_matches('/').trim().to_string());
            continue;
        }

        if trimmed.ends_with("*/") {
            let mut block = Vec::new();
            let mut cursor = idx;
            loop {
                let current = lines[cursor].trim();
                if let Some(open) = current.find("/*") {
                    if open != 0 {
                        // code before the comment opener: not a doc block
                        return finish_comment(collected);
                    }
                    block.push(clean_block_line(current));
                    break;
                }
                block.push(clean_block_line(current));
                if cursor == 0 {
                    return finish_comment(collected);
                }
                cursor -= 1;
            }
            collected.extend(block);
            idx = cursor;
            continue;
        }

        break;
    }

    finish_comment(collected)
}

fn clean_block_line(line: &str) -> String {
    let line = line.trim();
    let line = line.strip_prefix("/**").or_else(|| line.strip_prefix("/*")).unwrap_or(line);
    let line = line.strip_suffix("*/").unwrap_or(line);
    let line = line.trim();
    line.strip_prefix('*').unwrap_or(line).trim().to_string()
}

fn finish_comment(mut collected: Vec<String>) -> Option<String> {
    collected.reverse();
    let doc = collected.join("\n");
    let doc = doc.trim();
    if doc.is_empty() {
        None
    } else {
        Some(doc.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_params_drops_defaults_and_mutable() {
        assert_eq!(
            split_params("mutable t, n = 10, , label=\"x\""),
            vec!["t", "n", "label"]
        );
    }

    #[test]
    fn normalizes_spaced_module_paths() {
        assert_eq!(ModuleSyntax::default().normalize("a :: b::  c"), "a::b::c");
        assert_eq!(ModuleSyntax::new(".").normalize("a . b"), "a.b");
    }

    #[test]
    fn blank_separator_falls_back() {
        assert_eq!(ModuleSyntax::new("  ").separator(), "::");
    }

    #[test]
    fn block_comment_with_code_before_is_not_doc() {
        let lines = ["x = 1 /* trailing */", "def f() {}"];
        assert_eq!(leading_comment(&lines, 1), None);
    }
}
