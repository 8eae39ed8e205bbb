// Completion engine: cursor classification and candidate assembly

use std::collections::HashSet;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, InsertTextFormat, Position as LspPosition,
    Range as LspRange, TextEdit,
};
use url::Url;

use crate::analysis::Analysis;
use crate::metadata::MetadataCache;
use crate::scope::Position;
use crate::sql::{classify, SqlContext};
use crate::symbols::{Symbol, SymbolKind};
use crate::text::{byte_offset, mask_comments, split_lines};

/// Statements longer than this are not searched for SQL clauses.
const MAX_STATEMENT_LINES: usize = 20;

/// What the text around the cursor asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionContext {
    Comment,
    Sql(SqlContext),
    General,
}

/// A completion before conversion to the protocol type.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub label: String,
    pub kind: CompletionItemKind,
    pub detail: Option<String>,
    pub documentation: Option<String>,
    pub insert_text: Option<String>,
    pub snippet: bool,
    pub additional_edits: Vec<TextEdit>,
    /// Present on candidates from a recognized SQL clause.
    pub priority: Option<u8>,
}

impl Candidate {
    fn new(label: impl Into<String>, kind: CompletionItemKind) -> Self {
        Self {
            label: label.into(),
            kind,
            detail: None,
            documentation: None,
            insert_text: None,
            snippet: false,
            additional_edits: Vec::new(),
            priority: None,
        }
    }

    fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn documentation(mut self, doc: Option<String>) -> Self {
        self.documentation = doc;
        self
    }

    fn snippet(mut self, body: impl Into<String>) -> Self {
        self.insert_text = Some(body.into());
        self.snippet = true;
        self
    }

    fn plain(mut self, text: impl Into<String>) -> Self {
        self.insert_text = Some(text.into());
        self
    }

    fn priority(mut self, priority: u8) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn into_item(self) -> CompletionItem {
        CompletionItem {
            label: self.label,
            kind: Some(self.kind),
            detail: self.detail,
            documentation: self.documentation.map(Documentation::String),
            insert_text: self.insert_text,
            insert_text_format: Some(if self.snippet {
                InsertTextFormat::SNIPPET
            } else {
                InsertTextFormat::PLAIN_TEXT
            }),
            additional_text_edits: if self.additional_edits.is_empty() {
                None
            } else {
                Some(self.additional_edits)
            },
            ..Default::default()
        }
    }
}

/// Keep only the candidates with the highest priority tag, if any is tagged.
pub fn collapse_priority(candidates: Vec<Candidate>) -> Vec<Candidate> {
    match candidates.iter().filter_map(|c| c.priority).max() {
        Some(top) => candidates
            .into_iter()
            .filter(|c| c.priority == Some(top))
            .collect(),
        None => candidates,
    }
}

/// Classify the cursor position in `text`.
pub fn classify_context(text: &str, position: Position) -> CompletionContext {
    let lines = split_lines(text);
    let line_no = position.line as usize;
    let Some(line) = lines.get(line_no) else {
        return CompletionContext::General;
    };
    if line.trim_start().starts_with("//") || line.trim_start().starts_with("/*") {
        return CompletionContext::Comment;
    }

    let masked = mask_comments(&lines);
    let cursor = byte_offset(line, position.column);
    let prefix = &line[..cursor];
    let masked_prefix = &masked[line_no][..cursor];
    if masked_prefix.trim_end().len() < prefix.trim_end().len() {
        return CompletionContext::Comment;
    }

    let (before, after) = statement_around(&masked, line_no, cursor);
    match classify(&before, &after) {
        Some(sql) => CompletionContext::Sql(sql),
        None => CompletionContext::General,
    }
}

/// Text of the statement containing the cursor, split at the cursor.
///
/// A statement extends over neighbouring lines until a blank line or a line
/// ending in `;`.
fn statement_around(masked: &[String], line_no: usize, cursor: usize) -> (String, String) {
    let line = &masked[line_no];
    let head = &line[..cursor];
    let tail = &line[cursor..];

    let mut before_lines: Vec<&str> = Vec::new();
    let head = match head.rfind(';') {
        Some(idx) => &head[idx + 1..],
        None => {
            for prev in masked[..line_no].iter().rev().take(MAX_STATEMENT_LINES) {
                let trimmed = prev.trim();
                if trimmed.is_empty() || trimmed.ends_with(';') {
                    break;
                }
                before_lines.push(trimmed);
            }
            head
        }
    };
    before_lines.reverse();
    before_lines.push(head.trim_start());

    let mut after_lines: Vec<&str> = Vec::new();
    match tail.find(';') {
        Some(idx) => after_lines.push(&tail[..idx]),
        None => {
            after_lines.push(tail);
            for next in masked.iter().skip(line_no + 1).take(MAX_STATEMENT_LINES) {
                let trimmed = next.trim();
                if trimmed.is_empty() {
                    break;
                }
                match trimmed.find(';') {
                    Some(idx) => {
                        after_lines.push(&trimmed[..idx]);
                        break;
                    }
                    None => after_lines.push(trimmed),
                }
            }
        }
    }

    (before_lines.join(" "), after_lines.join(" "))
}

/// Full completion pipeline for one request.
pub async fn completions(analysis: &Analysis, uri: &Url, text: &str, position: Position) -> Vec<CompletionItem> {
    let mut candidates = Vec::new();

    match classify_context(text, position) {
        CompletionContext::Comment => return Vec::new(),
        CompletionContext::Sql(context) => {
            candidates.extend(sql_candidates(&analysis.metadata, &context).await);
        }
        CompletionContext::General => {}
    }

    candidates.extend(general_candidates(analysis, uri, position));

    collapse_priority(candidates)
        .into_iter()
        .map(Candidate::into_item)
        .collect()
}

/// Database objects for a recognized SQL clause.
pub async fn sql_candidates(metadata: &MetadataCache, context: &SqlContext) -> Vec<Candidate> {
    let priority = context.priority();
    let named = |names: &[String], kind: CompletionItemKind, detail: &str| -> Vec<Candidate> {
        names
            .iter()
            .map(|name| Candidate::new(name.clone(), kind).detail(detail).priority(priority))
            .collect()
    };

    match context {
        SqlContext::FromClause { segments } => path_candidates(metadata, segments, false, priority).await,
        SqlContext::DdlTarget { segments, creating } => {
            path_candidates(metadata, segments, *creating, priority).await
        }
        SqlContext::LoadTableDatabase => {
            named(&metadata.databases().await, CompletionItemKind::MODULE, "database")
        }
        SqlContext::LoadTableTable { database } => {
            named(&metadata.tables(database).await, CompletionItemKind::STRUCT, "table")
        }
        SqlContext::ColumnList { table } | SqlContext::OrderBy { table } => metadata
            .columns(table)
            .await
            .iter()
            .map(|column| {
                Candidate::new(column.name.clone(), CompletionItemKind::FIELD)
                    .detail(format!("{} ({})", column.data_type, table.table()))
                    .documentation(column.comment.clone())
                    .priority(priority)
            })
            .collect(),
    }
}

/// Resolve a dotted catalog path: nothing typed lists catalogs, one segment
/// lists schemas, two list tables.
async fn path_candidates(
    metadata: &MetadataCache,
    segments: &[String],
    creating: bool,
    priority: u8,
) -> Vec<Candidate> {
    let (names, kind, detail) = match segments {
        [] => (metadata.catalogs().await, CompletionItemKind::MODULE, "catalog"),
        [catalog] => (metadata.schemas(catalog).await, CompletionItemKind::FOLDER, "schema"),
        [catalog, schema] if !creating => (
            metadata.catalog_tables(catalog, schema).await,
            CompletionItemKind::STRUCT,
            "table",
        ),
        _ => return Vec::new(),
    };
    names
        .iter()
        .map(|name| Candidate::new(name.clone(), kind).detail(detail).priority(priority))
        .collect()
}

/// Snippets, keywords, visible symbols, module imports and functions from
/// other modules.
pub fn general_candidates(analysis: &Analysis, uri: &Url, position: Position) -> Vec<Candidate> {
    let mut candidates = snippet_candidates();
    candidates.extend(keyword_candidates());

    for symbol in analysis.symbols.visible_symbols(uri, position) {
        match symbol.kind() {
            SymbolKind::Function => candidates.push(function_candidate(&symbol, None)),
            SymbolKind::Variable => candidates.push(
                Candidate::new(symbol.name.clone(), CompletionItemKind::VARIABLE)
                    .detail("variable")
                    .documentation(symbol.doc().map(str::to_string)),
            ),
            SymbolKind::Param => candidates.push(
                Candidate::new(symbol.name.clone(), CompletionItemKind::VARIABLE).detail("parameter"),
            ),
            SymbolKind::Module => {}
        }
    }

    let current = analysis.symbols.table(uri);
    let import_line = current
        .as_ref()
        .and_then(|table| table.module_line)
        .map(|line| line + 1)
        .unwrap_or(0);

    let mut seen_modules = HashSet::new();
    for entry in analysis.registry.entries() {
        let Some(entry_uri) = entry.uri() else { continue };
        if &entry_uri == uri {
            continue;
        }
        let module = entry.name().to_string();
        if seen_modules.insert(module.clone()) {
            candidates.push(
                Candidate::new(format!("use {module}"), CompletionItemKind::MODULE)
                    .detail("import module")
                    .plain(format!("use {module}")),
            );
        }

        let Some(table) = analysis.symbols.table(&entry_uri) else { continue };
        let imported = current.as_ref().is_some_and(|t| t.imports(&module));
        for function in table.top_level_functions() {
            let edit = (!imported).then(|| TextEdit {
                range: LspRange::new(
                    LspPosition::new(import_line, 0),
                    LspPosition::new(import_line, 0),
                ),
                new_text: format!("use {module}\n"),
            });
            candidates.push(function_candidate(function, Some((module.as_str(), edit))));
        }
    }

    candidates
}

/// Call snippet with one tab stop per parameter: `f(${1:a}, ${2:b})`.
pub fn call_snippet(name: &str, params: &[String]) -> String {
    let stops: Vec<String> = params
        .iter()
        .enumerate()
        .map(|(idx, param)| format!("${{{}:{}}}", idx + 1, param))
        .collect();
    format!("{}({})", name, stops.join(", "))
}

pub fn format_signature(symbol: &Symbol) -> String {
    format!("def {}({})", symbol.name, symbol.params().join(", "))
}

fn function_candidate(symbol: &Symbol, module: Option<(&str, Option<TextEdit>)>) -> Candidate {
    let mut candidate = Candidate::new(symbol.name.clone(), CompletionItemKind::FUNCTION)
        .detail(format_signature(symbol))
        .documentation(symbol.doc().map(str::to_string))
        .snippet(call_snippet(&symbol.name, symbol.params()));
    if let Some((module, edit)) = module {
        candidate.detail = Some(format!("{}  ({})", format_signature(symbol), module));
        candidate.additional_edits.extend(edit);
    }
    candidate
}

const SNIPPETS: &[(&str, &str, &str)] = &[
    ("def", "def ${1:name}(${2:params}) {\n\t$0\n}", "Function definition"),
    ("if", "if (${1:condition}) {\n\t$0\n}", "Conditional statement"),
    ("ifelse", "if (${1:condition}) {\n\t$2\n} else {\n\t$0\n}", "If/else statement"),
    ("for", "for (${1:i} in ${2:0:10}) {\n\t$0\n}", "For loop"),
    ("do", "do {\n\t$0\n} while (${1:condition})", "Do/while loop"),
    ("try", "try {\n\t$1\n} catch (${2:ex}) {\n\t$0\n}", "Try/catch block"),
    ("select", "select ${1:*} from ${2:table} where ${0:condition}", "SQL select"),
    ("module", "module ${0:name}", "Module declaration"),
    ("use", "use ${0:module}", "Module import"),
];

pub fn snippet_candidates() -> Vec<Candidate> {
    SNIPPETS
        .iter()
        .map(|(label, body, detail)| {
            Candidate::new(*label, CompletionItemKind::SNIPPET)
                .detail(*detail)
                .snippet(*body)
        })
        .collect()
}

const KEYWORDS: &[(&str, &str)] = &[
    ("def", "Function definition"),
    ("if", "Conditional statement"),
    ("else", "Else branch"),
    ("for", "For loop"),
    ("do", "Do/while loop"),
    ("while", "While loop"),
    ("break", "Break out of loop"),
    ("continue", "Continue to next loop iteration"),
    ("return", "Return from function"),
    ("try", "Guarded block"),
    ("catch", "Exception handler"),
    ("throw", "Raise an exception"),
    ("share", "Share a table across sessions"),
    ("undef", "Release a variable"),
    ("module", "Module declaration"),
    ("use", "Module import"),
    ("select", "SQL query"),
    ("exec", "SQL query returning a vector or scalar"),
    ("update", "SQL update"),
    ("delete", "SQL delete"),
    ("from", "SQL source table"),
    ("where", "SQL filter"),
];

pub fn keyword_candidates() -> Vec<Candidate> {
    KEYWORDS
        .iter()
        .map(|(label, detail)| Candidate::new(*label, CompletionItemKind::KEYWORD).detail(*detail))
        .collect()
}
