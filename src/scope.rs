//! Brace-delimited scope intervals.
//!
//! A single left-to-right pass pairs every `}` with the latest unmatched `{`.
//! The pass never fails: an opening brace that is never closed produces no
//! scope and a stray closing brace is ignored.

use crate::text::{mask_code, split_lines, utf16_column, utf16_len};

/// Zero-based line/column pair; columns count UTF-16 code units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Inclusive interval `start..=end`, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

impl Range {
    pub const fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// Check if a position falls within this range (both ends inclusive).
    pub fn contains(&self, pos: Position) -> bool {
        pos >= self.start && pos <= self.end
    }

    /// Check if `other` lies entirely inside this range.
    pub fn encloses(&self, other: &Range) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// True when the two ranges share at least one position.
    pub fn overlaps(&self, other: &Range) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl From<tower_lsp::lsp_types::Position> for Position {
    fn from(pos: tower_lsp::lsp_types::Position) -> Self {
        Self::new(pos.line, pos.character)
    }
}

impl From<Position> for tower_lsp::lsp_types::Position {
    fn from(pos: Position) -> Self {
        Self::new(pos.line, pos.column)
    }
}

impl From<Range> for tower_lsp::lsp_types::Range {
    fn from(range: Range) -> Self {
        Self::new(range.start.into(), range.end.into())
    }
}

/// A block scope: the range from a `{` to its matching `}`.
pub type Scope = Range;

/// The synthetic scope covering the whole file.
pub fn global_scope(text: &str) -> Scope {
    let lines = split_lines(text);
    let last = lines.len().saturating_sub(1);
    let width = lines.last().map(|line| utf16_len(line)).unwrap_or(0);
    Range::new(Position::new(0, 0), Position::new(last as u32, width))
}

/// Scan `text` and return every matched brace pair, in closing order.
///
/// Braces inside comments and string literals are ignored.
pub fn build_scopes(text: &str) -> Vec<Scope> {
    let mut stack: Vec<Position> = Vec::new();
    let mut scopes = Vec::new();

    let lines = split_lines(text);
    let masked = mask_code(&lines);
    for (line_no, (line, code)) in lines.iter().zip(&masked).enumerate() {
        for (byte, ch) in code.char_indices() {
            let here = || Position::new(line_no as u32, utf16_column(line, byte));
            match ch {
                '{' => stack.push(here()),
                '}' => {
                    if let Some(open) = stack.pop() {
                        scopes.push(Range::new(open, here()));
                    }
                }
                _ => {}
            }
        }
    }

    if !stack.is_empty() {
        tracing::debug!(unclosed = stack.len(), "dropping unmatched opening braces");
    }

    scopes
}

/// Innermost scope containing `point`: the candidate with the greatest start.
///
/// Falls back to `global` when no brace scope contains the point.
pub fn innermost_scope(scopes: &[Scope], point: Position, global: Scope) -> Scope {
    scopes
        .iter()
        .filter(|scope| scope.contains(point))
        .max_by_key(|scope| scope.start)
        .copied()
        .unwrap_or(global)
}
