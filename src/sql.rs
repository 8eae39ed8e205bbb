//! Recognize SQL clauses around the cursor.
//!
//! Works on the text of the current statement, split at the cursor. The
//! result says which kind of database object should be completed and which
//! table, if any, the clause refers to.

use std::sync::LazyLock;

use regex::Regex;

use crate::database::TableHandle;

static LOAD_TABLE_DATABASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bloadTable\(\s*"([^"]*)$"#).expect("loadTable database regex")
});

static LOAD_TABLE_TABLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bloadTable\(\s*"([^"]+)"\s*,\s*"?(\w*)$"#).expect("loadTable table regex")
});

static DDL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(update|delete\s+from|alter\s+table|drop\s+table|create\s+table)\s+([\w.]*)$")
        .expect("ddl regex")
});

static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\s+([\w.]*)$").expect("from regex"));

static ORDER_BY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\border\s+by\s+[\w\s,]*$").expect("order by regex"));

static FILTER_CLAUSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:where|group\s+by|context\s+by|pivot\s+by|having)\s+[^;]*$")
        .expect("filter clause regex")
});

static SELECT_LIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:select|exec)\s+[^;]*$").expect("select regex"));

static FROM_TARGET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)\bfrom\s+(?:loadTable\(\s*"([^"]+)"\s*,\s*"([^"]+)"\s*\)|(\w+)\.(\w+)\.(\w+)\b)"#,
    )
    .expect("from target regex")
});

static FROM_WORD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\b").expect("from keyword regex"));

/// Clause kinds with database-backed completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlContext {
    /// A table reference after `from`. `segments` are the complete
    /// dot-separated parts typed before the cursor.
    FromClause { segments: Vec<String> },
    /// First argument of `loadTable(`: a database path.
    LoadTableDatabase,
    /// Second argument of `loadTable("db", `: a table of that database.
    LoadTableTable { database: String },
    /// Target of `update`, `delete from`, `alter/drop/create table`.
    DdlTarget { segments: Vec<String>, creating: bool },
    /// Column positions: the select list and filter/grouping clauses.
    ColumnList { table: TableHandle },
    OrderBy { table: TableHandle },
}

impl SqlContext {
    /// Ranking tag for completion candidates produced in this context.
    pub fn priority(&self) -> u8 {
        match self {
            SqlContext::FromClause { .. }
            | SqlContext::LoadTableDatabase
            | SqlContext::LoadTableTable { .. }
            | SqlContext::DdlTarget { .. } => 3,
            SqlContext::OrderBy { .. } => 2,
            SqlContext::ColumnList { .. } => 1,
        }
    }
}

/// Complete segments of a dotted path being typed: `a.b.c` yields `[a, b]`.
fn complete_segments(path: &str) -> Vec<String> {
    let mut parts: Vec<String> = path.split('.').map(str::to_string).collect();
    parts.pop();
    parts
}

/// The table named by the statement's `from` clause, if it is addressable.
pub fn from_target(statement: &str) -> Option<TableHandle> {
    let caps = FROM_TARGET_RE.captures(statement)?;
    if let (Some(database), Some(table)) = (caps.get(1), caps.get(2)) {
        return Some(TableHandle::Database {
            database: database.as_str().to_string(),
            table: table.as_str().to_string(),
        });
    }
    match (caps.get(3), caps.get(4), caps.get(5)) {
        (Some(catalog), Some(schema), Some(table)) => Some(TableHandle::Catalog {
            catalog: catalog.as_str().to_string(),
            schema: schema.as_str().to_string(),
            table: table.as_str().to_string(),
        }),
        _ => None,
    }
}

/// Classify the cursor position inside a statement.
///
/// `before` is the statement text up to the cursor, `after` the rest of it.
pub fn classify(before: &str, after: &str) -> Option<SqlContext> {
    if LOAD_TABLE_DATABASE_RE.is_match(before) {
        return Some(SqlContext::LoadTableDatabase);
    }
    if let Some(caps) = LOAD_TABLE_TABLE_RE.captures(before) {
        return Some(SqlContext::LoadTableTable {
            database: caps[1].to_string(),
        });
    }
    if let Some(caps) = DDL_RE.captures(before) {
        let creating = caps[1].to_ascii_lowercase().starts_with("create");
        return Some(SqlContext::DdlTarget {
            segments: complete_segments(&caps[2]),
            creating,
        });
    }
    if let Some(caps) = FROM_RE.captures(before) {
        return Some(SqlContext::FromClause {
            segments: complete_segments(&caps[1]),
        });
    }
    if ORDER_BY_RE.is_match(before) {
        return from_target(before).map(|table| SqlContext::OrderBy { table });
    }
    if FILTER_CLAUSE_RE.is_match(before) {
        if let Some(table) = from_target(before) {
            return Some(SqlContext::ColumnList { table });
        }
    }
    if let Some(select) = SELECT_LIST_RE.find(before) {
        if !FROM_WORD_RE.is_match(select.as_str()) {
            return from_target(after).map(|table| SqlContext::ColumnList { table });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_complete_segments() {
        assert_eq!(complete_segments(""), Vec::<String>::new());
        assert_eq!(complete_segments("cat."), vec!["cat"]);
        assert_eq!(complete_segments("cat.sch.ta"), vec!["cat", "sch"]);
    }

    #[test]
    fn delete_from_is_ddl_not_from() {
        let ctx = classify("delete from cat.", "");
        assert_eq!(
            ctx,
            Some(SqlContext::DdlTarget {
                segments: vec!["cat".to_string()],
                creating: false
            })
        );
    }
}
