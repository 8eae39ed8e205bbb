// Import validation against the module registry

use tower_lsp::lsp_types::{
    Diagnostic, DiagnosticSeverity, NumberOrString, Position as LspPosition, Range as LspRange,
};

use crate::registry::ModuleRegistry;
use crate::text::{mask_comments, split_lines, utf16_len};

pub const DIAGNOSTIC_SOURCE: &str = "dos";

/// One diagnostic per `use` line naming a module the registry does not know.
///
/// Returns nothing until the registry's first scan has finished, so that
/// every import is not reported as missing during startup.
pub fn unknown_module_diagnostics(
    registry: &ModuleRegistry,
    text: &str,
    severity: DiagnosticSeverity,
) -> Vec<Diagnostic> {
    if !registry.is_ready() {
        return Vec::new();
    }

    let syntax = registry.syntax();
    let lines = split_lines(text);
    let masked = mask_comments(&lines);

    masked
        .iter()
        .enumerate()
        .filter_map(|(line_no, line)| {
            let module = syntax.parse_use_statement(line)?;
            if registry.contains(&module) {
                return None;
            }
            let line_no = line_no as u32;
            Some(Diagnostic {
                range: LspRange::new(
                    LspPosition::new(line_no, 0),
                    LspPosition::new(line_no, utf16_len(lines[line_no as usize])),
                ),
                severity: Some(severity),
                code: Some(NumberOrString::String("unknown-module".to_string())),
                source: Some(DIAGNOSTIC_SOURCE.to_string()),
                message: format!("Module '{}' not found", module),
                ..Default::default()
            })
        })
        .collect()
}
