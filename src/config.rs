//! Server configuration, read from `initializationOptions` and
//! `workspace/didChangeConfiguration`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::DiagnosticSeverity;

use crate::error::Result;
use crate::registry::RegistrySettings;

/// Documents above this size are neither stored nor indexed.
pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Warning,
    Error,
}

impl From<Severity> for DiagnosticSeverity {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Warning => DiagnosticSeverity::WARNING,
            Severity::Error => DiagnosticSeverity::ERROR,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Root of the module scan. Relative paths resolve against the
    /// workspace root; `None` means the workspace root itself.
    pub module_root: Option<PathBuf>,
    pub extension: String,
    pub module_separator: String,
    pub metadata_refresh_secs: u64,
    pub max_document_size: usize,
    pub unknown_module_severity: Severity,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let registry = RegistrySettings::default();
        Self {
            module_root: None,
            extension: registry.extension,
            module_separator: registry.separator,
            metadata_refresh_secs: 30,
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            unknown_module_severity: Severity::Warning,
        }
    }
}

impl ServerConfig {
    /// Decode settings sent by the editor. They may sit at the top level or
    /// under a `"dos"` section.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let value = match value {
            serde_json::Value::Object(mut map) if map.contains_key("dos") => {
                map.remove("dos").unwrap_or_default()
            }
            other => other,
        };
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn module_root(&self, workspace_root: &Path) -> PathBuf {
        match &self.module_root {
            Some(root) if root.is_absolute() => root.clone(),
            Some(root) => workspace_root.join(root),
            None => workspace_root.to_path_buf(),
        }
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            extension: self.extension.trim_start_matches('.').to_string(),
            separator: self.module_separator.clone(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.metadata_refresh_secs)
    }
}
