// DolphinDB script language server library

pub mod analysis;
pub mod completion;
pub mod config;
pub mod database;
pub mod diagnostics;
pub mod error;
pub mod extract;
pub mod lsp;
pub mod metadata;
pub mod registry;
pub mod resolve;
pub mod scope;
pub mod service;
pub mod sql;
pub mod symbols;
pub mod text;
pub mod watch;

pub use analysis::Analysis;
pub use config::ServerConfig;
pub use database::{DatabaseClient, NullDatabase, TableHandle};
pub use error::{Error, Result};
pub use lsp::Backend;
pub use registry::ModuleRegistry;
pub use scope::{Position, Range};
pub use service::SymbolService;
