use std::io;

/// Errors raised at the server's internal seams.
///
/// None of these reach a language-feature response: callers log them and
/// answer with an empty result instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Database request `{method}` failed: {message}")]
    Database {
        method: &'static str,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not a file URI: {0}")]
    NotAFile(String),
}

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, Error>;
