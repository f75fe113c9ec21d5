//! Common error types for ptrack

use thiserror::Error;

/// Common result type for ptrack operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the ptrack crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML file could not be parsed
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML value could not be serialized
    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
