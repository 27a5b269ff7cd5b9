//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Configuration-related errors
///
/// Middleware construction errors (`MissingApiKey`, `MissingGroupingFunction`,
/// `MissingUserResolver`) are raised by the builders before any request is
/// served.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for '{field}': {message}")]
    Validation { field: String, message: String },

    #[error("You must provide an API key")]
    MissingApiKey,

    #[error("You must provide a grouping function")]
    MissingGroupingFunction,

    #[error("You must provide a function to get the user")]
    MissingUserResolver,

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}
