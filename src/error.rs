//! Error types for AIOP
//!
//! Provides standardized error handling across the crate.

use thiserror::Error;

use crate::extensions::ExtensionError;

/// Errors that can occur in AIOP
#[derive(Debug, Error)]
pub enum AiopError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Extension subsystem errors
    #[error("Extension error: {0}")]
    Extension(#[from] ExtensionError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("Config parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("Config serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Result type alias for AIOP operations
pub type AiopResult<T> = Result<T, AiopError>;
