//! Error types for profile storage

use thiserror::Error;

/// Result type for profile operations
pub type Result<T> = std::result::Result<T, ProfileError>;

/// Errors raised while registering an application
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A registration argument was empty or out of range
    #[error("Invalid argument {field}: {message}")]
    InvalidArgument { field: String, message: String },
}

impl RegistrationError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>) -> Self {
        RegistrationError::InvalidArgument {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Errors raised while decoding a profile
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// Input does not start with the profile magic
    #[error("Not a profile file")]
    BadMagic,

    /// Header carries a version this build cannot read
    #[error("Unsupported profile version: {found}")]
    VersionMismatch { found: u16 },

    /// Truncated or malformed body
    #[error("Corrupt profile: {0}")]
    Corrupt(String),

    /// A length does not fit the format's u32 length fields
    #[error("{field} too large to encode: {len}")]
    TooLarge { field: String, len: usize },
}

/// Errors that can occur in the profiling subsystem
#[derive(Error, Debug)]
pub enum ProfileError {
    /// Invalid registration
    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// Undecodable profile bytes
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Configuration failed validation
    #[error("Invalid config at {path}: {message}")]
    InvalidConfig { path: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}
