//! Configuration error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading or resolving a policy configuration.
///
/// Every variant is fatal: a document that fails to load is never partially
/// applied.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// Failed to read configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// JSON parsing error.
    #[error("failed to parse JSON configuration: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid configuration value.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// The same project key carries more than one structured rule.
    #[error("duplicate rule for project '{key}' in {scope}")]
    DuplicateProjectRule {
        /// The project key.
        key: String,
        /// Where the duplicate was found (`defaults` or `organizations.<alias>`).
        scope: String,
    },

    /// The requested organization alias is not declared.
    #[error("unknown organization '{alias}' (declared: {declared})")]
    UnknownOrganization {
        /// The requested alias.
        alias: String,
        /// Comma-separated list of declared aliases.
        declared: String,
    },

    /// An organization references a token variable that is not set.
    #[error("environment variable {var} for organization '{alias}' is not set")]
    MissingToken {
        /// Organization alias.
        alias: String,
        /// Environment variable name.
        var: String,
    },

    /// Environment variable parsing error.
    #[error("failed to parse environment variable {var}: {reason}")]
    EnvParse {
        /// The environment variable name.
        var: String,
        /// Explanation of the parsing error.
        reason: String,
    },

    /// Unsupported source format.
    #[error("unsupported configuration format: {0}")]
    UnsupportedFormat(String),
}

impl ConfigError {
    /// Create a new file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Create a new read error.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadError {
            path: path.into(),
            source,
        }
    }

    /// Create a new invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a new duplicate rule error.
    pub fn duplicate_rule(key: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::DuplicateProjectRule {
            key: key.into(),
            scope: scope.into(),
        }
    }

    /// Create a new unknown organization error.
    pub fn unknown_organization<'a>(
        alias: impl Into<String>,
        declared: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let declared: Vec<&str> = declared.into_iter().collect();
        Self::UnknownOrganization {
            alias: alias.into(),
            declared: if declared.is_empty() {
                "none".to_string()
            } else {
                declared.join(", ")
            },
        }
    }

    /// Create a new environment variable parse error.
    pub fn env_parse(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvParse {
            var: var.into(),
            reason: reason.into(),
        }
    }
}
