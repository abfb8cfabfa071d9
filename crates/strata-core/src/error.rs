//! Error types for strata-core

use thiserror::Error;

/// Result type alias for strata-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in strata-core
#[derive(Error, Debug)]
pub enum Error {
    /// Dataset definition file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse a YAML dataset definition
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Dataset definition is internally inconsistent
    #[error("invalid dataset '{dataset}': {message}")]
    InvalidDataset {
        /// Name of the dataset with the error
        dataset: String,
        /// Description of the error
        message: String,
    },

    /// A row of the intermediate file has no usable primary key
    #[error("row {line} has no usable value for primary key '{column}'")]
    MissingKey {
        /// 1-based line in the intermediate file, the header being line 1
        line: usize,
        /// Primary key column name
        column: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding/decoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
