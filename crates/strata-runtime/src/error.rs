//! Runtime error types

use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the pipeline stages
#[derive(Error, Debug)]
pub enum Error {
    /// A store could not be reached or refused the credentials
    #[error("connection to {target} failed: {message}")]
    Connection {
        /// Which store was being connected to
        target: String,
        /// Underlying cause
        message: String,
    },

    /// HTTP request to the source API failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Source API answered with a body of the wrong shape
    #[error("unexpected response from {url}: {message}")]
    UnexpectedResponse {
        /// Requested URL
        url: String,
        /// What was wrong with the body
        message: String,
    },

    /// Document store operation failed
    #[error("document store error: {0}")]
    DocumentStore(#[from] mongodb::error::Error),

    /// A raw document could not be encoded for the document store
    #[error("document encoding failed: {0}")]
    Encoding(#[from] mongodb::bson::ser::Error),

    /// Relational store operation failed
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Live column type differs from the declared one and cannot be migrated
    #[error(
        "column '{column}' of table '{table}' has type '{actual}', expected '{expected}', and cannot be migrated in place"
    )]
    SchemaMismatch {
        /// Table name
        table: String,
        /// Column name
        column: String,
        /// Declared type
        expected: String,
        /// Type found in the database
        actual: String,
    },

    /// Error from the core library (configuration, dataset, CSV, coercion)
    #[error(transparent)]
    Core(#[from] strata_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a [`Error::Connection`] from any displayable cause
    pub fn connection(target: impl Into<String>, cause: impl std::fmt::Display) -> Self {
        Self::Connection {
            target: target.into(),
            message: cause.to_string(),
        }
    }
}
