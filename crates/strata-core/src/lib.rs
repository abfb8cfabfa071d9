//! Strata Core Library
//!
//! This crate provides the I/O-free parts of the Strata ETL pipeline:
//! - Configuration loading
//! - Dataset definitions (source shape, projection, target table)
//! - Field projection of raw documents into flat records
//! - Table schema, DDL generation and value coercion
//! - The intermediate CSV file shared by the transform and load stages
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Raw JSON   │────▶│ Projection  │────▶│  CSV file   │────▶ TableSchema rows
//! │  documents  │     │  (records)  │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_core::{DatasetSpec, PipelineConfig};
//!
//! let config = PipelineConfig::from_env()?;
//! let dataset = config.load_dataset()?;
//! let record = dataset.fields.normalize(&serde_json::json!({"id": 1}));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod dataset;
pub mod error;
pub mod projection;
pub mod record;
pub mod schema;
pub mod table_file;

pub use config::PipelineConfig;
pub use dataset::{DatasetSpec, SourceShape, SourceSpec};
pub use error::{Error, Result};
pub use projection::Projection;
pub use record::{FieldValue, NormalizedRecord};
pub use schema::{ColumnSpec, ColumnType, SqlValue, TableSchema};
