//! Strata Runtime
//!
//! This crate runs the three Strata stages against real stores.
//!
//! # Features
//!
//! - HTTP extraction into a MongoDB collection, upserted by natural key
//! - Projection of stored documents into the intermediate CSV file
//! - Transactional PostgreSQL upsert with schema creation and column migration
//!
//! # Usage
//!
//! ```rust,ignore
//! use strata_core::PipelineConfig;
//! use strata_runtime::{Command, Pipeline};
//!
//! let pipeline = Pipeline::from_config(PipelineConfig::from_env()?)?;
//! for outcome in pipeline.execute(Command::Run).await? {
//!     println!("{}: {}", outcome.stage, outcome.count);
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod connections;
pub mod error;
pub mod extract;
pub mod load;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod transform;

pub use error::{Error, Result};
pub use pipeline::{Command, Pipeline, Stage, StageOutcome};
pub use store::{DocumentStore, MongoStore, RawDocument};
