//! Transform stage: document store to intermediate CSV

use futures::TryStreamExt;
use std::path::PathBuf;
use strata_core::{NormalizedRecord, Projection, table_file};

use crate::error::Result;
use crate::store::DocumentStore;

/// Projects every stored document into one row of the intermediate file
pub struct Transformer<'a> {
    store: &'a dyn DocumentStore,
    projection: &'a Projection,
    output: PathBuf,
}

impl<'a> Transformer<'a> {
    /// Create a transformer writing to `output`
    pub fn new(store: &'a dyn DocumentStore, projection: &'a Projection, output: PathBuf) -> Self {
        Self {
            store,
            projection,
            output,
        }
    }

    /// Run the transformation and return the number of rows written.
    ///
    /// With no documents nothing is written and any previous file is kept.
    pub async fn transform(&self) -> Result<usize> {
        tracing::info!("Starting transform: reading raw documents");

        let mut documents = self.store.scan().await?;
        let mut records: Vec<NormalizedRecord> = Vec::new();
        while let Some(document) = documents.try_next().await? {
            records.push(self.projection.normalize(document.as_json()));
        }

        if records.is_empty() {
            tracing::warn!("No raw documents found, nothing to transform");
            return Ok(0);
        }

        let written = table_file::write_records(&self.output, &records)?;
        tracing::info!(
            "Transform done. Wrote {} rows to {}",
            written,
            self.output.display()
        );
        Ok(written)
    }
}
