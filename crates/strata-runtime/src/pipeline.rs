//! Pipeline orchestration
//!
//! Maps a command to an ordered list of stages and runs them one after the
//! other. The first failing stage aborts the run.

use sqlx::Connection;
use std::fmt;
use std::time::{Duration, Instant};
use strata_core::{DatasetSpec, PipelineConfig};
use tokio::sync::OnceCell;

use crate::connections;
use crate::error::Result;
use crate::extract::Extractor;
use crate::load::Loader;
use crate::source::HttpSource;
use crate::store::MongoStore;
use crate::transform::Transformer;

/// One pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// API to document store
    Extract,
    /// Document store to intermediate file
    Transform,
    /// Intermediate file to relational table
    Load,
}

impl Stage {
    /// Lowercase stage name
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Transform => "transform",
            Stage::Load => "load",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A user command: a single stage or the full run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Run one stage
    Stage(Stage),
    /// Run extract, transform and load in order
    Run,
}

impl Command {
    /// Stages executed by this command, in order
    pub fn stages(&self) -> &'static [Stage] {
        match self {
            Command::Stage(Stage::Extract) => &[Stage::Extract],
            Command::Stage(Stage::Transform) => &[Stage::Transform],
            Command::Stage(Stage::Load) => &[Stage::Load],
            Command::Run => &[Stage::Extract, Stage::Transform, Stage::Load],
        }
    }
}

/// Result of one completed stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    /// Which stage ran
    pub stage: Stage,
    /// Documents upserted, rows written or rows loaded
    pub count: usize,
    /// Wall-clock duration
    pub elapsed: Duration,
}

/// Runs stages for one dataset with one configuration
pub struct Pipeline {
    config: PipelineConfig,
    dataset: DatasetSpec,
    documents: OnceCell<MongoStore>,
}

impl Pipeline {
    /// Create a pipeline; no connection is opened until a stage needs it
    pub fn new(config: PipelineConfig, dataset: DatasetSpec) -> Self {
        Self {
            config,
            dataset,
            documents: OnceCell::new(),
        }
    }

    /// Create a pipeline for the dataset named in `config`
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let dataset = config.load_dataset()?;
        Ok(Self::new(config, dataset))
    }

    /// Active configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Active dataset
    pub fn dataset(&self) -> &DatasetSpec {
        &self.dataset
    }

    async fn documents(&self) -> Result<&MongoStore> {
        self.documents
            .get_or_try_init(|| {
                connections::document_store(&self.config, self.config.collection(&self.dataset))
            })
            .await
    }

    /// Fetch entities into the document store
    pub async fn extract(&self) -> Result<usize> {
        let source = HttpSource::new(
            self.config.base_url(&self.dataset),
            self.config.request_timeout,
        )?;
        let store = self.documents().await?;
        Extractor::new(source, store, &self.dataset, self.config.fetch_limit)
            .extract()
            .await
    }

    /// Project stored documents into the intermediate file
    pub async fn transform(&self) -> Result<usize> {
        let store = self.documents().await?;
        Transformer::new(store, &self.dataset.fields, self.config.output_path(&self.dataset))
            .transform()
            .await
    }

    /// Upsert the intermediate file into the target table
    pub async fn load(&self) -> Result<usize> {
        let mut conn = connections::relational_store(&self.config).await?;
        let result = Loader::new(&self.dataset.table, self.config.output_path(&self.dataset))
            .load(&mut conn)
            .await;

        if let Err(e) = conn.close().await {
            tracing::debug!("Error closing database connection: {}", e);
        }
        result
    }

    /// Run a single stage
    pub async fn run_stage(&self, stage: Stage) -> Result<StageOutcome> {
        let started = Instant::now();
        let count = match stage {
            Stage::Extract => self.extract().await,
            Stage::Transform => self.transform().await,
            Stage::Load => self.load().await,
        }?;

        Ok(StageOutcome {
            stage,
            count,
            elapsed: started.elapsed(),
        })
    }

    /// Run every stage of `command` in order, stopping at the first failure
    pub async fn execute(&self, command: Command) -> Result<Vec<StageOutcome>> {
        let mut outcomes = Vec::new();
        for &stage in command.stages() {
            tracing::debug!("Running {} stage for dataset '{}'", stage, self.dataset.name);
            let outcome = self.run_stage(stage).await.inspect_err(|e| {
                tracing::error!("{} stage failed: {}", stage, e);
            })?;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }
}

impl From<Stage> for Command {
    fn from(stage: Stage) -> Self {
        Command::Stage(stage)
    }
}
