//! Run pipeline stages

use anyhow::{Context, Result};
use strata_core::PipelineConfig;
use strata_runtime::{Command, Pipeline};

/// Execute `command`, optionally against a dataset other than the configured one
pub async fn run(command: Command, dataset: Option<&str>) -> Result<()> {
    let mut config = PipelineConfig::from_env().context("Failed to read configuration")?;
    if let Some(dataset) = dataset {
        config.dataset = dataset.to_string();
    }

    let pipeline = Pipeline::from_config(config)
        .context("Failed to load dataset definition")?;

    tracing::info!(
        "Dataset: {} (collection '{}', table '{}')",
        pipeline.dataset().name,
        pipeline.config().collection(pipeline.dataset()),
        pipeline.dataset().table.name
    );

    let outcomes = pipeline
        .execute(command)
        .await
        .context("Pipeline failed")?;

    for outcome in &outcomes {
        tracing::info!(
            "{} finished: {} records in {:.2?}",
            outcome.stage,
            outcome.count,
            outcome.elapsed
        );
    }

    Ok(())
}
