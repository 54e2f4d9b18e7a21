//! Command handlers.

use crate::config::OutputFormat;
use anyhow::Context;
use cadence_core::agent::Agents;
use cadence_core::build_cause::{BuildCause, MaterialRevisions, Username};
use cadence_core::clock::SystemClock;
use cadence_core::pipeline::PipelineConfig;
use cadence_core::run::{Pipeline, Stage};
use cadence_scheduler::{InstanceFactory, SchedulingContext};
use console::style;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Read a YAML or JSON document.
pub async fn read_document<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    debug!(path = %path.display(), "Reading document");
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let document = if is_json {
        serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))?
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("Invalid YAML in {}", path.display()))?
    };
    Ok(document)
}

async fn read_agents(path: Option<&Path>) -> anyhow::Result<Agents> {
    match path {
        Some(path) => read_document(path).await,
        None => Ok(Agents::new()),
    }
}

fn factory() -> InstanceFactory {
    InstanceFactory::new(Arc::new(SystemClock))
}

pub fn render<T: Serialize>(format: OutputFormat, value: &T) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

/// Instantiate the whole pipeline: first stage only, counter 1.
pub fn plan_pipeline(
    config: &PipelineConfig,
    cause: Option<BuildCause>,
    context: &SchedulingContext,
) -> anyhow::Result<Pipeline> {
    let cause = match cause {
        Some(cause) => cause,
        None => BuildCause::manual_forced(
            MaterialRevisions::default(),
            Some(Username::new(context.approved_by())),
        )?,
    };
    let mut pipeline =
        factory().create_pipeline_instance(config, cause, context, &config.fingerprint())?;
    pipeline.update_counter(1);
    Ok(pipeline)
}

pub fn plan_stage(
    config: &PipelineConfig,
    stage: &str,
    context: &SchedulingContext,
) -> anyhow::Result<Stage> {
    Ok(factory().create_stage_instance_for(config, stage, context, &config.fingerprint())?)
}

pub fn rerun_stage<S: AsRef<str>>(
    old_stage: &Stage,
    config: &PipelineConfig,
    stage_name: &str,
    jobs: &[S],
    context: &SchedulingContext,
) -> anyhow::Result<Stage> {
    Ok(factory().create_stage_for_rerun_of_jobs_in(
        config,
        old_stage,
        stage_name,
        jobs,
        context,
        &config.fingerprint(),
    )?)
}

pub async fn plan(
    format: OutputFormat,
    pipeline_path: &Path,
    agents: Option<&Path>,
    stage: Option<&str>,
    user: &str,
    cause: Option<&Path>,
) -> anyhow::Result<()> {
    let config: PipelineConfig = read_document(pipeline_path).await?;
    let context = SchedulingContext::new(user, read_agents(agents).await?);

    let output = match stage {
        Some(stage) => {
            let stage = plan_stage(&config, stage, &context)?;
            eprintln!(
                "{} Stage {} with {} jobs",
                style("✓").green(),
                style(&stage.name).bold(),
                stage.jobs.len()
            );
            render(format, &stage)?
        }
        None => {
            let cause = match cause {
                Some(path) => Some(read_document::<BuildCause>(path).await?),
                None => None,
            };
            let pipeline = plan_pipeline(&config, cause, &context)?;
            eprintln!(
                "{} Pipeline {} ({})",
                style("✓").green(),
                style(&pipeline.name).bold(),
                pipeline.build_cause.build_cause_message()
            );
            render(format, &pipeline)?
        }
    };
    println!("{output}");
    Ok(())
}

pub async fn rerun(
    format: OutputFormat,
    stage_path: &Path,
    pipeline_path: &Path,
    stage_name: Option<&str>,
    jobs: &[String],
    agents: Option<&Path>,
    user: &str,
) -> anyhow::Result<()> {
    let old_stage: Stage = read_document(stage_path).await?;
    let config: PipelineConfig = read_document(pipeline_path).await?;
    let context = SchedulingContext::new(user, read_agents(agents).await?);
    let stage_name = stage_name.unwrap_or(old_stage.name.as_str());

    let stage = rerun_stage(&old_stage, &config, stage_name, jobs, &context)?;
    eprintln!(
        "{} Rerun of {} (counter {}, rerun of {})",
        style("✓").green(),
        style(&stage.name).bold(),
        stage.counter,
        stage.rerun_of_counter.unwrap_or(old_stage.counter)
    );
    println!("{}", render(format, &stage)?);
    Ok(())
}

pub async fn fingerprint(pipeline_path: &Path) -> anyhow::Result<()> {
    let config: PipelineConfig = read_document(pipeline_path).await?;
    println!("{}", config.fingerprint());
    Ok(())
}

pub fn schema() -> anyhow::Result<()> {
    let schema = schemars::schema_for!(PipelineConfig);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}
