//! Instantiation of pipelines, stages and jobs from configuration.

use crate::context::SchedulingContext;
use crate::strategy::JobStrategy;
use cadence_core::build_cause::BuildCause;
use cadence_core::clock::Clock;
use cadence_core::job::{ArtifactPlan, JobIdentifier, JobInstances, JobPlan};
use cadence_core::pipeline::{JobConfig, PipelineConfig, StageConfig};
use cadence_core::run::{Pipeline, Stage};
use cadence_core::{Error, Result};
use std::sync::Arc;
use tracing::{info, warn};

/// Creates stage and pipeline instances. All timestamps come from the
/// injected clock.
#[derive(Clone)]
pub struct InstanceFactory {
    pub(crate) clock: Arc<dyn Clock>,
}

impl InstanceFactory {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Build the execution plan of `job`; job variables win over the context.
    pub fn create_job_plan(
        &self,
        stage_name: &str,
        job: &JobConfig,
        context: &SchedulingContext,
    ) -> JobPlan {
        let elastic_profile = job.elastic_profile_id.as_deref().and_then(|id| {
            let profile = context.elastic_profile(id);
            if profile.is_none() {
                warn!(job = %job.name, profile = %id, "Elastic profile not found, scheduling without it");
            }
            profile.cloned()
        });
        let cluster_profile = elastic_profile.as_ref().and_then(|elastic| {
            let cluster = context.cluster_profile(&elastic.cluster_profile_id);
            if cluster.is_none() {
                warn!(
                    job = %job.name,
                    cluster = %elastic.cluster_profile_id,
                    "Cluster profile not found"
                );
            }
            cluster.cloned()
        });

        JobPlan {
            identifier: JobIdentifier {
                pipeline_name: context.pipeline_name().map(str::to_string),
                stage_name: stage_name.to_string(),
                job_name: job.name.clone(),
                ..JobIdentifier::default()
            },
            resources: job.resources.clone(),
            artifact_plans: job.artifacts.iter().map(ArtifactPlan::from).collect(),
            variables: context.variables().overridden_by(&job.variables),
            elastic_profile,
            cluster_profile,
            timeout_minutes: job.timeout_minutes,
        }
    }

    pub fn create_job_instances(
        &self,
        stage_name: &str,
        job: &JobConfig,
        context: &SchedulingContext,
    ) -> Result<JobInstances> {
        let plan = self.create_job_plan(stage_name, job, context);
        JobStrategy::for_config(job).expand(stage_name, job, &plan, context, self.clock.now())
    }

    /// Instantiate every job of `stage` in configuration order.
    pub fn create_stage_instance(
        &self,
        stage: &StageConfig,
        context: &SchedulingContext,
        config_version: &str,
    ) -> Result<Stage> {
        let context = context.override_environment_variables(&stage.variables);
        let mut jobs = JobInstances::new();
        for job in &stage.jobs {
            jobs.append(self.create_job_instances(&stage.name, job, &context)?)?;
        }

        let mut instance = Stage::new(
            stage.name.as_str(),
            jobs,
            context.approved_by(),
            stage.approval,
            config_version,
            self.clock.now(),
        );
        instance.fetch_materials = stage.fetch_materials;
        instance.clean_working_dir = stage.clean_working_dir;

        info!(
            stage = %instance.name,
            jobs = instance.jobs.len(),
            approved_by = %instance.approved_by,
            "Instantiated stage"
        );
        Ok(instance)
    }

    pub fn create_stage_instance_for(
        &self,
        pipeline: &PipelineConfig,
        stage_name: &str,
        context: &SchedulingContext,
        config_version: &str,
    ) -> Result<Stage> {
        let stage = pipeline.stage(stage_name).ok_or_else(|| Error::StageNotFound {
            stage: stage_name.to_string(),
            pipeline: pipeline.name.clone(),
        })?;
        let context = context
            .for_pipeline(pipeline.name.as_str())
            .override_environment_variables(&pipeline.variables);
        self.create_stage_instance(stage, &context, config_version)
    }

    /// Instantiate a pipeline run with its first stage only.
    ///
    /// Variables layer as pipeline < build cause < stage < job.
    pub fn create_pipeline_instance(
        &self,
        pipeline: &PipelineConfig,
        build_cause: BuildCause,
        context: &SchedulingContext,
        config_version: &str,
    ) -> Result<Pipeline> {
        build_cause.assert_pipeline_config_matches(pipeline)?;
        let first = pipeline.first_stage().ok_or_else(|| {
            Error::InvalidArgument(format!("Pipeline '{}' has no stages.", pipeline.name))
        })?;

        let variables = pipeline.variables.overridden_by(build_cause.variables());
        let context = context
            .for_pipeline(pipeline.name.as_str())
            .override_environment_variables(&variables);
        let stage = self.create_stage_instance(first, &context, config_version)?;

        info!(
            pipeline = %pipeline.name,
            cause = %build_cause.build_cause_message(),
            "Instantiated pipeline"
        );
        Ok(Pipeline::new(pipeline.name.as_str(), build_cause, vec![stage])
            .with_label_template(pipeline.label_template.as_str())
            .with_variables(variables))
    }
}

impl std::fmt::Debug for InstanceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceFactory").finish_non_exhaustive()
    }
}
