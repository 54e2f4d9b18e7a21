//! Rerun of selected jobs of a completed stage.
//!
//! Jobs that are not selected are copied with their terminal result. Selected
//! jobs are re-expanded against the current configuration and take the place
//! of the instances they replace.

use crate::context::SchedulingContext;
use crate::factory::InstanceFactory;
use crate::naming::{JobNameGenerator, parse_instance_name};
use crate::strategy::{run_instance, run_on_all_instances, single_instance};
use cadence_core::agent::Agent;
use cadence_core::job::{JobInstance, JobInstances};
use cadence_core::pipeline::{JobConfig, PipelineConfig, RunType, StageConfig};
use cadence_core::run::Stage;
use cadence_core::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::info;

/// Configured job name an instance was expanded from.
fn base_name(job: &JobInstance) -> String {
    parse_instance_name(job.name(), job.run_type()).base
}

fn instance_index(job: &JobInstance) -> Option<u32> {
    parse_instance_name(job.name(), job.run_type()).index
}

/// Grouping key matching the ASCII case-insensitive lookups of
/// `StageConfig::job` and `JobInstances::by_name`.
fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

fn strategy_changed(job_name: &str, now: RunType) -> Error {
    Error::CannotRerunJob {
        job_name: job_name.to_string(),
        information: format!(
            "Run configuration for job has been changed to '{}'.",
            now.description()
        ),
    }
}

/// Mark the old instances named by `requested`. A name selects either one
/// instance exactly or every instance expanded from that configured job.
fn resolve_selection<S: AsRef<str>>(stage: &Stage, requested: &[S]) -> Result<Vec<bool>> {
    if requested.is_empty() {
        return Err(Error::InvalidArgument("No job was selected to re-run.".to_string()));
    }
    let mut selected = vec![false; stage.jobs.len()];
    for name in requested {
        let name = name.as_ref();
        let exact = stage
            .jobs
            .iter()
            .position(|job| job.name().eq_ignore_ascii_case(name));
        if let Some(position) = exact {
            selected[position] = true;
            continue;
        }
        let mut matched = false;
        for (position, job) in stage.jobs.iter().enumerate() {
            if base_name(job).eq_ignore_ascii_case(name) {
                selected[position] = true;
                matched = true;
            }
        }
        if !matched {
            return Err(Error::InvalidArgument(format!(
                "Job '{}' does not exist in stage '{}'.",
                name, stage.name
            )));
        }
    }
    Ok(selected)
}

/// Replacement instances for the selected instances of one configured job.
struct Replacement {
    jobs: Vec<JobInstance>,
    /// Emitted as one block at the first selected position rather than
    /// one-for-one.
    contiguous: bool,
}

impl InstanceFactory {
    /// Create a new stage that reruns `job_names` of `old_stage`.
    ///
    /// Fails without producing a stage when the old stage is still running,
    /// a name is unknown, a selected job's configuration is gone or its run
    /// configuration changed, or a run-on-all job finds no agents.
    pub fn create_stage_for_rerun_of_jobs<S: AsRef<str>>(
        &self,
        old_stage: &Stage,
        job_names: &[S],
        context: &SchedulingContext,
        stage_config: &StageConfig,
        config_version: &str,
    ) -> Result<Stage> {
        if !old_stage.is_completed() {
            return Err(Error::InvalidArgument(format!(
                "Stage [{}] is still in progress; only completed stages can be rerun.",
                old_stage.name
            )));
        }
        let selected = resolve_selection(old_stage, job_names)?;
        let context = context
            .permitting_rerun()
            .override_environment_variables(&stage_config.variables);
        let now = self.clock.now();

        // Selected instances grouped by configured job, in stage order.
        let mut groups: Vec<(String, Vec<&JobInstance>)> = Vec::new();
        for (job, _) in old_stage.jobs.iter().zip(&selected).filter(|(_, s)| **s) {
            let base = base_name(job);
            match groups.iter_mut().find(|(b, _)| key(b) == key(&base)) {
                Some((_, instances)) => instances.push(job),
                None => groups.push((base, vec![job])),
            }
        }

        let mut replacements: HashMap<String, Replacement> = HashMap::new();
        for (base, instances) in &groups {
            let config = stage_config
                .job(base)
                .ok_or_else(|| Error::job_config_missing(base.as_str()))?;
            let replacement =
                self.rerun_instances(old_stage, base, instances, config, &context, now)?;
            replacements.insert(key(base), replacement);
        }

        let mut jobs = JobInstances::new();
        for (job, is_selected) in old_stage.jobs.iter().zip(&selected) {
            if !*is_selected {
                let mut copy = job.copy_for_rerun();
                let still_run_on_all = stage_config
                    .job(&base_name(job))
                    .is_none_or(|config| config.run_type() == RunType::RunOnAllAgents);
                if job.is_run_on_all_agents() && !still_run_on_all {
                    copy.clear_agent();
                }
                jobs.add(copy)?;
                continue;
            }
            let Some(replacement) = replacements.get_mut(&key(&base_name(job))) else {
                continue;
            };
            if replacement.contiguous {
                for instance in replacement.jobs.drain(..) {
                    jobs.add(instance)?;
                }
            } else if !replacement.jobs.is_empty() {
                jobs.add(replacement.jobs.remove(0))?;
            }
        }

        let mut stage = Stage::new(
            old_stage.name.as_str(),
            jobs,
            context.approved_by(),
            old_stage.approval_type,
            config_version,
            now,
        );
        stage.counter = old_stage.counter + 1;
        stage.rerun_of_counter = old_stage.rerun_of_counter.or(Some(old_stage.counter));
        stage.fetch_materials = old_stage.fetch_materials;
        stage.clean_working_dir = old_stage.clean_working_dir;

        info!(
            stage = %stage.name,
            rerun_of = ?stage.rerun_of_counter,
            jobs = ?groups.iter().map(|(base, _)| base.as_str()).collect::<Vec<_>>(),
            "Created stage for rerun of jobs"
        );
        Ok(stage)
    }

    /// Rerun `job_names` of `old_stage` against stage `stage_name` of
    /// `pipeline`, with the pipeline's variables layered under the stage's.
    pub fn create_stage_for_rerun_of_jobs_in<S: AsRef<str>>(
        &self,
        pipeline: &PipelineConfig,
        old_stage: &Stage,
        stage_name: &str,
        job_names: &[S],
        context: &SchedulingContext,
        config_version: &str,
    ) -> Result<Stage> {
        let stage_config = pipeline.stage(stage_name).ok_or_else(|| Error::StageNotFound {
            stage: stage_name.to_string(),
            pipeline: pipeline.name.clone(),
        })?;
        let context = context
            .for_pipeline(pipeline.name.as_str())
            .override_environment_variables(&pipeline.variables);
        self.create_stage_for_rerun_of_jobs(old_stage, job_names, &context, stage_config, config_version)
    }

    fn rerun_instances(
        &self,
        old_stage: &Stage,
        base: &str,
        selected: &[&JobInstance],
        config: &JobConfig,
        context: &SchedulingContext,
        now: DateTime<Utc>,
    ) -> Result<Replacement> {
        let previous = selected
            .first()
            .map(|job| job.run_type())
            .unwrap_or_default();
        let current = config.run_type();
        let plan = self.create_job_plan(&old_stage.name, config, context);

        let mut jobs = match (previous, current) {
            (RunType::Single, RunType::Single) => vec![single_instance(base, &plan, now)],
            (RunType::RunOnAllAgents, RunType::Single) => {
                let [only] = selected else {
                    return Err(Error::InvalidArgument(format!(
                        "Cannot schedule multiple instances of job named '{base}'."
                    )));
                };
                let mut instance = single_instance(base, &plan, now);
                if let Some(agent) = only.agent_uuid() {
                    instance.pre_assign(agent.clone());
                }
                vec![instance]
            }
            (RunType::RunOnAllAgents, RunType::RunOnAllAgents) => {
                let siblings: Vec<&JobInstance> = old_stage
                    .jobs
                    .iter()
                    .filter(|job| job.is_run_on_all_agents() && key(&base_name(job)) == key(base))
                    .collect();
                let busy: Vec<_> = siblings
                    .iter()
                    .filter(|job| !selected.iter().any(|s| s.name() == job.name()))
                    .filter_map(|job| job.agent_uuid())
                    .collect();
                let candidates: Vec<&Agent> = context
                    .find_agents_matching(&config.resources)
                    .into_iter()
                    .filter(|agent| !busy.contains(&&agent.uuid))
                    .collect();
                let highest = siblings.iter().filter_map(|job| instance_index(job)).max().unwrap_or(0);
                let mut names = JobNameGenerator::run_on_all(base).starting_after(highest);
                run_on_all_instances(&old_stage.name, base, &plan, &candidates, &mut names, now)?
            }
            (RunType::RunMultipleInstance, RunType::RunMultipleInstance) => {
                let count = config.run_instance_count.unwrap_or(1);
                let mut jobs = Vec::with_capacity(selected.len());
                for job in selected {
                    let index = instance_index(job).unwrap_or(1);
                    if index > count {
                        return Err(Error::CannotRerunJob {
                            job_name: job.name().to_string(),
                            information: format!(
                                "Run instance count for job has been changed to {count}."
                            ),
                        });
                    }
                    jobs.push(run_instance(base, &plan, index, count, now));
                }
                jobs
            }
            (_, current) => return Err(strategy_changed(base, current)),
        };

        if context.is_rerun() {
            for job in &mut jobs {
                job.mark_as_rerun();
            }
        }
        Ok(Replacement {
            contiguous: previous == RunType::RunOnAllAgents && current == RunType::RunOnAllAgents,
            jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::agent::Agents;
    use cadence_core::clock::{Clock, FakeClock};
    use cadence_core::ids::{AgentUuid, JobId};
    use cadence_core::environment::EnvironmentVariables;
    use cadence_core::job::{JobResult, JobState};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn factory(clock: &FakeClock) -> InstanceFactory {
        InstanceFactory::new(Arc::new(clock.clone()))
    }

    fn agents() -> Agents {
        Agents::from_agents([
            Agent::new("uuid1").with_resources(["linux"]),
            Agent::new("uuid2").with_resources(["linux"]),
        ])
        .unwrap()
    }

    /// Instantiate `config`, pass every job and give it persisted ids.
    fn completed_stage(clock: &FakeClock, config: &StageConfig, context: &SchedulingContext) -> Stage {
        let mut stage = factory(clock).create_stage_instance(config, context, "md5-1").unwrap();
        for (offset, job) in stage.jobs.iter_mut().enumerate() {
            job.complete(JobResult::Passed, clock.now()).unwrap();
            job.set_id(JobId::new(100 + offset as i64));
        }
        stage
    }

    #[test]
    fn test_rerun_single_job_copies_the_rest() {
        let clock = FakeClock::default();
        let config = StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")]);
        let context = SchedulingContext::new("admin", agents());
        let old = completed_stage(&clock, &config, &context);

        let stage = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["rails"], &context, &config, "md5-2")
            .unwrap();

        assert_eq!(stage.jobs.names(), vec!["rails", "java"]);
        let rails = stage.job("rails").unwrap();
        assert!(rails.is_rerun());
        assert_eq!(rails.state(), JobState::Scheduled);
        assert_eq!(rails.result(), JobResult::Unknown);
        assert_eq!(rails.id(), JobId::UNSAVED);

        let java = stage.job("java").unwrap();
        assert!(java.is_copy());
        assert_eq!(java.result(), JobResult::Passed);
        assert_eq!(java.original_job_id(), Some(JobId::new(101)));

        assert_eq!(stage.counter, 2);
        assert_eq!(stage.rerun_of_counter, Some(1));
        assert_eq!(stage.config_version, "md5-2");
    }

    #[test]
    fn test_rerun_of_running_stage_is_rejected() {
        let clock = FakeClock::default();
        let config = StageConfig::new("dev", vec![JobConfig::new("rails")]);
        let context = SchedulingContext::new("admin", agents());
        let running = factory(&clock).create_stage_instance(&config, &context, "md5").unwrap();

        let err = factory(&clock)
            .create_stage_for_rerun_of_jobs(&running, &["rails"], &context, &config, "md5")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_unknown_and_empty_selection_are_rejected() {
        let clock = FakeClock::default();
        let config = StageConfig::new("dev", vec![JobConfig::new("rails")]);
        let context = SchedulingContext::new("admin", agents());
        let old = completed_stage(&clock, &config, &context);

        let err = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["ruby"], &context, &config, "md5")
            .unwrap_err();
        assert_eq!(err.to_string(), "Job 'ruby' does not exist in stage 'dev'.");

        let none: [&str; 0] = [];
        let err = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &none, &context, &config, "md5")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_run_on_all_rerun_skips_agents_of_copied_siblings() {
        let clock = FakeClock::default();
        let config = StageConfig::new(
            "dev",
            vec![JobConfig::new("rails").with_resources(["linux"]).run_on_all_agents()],
        );
        let context = SchedulingContext::new("admin", agents());
        let old = completed_stage(&clock, &config, &context);

        let stage = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["rails-runOnAll-1"], &context, &config, "md5")
            .unwrap();

        assert_eq!(stage.jobs.names(), vec!["rails-runOnAll-3", "rails-runOnAll-2"]);
        let rerun = stage.job("rails-runOnAll-3").unwrap();
        assert!(rerun.is_rerun());
        assert_eq!(rerun.agent_uuid(), Some(&AgentUuid::new("uuid1")));
        assert!(stage.job("rails-runOnAll-2").unwrap().is_copy());
    }

    #[test]
    fn test_run_on_all_to_single_keeps_agent() {
        let clock = FakeClock::default();
        let before = StageConfig::new(
            "dev",
            vec![JobConfig::new("rails").with_resources(["linux"]).run_on_all_agents()],
        );
        let context = SchedulingContext::new("admin", agents());
        let old = completed_stage(&clock, &before, &context);
        let after = StageConfig::new("dev", vec![JobConfig::new("rails")]);

        let stage = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["rails-runOnAll-2"], &context, &after, "md5")
            .unwrap();
        assert_eq!(stage.jobs.names(), vec!["rails-runOnAll-1", "rails"]);
        let rails = stage.job("rails").unwrap();
        assert!(rails.is_rerun());
        assert!(!rails.is_run_on_all_agents());
        assert_eq!(rails.agent_uuid(), Some(&AgentUuid::new("uuid2")));
        let copy = stage.job("rails-runOnAll-1").unwrap();
        assert!(copy.agent_uuid().is_none());

        let err = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["rails"], &context, &after, "md5")
            .unwrap_err();
        assert_eq!(err.to_string(), "Cannot schedule multiple instances of job named 'rails'.");
    }

    #[test]
    fn test_run_multiple_rerun_keeps_index() {
        let clock = FakeClock::default();
        let config = StageConfig::new("dev", vec![JobConfig::new("rails").run_instances(3)]);
        let context = SchedulingContext::new("admin", agents());
        let old = completed_stage(&clock, &config, &context);

        let stage = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["rails-runInstance-2"], &context, &config, "md5")
            .unwrap();

        assert_eq!(
            stage.jobs.names(),
            vec!["rails-runInstance-1", "rails-runInstance-2", "rails-runInstance-3"]
        );
        let rerun = stage.job("rails-runInstance-2").unwrap();
        assert!(rerun.is_rerun());
        assert_eq!(rerun.plan().variables.get("GO_JOB_RUN_INDEX"), Some("2"));
        assert_eq!(rerun.plan().variables.get("GO_JOB_RUN_COUNT"), Some("3"));
        assert!(stage.job("rails-runInstance-1").unwrap().is_copy());
    }

    #[test]
    fn test_run_multiple_rerun_of_dropped_index_is_rejected() {
        let clock = FakeClock::default();
        let before = StageConfig::new("dev", vec![JobConfig::new("rails").run_instances(3)]);
        let context = SchedulingContext::new("admin", agents());
        let old = completed_stage(&clock, &before, &context);
        let after = StageConfig::new("dev", vec![JobConfig::new("rails").run_instances(2)]);

        let err = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["rails-runInstance-3"], &context, &after, "md5")
            .unwrap_err();
        assert!(matches!(err, Error::CannotRerunJob { job_name, .. } if job_name == "rails-runInstance-3"));
    }

    #[test]
    fn test_rerun_in_pipeline_layers_pipeline_variables() {
        let clock = FakeClock::default();
        let mut stage_config = StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")]);
        stage_config.variables = EnvironmentVariables::new().with("STAGE_WINS", "stage");
        let mut pipeline = PipelineConfig::new("cruise", vec![], vec![stage_config]);
        pipeline.variables = EnvironmentVariables::new()
            .with("DEPLOY_ENV", "prod")
            .with("STAGE_WINS", "pipeline");
        let context = SchedulingContext::new("admin", agents());
        let old = {
            let mut stage = factory(&clock)
                .create_stage_instance_for(&pipeline, "dev", &context, "md5-1")
                .unwrap();
            for job in stage.jobs.iter_mut() {
                job.complete(JobResult::Passed, clock.now()).unwrap();
            }
            stage
        };
        let fresh = old.job("rails").unwrap().plan().variables.clone();

        let stage = factory(&clock)
            .create_stage_for_rerun_of_jobs_in(&pipeline, &old, "DEV", &["rails"], &context, "md5-2")
            .unwrap();

        let rails = stage.job("rails").unwrap();
        assert!(rails.is_rerun());
        assert_eq!(rails.plan().variables, fresh);
        assert_eq!(rails.plan().variables.get("DEPLOY_ENV"), Some("prod"));
        assert_eq!(rails.plan().variables.get("STAGE_WINS"), Some("stage"));
        assert_eq!(rails.plan().identifier.pipeline_name.as_deref(), Some("cruise"));

        let err = factory(&clock)
            .create_stage_for_rerun_of_jobs_in(&pipeline, &old, "qa", &["rails"], &context, "md5-2")
            .unwrap_err();
        assert_eq!(err.to_string(), "Stage 'qa' not found in pipeline 'cruise'");
    }

    #[test]
    fn test_jobs_differing_outside_ascii_case_are_grouped_apart() {
        let clock = FakeClock::default();
        let config = StageConfig::new("dev", vec![JobConfig::new("Äpfel"), JobConfig::new("äpfel")]);
        let context = SchedulingContext::new("admin", agents());
        let old = completed_stage(&clock, &config, &context);

        let stage = factory(&clock)
            .create_stage_for_rerun_of_jobs(&old, &["Äpfel", "äpfel"], &context, &config, "md5-2")
            .unwrap();

        assert_eq!(stage.jobs.names(), vec!["Äpfel", "äpfel"]);
        assert!(stage.jobs.iter().all(|job| job.is_rerun()));
    }
}
