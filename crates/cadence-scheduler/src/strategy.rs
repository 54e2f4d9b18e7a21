//! Job expansion strategies.

use crate::context::SchedulingContext;
use crate::naming::{JobNameGenerator, run_instance_name};
use cadence_core::agent::Agent;
use cadence_core::environment::EnvironmentVariable;
use cadence_core::job::{JobInstance, JobInstances, JobPlan};
use cadence_core::pipeline::{JobConfig, RunType};
use cadence_core::{Error, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

pub const GO_JOB_RUN_INDEX: &str = "GO_JOB_RUN_INDEX";
pub const GO_JOB_RUN_COUNT: &str = "GO_JOB_RUN_COUNT";

/// How one job configuration turns into job instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStrategy {
    Single,
    RunOnAllAgents,
    RunMultipleInstances { count: u32 },
}

impl JobStrategy {
    pub fn for_config(job: &JobConfig) -> Self {
        match (job.run_on_all_agents, job.run_instance_count) {
            (true, _) => JobStrategy::RunOnAllAgents,
            (false, Some(count)) if count > 0 => JobStrategy::RunMultipleInstances { count },
            _ => JobStrategy::Single,
        }
    }

    pub fn run_type(&self) -> RunType {
        match self {
            JobStrategy::Single => RunType::Single,
            JobStrategy::RunOnAllAgents => RunType::RunOnAllAgents,
            JobStrategy::RunMultipleInstances { .. } => RunType::RunMultipleInstance,
        }
    }

    /// Expand `job` into instances in `Scheduled`, all built from `plan`.
    pub fn expand(
        &self,
        stage_name: &str,
        job: &JobConfig,
        plan: &JobPlan,
        context: &SchedulingContext,
        now: DateTime<Utc>,
    ) -> Result<JobInstances> {
        let instances = match *self {
            JobStrategy::Single => vec![single_instance(&job.name, plan, now)],
            JobStrategy::RunOnAllAgents => {
                let agents = context.find_agents_matching(&job.resources);
                let mut names = JobNameGenerator::run_on_all(job.name.as_str());
                run_on_all_instances(stage_name, &job.name, plan, &agents, &mut names, now)?
            }
            JobStrategy::RunMultipleInstances { count } => (1..=count)
                .map(|index| run_instance(&job.name, plan, index, count, now))
                .collect(),
        };
        for instance in &instances {
            debug!(stage = %stage_name, job = %instance.name(), "Expanded job instance");
        }
        JobInstances::from_jobs(instances)
    }
}

pub fn single_instance(name: &str, plan: &JobPlan, now: DateTime<Utc>) -> JobInstance {
    JobInstance::scheduled(name, plan.clone(), RunType::Single, now)
}

/// One instance per agent, in the given order, each pre-assigned.
pub fn run_on_all_instances(
    stage_name: &str,
    job_name: &str,
    plan: &JobPlan,
    agents: &[&Agent],
    names: &mut JobNameGenerator,
    now: DateTime<Utc>,
) -> Result<Vec<JobInstance>> {
    if agents.is_empty() {
        return Err(Error::NoMatchingAgents {
            job: job_name.to_string(),
            stage: stage_name.to_string(),
        });
    }
    Ok(agents
        .iter()
        .map(|agent| {
            let mut instance =
                JobInstance::scheduled(names.next_name(), plan.clone(), RunType::RunOnAllAgents, now);
            instance.pre_assign(agent.uuid.clone());
            instance
        })
        .collect())
}

/// Instance `index` of `count`, with the run index and count as its first
/// two variables.
pub fn run_instance(
    job_name: &str,
    plan: &JobPlan,
    index: u32,
    count: u32,
    now: DateTime<Utc>,
) -> JobInstance {
    let mut plan = plan.clone();
    plan.variables.prepend([
        EnvironmentVariable::new(GO_JOB_RUN_INDEX, index.to_string()),
        EnvironmentVariable::new(GO_JOB_RUN_COUNT, count.to_string()),
    ]);
    JobInstance::scheduled(
        run_instance_name(job_name, index),
        plan,
        RunType::RunMultipleInstance,
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::agent::Agents;
    use cadence_core::environment::EnvironmentVariables;
    use cadence_core::job::JobState;
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn context() -> SchedulingContext {
        let agents = Agents::from_agents([
            Agent::new("uuid1").with_resources(["linux"]),
            Agent::new("uuid2").with_resources(["windows"]),
            Agent::new("uuid3").with_resources(["linux", "docker"]),
        ])
        .unwrap();
        SchedulingContext::new("admin", agents)
    }

    #[test]
    fn test_strategy_for_config() {
        assert_eq!(JobStrategy::for_config(&JobConfig::new("a")), JobStrategy::Single);
        assert_eq!(
            JobStrategy::for_config(&JobConfig::new("a").run_instances(0)),
            JobStrategy::Single
        );
        assert_eq!(
            JobStrategy::for_config(&JobConfig::new("a").run_instances(2)),
            JobStrategy::RunMultipleInstances { count: 2 }
        );
        assert_eq!(
            JobStrategy::for_config(&JobConfig::new("a").run_on_all_agents()),
            JobStrategy::RunOnAllAgents
        );
    }

    #[test]
    fn test_strategy_agrees_with_config_run_type() {
        for job in [
            JobConfig::new("a"),
            JobConfig::new("a").run_instances(3),
            JobConfig::new("a").run_on_all_agents(),
        ] {
            assert_eq!(JobStrategy::for_config(&job).run_type(), job.run_type());
        }
    }

    #[test]
    fn test_single_expansion() {
        let job = JobConfig::new("rails");
        let jobs = JobStrategy::Single
            .expand("dev", &job, &JobPlan::default(), &context(), now())
            .unwrap();
        assert_eq!(jobs.names(), vec!["rails"]);
        let rails = jobs.first().unwrap();
        assert_eq!(rails.state(), JobState::Scheduled);
        assert!(rails.agent_uuid().is_none());
        assert!(!rails.is_run_on_all_agents());
    }

    #[test]
    fn test_run_on_all_assigns_matching_agents_in_order() {
        let job = JobConfig::new("foo").with_resources(["linux"]).run_on_all_agents();
        let jobs = JobStrategy::RunOnAllAgents
            .expand("dev", &job, &JobPlan::default(), &context(), now())
            .unwrap();

        assert_eq!(jobs.names(), vec!["foo-runOnAll-1", "foo-runOnAll-2"]);
        let agents: Vec<_> = jobs
            .iter()
            .map(|j| j.agent_uuid().map(|a| a.as_str().to_string()))
            .collect();
        assert_eq!(agents, vec![Some("uuid1".to_string()), Some("uuid3".to_string())]);
        assert!(jobs.iter().all(JobInstance::is_run_on_all_agents));
    }

    #[test]
    fn test_run_on_all_without_agents_fails() {
        let job = JobConfig::new("foo").with_resources(["solaris"]).run_on_all_agents();
        let err = JobStrategy::RunOnAllAgents
            .expand("myStage", &job, &JobPlan::default(), &context(), now())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not find matching agents to run job [foo] of stage [myStage]."
        );
    }

    #[test]
    fn test_run_multiple_prepends_index_and_count() {
        let job = JobConfig::new("rails").run_instances(3);
        let plan = JobPlan {
            variables: EnvironmentVariables::new().with("FOO", "bar"),
            ..JobPlan::default()
        };
        let jobs = JobStrategy::for_config(&job)
            .expand("dev", &job, &plan, &context(), now())
            .unwrap();

        assert_eq!(
            jobs.names(),
            vec!["rails-runInstance-1", "rails-runInstance-2", "rails-runInstance-3"]
        );
        for (position, instance) in jobs.iter().enumerate() {
            let vars = &instance.plan().variables;
            let index = (position + 1).to_string();
            assert_eq!(vars.at(0).map(|v| (v.name.as_str(), v.value.as_str())), Some((GO_JOB_RUN_INDEX, index.as_str())));
            assert_eq!(vars.at(1).map(|v| (v.name.as_str(), v.value.as_str())), Some((GO_JOB_RUN_COUNT, "3")));
            assert_eq!(vars.get("FOO"), Some("bar"));
            assert!(instance.is_run_multiple_instance());
        }
    }
}
