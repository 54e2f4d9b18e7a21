//! Test fixtures for creating sample data.

use cadence_core::agent::{Agent, Agents};
use cadence_core::clock::{Clock, FakeClock};
use cadence_core::ids::JobId;
use cadence_core::job::{JobInstance, JobInstances, JobPlan, JobResult};
use cadence_core::pipeline::{
    ApprovalType, JobConfig, MaterialConfig, MaterialKind, PipelineConfig, RunType, StageConfig,
};
use cadence_core::run::Stage;

/// Factory for creating test agents.
pub struct AgentFixture;

impl AgentFixture {
    pub fn with_resources(uuid: &str, resources: &[&str]) -> Agent {
        Agent::new(uuid)
            .with_host(format!("{uuid}-host"), "127.0.0.1")
            .with_resources(resources)
    }

    pub fn linux(uuid: &str) -> Agent {
        Self::with_resources(uuid, &["linux"])
    }

    pub fn windows(uuid: &str) -> Agent {
        Self::with_resources(uuid, &["windows"])
    }

    /// `uuid1` and `uuid2` tagged `linux`, `uuid3` tagged `windows`.
    pub fn standard_pool() -> Agents {
        Agents::from_agents([Self::linux("uuid1"), Self::linux("uuid2"), Self::windows("uuid3")])
            .expect("fixture agents are unique")
    }
}

/// Factory for creating stage and pipeline configuration.
pub struct StageConfigFixture;

impl StageConfigFixture {
    /// Stage `dev` with plain jobs `rails` and `java`.
    pub fn rails_and_java() -> StageConfig {
        StageConfig::new("dev", vec![JobConfig::new("rails"), JobConfig::new("java")])
    }

    pub fn run_on_all(stage: &str, job: &str, resources: &[&str]) -> StageConfig {
        StageConfig::new(
            stage,
            vec![JobConfig::new(job).with_resources(resources.iter().copied()).run_on_all_agents()],
        )
    }

    pub fn run_multiple(stage: &str, job: &str, count: u32) -> StageConfig {
        StageConfig::new(stage, vec![JobConfig::new(job).run_instances(count)])
    }

    /// Stage `dev` mixing all three strategies: `rails` (single), `foo` (run
    /// on all `linux` agents) and `java` (two instances).
    pub fn mixed() -> StageConfig {
        StageConfig::new(
            "dev",
            vec![
                JobConfig::new("rails"),
                JobConfig::new("foo").with_resources(["linux"]).run_on_all_agents(),
                JobConfig::new("java").run_instances(2),
            ],
        )
    }

    /// Pipeline `cruise` with one git material and the given stages, plus a
    /// manual `deploy` stage at the end.
    pub fn pipeline(stages: Vec<StageConfig>) -> PipelineConfig {
        let mut stages = stages;
        stages.push(
            StageConfig::new("deploy", vec![JobConfig::new("ship")]).with_approval(ApprovalType::Manual),
        );
        PipelineConfig::new("cruise", vec![Self::git_material()], stages)
    }

    pub fn git_material() -> MaterialConfig {
        MaterialConfig::new("main", MaterialKind::Git).with_url("https://example.com/cruise.git")
    }
}

/// Factory for creating job instances outside of a stage.
pub struct JobInstanceFixture;

impl JobInstanceFixture {
    pub fn scheduled(name: &str, clock: &FakeClock) -> JobInstance {
        JobInstance::scheduled(name, JobPlan::default(), RunType::Single, clock.now())
    }

    /// A persisted single job that finished with `result`.
    pub fn completed(name: &str, id: i64, result: JobResult, clock: &FakeClock) -> JobInstance {
        let mut job = Self::scheduled(name, clock);
        job.complete(result, clock.now()).expect("scheduled job can complete");
        job.set_id(JobId::new(id));
        job.transitions_mut().assign_ids(id * 10);
        job
    }
}

/// Factory for creating stage runs directly from job instances.
pub struct StageFixture;

impl StageFixture {
    pub fn with_jobs(name: &str, jobs: Vec<JobInstance>, clock: &FakeClock) -> Stage {
        let jobs = JobInstances::from_jobs(jobs).expect("fixture job names are unique");
        Stage::new(name, jobs, "admin", ApprovalType::Success, "md5-fixture", clock.now())
    }

    /// Stage `dev` where `rails` (id 1) and `java` (id 2) both passed.
    pub fn passed_rails_and_java(clock: &FakeClock) -> Stage {
        Self::with_jobs(
            "dev",
            vec![
                JobInstanceFixture::completed("rails", 1, JobResult::Passed, clock),
                JobInstanceFixture::completed("java", 2, JobResult::Passed, clock),
            ],
            clock,
        )
    }
}
