//! Test context providing a deterministic factory and agent pool.

use crate::fixtures::AgentFixture;
use crate::helpers;
use cadence_core::agent::Agents;
use cadence_core::clock::{Clock, FakeClock};
use cadence_core::job::JobResult;
use cadence_core::pipeline::StageConfig;
use cadence_core::run::Stage;
use cadence_scheduler::{InstanceFactory, SchedulingContext};
use std::sync::Arc;

/// A fake clock, a factory bound to it, an agent pool and an id sequence
/// standing in for the persistence layer.
pub struct TestContext {
    pub clock: FakeClock,
    pub factory: InstanceFactory,
    pub agents: Agents,
    next_id: i64,
}

impl TestContext {
    /// Context over [`AgentFixture::standard_pool`].
    pub fn new() -> Self {
        Self::with_agents(AgentFixture::standard_pool())
    }

    pub fn with_agents(agents: Agents) -> Self {
        crate::init_test_logging();

        let clock = FakeClock::default();
        Self {
            factory: InstanceFactory::new(Arc::new(clock.clone())),
            clock,
            agents,
            next_id: 1,
        }
    }

    pub fn scheduling_context(&self) -> SchedulingContext {
        SchedulingContext::new("admin", self.agents.clone())
    }

    pub fn now(&self) -> chrono::DateTime<chrono::Utc> {
        self.clock.now()
    }

    /// Instantiate `config` and persist the result.
    pub fn scheduled_stage(&mut self, config: &StageConfig) -> Stage {
        let mut stage = self
            .factory
            .create_stage_instance(config, &self.scheduling_context(), "md5-1")
            .expect("stage instantiates");
        self.persist(&mut stage);
        stage
    }

    /// Instantiate `config`, pass every job and persist the result.
    pub fn completed_stage(&mut self, config: &StageConfig) -> Stage {
        let mut stage = self.scheduled_stage(config);
        self.clock.advance(chrono::Duration::minutes(5));
        helpers::complete_all(&mut stage, JobResult::Passed, self.clock.now());
        self.persist(&mut stage);
        stage
    }

    /// Assign ids to everything in `stage` not persisted yet.
    pub fn persist(&mut self, stage: &mut Stage) {
        helpers::persist(stage, &mut self.next_id);
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
