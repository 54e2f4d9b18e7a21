//! Job instances and their lifecycle state machine.

use crate::elastic::{ClusterProfile, ElasticProfile};
use crate::environment::EnvironmentVariables;
use crate::ids::{AgentUuid, JobId, TransitionId};
use crate::pipeline::{ArtifactConfig, ArtifactKind, RunType};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a job instance.
///
/// The main line is `Scheduled → Assigned → Preparing → Building → Completing
/// → Completed`. `Discontinued` and `Rescheduled` end the lifecycle early;
/// `Paused` can be entered from any live state and resumed into the main line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    Scheduled,
    Assigned,
    Preparing,
    Building,
    Completing,
    Completed,
    Discontinued,
    Paused,
    Rescheduled,
}

impl JobState {
    fn main_line_position(&self) -> Option<u8> {
        match self {
            JobState::Scheduled => Some(0),
            JobState::Assigned => Some(1),
            JobState::Preparing => Some(2),
            JobState::Building => Some(3),
            JobState::Completing => Some(4),
            JobState::Completed => Some(5),
            JobState::Discontinued | JobState::Paused | JobState::Rescheduled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Discontinued | JobState::Rescheduled
        )
    }

    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn can_transition_to(&self, next: JobState) -> bool {
        if self.is_terminal() || *self == next {
            return false;
        }
        match next {
            JobState::Paused
            | JobState::Discontinued
            | JobState::Rescheduled
            | JobState::Completed => true,
            _ if *self == JobState::Paused => true,
            _ => match (self.main_line_position(), next.main_line_position()) {
                (Some(from), Some(to)) => to > from,
                _ => false,
            },
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobResult {
    #[default]
    Unknown,
    Passed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateTransition {
    pub id: TransitionId,
    pub state: JobState,
    pub state_change_time: DateTime<Utc>,
}

impl JobStateTransition {
    pub fn new(state: JobState, state_change_time: DateTime<Utc>) -> Self {
        Self {
            id: TransitionId::UNSAVED,
            state,
            state_change_time,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStateTransitions(Vec<JobStateTransition>);

impl JobStateTransitions {
    pub fn by_state(&self, state: JobState) -> Option<&JobStateTransition> {
        self.0.iter().find(|t| t.state == state)
    }

    pub fn latest(&self) -> Option<&JobStateTransition> {
        self.0.last()
    }

    /// Assign sequential persisted ids starting at `first`.
    pub fn assign_ids(&mut self, first: i64) {
        for (offset, transition) in self.0.iter_mut().enumerate() {
            transition.id = TransitionId::new(first + offset as i64);
        }
    }

    fn reset_ids(&mut self) {
        for transition in &mut self.0 {
            transition.id = TransitionId::UNSAVED;
        }
    }

    fn push(&mut self, transition: JobStateTransition) {
        self.0.push(transition);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JobStateTransition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Links a plan back to the configuration that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobIdentifier {
    #[serde(default)]
    pub pipeline_name: Option<String>,
    pub stage_name: String,
    pub job_name: String,
    pub build_id: JobId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPlan {
    pub source: String,
    pub destination: String,
    pub kind: ArtifactKind,
}

impl From<&ArtifactConfig> for ArtifactPlan {
    fn from(config: &ArtifactConfig) -> Self {
        Self {
            source: config.source.clone(),
            destination: config.destination.clone().unwrap_or_default(),
            kind: config.kind,
        }
    }
}

/// Execution-ready description of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPlan {
    pub identifier: JobIdentifier,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub artifact_plans: Vec<ArtifactPlan>,
    #[serde(default)]
    pub variables: EnvironmentVariables,
    #[serde(default)]
    pub elastic_profile: Option<ElasticProfile>,
    #[serde(default)]
    pub cluster_profile: Option<ClusterProfile>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

/// Where an instance in a stage came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum JobOrigin {
    /// Created by a fresh stage instantiation.
    #[default]
    Scheduled,
    /// Created to re-execute a job of an earlier stage run.
    Rerun,
    /// Carries the terminal result of `original_job_id` into a rerun stage.
    Copy { original_job_id: JobId },
}

/// One concrete, stateful unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobInstance {
    name: String,
    id: JobId,
    state: JobState,
    result: JobResult,
    agent_uuid: Option<AgentUuid>,
    transitions: JobStateTransitions,
    run_type: RunType,
    origin: JobOrigin,
    scheduled_date: DateTime<Utc>,
    plan: JobPlan,
}

impl JobInstance {
    /// A new instance in `Scheduled` with a single transition.
    pub fn scheduled(
        name: impl Into<String>,
        mut plan: JobPlan,
        run_type: RunType,
        now: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        plan.identifier.job_name = name.clone();
        plan.identifier.build_id = JobId::UNSAVED;
        let mut transitions = JobStateTransitions::default();
        transitions.push(JobStateTransition::new(JobState::Scheduled, now));
        Self {
            name,
            id: JobId::UNSAVED,
            state: JobState::Scheduled,
            result: JobResult::Unknown,
            agent_uuid: None,
            transitions,
            run_type,
            origin: JobOrigin::Scheduled,
            scheduled_date: now,
            plan,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Record the persisted identity.
    pub fn set_id(&mut self, id: JobId) {
        self.id = id;
        self.plan.identifier.build_id = id;
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn result(&self) -> JobResult {
        self.result
    }

    pub fn agent_uuid(&self) -> Option<&AgentUuid> {
        self.agent_uuid.as_ref()
    }

    /// Bind the instance to an agent without changing state, as run-on-all
    /// expansion does at creation time.
    pub fn pre_assign(&mut self, agent: AgentUuid) {
        self.agent_uuid = Some(agent);
    }

    pub fn clear_agent(&mut self) {
        self.agent_uuid = None;
    }

    pub fn transitions(&self) -> &JobStateTransitions {
        &self.transitions
    }

    pub fn transitions_mut(&mut self) -> &mut JobStateTransitions {
        &mut self.transitions
    }

    pub fn run_type(&self) -> RunType {
        self.run_type
    }

    pub fn is_run_on_all_agents(&self) -> bool {
        self.run_type == RunType::RunOnAllAgents
    }

    pub fn is_run_multiple_instance(&self) -> bool {
        self.run_type == RunType::RunMultipleInstance
    }

    pub fn origin(&self) -> JobOrigin {
        self.origin
    }

    pub fn is_rerun(&self) -> bool {
        self.origin == JobOrigin::Rerun
    }

    pub fn is_copy(&self) -> bool {
        matches!(self.origin, JobOrigin::Copy { .. })
    }

    pub fn original_job_id(&self) -> Option<JobId> {
        match self.origin {
            JobOrigin::Copy { original_job_id } => Some(original_job_id),
            _ => None,
        }
    }

    pub fn mark_as_rerun(&mut self) {
        self.origin = JobOrigin::Rerun;
    }

    pub fn scheduled_date(&self) -> DateTime<Utc> {
        self.scheduled_date
    }

    pub fn plan(&self) -> &JobPlan {
        &self.plan
    }

    pub fn plan_mut(&mut self) -> &mut JobPlan {
        &mut self.plan
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn is_completed(&self) -> bool {
        self.state == JobState::Completed
    }

    /// Move to `next`, appending a transition stamped `at`. `Completed` is
    /// only reachable through [`JobInstance::complete`].
    pub fn change_state(&mut self, next: JobState, at: DateTime<Utc>) -> Result<()> {
        if next == JobState::Completed {
            return Err(self.invalid_transition(next));
        }
        self.transition(next, at)
    }

    fn invalid_transition(&self, to: JobState) -> Error {
        Error::InvalidStateTransition {
            job: self.name.clone(),
            from: self.state,
            to,
        }
    }

    fn transition(&mut self, next: JobState, at: DateTime<Utc>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(self.invalid_transition(next));
        }
        self.state = next;
        self.transitions.push(JobStateTransition::new(next, at));
        Ok(())
    }

    /// An agent claimed the job.
    pub fn assign(&mut self, agent: AgentUuid, at: DateTime<Utc>) -> Result<()> {
        self.change_state(JobState::Assigned, at)?;
        self.agent_uuid = Some(agent);
        Ok(())
    }

    pub fn complete(&mut self, result: JobResult, at: DateTime<Utc>) -> Result<()> {
        self.transition(JobState::Completed, at)?;
        self.result = result;
        Ok(())
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.complete(JobResult::Cancelled, at)
    }

    pub fn discontinue(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.change_state(JobState::Discontinued, at)
    }

    pub fn reschedule(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.change_state(JobState::Rescheduled, at)
    }

    /// A non-persisted copy carrying this instance's terminal result into a
    /// rerun stage. The copy keeps pointing at the first persisted original.
    pub fn copy_for_rerun(&self) -> JobInstance {
        let original_job_id = self.original_job_id().unwrap_or(self.id);
        let mut copy = self.clone();
        copy.id = JobId::UNSAVED;
        copy.plan.identifier.build_id = JobId::UNSAVED;
        copy.transitions.reset_ids();
        copy.origin = JobOrigin::Copy { original_job_id };
        copy
    }
}

/// Job instances of a stage, in order, with unique names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct JobInstances(Vec<JobInstance>);

impl JobInstances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs(jobs: impl IntoIterator<Item = JobInstance>) -> Result<Self> {
        let mut instances = Self::new();
        for job in jobs {
            instances.add(job)?;
        }
        Ok(instances)
    }

    /// Append a job, failing if the name is taken.
    pub fn add(&mut self, job: JobInstance) -> Result<()> {
        if self.by_name(job.name()).is_some() {
            return Err(Error::DuplicateJob(job.name));
        }
        self.0.push(job);
        Ok(())
    }

    pub fn append(&mut self, jobs: JobInstances) -> Result<()> {
        for job in jobs {
            self.add(job)?;
        }
        Ok(())
    }

    pub fn by_name(&self, name: &str) -> Option<&JobInstance> {
        self.0.iter().find(|j| j.name.eq_ignore_ascii_case(name))
    }

    pub fn by_name_mut(&mut self, name: &str) -> Option<&mut JobInstance> {
        self.0.iter_mut().find(|j| j.name.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, index: usize) -> Option<&JobInstance> {
        self.0.get(index)
    }

    pub fn first(&self) -> Option<&JobInstance> {
        self.0.first()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|j| j.name()).collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JobInstance> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, JobInstance> {
        self.0.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for JobInstances {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let jobs = Vec::<JobInstance>::deserialize(deserializer)?;
        JobInstances::from_jobs(jobs).map_err(serde::de::Error::custom)
    }
}

impl IntoIterator for JobInstances {
    type Item = JobInstance;
    type IntoIter = std::vec::IntoIter<JobInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a JobInstances {
    type Item = &'a JobInstance;
    type IntoIter = std::slice::Iter<'a, JobInstance>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn job(name: &str) -> JobInstance {
        JobInstance::scheduled(name, JobPlan::default(), RunType::Single, now())
    }

    #[test]
    fn test_fresh_job_is_scheduled() {
        let job = job("rails");
        assert_eq!(job.state(), JobState::Scheduled);
        assert_eq!(job.result(), JobResult::Unknown);
        assert_eq!(job.id(), JobId::UNSAVED);
        assert_eq!(job.transitions().len(), 1);
        let scheduled = job.transitions().by_state(JobState::Scheduled).unwrap();
        assert_eq!(scheduled.id, TransitionId::UNSAVED);
        assert_eq!(scheduled.state_change_time, now());
        assert_eq!(job.plan().identifier.job_name, "rails");
        assert!(job.is_active());
    }

    #[test]
    fn test_main_line_progression() {
        let mut job = job("rails");
        job.assign(AgentUuid::new("uuid1"), now()).unwrap();
        job.change_state(JobState::Preparing, now()).unwrap();
        job.change_state(JobState::Building, now()).unwrap();
        job.complete(JobResult::Passed, now() + Duration::minutes(3))
            .unwrap();

        assert_eq!(job.state(), JobState::Completed);
        assert_eq!(job.result(), JobResult::Passed);
        assert_eq!(job.agent_uuid().map(|a| a.as_str()), Some("uuid1"));
        assert_eq!(job.transitions().len(), 5);
        assert!(!job.is_active());
    }

    #[test]
    fn test_cannot_move_backwards_or_leave_completed() {
        let mut job = job("rails");
        job.change_state(JobState::Building, now()).unwrap();
        assert!(matches!(
            job.change_state(JobState::Assigned, now()),
            Err(Error::InvalidStateTransition { from: JobState::Building, to: JobState::Assigned, .. })
        ));

        job.complete(JobResult::Failed, now()).unwrap();
        assert!(job.change_state(JobState::Scheduled, now()).is_err());
        assert!(job.complete(JobResult::Passed, now()).is_err());
        assert_eq!(job.result(), JobResult::Failed);
    }

    #[test]
    fn test_completed_only_through_complete() {
        let mut job = job("rails");
        job.change_state(JobState::Building, now()).unwrap();

        assert!(matches!(
            job.change_state(JobState::Completed, now()),
            Err(Error::InvalidStateTransition { from: JobState::Building, to: JobState::Completed, .. })
        ));
        assert_eq!(job.state(), JobState::Building);
        assert_eq!(job.result(), JobResult::Unknown);
        assert_eq!(job.transitions().len(), 2);

        job.complete(JobResult::Passed, now()).unwrap();
        assert_eq!(job.state(), JobState::Completed);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut job = job("rails");
        job.change_state(JobState::Paused, now()).unwrap();
        job.change_state(JobState::Scheduled, now()).unwrap();
        assert_eq!(job.state(), JobState::Scheduled);
        assert_eq!(job.transitions().len(), 3);
    }

    #[test]
    fn test_side_exits_are_final() {
        let mut job = job("rails");
        job.discontinue(now()).unwrap();
        assert_eq!(job.result(), JobResult::Unknown);
        assert!(job.reschedule(now()).is_err());

        let mut cancelled = self::job("java");
        cancelled.cancel(now()).unwrap();
        assert_eq!(cancelled.state(), JobState::Completed);
        assert_eq!(cancelled.result(), JobResult::Cancelled);
    }

    #[test]
    fn test_copy_resets_identity_and_keeps_result() {
        let mut original = job("java");
        original.pre_assign(AgentUuid::new("agent"));
        original.complete(JobResult::Passed, now()).unwrap();
        original.set_id(JobId::new(12));
        original.transitions_mut().assign_ids(22);

        let copy = original.copy_for_rerun();
        assert_eq!(copy.id(), JobId::UNSAVED);
        assert_eq!(copy.plan().identifier.build_id, JobId::UNSAVED);
        assert!(copy.transitions().iter().all(|t| t.id == TransitionId::UNSAVED));
        assert_eq!(copy.transitions().len(), 2);
        assert_eq!(copy.state(), JobState::Completed);
        assert_eq!(copy.result(), JobResult::Passed);
        assert_eq!(copy.original_job_id(), Some(JobId::new(12)));
        assert!(copy.is_copy());
        assert!(!copy.is_rerun());
        assert_eq!(copy.agent_uuid(), original.agent_uuid());
    }

    #[test]
    fn test_copy_of_copy_points_at_first_original() {
        let mut original = job("java");
        original.complete(JobResult::Passed, now()).unwrap();
        original.set_id(JobId::new(12));

        let mut copy = original.copy_for_rerun();
        copy.set_id(JobId::new(18));

        let second = copy.copy_for_rerun();
        assert_eq!(second.original_job_id(), Some(JobId::new(12)));
    }

    #[test]
    fn test_rerun_and_copy_are_exclusive() {
        let mut job = job("rails");
        job.mark_as_rerun();
        assert!(job.is_rerun());
        assert!(!job.is_copy());
        let copy = job.copy_for_rerun();
        assert!(copy.is_copy());
        assert!(!copy.is_rerun());
    }

    #[test]
    fn test_job_instances_reject_duplicate_names() {
        let mut jobs = JobInstances::from_jobs([job("rails"), job("java")]).unwrap();
        assert!(matches!(jobs.add(job("RAILS")), Err(Error::DuplicateJob(name)) if name == "RAILS"));
        assert_eq!(jobs.names(), vec!["rails", "java"]);
        assert!(jobs.by_name("Java").is_some());
    }
}
