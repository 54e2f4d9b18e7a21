//! Stage and pipeline run instances.

use crate::build_cause::BuildCause;
use crate::environment::EnvironmentVariables;
use crate::ids::{PipelineId, StageId};
use crate::interpolation::LabelContext;
use crate::job::{JobInstance, JobInstances, JobResult};
use crate::pipeline::{ApprovalType, DEFAULT_LABEL_TEMPLATE};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Aggregate outcome of a stage's jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageResult {
    Unknown,
    Passed,
    Failed,
    Cancelled,
}

/// One run of a stage. A rerun is always a new `Stage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub name: String,
    pub jobs: JobInstances,
    pub approval_type: ApprovalType,
    pub approved_by: String,
    pub counter: u32,
    #[serde(default)]
    pub rerun_of_counter: Option<u32>,
    pub config_version: String,
    #[serde(default = "default_true")]
    pub fetch_materials: bool,
    #[serde(default)]
    pub clean_working_dir: bool,
    pub created_time: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub latest_run: bool,
}

fn default_true() -> bool {
    true
}

impl Stage {
    pub fn new(
        name: impl Into<String>,
        jobs: JobInstances,
        approved_by: impl Into<String>,
        approval_type: ApprovalType,
        config_version: impl Into<String>,
        created_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: StageId::UNSAVED,
            name: name.into(),
            jobs,
            approval_type,
            approved_by: approved_by.into(),
            counter: 1,
            rerun_of_counter: None,
            config_version: config_version.into(),
            fetch_materials: true,
            clean_working_dir: false,
            created_time,
            latest_run: true,
        }
    }

    pub fn job(&self, name: &str) -> Option<&JobInstance> {
        self.jobs.by_name(name)
    }

    /// Whether this run re-executed jobs of an earlier run.
    pub fn is_rerun(&self) -> bool {
        self.rerun_of_counter.is_some()
    }

    pub fn has_rerun_jobs(&self) -> bool {
        self.jobs.iter().any(JobInstance::is_rerun)
    }

    /// Every job reached a final state.
    pub fn is_completed(&self) -> bool {
        self.jobs.iter().all(|j| !j.is_active())
    }

    /// `Unknown` while any job is running, otherwise the worst job result.
    pub fn result(&self) -> StageResult {
        if !self.is_completed() {
            return StageResult::Unknown;
        }
        let results: Vec<JobResult> = self.jobs.iter().map(JobInstance::result).collect();
        if results.contains(&JobResult::Cancelled) {
            StageResult::Cancelled
        } else if results.contains(&JobResult::Failed) {
            StageResult::Failed
        } else if results.iter().all(|r| *r == JobResult::Passed) {
            StageResult::Passed
        } else {
            StageResult::Unknown
        }
    }
}

/// One run of a pipeline; holds only the stages instantiated so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub counter: u32,
    #[serde(default)]
    pub label: Option<String>,
    pub build_cause: BuildCause,
    pub stages: Vec<Stage>,
    pub label_template: String,
    /// Variables visible to `${env:...}` label placeholders.
    #[serde(default)]
    pub variables: EnvironmentVariables,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, build_cause: BuildCause, stages: Vec<Stage>) -> Self {
        Self {
            id: PipelineId::UNSAVED,
            name: name.into(),
            counter: 0,
            label: None,
            build_cause,
            stages,
            label_template: DEFAULT_LABEL_TEMPLATE.to_string(),
            variables: EnvironmentVariables::new(),
        }
    }

    pub fn with_label_template(mut self, template: impl Into<String>) -> Self {
        self.label_template = template.into();
        self
    }

    pub fn with_variables(mut self, variables: EnvironmentVariables) -> Self {
        self.variables = variables;
        self
    }

    /// Assign the run counter and resolve the label from it.
    pub fn update_counter(&mut self, counter: u32) {
        self.counter = counter;
        let context = LabelContext::new(
            counter,
            &self.variables,
            self.build_cause.material_revisions(),
        );
        self.label = Some(context.interpolate(&self.label_template));
    }

    pub fn first_stage(&self) -> Option<&Stage> {
        self.stages.first()
    }

    pub fn find_stage(&self, name: &str) -> Option<&Stage> {
        self.stages.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }
}
