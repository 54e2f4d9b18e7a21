//! Pipeline configuration types.
//!
//! These types represent the fully-resolved pipeline configuration the engine
//! instantiates from. Stage and job names compare case-insensitively.

use crate::environment::EnvironmentVariables;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default label template: the pipeline counter.
pub const DEFAULT_LABEL_TEMPLATE: &str = "${COUNT}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PipelineConfig {
    pub name: String,
    #[serde(default)]
    pub materials: Vec<MaterialConfig>,
    pub stages: Vec<StageConfig>,
    #[serde(default)]
    pub variables: EnvironmentVariables,
    #[serde(default = "default_label_template")]
    pub label_template: String,
}

fn default_label_template() -> String {
    DEFAULT_LABEL_TEMPLATE.to_string()
}

impl PipelineConfig {
    pub fn new(name: impl Into<String>, materials: Vec<MaterialConfig>, stages: Vec<StageConfig>) -> Self {
        Self {
            name: name.into(),
            materials,
            stages,
            variables: EnvironmentVariables::new(),
            label_template: default_label_template(),
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn first_stage(&self) -> Option<&StageConfig> {
        self.stages.first()
    }

    /// SHA-256 of the canonical JSON form, used to detect configuration drift.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageConfig {
    pub name: String,
    pub jobs: Vec<JobConfig>,
    #[serde(default)]
    pub approval: ApprovalType,
    #[serde(default)]
    pub variables: EnvironmentVariables,
    #[serde(default = "default_true")]
    pub fetch_materials: bool,
    #[serde(default)]
    pub clean_working_dir: bool,
}

fn default_true() -> bool {
    true
}

impl StageConfig {
    pub fn new(name: impl Into<String>, jobs: Vec<JobConfig>) -> Self {
        Self {
            name: name.into(),
            jobs,
            approval: ApprovalType::default(),
            variables: EnvironmentVariables::new(),
            fetch_materials: true,
            clean_working_dir: false,
        }
    }

    pub fn with_approval(mut self, approval: ApprovalType) -> Self {
        self.approval = approval;
        self
    }

    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name.eq_ignore_ascii_case(name))
    }

    pub fn job_mut(&mut self, name: &str) -> Option<&mut JobConfig> {
        self.jobs
            .iter_mut()
            .find(|j| j.name.eq_ignore_ascii_case(name))
    }
}

/// How a stage is allowed to start once its predecessor passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalType {
    #[default]
    Success,
    Manual,
}

impl ApprovalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalType::Success => "success",
            ApprovalType::Manual => "manual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactConfig>,
    #[serde(default)]
    pub variables: EnvironmentVariables,
    #[serde(default)]
    pub run_on_all_agents: bool,
    #[serde(default)]
    pub run_instance_count: Option<u32>,
    #[serde(default)]
    pub elastic_profile_id: Option<String>,
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: vec![],
            artifacts: vec![],
            variables: EnvironmentVariables::new(),
            run_on_all_agents: false,
            run_instance_count: None,
            elastic_profile_id: None,
            timeout_minutes: None,
        }
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources = resources.into_iter().map(Into::into).collect();
        self
    }

    pub fn run_on_all_agents(mut self) -> Self {
        self.run_on_all_agents = true;
        self
    }

    pub fn run_instances(mut self, count: u32) -> Self {
        self.run_instance_count = Some(count);
        self
    }

    /// The execution strategy this configuration selects.
    pub fn run_type(&self) -> RunType {
        if self.run_on_all_agents {
            RunType::RunOnAllAgents
        } else if self.run_instance_count.is_some_and(|n| n > 0) {
            RunType::RunMultipleInstance
        } else {
            RunType::Single
        }
    }
}

/// Execution strategy of a job, as configured or as recorded on an instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    #[default]
    Single,
    RunOnAllAgents,
    RunMultipleInstance,
}

impl RunType {
    /// User-facing name used in rerun error messages.
    pub fn description(&self) -> &'static str {
        match self {
            RunType::Single => "simple",
            RunType::RunOnAllAgents => "run on all agents",
            RunType::RunMultipleInstance => "run multiple instance",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactConfig {
    pub source: String,
    #[serde(default)]
    pub destination: Option<String>,
    #[serde(default)]
    pub kind: ArtifactKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    #[default]
    Build,
    Test,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MaterialConfig {
    pub name: String,
    pub kind: MaterialKind,
    #[serde(default)]
    pub url: Option<String>,
}

impl MaterialConfig {
    pub fn new(name: impl Into<String>, kind: MaterialKind) -> Self {
        Self {
            name: name.into(),
            kind,
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Identity of the material, independent of any revision.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_str().as_bytes());
        hasher.update(b"<|>");
        hasher.update(self.url.as_deref().unwrap_or(&self.name).as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Git,
    Svn,
    Hg,
    Dependency,
    Package,
}

impl MaterialKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterialKind::Git => "git",
            MaterialKind::Svn => "svn",
            MaterialKind::Hg => "hg",
            MaterialKind::Dependency => "dependency",
            MaterialKind::Package => "package",
        }
    }
}
