//! Scheduling context: who is scheduling, on which agents, with what overrides.

use cadence_core::agent::{Agent, Agents};
use cadence_core::elastic::{ClusterProfile, ElasticProfile};
use cadence_core::environment::EnvironmentVariables;
use std::collections::HashMap;
use std::sync::Arc;

/// Approver recorded when nobody is known to have triggered the stage.
pub const DEFAULT_APPROVER: &str = "Unknown";

/// Ambient data used while instantiating a stage.
///
/// Agent and profile snapshots are shared between derived contexts; deriving
/// a context never mutates the one it came from.
#[derive(Debug, Clone)]
pub struct SchedulingContext {
    approved_by: String,
    pipeline_name: Option<String>,
    agents: Arc<Agents>,
    variables: EnvironmentVariables,
    elastic_profiles: Arc<HashMap<String, ElasticProfile>>,
    cluster_profiles: Arc<HashMap<String, ClusterProfile>>,
    rerun: bool,
}

impl SchedulingContext {
    pub fn new(approved_by: impl Into<String>, agents: Agents) -> Self {
        Self {
            approved_by: approved_by.into(),
            pipeline_name: None,
            agents: Arc::new(agents),
            variables: EnvironmentVariables::new(),
            elastic_profiles: Arc::new(HashMap::new()),
            cluster_profiles: Arc::new(HashMap::new()),
            rerun: false,
        }
    }

    pub fn with_elastic_profiles(mut self, profiles: impl IntoIterator<Item = ElasticProfile>) -> Self {
        self.elastic_profiles = Arc::new(profiles.into_iter().map(|p| (p.id.clone(), p)).collect());
        self
    }

    pub fn with_cluster_profiles(mut self, profiles: impl IntoIterator<Item = ClusterProfile>) -> Self {
        self.cluster_profiles = Arc::new(profiles.into_iter().map(|p| (p.id.clone(), p)).collect());
        self
    }

    pub fn with_variables(mut self, variables: EnvironmentVariables) -> Self {
        self.variables = variables;
        self
    }

    pub fn approved_by(&self) -> &str {
        &self.approved_by
    }

    pub fn pipeline_name(&self) -> Option<&str> {
        self.pipeline_name.as_deref()
    }

    pub fn agents(&self) -> &Agents {
        &self.agents
    }

    pub fn variables(&self) -> &EnvironmentVariables {
        &self.variables
    }

    pub fn is_rerun(&self) -> bool {
        self.rerun
    }

    /// A derived context whose variables are these overridden by `overrides`.
    pub fn override_environment_variables(&self, overrides: &EnvironmentVariables) -> Self {
        Self {
            variables: self.variables.overridden_by(overrides),
            ..self.clone()
        }
    }

    /// A derived context scoped to one pipeline run.
    pub fn for_pipeline(&self, pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: Some(pipeline_name.into()),
            ..self.clone()
        }
    }

    /// A derived context flagged as scheduling a rerun.
    pub fn permitting_rerun(&self) -> Self {
        Self {
            rerun: true,
            ..self.clone()
        }
    }

    pub fn find_agents_matching<S: AsRef<str>>(&self, resources: &[S]) -> Vec<&Agent> {
        self.agents.find_agents_matching(resources)
    }

    pub fn elastic_profile(&self, id: &str) -> Option<&ElasticProfile> {
        self.elastic_profiles.get(id)
    }

    pub fn cluster_profile(&self, id: &str) -> Option<&ClusterProfile> {
        self.cluster_profiles.get(id)
    }
}

impl Default for SchedulingContext {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVER, Agents::new())
    }
}
