//! Elastic agent and cluster profiles.
//!
//! Profiles are opaque to the engine: it only resolves them by id and attaches
//! them to job plans for the provisioning collaborator.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ElasticProfile {
    pub id: String,
    pub cluster_profile_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ElasticProfile {
    pub fn new(id: impl Into<String>, cluster_profile_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster_profile_id: cluster_profile_id.into(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterProfile {
    pub id: String,
    pub plugin_id: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl ClusterProfile {
    pub fn new(id: impl Into<String>, plugin_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plugin_id: plugin_id.into(),
            properties: BTreeMap::new(),
        }
    }
}
