//! Agent types and the agent pool used for resource matching.

use crate::ids::AgentUuid;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub uuid: AgentUuid,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub ip_address: String,
    /// Resource tags, stored lowercase.
    #[serde(default, deserialize_with = "deserialize_resources")]
    resources: BTreeSet<String>,
}

fn deserialize_resources<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(raw.iter().map(|r| normalize_resource(r)).collect())
}

fn normalize_resource(resource: &str) -> String {
    resource.trim().to_lowercase()
}

impl Agent {
    pub fn new(uuid: impl Into<AgentUuid>) -> Self {
        Self {
            uuid: uuid.into(),
            hostname: String::new(),
            ip_address: String::new(),
            resources: BTreeSet::new(),
        }
    }

    pub fn with_host(mut self, hostname: impl Into<String>, ip_address: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self.ip_address = ip_address.into();
        self
    }

    pub fn with_resources<I, S>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.resources = resources
            .into_iter()
            .map(|r| normalize_resource(r.as_ref()))
            .collect();
        self
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(String::as_str)
    }

    /// Check whether this agent carries every required resource tag.
    pub fn has_all_resources<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required
            .iter()
            .all(|r| self.resources.contains(&normalize_resource(r.as_ref())))
    }
}

/// Ordered pool of known agents with unique identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Agents(Vec<Agent>);

impl Agents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pool from a list, rejecting duplicate identities.
    pub fn from_agents(agents: impl IntoIterator<Item = Agent>) -> Result<Self> {
        let mut pool = Self::new();
        for agent in agents {
            pool.add(agent)?;
        }
        Ok(pool)
    }

    /// Insert an agent, failing if its uuid is already registered.
    pub fn add(&mut self, agent: Agent) -> Result<()> {
        if self.has_agent(&agent.uuid) {
            return Err(Error::DuplicateAgent(agent.uuid));
        }
        self.0.push(agent);
        Ok(())
    }

    pub fn agent_by_uuid(&self, uuid: &AgentUuid) -> Option<&Agent> {
        self.0.iter().find(|a| &a.uuid == uuid)
    }

    pub fn has_agent(&self, uuid: &AgentUuid) -> bool {
        self.agent_by_uuid(uuid).is_some()
    }

    /// Agents whose resource tags are a superset of `required`, in pool order.
    pub fn find_agents_matching<S: AsRef<str>>(&self, required: &[S]) -> Vec<&Agent> {
        self.0
            .iter()
            .filter(|a| a.has_all_resources(required))
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Agent> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for Agents {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let agents = Vec::<Agent>::deserialize(deserializer)?;
        Agents::from_agents(agents).map_err(serde::de::Error::custom)
    }
}

impl<'a> IntoIterator for &'a Agents {
    type Item = &'a Agent;
    type IntoIter = std::slice::Iter<'a, Agent>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
