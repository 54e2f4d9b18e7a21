//! Strongly-typed identifiers for domain entities.
//!
//! Numeric identifiers are assigned by the persistence layer. Until a record
//! is saved it carries [`JobId::UNSAVED`] (and friends), which is `-1`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Identity of a record that has not been persisted yet.
            pub const UNSAVED: Self = Self(-1);

            pub fn new(value: i64) -> Self {
                Self(value)
            }

            pub fn value(&self) -> i64 {
                self.0
            }

            pub fn is_persisted(&self) -> bool {
                *self != Self::UNSAVED
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::UNSAVED
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

define_id!(
    /// Database identity of a pipeline run.
    PipelineId
);
define_id!(
    /// Database identity of a stage run.
    StageId
);
define_id!(
    /// Database identity of a job instance.
    JobId
);
define_id!(
    /// Database identity of a single job state transition.
    TransitionId
);

/// Opaque identity of a build agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct AgentUuid(String);

impl AgentUuid {
    pub fn new(uuid: impl Into<String>) -> Self {
        Self(uuid.into())
    }

    /// Generate a fresh random identity, as an agent does on first registration.
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentUuid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AgentUuid {
    fn from(value: String) -> Self {
        Self(value)
    }
}
