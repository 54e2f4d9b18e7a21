//! Naming of expanded job instances.
//!
//! Run-on-all-agents instances are named `<job>-runOnAll-<k>` and multiple
//! instances `<job>-runInstance-<k>`, with `k` starting at 1.

use cadence_core::pipeline::RunType;

pub const RUN_ON_ALL_MARKER: &str = "-runOnAll-";
pub const RUN_INSTANCE_MARKER: &str = "-runInstance-";

fn marker_for(run_type: RunType) -> Option<&'static str> {
    match run_type {
        RunType::Single => None,
        RunType::RunOnAllAgents => Some(RUN_ON_ALL_MARKER),
        RunType::RunMultipleInstance => Some(RUN_INSTANCE_MARKER),
    }
}

pub fn run_on_all_name(base: &str, index: u32) -> String {
    format!("{base}{RUN_ON_ALL_MARKER}{index}")
}

pub fn run_instance_name(base: &str, index: u32) -> String {
    format!("{base}{RUN_INSTANCE_MARKER}{index}")
}

/// Monotonic name counter for one base job.
#[derive(Debug, Clone)]
pub struct JobNameGenerator {
    base: String,
    marker: &'static str,
    current: u32,
}

impl JobNameGenerator {
    pub fn run_on_all(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            marker: RUN_ON_ALL_MARKER,
            current: 0,
        }
    }

    pub fn run_multiple(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            marker: RUN_INSTANCE_MARKER,
            current: 0,
        }
    }

    /// Continue numbering after `index` instead of starting at 1.
    pub fn starting_after(mut self, index: u32) -> Self {
        self.current = index;
        self
    }

    pub fn current_index(&self) -> u32 {
        self.current
    }

    pub fn next_name(&mut self) -> String {
        self.current += 1;
        format!("{}{}{}", self.base, self.marker, self.current)
    }
}

/// A job instance name split into its configured job name and index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceName {
    pub base: String,
    pub index: Option<u32>,
}

/// Split a name produced by `run_type` expansion. Names that do not carry the
/// strategy's suffix come back whole.
pub fn parse_instance_name(name: &str, run_type: RunType) -> InstanceName {
    let whole = || InstanceName {
        base: name.to_string(),
        index: None,
    };
    let Some(marker) = marker_for(run_type) else {
        return whole();
    };
    match name.rsplit_once(marker) {
        Some((base, suffix))
            if !base.is_empty() && !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            match suffix.parse() {
                Ok(index) => InstanceName {
                    base: base.to_string(),
                    index: Some(index),
                },
                Err(_) => whole(),
            }
        }
        _ => whole(),
    }
}
