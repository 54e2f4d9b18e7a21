//! Pipeline label templates.
//!
//! Supports:
//! - `${COUNT}` - the pipeline counter
//! - `${env:NAME}` - a variable of the pipeline run
//! - `${material}` - latest revision of the named material
//! - `${material[:n]}` - the same, truncated to `n` characters
//!
//! Unknown placeholders are left untouched.

use crate::build_cause::MaterialRevisions;
use crate::environment::EnvironmentVariables;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^}\[\]]+)(?:\[:(\d+)\])?\}").expect("label placeholder pattern is valid")
});

/// Values available to a label template.
#[derive(Debug, Clone, Copy)]
pub struct LabelContext<'a> {
    pub counter: u32,
    pub variables: &'a EnvironmentVariables,
    pub revisions: &'a MaterialRevisions,
}

impl<'a> LabelContext<'a> {
    pub fn new(
        counter: u32,
        variables: &'a EnvironmentVariables,
        revisions: &'a MaterialRevisions,
    ) -> Self {
        Self {
            counter,
            variables,
            revisions,
        }
    }

    /// Expand every placeholder in `template`.
    pub fn interpolate(&self, template: &str) -> String {
        PLACEHOLDER
            .replace_all(template, |caps: &Captures| {
                let key = caps.get(1).map_or("", |m| m.as_str()).trim();
                let truncate = caps.get(2).and_then(|m| m.as_str().parse::<usize>().ok());
                self.resolve(key, truncate)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    fn resolve(&self, key: &str, truncate: Option<usize>) -> Option<String> {
        if key.eq_ignore_ascii_case("COUNT") && truncate.is_none() {
            return Some(self.counter.to_string());
        }
        if let Some(name) = key
            .strip_prefix("env:")
            .or_else(|| key.strip_prefix("ENV:"))
        {
            return self.variables.get(name).map(str::to_string);
        }
        let revision = self.revisions.by_material_name(key)?;
        match truncate {
            Some(length) => revision.latest_revision_truncated(length),
            None => revision.latest_revision().map(str::to_string),
        }
    }
}
