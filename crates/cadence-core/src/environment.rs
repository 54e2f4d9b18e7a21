//! Ordered environment variable collections.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnvironmentVariable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub secure: bool,
}

impl EnvironmentVariable {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secure: false,
        }
    }

    pub fn secure(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            secure: true,
            ..Self::new(name, value)
        }
    }

    /// Value suitable for display, masking secure variables.
    pub fn display_value(&self) -> &str {
        if self.secure { "****" } else { &self.value }
    }
}

/// Environment variables in declaration order. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct EnvironmentVariables(Vec<EnvironmentVariable>);

impl EnvironmentVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable; an existing variable of the same name keeps its position
    /// and takes the new value.
    pub fn add(&mut self, variable: EnvironmentVariable) {
        match self.0.iter_mut().find(|v| v.name == variable.name) {
            Some(existing) => *existing = variable,
            None => self.0.push(variable),
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.add(EnvironmentVariable::new(name, value));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    pub fn contains(&self, name: &str, value: &str) -> bool {
        self.get(name) == Some(value)
    }

    /// Variable at a position in declaration order.
    pub fn at(&self, index: usize) -> Option<&EnvironmentVariable> {
        self.0.get(index)
    }

    /// A copy of these variables with `overrides` applied on top.
    pub fn overridden_by(&self, overrides: &EnvironmentVariables) -> Self {
        let mut merged = self.clone();
        for variable in overrides.iter() {
            merged.add(variable.clone());
        }
        merged
    }

    /// Insert variables ahead of the existing ones, replacing same-named entries.
    pub fn prepend(&mut self, variables: impl IntoIterator<Item = EnvironmentVariable>) {
        let mut front: Vec<EnvironmentVariable> = Vec::new();
        for variable in variables {
            front.retain(|v| v.name != variable.name);
            front.push(variable);
        }
        self.0
            .retain(|existing| !front.iter().any(|v| v.name == existing.name));
        front.append(&mut self.0);
        self.0 = front;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EnvironmentVariable> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<EnvironmentVariable> for EnvironmentVariables {
    fn from_iter<T: IntoIterator<Item = EnvironmentVariable>>(iter: T) -> Self {
        let mut variables = Self::new();
        for variable in iter {
            variables.add(variable);
        }
        variables
    }
}

impl<'a> IntoIterator for &'a EnvironmentVariables {
    type Item = &'a EnvironmentVariable;
    type IntoIter = std::slice::Iter<'a, EnvironmentVariable>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_override_replaces_in_place_and_appends() {
        let base = EnvironmentVariables::new()
            .with("blahVar", "originalVal")
            .with("secondVar", "secondVal");
        let job = EnvironmentVariables::new()
            .with("blahVar", "blahVal")
            .with("differentVar", "differentVal");

        let merged = base.overridden_by(&job);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.at(0).map(|v| v.value.as_str()), Some("blahVal"));
        assert!(merged.contains("secondVar", "secondVal"));
        assert!(merged.contains("differentVar", "differentVal"));
        // the source is untouched
        assert!(base.contains("blahVar", "originalVal"));
    }

    #[test]
    fn test_prepend_puts_variables_first() {
        let mut vars = EnvironmentVariables::new()
            .with("A", "a")
            .with("GO_JOB_RUN_COUNT", "stale");
        vars.prepend([
            EnvironmentVariable::new("GO_JOB_RUN_INDEX", "1"),
            EnvironmentVariable::new("GO_JOB_RUN_COUNT", "3"),
        ]);

        let names: Vec<_> = vars.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["GO_JOB_RUN_INDEX", "GO_JOB_RUN_COUNT", "A"]);
        assert_eq!(vars.get("GO_JOB_RUN_COUNT"), Some("3"));
    }

    #[test]
    fn test_secure_value_is_masked() {
        let var = EnvironmentVariable::secure("TOKEN", "s3cret");
        assert_eq!(var.display_value(), "****");
        assert_eq!(EnvironmentVariable::new("A", "b").display_value(), "b");
    }
}
