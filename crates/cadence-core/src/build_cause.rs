//! Build causes: why a pipeline run was triggered.

use crate::environment::EnvironmentVariables;
use crate::pipeline::{MaterialConfig, MaterialKind, PipelineConfig};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

/// `pipeline/counter/stage/run`, the revision format of an upstream stage.
static DEPENDENCY_REVISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^/]+/\d+/[^/]+/\d+$").expect("dependency revision pattern is valid")
});

const ANONYMOUS: &str = "anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Username(String);

impl Username {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn anonymous() -> Self {
        Self(ANONYMOUS.to_string())
    }

    pub fn is_anonymous(&self) -> bool {
        self.0.eq_ignore_ascii_case(ANONYMOUS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modification {
    pub revision: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    pub modified_time: DateTime<Utc>,
}

impl Modification {
    pub fn new(revision: impl Into<String>, modified_time: DateTime<Utc>) -> Self {
        Self {
            revision: revision.into(),
            user_name: None,
            comment: None,
            modified_time,
        }
    }

    pub fn by(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// The modifications of one material, latest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterialRevision {
    pub material: MaterialConfig,
    pub modifications: Vec<Modification>,
    #[serde(default = "default_changed")]
    pub changed: bool,
}

fn default_changed() -> bool {
    true
}

impl MaterialRevision {
    pub fn new(material: MaterialConfig, modifications: Vec<Modification>) -> Self {
        Self {
            material,
            modifications,
            changed: true,
        }
    }

    pub fn latest(&self) -> Option<&Modification> {
        self.modifications.first()
    }

    pub fn latest_revision(&self) -> Option<&str> {
        self.latest().map(|m| m.revision.as_str())
    }

    /// Short form of the latest revision, used by label templates.
    pub fn latest_revision_truncated(&self, length: usize) -> Option<String> {
        self.latest_revision()
            .map(|r| r.chars().take(length).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MaterialRevisions(Vec<MaterialRevision>);

impl MaterialRevisions {
    pub fn new(revisions: Vec<MaterialRevision>) -> Self {
        Self(revisions)
    }

    pub fn add(&mut self, revision: MaterialRevision) {
        self.0.push(revision);
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|r| r.modifications.is_empty())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MaterialRevision> {
        self.0.iter()
    }

    pub fn by_material_name(&self, name: &str) -> Option<&MaterialRevision> {
        self.0
            .iter()
            .find(|r| r.material.name.eq_ignore_ascii_case(name))
    }

    fn fingerprints(&self) -> HashSet<String> {
        self.0.iter().map(|r| r.material.fingerprint()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Modification,
    ManualForced,
    NeverRun,
}

/// Why a pipeline run happens: revisions, approver, and variable overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildCause {
    kind: TriggerKind,
    #[serde(default)]
    revisions: MaterialRevisions,
    approver: Username,
    #[serde(default)]
    variables: EnvironmentVariables,
}

impl BuildCause {
    pub fn with_modifications(revisions: MaterialRevisions, approver: impl Into<String>) -> Self {
        Self {
            kind: TriggerKind::Modification,
            revisions,
            approver: Username::new(approver),
            variables: EnvironmentVariables::new(),
        }
    }

    pub fn with_empty_modifications() -> Self {
        Self::with_modifications(MaterialRevisions::default(), "")
    }

    /// A build forced by a user. The approver is mandatory: pass
    /// [`Username::anonymous`] rather than nothing.
    pub fn manual_forced(revisions: MaterialRevisions, approver: Option<Username>) -> Result<Self> {
        let approver = approver.ok_or_else(|| {
            Error::InvalidArgument(
                "Username cannot be null; use the anonymous user instead".to_string(),
            )
        })?;
        Ok(Self {
            kind: TriggerKind::ManualForced,
            revisions,
            approver,
            variables: EnvironmentVariables::new(),
        })
    }

    pub fn never_run() -> Self {
        Self {
            kind: TriggerKind::NeverRun,
            revisions: MaterialRevisions::default(),
            approver: Username::new(""),
            variables: EnvironmentVariables::new(),
        }
    }

    pub fn with_variables(mut self, variables: EnvironmentVariables) -> Self {
        self.variables = variables;
        self
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn is_forced(&self) -> bool {
        self.kind == TriggerKind::ManualForced
    }

    pub fn approver(&self) -> &Username {
        &self.approver
    }

    pub fn material_revisions(&self) -> &MaterialRevisions {
        &self.revisions
    }

    pub fn variables(&self) -> &EnvironmentVariables {
        &self.variables
    }

    /// Human-readable summary derived from the revisions.
    pub fn build_cause_message(&self) -> String {
        if self.is_forced() {
            let user = if self.approver.is_anonymous() {
                ANONYMOUS
            } else {
                self.approver.as_str()
            };
            return format!("Forced by {user}");
        }
        if self.revisions.is_empty() {
            return "No modifications".to_string();
        }
        if self.revisions.len() == 1
            && let Some(revision) = self.revisions.iter().next().and_then(|r| r.latest_revision())
            && DEPENDENCY_REVISION.is_match(revision)
        {
            return format!("triggered by {revision}");
        }
        let author = self
            .revisions
            .iter()
            .find_map(|r| r.latest())
            .and_then(|m| m.user_name.as_deref())
            .unwrap_or("unknown");
        format!("modified by {author}")
    }

    /// Fail when a configured material is not carried by this cause.
    ///
    /// Extra materials in the cause are fine, they come from externals and
    /// upstream resolution.
    pub fn assert_materials_match(&self, materials: &[MaterialConfig]) -> Result<()> {
        let carried = self.revisions.fingerprints();
        let missing: Vec<String> = materials
            .iter()
            .filter(|m| !carried.contains(&m.fingerprint()))
            .map(|m| m.name.clone())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MaterialsMismatch { missing })
        }
    }

    /// Material check used at pipeline creation; causes without revisions
    /// (forced with nothing polled yet, never run) have nothing to compare.
    pub fn assert_pipeline_config_matches(&self, config: &PipelineConfig) -> Result<()> {
        if self.revisions.iter().next().is_none() {
            return Ok(());
        }
        self.assert_materials_match(&config.materials)
    }

    /// Whether any carried material is an upstream pipeline.
    pub fn has_dependency_materials(&self) -> bool {
        self.revisions
            .iter()
            .any(|r| r.material.kind == MaterialKind::Dependency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn svn(name: &str) -> MaterialConfig {
        MaterialConfig::new(name, MaterialKind::Svn).with_url(format!("svn://repo/{name}"))
    }

    fn multiple_modifications() -> MaterialRevisions {
        MaterialRevisions::new(vec![
            MaterialRevision::new(
                svn("mainRepo"),
                vec![
                    Modification::new("3", at(300))
                        .by("lgao")
                        .with_comment("Fixing the not checked in files"),
                    Modification::new("2", at(200)).by("committer"),
                ],
            ),
            MaterialRevision::new(
                MaterialConfig::new("hg", MaterialKind::Hg),
                vec![Modification::new("abc", at(100)).by("other")],
            ),
        ])
    }

    #[test]
    fn test_modified_by_first_author() {
        let cause = BuildCause::with_modifications(multiple_modifications(), "");
        assert_eq!(cause.build_cause_message(), "modified by lgao");
    }

    #[test]
    fn test_no_modifications() {
        assert_eq!(
            BuildCause::with_empty_modifications().build_cause_message(),
            "No modifications"
        );
        assert_eq!(BuildCause::never_run().build_cause_message(), "No modifications");
    }

    #[test]
    fn test_triggered_by_upstream_stage() {
        let revisions = MaterialRevisions::new(vec![MaterialRevision::new(
            MaterialConfig::new("cruise", MaterialKind::Dependency),
            vec![Modification::new("pipelineName/10/stageName/1", at(0))],
        )]);
        let cause = BuildCause::with_modifications(revisions, "");
        assert_eq!(
            cause.build_cause_message(),
            "triggered by pipelineName/10/stageName/1"
        );
        assert!(cause.has_dependency_materials());
    }

    #[test]
    fn test_forced_message() {
        let cause = BuildCause::manual_forced(
            MaterialRevisions::default(),
            Some(Username::new("Joe Bloggs")),
        )
        .unwrap();
        assert_eq!(cause.build_cause_message(), "Forced by Joe Bloggs");

        let cause =
            BuildCause::manual_forced(multiple_modifications(), Some(Username::anonymous())).unwrap();
        assert_eq!(cause.build_cause_message(), "Forced by anonymous");
    }

    #[test]
    fn test_forced_requires_user() {
        let err = BuildCause::manual_forced(MaterialRevisions::default(), None).unwrap_err();
        assert!(err.to_string().contains("Username cannot be null"));
    }

    #[test]
    fn test_materials_match_allows_external_materials() {
        let cause = BuildCause::with_modifications(multiple_modifications(), "");
        cause.assert_materials_match(&[svn("mainRepo")]).unwrap();
    }

    #[test]
    fn test_materials_mismatch_when_config_material_missing() {
        let cause = BuildCause::with_modifications(multiple_modifications(), "");
        let err = cause
            .assert_materials_match(&[svn("mainRepo"), svn("externalRepo")])
            .unwrap_err();
        match err {
            Error::MaterialsMismatch { missing } => assert_eq!(missing, vec!["externalRepo"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_forced_without_revisions_skips_material_check() {
        let config = PipelineConfig::new("cruise", vec![svn("mainRepo")], vec![]);
        let cause =
            BuildCause::manual_forced(MaterialRevisions::default(), Some(Username::anonymous()))
                .unwrap();
        cause.assert_pipeline_config_matches(&config).unwrap();
    }
}
