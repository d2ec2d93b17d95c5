//! Normalized policy types.
//!
//! A [`PolicyDocument`] is the merged, effective policy for one organization.
//! It is an immutable value: built once by [`PolicyStore`](crate::PolicyStore)
//! and shared read-only for the lifetime of a command.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A list-or-all restriction after normalization.
///
/// [`Scope::All`] is the "no restriction" marker. It is a distinct variant,
/// so a project literally named `all` is just `Scope::Only({"all"})`. An
/// empty `Only` set is valid and permits nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// No restriction configured.
    All,
    /// Only the listed names (case-sensitive).
    Only(BTreeSet<String>),
}

impl Scope {
    /// Build an explicit scope from names.
    pub fn only<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(names.into_iter().map(Into::into).collect())
    }

    /// Exact, case-sensitive membership test. `All` permits every name.
    pub fn permits(&self, name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Only(names) => names.contains(name),
        }
    }

    /// Returns `true` for the unrestricted marker.
    pub const fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    /// The explicit names, or `None` for [`Scope::All`].
    pub fn names(&self) -> Option<&BTreeSet<String>> {
        match self {
            Self::All => None,
            Self::Only(names) => Some(names),
        }
    }
}

/// Historical participation predicates for a filtered project.
///
/// Each `true` flag contributes one OR-branch to the probe query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Participation {
    /// The caller was ever the assignee.
    #[serde(default)]
    pub was_assignee: bool,
    /// The caller was ever the reporter.
    #[serde(default)]
    pub was_reporter: bool,
    /// The caller commented on the issue.
    #[serde(default)]
    pub was_commenter: bool,
    /// The caller watches the issue.
    #[serde(default)]
    pub is_watcher: bool,
}

impl Participation {
    /// Returns `true` if no flag is set.
    pub const fn is_empty(&self) -> bool {
        !(self.was_assignee || self.was_reporter || self.was_commenter || self.is_watcher)
    }
}

/// Per-project sub-filters. These can only be evaluated by the remote tracker.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFilters {
    /// Participation predicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participated: Option<Participation>,

    /// Raw query fragment, OR-combined with the participation branches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jql: Option<String>,
}

impl ProjectFilters {
    /// Filters matching on participation only.
    pub fn participated(participation: Participation) -> Self {
        Self {
            participated: Some(participation),
            jql: None,
        }
    }

    /// Filters matching on a raw query fragment only.
    pub fn jql(fragment: impl Into<String>) -> Self {
        Self {
            participated: None,
            jql: Some(fragment.into()),
        }
    }

    /// Add a raw query fragment.
    #[must_use]
    pub fn with_jql(mut self, fragment: impl Into<String>) -> Self {
        self.jql = Some(fragment.into());
        self
    }
}

/// Normalized per-project rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRule {
    /// Project key.
    pub key: String,
    /// Commands permitted on this project, on top of the document-wide scope.
    pub commands: Scope,
    /// Sub-filters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filters: Option<ProjectFilters>,
}

impl ProjectRule {
    /// A rule with no narrowing.
    pub fn open(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            commands: Scope::All,
            filters: None,
        }
    }

    /// Restrict the commands allowed on this project.
    #[must_use]
    pub fn with_commands(mut self, commands: Scope) -> Self {
        self.commands = commands;
        self
    }

    /// Attach sub-filters.
    #[must_use]
    pub fn with_filters(mut self, filters: ProjectFilters) -> Self {
        self.filters = Some(filters);
        self
    }

    /// Returns `true` if the rule narrows nothing.
    pub fn is_unrestricted(&self) -> bool {
        self.commands.is_all() && self.filters.is_none()
    }
}

/// Project visibility: key membership plus structured rules.
///
/// `keys` decides which projects are visible at all. `rules` carries
/// narrowing for specific keys and applies even when `keys` is [`Scope::All`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectPolicy {
    keys: Scope,
    rules: BTreeMap<String, ProjectRule>,
}

impl ProjectPolicy {
    /// Build from a membership scope and rules keyed by project.
    pub fn new(keys: Scope, rules: impl IntoIterator<Item = ProjectRule>) -> Self {
        Self {
            keys,
            rules: rules.into_iter().map(|r| (r.key.clone(), r)).collect(),
        }
    }

    /// Unrestricted projects with no rules.
    pub fn open() -> Self {
        Self::new(Scope::All, [])
    }

    /// Key membership scope.
    pub const fn keys(&self) -> &Scope {
        &self.keys
    }

    /// Rule for a project key, if one is configured.
    pub fn rule(&self, key: &str) -> Option<&ProjectRule> {
        self.rules.get(key)
    }

    /// All configured rules, ordered by key.
    pub fn rules(&self) -> impl Iterator<Item = &ProjectRule> {
        self.rules.values()
    }
}

/// The effective policy for one organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyDocument {
    projects: ProjectPolicy,
    commands: Scope,
    spaces: Scope,
}

impl PolicyDocument {
    /// Build a document from its three parts.
    pub fn new(projects: ProjectPolicy, commands: Scope, spaces: Scope) -> Self {
        Self {
            projects,
            commands,
            spaces,
        }
    }

    /// A fully permissive document. This is what an organization that
    /// configures nothing gets.
    pub fn open() -> Self {
        Self::new(ProjectPolicy::open(), Scope::All, Scope::All)
    }

    /// Allowed projects.
    pub const fn projects(&self) -> &ProjectPolicy {
        &self.projects
    }

    /// Allowed commands.
    pub const fn commands(&self) -> &Scope {
        &self.commands
    }

    /// Allowed content spaces.
    pub const fn spaces(&self) -> &Scope {
        &self.spaces
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_all_permits_everything() {
        assert!(Scope::All.permits("issue view"));
        assert!(Scope::All.permits(""));
    }

    #[test]
    fn test_empty_scope_permits_nothing() {
        let scope = Scope::only(Vec::<String>::new());
        assert!(!scope.permits("issue view"));
        assert!(!scope.is_all());
    }

    #[test]
    fn test_scope_is_case_sensitive() {
        let scope = Scope::only(["OPS"]);
        assert!(scope.permits("OPS"));
        assert!(!scope.permits("ops"));
    }

    #[test]
    fn test_literal_all_is_not_the_marker() {
        let scope = Scope::only(["all"]);
        assert!(scope.permits("all"));
        assert!(!scope.permits("OPS"));
    }

    #[test]
    fn test_participation_is_empty() {
        assert!(Participation::default().is_empty());
        let p = Participation {
            is_watcher: true,
            ..Default::default()
        };
        assert!(!p.is_empty());
    }

    #[test]
    fn test_rule_builder() {
        let rule = ProjectRule::open("SEC")
            .with_commands(Scope::only(["issue view"]))
            .with_filters(ProjectFilters::jql("labels = public"));
        assert!(!rule.is_unrestricted());
        assert!(ProjectRule::open("OPS").is_unrestricted());
    }

    #[test]
    fn test_open_document() {
        let doc = PolicyDocument::open();
        assert!(doc.commands().is_all());
        assert!(doc.spaces().is_all());
        assert!(doc.projects().keys().is_all());
        assert_eq!(doc.projects().rules().count(), 0);
    }

    #[test]
    fn test_document_serializes_marker_distinctly() {
        let doc = PolicyDocument::new(
            ProjectPolicy::new(Scope::only(["all"]), []),
            Scope::All,
            Scope::only(Vec::<String>::new()),
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["commands"], "all");
        assert_eq!(json["projects"]["keys"]["only"][0], "all");
        assert!(json["spaces"]["only"].as_array().unwrap().is_empty());
    }
}
