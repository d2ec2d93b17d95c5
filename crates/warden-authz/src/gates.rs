//! Local, network-free gates.
//!
//! Each gate answers one question against a [`PolicyDocument`]. Matching is
//! case-sensitive and exact everywhere.

use tracing::debug;
use warden_config::{PolicyDocument, ProjectFilters};

/// Is a command permitted at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandGate;

impl CommandGate {
    /// Check a command by its canonical name.
    pub fn is_allowed(doc: &PolicyDocument, command: &str) -> bool {
        let allowed = doc.commands().permits(command);
        debug!(command, allowed, "command gate");
        allowed
    }
}

/// Why [`ProjectGate`] denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectDenial {
    /// The project is not in the visible set.
    NotVisible,
    /// The project's rule narrows commands and excludes this one.
    CommandNotPermitted,
}

/// Outcome of [`ProjectGate::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectVisibility {
    /// The project may not be used with this command.
    Denied(ProjectDenial),
    /// Visible with no further narrowing.
    AllowedUnrestricted,
    /// Visible, but individual issues must satisfy these filters.
    AllowedWithFilters(ProjectFilters),
}

impl ProjectVisibility {
    /// Whether the outcome is any kind of allowance.
    pub const fn is_allowed(&self) -> bool {
        !matches!(self, Self::Denied(_))
    }
}

/// Is a project visible, and under which filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectGate;

impl ProjectGate {
    /// Resolve the visibility of `project_key` for `command`.
    ///
    /// An open key set only relaxes membership. A structured rule for the
    /// key still narrows commands and adds filters.
    pub fn resolve(doc: &PolicyDocument, project_key: &str, command: &str) -> ProjectVisibility {
        let projects = doc.projects();

        let visibility = if !projects.keys().permits(project_key) {
            ProjectVisibility::Denied(ProjectDenial::NotVisible)
        } else {
            match projects.rule(project_key) {
                None => ProjectVisibility::AllowedUnrestricted,
                Some(rule) if !rule.commands.permits(command) => {
                    ProjectVisibility::Denied(ProjectDenial::CommandNotPermitted)
                }
                Some(rule) => match &rule.filters {
                    Some(filters) => ProjectVisibility::AllowedWithFilters(filters.clone()),
                    None => ProjectVisibility::AllowedUnrestricted,
                },
            }
        };

        debug!(project = project_key, command, ?visibility, "project gate");
        visibility
    }
}

/// Is a content space visible. Spaces carry no sub-filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaceGate;

impl SpaceGate {
    /// Check a space by key.
    pub fn is_visible(doc: &PolicyDocument, space_key: &str) -> bool {
        let visible = doc.spaces().permits(space_key);
        debug!(space = space_key, visible, "space gate");
        visible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_config::{Participation, ProjectPolicy, ProjectRule, Scope};

    fn doc(projects: ProjectPolicy, commands: Scope) -> PolicyDocument {
        PolicyDocument::new(projects, commands, Scope::only(["ENG"]))
    }

    #[test]
    fn test_command_gate() {
        let open = PolicyDocument::open();
        assert!(CommandGate::is_allowed(&open, "issue delete"));

        let narrow = doc(ProjectPolicy::open(), Scope::only(["issue view"]));
        assert!(CommandGate::is_allowed(&narrow, "issue view"));
        assert!(!CommandGate::is_allowed(&narrow, "Issue View"));
        assert!(!CommandGate::is_allowed(&narrow, "view"));
    }

    #[test]
    fn test_empty_commands_deny_everything() {
        let doc = doc(ProjectPolicy::open(), Scope::only(Vec::<String>::new()));
        assert!(!CommandGate::is_allowed(&doc, "issue view"));
        assert!(!CommandGate::is_allowed(&doc, ""));
    }

    #[test]
    fn test_structured_rule_under_open_projects() {
        let rule = ProjectRule::open("S").with_commands(Scope::only(["read"]));
        let doc = doc(ProjectPolicy::new(Scope::All, [rule]), Scope::All);

        assert_eq!(
            ProjectGate::resolve(&doc, "S", "write"),
            ProjectVisibility::Denied(ProjectDenial::CommandNotPermitted)
        );
        assert_eq!(
            ProjectGate::resolve(&doc, "S", "read"),
            ProjectVisibility::AllowedUnrestricted
        );
        assert_eq!(
            ProjectGate::resolve(&doc, "T", "write"),
            ProjectVisibility::AllowedUnrestricted
        );
    }

    #[test]
    fn test_explicit_projects() {
        let filters = ProjectFilters::participated(Participation {
            was_assignee: true,
            ..Participation::default()
        });
        let doc = doc(
            ProjectPolicy::new(
                Scope::only(["OPS", "SEC"]),
                [ProjectRule::open("SEC").with_filters(filters.clone())],
            ),
            Scope::All,
        );

        assert_eq!(
            ProjectGate::resolve(&doc, "OPS", "issue view"),
            ProjectVisibility::AllowedUnrestricted
        );
        assert_eq!(
            ProjectGate::resolve(&doc, "SEC", "issue view"),
            ProjectVisibility::AllowedWithFilters(filters)
        );
        assert_eq!(
            ProjectGate::resolve(&doc, "HR", "issue view"),
            ProjectVisibility::Denied(ProjectDenial::NotVisible)
        );
        assert!(!ProjectGate::resolve(&doc, "ops", "issue view").is_allowed());
    }

    #[test]
    fn test_empty_project_list_hides_everything() {
        let doc = doc(
            ProjectPolicy::new(Scope::only(Vec::<String>::new()), []),
            Scope::All,
        );
        assert_eq!(
            ProjectGate::resolve(&doc, "OPS", "issue view"),
            ProjectVisibility::Denied(ProjectDenial::NotVisible)
        );
    }

    #[test]
    fn test_space_gate() {
        let doc = doc(ProjectPolicy::open(), Scope::All);
        assert!(SpaceGate::is_visible(&doc, "ENG"));
        assert!(!SpaceGate::is_visible(&doc, "HR"));
        assert!(SpaceGate::is_visible(&PolicyDocument::open(), "HR"));
    }
}
