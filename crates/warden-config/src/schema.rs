//! Raw policy document schema.
//!
//! These types mirror the on-disk document exactly as written. They keep the
//! polymorphic shapes the document allows (a bare project key or a rule
//! table, the `"all"` keyword or an explicit list) so that
//! [`PolicyStore`](crate::PolicyStore) can normalize them once, at load time.
//!
//! # Example
//!
//! ```toml
//! current_organization = "acme"
//!
//! [defaults]
//! allowed_commands = ["issue view", "issue list"]
//!
//! [organizations.acme]
//! site_url = "https://acme.atlassian.net"
//! email = "bot@acme.io"
//! api_token_env = "ACME_TRACKER_TOKEN"
//! allowed_projects = ["OPS", { key = "SEC", filters = { participated = { was_assignee = true } } }]
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, MapAccess, SeqAccess, Unexpected, Visitor};
use serde::{Deserialize, Deserializer};

use crate::ProjectFilters;

/// Keyword that marks a scope field as unrestricted.
pub const ALL_KEYWORD: &str = "all";

/// A list-or-all field as written in the document.
///
/// `Unset` is the absence of the key. JSON `null` and the bare string
/// `"all"` both mean [`RawScope::All`]. A list is always an explicit set,
/// even when it is empty or contains the string `"all"`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RawScope<T> {
    /// Key not present in this layer.
    #[default]
    Unset,
    /// No restriction.
    All,
    /// Explicit set of entries.
    List(Vec<T>),
}

impl<T> RawScope<T> {
    /// Returns `true` if the layer defines this key.
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Field-level replace-or-inherit: `self` if defined, `fallback` otherwise.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        if self.is_set() {
            self
        } else {
            fallback
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for RawScope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ScopeVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for ScopeVisitor<T> {
            type Value = RawScope<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "the string \"{ALL_KEYWORD}\" or a list")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                if v == ALL_KEYWORD {
                    Ok(RawScope::All)
                } else {
                    Err(E::invalid_value(Unexpected::Str(v), &self))
                }
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(RawScope::All)
            }

            fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(RawScope::All)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, seq: A) -> Result<Self::Value, A::Error> {
                Vec::<T>::deserialize(de::value::SeqAccessDeserializer::new(seq)).map(RawScope::List)
            }
        }

        deserializer.deserialize_any(ScopeVisitor(PhantomData))
    }
}

/// One entry of `allowed_projects`: a bare key or a rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawProjectEntry {
    /// Bare project key.
    Key(String),
    /// Structured rule.
    Rule(RawProjectRule),
}

impl RawProjectEntry {
    /// The project key this entry names.
    pub fn key(&self) -> &str {
        match self {
            Self::Key(key) => key,
            Self::Rule(rule) => &rule.key,
        }
    }
}

impl<'de> Deserialize<'de> for RawProjectEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor;

        impl<'de> Visitor<'de> for EntryVisitor {
            type Value = RawProjectEntry;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a project key or a table with `key`, `commands` and `filters`")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(RawProjectEntry::Key(v.to_string()))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
                Ok(RawProjectEntry::Key(v))
            }

            fn visit_map<A: MapAccess<'de>>(self, map: A) -> Result<Self::Value, A::Error> {
                RawProjectRule::deserialize(de::value::MapAccessDeserializer::new(map))
                    .map(RawProjectEntry::Rule)
            }
        }

        deserializer.deserialize_any(EntryVisitor)
    }
}

/// Structured per-project rule as written in the document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawProjectRule {
    /// Project key (case-sensitive).
    pub key: String,

    /// Commands permitted on this project. Unset means any allowed command.
    #[serde(default)]
    pub commands: RawScope<String>,

    /// Sub-filters evaluated by probe.
    #[serde(default)]
    pub filters: Option<ProjectFilters>,
}

/// A present `project_rules` key is always an override, `null` included.
fn null_as_empty<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<RawProjectRule>>, D::Error> {
    Option::<Vec<RawProjectRule>>::deserialize(deserializer).map(|rules| Some(rules.unwrap_or_default()))
}

/// A policy layer: the `defaults` block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPolicyLayer {
    /// Visible projects.
    #[serde(default, alias = "allowedProjects")]
    pub allowed_projects: RawScope<RawProjectEntry>,

    /// Permitted commands (canonical names).
    #[serde(default, alias = "allowedCommands")]
    pub allowed_commands: RawScope<String>,

    /// Visible content spaces.
    #[serde(default, alias = "allowedSpaces")]
    pub allowed_spaces: RawScope<String>,

    /// Structured rules that narrow projects without changing membership.
    ///
    /// `None` when the key is absent. An explicit `null` is an empty
    /// override, matching `null` on the scope fields.
    #[serde(default, alias = "projectRules", deserialize_with = "null_as_empty")]
    pub project_rules: Option<Vec<RawProjectRule>>,
}

impl RawPolicyLayer {
    /// Overlay `self` on `base`, key by key.
    ///
    /// Each key defined in `self` replaces the one in `base` wholesale.
    #[must_use]
    pub fn overlay(self, base: Self) -> Self {
        Self {
            allowed_projects: self.allowed_projects.or(base.allowed_projects),
            allowed_commands: self.allowed_commands.or(base.allowed_commands),
            allowed_spaces: self.allowed_spaces.or(base.allowed_spaces),
            project_rules: self.project_rules.or(base.project_rules),
        }
    }
}

/// One `organizations.<alias>` block: policy overrides plus credentials.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawOrganization {
    /// Tracker site root (e.g. `https://acme.atlassian.net`).
    #[serde(default, alias = "siteUrl")]
    pub site_url: Option<String>,

    /// Account email used for basic authentication.
    #[serde(default)]
    pub email: Option<String>,

    /// Inline API token.
    #[serde(default, alias = "apiToken")]
    pub api_token: Option<String>,

    /// Name of the environment variable holding the API token.
    #[serde(default, alias = "apiTokenEnv")]
    pub api_token_env: Option<String>,

    /// Visible projects.
    #[serde(default, alias = "allowedProjects")]
    pub allowed_projects: RawScope<RawProjectEntry>,

    /// Permitted commands.
    #[serde(default, alias = "allowedCommands")]
    pub allowed_commands: RawScope<String>,

    /// Visible content spaces.
    #[serde(default, alias = "allowedSpaces")]
    pub allowed_spaces: RawScope<String>,

    /// Structured rules that narrow projects without changing membership.
    ///
    /// `None` when the key is absent. An explicit `null` is an empty
    /// override, matching `null` on the scope fields.
    #[serde(default, alias = "projectRules", deserialize_with = "null_as_empty")]
    pub project_rules: Option<Vec<RawProjectRule>>,
}

impl RawOrganization {
    /// The policy keys of this block as a layer.
    pub fn layer(&self) -> RawPolicyLayer {
        RawPolicyLayer {
            allowed_projects: self.allowed_projects.clone(),
            allowed_commands: self.allowed_commands.clone(),
            allowed_spaces: self.allowed_spaces.clone(),
            project_rules: self.project_rules.clone(),
        }
    }
}

/// The complete raw document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPolicyConfig {
    /// Alias of the organization to activate when none is given explicitly.
    #[serde(default, alias = "currentOrganization")]
    pub current_organization: Option<String>,

    /// Shared defaults.
    #[serde(default)]
    pub defaults: RawPolicyLayer,

    /// Per-organization overrides, keyed by alias.
    #[serde(default)]
    pub organizations: BTreeMap<String, RawOrganization>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_fields_are_unset() {
        let raw: RawPolicyConfig = toml::from_str("").unwrap();
        assert_eq!(raw.defaults.allowed_projects, RawScope::Unset);
        assert_eq!(raw.defaults.allowed_commands, RawScope::Unset);
        assert!(raw.organizations.is_empty());
    }

    #[test]
    fn test_all_keyword_and_null() {
        let raw: RawPolicyConfig =
            serde_json::from_str(r#"{"defaults": {"allowedCommands": "all", "allowed_spaces": null}}"#)
                .unwrap();
        assert_eq!(raw.defaults.allowed_commands, RawScope::All);
        assert_eq!(raw.defaults.allowed_spaces, RawScope::All);
    }

    #[test]
    fn test_null_project_rules_clear_inherited_rules() {
        let raw: RawPolicyConfig = serde_json::from_str(
            r#"{
                "defaults": {"project_rules": [{"key": "SEC", "commands": ["issue view"]}]},
                "organizations": {"acme": {"projectRules": null}, "globex": {}}
            }"#,
        )
        .unwrap();
        assert_eq!(raw.organizations["acme"].project_rules, Some(Vec::new()));
        assert_eq!(raw.organizations["globex"].project_rules, None);

        let acme = raw.organizations["acme"].layer().overlay(raw.defaults.clone());
        assert_eq!(acme.project_rules, Some(Vec::new()));
        let globex = raw.organizations["globex"].layer().overlay(raw.defaults.clone());
        assert_eq!(globex.project_rules.map(|rules| rules.len()), Some(1));
    }

    #[test]
    fn test_list_containing_all_is_literal() {
        let raw: RawPolicyConfig =
            toml::from_str(r#"defaults = { allowed_projects = ["all"] }"#).unwrap();
        assert_eq!(
            raw.defaults.allowed_projects,
            RawScope::List(vec![RawProjectEntry::Key("all".to_string())])
        );
    }

    #[test]
    fn test_other_bare_string_rejected() {
        let result: Result<RawPolicyConfig, _> =
            toml::from_str(r#"defaults = { allowed_commands = "everything" }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_non_string_entry_rejected() {
        let result: Result<RawPolicyConfig, _> =
            serde_json::from_str(r#"{"defaults": {"allowed_commands": ["issue view", 7]}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_mixed_project_entries() {
        let toml = r#"
            [defaults]
            allowed_projects = [
                "OPS",
                { key = "SEC", commands = ["issue view"], filters = { jql = "labels = public" } },
            ]
        "#;
        let raw: RawPolicyConfig = toml::from_str(toml).unwrap();
        let RawScope::List(entries) = raw.defaults.allowed_projects else {
            panic!("expected list");
        };
        assert_eq!(entries[0], RawProjectEntry::Key("OPS".to_string()));
        let RawProjectEntry::Rule(rule) = &entries[1] else {
            panic!("expected rule");
        };
        assert_eq!(rule.key, "SEC");
        assert_eq!(rule.commands, RawScope::List(vec!["issue view".to_string()]));
        assert_eq!(
            rule.filters.as_ref().and_then(|f| f.jql.as_deref()),
            Some("labels = public")
        );
    }

    #[test]
    fn test_unknown_rule_field_rejected() {
        let result: Result<RawPolicyConfig, _> = toml::from_str(
            r#"defaults = { allowed_projects = [{ key = "OPS", colour = "red" }] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let result: Result<RawPolicyConfig, _> = toml::from_str("surprise = true");
        assert!(result.is_err());
    }

    #[test]
    fn test_overlay_replaces_defined_keys_only() {
        let base = RawPolicyLayer {
            allowed_projects: RawScope::List(vec![RawProjectEntry::Key("A".into())]),
            allowed_commands: RawScope::List(vec!["issue view".into()]),
            ..Default::default()
        };
        let top = RawPolicyLayer {
            allowed_projects: RawScope::List(vec![RawProjectEntry::Key("C".into())]),
            ..Default::default()
        };
        let merged = top.overlay(base);
        assert_eq!(
            merged.allowed_projects,
            RawScope::List(vec![RawProjectEntry::Key("C".into())])
        );
        assert_eq!(merged.allowed_commands, RawScope::List(vec!["issue view".into()]));
        assert_eq!(merged.allowed_spaces, RawScope::Unset);
    }

    #[test]
    fn test_organization_block() {
        let toml = r#"
            [organizations.acme]
            site_url = "https://acme.atlassian.net"
            email = "bot@acme.io"
            api_token_env = "ACME_TOKEN"
            allowed_spaces = ["ENG"]
        "#;
        let raw: RawPolicyConfig = toml::from_str(toml).unwrap();
        let acme = &raw.organizations["acme"];
        assert_eq!(acme.api_token_env.as_deref(), Some("ACME_TOKEN"));
        assert_eq!(acme.layer().allowed_spaces, RawScope::List(vec!["ENG".into()]));
        assert_eq!(acme.layer().allowed_commands, RawScope::Unset);
    }
}
