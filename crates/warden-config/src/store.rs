//! Policy resolution.
//!
//! [`PolicyStore`] turns a [`RawPolicyConfig`] into the effective
//! [`PolicyDocument`] for an organization alias:
//!
//! 1. Start from `defaults`.
//! 2. If `organizations.<alias>` exists, each key it defines replaces the
//!    matching key from `defaults`. Keys it omits are inherited. Nothing is
//!    deep-merged.
//! 3. Every list-or-all key still unset after the merge resolves to
//!    [`Scope::All`]. An explicit empty list stays empty and denies everything.
//!
//! All layers are validated when the store is built, so a broken document is
//! rejected before any policy is handed out.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::schema::{RawPolicyConfig, RawPolicyLayer, RawProjectEntry, RawProjectRule, RawScope};
use crate::{ConfigError, PolicyDocument, ProjectFilters, ProjectPolicy, ProjectRule, Scope};

/// Resolves effective policy documents from a validated raw configuration.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    raw: RawPolicyConfig,
}

impl PolicyStore {
    /// Validate every layer of `raw` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found in `defaults` or any
    /// organization block.
    pub fn new(raw: RawPolicyConfig) -> Result<Self, ConfigError> {
        normalize_layer(&raw.defaults, "defaults")?;
        for (alias, org) in &raw.organizations {
            let scope = format!("organizations.{alias}");
            normalize_layer(&org.layer(), &scope)?;
            normalize_layer(&org.layer().overlay(raw.defaults.clone()), &scope)?;
        }
        Ok(Self { raw })
    }

    /// Resolve the effective policy for `alias`.
    ///
    /// An alias with no `organizations` block resolves to the defaults.
    pub fn resolve(&self, alias: &str) -> Result<PolicyDocument, ConfigError> {
        resolve(&self.raw, alias)
    }

    /// Resolve the defaults alone.
    pub fn resolve_defaults(&self) -> Result<PolicyDocument, ConfigError> {
        normalize_layer(&self.raw.defaults, "defaults")
    }
}

/// Resolve the effective policy for `alias` from `raw`.
///
/// # Errors
///
/// Returns [`ConfigError`] if the merged layer contains a malformed entry.
pub fn resolve(raw: &RawPolicyConfig, alias: &str) -> Result<PolicyDocument, ConfigError> {
    match raw.organizations.get(alias) {
        Some(org) => {
            debug!(alias, "resolving organization policy over defaults");
            let merged = org.layer().overlay(raw.defaults.clone());
            normalize_layer(&merged, &format!("organizations.{alias}"))
        }
        None => {
            debug!(alias, "no organization block, using defaults");
            normalize_layer(&raw.defaults, "defaults")
        }
    }
}

/// Normalize one merged layer into a document.
pub(crate) fn normalize_layer(
    layer: &RawPolicyLayer,
    scope: &str,
) -> Result<PolicyDocument, ConfigError> {
    let commands = normalize_names(&layer.allowed_commands, &format!("{scope}.allowed_commands"))?;
    let spaces = normalize_names(&layer.allowed_spaces, &format!("{scope}.allowed_spaces"))?;
    let projects = normalize_projects(layer, scope)?;
    Ok(PolicyDocument::new(projects, commands, spaces))
}

fn normalize_names(raw: &RawScope<String>, field: &str) -> Result<Scope, ConfigError> {
    match raw {
        RawScope::Unset | RawScope::All => Ok(Scope::All),
        RawScope::List(names) => {
            let mut set = BTreeSet::new();
            for name in names {
                check_name(name, field)?;
                set.insert(name.clone());
            }
            Ok(Scope::Only(set))
        }
    }
}

fn normalize_projects(layer: &RawPolicyLayer, scope: &str) -> Result<ProjectPolicy, ConfigError> {
    let field = format!("{scope}.allowed_projects");
    let mut rules: BTreeMap<String, ProjectRule> = BTreeMap::new();

    let keys = match &layer.allowed_projects {
        RawScope::Unset | RawScope::All => Scope::All,
        RawScope::List(entries) => {
            let mut keys = BTreeSet::new();
            for entry in entries {
                check_name(entry.key(), &field)?;
                keys.insert(entry.key().to_string());
                if let RawProjectEntry::Rule(rule) = entry {
                    insert_rule(&mut rules, normalize_rule(rule, &field)?, scope)?;
                }
            }
            Scope::Only(keys)
        }
    };

    let rules_field = format!("{scope}.project_rules");
    for rule in layer.project_rules.iter().flatten() {
        check_name(&rule.key, &rules_field)?;
        insert_rule(&mut rules, normalize_rule(rule, &rules_field)?, scope)?;
    }

    Ok(ProjectPolicy::new(keys, rules.into_values()))
}

fn insert_rule(
    rules: &mut BTreeMap<String, ProjectRule>,
    rule: ProjectRule,
    scope: &str,
) -> Result<(), ConfigError> {
    if rules.contains_key(&rule.key) {
        return Err(ConfigError::duplicate_rule(&rule.key, scope));
    }
    rules.insert(rule.key.clone(), rule);
    Ok(())
}

fn normalize_rule(raw: &RawProjectRule, field: &str) -> Result<ProjectRule, ConfigError> {
    let commands = normalize_names(&raw.commands, &format!("{field}[{}].commands", raw.key))?;
    let filters = raw
        .filters
        .as_ref()
        .map(|f| normalize_filters(f, &format!("{field}[{}].filters", raw.key)))
        .transpose()?;
    Ok(ProjectRule {
        key: raw.key.clone(),
        commands,
        filters,
    })
}

fn normalize_filters(raw: &ProjectFilters, field: &str) -> Result<ProjectFilters, ConfigError> {
    if let Some(jql) = &raw.jql {
        if jql.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                format!("{field}.jql"),
                "query fragment must not be empty",
            ));
        }
    }
    Ok(raw.clone())
}

fn check_name(name: &str, field: &str) -> Result<(), ConfigError> {
    if name.trim().is_empty() {
        return Err(ConfigError::invalid_value(field, "entries must not be empty"));
    }
    Ok(())
}
