//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading the raw policy
//! document from files, strings and environment variables.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::schema::{RawPolicyConfig, RawProjectEntry, RawProjectRule, RawScope, ALL_KEYWORD};
use crate::{ConfigError, OrganizationRegistry, PolicyStore};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "WARDEN";

/// Configuration loader with layered approach.
///
/// The loader applies configuration in layers, with later layers overriding
/// earlier ones:
/// 1. An empty document (fully permissive)
/// 2. Configuration file (TOML or JSON)
/// 3. Environment variables
///
/// # Example
///
/// ```no_run
/// use warden_config::ConfigLoader;
///
/// # fn main() -> Result<(), warden_config::ConfigError> {
/// let registry = ConfigLoader::new()
///     .with_file("warden.toml")?
///     .with_env_prefix("WARDEN")
///     .load_registry(None)?;
///
/// println!("active organization: {}", registry.current_alias());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ConfigLoader {
    raw: RawPolicyConfig,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file.
    ///
    /// Supports TOML (.toml) and JSON (.json) formats, picked by extension.
    /// A second file replaces the first.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, or does not
    /// match the document schema.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();
        self.raw = parse(&content, &extension)?;
        debug!(path = %path.display(), "loaded policy configuration");

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in the given format (`toml` or `json`).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use warden_config::ConfigLoader;
    ///
    /// let raw = ConfigLoader::new()
    ///     .with_string("[defaults]\nallowed_commands = []", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// let doc = warden_config::resolve(&raw, "any").unwrap();
    /// assert!(!doc.commands().permits("issue view"));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.raw = parse(content, &format.to_lowercase())?;
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Environment variables use the format `PREFIX__SECTION__KEY`:
    /// - `WARDEN__ORGANIZATION=acme`
    /// - `WARDEN__DEFAULTS__ALLOWED_COMMANDS=issue view,issue list`
    /// - `WARDEN__DEFAULTS__ALLOWED_PROJECTS=all`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if present.
    #[must_use]
    pub fn with_dotenv(self) -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "loaded .env file");
        }
        self
    }

    /// Finalize and return the raw document.
    ///
    /// Applies environment overrides (if a prefix was set) and validates
    /// every policy layer.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override is malformed or a layer is invalid.
    pub fn load(mut self) -> Result<RawPolicyConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        PolicyStore::new(self.raw.clone())?;
        Ok(self.raw)
    }

    /// Finalize and resolve the organization registry.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if loading or resolution fails.
    pub fn load_registry(self, alias: Option<&str>) -> Result<OrganizationRegistry, ConfigError> {
        let raw = self.load()?;
        OrganizationRegistry::resolve(&raw, alias)
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let env_vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();

        for (key, value) in env_vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_parse(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();

        match parts.as_slice() {
            ["ORGANIZATION"] => {
                self.raw.current_organization = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }
            ["DEFAULTS", "ALLOWED_COMMANDS"] => {
                self.raw.defaults.allowed_commands = parse_list(key, value)?;
            }
            ["DEFAULTS", "ALLOWED_SPACES"] => {
                self.raw.defaults.allowed_spaces = parse_list(key, value)?;
            }
            ["DEFAULTS", "ALLOWED_PROJECTS"] => {
                let keys = parse_list(key, value)?;
                self.override_default_projects(keys);
            }

            // Unknown key - ignore
            _ => {}
        }

        Ok(())
    }

    /// Replace the default project keys. Structured rules the document wrote
    /// for keys that stay visible are kept: in place for an explicit list,
    /// moved to `project_rules` when the set becomes open.
    fn override_default_projects(&mut self, keys: RawScope<String>) {
        let defaults = &mut self.raw.defaults;
        let mut rules: Vec<RawProjectRule> = match std::mem::take(&mut defaults.allowed_projects) {
            RawScope::List(entries) => entries
                .into_iter()
                .filter_map(|entry| match entry {
                    RawProjectEntry::Rule(rule) => Some(rule),
                    RawProjectEntry::Key(_) => None,
                })
                .collect(),
            RawScope::All | RawScope::Unset => Vec::new(),
        };

        defaults.allowed_projects = match keys {
            RawScope::List(keys) => RawScope::List(
                keys.into_iter()
                    .map(|key| match rules.iter().position(|rule| rule.key == key) {
                        Some(at) => RawProjectEntry::Rule(rules.swap_remove(at)),
                        None => RawProjectEntry::Key(key),
                    })
                    .collect(),
            ),
            RawScope::All => {
                if !rules.is_empty() {
                    debug!(count = rules.len(), "moving project rules to project_rules");
                    defaults
                        .project_rules
                        .get_or_insert_with(Vec::new)
                        .append(&mut rules);
                }
                RawScope::All
            }
            RawScope::Unset => RawScope::Unset,
        };

        if !rules.is_empty() {
            debug!(count = rules.len(), "dropped rules for projects no longer listed");
        }
    }
}

fn parse(content: &str, format: &str) -> Result<RawPolicyConfig, ConfigError> {
    match format {
        "toml" => Ok(toml::from_str(content)?),
        "json" => Ok(serde_json::from_str(content)?),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}

/// Parse `all` or a comma-separated list. An empty value is an empty list.
fn parse_list(var: &str, value: &str) -> Result<RawScope<String>, ConfigError> {
    let value = value.trim();
    if value == ALL_KEYWORD {
        return Ok(RawScope::All);
    }
    if value.is_empty() {
        return Ok(RawScope::List(Vec::new()));
    }

    let mut items = Vec::new();
    for item in value.split(',') {
        let item = item.trim();
        if item.is_empty() {
            return Err(ConfigError::env_parse(var, "empty entry in list"));
        }
        items.push(item.to_string());
    }
    Ok(RawScope::List(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_loader_new_is_empty() {
        let raw = ConfigLoader::new().load().unwrap();
        assert_eq!(raw, RawPolicyConfig::default());
    }

    #[test]
    fn test_loader_with_string_toml() {
        let raw = ConfigLoader::new()
            .with_string("[defaults]\nallowed_spaces = [\"ENG\"]", "toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(raw.defaults.allowed_spaces, RawScope::List(vec!["ENG".into()]));
    }

    #[test]
    fn test_loader_with_string_json() {
        let raw = ConfigLoader::new()
            .with_string(r#"{"currentOrganization": "acme"}"#, "JSON")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(raw.current_organization.as_deref(), Some("acme"));
    }

    #[test]
    fn test_loader_unsupported_format() {
        let result = ConfigLoader::new().with_string("a: b", "yaml");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_loader_with_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[defaults]\nallowed_commands = [\"issue view\"]").unwrap();

        let raw = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(
            raw.defaults.allowed_commands,
            RawScope::List(vec!["issue view".into()])
        );
    }

    #[test]
    fn test_loader_with_file_not_found() {
        let result = ConfigLoader::new().with_file("/nonexistent/warden.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound { .. })));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let raw = ConfigLoader::new()
            .with_optional_file("/nonexistent/warden.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(raw, RawPolicyConfig::default());
    }

    #[test]
    fn test_load_rejects_invalid_layer() {
        let result = ConfigLoader::new()
            .with_string("[organizations.acme]\nallowed_spaces = [\"\"]", "toml")
            .unwrap()
            .load();
        assert!(result.is_err());
    }

    #[test]
    fn test_apply_env_var_organization() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__ORGANIZATION", "globex", "TEST").unwrap();
        assert_eq!(loader.raw.current_organization.as_deref(), Some("globex"));
    }

    #[test]
    fn test_apply_env_var_lists() {
        let mut loader = ConfigLoader::new();
        loader
            .apply_env_var("TEST__DEFAULTS__ALLOWED_COMMANDS", "issue view, issue list", "TEST")
            .unwrap();
        loader.apply_env_var("TEST__DEFAULTS__ALLOWED_SPACES", "", "TEST").unwrap();
        loader.apply_env_var("TEST__DEFAULTS__ALLOWED_PROJECTS", "all", "TEST").unwrap();

        assert_eq!(
            loader.raw.defaults.allowed_commands,
            RawScope::List(vec!["issue view".into(), "issue list".into()])
        );
        assert_eq!(loader.raw.defaults.allowed_spaces, RawScope::List(vec![]));
        assert_eq!(loader.raw.defaults.allowed_projects, RawScope::All);
    }

    #[test]
    fn test_apply_env_var_project_keys() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__DEFAULTS__ALLOWED_PROJECTS", "OPS,SEC", "TEST").unwrap();
        assert_eq!(
            loader.raw.defaults.allowed_projects,
            RawScope::List(vec![
                RawProjectEntry::Key("OPS".into()),
                RawProjectEntry::Key("SEC".into())
            ])
        );
    }

    const STRUCTURED_DEFAULTS: &str = r#"
        [defaults]
        allowed_projects = ["OPS", { key = "SEC", filters = { jql = "labels = public" } }]
    "#;

    #[test]
    fn test_env_project_keys_keep_structured_rules() {
        let mut loader = ConfigLoader::new()
            .with_string(STRUCTURED_DEFAULTS, "toml")
            .unwrap();
        loader.apply_env_var("TEST__DEFAULTS__ALLOWED_PROJECTS", "SEC,HR", "TEST").unwrap();

        let RawScope::List(entries) = &loader.raw.defaults.allowed_projects else {
            panic!("expected list");
        };
        assert!(matches!(&entries[0], RawProjectEntry::Rule(rule) if rule.key == "SEC" && rule.filters.is_some()));
        assert_eq!(entries[1], RawProjectEntry::Key("HR".into()));

        let doc = crate::resolve(&loader.load().unwrap(), "default").unwrap();
        assert!(doc.projects().rule("SEC").is_some_and(|rule| rule.filters.is_some()));
    }

    #[test]
    fn test_env_open_projects_keep_structured_rules() {
        let mut loader = ConfigLoader::new()
            .with_string(STRUCTURED_DEFAULTS, "toml")
            .unwrap();
        loader.apply_env_var("TEST__DEFAULTS__ALLOWED_PROJECTS", "all", "TEST").unwrap();

        assert_eq!(loader.raw.defaults.allowed_projects, RawScope::All);
        let rules = loader.raw.defaults.project_rules.as_deref().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].key, "SEC");

        let doc = crate::resolve(&loader.load().unwrap(), "default").unwrap();
        assert!(doc.projects().keys().is_all());
        assert!(doc.projects().rule("SEC").is_some_and(|rule| rule.filters.is_some()));
    }

    #[test]
    fn test_apply_env_var_empty_entry() {
        let mut loader = ConfigLoader::new();
        let result = loader.apply_env_var("TEST__DEFAULTS__ALLOWED_SPACES", "ENG,,OPS", "TEST");
        assert!(matches!(result, Err(ConfigError::EnvParse { .. })));
    }

    #[test]
    fn test_apply_env_var_unknown_key_ignored() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SOMETHING__ELSE", "x", "TEST").unwrap();
        assert_eq!(loader.raw, RawPolicyConfig::default());
    }
}
