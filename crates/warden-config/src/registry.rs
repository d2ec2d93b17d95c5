//! Organization registry.
//!
//! Maps organization aliases to their effective policy and tracker
//! credentials, with exactly one alias active. The registry is resolved once
//! and never mutated; switching organization means resolving a new registry.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::schema::{RawOrganization, RawPolicyConfig};
use crate::{ConfigError, PolicyDocument, PolicyStore};

/// Alias used when the document declares no organizations.
pub const DEFAULT_ALIAS: &str = "default";

/// Tracker credentials for one organization.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Site root URL, without trailing slash.
    pub site_url: String,
    /// Account email.
    pub email: String,
    /// API token.
    pub api_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("site_url", &self.site_url)
            .field("email", &self.email)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// One resolved organization.
#[derive(Debug, Clone)]
pub struct Organization {
    alias: String,
    policy: Arc<PolicyDocument>,
    credentials: Option<Credentials>,
}

impl Organization {
    /// Organization alias.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Effective policy, shared read-only.
    pub fn policy(&self) -> &Arc<PolicyDocument> {
        &self.policy
    }

    /// Tracker credentials, if configured.
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

/// All organizations of a document with one active alias.
#[derive(Debug, Clone)]
pub struct OrganizationRegistry {
    organizations: BTreeMap<String, Organization>,
    current: String,
}

impl OrganizationRegistry {
    /// Resolve every organization of `raw` and activate one.
    ///
    /// The active alias is `alias` if given, else `current_organization`,
    /// else the only declared organization. A document with no organizations
    /// activates [`DEFAULT_ALIAS`] with the defaults policy.
    ///
    /// Token variables are read from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any organization is malformed, the chosen
    /// alias is not declared, or more than one organization is declared and
    /// none is selected.
    pub fn resolve(raw: &RawPolicyConfig, alias: Option<&str>) -> Result<Self, ConfigError> {
        Self::resolve_with_env(raw, alias, |var| std::env::var(var).ok())
    }

    /// Like [`resolve`](Self::resolve), with an explicit environment lookup.
    pub fn resolve_with_env<F>(
        raw: &RawPolicyConfig,
        alias: Option<&str>,
        env: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = PolicyStore::new(raw.clone())?;

        let mut organizations = BTreeMap::new();
        if raw.organizations.is_empty() {
            organizations.insert(
                DEFAULT_ALIAS.to_string(),
                Organization {
                    alias: DEFAULT_ALIAS.to_string(),
                    policy: Arc::new(store.resolve_defaults()?),
                    credentials: None,
                },
            );
        }
        for (name, org) in &raw.organizations {
            organizations.insert(
                name.clone(),
                Organization {
                    alias: name.clone(),
                    policy: Arc::new(store.resolve(name)?),
                    credentials: credentials(name, org, &env)?,
                },
            );
        }

        let current = select_alias(raw, alias, &organizations)?;
        info!(
            organization = %current,
            declared = organizations.len(),
            "resolved organization registry"
        );

        Ok(Self {
            organizations,
            current,
        })
    }

    /// Alias of the active organization.
    pub fn current_alias(&self) -> &str {
        &self.current
    }

    /// The active organization.
    pub fn active(&self) -> &Organization {
        // `current` is always a key of `organizations`; see `select_alias`.
        &self.organizations[&self.current]
    }

    /// Declared aliases, sorted.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.organizations.keys().map(String::as_str)
    }
}

fn select_alias(
    raw: &RawPolicyConfig,
    requested: Option<&str>,
    organizations: &BTreeMap<String, Organization>,
) -> Result<String, ConfigError> {
    let declared = || organizations.keys().map(String::as_str);

    let chosen = match requested.or(raw.current_organization.as_deref()) {
        Some(alias) => alias.to_string(),
        None if organizations.len() == 1 => {
            declared().next().unwrap_or(DEFAULT_ALIAS).to_string()
        }
        None => {
            return Err(ConfigError::invalid_value(
                "current_organization",
                format!(
                    "several organizations are declared ({}); select one",
                    declared().collect::<Vec<_>>().join(", ")
                ),
            ))
        }
    };

    if organizations.contains_key(&chosen) {
        Ok(chosen)
    } else {
        Err(ConfigError::unknown_organization(chosen, declared()))
    }
}

fn credentials<F>(
    alias: &str,
    org: &RawOrganization,
    env: &F,
) -> Result<Option<Credentials>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let field = |name: &str| format!("organizations.{alias}.{name}");

    let token = match (&org.api_token, &org.api_token_env) {
        (Some(_), Some(_)) => {
            return Err(ConfigError::invalid_value(
                field("api_token"),
                "set either api_token or api_token_env, not both",
            ))
        }
        (Some(token), None) => Some(token.clone()),
        (None, Some(var)) => Some(env(var).ok_or_else(|| ConfigError::MissingToken {
            alias: alias.to_string(),
            var: var.clone(),
        })?),
        (None, None) => None,
    };

    match (&org.site_url, &org.email, token) {
        (None, None, None) => Ok(None),
        (Some(site_url), Some(email), Some(api_token)) => {
            let site_url = site_url.trim_end_matches('/').to_string();
            if !(site_url.starts_with("https://") || site_url.starts_with("http://")) {
                return Err(ConfigError::invalid_value(
                    field("site_url"),
                    format!("expected an http(s) URL, got '{site_url}'"),
                ));
            }
            Ok(Some(Credentials {
                site_url,
                email: email.clone(),
                api_token,
            }))
        }
        _ => Err(ConfigError::invalid_value(
            field("site_url"),
            "site_url, email and an API token must be configured together",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Scope;

    fn raw(toml: &str) -> RawPolicyConfig {
        toml::from_str(toml).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_no_organizations_uses_default_alias() {
        let registry = OrganizationRegistry::resolve_with_env(&raw(""), None, no_env).unwrap();
        assert_eq!(registry.current_alias(), DEFAULT_ALIAS);
        assert_eq!(**registry.active().policy(), PolicyDocument::open());
        assert!(registry.active().credentials().is_none());
    }

    #[test]
    fn test_single_organization_is_selected() {
        let registry = OrganizationRegistry::resolve_with_env(
            &raw("[organizations.acme]\nallowed_commands = [\"issue view\"]"),
            None,
            no_env,
        )
        .unwrap();
        assert_eq!(registry.current_alias(), "acme");
        assert_eq!(
            registry.active().policy().commands(),
            &Scope::only(["issue view"])
        );
    }

    #[test]
    fn test_current_organization_and_explicit_alias() {
        let doc = raw(
            r#"
            current_organization = "acme"
            [organizations.acme]
            [organizations.globex]
            allowed_spaces = []
            "#,
        );
        let registry = OrganizationRegistry::resolve_with_env(&doc, None, no_env).unwrap();
        assert_eq!(registry.current_alias(), "acme");

        let registry =
            OrganizationRegistry::resolve_with_env(&doc, Some("globex"), no_env).unwrap();
        assert_eq!(registry.current_alias(), "globex");
        assert!(!registry.active().policy().spaces().permits("ENG"));
        assert_eq!(registry.aliases().collect::<Vec<_>>(), vec!["acme", "globex"]);
    }

    #[test]
    fn test_ambiguous_selection_rejected() {
        let doc = raw("[organizations.acme]\n[organizations.globex]");
        let err = OrganizationRegistry::resolve_with_env(&doc, None, no_env).unwrap_err();
        assert!(err.to_string().contains("select one"));
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let doc = raw("[organizations.acme]");
        let err = OrganizationRegistry::resolve_with_env(&doc, Some("initech"), no_env).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOrganization { .. }));
    }

    #[test]
    fn test_credentials_from_env() {
        let doc = raw(
            r#"
            [organizations.acme]
            site_url = "https://acme.atlassian.net/"
            email = "bot@acme.io"
            api_token_env = "ACME_TOKEN"
            "#,
        );
        let registry = OrganizationRegistry::resolve_with_env(&doc, None, |var| {
            (var == "ACME_TOKEN").then(|| "s3cret".to_string())
        })
        .unwrap();
        let creds = registry.active().credentials().unwrap();
        assert_eq!(creds.site_url, "https://acme.atlassian.net");
        assert_eq!(creds.api_token, "s3cret");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn test_missing_token_variable() {
        let doc = raw(
            r#"
            [organizations.acme]
            site_url = "https://acme.atlassian.net"
            email = "bot@acme.io"
            api_token_env = "ACME_TOKEN"
            "#,
        );
        let err = OrganizationRegistry::resolve_with_env(&doc, None, no_env).unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken { .. }));
    }

    #[test]
    fn test_partial_credentials_rejected() {
        let doc = raw("[organizations.acme]\nsite_url = \"https://acme.atlassian.net\"");
        assert!(OrganizationRegistry::resolve_with_env(&doc, None, no_env).is_err());
    }

    #[test]
    fn test_both_token_sources_rejected() {
        let doc = raw(
            r#"
            [organizations.acme]
            site_url = "https://acme.atlassian.net"
            email = "bot@acme.io"
            api_token = "inline"
            api_token_env = "ACME_TOKEN"
            "#,
        );
        assert!(OrganizationRegistry::resolve_with_env(&doc, None, no_env).is_err());
    }
}
