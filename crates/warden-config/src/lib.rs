//! Layered policy configuration for Warden.
//!
//! This crate loads the access-policy document that sits in front of a
//! ticket-tracking API and resolves it into an effective, immutable
//! [`PolicyDocument`] per organization:
//! - TOML and JSON documents
//! - A shared `defaults` block, overridden per organization alias
//! - Field-level replace-or-inherit merging
//! - Open-by-default: anything left unconfigured is unrestricted
//! - Strict structural validation (fails on unknown fields)
//!
//! # Overview
//!
//! - [`ConfigLoader`] - reads the raw document from files, strings and env
//! - [`PolicyStore`] - validates the document and resolves per-alias policy
//! - [`OrganizationRegistry`] - every organization resolved, one active
//! - [`PolicyDocument`] - the merged policy the gates evaluate
//!
//! # Example
//!
//! ```
//! use warden_config::{ConfigLoader, OrganizationRegistry, Scope};
//!
//! # fn main() -> Result<(), warden_config::ConfigError> {
//! let raw = ConfigLoader::new()
//!     .with_string(
//!         r#"
//!         [defaults]
//!         allowed_projects = ["A", "B"]
//!
//!         [organizations.acme]
//!         allowed_projects = ["C"]
//!         "#,
//!         "toml",
//!     )?
//!     .load()?;
//!
//! let registry = OrganizationRegistry::resolve(&raw, Some("acme"))?;
//! let policy = registry.active().policy();
//! assert_eq!(policy.projects().keys(), &Scope::only(["C"]));
//! assert!(policy.commands().is_all());
//! # Ok(())
//! # }
//! ```
//!
//! # Document Format
//!
//! ```toml
//! current_organization = "acme"
//!
//! [defaults]
//! allowed_projects = "all"
//! allowed_commands = ["issue view", "issue list", "issue comment"]
//! project_rules = [{ key = "SEC", commands = ["issue view"] }]
//!
//! [organizations.acme]
//! site_url = "https://acme.atlassian.net"
//! email = "bot@acme.io"
//! api_token_env = "ACME_TRACKER_TOKEN"
//! allowed_projects = [
//!     "OPS",
//!     { key = "HR", filters = { participated = { was_assignee = true, was_commenter = true } } },
//! ]
//! allowed_spaces = ["ENG"]
//! ```

#![warn(missing_docs)]

mod error;
mod loader;
mod policy;
mod registry;
pub mod schema;
mod store;

pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use policy::{Participation, PolicyDocument, ProjectFilters, ProjectPolicy, ProjectRule, Scope};
pub use registry::{Credentials, Organization, OrganizationRegistry, DEFAULT_ALIAS};
pub use schema::RawPolicyConfig;
pub use store::{resolve, PolicyStore};
