//! Warden Authorization - gates, probe and orchestrator
//!
//! This crate decides whether an operation on the ticket tracker is allowed
//! under an organization's [`PolicyDocument`](warden_config::PolicyDocument).
//! It only ever adds restriction on top of what the tracker itself enforces.
//!
//! # Overview
//!
//! The authorization pipeline:
//! - [`CommandGate`] checks the command name, with no network
//! - [`ProjectGate`] checks project visibility and exposes sub-filters
//! - [`SpaceGate`] checks content-space visibility
//! - [`AuthorizationProbe`] asks the tracker whether an issue satisfies
//!   sub-filters it cannot evaluate locally
//! - [`Authorizer`] composes the gates into one `authorize` call
//!
//! # Architecture
//!
//! ```text
//!   AuthorizationRequest
//!          │
//!   ┌──────▼───────┐  deny   ┌──────────────────────┐
//!   │ CommandGate  │────────►│ Denial {reason, ..}  │
//!   └──────┬───────┘         └──────────▲───────────┘
//!   ┌──────▼───────┐  deny              │
//!   │ ProjectGate  │────────────────────┤
//!   └──────┬───────┘                    │
//!          │ filters + issue key        │ empty / error
//!   ┌──────▼───────────┐   search   ┌───┴──────────┐
//!   │ AuthorizationProbe│──────────►│ TrackerClient │
//!   └──────┬───────────┘            └──────────────┘
//!          ▼
//!       allowed
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use warden_authz::{AuthorizationRequest, Authorizer, JiraClient};
//! use warden_config::{ConfigLoader, OrganizationRegistry};
//!
//! let raw = ConfigLoader::new().with_file("warden.toml")?.load()?;
//! let registry = OrganizationRegistry::resolve(&raw, None)?;
//! let org = registry.active();
//! let client = JiraClient::new(org.credentials().expect("credentials"))?;
//!
//! let authorizer = Authorizer::for_organization(org, Arc::new(client));
//! let request = AuthorizationRequest::for_issue("issue comment", "OPS-5");
//! if let Err(denial) = authorizer.authorize(&request).await {
//!     eprintln!("{denial}");
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authorizer;
pub mod config;
pub mod error;
pub mod gates;
pub mod jira;
pub mod listing;
pub mod probe;
pub mod tracker;

// Re-exports for convenience
pub use authorizer::{AuthorizationRequest, Authorizer, BatchOutcome};
pub use config::ProbeConfig;
pub use error::{Denial, DenialReason, ProbeUnavailable, TrackerError};
pub use gates::{CommandGate, ProjectDenial, ProjectGate, ProjectVisibility, SpaceGate};
pub use jira::JiraClient;
pub use listing::{listing_scope, ListingScope};
pub use probe::{AuthorizationProbe, PROBE_MAX_RESULTS};
pub use tracker::{BoxFuture, IssueRef, TrackerClient};
