//! The tracker collaborator.
//!
//! Authorization needs two things from the issue tracker: a JQL search and a
//! lookup of an issue's project. Both are behind [`TrackerClient`] so the
//! decision logic can run against the HTTP client or an in-memory double.
//!
//! # Example
//!
//! ```ignore
//! use warden_authz::{BoxFuture, IssueRef, TrackerClient, TrackerError};
//!
//! struct Offline;
//!
//! impl TrackerClient for Offline {
//!     fn search<'a>(
//!         &'a self,
//!         _jql: &'a str,
//!         _max_results: u32,
//!     ) -> BoxFuture<'a, Result<Vec<IssueRef>, TrackerError>> {
//!         Box::pin(async { Err(TrackerError::Transport("offline".into())) })
//!     }
//!
//!     fn fetch_issue_project_key<'a>(
//!         &'a self,
//!         issue_key: &'a str,
//!     ) -> BoxFuture<'a, Result<String, TrackerError>> {
//!         Box::pin(async move { Err(TrackerError::NotFound(issue_key.to_string())) })
//!     }
//! }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;

use crate::TrackerError;

/// A boxed future, so the trait stays object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An issue returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueRef {
    /// Issue key, e.g. `OPS-5`.
    pub key: String,
}

impl IssueRef {
    /// Create a reference from a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Search and lookup operations the authorization layer needs.
///
/// Implementations run with the credentials of the acting user, so searches
/// only ever return issues that user can already see.
pub trait TrackerClient: Send + Sync {
    /// Run a JQL search, returning at most `max_results` issues.
    fn search<'a>(
        &'a self,
        jql: &'a str,
        max_results: u32,
    ) -> BoxFuture<'a, Result<Vec<IssueRef>, TrackerError>>;

    /// Fetch the key of the project an issue belongs to.
    fn fetch_issue_project_key<'a>(
        &'a self,
        issue_key: &'a str,
    ) -> BoxFuture<'a, Result<String, TrackerError>>;
}

impl<T: TrackerClient + ?Sized> TrackerClient for Arc<T> {
    fn search<'a>(
        &'a self,
        jql: &'a str,
        max_results: u32,
    ) -> BoxFuture<'a, Result<Vec<IssueRef>, TrackerError>> {
        (**self).search(jql, max_results)
    }

    fn fetch_issue_project_key<'a>(
        &'a self,
        issue_key: &'a str,
    ) -> BoxFuture<'a, Result<String, TrackerError>> {
        (**self).fetch_issue_project_key(issue_key)
    }
}
