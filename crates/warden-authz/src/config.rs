//! Configuration for the authorization probe.

use std::time::Duration;

/// Configuration for [`AuthorizationProbe`](crate::AuthorizationProbe).
///
/// The participation predicates are JQL fragments. The commenter predicate
/// needs a search extension on most tracker sites, so it can be replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    /// Predicate for "was ever the assignee".
    pub assignee_predicate: String,
    /// Predicate for "was ever the reporter".
    pub reporter_predicate: String,
    /// Predicate for "has commented".
    pub commenter_predicate: String,
    /// Predicate for "is currently watching".
    pub watcher_predicate: String,
    /// Upper bound for a single tracker call.
    pub timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            assignee_predicate: "assignee WAS currentUser()".to_string(),
            reporter_predicate: "reporter WAS currentUser()".to_string(),
            commenter_predicate: r#"issueFunction in commented("by currentUser()")"#.to_string(),
            watcher_predicate: "watcher = currentUser()".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ProbeConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the assignee predicate.
    pub fn with_assignee_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.assignee_predicate = predicate.into();
        self
    }

    /// Set the reporter predicate.
    pub fn with_reporter_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.reporter_predicate = predicate.into();
        self
    }

    /// Set the commenter predicate.
    pub fn with_commenter_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.commenter_predicate = predicate.into();
        self
    }

    /// Set the watcher predicate.
    pub fn with_watcher_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.watcher_predicate = predicate.into();
        self
    }

    /// Set the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Create a production configuration.
    pub fn production() -> Self {
        Self::default().with_timeout(Duration::from_secs(5))
    }

    /// Create a development configuration.
    pub fn development() -> Self {
        Self::default().with_timeout(Duration::from_secs(30))
    }
}
