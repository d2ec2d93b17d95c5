//! Server-side filter probe.
//!
//! Participation filters depend on change history ("was ever assignee") that
//! only the tracker can evaluate. Instead of reconstructing history locally,
//! the probe asks the tracker to search for the one issue under the filter
//! and treats an empty result as "does not match".
//!
//! ```text
//! key = "OPS-5" AND (assignee WAS currentUser() OR (labels = public))
//! ```
//!
//! Failures never become allowances: a search error surfaces as
//! [`ProbeUnavailable`].

use std::future::Future;

use tracing::{debug, instrument, warn};
use warden_config::ProjectFilters;
use warden_telemetry::metrics::{record_probe, ProbeOutcome};

use crate::{ProbeConfig, ProbeUnavailable, TrackerClient, TrackerError};

/// Probe searches only ever need one hit.
pub const PROBE_MAX_RESULTS: u32 = 1;

/// Quote a value as a JQL string literal.
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if matches!(c, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Evaluates project filters against the tracker.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationProbe {
    config: ProbeConfig,
}

impl AuthorizationProbe {
    /// Create a probe.
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// The probe configuration.
    pub const fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// OR-branches for `filters`, in a fixed order: participation flags,
    /// then the raw fragment.
    pub fn branches(&self, filters: &ProjectFilters) -> Vec<String> {
        let mut branches = Vec::new();

        if let Some(participated) = &filters.participated {
            let flags = [
                (participated.was_assignee, &self.config.assignee_predicate),
                (participated.was_reporter, &self.config.reporter_predicate),
                (participated.was_commenter, &self.config.commenter_predicate),
                (participated.is_watcher, &self.config.watcher_predicate),
            ];
            branches.extend(
                flags
                    .into_iter()
                    .filter(|(set, _)| *set)
                    .map(|(_, predicate)| predicate.clone()),
            );
        }

        if let Some(jql) = filters.jql.as_deref() {
            if !jql.trim().is_empty() {
                branches.push(format!("({jql})"));
            }
        }

        branches
    }

    /// Build the probe query for one issue, or `None` if the filters impose
    /// nothing.
    pub fn build_query(&self, issue_key: &str, filters: &ProjectFilters) -> Option<String> {
        let branches = self.branches(filters);
        if branches.is_empty() {
            return None;
        }
        Some(format!(
            "key = {} AND ({})",
            quote(issue_key),
            branches.join(" OR ")
        ))
    }

    /// Does `issue_key` satisfy `filters`.
    ///
    /// Absent filters, or filters with nothing enabled, match trivially and
    /// make no network call.
    #[instrument(skip(self, filters, tracker), fields(issue = %issue_key))]
    pub async fn check(
        &self,
        issue_key: &str,
        filters: Option<&ProjectFilters>,
        tracker: &dyn TrackerClient,
    ) -> Result<bool, ProbeUnavailable> {
        let Some(jql) = filters.and_then(|f| self.build_query(issue_key, f)) else {
            debug!("no filter branches, probe skipped");
            return Ok(true);
        };

        debug!(%jql, "probing tracker");
        let found = self
            .bounded(tracker.search(&jql, PROBE_MAX_RESULTS))
            .await
            .map_err(|cause| {
                record_probe(ProbeOutcome::Unavailable);
                warn!(error = %cause, "probe unavailable");
                ProbeUnavailable {
                    issue_key: issue_key.to_string(),
                    cause,
                }
            })?;

        let matched = found.iter().any(|issue| issue.key == issue_key);
        record_probe(if matched {
            ProbeOutcome::Match
        } else {
            ProbeOutcome::NoMatch
        });
        debug!(matched, returned = found.len(), "probe finished");
        Ok(matched)
    }

    /// Look up the project of an issue, under the same timeout as a probe.
    pub async fn project_key_of(
        &self,
        issue_key: &str,
        tracker: &dyn TrackerClient,
    ) -> Result<String, ProbeUnavailable> {
        self.bounded(tracker.fetch_issue_project_key(issue_key))
            .await
            .map_err(|cause| {
                warn!(issue = issue_key, error = %cause, "project lookup failed");
                ProbeUnavailable {
                    issue_key: issue_key.to_string(),
                    cause,
                }
            })
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, TrackerError>>,
    ) -> Result<T, TrackerError> {
        tokio::time::timeout(self.config.timeout, call)
            .await
            .map_err(|_| TrackerError::Timeout(self.config.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_config::Participation;

    fn probe() -> AuthorizationProbe {
        AuthorizationProbe::default()
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("OPS-5"), r#""OPS-5""#);
        assert_eq!(quote(r#"a"b\c"#), r#""a\"b\\c""#);
    }

    #[test]
    fn test_branches_follow_flag_order() {
        let filters = ProjectFilters::participated(Participation {
            was_assignee: true,
            was_reporter: false,
            was_commenter: true,
            is_watcher: true,
        })
        .with_jql("labels = public");

        assert_eq!(
            probe().branches(&filters),
            vec![
                "assignee WAS currentUser()".to_string(),
                r#"issueFunction in commented("by currentUser()")"#.to_string(),
                "watcher = currentUser()".to_string(),
                "(labels = public)".to_string(),
            ]
        );
    }

    #[test]
    fn test_build_query_combines_branches() {
        let filters = ProjectFilters::participated(Participation {
            was_assignee: true,
            ..Participation::default()
        })
        .with_jql("status = Done");

        assert_eq!(
            probe().build_query("OPS-5", &filters).unwrap(),
            r#"key = "OPS-5" AND (assignee WAS currentUser() OR (status = Done))"#
        );
    }

    #[test]
    fn test_empty_filters_build_nothing() {
        let filters = ProjectFilters::participated(Participation::default());
        assert!(probe().build_query("OPS-5", &filters).is_none());
        assert!(probe().build_query("OPS-5", &ProjectFilters::default()).is_none());
        assert!(probe()
            .build_query("OPS-5", &ProjectFilters::jql("  "))
            .is_none());
    }

    #[test]
    fn test_custom_predicates() {
        let probe = AuthorizationProbe::new(
            ProbeConfig::new().with_commenter_predicate("comment ~ currentUser()"),
        );
        let filters = ProjectFilters::participated(Participation {
            was_commenter: true,
            ..Participation::default()
        });
        assert_eq!(
            probe.build_query("A-1", &filters).unwrap(),
            r#"key = "A-1" AND (comment ~ currentUser())"#
        );
    }
}
