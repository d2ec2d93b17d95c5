//! The authorization entry point.
//!
//! [`Authorizer`] composes the gates in order, cheapest first:
//!
//! ```text
//! START -> command gate -> project gate -> probe (optional) -> ALLOWED
//!              |                |               |
//!              +----------------+---------------+--> DENIED(reason)
//! ```
//!
//! Each gate runs at most once per request and nothing is retried. The
//! policy document is immutable and shared, so any number of requests can be
//! evaluated concurrently without locking.

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};
use warden_config::{ConfigError, Organization, PolicyDocument, ProjectFilters, Scope};
use warden_telemetry::metrics::record_authz_decision;

use crate::{
    AuthorizationProbe, CommandGate, Denial, DenialReason, ListingScope, ProbeConfig,
    ProjectDenial, ProjectGate, ProjectVisibility, SpaceGate, TrackerClient,
};

/// One operation to authorize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    command: String,
    project_key: Option<String>,
    issue_key: Option<String>,
}

impl AuthorizationRequest {
    /// A request for `command` with no project or issue in scope.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            project_key: None,
            issue_key: None,
        }
    }

    /// Shorthand for a command on one issue.
    pub fn for_issue(command: impl Into<String>, issue_key: impl Into<String>) -> Self {
        Self::new(command).with_issue(issue_key)
    }

    /// Set the project in scope.
    pub fn with_project(mut self, project_key: impl Into<String>) -> Self {
        self.project_key = Some(project_key.into());
        self
    }

    /// Set the issue in scope.
    pub fn with_issue(mut self, issue_key: impl Into<String>) -> Self {
        self.issue_key = Some(issue_key.into());
        self
    }

    /// Canonical command name.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Project key, if known.
    pub fn project_key(&self) -> Option<&str> {
        self.project_key.as_deref()
    }

    /// Issue key, if any.
    pub fn issue_key(&self) -> Option<&str> {
        self.issue_key.as_deref()
    }
}

impl fmt::Display for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command)?;
        match (&self.issue_key, &self.project_key) {
            (Some(issue), _) => write!(f, " on {issue}"),
            (None, Some(project)) => write!(f, " in {project}"),
            (None, None) => Ok(()),
        }
    }
}

/// Result of one item in [`Authorizer::authorize_many`].
#[derive(Debug)]
pub enum BatchOutcome {
    /// The operation may proceed.
    Allowed,
    /// The operation was denied.
    Denied(Denial),
    /// Cancellation arrived before the item's probe was issued.
    Cancelled,
}

impl BatchOutcome {
    /// Whether the item may proceed.
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }
}

/// Authorizes operations for one organization.
#[derive(Clone)]
pub struct Authorizer {
    policy: Arc<PolicyDocument>,
    tracker: Arc<dyn TrackerClient>,
    probe: AuthorizationProbe,
}

impl fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("policy", &self.policy)
            .field("probe", &self.probe)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Create an authorizer over a resolved policy.
    pub fn new(policy: Arc<PolicyDocument>, tracker: Arc<dyn TrackerClient>) -> Self {
        Self {
            policy,
            tracker,
            probe: AuthorizationProbe::default(),
        }
    }

    /// Create an authorizer for a resolved organization.
    pub fn for_organization(organization: &Organization, tracker: Arc<dyn TrackerClient>) -> Self {
        Self::new(Arc::clone(organization.policy()), tracker)
    }

    /// Create an authorizer from a policy resolution result.
    ///
    /// A configuration error becomes a `CONFIG_INVALID` denial, so callers
    /// can render it like any other decision.
    pub fn from_resolution(
        policy: Result<PolicyDocument, ConfigError>,
        tracker: Arc<dyn TrackerClient>,
    ) -> Result<Self, Denial> {
        Ok(Self::new(Arc::new(policy?), tracker))
    }

    /// Replace the probe configuration.
    #[must_use]
    pub fn with_probe_config(mut self, config: ProbeConfig) -> Self {
        self.probe = AuthorizationProbe::new(config);
        self
    }

    /// The policy in effect.
    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }

    /// The probe in use.
    pub const fn probe(&self) -> &AuthorizationProbe {
        &self.probe
    }

    /// Authorize one operation.
    ///
    /// Returns `Ok(())` when allowed. A denial carries a closed reason;
    /// check [`Denial::is_fatal`] to decide between stopping and skipping.
    #[instrument(
        skip(self, request),
        fields(command = %request.command, project = ?request.project_key, issue = ?request.issue_key)
    )]
    pub async fn authorize(&self, request: &AuthorizationRequest) -> Result<(), Denial> {
        let decision = match self.admit(request).await {
            Ok(Some(pending)) => self.run_probe(pending).await,
            Ok(None) => Ok(()),
            Err(denial) => Err(denial),
        };
        report(decision)
    }

    /// One batch item: like [`Authorizer::authorize`], but `cancel` is read
    /// before the item starts and again before its probe is issued.
    #[instrument(
        skip(self, request, cancel),
        fields(command = %request.command, project = ?request.project_key, issue = ?request.issue_key)
    )]
    async fn authorize_item(
        &self,
        request: &AuthorizationRequest,
        cancel: &watch::Receiver<bool>,
    ) -> BatchOutcome {
        if *cancel.borrow() {
            return BatchOutcome::Cancelled;
        }
        let decision = match self.admit(request).await {
            Ok(Some(_)) if *cancel.borrow() => {
                debug!("cancelled before the probe was issued");
                return BatchOutcome::Cancelled;
            }
            Ok(Some(pending)) => self.run_probe(pending).await,
            Ok(None) => Ok(()),
            Err(denial) => Err(denial),
        };
        match report(decision) {
            Ok(()) => BatchOutcome::Allowed,
            Err(denial) => BatchOutcome::Denied(denial),
        }
    }

    /// Run every gate up to the probe.
    ///
    /// `Ok(None)` allows the request outright. `Ok(Some(_))` means the
    /// project is filtered and the issue must still be probed.
    async fn admit<'r>(
        &self,
        request: &'r AuthorizationRequest,
    ) -> Result<Option<PendingProbe<'r>>, Denial> {
        let command = request.command();
        if !CommandGate::is_allowed(&self.policy, command) {
            return Err(self.command_denied(command));
        }

        let project_key = match (request.project_key(), request.issue_key()) {
            (_, Some(_)) if self.projects_unrestricted() => return Ok(None),
            (Some(project), Some(issue)) => self.confirm_project(project, issue).await?,
            (None, Some(issue)) => self.probe.project_key_of(issue, &*self.tracker).await?,
            (Some(project), None) => project.to_string(),
            (None, None) => return Ok(None),
        };

        let filters = match ProjectGate::resolve(&self.policy, &project_key, command) {
            ProjectVisibility::Denied(ProjectDenial::NotVisible) => {
                return Err(self.project_denied(&project_key));
            }
            ProjectVisibility::Denied(ProjectDenial::CommandNotPermitted) => {
                return Err(self.project_command_denied(&project_key, command));
            }
            ProjectVisibility::AllowedUnrestricted => return Ok(None),
            ProjectVisibility::AllowedWithFilters(filters) => filters,
        };

        let Some(issue_key) = request.issue_key() else {
            debug!(project = %project_key, "no issue in scope, filters apply at listing time");
            return Ok(None);
        };

        Ok(Some(PendingProbe {
            issue_key,
            project_key,
            filters,
        }))
    }

    async fn run_probe(&self, pending: PendingProbe<'_>) -> Result<(), Denial> {
        let PendingProbe {
            issue_key,
            project_key,
            filters,
        } = pending;

        if self
            .probe
            .check(issue_key, Some(&filters), &*self.tracker)
            .await?
        {
            Ok(())
        } else {
            Err(Denial::new(
                DenialReason::FilterMismatch,
                format!("{issue_key} does not match the filters configured for project {project_key}"),
            )
            .with_hint(format!(
                "project {project_key} only exposes issues you participated in or that match its configured query"
            )))
        }
    }

    /// The project an issue belongs to, which must be `claimed`.
    ///
    /// A `PROJECT-N` key is checked by its prefix. Any other key form is
    /// looked up on the tracker.
    async fn confirm_project(&self, claimed: &str, issue_key: &str) -> Result<String, Denial> {
        let actual = match issue_project_prefix(issue_key) {
            Some(prefix) => prefix.to_string(),
            None => self.probe.project_key_of(issue_key, &*self.tracker).await?,
        };
        if actual == claimed {
            Ok(actual)
        } else {
            Err(Denial::new(
                DenialReason::ProjectNotAllowed,
                format!("{issue_key} belongs to project {actual}, not {claimed}"),
            ))
        }
    }

    /// Authorize a command on a content space.
    pub fn authorize_space(&self, space_key: &str, command: &str) -> Result<(), Denial> {
        let decision = if !CommandGate::is_allowed(&self.policy, command) {
            Err(self.command_denied(command))
        } else if SpaceGate::is_visible(&self.policy, space_key) {
            Ok(())
        } else {
            let mut denial = Denial::new(
                DenialReason::SpaceNotAllowed,
                format!("space {space_key} is not visible for this organization"),
            );
            if let Some(hint) = listed("visible spaces", self.policy.spaces()) {
                denial = denial.with_hint(hint);
            }
            Err(denial)
        };

        record(&decision);
        if let Err(denial) = &decision {
            info!(space = space_key, command, reason = %denial.reason(), "denied");
        }
        decision
    }

    /// The project restriction a listing command must apply.
    pub fn listing_scope(&self, command: &str) -> ListingScope {
        crate::listing::listing_scope(&self.policy, command, &self.probe)
    }

    /// Authorize many operations independently.
    ///
    /// At most `concurrency` requests are in flight. Outcomes are returned in
    /// request order. One item's failure or timeout affects only that item.
    /// Once `cancel` reads `true`, no further probes are issued: unstarted
    /// items and items still resolving their project report
    /// [`BatchOutcome::Cancelled`]. Probes already sent complete.
    pub async fn authorize_many(
        &self,
        requests: Vec<AuthorizationRequest>,
        concurrency: usize,
        cancel: watch::Receiver<bool>,
    ) -> Vec<BatchOutcome> {
        let total = requests.len();
        let outcomes: Vec<BatchOutcome> = stream::iter(requests)
            .map(|request| {
                let cancel = cancel.clone();
                async move { self.authorize_item(&request, &cancel).await }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

        let allowed = outcomes.iter().filter(|o| o.is_allowed()).count();
        let cancelled = outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Cancelled))
            .count();
        info!(total, allowed, cancelled, "batch authorization finished");
        outcomes
    }

    fn projects_unrestricted(&self) -> bool {
        let projects = self.policy.projects();
        projects.keys().is_all() && projects.rules().next().is_none()
    }

    fn command_denied(&self, command: &str) -> Denial {
        let mut denial = Denial::new(
            DenialReason::CommandNotAllowed,
            format!("command '{command}' is not allowed for this organization"),
        );
        if let Some(hint) = listed("allowed commands", self.policy.commands()) {
            denial = denial.with_hint(hint);
        }
        denial
    }

    fn project_denied(&self, project_key: &str) -> Denial {
        let mut denial = Denial::new(
            DenialReason::ProjectNotAllowed,
            format!("project {project_key} is not visible for this organization"),
        );
        if let Some(hint) = listed("visible projects", self.policy.projects().keys()) {
            denial = denial.with_hint(hint);
        }
        denial
    }

    fn project_command_denied(&self, project_key: &str, command: &str) -> Denial {
        let mut denial = Denial::new(
            DenialReason::CommandNotAllowed,
            format!("command '{command}' is not permitted for project {project_key}"),
        );
        if let Some(rule) = self.policy.projects().rule(project_key) {
            if let Some(hint) = listed(&format!("commands allowed on {project_key}"), &rule.commands) {
                denial = denial.with_hint(hint);
            }
        }
        denial
    }
}

/// A request that passed the gates but still needs the probe.
struct PendingProbe<'r> {
    issue_key: &'r str,
    project_key: String,
    filters: ProjectFilters,
}

/// `OPS` for `OPS-12`. `None` when the key is not in `PROJECT-N` form.
fn issue_project_prefix(issue_key: &str) -> Option<&str> {
    let (project, number) = issue_key.rsplit_once('-')?;
    let numeric = !number.is_empty() && number.bytes().all(|b| b.is_ascii_digit());
    (numeric && !project.is_empty()).then_some(project)
}

fn report(decision: Result<(), Denial>) -> Result<(), Denial> {
    record(&decision);
    match &decision {
        Ok(()) => debug!("allowed"),
        Err(denial) if denial.reason() == DenialReason::ProbeUnavailable => {
            warn!(reason = %denial.reason(), detail = denial.detail(), "could not check policy");
        }
        Err(denial) => info!(reason = %denial.reason(), detail = denial.detail(), "denied"),
    }
    decision
}

fn listed(label: &str, scope: &Scope) -> Option<String> {
    let names = scope.names()?;
    if names.is_empty() {
        return Some(format!("{label}: none"));
    }
    Some(format!(
        "{label}: {}",
        names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    ))
}

fn record(decision: &Result<(), Denial>) {
    match decision {
        Ok(()) => record_authz_decision(true, None),
        Err(denial) => record_authz_decision(false, Some(denial.reason().code())),
    }
}
