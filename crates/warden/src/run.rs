//! Command execution.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use serde_json::json;
use tokio::sync::watch;
use tracing::{info, warn};
use warden_authz::{
    AuthorizationRequest, Authorizer, BatchOutcome, BoxFuture, Denial, DenialReason, IssueRef,
    JiraClient, ListingScope, ProbeConfig, TrackerClient, TrackerError,
};
use warden_config::{ConfigLoader, OrganizationRegistry, DEFAULT_ENV_PREFIX};
use warden_telemetry::{init_logging, init_metrics, render_metrics, MetricsConfig};

use crate::cli::{CheckArgs, Cli, Command, ScopeArgs, DEFAULT_CONFIG_FILE};

/// How a command ended, mapped onto the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Outcome {
    /// Everything was allowed.
    Allowed,
    /// At least one item was skipped (filter mismatch or probe failure).
    Skipped,
    /// A fatal denial.
    Fatal,
    /// Interrupted before every item was decided.
    Interrupted,
}

impl Outcome {
    /// Outcome of a single decision.
    pub fn of(decision: &Result<(), Denial>) -> Self {
        match decision {
            Ok(()) => Self::Allowed,
            Err(denial) if denial.is_fatal() => Self::Fatal,
            Err(_) => Self::Skipped,
        }
    }

    /// Process exit code.
    pub fn exit_code(self) -> ExitCode {
        match self {
            Self::Allowed => ExitCode::SUCCESS,
            Self::Fatal => ExitCode::from(2),
            Self::Skipped => ExitCode::from(3),
            Self::Interrupted => ExitCode::from(130),
        }
    }
}

/// Tracker used when the active organization has no credentials.
///
/// Every call fails, so filtered projects fail closed.
#[derive(Debug)]
pub struct UnconfiguredTracker {
    alias: String,
}

impl UnconfiguredTracker {
    /// Create a tracker for `alias`.
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
        }
    }

    fn error(&self) -> TrackerError {
        TrackerError::Transport(format!(
            "no tracker credentials configured for organization '{}'",
            self.alias
        ))
    }
}

impl TrackerClient for UnconfiguredTracker {
    fn search<'a>(
        &'a self,
        _jql: &'a str,
        _max_results: u32,
    ) -> BoxFuture<'a, Result<Vec<IssueRef>, TrackerError>> {
        Box::pin(async move { Err(self.error()) })
    }

    fn fetch_issue_project_key<'a>(
        &'a self,
        _issue_key: &'a str,
    ) -> BoxFuture<'a, Result<String, TrackerError>> {
        Box::pin(async move { Err(self.error()) })
    }
}

/// Run the CLI: initialise telemetry, resolve the policy and execute.
pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut log_config = cli.profile.log_config();
    if cli.verbose > 0 {
        log_config = log_config.with_verbosity(cli.verbose);
    }
    if let Some(format) = cli.log_format {
        log_config = log_config.with_format(format);
    }
    init_logging(&log_config).context("failed to initialise logging")?;
    init_metrics(&MetricsConfig {
        enabled: cli.metrics,
    })
    .context("failed to initialise metrics")?;

    let registry = match load_registry(&cli) {
        Ok(registry) => registry,
        Err(err) => {
            let denial = Denial::from(err);
            write_line(&mut std::io::stdout(), &decision_json("configuration", &Err(denial)))?;
            return Ok(ExitCode::FAILURE);
        }
    };

    let organization = registry.active();
    let tracker: Arc<dyn TrackerClient> = match organization.credentials() {
        Some(credentials) => Arc::new(
            JiraClient::new(credentials).context("failed to create the tracker client")?,
        ),
        None => Arc::new(UnconfiguredTracker::new(organization.alias())),
    };

    let outcome = execute(
        &cli.command,
        &registry,
        tracker,
        cli.profile.probe_config(),
        &mut std::io::stdout(),
    )
    .await?;

    if let Some(text) = render_metrics() {
        eprint!("{text}");
    }
    Ok(outcome.exit_code())
}

fn load_registry(cli: &Cli) -> Result<OrganizationRegistry, warden_config::ConfigError> {
    let loader = ConfigLoader::new().with_dotenv();
    let loader = match &cli.config {
        Some(path) => loader.with_file(path)?,
        None => loader.with_optional_file(DEFAULT_CONFIG_FILE)?,
    };
    loader
        .with_env_prefix(DEFAULT_ENV_PREFIX)
        .load_registry(cli.org.as_deref())
}

/// Execute one subcommand against a resolved registry, writing JSON lines
/// to `out`.
pub async fn execute<W: Write>(
    command: &Command,
    registry: &OrganizationRegistry,
    tracker: Arc<dyn TrackerClient>,
    probe_config: ProbeConfig,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    let organization = registry.active();
    let authorizer =
        Authorizer::for_organization(organization, tracker).with_probe_config(probe_config);
    info!(organization = organization.alias(), "executing command");

    match command {
        Command::Check(args) => check(&authorizer, args, out).await,
        Command::CheckSpace(args) => {
            let decision = authorizer.authorize_space(&args.space, &args.command);
            write_line(out, &decision_json(&args.space, &decision))?;
            Ok(Outcome::of(&decision))
        }
        Command::Policy => {
            write_line(
                out,
                &json!({
                    "organization": organization.alias(),
                    "declared": registry.aliases().collect::<Vec<_>>(),
                    "policy": organization.policy().as_ref(),
                }),
            )?;
            Ok(Outcome::Allowed)
        }
        Command::Scope(args) => scope(&authorizer, args, out).await,
    }
}

async fn check<W: Write>(
    authorizer: &Authorizer,
    args: &CheckArgs,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    let with_project = |request: AuthorizationRequest| match &args.project {
        Some(project) => request.with_project(project),
        None => request,
    };

    if args.issues.len() <= 1 {
        let request = with_project(match args.issues.first() {
            Some(issue) => AuthorizationRequest::for_issue(&args.command, issue),
            None => AuthorizationRequest::new(&args.command),
        });
        let decision = authorizer.authorize(&request).await;
        write_line(out, &decision_json(&request.to_string(), &decision))?;
        return Ok(Outcome::of(&decision));
    }

    let requests: Vec<AuthorizationRequest> = args
        .issues
        .iter()
        .map(|issue| with_project(AuthorizationRequest::for_issue(&args.command, issue)))
        .collect();
    let targets: Vec<String> = requests.iter().map(ToString::to_string).collect();

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, no further probes will be issued");
            let _ = cancel_tx.send(true);
        }
    });
    let outcomes = authorizer
        .authorize_many(requests, args.concurrency, cancel_rx)
        .await;
    interrupt.abort();

    let mut overall = Outcome::Allowed;
    for (target, outcome) in targets.iter().zip(outcomes) {
        let item = match outcome {
            BatchOutcome::Allowed => {
                write_line(out, &decision_json(target, &Ok(())))?;
                Outcome::Allowed
            }
            BatchOutcome::Denied(denial) => {
                let decision = Err(denial);
                write_line(out, &decision_json(target, &decision))?;
                Outcome::of(&decision)
            }
            BatchOutcome::Cancelled => {
                write_line(out, &json!({ "target": target, "cancelled": true }))?;
                Outcome::Interrupted
            }
        };
        overall = overall.max(item);
    }
    Ok(overall)
}

async fn scope<W: Write>(
    authorizer: &Authorizer,
    args: &ScopeArgs,
    out: &mut W,
) -> anyhow::Result<Outcome> {
    let listing = authorizer.listing_scope(&args.command);
    let Some(jql) = listing.apply(&args.jql) else {
        let decision = match authorizer
            .authorize(&AuthorizationRequest::new(&args.command))
            .await
        {
            Err(denial) => Err(denial),
            Ok(()) => Err(Denial::new(
                DenialReason::ProjectNotAllowed,
                format!("no project is visible for '{}'", args.command),
            )),
        };
        write_line(out, &decision_json(&args.command, &decision))?;
        return Ok(Outcome::of(&decision));
    };

    write_line(
        out,
        &json!({
            "command": args.command,
            "restricted": matches!(listing, ListingScope::Restricted(_)),
            "jql": jql,
        }),
    )?;
    Ok(Outcome::Allowed)
}

/// Render a decision as a JSON object.
pub fn decision_json(target: &str, decision: &Result<(), Denial>) -> serde_json::Value {
    match decision {
        Ok(()) => json!({ "target": target, "allowed": true }),
        Err(denial) => json!({
            "target": target,
            "allowed": false,
            "reason": denial.reason(),
            "fatal": denial.is_fatal(),
            "detail": denial.detail(),
            "hints": denial.hints(),
            "cause": denial.cause().map(ToString::to_string),
        }),
    }
}

fn write_line<W: Write>(out: &mut W, value: &serde_json::Value) -> anyhow::Result<()> {
    serde_json::to_writer(&mut *out, value).context("failed to encode output")?;
    writeln!(out).context("failed to write output")?;
    Ok(())
}
