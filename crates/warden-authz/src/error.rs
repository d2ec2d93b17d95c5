//! Error and denial types for the authorization crate.

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use warden_config::ConfigError;

/// Errors raised by the tracker collaborator (search and issue lookup).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TrackerError {
    /// The request never produced a response.
    #[error("tracker request failed: {0}")]
    Transport(String),

    /// Credentials were rejected.
    #[error("tracker rejected the credentials (HTTP {status})")]
    Unauthorized {
        /// HTTP status code (401 or 403).
        status: u16,
    },

    /// The requested issue does not exist or is not visible.
    #[error("not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("tracker returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// The response body could not be decoded.
    #[error("invalid tracker response: {0}")]
    Decode(String),

    /// The call did not complete in time.
    #[error("tracker call timed out after {0:?}")]
    Timeout(Duration),
}

/// A probe could not be evaluated because the tracker failed.
///
/// This is never converted into an allowance.
#[derive(Debug, Error)]
#[error("could not probe issue {issue_key}: {cause}")]
pub struct ProbeUnavailable {
    /// Issue that was being probed.
    pub issue_key: String,
    /// The tracker failure.
    #[source]
    pub cause: TrackerError,
}

/// Why an operation was denied. Closed set, so callers can match on it
/// without inspecting message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenialReason {
    /// The command is not permitted, globally or for the project.
    CommandNotAllowed,
    /// The project is not visible.
    ProjectNotAllowed,
    /// The issue does not satisfy the project's filters.
    FilterMismatch,
    /// The filter probe could not be evaluated.
    ProbeUnavailable,
    /// The policy document is malformed.
    ConfigInvalid,
    /// The content space is not visible.
    SpaceNotAllowed,
}

impl DenialReason {
    /// Stable machine-readable code.
    pub const fn code(self) -> &'static str {
        match self {
            Self::CommandNotAllowed => "COMMAND_NOT_ALLOWED",
            Self::ProjectNotAllowed => "PROJECT_NOT_ALLOWED",
            Self::FilterMismatch => "FILTER_MISMATCH",
            Self::ProbeUnavailable => "PROBE_UNAVAILABLE",
            Self::ConfigInvalid => "CONFIG_INVALID",
            Self::SpaceNotAllowed => "SPACE_NOT_ALLOWED",
        }
    }

    /// Whether the denial should end the whole command.
    ///
    /// Filter mismatches and probe failures concern a single issue; batch
    /// callers may skip that item and continue.
    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::FilterMismatch | Self::ProbeUnavailable)
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A denied authorization decision.
#[derive(Debug)]
pub struct Denial {
    reason: DenialReason,
    detail: String,
    hints: Vec<String>,
    cause: Option<Box<dyn StdError + Send + Sync + 'static>>,
}

impl Denial {
    /// Create a denial with a reason and a human-readable detail.
    pub fn new(reason: DenialReason, detail: impl Into<String>) -> Self {
        Self {
            reason,
            detail: detail.into(),
            hints: Vec::new(),
            cause: None,
        }
    }

    /// Add a hint for the user.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hints.push(hint.into());
        self
    }

    /// Attach the underlying error.
    #[must_use]
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// The denial reason.
    pub const fn reason(&self) -> DenialReason {
        self.reason
    }

    /// Human-readable detail.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Hints for rendering.
    pub fn hints(&self) -> &[String] {
        &self.hints
    }

    /// The underlying error, if the denial came from a failure.
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    /// See [`DenialReason::is_fatal`].
    pub const fn is_fatal(&self) -> bool {
        self.reason.is_fatal()
    }
}

impl fmt::Display for Denial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "access denied ({}): {}", self.reason, self.detail)
    }
}

impl StdError for Denial {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

impl From<ConfigError> for Denial {
    fn from(err: ConfigError) -> Self {
        Self::new(DenialReason::ConfigInvalid, err.to_string())
            .with_hint("fix the policy configuration; nothing from it was applied")
            .with_cause(err)
    }
}

impl From<ProbeUnavailable> for Denial {
    fn from(err: ProbeUnavailable) -> Self {
        Self::new(
            DenialReason::ProbeUnavailable,
            format!("could not verify access to {}", err.issue_key),
        )
        .with_hint("the tracker could not be queried; check connectivity and credentials")
        .with_cause(err)
    }
}
