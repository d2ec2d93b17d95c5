//! Warden command-line front end.
//!
//! Wires the policy document, telemetry and the tracker client together and
//! reports each decision as one JSON line on stdout.
//!
//! # Example Usage
//!
//! ```bash
//! # Can the active organization comment on OPS-5?
//! $ warden -c warden.toml check --command "issue comment" --issue OPS-5
//! {"allowed":false,"detail":"OPS-5 does not match ...","reason":"FILTER_MISMATCH",...}
//!
//! # Effective policy for another organization
//! $ warden --org globex policy
//!
//! # JQL a listing command must run with
//! $ warden scope --command "issue list" --jql "status = Open ORDER BY created"
//! ```
//!
//! # Exit Codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | allowed |
//! | 1 | configuration or runtime error |
//! | 2 | fatal denial |
//! | 3 | per-item denial (filter mismatch or probe unavailable) |
//! | 130 | interrupted during a batch |

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod run;

pub use cli::{Cli, Profile};
pub use run::{execute, run, Outcome};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
