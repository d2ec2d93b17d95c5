//! Listing-time narrowing.
//!
//! Listing commands have no single issue to probe. They instead AND a
//! project restriction onto their own JQL, so filtered projects only return
//! matching issues and hidden projects return nothing.

use warden_config::{PolicyDocument, Scope};

use crate::probe::quote;
use crate::{AuthorizationProbe, CommandGate};

/// Restriction a listing command applies to its query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListingScope {
    /// No restriction.
    Unrestricted,
    /// AND this clause onto the query.
    Restricted(String),
    /// Nothing may be listed.
    Deny,
}

impl ListingScope {
    /// The restriction clause, if any.
    pub fn clause(&self) -> Option<&str> {
        match self {
            Self::Restricted(clause) => Some(clause.as_str()),
            Self::Unrestricted | Self::Deny => None,
        }
    }

    /// Combine with the caller's query, keeping any `ORDER BY` suffix last.
    ///
    /// Returns `None` for [`ListingScope::Deny`].
    pub fn apply(&self, base_jql: &str) -> Option<String> {
        let clause = match self {
            Self::Deny => return None,
            Self::Unrestricted => return Some(base_jql.to_string()),
            Self::Restricted(clause) => clause,
        };

        let (query, order_by) = split_order_by(base_jql);
        let query = query.trim();
        let mut combined = if query.is_empty() {
            clause.clone()
        } else {
            format!("({clause}) AND ({query})")
        };
        if let Some(order_by) = order_by {
            combined.push(' ');
            combined.push_str(order_by.trim());
        }
        Some(combined)
    }
}

/// Build the listing restriction for `command` under `doc`.
pub fn listing_scope(
    doc: &PolicyDocument,
    command: &str,
    probe: &AuthorizationProbe,
) -> ListingScope {
    if !CommandGate::is_allowed(doc, command) {
        return ListingScope::Deny;
    }

    let projects = doc.projects();
    let filtered_clause = |key: &str, branches: &[String]| {
        format!("(project = {} AND ({}))", quote(key), branches.join(" OR "))
    };

    match projects.keys() {
        Scope::All => {
            let mut excluded = Vec::new();
            let mut filtered = Vec::new();
            for rule in projects.rules() {
                if !rule.commands.permits(command) {
                    excluded.push(quote(&rule.key));
                    continue;
                }
                let branches = rule
                    .filters
                    .as_ref()
                    .map(|f| probe.branches(f))
                    .unwrap_or_default();
                if !branches.is_empty() {
                    filtered.push((rule.key.as_str(), branches));
                }
            }

            let mut parts = Vec::new();
            if !excluded.is_empty() {
                parts.push(format!("project not in ({})", excluded.join(", ")));
            }
            if !filtered.is_empty() {
                let keys: Vec<String> = filtered.iter().map(|(key, _)| quote(key)).collect();
                let mut alternatives = vec![format!("project not in ({})", keys.join(", "))];
                alternatives.extend(filtered.iter().map(|(key, b)| filtered_clause(key, b)));
                parts.push(format!("({})", alternatives.join(" OR ")));
            }

            if parts.is_empty() {
                ListingScope::Unrestricted
            } else {
                ListingScope::Restricted(parts.join(" AND "))
            }
        }
        Scope::Only(keys) => {
            let mut plain = Vec::new();
            let mut alternatives = Vec::new();
            for key in keys {
                let rule = projects.rule(key);
                if rule.is_some_and(|r| !r.commands.permits(command)) {
                    continue;
                }
                let branches = rule
                    .and_then(|r| r.filters.as_ref())
                    .map(|f| probe.branches(f))
                    .unwrap_or_default();
                if branches.is_empty() {
                    plain.push(quote(key));
                } else {
                    alternatives.push(filtered_clause(key, &branches));
                }
            }

            if !plain.is_empty() {
                alternatives.insert(0, format!("project in ({})", plain.join(", ")));
            }
            match alternatives.len() {
                0 => ListingScope::Deny,
                1 => ListingScope::Restricted(alternatives.remove(0)),
                _ => ListingScope::Restricted(alternatives.join(" OR ")),
            }
        }
    }
}

/// Split a trailing `ORDER BY` clause off `jql`. Text inside quoted
/// strings never counts as the clause.
fn split_order_by(jql: &str) -> (&str, Option<&str>) {
    let lower = jql.to_ascii_lowercase();
    let bytes = lower.as_bytes();
    let mut open_quote: Option<u8> = None;
    let mut escaped = false;
    let mut found = None;

    for (at, &byte) in bytes.iter().enumerate() {
        if let Some(quote) = open_quote {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == quote {
                open_quote = None;
            }
            continue;
        }
        match byte {
            b'"' | b'\'' => open_quote = Some(byte),
            b'o' if lower[at..].starts_with("order by")
                && (at == 0 || bytes[at - 1].is_ascii_whitespace()) =>
            {
                found = Some(at);
            }
            _ => {}
        }
    }

    match found {
        Some(at) => (&jql[..at], Some(&jql[at..])),
        None => (jql, None),
    }
}
