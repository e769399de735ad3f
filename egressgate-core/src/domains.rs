//! Egress domain allow-list.
//!
//! An allow-list is written as a comma-separated list of entries. Each entry
//! is trimmed and lower-cased, then sorted into one of three kinds:
//!
//! - `glean.com`: exact host.
//! - `*.temu.com`: any host ending in `.temu.com` (not `temu.com` itself).
//! - `api.*.example.com`, `*.*.a.io`: every `*` matches exactly one label.
//!
//! # Example
//!
//! ```
//! use egressgate_core::domains::AllowedEgressDomains;
//!
//! let domains = AllowedEgressDomains::parse("glean.com, *.temu.com");
//! assert!(domains.is_allowed("a.b.temu.com"));
//! assert!(!domains.is_allowed("temu.com"));
//! ```

use std::collections::HashSet;

use hyper::Uri;
use regex::Regex;
use tracing::warn;

use crate::error::{GateError, Result};
use crate::message::ProxyRequest;

/// Compiled egress allow-list.
#[derive(Clone, Debug, Default)]
pub struct AllowedEgressDomains {
    individual: HashSet<String>,
    suffixes: HashSet<String>,
    patterns: Vec<Regex>,
}

impl AllowedEgressDomains {
    /// Parses a comma-separated allow-list. Empty entries are discarded.
    pub fn parse(spec: &str) -> Self {
        let mut domains = Self::default();

        for entry in spec.split(',') {
            let entry = entry.trim().to_lowercase();
            if entry.is_empty() {
                continue;
            }

            if !entry.contains('*') {
                domains.individual.insert(entry);
            } else if let Some(suffix) = entry.strip_prefix("*.")
                && !suffix.contains('*')
            {
                domains.suffixes.insert(suffix.to_string());
            } else {
                match wildcard_to_regex(&entry) {
                    Ok(pattern) => domains.patterns.push(pattern),
                    Err(err) => {
                        warn!(entry = %entry, error = %err, "Skipping unusable egress domain pattern")
                    }
                }
            }
        }

        domains
    }

    /// Returns true if `host` is on the list. Matching is case-insensitive.
    ///
    /// Exact entries are checked first, then every suffix of `host` that
    /// starts after a `.` (the bare top-level label is never a candidate),
    /// then the wildcard patterns.
    pub fn is_allowed(&self, host: &str) -> bool {
        let host = host.trim().to_lowercase();

        if self.individual.contains(&host) {
            return true;
        }

        if let Some(last_dot) = host.rfind('.') {
            let matched_suffix = host[..last_dot]
                .match_indices('.')
                .any(|(dot, _)| self.suffixes.contains(&host[dot + 1..]));
            if matched_suffix {
                return true;
            }
        }

        self.patterns.iter().any(|pattern| pattern.is_match(&host))
    }

    /// Number of entries across all three kinds.
    pub fn len(&self) -> usize {
        self.individual.len() + self.suffixes.len() + self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Compiles a wildcard entry: `*` becomes one or more non-dot characters and
/// everything else is literal. The pattern must match the whole host.
fn wildcard_to_regex(entry: &str) -> std::result::Result<Regex, regex::Error> {
    let body = entry
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[^.]+");
    Regex::new(&format!("^{body}$"))
}

/// Extracts the destination host of a request, lower-cased.
///
/// CONNECT targets are `host:port`; the host is everything before the first
/// `:`, except that a bracketed IPv6 literal is taken whole. Other targets
/// are parsed as URIs and must carry a host.
pub fn extract_host(request: &ProxyRequest) -> Result<String> {
    if request.is_connect() {
        let target = request.target.trim();
        let host = match target.strip_prefix('[') {
            Some(rest) => rest.split(']').next().unwrap_or_default(),
            None => target.split(':').next().unwrap_or_default(),
        };
        let host = host.trim().to_lowercase();
        if host.is_empty() {
            return Err(GateError::InvalidRequest(format!(
                "missing host in CONNECT target '{}'",
                request.target
            )));
        }
        return Ok(host);
    }

    let uri: Uri = request.target.parse().map_err(|err| {
        GateError::InvalidRequest(format!("invalid URI '{}': {err}", request.target))
    })?;

    uri.host()
        .map(|host| host.trim_start_matches('[').trim_end_matches(']').to_lowercase())
        .ok_or_else(|| GateError::InvalidRequest(format!("missing host in URI '{}'", request.target)))
}
