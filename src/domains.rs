//! Turning host names into zones and record names.
//!
//! `api.example.com,www.example.com` becomes one zone, `example.com`, with
//! address records for `""` (the apex), `api` and `www`.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("label pattern compiles")
});

/// A host name split at its registrable domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHost {
    /// Labels left of the registrable domain, joined with `.`; empty at the apex.
    pub subdomain: String,
    /// Registrable domain, e.g. `example.co.uk`.
    pub domain: String,
}

/// Splits host names into registrable domain and subdomain.
pub trait DomainParser: Send + Sync {
    fn parse(&self, host: &str) -> Result<ParsedHost>;
}

/// Parser backed by the public suffix list (`psl`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SuffixParser;

impl DomainParser for SuffixParser {
    fn parse(&self, host: &str) -> Result<ParsedHost> {
        let normalized = host.trim().trim_end_matches('.').to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(Error::config("empty host name"));
        }

        let labels: Vec<&str> = normalized.split('.').collect();
        if let Some(bad) = labels.iter().find(|l| !LABEL.is_match(l)) {
            return Err(Error::config(format!(
                "invalid label '{bad}' in host name '{host}'"
            )));
        }

        let tld = labels[labels.len() - 1];
        if tld.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::config(format!(
                "'{host}' looks like an IP address, not a host name"
            )));
        }

        let Some(domain) = psl::domain_str(&normalized) else {
            return Err(Error::config(format!(
                "'{host}' is a public suffix, not a registrable domain"
            )));
        };
        let subdomain = normalized
            .strip_suffix(domain)
            .map(|rest| rest.trim_end_matches('.'))
            .unwrap_or_default();
        Ok(ParsedHost {
            subdomain: subdomain.to_string(),
            domain: domain.to_string(),
        })
    }
}

/// A zone and the subdomains that should point at the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainGroup {
    pub domain: String,
    pub subdomains: Vec<String>,
}

impl DomainGroup {
    /// Record names to reconcile, apex included.
    pub fn record_names(&self) -> Vec<String> {
        address_record_names(&self.subdomains)
    }
}

/// Parse host names into zones, grouping subdomains per zone.
///
/// Each item may itself be a comma-separated list. Zones come back sorted
/// by name, each with sorted, deduplicated subdomains.
pub fn parse_domains<I, S>(hosts: I, parser: &dyn DomainParser) -> Result<Vec<DomainGroup>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut zones: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for item in hosts {
        for host in item.as_ref().split(',').map(str::trim).filter(|h| !h.is_empty()) {
            let parsed = parser.parse(host)?;
            let subdomains = zones.entry(parsed.domain).or_default();
            if !parsed.subdomain.is_empty() {
                subdomains.insert(parsed.subdomain);
            }
        }
    }

    if zones.is_empty() {
        return Err(Error::config("no domains given"));
    }

    Ok(zones
        .into_iter()
        .map(|(domain, subdomains)| DomainGroup {
            domain,
            subdomains: subdomains.into_iter().collect(),
        })
        .collect())
}

/// Address record names for a zone: the apex (`""`) plus every subdomain,
/// sorted and without duplicates.
pub fn address_record_names<S: AsRef<str>>(subdomains: &[S]) -> Vec<String> {
    let mut names: BTreeSet<String> = BTreeSet::new();
    names.insert(String::new());
    names.extend(subdomains.iter().map(|s| s.as_ref().trim().to_string()));
    names.into_iter().collect()
}
