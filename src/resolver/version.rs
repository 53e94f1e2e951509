//! Dotted numeric versions and version specifications.
//!
//! Package versions in the index are loosely formatted (`11.2.0`, `1.0`,
//! `2.1.0-rc1`), so parsing never fails: every component is read as an
//! unsigned integer after dropping anything from its first `-`, and
//! unreadable components become `0`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A parsed version that remembers its original text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Version {
    raw: String,
    parts: Vec<u64>,
}

impl Version {
    /// Parse a version string. Never fails.
    pub fn parse(s: &str) -> Self {
        Version {
            raw: s.to_string(),
            parts: parse_parts(s),
        }
    }

    /// The integer components.
    pub fn parts(&self) -> &[u64] {
        &self.parts
    }

    /// The text this version was parsed from.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Render the integer components back to dotted form.
    pub fn render(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl From<String> for Version {
    fn from(s: String) -> Self {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> Self {
        v.raw
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_parts(&self.parts, &other.parts)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_parts(s: &str) -> Vec<u64> {
    s.split('.')
        .map(|part| {
            let numeric = match part.find('-') {
                Some(idx) => &part[..idx],
                None => part,
            };
            numeric.trim().parse::<u64>().unwrap_or(0)
        })
        .collect()
}

/// Compare zero-padded component vectors.
fn compare_parts(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    for i in 0..len {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        match x.cmp(&y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    compare_parts(&parse_parts(a), &parse_parts(b))
}

/// A version specification as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// `*` or empty: accepts every version.
    Any,
    /// `1.2.*`: leading components must match.
    Wildcard(Vec<u64>),
    /// Exact textual match.
    Exact(String),
}

impl VersionSpec {
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        if spec.is_empty() || spec == "*" {
            return VersionSpec::Any;
        }

        if spec.contains('*') {
            let prefix = spec.strip_suffix('*').unwrap_or(spec);
            let prefix = prefix.trim_end_matches('.');
            return VersionSpec::Wildcard(parse_parts(prefix));
        }

        VersionSpec::Exact(spec.to_string())
    }

    /// Whether this spec narrows the candidate set at all.
    pub fn is_restrictive(&self) -> bool {
        !matches!(self, VersionSpec::Any)
    }

    pub fn matches(&self, version: &str) -> bool {
        match self {
            VersionSpec::Any => true,
            VersionSpec::Wildcard(prefix) => {
                let parts = parse_parts(version);
                parts.len() >= prefix.len() && parts.iter().zip(prefix).all(|(a, b)| a == b)
            }
            VersionSpec::Exact(exact) => exact == version,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Any => write!(f, "*"),
            VersionSpec::Wildcard(prefix) => {
                let prefix: Vec<String> = prefix.iter().map(|p| p.to_string()).collect();
                write!(f, "{}.*", prefix.join("."))
            }
            VersionSpec::Exact(v) => write!(f, "{}", v),
        }
    }
}

/// Check whether `version` satisfies `spec`.
pub fn satisfies(version: &str, spec: &str) -> bool {
    VersionSpec::parse(spec).matches(version)
}
