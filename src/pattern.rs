// src/pattern.rs
//! Wildcard selection of manifest entries
//!
//! `*` matches any run of characters, `/` included. Everything else is
//! literal. Matching is case-sensitive and anchored to the whole name.

use regex::Regex;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::manifest::ManifestEntry;

/// One or more comma-separated wildcard patterns
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<(String, Regex)>,
}

impl PatternSet {
    /// Compile a comma-separated list; blank segments are dropped, a blank list matches everything
    pub fn parse(patterns: &str) -> Result<Self> {
        let compiled = patterns
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                let regex = Regex::new(&wildcard_to_regex(p)).map_err(|e| {
                    CoreError::Configuration(format!("invalid file pattern `{p}`: {e}"))
                })?;
                Ok((p.to_string(), regex))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(PatternSet { patterns: compiled })
    }

    pub fn matches_all(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn is_match(&self, name: &str) -> bool {
        self.matches_all() || self.patterns.iter().any(|(_, re)| re.is_match(name))
    }

    /// Entries selected by any pattern, each once, in manifest order, paired
    /// with their position in the full manifest
    pub fn select(&self, entries: Vec<ManifestEntry>) -> Vec<(usize, ManifestEntry)> {
        entries
            .into_iter()
            .enumerate()
            .filter(|(_, entry)| {
                if self.matches_all() {
                    return true;
                }
                let hit = self.patterns.iter().find(|(_, re)| re.is_match(&entry.name));
                if let Some((pattern, _)) = hit {
                    debug!(name = %entry.name, pattern = %pattern, "entry matched");
                }
                hit.is_some()
            })
            .collect()
    }
}

/// `a*b` → `(?s)^a.*b$`, literal parts escaped
pub fn wildcard_to_regex(pattern: &str) -> String {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("(?s)^{body}$")
}
