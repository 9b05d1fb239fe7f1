//! Include/exclude filtering of page records.
//!
//! A [`FilterSpec`] combines four independent criteria, each evaluated against
//! a record's location and joined with logical AND:
//!
//! - include keywords: every whitespace-separated token must appear
//! - include pattern: the regex must match
//! - exclude keywords: no token may appear
//! - exclude pattern: the regex must not match
//!
//! All matching is case-insensitive. An empty field disables its criterion, and
//! a pattern that does not compile is treated as empty rather than failing the
//! whole filter.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sitemap::PageRecord;

/// Four-field filter criterion. Empty strings are inactive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub include_keywords: String,
    pub include_pattern: String,
    pub exclude_keywords: String,
    pub exclude_pattern: String,
}

/// A pattern field that does not compile.
///
/// [`apply`] never returns this; it is for front ends that want to tell the
/// user before filtering.
#[derive(Debug, Error)]
pub enum InvalidPattern {
    #[error("Invalid include pattern: {0}")]
    Include(#[source] regex::Error),
    #[error("Invalid exclude pattern: {0}")]
    Exclude(#[source] regex::Error),
}

impl FilterSpec {
    /// True when no criterion is active, i.e. the filter keeps every record.
    pub fn is_identity(&self) -> bool {
        self.include_keywords.trim().is_empty()
            && self.include_pattern.is_empty()
            && self.exclude_keywords.trim().is_empty()
            && self.exclude_pattern.is_empty()
    }

    /// Checks that both pattern fields compile, reporting every one that does not.
    ///
    /// Patterns use the `regex` crate's syntax, which has no look-around or
    /// backreferences; such patterns are reported here like any other.
    pub fn validate(&self) -> Result<(), Vec<InvalidPattern>> {
        let mut invalid = Vec::new();
        if !self.include_pattern.is_empty() {
            if let Err(e) = build_pattern(&self.include_pattern) {
                invalid.push(InvalidPattern::Include(e));
            }
        }
        if !self.exclude_pattern.is_empty() {
            if let Err(e) = build_pattern(&self.exclude_pattern) {
                invalid.push(InvalidPattern::Exclude(e));
            }
        }
        if invalid.is_empty() {
            Ok(())
        } else {
            Err(invalid)
        }
    }

    /// Compiles the criteria once for repeated matching.
    pub fn compile(&self) -> CompiledFilter {
        CompiledFilter {
            include_tokens: tokens(&self.include_keywords),
            include_pattern: compile_or_inactive(&self.include_pattern, "include"),
            exclude_tokens: tokens(&self.exclude_keywords),
            exclude_pattern: compile_or_inactive(&self.exclude_pattern, "exclude"),
        }
    }
}

/// A [`FilterSpec`] with keywords lowercased and patterns compiled.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    include_tokens: Vec<String>,
    include_pattern: Option<Regex>,
    exclude_tokens: Vec<String>,
    exclude_pattern: Option<Regex>,
}

impl CompiledFilter {
    pub fn matches(&self, record: &PageRecord) -> bool {
        let location = record.location();
        let lowered = location.to_lowercase();

        let includes_all = self
            .include_tokens
            .iter()
            .all(|token| lowered.contains(token.as_str()));
        let include_match = self
            .include_pattern
            .as_ref()
            .map_or(true, |re| re.is_match(location));
        let excludes_none = !self
            .exclude_tokens
            .iter()
            .any(|token| lowered.contains(token.as_str()));
        let exclude_miss = self
            .exclude_pattern
            .as_ref()
            .map_or(true, |re| !re.is_match(location));

        includes_all && include_match && excludes_none && exclude_miss
    }
}

/// Returns the records that satisfy every active criterion of `spec`, in their
/// original order.
pub fn apply(records: &[PageRecord], spec: &FilterSpec) -> Vec<PageRecord> {
    if spec.is_identity() {
        return records.to_vec();
    }

    let filter = spec.compile();
    let kept: Vec<PageRecord> = records
        .iter()
        .filter(|record| filter.matches(record))
        .cloned()
        .collect();

    tracing::debug!(
        before = records.len(),
        after = kept.len(),
        "Applied URL filter"
    );
    kept
}

fn tokens(field: &str) -> Vec<String> {
    field.split_whitespace().map(str::to_lowercase).collect()
}

fn build_pattern(source: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(source).case_insensitive(true).build()
}

fn compile_or_inactive(source: &str, which: &'static str) -> Option<Regex> {
    if source.is_empty() {
        return None;
    }
    match build_pattern(source) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(which, pattern = %source, error = %e, "Ignoring invalid filter pattern");
            None
        }
    }
}
