//! Memoized mapping from raw property names to datastream names
//!
//! Source data names a measured property the way the provider writes it; the
//! datastream it belongs to is found by exact equality or, for providers whose
//! column names embed extra qualifiers, by substring containment. Either test
//! runs once per distinct property and the answer (including "no match") is
//! cached until the datastream name set changes.

use crate::Result;
use crate::app::models::StationMetadata;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How a raw property name is matched against datastream names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchRule {
    /// Property name equals the datastream name
    #[default]
    Exact,
    /// Datastream name contains the property name
    Substring,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchRule::Exact => write!(f, "exact"),
            MatchRule::Substring => write!(f, "substring"),
        }
    }
}

impl FromStr for MatchRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchRule::Exact),
            "substring" => Ok(MatchRule::Substring),
            other => Err(format!(
                "unknown match rule '{}' (expected 'exact' or 'substring')",
                other
            )),
        }
    }
}

/// Property name to datastream name lookup with per-property memoization
#[derive(Debug, Clone)]
pub struct PropertyMatchCache {
    rule: MatchRule,
    names: Vec<String>,
    resolved: HashMap<String, Option<String>>,
}

impl PropertyMatchCache {
    pub fn new(rule: MatchRule, names: Vec<String>) -> Self {
        Self {
            rule,
            names,
            resolved: HashMap::new(),
        }
    }

    /// Cache over the datastream names of a metadata snapshot
    pub fn for_metadata(metadata: &StationMetadata, rule: MatchRule) -> Result<Self> {
        Ok(Self::new(rule, metadata.datastream_names()?))
    }

    pub fn rule(&self) -> MatchRule {
        self.rule
    }

    /// Datastream names in metadata order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of memoized lookups
    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    /// Datastream name for `property`, if any
    pub fn resolve(&mut self, property: &str) -> Option<String> {
        if let Some(cached) = self.resolved.get(property) {
            return cached.clone();
        }

        let found = self.scan(property);
        if found.is_none() {
            debug!("Property '{}' matches no datastream", property);
        }
        self.resolved.insert(property.to_string(), found.clone());
        found
    }

    fn scan(&self, property: &str) -> Option<String> {
        if let Some(exact) = self.names.iter().find(|name| name.as_str() == property) {
            return Some(exact.clone());
        }

        match self.rule {
            MatchRule::Exact => None,
            MatchRule::Substring => self
                .names
                .iter()
                .find(|name| !property.is_empty() && name.contains(property))
                .cloned(),
        }
    }

    /// Replace the datastream name set, dropping every memoized answer
    pub fn rebuild(&mut self, names: Vec<String>) {
        self.names = names;
        self.resolved.clear();
    }

    /// Rebuild if `metadata` lists a different datastream name set
    ///
    /// Returns whether the cache was invalidated.
    pub fn ensure_current(&mut self, metadata: &StationMetadata) -> Result<bool> {
        let names = metadata.datastream_names()?;
        if names == self.names {
            return Ok(false);
        }
        debug!(
            "Datastream names changed ({} -> {}); rebuilding property matches",
            self.names.len(),
            names.len()
        );
        self.rebuild(names);
        Ok(true)
    }
}
