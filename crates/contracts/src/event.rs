//! Event / AlertSubscription - Event Fan-out contracts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Event published once and broadcast to every subscriber
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub title: String,
    pub severity: Severity,
    pub source: String,
    pub created_at: DateTime<Utc>,

    /// Free-form details
    #[serde(default)]
    pub context: BTreeMap<String, String>,

    /// Whether an operator already acknowledged it
    #[serde(default)]
    pub acknowledged: bool,
}

impl Event {
    /// Create an unacknowledged event stamped now
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        severity: Severity,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            severity,
            source: source.into(),
            created_at: Utc::now(),
            context: BTreeMap::new(),
            acknowledged: false,
        }
    }

    /// Add a context entry
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Per-connection alert filter
///
/// An empty set matches every value of that dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertSubscription {
    #[serde(default)]
    pub severities: BTreeSet<Severity>,

    #[serde(default)]
    pub sources: BTreeSet<String>,

    #[serde(default)]
    pub include_acknowledged: bool,
}

impl AlertSubscription {
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severities.insert(severity);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.insert(source.into());
        self
    }

    /// Filter predicate
    pub fn matches(&self, event: &Event) -> bool {
        let severity_ok = self.severities.is_empty() || self.severities.contains(&event.severity);
        let source_ok = self.sources.is_empty() || self.sources.contains(&event.source);
        let ack_ok = self.include_acknowledged || !event.acknowledged;
        severity_ok && source_ok && ack_ok
    }
}
