//! Per-run journal: an in-memory append-only log used to build failure
//! reports and LLM-visible recovery context (`spec.md` §3 "Journal", §7
//! "failure report"). Not persisted — it lives only as long as one tool
//! loop run or one pipeline stage.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub phase: String,
    pub event: String,
    pub details: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Journal {
    started_at: DateTime<Utc>,
    entries: Vec<JournalEntry>,
}

impl Journal {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, phase: impl Into<String>, event: impl Into<String>) {
        self.entries.push(JournalEntry {
            timestamp: Utc::now(),
            phase: phase.into(),
            event: event.into(),
            details: None,
            error: None,
        });
    }

    pub fn record_with_details(&mut self, phase: impl Into<String>, event: impl Into<String>, details: serde_json::Value) {
        self.entries.push(JournalEntry {
            timestamp: Utc::now(),
            phase: phase.into(),
            event: event.into(),
            details: Some(details),
            error: None,
        });
    }

    pub fn record_error(&mut self, phase: impl Into<String>, event: impl Into<String>, error: impl Into<String>) {
        self.entries.push(JournalEntry {
            timestamp: Utc::now(),
            phase: phase.into(),
            event: event.into(),
            details: None,
            error: Some(error.into()),
        });
    }

    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// The most recent entry carrying an error, if any — the "last error
    /// trace" a failure report names per `spec.md` §7.
    pub fn last_error(&self) -> Option<&JournalEntry> {
        self.entries.iter().rev().find(|e| e.error.is_some())
    }

    /// Build a failure report naming the error category, the last error
    /// trace, and a placeholder list of next actions the caller should
    /// refine with domain knowledge (the pipeline boundary is expected to
    /// add task-specific suggestions; this only guarantees the structural
    /// shape `spec.md` §7 requires).
    pub fn failure_report(&self, category: &str) -> FailureReport {
        FailureReport {
            category: category.to_string(),
            last_error: self.last_error().and_then(|e| e.error.clone()),
            attempted_recovery: self
                .entries
                .iter()
                .map(|e| format!("{}: {}", e.phase, e.event))
                .collect(),
            next_actions: Vec::new(),
        }
    }
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub category: String,
    pub last_error: Option<String>,
    pub attempted_recovery: Vec<String>,
    pub next_actions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_error_returns_most_recent_error_entry() {
        let mut j = Journal::new();
        j.record("intake", "gathered context");
        j.record_error("step_executor", "tool call failed", "http.request timed out");
        j.record("step_executor", "retrying");
        assert_eq!(
            j.last_error().unwrap().error.as_deref(),
            Some("http.request timed out")
        );
    }

    #[test]
    fn failure_report_names_category_and_last_error() {
        let mut j = Journal::new();
        j.record_error("tool_loop", "stuck", "same call repeated 3 times");
        let report = j.failure_report("stuck");
        assert_eq!(report.category, "stuck");
        assert_eq!(report.last_error.as_deref(), Some("same call repeated 3 times"));
    }

    #[test]
    fn no_error_entries_yields_none() {
        let mut j = Journal::new();
        j.record("intake", "ok");
        assert!(j.last_error().is_none());
    }
}
