//! Filter fields the Jira search API can apply natively.

use chrono::{DateTime, Utc};
use sluice_core::{CompareOp, Comparison, FilterVocabulary};

/// User-field value that renders as `is EMPTY`. `assignee IS NULL` is
/// recorded as this value.
pub const UNASSIGNED: &str = "unassigned";

/// Inclusive bounds on a date field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Strict bounds are recorded as inclusive ones; the remote result is a
    /// superset either way.
    fn accept(&mut self, op: CompareOp, value: DateTime<Utc>) -> bool {
        match op {
            CompareOp::Gt | CompareOp::GtEq => self.from = Some(value),
            CompareOp::Lt | CompareOp::LtEq => self.to = Some(value),
            CompareOp::Eq => {
                self.from = Some(value);
                self.to = Some(value);
            }
            CompareOp::NotEq | CompareOp::Contains | CompareOp::IsNull => return false,
        }
        true
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JiraIssueFilter {
    pub project: Option<String>,
    pub key: Option<String>,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    /// Text-search terms.
    pub summary: Option<String>,
    pub description: Option<String>,
    /// Every listed label must be present.
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub created: DateRange,
    pub updated: DateRange,
    pub resolved: DateRange,
}

impl FilterVocabulary for JiraIssueFilter {
    fn accept(&mut self, c: &Comparison) -> bool {
        if c.op == CompareOp::IsNull {
            let slot = match c.field.as_str() {
                "assignee" => &mut self.assignee,
                "reporter" => &mut self.reporter,
                _ => return false,
            };
            *slot = Some(UNASSIGNED.to_string());
            return true;
        }

        if let Some(ts) = c.value.as_timestamp() {
            let range = match c.field.as_str() {
                "created" => &mut self.created,
                "updated" => &mut self.updated,
                "resolved" => &mut self.resolved,
                _ => return false,
            };
            return range.accept(c.op, ts);
        }

        let Some(value) = c.value.as_text() else {
            return false;
        };
        let value = value.to_string();
        let slot = match (c.field.as_str(), c.op) {
            ("project", CompareOp::Eq) => &mut self.project,
            ("key", CompareOp::Eq) => &mut self.key,
            ("status", CompareOp::Eq) => &mut self.status,
            ("issue_type", CompareOp::Eq) => &mut self.issue_type,
            ("priority", CompareOp::Eq) => &mut self.priority,
            ("resolution", CompareOp::Eq) => &mut self.resolution,
            ("assignee", CompareOp::Eq) => &mut self.assignee,
            ("reporter", CompareOp::Eq) => &mut self.reporter,
            ("summary", CompareOp::Contains) => &mut self.summary,
            ("description", CompareOp::Contains) => &mut self.description,
            ("labels", CompareOp::Contains) => {
                self.labels.push(value);
                return true;
            }
            ("components", CompareOp::Contains) => {
                self.components.push(value);
                return true;
            }
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    fn is_empty(&self) -> bool {
        *self == JiraIssueFilter::default()
    }
}
