//! Jira issue entity and the REST v2 payloads it is read from.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

/// One issue as exposed by the `jira_issues` table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JiraIssue {
    pub id: String,
    pub key: String,
    pub project: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub resolved: Option<DateTime<Utc>>,
}

/// Fields requested from the search endpoint.
pub const SEARCH_FIELDS: &str = "project,summary,description,status,issuetype,priority,\
resolution,assignee,reporter,labels,components,created,updated,resolutiondate";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchResponse {
    #[serde(default)]
    pub issues: Vec<RawIssue>,
    /// Page size the server actually applied; may be below the requested one.
    #[serde(default)]
    pub max_results: Option<usize>,
    #[serde(default)]
    pub total: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawIssue {
    pub id: String,
    pub key: String,
    #[serde(default)]
    pub fields: RawFields,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawFields {
    pub project: Option<ProjectRef>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub status: Option<Named>,
    pub issuetype: Option<Named>,
    pub priority: Option<Named>,
    pub resolution: Option<Named>,
    pub assignee: Option<User>,
    pub reporter: Option<User>,
    pub labels: Option<Vec<String>>,
    pub components: Option<Vec<Named>>,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub resolutiondate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Named {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProjectRef {
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct User {
    pub display_name: Option<String>,
    pub name: Option<String>,
    pub account_id: Option<String>,
}

impl User {
    fn label(self) -> Option<String> {
        self.display_name.or(self.name).or(self.account_id)
    }
}

impl From<RawIssue> for JiraIssue {
    fn from(raw: RawIssue) -> Self {
        let f = raw.fields;
        JiraIssue {
            id: raw.id,
            key: raw.key,
            project: f.project.map(|p| p.key),
            summary: f.summary,
            description: f.description,
            status: f.status.map(|n| n.name),
            issue_type: f.issuetype.map(|n| n.name),
            priority: f.priority.map(|n| n.name),
            resolution: f.resolution.map(|n| n.name),
            assignee: f.assignee.and_then(User::label),
            reporter: f.reporter.and_then(User::label),
            labels: f.labels.unwrap_or_default(),
            components: f
                .components
                .unwrap_or_default()
                .into_iter()
                .map(|c| c.name)
                .collect(),
            created: f.created.as_deref().and_then(parse_jira_timestamp),
            updated: f.updated.as_deref().and_then(parse_jira_timestamp),
            resolved: f.resolutiondate.as_deref().and_then(parse_jira_timestamp),
        }
    }
}

/// Jira emits `2024-01-15T09:30:00.000+0000`; RFC 3339 is accepted too.
pub fn parse_jira_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| debug!(value = raw, error = %e, "unparseable Jira timestamp"))
        .ok()
}
