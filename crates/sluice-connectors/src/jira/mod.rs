//! Jira issues connector.

pub mod client;
pub mod filter;
pub mod jql;
pub mod model;
pub mod table;

pub use client::{JiraApi, JiraClient};
pub use filter::{DateRange, JiraIssueFilter};
pub use jql::{build_jql, escape_jql_string, DEFAULT_JQL};
pub use model::JiraIssue;
pub use table::{
    JiraIssuePages, JiraIssuesFunction, JiraIssuesSource, JiraIssuesTable, JiraTableParams,
    JIRA_ISSUES, JIRA_ISSUE_COLUMNS,
};
