//! Sluice Connectors - remote APIs as DataFusion tables
//!
//! This crate provides table connectors for:
//! - Jira issues (`jira_issues`, JQL search)
//! - GitHub pull requests (`github_pull_requests`, REST pulls endpoint)
//!
//! Filters are pushed into the remote query where the API can express them
//! and `LIMIT` becomes a take hint for the paginated fetch.

pub mod config;
pub mod error;
pub mod github;
pub mod jira;
pub mod registry;
pub mod table;

pub use config::{GithubConfig, JiraConfig};
pub use error::ConnectorError;
pub use github::{GithubApi, GithubClient, PullRequest, PullRequestsFunction, PullRequestsTable};
pub use jira::{JiraApi, JiraClient, JiraIssue, JiraIssuesFunction, JiraIssuesTable, JiraTableParams};
pub use registry::{registry_from_env, ConnectorFactory, ConnectorRegistry, GithubFactory, JiraFactory};
pub use table::{RemoteScanExec, RemoteTable, RemoteTableSource};
