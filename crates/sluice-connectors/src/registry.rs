//! Connector registry: table-function registration and metadata lookup.

use std::sync::Arc;

use anyhow::Result;
use datafusion::prelude::SessionContext;
use sluice_core::{ColumnDescription, FetchObserver, LoggingObserver};
use tracing::{info, warn};

use crate::config::{GithubConfig, JiraConfig};
use crate::error::ConnectorError;
use crate::github::{
    GithubApi, GithubClient, PullRequestsFunction, GITHUB_PULL_REQUESTS, PULL_REQUEST_COLUMNS,
};
use crate::jira::{JiraApi, JiraClient, JiraIssuesFunction, JIRA_ISSUES, JIRA_ISSUE_COLUMNS};

/// A remote source that exposes itself as a DataFusion table function.
pub trait ConnectorFactory: Send + Sync {
    /// Table function name, e.g. `jira_issues`.
    fn name(&self) -> &str;

    /// `(name, declared type)` for every column of the table.
    fn describe(&self) -> Vec<ColumnDescription>;

    /// Register the table function with `ctx`.
    fn register(&self, ctx: &SessionContext) -> Result<()>;
}

/// Registry of connector factories, registered in order.
pub struct ConnectorRegistry {
    factories: Vec<Arc<dyn ConnectorFactory>>,
}

impl ConnectorRegistry {
    pub fn new(factories: Vec<Arc<dyn ConnectorFactory>>) -> Self {
        Self { factories }
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    /// Register every table function with `ctx`.
    pub fn register_all(&self, ctx: &SessionContext) -> Result<()> {
        for factory in &self.factories {
            factory.register(ctx)?;
            info!("Registered table function '{}'", factory.name());
        }
        Ok(())
    }

    /// Column metadata for the named table.
    pub fn describe(&self, table: &str) -> Result<Vec<ColumnDescription>, ConnectorError> {
        self.factories
            .iter()
            .find(|f| f.name() == table)
            .map(|f| f.describe())
            .ok_or_else(|| ConnectorError::UnknownTable(table.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Built-in factory implementations
// ---------------------------------------------------------------------------

/// Factory for `jira_issues(project[, key[, jql]])`.
pub struct JiraFactory {
    pub api: Arc<dyn JiraApi>,
    pub page_size: usize,
    pub observer: Arc<dyn FetchObserver>,
}

impl ConnectorFactory for JiraFactory {
    fn name(&self) -> &str {
        JIRA_ISSUES
    }

    fn describe(&self) -> Vec<ColumnDescription> {
        JIRA_ISSUE_COLUMNS.describe()
    }

    fn register(&self, ctx: &SessionContext) -> Result<()> {
        let function = JiraIssuesFunction::new(
            Arc::clone(&self.api),
            self.page_size,
            Arc::clone(&self.observer),
        );
        ctx.register_udtf(JIRA_ISSUES, Arc::new(function));
        Ok(())
    }
}

/// Factory for `github_pull_requests(owner, repo)`.
pub struct GithubFactory {
    pub api: Arc<dyn GithubApi>,
    pub page_size: usize,
    pub observer: Arc<dyn FetchObserver>,
}

impl ConnectorFactory for GithubFactory {
    fn name(&self) -> &str {
        GITHUB_PULL_REQUESTS
    }

    fn describe(&self) -> Vec<ColumnDescription> {
        PULL_REQUEST_COLUMNS.describe()
    }

    fn register(&self, ctx: &SessionContext) -> Result<()> {
        let function = PullRequestsFunction::new(
            Arc::clone(&self.api),
            self.page_size,
            Arc::clone(&self.observer),
        );
        ctx.register_udtf(GITHUB_PULL_REQUESTS, Arc::new(function));
        Ok(())
    }
}

/// Build the registry from environment configuration.
///
/// GitHub is always available (anonymously if no token is set). Jira is
/// only included when its configuration is complete.
pub fn registry_from_env(observer: Option<Arc<dyn FetchObserver>>) -> Result<ConnectorRegistry> {
    let observer = observer.unwrap_or_else(|| Arc::new(LoggingObserver));
    let mut factories: Vec<Arc<dyn ConnectorFactory>> = Vec::new();

    match JiraConfig::from_env() {
        Ok(config) => factories.push(Arc::new(JiraFactory {
            api: Arc::new(JiraClient::new(&config)?),
            page_size: config.page_size,
            observer: Arc::clone(&observer),
        })),
        Err(e) => warn!("Jira connector disabled: {:#}", e),
    }

    let github = GithubConfig::from_env()?;
    factories.push(Arc::new(GithubFactory {
        api: Arc::new(GithubClient::new(&github)?),
        page_size: github.page_size,
        observer,
    }));

    Ok(ConnectorRegistry::new(factories))
}
