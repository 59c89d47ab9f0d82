//! The `jira_issues` table and table function.

use std::fmt;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use datafusion::catalog::TableFunctionImpl;
use datafusion::datasource::TableProvider;
use datafusion::error::Result as DFResult;
use datafusion::prelude::Expr;
use sluice_core::{
    CancellationSignal, Column, ColumnKind, ColumnMap, ColumnValue, FetchObserver, PageRequest,
    PageSource,
};
use tracing::debug;

use super::client::JiraApi;
use super::filter::JiraIssueFilter;
use super::jql::build_jql;
use super::model::JiraIssue;
use crate::config::DEFAULT_JIRA_PAGE_SIZE;
use crate::error::ConnectorError;
use crate::table::{string_args, RemoteTable, RemoteTableSource};

pub const JIRA_ISSUES: &str = "jira_issues";

pub static JIRA_ISSUE_COLUMNS: LazyLock<ColumnMap<JiraIssue>> = LazyLock::new(|| {
    use ColumnKind::*;
    ColumnMap::new(vec![
        Column::new("id", Utf8, |i: &JiraIssue| ColumnValue::Utf8(i.id.clone())),
        Column::new("key", Utf8, |i: &JiraIssue| ColumnValue::Utf8(i.key.clone())),
        Column::new("project", Utf8, |i: &JiraIssue| i.project.clone().into()),
        Column::new("summary", Utf8, |i: &JiraIssue| i.summary.clone().into()),
        Column::new("description", Utf8, |i: &JiraIssue| i.description.clone().into()),
        Column::new("status", Utf8, |i: &JiraIssue| i.status.clone().into()),
        Column::new("issue_type", Utf8, |i: &JiraIssue| i.issue_type.clone().into()),
        Column::new("priority", Utf8, |i: &JiraIssue| i.priority.clone().into()),
        Column::new("resolution", Utf8, |i: &JiraIssue| i.resolution.clone().into()),
        Column::new("assignee", Utf8, |i: &JiraIssue| i.assignee.clone().into()),
        Column::new("reporter", Utf8, |i: &JiraIssue| i.reporter.clone().into()),
        Column::new("labels", Utf8List, |i: &JiraIssue| {
            ColumnValue::List(i.labels.clone())
        }),
        Column::new("components", Utf8List, |i: &JiraIssue| {
            ColumnValue::List(i.components.clone())
        }),
        Column::new("created", Timestamp, |i: &JiraIssue| i.created.into()),
        Column::new("updated", Timestamp, |i: &JiraIssue| i.updated.into()),
        Column::new("resolved", Timestamp, |i: &JiraIssue| i.resolved.into()),
    ])
});

/// Fixed scope of a Jira table, applied to every scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JiraTableParams {
    pub project_key: Option<String>,
    pub issue_key: Option<String>,
    /// Extra JQL ANDed onto every search; may carry an `ORDER BY`.
    pub jql: Option<String>,
}

impl JiraTableParams {
    pub fn project(key: impl Into<String>) -> Self {
        Self {
            project_key: Some(key.into()),
            ..Default::default()
        }
    }

    /// `jira_issues(project[, key[, jql]])`
    pub fn from_args(args: &[Expr]) -> Result<Self, ConnectorError> {
        let mut values = string_args(JIRA_ISSUES, args, 1, 3)?.into_iter();
        Ok(Self {
            project_key: values.next().flatten(),
            issue_key: values.next().flatten(),
            jql: values.next().flatten(),
        })
    }

    /// The table's own scope rendered as JQL, or `None` for an unscoped table.
    pub fn base_jql(&self) -> Option<String> {
        let scope = JiraIssueFilter {
            project: self.project_key.clone(),
            key: self.issue_key.clone(),
            ..Default::default()
        };
        if scope == JiraIssueFilter::default() && self.jql.is_none() {
            return None;
        }
        Some(build_jql(self.jql.as_deref(), &scope))
    }
}

#[derive(Debug)]
pub struct JiraIssuesSource {
    api: Arc<dyn JiraApi>,
    params: JiraTableParams,
    base_jql: Option<String>,
    page_size: usize,
}

impl JiraIssuesSource {
    pub fn new(api: Arc<dyn JiraApi>, params: JiraTableParams) -> Self {
        let base_jql = params.base_jql();
        Self {
            api,
            params,
            base_jql,
            page_size: DEFAULT_JIRA_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn params(&self) -> &JiraTableParams {
        &self.params
    }

    /// The JQL a scan with `filter` pushed down would send.
    pub fn render_jql(&self, filter: &JiraIssueFilter) -> String {
        build_jql(self.base_jql.as_deref(), filter)
    }
}

impl RemoteTableSource for JiraIssuesSource {
    type Entity = JiraIssue;
    type Filter = JiraIssueFilter;

    fn source_name(&self) -> &str {
        JIRA_ISSUES
    }

    fn columns(&self) -> &'static ColumnMap<JiraIssue> {
        &JIRA_ISSUE_COLUMNS
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn open(
        &self,
        filter: JiraIssueFilter,
        _projection: Option<&[usize]>,
    ) -> Arc<dyn PageSource<Item = JiraIssue>> {
        let jql = self.render_jql(&filter);
        debug!(%jql, "rendered JQL");
        Arc::new(JiraIssuePages {
            api: Arc::clone(&self.api),
            jql,
        })
    }
}

/// Search pages for one rendered JQL query.
#[derive(Debug)]
pub struct JiraIssuePages {
    api: Arc<dyn JiraApi>,
    jql: String,
}

#[async_trait]
impl PageSource for JiraIssuePages {
    type Item = JiraIssue;

    async fn fetch_page(
        &self,
        request: PageRequest,
        cancel: &CancellationSignal,
    ) -> anyhow::Result<Vec<JiraIssue>> {
        let search = self
            .api
            .search_issues(&self.jql, request.offset(), request.page_size);
        match cancel.run_until_cancelled(search).await {
            Some(result) => result,
            None => anyhow::bail!("Jira search cancelled"),
        }
    }
}

/// `jira_issues` as a DataFusion table.
pub type JiraIssuesTable = RemoteTable<JiraIssuesSource>;

impl RemoteTable<JiraIssuesSource> {
    pub fn new(api: Arc<dyn JiraApi>, params: JiraTableParams) -> Self {
        RemoteTable::from_source(JiraIssuesSource::new(api, params))
    }
}

/// `SELECT * FROM jira_issues('OPS')`
pub struct JiraIssuesFunction {
    api: Arc<dyn JiraApi>,
    page_size: usize,
    observer: Arc<dyn FetchObserver>,
}

impl fmt::Debug for JiraIssuesFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraIssuesFunction")
            .field("api", &self.api)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl JiraIssuesFunction {
    pub fn new(api: Arc<dyn JiraApi>, page_size: usize, observer: Arc<dyn FetchObserver>) -> Self {
        Self {
            api,
            page_size,
            observer,
        }
    }
}

impl TableFunctionImpl for JiraIssuesFunction {
    fn call(&self, args: &[Expr]) -> DFResult<Arc<dyn TableProvider>> {
        let params = JiraTableParams::from_args(args)?;
        let source = JiraIssuesSource::new(Arc::clone(&self.api), params)
            .with_page_size(self.page_size);
        let table = RemoteTable::from_source(source).with_observer(Arc::clone(&self.observer));
        Ok(Arc::new(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::prelude::lit;

    #[test]
    fn test_params_from_args() {
        let params = JiraTableParams::from_args(&[lit("OPS"), lit(""), lit("labels = x")]).unwrap();
        assert_eq!(params.project_key.as_deref(), Some("OPS"));
        assert_eq!(params.issue_key, None);
        assert_eq!(params.jql.as_deref(), Some("labels = x"));
    }

    #[test]
    fn test_base_jql_from_scope() {
        assert_eq!(JiraTableParams::default().base_jql(), None);
        assert_eq!(
            JiraTableParams::project("OPS").base_jql().as_deref(),
            Some("project = \"OPS\" order by created DESC")
        );
        let params = JiraTableParams {
            project_key: Some("OPS".into()),
            issue_key: None,
            jql: Some("labels = infra ORDER BY rank".into()),
        };
        assert_eq!(
            params.base_jql().as_deref(),
            Some("(labels = infra) AND project = \"OPS\" ORDER BY rank")
        );
    }

    #[test]
    fn test_scan_filter_lands_after_scope() {
        #[derive(Debug)]
        struct NoApi;

        #[async_trait]
        impl JiraApi for NoApi {
            async fn search_issues(&self, _: &str, _: usize, _: usize) -> anyhow::Result<Vec<JiraIssue>> {
                Ok(vec![])
            }
        }

        let source = JiraIssuesSource::new(Arc::new(NoApi), JiraTableParams::project("OPS"));
        let filter = JiraIssueFilter {
            status: Some("Open".into()),
            ..Default::default()
        };
        assert_eq!(
            source.render_jql(&filter),
            "(project = \"OPS\") AND status = \"Open\" order by created DESC"
        );
    }

    #[test]
    fn test_columns_match_vocabulary_names() {
        for field in [
            "project",
            "key",
            "status",
            "issue_type",
            "priority",
            "resolution",
            "assignee",
            "reporter",
            "summary",
            "description",
            "labels",
            "components",
            "created",
            "updated",
            "resolved",
        ] {
            assert!(JIRA_ISSUE_COLUMNS.ordinal(field).is_some(), "{}", field);
        }
    }
}
