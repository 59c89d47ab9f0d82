//! The `github_pull_requests` table and table function.

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

use super::client::GithubApi;
use super::filter::{PullRequestFilter, PullRequestQuery};
use super::model::{PullRequest, PullRequestDetails};
use crate::config::DEFAULT_GITHUB_PAGE_SIZE;
use crate::error::ConnectorError;
use crate::table::{string_args, RemoteTable, RemoteTableSource};

pub const GITHUB_PULL_REQUESTS: &str = "github_pull_requests";

/// Columns only the per-item endpoint fills in.
const DETAIL_COLUMNS: [&str; 6] = [
    "merged",
    "commits",
    "additions",
    "deletions",
    "changed_files",
    "comments",
];

fn detail<T>(pr: &PullRequest, f: impl Fn(&PullRequestDetails) -> Option<T>) -> Option<T> {
    pr.details.as_ref().and_then(f)
}

pub static PULL_REQUEST_COLUMNS: LazyLock<ColumnMap<PullRequest>> = LazyLock::new(|| {
    use ColumnKind::*;
    ColumnMap::new(vec![
        Column::new("number", Int64, |p: &PullRequest| ColumnValue::Int64(p.number)),
        Column::new("title", Utf8, |p: &PullRequest| ColumnValue::Utf8(p.title.clone())),
        Column::new("state", Utf8, |p: &PullRequest| ColumnValue::Utf8(p.state.clone())),
        Column::new("author", Utf8, |p: &PullRequest| p.author.clone().into()),
        Column::new("head", Utf8, |p: &PullRequest| p.head.clone().into()),
        Column::new("head_ref", Utf8, |p: &PullRequest| p.head_ref.clone().into()),
        Column::new("base", Utf8, |p: &PullRequest| p.base.clone().into()),
        Column::new("draft", Boolean, |p: &PullRequest| p.draft.into()),
        Column::new("body", Utf8, |p: &PullRequest| p.body.clone().into()),
        Column::new("html_url", Utf8, |p: &PullRequest| p.html_url.clone().into()),
        Column::new("labels", Utf8List, |p: &PullRequest| {
            ColumnValue::List(p.labels.clone())
        }),
        Column::new("created_at", Timestamp, |p: &PullRequest| p.created_at.into()),
        Column::new("updated_at", Timestamp, |p: &PullRequest| p.updated_at.into()),
        Column::new("closed_at", Timestamp, |p: &PullRequest| p.closed_at.into()),
        Column::new("merged_at", Timestamp, |p: &PullRequest| p.merged_at.into()),
        Column::new("merged", Boolean, |p: &PullRequest| detail(p, |d| d.merged).into()),
        Column::new("commits", Int64, |p: &PullRequest| detail(p, |d| d.commits).into()),
        Column::new("additions", Int64, |p: &PullRequest| detail(p, |d| d.additions).into()),
        Column::new("deletions", Int64, |p: &PullRequest| detail(p, |d| d.deletions).into()),
        Column::new("changed_files", Int64, |p: &PullRequest| {
            detail(p, |d| d.changed_files).into()
        }),
        Column::new("comments", Int64, |p: &PullRequest| detail(p, |d| d.comments).into()),
    ])
});

#[derive(Debug)]
pub struct PullRequestsSource {
    api: Arc<dyn GithubApi>,
    owner: String,
    repo: String,
    page_size: usize,
}

impl PullRequestsSource {
    pub fn new(api: Arc<dyn GithubApi>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            api,
            owner: owner.into(),
            repo: repo.into(),
            page_size: DEFAULT_GITHUB_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// `github_pull_requests(owner, repo)`
    pub fn from_args(api: Arc<dyn GithubApi>, args: &[Expr]) -> Result<Self, ConnectorError> {
        let values = string_args(GITHUB_PULL_REQUESTS, args, 2, 2)?;
        match (&values[0], &values[1]) {
            (Some(owner), Some(repo)) => Ok(Self::new(api, owner.as_str(), repo.as_str())),
            _ => Err(ConnectorError::InvalidArgument(format!(
                "{} requires a non-empty owner and repo",
                GITHUB_PULL_REQUESTS
            ))),
        }
    }
}

/// Whether a scan reading `projection` needs the per-item endpoint.
fn needs_details(projection: Option<&[usize]>) -> bool {
    match projection {
        None => true,
        Some(indices) => indices.iter().any(|&i| {
            PULL_REQUEST_COLUMNS
                .column(i)
                .is_some_and(|c| DETAIL_COLUMNS.contains(&c.name))
        }),
    }
}

impl RemoteTableSource for PullRequestsSource {
    type Entity = PullRequest;
    type Filter = PullRequestFilter;

    fn source_name(&self) -> &str {
        GITHUB_PULL_REQUESTS
    }

    fn columns(&self) -> &'static ColumnMap<PullRequest> {
        &PULL_REQUEST_COLUMNS
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn open(
        &self,
        filter: PullRequestFilter,
        projection: Option<&[usize]>,
    ) -> Arc<dyn PageSource<Item = PullRequest>> {
        let query = PullRequestQuery::from_filter(&filter);
        let enrich = needs_details(projection);
        debug!(owner = %self.owner, repo = %self.repo, ?query, enrich, "pull request query");
        Arc::new(PullRequestPages {
            api: Arc::clone(&self.api),
            owner: self.owner.clone(),
            repo: self.repo.clone(),
            query,
            enrich,
        })
    }
}

/// Pull request pages for one query, optionally enriched item by item.
#[derive(Debug)]
pub struct PullRequestPages {
    api: Arc<dyn GithubApi>,
    owner: String,
    repo: String,
    query: PullRequestQuery,
    enrich: bool,
}

#[async_trait]
impl PageSource for PullRequestPages {
    type Item = PullRequest;

    async fn fetch_page(
        &self,
        request: PageRequest,
        cancel: &CancellationSignal,
    ) -> anyhow::Result<Vec<PullRequest>> {
        let list = self.api.list_pull_requests(
            &self.owner,
            &self.repo,
            &self.query,
            request.page,
            request.page_size,
        );
        match cancel.run_until_cancelled(list).await {
            Some(result) => result,
            None => anyhow::bail!("GitHub pull request listing cancelled"),
        }
    }

    async fn enrich(
        &self,
        item: &PullRequest,
        cancel: &CancellationSignal,
    ) -> anyhow::Result<Option<PullRequest>> {
        if !self.enrich {
            return Ok(None);
        }
        let get = self.api.get_pull_request(&self.owner, &self.repo, item.number);
        match cancel.run_until_cancelled(get).await {
            Some(result) => result.map(Some),
            None => Ok(None),
        }
    }
}

/// `github_pull_requests` as a DataFusion table.
pub type PullRequestsTable = RemoteTable<PullRequestsSource>;

impl RemoteTable<PullRequestsSource> {
    pub fn new(api: Arc<dyn GithubApi>, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        RemoteTable::from_source(PullRequestsSource::new(api, owner, repo))
    }
}

/// `SELECT * FROM github_pull_requests('acme', 'widgets')`
pub struct PullRequestsFunction {
    api: Arc<dyn GithubApi>,
    page_size: usize,
    observer: Arc<dyn FetchObserver>,
}

impl fmt::Debug for PullRequestsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PullRequestsFunction")
            .field("api", &self.api)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl PullRequestsFunction {
    pub fn new(api: Arc<dyn GithubApi>, page_size: usize, observer: Arc<dyn FetchObserver>) -> Self {
        Self {
            api,
            page_size,
            observer,
        }
    }
}

impl TableFunctionImpl for PullRequestsFunction {
    fn call(&self, args: &[Expr]) -> DFResult<Arc<dyn TableProvider>> {
        let source = PullRequestsSource::from_args(Arc::clone(&self.api), args)?
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
    fn test_needs_details_by_projection() {
        let number = PULL_REQUEST_COLUMNS.ordinal("number").unwrap();
        let additions = PULL_REQUEST_COLUMNS.ordinal("additions").unwrap();
        assert!(needs_details(None));
        assert!(!needs_details(Some(&[number])));
        assert!(needs_details(Some(&[number, additions])));
        assert!(!needs_details(Some(&[])));
    }

    #[test]
    fn test_from_args_requires_owner_and_repo() {
        #[derive(Debug)]
        struct NoApi;

        #[async_trait]
        impl GithubApi for NoApi {
            async fn list_pull_requests(
                &self,
                _: &str,
                _: &str,
                _: &PullRequestQuery,
                _: usize,
                _: usize,
            ) -> anyhow::Result<Vec<PullRequest>> {
                Ok(vec![])
            }

            async fn get_pull_request(&self, _: &str, _: &str, _: i64) -> anyhow::Result<PullRequest> {
                anyhow::bail!("not found")
            }
        }

        let api: Arc<dyn GithubApi> = Arc::new(NoApi);
        assert!(PullRequestsSource::from_args(Arc::clone(&api), &[lit("acme"), lit("w")]).is_ok());
        assert!(PullRequestsSource::from_args(Arc::clone(&api), &[lit("acme"), lit("")]).is_err());
        assert!(PullRequestsSource::from_args(api, &[lit("acme")]).is_err());
    }

    #[test]
    fn test_vocabulary_fields_are_columns() {
        for field in ["state", "head", "base", "author"] {
            assert!(PULL_REQUEST_COLUMNS.ordinal(field).is_some(), "{}", field);
        }
    }
}
