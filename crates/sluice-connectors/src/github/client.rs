//! Thin GitHub REST client for the pulls endpoints.

use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::filter::PullRequestQuery;
use super::model::{PullRequest, RawPullRequest};
use crate::config::GithubConfig;
use crate::error::ConnectorError;

const USER_AGENT: &str = concat!("sluice/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

#[async_trait]
pub trait GithubApi: fmt::Debug + Send + Sync {
    /// `GET /repos/{owner}/{repo}/pulls`; `page` is 1-based.
    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        query: &PullRequestQuery,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<PullRequest>>;

    /// `GET /repos/{owner}/{repo}/pulls/{number}`
    async fn get_pull_request(&self, owner: &str, repo: &str, number: i64) -> Result<PullRequest>;
}

pub struct GithubClient {
    http: reqwest::Client,
    api_url: url::Url,
    token: Option<String>,
}

impl fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubClient")
            .field("api_url", &self.api_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl GithubClient {
    pub fn new(config: &GithubConfig) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            api_url: url::Url::parse(&config.api_url).context("Invalid GitHub API URL")?,
            token: config.token.clone(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&GithubConfig::from_env()?)
    }

    fn pulls_url(&self, owner: &str, repo: &str) -> Result<url::Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API URL cannot be a base"))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "pulls"]);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: url::Url,
        query: &[(&'static str, String)],
    ) -> Result<T> {
        let mut request = self
            .http
            .get(url)
            .query(query)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context("GitHub request failed")?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Http {
                service: "GitHub",
                status,
                body,
            }
            .into());
        }
        response.json().await.context("Invalid GitHub response")
    }
}

#[async_trait]
impl GithubApi for GithubClient {
    async fn list_pull_requests(
        &self,
        owner: &str,
        repo: &str,
        query: &PullRequestQuery,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<PullRequest>> {
        let url = self.pulls_url(owner, repo)?;
        let pairs = query.query_pairs(page, per_page);
        debug!(owner, repo, ?pairs, "GitHub pulls list");
        let raw: Vec<RawPullRequest> = self.get_json(url, &pairs).await?;
        Ok(raw.into_iter().map(PullRequest::from).collect())
    }

    async fn get_pull_request(&self, owner: &str, repo: &str, number: i64) -> Result<PullRequest> {
        let mut url = self.pulls_url(owner, repo)?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("GitHub API URL cannot be a base"))?
            .push(&number.to_string());
        let raw: RawPullRequest = self.get_json(url, &[]).await?;
        Ok(PullRequest::from(raw))
    }
}
