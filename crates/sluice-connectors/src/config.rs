//! Connector configuration from environment variables.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::ConnectorError;

/// Largest page size either API accepts.
pub const MAX_PAGE_SIZE: usize = 100;

pub const DEFAULT_JIRA_PAGE_SIZE: usize = 50;
pub const DEFAULT_GITHUB_PAGE_SIZE: usize = 100;
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

#[derive(Debug, Clone, Deserialize)]
pub struct JiraConfig {
    /// Site root, e.g. `https://example.atlassian.net/`. Always ends in `/`.
    pub base_url: String,
    pub email: String,
    pub api_token: String,
    #[serde(default = "default_jira_page_size")]
    pub page_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,
    /// Anonymous access when unset (60 requests/hour).
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_github_page_size")]
    pub page_size: usize,
}

fn default_jira_page_size() -> usize {
    DEFAULT_JIRA_PAGE_SIZE
}

fn default_github_page_size() -> usize {
    DEFAULT_GITHUB_PAGE_SIZE
}

fn default_github_api_url() -> String {
    DEFAULT_GITHUB_API_URL.to_string()
}

impl JiraConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("JIRA_BASE_URL").context("JIRA_BASE_URL is not set")?;
        Self {
            base_url: normalize_base_url(&base_url).context("Invalid JIRA_BASE_URL")?,
            email: std::env::var("JIRA_EMAIL").context("JIRA_EMAIL is not set")?,
            api_token: std::env::var("JIRA_API_TOKEN").context("JIRA_API_TOKEN is not set")?,
            page_size: clamp_page_size(
                std::env::var("JIRA_PAGE_SIZE")
                    .unwrap_or_else(|_| DEFAULT_JIRA_PAGE_SIZE.to_string())
                    .parse()
                    .context("Invalid JIRA_PAGE_SIZE")?,
            ),
        }
        .normalized()
    }

    /// Normalize a config loaded from elsewhere (e.g. a file).
    pub fn normalized(mut self) -> Result<Self> {
        if self.email.trim().is_empty() || self.api_token.trim().is_empty() {
            return Err(ConnectorError::Config(
                "Jira email and API token must not be empty".to_string(),
            )
            .into());
        }
        self.base_url = normalize_base_url(&self.base_url).context("Invalid Jira base_url")?;
        self.page_size = clamp_page_size(self.page_size);
        Ok(self)
    }
}

impl GithubConfig {
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("GITHUB_API_URL")
            .unwrap_or_else(|_| DEFAULT_GITHUB_API_URL.to_string());
        Ok(Self {
            api_url: normalize_base_url(&api_url).context("Invalid GITHUB_API_URL")?,
            token: std::env::var("GITHUB_TOKEN").ok().filter(|t| !t.is_empty()),
            page_size: clamp_page_size(
                std::env::var("GITHUB_PAGE_SIZE")
                    .unwrap_or_else(|_| DEFAULT_GITHUB_PAGE_SIZE.to_string())
                    .parse()
                    .context("Invalid GITHUB_PAGE_SIZE")?,
            ),
        })
    }

    pub fn normalized(mut self) -> Result<Self> {
        self.api_url = normalize_base_url(&self.api_url).context("Invalid GitHub api_url")?;
        self.page_size = clamp_page_size(self.page_size);
        Ok(self)
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: format!("{}/", DEFAULT_GITHUB_API_URL),
            token: None,
            page_size: DEFAULT_GITHUB_PAGE_SIZE,
        }
    }
}

/// Parse `raw` as an absolute URL and make sure the path ends in `/`, so
/// relative joins keep any path prefix.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let mut url = url::Url::parse(raw.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url.to_string())
}

fn clamp_page_size(size: usize) -> usize {
    size.clamp(1, MAX_PAGE_SIZE)
}
