//! Thin Jira REST v2 client covering the search endpoint.

use std::fmt;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, warn};

use super::model::{JiraIssue, SearchResponse, SEARCH_FIELDS};
use crate::config::JiraConfig;
use crate::error::ConnectorError;

/// The part of the Jira API the connector needs.
#[async_trait]
pub trait JiraApi: fmt::Debug + Send + Sync {
    /// One page of a JQL search, `start_at` rows in. Returns fewer than
    /// `max_results` issues only when the result set is exhausted.
    async fn search_issues(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
    ) -> Result<Vec<JiraIssue>>;
}

pub struct JiraClient {
    http: reqwest::Client,
    search_url: url::Url,
    email: String,
    api_token: String,
}

impl fmt::Debug for JiraClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JiraClient")
            .field("search_url", &self.search_url.as_str())
            .field("email", &self.email)
            .finish()
    }
}

impl JiraClient {
    pub fn new(config: &JiraConfig) -> Result<Self> {
        let base = url::Url::parse(&config.base_url).context("Invalid Jira base URL")?;
        let search_url = base
            .join("rest/api/2/search")
            .context("Invalid Jira base URL")?;
        Ok(Self {
            http: reqwest::Client::new(),
            search_url,
            email: config.email.clone(),
            api_token: config.api_token.clone(),
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&JiraConfig::from_env()?)
    }

    async fn fetch_page(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
    ) -> Result<SearchResponse> {
        debug!(jql, start_at, max_results, "Jira search");

        let response = self
            .http
            .get(self.search_url.clone())
            .basic_auth(&self.email, Some(&self.api_token))
            .header("Accept", "application/json")
            .query(&[
                ("jql", jql.to_string()),
                ("startAt", start_at.to_string()),
                ("maxResults", max_results.to_string()),
                ("fields", SEARCH_FIELDS.to_string()),
            ])
            .send()
            .await
            .context("Jira search request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::Http {
                service: "Jira",
                status,
                body,
            }
            .into());
        }

        response
            .json()
            .await
            .context("Invalid Jira search response")
    }
}

#[async_trait]
impl JiraApi for JiraClient {
    async fn search_issues(
        &self,
        jql: &str,
        start_at: usize,
        max_results: usize,
    ) -> Result<Vec<JiraIssue>> {
        // The server may cap maxResults below what was asked for, so keep
        // requesting until the page is filled or the results run out.
        let mut issues = Vec::new();
        let mut warned = false;
        while issues.len() < max_results {
            let want = max_results - issues.len();
            let page = self.fetch_page(jql, start_at + issues.len(), want).await?;
            let got = page.issues.len();
            let cap = page.max_results.unwrap_or(want).min(want);
            issues.extend(page.issues.into_iter().map(JiraIssue::from));

            if got == 0 || got < cap {
                break;
            }
            if page.total.is_some_and(|total| start_at + issues.len() >= total) {
                break;
            }
            if cap < want && !warned {
                warn!(
                    requested = want,
                    allowed = cap,
                    "Jira capped the search page size; fetching the rest in smaller pages"
                );
                warned = true;
            }
        }
        issues.truncate(max_results);
        Ok(issues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(server: &MockServer) -> JiraConfig {
        JiraConfig {
            base_url: format!("{}/", server.uri()),
            email: "bot@acme.io".into(),
            api_token: "secret".into(),
            page_size: 50,
        }
    }

    #[tokio::test]
    async fn test_search_sends_paging_and_auth() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("jql", "status = \"Open\""))
            .and(query_param("startAt", "100"))
            .and(query_param("maxResults", "50"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "startAt": 100,
                "issues": [
                    {"id": "1", "key": "OPS-1", "fields": {"summary": "first"}},
                    {"id": "2", "key": "OPS-2", "fields": {"summary": "second"}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = JiraClient::new(&config(&server)).unwrap();
        let issues = client
            .search_issues("status = \"Open\"", 100, 50)
            .await
            .unwrap();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].key, "OPS-2");
        assert_eq!(issues[0].summary.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad JQL"))
            .mount(&server)
            .await;

        let client = JiraClient::new(&config(&server)).unwrap();
        let err = client.search_issues("nonsense", 0, 50).await.unwrap_err();
        let http = err.downcast_ref::<ConnectorError>().unwrap();
        assert!(matches!(
            http,
            ConnectorError::Http { status, .. } if status.as_u16() == 400
        ));
        assert!(err.to_string().contains("bad JQL"));
    }

    #[tokio::test]
    async fn test_base_path_prefix_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jira/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"issues": []})))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = config(&server);
        config.base_url = format!("{}/jira/", server.uri());
        let client = JiraClient::new(&config).unwrap();
        assert!(client.search_issues("", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_page_cap_is_filled_from_next_offset() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "0"))
            .and(query_param("maxResults", "3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "startAt": 0,
                "maxResults": 2,
                "total": 5,
                "issues": [
                    {"id": "1", "key": "OPS-1", "fields": {}},
                    {"id": "2", "key": "OPS-2", "fields": {}}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .and(query_param("startAt", "2"))
            .and(query_param("maxResults", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "startAt": 2,
                "maxResults": 1,
                "total": 5,
                "issues": [{"id": "3", "key": "OPS-3", "fields": {}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = JiraClient::new(&config(&server)).unwrap();
        let issues = client.search_issues("", 0, 3).await.unwrap();
        assert_eq!(
            issues.iter().map(|i| i.key.as_str()).collect::<Vec<_>>(),
            vec!["OPS-1", "OPS-2", "OPS-3"]
        );
    }

    #[tokio::test]
    async fn test_total_stops_short_of_requested_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/api/2/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "startAt": 0,
                "maxResults": 1,
                "total": 1,
                "issues": [{"id": "1", "key": "OPS-1", "fields": {}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = JiraClient::new(&config(&server)).unwrap();
        assert_eq!(client.search_issues("", 0, 50).await.unwrap().len(), 1);
    }
}
