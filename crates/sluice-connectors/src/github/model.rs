//! Pull request entity and the GitHub REST payloads it is read from.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One pull request as exposed by the `github_pull_requests` table. Fields
/// from `details` are only present once the item has been enriched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullRequest {
    pub number: i64,
    pub title: String,
    pub state: String,
    pub author: Option<String>,
    /// `owner:branch` of the source branch.
    pub head: Option<String>,
    pub head_ref: Option<String>,
    /// Target branch name.
    pub base: Option<String>,
    pub draft: Option<bool>,
    pub body: Option<String>,
    pub html_url: Option<String>,
    pub labels: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    pub details: Option<PullRequestDetails>,
}

/// Counters only the single-item endpoint returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PullRequestDetails {
    pub merged: Option<bool>,
    pub commits: Option<i64>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub changed_files: Option<i64>,
    pub comments: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawPullRequest {
    pub number: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: String,
    pub user: Option<RawUser>,
    pub head: Option<RawBranch>,
    pub base: Option<RawBranch>,
    pub draft: Option<bool>,
    pub body: Option<String>,
    pub html_url: Option<String>,
    #[serde(default)]
    pub labels: Vec<RawLabel>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub merged_at: Option<DateTime<Utc>>,
    // Single-item endpoint only.
    pub merged: Option<bool>,
    pub commits: Option<i64>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub changed_files: Option<i64>,
    pub comments: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawUser {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawBranch {
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawLabel {
    pub name: String,
}

impl From<RawPullRequest> for PullRequest {
    fn from(raw: RawPullRequest) -> Self {
        let has_details = raw.merged.is_some()
            || raw.commits.is_some()
            || raw.additions.is_some()
            || raw.deletions.is_some()
            || raw.changed_files.is_some();
        let details = has_details.then(|| PullRequestDetails {
            merged: raw.merged,
            commits: raw.commits,
            additions: raw.additions,
            deletions: raw.deletions,
            changed_files: raw.changed_files,
            comments: raw.comments,
        });
        let (head, head_ref) = match raw.head {
            Some(b) => (b.label, b.ref_name),
            None => (None, None),
        };
        PullRequest {
            number: raw.number,
            title: raw.title,
            state: raw.state,
            author: raw.user.map(|u| u.login),
            head,
            head_ref,
            base: raw.base.and_then(|b| b.ref_name),
            draft: raw.draft,
            body: raw.body,
            html_url: raw.html_url,
            labels: raw.labels.into_iter().map(|l| l.name).collect(),
            created_at: raw.created_at,
            updated_at: raw.updated_at,
            closed_at: raw.closed_at,
            merged_at: raw.merged_at,
            details,
        }
    }
}
