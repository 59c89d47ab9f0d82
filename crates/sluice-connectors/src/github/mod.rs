//! GitHub pull requests connector.

pub mod client;
pub mod filter;
pub mod model;
pub mod table;

pub use client::{GithubApi, GithubClient};
pub use filter::{PullRequestFilter, PullRequestQuery};
pub use model::{PullRequest, PullRequestDetails};
pub use table::{
    PullRequestPages, PullRequestsFunction, PullRequestsSource, PullRequestsTable,
    GITHUB_PULL_REQUESTS, PULL_REQUEST_COLUMNS,
};
