//! Typed errors for the pushdown core.

use thiserror::Error;

/// Errors that end a fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The page-list call failed. Fatal for the whole fetch; the remote
    /// client's own error stays attached as the source.
    #[error("fetch from '{source_name}' failed on page {page}: {source}")]
    Remote {
        source_name: String,
        page: usize,
        #[source]
        source: anyhow::Error,
    },
}

impl FetchError {
    /// Name of the source whose fetch failed.
    pub fn source_name(&self) -> &str {
        match self {
            FetchError::Remote { source_name, .. } => source_name,
        }
    }
}
