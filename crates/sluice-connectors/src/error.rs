//! Typed errors for the connectors crate.

use thiserror::Error;

/// Errors raised while configuring or calling a remote source.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// A table function was called with missing or malformed arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Invalid or missing configuration.
    #[error("config error: {0}")]
    Config(String),
    /// The remote API answered with a non-success status.
    #[error("{service} API error ({status}): {body}")]
    Http {
        service: &'static str,
        status: reqwest::StatusCode,
        body: String,
    },
    /// No connector registered under the requested table name.
    #[error("unknown table: {0}")]
    UnknownTable(String),
}

impl From<ConnectorError> for datafusion::error::DataFusionError {
    fn from(e: ConnectorError) -> Self {
        match e {
            ConnectorError::InvalidArgument(msg) => datafusion::error::DataFusionError::Plan(msg),
            other => datafusion::error::DataFusionError::External(Box::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_display() {
        let err = ConnectorError::Http {
            service: "Jira",
            status: reqwest::StatusCode::UNAUTHORIZED,
            body: "bad token".to_string(),
        };
        assert_eq!(err.to_string(), "Jira API error (401 Unauthorized): bad token");
    }

    #[test]
    fn test_invalid_argument_becomes_plan_error() {
        let df: datafusion::error::DataFusionError =
            ConnectorError::InvalidArgument("expected a string".into()).into();
        assert!(matches!(df, datafusion::error::DataFusionError::Plan(_)));
    }
}
