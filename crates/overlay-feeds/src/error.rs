//! Errors raised while talking to the weather and elevation sources.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed response from {url}: {reason}")]
    Malformed { url: String, reason: String },

    #[error("source URL is not configured")]
    NotConfigured,

    #[error("retry suppressed for another {0:?}")]
    BackingOff(Duration),
}

impl FeedError {
    pub(crate) fn malformed(url: &str, reason: impl Into<String>) -> Self {
        FeedError::Malformed {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the request timed out rather than being refused or rejected.
    pub fn is_timeout(&self) -> bool {
        match self {
            FeedError::Request { source, .. } => source.is_timeout(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;
