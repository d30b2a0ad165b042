// src/fetch/mod.rs
pub mod http;
pub mod staleness;

pub use self::http::HttpFetcher;
pub use staleness::{classify, Staleness};

use async_trait::async_trait;

/// Validators remembered from the last successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markers {
    pub modified: Option<String>,
    pub etag: Option<String>,
}

impl Markers {
    pub fn new(modified: Option<String>, etag: Option<String>) -> Self {
        Self {
            modified: modified.filter(|s| !s.is_empty()),
            etag: etag.filter(|s| !s.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.modified.is_none() && self.etag.is_none()
    }
}

/// What the transport saw, before any staleness decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchResponse {
    /// HTTP 304.
    NotModified,
    Content {
        body: Vec<u8>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {status} when fetching {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("server answered 304 to an unconditional request for {0}")]
    UnexpectedNotModified(String),
}

/// Conditional fetch primitive. Empty `markers` means an unconditional request.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    async fn conditional_fetch(
        &self,
        url: &str,
        markers: &Markers,
    ) -> Result<FetchResponse, FetchError>;
}
