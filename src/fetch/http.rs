// src/fetch/http.rs
use async_trait::async_trait;
use reqwest::header::{HeaderName, ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use std::time::Duration;

use super::{FeedFetcher, FetchError, FetchResponse, Markers};
use crate::config::FetchConfig;

/// reqwest-backed fetcher sending `If-None-Match` / `If-Modified-Since`.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(cfg.user_agent.clone())
            .connect_timeout(Duration::from_secs(cfg.timeout_secs.min(10)))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn conditional_fetch(
        &self,
        url: &str,
        markers: &Markers,
    ) -> Result<FetchResponse, FetchError> {
        tracing::debug!(url, conditional = !markers.is_empty(), "fetching feed");

        let mut request = self.client.get(url);
        if let Some(etag) = &markers.etag {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(modified) = &markers.modified {
            request = request.header(IF_MODIFIED_SINCE, modified);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_MODIFIED {
            if markers.is_empty() {
                return Err(FetchError::UnexpectedNotModified(url.to_string()));
            }
            return Ok(FetchResponse::NotModified);
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(String::from)
        };
        let etag = header(ETAG);
        let last_modified = header(LAST_MODIFIED);

        let body = response.bytes().await?.to_vec();
        Ok(FetchResponse::Content {
            body,
            etag,
            last_modified,
        })
    }
}
