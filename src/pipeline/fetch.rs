//! Single-shot GET against a content store.
//!
//! The fetcher distinguishes an expected *miss* (the store answered, but not
//! with `200 OK`) from a *hard failure* (the request could not complete).  The
//! resolution chain advances on a miss and aborts on a failure.

use bytes::Bytes;
use reqwest::StatusCode;
use tracing::debug;

/// Result of a GET that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// `200 OK` with the full response body.
    Found(Bytes),
    /// Any other status.  The caller should try its next candidate.
    Miss(StatusCode),
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("GET {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to read body of {url}: {source}")]
    Body {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Anything that can retrieve a document by URL.
#[async_trait::async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError>;
}

/// [`ContentFetcher`] backed by a shared `reqwest` client.
///
/// The request timeout is whatever the client was built with.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchOutcome, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_owned(),
                source,
            })?;

        let status = resp.status();
        if status != StatusCode::OK {
            debug!(%url, %status, "content store returned non-OK status");
            return Ok(FetchOutcome::Miss(status));
        }

        let body = resp.bytes().await.map_err(|source| FetchError::Body {
            url: url.to_owned(),
            source,
        })?;
        Ok(FetchOutcome::Found(body))
    }
}
