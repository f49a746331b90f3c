//! Topic-branch redirection through lookup documents.
//!
//! A lookup document lives at `lookup/<normalized-branch>.toml` in the
//! pipelines store and names the pipeline a topic branch should build with:
//!
//! ```toml
//! repo = "meta-acme"
//! base = "kirkstone"
//! pipeline = "kirkstone_qemux86.yaml"
//! ```

use bytes::Bytes;
use serde::Deserialize;
use tracing::info;

use super::candidate::{Candidate, CandidateKind};
use super::fetch::ContentFetcher;
use super::store::ContentStore;
use super::ResolveError;
use crate::metrics::Metrics;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LookupRecord {
    /// Directory in the pipelines store holding the target pipeline.
    #[serde(alias = "Repo")]
    pub repo: String,
    /// Reference the topic branch was cut from.  Informational only.
    #[serde(default, alias = "Base")]
    pub base: String,
    /// File name of the target pipeline inside `repo`.
    #[serde(alias = "Pipeline")]
    pub pipeline: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

impl LookupRecord {
    pub fn decode(doc: &[u8]) -> Result<Self, LookupError> {
        let text = std::str::from_utf8(doc)?;
        Ok(toml::from_str(text)?)
    }

    /// The pipeline this record redirects to.
    pub fn target(&self, store: &ContentStore) -> Candidate {
        Candidate::new(
            CandidateKind::LookupTarget,
            store.url([self.repo.as_str(), self.pipeline.as_str()]),
        )
    }
}

/// Follow the lookup document at `lookup` to its target pipeline.
///
/// A miss on either the document or the target is `Ok(None)`.  A document
/// that does not decode is a hard failure.
pub async fn resolve(
    store: &ContentStore,
    fetcher: &dyn ContentFetcher,
    metrics: &Metrics,
    lookup: &Candidate,
) -> Result<Option<Bytes>, ResolveError> {
    let Some(doc) = lookup.attempt(fetcher, metrics).await? else {
        return Ok(None);
    };

    let record = LookupRecord::decode(&doc).map_err(|source| ResolveError::MalformedLookup {
        url: lookup.url.clone(),
        source,
    })?;
    info!(
        repo = %record.repo,
        base = %record.base,
        pipeline = %record.pipeline,
        "decoded lookup record"
    );

    Ok(record.target(store).attempt(fetcher, metrics).await?)
}
