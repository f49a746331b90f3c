//! Pipeline resolution: deciding which pipeline definition governs a build.
//!
//! Given a [`BuildEvent`], the [`Resolver`] walks an ordered list of
//! [`Candidate`](candidate::Candidate) locations in the pipelines content store and returns the
//! first one that exists.  A candidate that is absent is a *miss* and
//! advances the chain; a transport failure or a malformed lookup document
//! aborts it.  When every candidate misses the result is
//! [`Resolution::NoOverride`] and the CI server keeps its own configuration.

pub mod branch;
pub mod candidate;
pub mod engine;
pub mod fetch;
pub mod lookup;
pub mod normalize;
pub mod store;

use std::collections::HashMap;

use bytes::Bytes;

pub use candidate::CandidateKind;
pub use engine::Resolver;
pub use fetch::{ContentFetcher, FetchError, HttpFetcher};
pub use store::ContentStore;

/// The build a pipeline is being resolved for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEvent {
    pub repo: String,
    pub branch: String,
    pub git_ref: String,
    pub commit: String,
    /// Build-scoped variables supplied by the CI server.
    pub variables: HashMap<String, String>,
}

/// Terminal result of one resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A pipeline was found.  `name` is the normalized branch.
    Pipeline { name: String, data: Bytes },
    /// Every candidate missed.
    NoOverride,
}

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("malformed lookup document at {url}: {source}")]
    MalformedLookup {
        url: String,
        #[source]
        source: lookup::LookupError,
    },
}
