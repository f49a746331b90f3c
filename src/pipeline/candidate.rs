//! Remote locations tried during a resolution.

use std::fmt::{self, Write as _};

use bytes::Bytes;
use prometheus_client::encoding::{EncodeLabelValue, LabelValueEncoder};
use tracing::{info, warn};

use super::fetch::{ContentFetcher, FetchError, FetchOutcome};
use crate::metrics::{FetchLabels, FetchStatus, Metrics};

/// Why a candidate was generated.
///
/// Traces and metric labels share the kebab-case name from [`Self::as_str`].
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CandidateKind {
    /// `<repo>/<branch>.yaml`
    Primary,
    /// `<repo>/<branch>_<machine>.yaml` for special-platform repositories.
    MachineVariant,
    /// `<repo>/default_<tail>.yaml` for `worktree/<tail>` branches.
    WorktreeDefault,
    /// `lookup/<branch>.toml` for topic branches.
    TopicLookup,
    /// The pipeline a lookup document points at.
    LookupTarget,
    /// `<repo>/default.yaml`
    GenericDefault,
}

impl CandidateKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CandidateKind::Primary => "primary",
            CandidateKind::MachineVariant => "machine-variant",
            CandidateKind::WorktreeDefault => "worktree-default",
            CandidateKind::TopicLookup => "topic-lookup",
            CandidateKind::LookupTarget => "lookup-target",
            CandidateKind::GenericDefault => "generic-default",
        }
    }
}

impl fmt::Display for CandidateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EncodeLabelValue for CandidateKind {
    fn encode(&self, encoder: &mut LabelValueEncoder) -> Result<(), fmt::Error> {
        encoder.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub kind: CandidateKind,
    pub url: String,
}

impl Candidate {
    pub fn new(kind: CandidateKind, url: String) -> Self {
        Self { kind, url }
    }

    /// Fetch this candidate, recording one trace event and one metric sample.
    ///
    /// Returns `Ok(None)` on a miss.
    pub async fn attempt(
        &self,
        fetcher: &dyn ContentFetcher,
        metrics: &Metrics,
    ) -> Result<Option<Bytes>, FetchError> {
        let result = fetcher.fetch(&self.url).await;

        let status = match &result {
            Ok(FetchOutcome::Found(body)) => {
                info!(kind = %self.kind, url = %self.url, bytes = body.len(), "candidate found");
                FetchStatus::Found
            }
            Ok(FetchOutcome::Miss(code)) => {
                info!(kind = %self.kind, url = %self.url, status = %code, "candidate missed");
                FetchStatus::Miss
            }
            Err(e) => {
                warn!(kind = %self.kind, url = %self.url, error = %e, "candidate fetch failed");
                FetchStatus::Error
            }
        };
        metrics
            .candidate_fetches
            .get_or_create(&FetchLabels {
                kind: self.kind,
                status,
            })
            .inc();

        match result? {
            FetchOutcome::Found(body) => Ok(Some(body)),
            FetchOutcome::Miss(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use prometheus_client::registry::Registry;

    use super::*;

    #[test]
    fn metric_label_matches_display_name() {
        let mut registry = Registry::default();
        let metrics = Metrics::new(&mut registry);
        for kind in [CandidateKind::MachineVariant, CandidateKind::LookupTarget] {
            metrics
                .candidate_fetches
                .get_or_create(&FetchLabels {
                    kind,
                    status: FetchStatus::Found,
                })
                .inc();
        }

        let mut text = String::new();
        prometheus_client::encoding::text::encode(&mut text, &registry).unwrap();
        assert_eq!(CandidateKind::MachineVariant.to_string(), "machine-variant");
        assert!(text.contains("kind=\"machine-variant\""), "{text}");
        assert!(text.contains("kind=\"lookup-target\""), "{text}");
        assert!(!text.contains("MachineVariant"), "{text}");
    }
}
