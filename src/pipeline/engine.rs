//! The ordered candidate chain.

use std::sync::Arc;
use std::time::Instant;

use regex::Regex;
use tracing::{debug, info, instrument};

use super::branch::BranchShape;
use super::candidate::{Candidate, CandidateKind};
use super::fetch::ContentFetcher;
use super::lookup;
use super::normalize::normalize;
use super::store::ContentStore;
use super::{BuildEvent, Resolution, ResolveError};
use crate::config::Config;
use crate::metrics::Metrics;

/// Resolves build events against the pipelines content store.
///
/// Holds only immutable configuration and shared handles, so one instance
/// serves every request concurrently.
pub struct Resolver {
    store: ContentStore,
    special_platform: Regex,
    machine_variable: String,
    fetcher: Arc<dyn ContentFetcher>,
    metrics: Arc<Metrics>,
}

impl Resolver {
    pub fn new(
        store: ContentStore,
        special_platform: Regex,
        machine_variable: impl Into<String>,
        fetcher: Arc<dyn ContentFetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            special_platform,
            machine_variable: machine_variable.into(),
            fetcher,
            metrics,
        }
    }

    pub fn from_config(
        config: &Config,
        fetcher: Arc<dyn ContentFetcher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self::new(
            config.pipelines.clone(),
            config.special_platform_filter.clone(),
            config.machine_variable.clone(),
            fetcher,
            metrics,
        )
    }

    /// Walk the candidate chain for `event` and return the first hit.
    ///
    /// 1. `<repo>/<branch>_<machine>.yaml` for special-platform repositories,
    ///    `<repo>/<branch>.yaml` otherwise.
    /// 2. On a miss, by branch shape:
    ///    - `worktree/<tail>`: `<repo>/default_<tail>.yaml`
    ///    - `<x>/topic/...`: the lookup document, whose outcome is final
    ///    - anything else: `<repo>/default.yaml`
    /// 3. [`Resolution::NoOverride`].
    #[instrument(skip_all, fields(repo = %event.repo, branch = %event.branch, commit = %event.commit))]
    pub async fn resolve(&self, event: &BuildEvent) -> Result<Resolution, ResolveError> {
        let started = Instant::now();
        let result = self.walk(event).await;
        self.metrics
            .resolution_duration_seconds
            .observe(started.elapsed().as_secs_f64());
        result
    }

    async fn walk(&self, event: &BuildEvent) -> Result<Resolution, ResolveError> {
        let name = normalize(&event.branch);
        let fetcher = self.fetcher.as_ref();

        let primary = self.primary_candidate(event, &name);
        if let Some(data) = primary.attempt(fetcher, &self.metrics).await? {
            return Ok(Resolution::Pipeline { name, data });
        }

        let fallback = match BranchShape::classify(&event.branch) {
            BranchShape::Worktree { tail } => Candidate::new(
                CandidateKind::WorktreeDefault,
                self.store.url([event.repo.as_str(), format!("default_{tail}.yaml").as_str()]),
            ),
            BranchShape::Topic { tail } => {
                info!(topic = %tail, "topic branch, consulting lookup table");
                let doc = Candidate::new(
                    CandidateKind::TopicLookup,
                    self.store.url(["lookup", format!("{name}.toml").as_str()]),
                );
                let found = lookup::resolve(&self.store, fetcher, &self.metrics, &doc).await?;
                return Ok(match found {
                    Some(data) => Resolution::Pipeline { name, data },
                    None => Resolution::NoOverride,
                });
            }
            BranchShape::Plain => Candidate::new(
                CandidateKind::GenericDefault,
                self.store.url([event.repo.as_str(), "default.yaml"]),
            ),
        };

        Ok(match fallback.attempt(fetcher, &self.metrics).await? {
            Some(data) => Resolution::Pipeline { name, data },
            None => {
                info!("no candidate matched, leaving configuration to the CI server");
                Resolution::NoOverride
            }
        })
    }

    fn primary_candidate(&self, event: &BuildEvent, name: &str) -> Candidate {
        if self.special_platform.is_match(&event.repo) {
            let machine = event
                .variables
                .get(&self.machine_variable)
                .map(String::as_str)
                .unwrap_or_default();
            debug!(%machine, "special-platform repository, using machine variant");
            Candidate::new(
                CandidateKind::MachineVariant,
                self.store
                    .url([event.repo.as_str(), format!("{name}_{machine}.yaml").as_str()]),
            )
        } else {
            Candidate::new(
                CandidateKind::Primary,
                self.store.url([event.repo.as_str(), format!("{name}.yaml").as_str()]),
            )
        }
    }
}
