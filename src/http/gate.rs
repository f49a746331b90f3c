//! Admission filter applied before resolution.

use regex::Regex;
use tracing::info;

/// Decides which refs are eligible for a pipeline override.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    filter: Regex,
}

impl AdmissionGate {
    pub fn new(filter: Regex) -> Self {
        Self { filter }
    }

    /// Whether `git_ref` may be resolved.  Rejections are logged.
    pub fn admits(&self, git_ref: &str) -> bool {
        let admitted = self.filter.is_match(git_ref);
        if !admitted {
            info!(
                %git_ref,
                filter = %self.filter.as_str(),
                "ref does not match override filter, skipping"
            );
        }
        admitted
    }
}
