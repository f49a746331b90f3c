//! JSON bodies exchanged with the CI server.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pipeline::BuildEvent;

/// Body of a config-extension request.
#[derive(Debug, Deserialize)]
pub struct ConfigRequest {
    pub repo: RepoMeta,
    #[serde(alias = "build")]
    pub pipeline: PipelineMeta,
    /// The CI server's own configuration files, if it sent any.
    #[serde(default)]
    pub configs: Option<Vec<ConfigFile>>,
}

#[derive(Debug, Deserialize)]
pub struct RepoMeta {
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub owner: String,
}

#[derive(Debug, Deserialize)]
pub struct PipelineMeta {
    pub branch: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub commit: String,
    #[serde(default)]
    pub event: String,
    #[serde(default, alias = "additional_variables")]
    pub variables: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub name: String,
    pub data: String,
}

/// Body of a `200 OK` answer.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub configs: Vec<ConfigFile>,
}

impl ConfigRequest {
    pub fn build_event(&self) -> BuildEvent {
        BuildEvent {
            repo: self.repo.name.clone(),
            branch: self.pipeline.branch.clone(),
            git_ref: self.pipeline.git_ref.clone(),
            commit: self.pipeline.commit.clone(),
            variables: self.pipeline.variables.clone().unwrap_or_default(),
        }
    }
}
