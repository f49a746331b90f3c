use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::pipeline::ContentStore;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const DEFAULT_STORE_BRANCH: &str = "master";
const DEFAULT_SPECIAL_PLATFORM_FILTER: &str = "(?i)yocto";
const DEFAULT_MACHINE_VARIABLE: &str = "Machine";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Settings taken from the command line or the environment.
///
/// Every field is optional here; required settings are enforced by
/// [`load_config`] after merging with the optional YAML file.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigArgs {
    /// YAML file providing values for any setting not given on the command
    /// line or in the environment.
    #[arg(long = "config", env = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Address to listen on (e.g. `0.0.0.0:8000`, `localhost:8000` or `:8000`).
    #[arg(long, env = "CONFIG_SERVICE_HOST")]
    pub listen: Option<String>,

    /// Root URL of the configs repository.
    #[arg(long, env = "CONFIG_CONFIGS_REPO")]
    pub configs_repo: Option<String>,

    /// Root URL of the pipelines repository.
    #[arg(long, env = "CONFIG_PIPELINES_REPO")]
    pub pipelines_repo: Option<String>,

    /// Only refs matching this regex get an override.  Empty matches all.
    #[arg(long, env = "CONFIG_SERVICE_OVERRIDE_FILTER")]
    pub override_filter: Option<String>,

    /// Branch of the content stores raw files are served from.
    #[arg(long, env = "CONFIG_STORE_BRANCH")]
    pub store_branch: Option<String>,

    /// Repositories matching this regex use machine-variant pipelines.
    #[arg(long, env = "CONFIG_SPECIAL_PLATFORM_FILTER")]
    pub special_platform_filter: Option<String>,

    /// Build variable holding the machine name for machine-variant pipelines.
    #[arg(long, env = "CONFIG_MACHINE_VARIABLE")]
    pub machine_variable: Option<String>,

    /// Timeout in seconds for each content-store request.
    #[arg(long, env = "CONFIG_FETCH_TIMEOUT")]
    pub fetch_timeout: Option<u64>,
}

/// On-disk YAML configuration.  Same keys as [`ConfigArgs`], snake_case.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    listen: Option<String>,
    configs_repo: Option<String>,
    pipelines_repo: Option<String>,
    override_filter: Option<String>,
    store_branch: Option<String>,
    special_platform_filter: Option<String>,
    machine_variable: Option<String>,
    fetch_timeout: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Immutable process configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// `host:port` to bind; the host may be a name or an IP literal.
    pub listen: String,
    pub configs: ContentStore,
    pub pipelines: ContentStore,
    pub override_filter: Regex,
    pub special_platform_filter: Regex,
    pub machine_variable: String,
    pub fetch_timeout: Duration,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Merge command line, environment and the optional YAML file into a
/// validated [`Config`].
///
/// Precedence is flag/environment first, then file, then built-in default.
/// Empty strings count as unset.
pub fn load_config(args: &ConfigArgs) -> Result<Config> {
    let file = match &args.config_file {
        Some(path) => read_file_config(path)?,
        None => FileConfig::default(),
    };
    merge(args, file)
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse config file: {}", path.display()))
}

fn merge(args: &ConfigArgs, file: FileConfig) -> Result<Config> {
    let pick = |arg: &Option<String>, from_file: Option<String>| {
        non_empty(arg.clone()).or_else(|| non_empty(from_file))
    };

    let listen = pick(&args.listen, file.listen)
        .context("listen address is not set (CONFIG_SERVICE_HOST or --listen)")?;
    let configs_repo = pick(&args.configs_repo, file.configs_repo)
        .context("configs repository is not set (CONFIG_CONFIGS_REPO or --configs-repo)")?;
    let pipelines_repo = pick(&args.pipelines_repo, file.pipelines_repo).context(
        "pipelines repository is not set (CONFIG_PIPELINES_REPO or --pipelines-repo)",
    )?;

    let override_filter = pick(&args.override_filter, file.override_filter).unwrap_or_default();
    let store_branch = pick(&args.store_branch, file.store_branch)
        .unwrap_or_else(|| DEFAULT_STORE_BRANCH.to_owned());
    let special_platform_filter =
        pick(&args.special_platform_filter, file.special_platform_filter)
            .unwrap_or_else(|| DEFAULT_SPECIAL_PLATFORM_FILTER.to_owned());
    let machine_variable = pick(&args.machine_variable, file.machine_variable)
        .unwrap_or_else(|| DEFAULT_MACHINE_VARIABLE.to_owned());
    let fetch_timeout = args
        .fetch_timeout
        .or(file.fetch_timeout)
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);

    anyhow::ensure!(fetch_timeout > 0, "fetch_timeout must be at least 1 second");

    Ok(Config {
        listen: expand_listen(&listen),
        configs: ContentStore::new(&configs_repo, &store_branch)
            .context("invalid configs repository")?,
        pipelines: ContentStore::new(&pipelines_repo, &store_branch)
            .context("invalid pipelines repository")?,
        override_filter: Regex::new(&override_filter)
            .with_context(|| format!("invalid override filter: {override_filter}"))?,
        special_platform_filter: Regex::new(&special_platform_filter).with_context(|| {
            format!("invalid special platform filter: {special_platform_filter}")
        })?,
        machine_variable,
        fetch_timeout: Duration::from_secs(fetch_timeout),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// A bare `:port` binds every interface.  Host names are resolved at bind
/// time.
fn expand_listen(listen: &str) -> String {
    if listen.starts_with(':') {
        format!("0.0.0.0{listen}")
    } else {
        listen.to_owned()
    }
}

#[cfg(test)]
pub(crate) fn test_config(pipelines_repo: &str, override_filter: &str) -> Config {
    let args = ConfigArgs {
        listen: Some("127.0.0.1:0".into()),
        configs_repo: Some(format!("{pipelines_repo}/configs")),
        pipelines_repo: Some(pipelines_repo.into()),
        override_filter: Some(override_filter.into()),
        ..ConfigArgs::default()
    };
    merge(&args, FileConfig::default()).expect("test config is valid")
}
