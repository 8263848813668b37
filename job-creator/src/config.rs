//! Environment/TOML configuration for the job creator, loaded the way
//! `cloud-servers-oss::config::CloudServiceConfig` does: a `Toml` file
//! merged with `Env::prefixed(...).split("__")`, except `DEFAULT_RUNNER_SHA`
//! and `WATCHER_SHA` have no default and a missing value is fatal at
//! startup, matching the source's `OSError` on a missing SHA.

use std::path::PathBuf;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

fn default_job_namespace() -> String {
    "fia".to_string()
}
fn default_api_host() -> String {
    "fia-api-service.fia.svc.cluster.local:80".to_string()
}
fn default_queue_host() -> String {
    "localhost".to_string()
}
fn default_queue_name() -> String {
    "scheduled-jobs".to_string()
}
fn default_max_job_duration() -> u64 {
    6 * 60 * 60
}
fn default_archive_credentials_secret() -> String {
    "archive-creds".to_string()
}
fn default_shared_fs_id() -> String {
    "".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatorConfig {
    #[serde(default)]
    pub dev_mode: bool,

    pub default_runner_sha: String,
    pub watcher_sha: String,

    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_queue_host")]
    pub queue_host: String,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    #[serde(default)]
    pub queue_user: String,
    #[serde(default)]
    pub queue_password: String,

    #[serde(default = "default_job_namespace")]
    pub job_namespace: String,

    #[serde(default = "default_archive_credentials_secret")]
    pub archive_credentials_secret: String,
    #[serde(default = "default_shared_fs_id")]
    pub shared_fs_share_id: String,
    #[serde(default = "default_shared_fs_id")]
    pub shared_fs_access_id: String,

    #[serde(default = "default_max_job_duration")]
    pub max_job_duration_secs: u64,
}

impl CreatorConfig {
    /// Loads config from `config/job-creator.toml` merged with
    /// `JOBCREATOR__`-prefixed environment variables. Panics (fatal at
    /// startup, matching the source) if `DEFAULT_RUNNER_SHA` or
    /// `WATCHER_SHA` are not set by either source.
    pub fn load() -> Self {
        Figment::new()
            .merge(Toml::file(config_file_path()))
            .merge(Env::prefixed("JOBCREATOR__").split("__"))
            .merge(Env::raw().only(&[
                "DEV_MODE",
                "DEFAULT_RUNNER_SHA",
                "WATCHER_SHA",
                "API_HOST",
                "API_KEY",
                "QUEUE_HOST",
                "QUEUE_NAME",
                "QUEUE_USER",
                "QUEUE_PASSWORD",
                "JOB_NAMESPACE",
                "MAX_JOB_DURATION",
            ]))
            .extract()
            .expect("failed to load job-creator config: DEFAULT_RUNNER_SHA and WATCHER_SHA are required")
    }

    pub fn default_runner_image(&self) -> String {
        format!("ghcr.io/fiaisis/mantid@sha256:{}", self.default_runner_sha)
    }

    pub fn watcher_image(&self) -> String {
        format!("ghcr.io/fiaisis/jobwatcher@sha256:{}", self.watcher_sha)
    }
}

fn config_file_path() -> PathBuf {
    PathBuf::from("config/job-creator.toml")
}
