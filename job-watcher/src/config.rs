//! Environment configuration for the job watcher, sourced entirely from the
//! sidecar's own environment (set by the job creator when it assembles the
//! workload) — there is no watcher TOML file, matching `jobwatcher/main.py`
//! which reads every setting via `os.environ`.

use figment::providers::Env;
use figment::Figment;
use serde::Deserialize;

fn default_job_namespace() -> String {
    "fia".to_string()
}
fn default_api_host() -> String {
    "fia-api-service.fia.svc.cluster.local:80".to_string()
}
fn default_max_job_duration() -> u64 {
    6 * 60 * 60
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    pub job_name: String,
    pub pod_name: String,
    pub container_name: String,

    #[serde(default = "default_job_namespace")]
    pub job_namespace: String,
    #[serde(default = "default_max_job_duration")]
    pub max_job_duration: u64,

    #[serde(default = "default_api_host")]
    pub api_host: String,
    #[serde(default)]
    pub api_key: String,
}

impl WatcherConfig {
    /// Loads config from the process environment. Panics if `JOB_NAME`,
    /// `POD_NAME`, or `CONTAINER_NAME` are unset — the watcher has nothing
    /// to watch without them.
    pub fn load() -> Self {
        Figment::new()
            .merge(Env::raw().only(&[
                "JOB_NAME",
                "POD_NAME",
                "CONTAINER_NAME",
                "JOB_NAMESPACE",
                "MAX_JOB_DURATION",
                "API_HOST",
                "API_KEY",
            ]))
            .extract()
            .expect("failed to load job-watcher config: JOB_NAME, POD_NAME, and CONTAINER_NAME are required")
    }
}
