//! The observation loop: polls a pod's tracked container until it reaches a
//! terminal state or stalls, reports the outcome, and cleans up.
//!
//! Grounded in `job_watcher.py::JobWatcher`, restated so a stall is reported
//! to the API (as `ERROR`) rather than silently dropped — the source's
//! `check_for_pod_stalled` path calls `cleanup_job` without ever calling
//! `_update_job_status`, which this implementation treats as a bug per the
//! accompanying redesign note rather than behaviour to preserve.

use std::time::Duration;

use chrono::Utc;
use jobcontroller_core::model::{JobState, JobStatusReport};
use jobcontroller_core::script_api::ScriptApiClient;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ContainerStateTerminated, Pod};
use kube::api::{Api, ListParams, LogParams};
use kube::Client;
use tracing::{info, warn};

use crate::cleanup;
use crate::config::WatcherConfig;
use crate::error::WatcherError;
use crate::logs;

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const STALL_LOG_SILENCE_SECS: i64 = 30 * 60;
const FAILURE_TAIL_LINES: i64 = 50;

pub struct JobWatcher {
    client: Client,
    namespace: String,
    job_name: String,
    container_name: String,
    max_time_to_complete: Duration,
    pod_name: String,
    script_api: ScriptApiClient,
}

impl JobWatcher {
    /// Resolves `partial_pod_name` to a concrete pod in the namespace, then
    /// builds a watcher that will track `container_name` on it.
    pub async fn discover(client: Client, config: &WatcherConfig, script_api: ScriptApiClient) -> Result<Self, WatcherError> {
        let pod_name = find_pod_by_partial_name(&client, &config.job_namespace, &config.pod_name).await?;
        info!(pod_name, "pod found");
        Ok(JobWatcher {
            client,
            namespace: config.job_namespace.clone(),
            job_name: config.job_name.clone(),
            container_name: config.container_name.clone(),
            max_time_to_complete: Duration::from_secs(config.max_job_duration),
            pod_name,
            script_api,
        })
    }

    /// Runs until the tracked container reaches a terminal state, the pod
    /// stalls, or the process receives a termination signal — whichever
    /// comes first. A signal is the only external cancellation channel this
    /// watcher has: on receipt it logs and returns immediately, without
    /// attempting an in-flight report or cleanup.
    pub async fn watch(&self) -> Result<(), WatcherError> {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown_signal() => {
                warn!(job_name = %self.job_name, "received termination signal, exiting without reporting or cleanup");
                Ok(())
            }
        }
    }

    /// Runs until the tracked container reaches a terminal state or the pod
    /// stalls; reports the outcome and cleans up provisioned storage before
    /// returning.
    async fn run(&self) -> Result<(), WatcherError> {
        info!(job_name = %self.job_name, "starting job watcher, scanning for new job states");
        loop {
            let pod: Pod = Api::namespaced(self.client.clone(), &self.namespace)
                .get(&self.pod_name)
                .await?;

            if let Some(terminated) = self.terminated_state(&pod)? {
                let job: Job = Api::namespaced(self.client.clone(), &self.namespace).get(&self.job_name).await?;
                if terminated.exit_code == 0 {
                    info!(job_name = %self.job_name, "job has succeeded, processing success");
                    self.process_success(&pod, &job, &terminated).await;
                } else {
                    info!(job_name = %self.job_name, "job has errored, processing failure");
                    self.process_failure(&job, &terminated).await;
                }
                self.cleanup(&job).await;
                return Ok(());
            }

            if let Some(reason) = self.stall_reason(&pod).await? {
                info!(job_name = %self.job_name, reason, "job has stalled out");
                let job: Job = Api::namespaced(self.client.clone(), &self.namespace).get(&self.job_name).await?;
                self.process_stall(&pod, &job, &reason).await;
                self.cleanup(&job).await;
                return Ok(());
            }

            info!(container_name = %self.container_name, "container still busy");
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn terminated_state(&self, pod: &Pod) -> Result<Option<ContainerStateTerminated>, WatcherError> {
        let statuses = pod
            .status
            .as_ref()
            .and_then(|status| status.container_statuses.as_ref())
            .ok_or_else(|| WatcherError::ContainerNotFound(self.container_name.clone()))?;

        let status = statuses
            .iter()
            .find(|status| status.name == self.container_name)
            .ok_or_else(|| WatcherError::ContainerNotFound(self.container_name.clone()))?;

        Ok(status.state.as_ref().and_then(|state| state.terminated.clone()))
    }

    /// Stalled when the pod is older than 30 minutes and its last 30 minutes
    /// of logs are empty, or when it exceeds `max_time_to_complete`
    /// regardless of log activity.
    async fn stall_reason(&self, pod: &Pod) -> Result<Option<String>, WatcherError> {
        let Some(age) = self.pod_age(pod) else {
            return Ok(None);
        };

        let log_tail_empty = if age >= Duration::from_secs(STALL_LOG_SILENCE_SECS as u64) {
            let logs = self
                .read_logs(LogParams {
                    container: Some(self.container_name.clone()),
                    tail_lines: Some(1),
                    since_seconds: Some(STALL_LOG_SILENCE_SECS),
                    timestamps: true,
                    ..Default::default()
                })
                .await?;
            logs.trim().is_empty()
        } else {
            false
        };

        Ok(stall_decision(age, log_tail_empty, self.max_time_to_complete, &self.pod_name))
    }

    fn pod_age(&self, pod: &Pod) -> Option<Duration> {
        let created = pod.metadata.creation_timestamp.as_ref()?.0;
        (Utc::now() - created).to_std().ok()
    }

    async fn read_logs(&self, params: LogParams) -> Result<String, WatcherError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        Ok(api.logs(&self.pod_name, &params).await?)
    }

    fn start_and_end(&self, pod: &Pod, terminated: Option<&ContainerStateTerminated>) -> (String, String) {
        let start = pod
            .status
            .as_ref()
            .and_then(|status| status.start_time.as_ref())
            .map(|time| time.0.to_rfc3339())
            .unwrap_or_default();
        let end = terminated.and_then(|t| t.finished_at.as_ref()).map(|time| time.0.to_rfc3339()).unwrap_or_default();
        (start, end)
    }

    async fn process_success(&self, pod: &Pod, job: &Job, terminated: &ContainerStateTerminated) {
        let job_id = match self.job_id(job) {
            Some(id) => id,
            None => {
                warn!(job_name = %self.job_name, "job has no job-id annotation, cannot report status");
                return;
            }
        };

        let log = self
            .read_logs(LogParams { container: Some(self.container_name.clone()), ..Default::default() })
            .await
            .unwrap_or_default();
        let payload = logs::extract_success_payload(&log);
        info!(job_name = %self.job_name, status = %payload.status, "job completed");

        let (start, end) = self.start_and_end(pod, Some(terminated));
        let report = JobStatusReport {
            state: logs::success_state(&payload),
            status_message: payload.status_message,
            output_files: payload.output_files,
            stacktrace: payload.stacktrace,
            start,
            end,
        };
        self.report(job_id, report).await;
    }

    async fn process_failure(&self, job: &Job, terminated: &ContainerStateTerminated) {
        let job_id = match self.job_id(job) {
            Some(id) => id,
            None => {
                warn!(job_name = %self.job_name, "job has no job-id annotation, cannot report status");
                return;
            }
        };

        let log = self
            .read_logs(LogParams {
                container: Some(self.container_name.clone()),
                tail_lines: Some(FAILURE_TAIL_LINES),
                ..Default::default()
            })
            .await
            .unwrap_or_default();
        let (error_line, stacktrace) = logs::find_latest_error_and_stacktrace(&log);
        info!(job_name = %self.job_name, error_line, "job failed");

        let pod = match Api::<Pod>::namespaced(self.client.clone(), &self.namespace).get(&self.pod_name).await {
            Ok(pod) => pod,
            Err(error) => {
                warn!(%error, "failed to refetch pod for failure timestamps");
                return;
            }
        };
        let (start, end) = self.start_and_end(&pod, Some(terminated));
        let report = JobStatusReport {
            state: JobState::Error,
            status_message: error_line,
            output_files: Vec::new(),
            stacktrace,
            start,
            end,
        };
        self.report(job_id, report).await;
    }

    async fn process_stall(&self, pod: &Pod, job: &Job, reason: &str) {
        let job_id = match self.job_id(job) {
            Some(id) => id,
            None => {
                warn!(job_name = %self.job_name, "job has no job-id annotation, cannot report status");
                return;
            }
        };

        let (start, end) = self.start_and_end(pod, None);
        let report = JobStatusReport {
            state: JobState::Error,
            status_message: reason.to_string(),
            output_files: Vec::new(),
            stacktrace: String::new(),
            start,
            end,
        };
        self.report(job_id, report).await;
    }

    async fn report(&self, job_id: i64, report: JobStatusReport) {
        if let Err(error) = self.script_api.report_status(job_id, &report).await {
            warn!(job_id, %error, "failed to report job status");
        }
    }

    fn job_id(&self, job: &Job) -> Option<i64> {
        job.metadata
            .annotations
            .as_ref()?
            .get("job-id")?
            .parse()
            .ok()
    }

    async fn cleanup(&self, job: &Job) {
        info!(job_name = %self.job_name, "starting cleanup of job");
        let annotations = job.metadata.annotations.clone().unwrap_or_default();
        let empty = String::new();
        let pvs = annotations.get("pvs").unwrap_or(&empty);
        let pvcs = annotations.get("pvcs").unwrap_or(&empty);
        cleanup::clean_up_job(&self.client, &self.namespace, pvs, pvcs).await;
    }
}

/// Resolves once a SIGTERM (or, for local runs, Ctrl+C) is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn find_pod_by_partial_name(client: &Client, namespace: &str, partial_name: &str) -> Result<String, WatcherError> {
    let api: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let pods = api.list(&ListParams::default()).await?;
    pods.items
        .into_iter()
        .find_map(|pod| {
            let name = pod.metadata.name?;
            name.contains(partial_name).then_some(name)
        })
        .ok_or_else(|| WatcherError::PodNotFound(partial_name.to_string()))
}

/// Pure decision extracted from [`JobWatcher::stall_reason`] so the three
/// boundary behaviours (too young to flag, silent past 30 minutes, past the
/// overall deadline regardless of logs) are unit-testable without a live
/// cluster.
fn stall_decision(age: Duration, log_tail_empty: bool, max_time_to_complete: Duration, pod_name: &str) -> Option<String> {
    if age >= Duration::from_secs(STALL_LOG_SILENCE_SECS as u64) && log_tail_empty {
        return Some(format!("no new logs for pod {pod_name} in {STALL_LOG_SILENCE_SECS} seconds"));
    }

    if age >= max_time_to_complete {
        return Some(format!("pod {pod_name} exceeded maximum job duration"));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn young_pod_never_flagged_on_log_silence() {
        let age = Duration::from_secs(60);
        let max = Duration::from_secs(6 * 60 * 60);
        assert_eq!(stall_decision(age, true, max, "pod-a"), None);
    }

    #[test]
    fn old_pod_with_empty_log_tail_is_stalled() {
        let age = Duration::from_secs(STALL_LOG_SILENCE_SECS as u64 + 1);
        let max = Duration::from_secs(6 * 60 * 60);
        let reason = stall_decision(age, true, max, "pod-a").unwrap();
        assert!(reason.contains("no new logs"));
    }

    #[test]
    fn old_pod_with_recent_logs_is_not_stalled() {
        let age = Duration::from_secs(STALL_LOG_SILENCE_SECS as u64 + 1);
        let max = Duration::from_secs(6 * 60 * 60);
        assert_eq!(stall_decision(age, false, max, "pod-a"), None);
    }

    #[test]
    fn pod_past_max_duration_is_stalled_regardless_of_logs() {
        let max = Duration::from_secs(60);
        let age = Duration::from_secs(61);
        let reason = stall_decision(age, false, max, "pod-a").unwrap();
        assert!(reason.contains("exceeded maximum job duration"));
    }
}
