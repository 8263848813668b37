//! Bearer-authenticated HTTP client for the script/status API (`/jobs/autoreduction`,
//! `/job/<id>`). Both endpoints share the same retry shape: up to
//! [`RetryPolicy::total_attempts`] attempts with an escalating sleep between them.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::{error, warn};

use crate::error::{ReportError, ScriptApiError};
use crate::model::{AutoreductionScriptRequest, AutoreductionScriptResponse, JobStatusReport};
use crate::retry::RetryPolicy;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the `fia-api`-shaped script acquisition and status reporting service.
pub struct ScriptApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl ScriptApiClient {
    pub fn new(http: reqwest::Client, api_host: impl Into<String>, api_key: impl Into<String>) -> Self {
        ScriptApiClient {
            http,
            base_url: format!("https://{}", api_host.into()),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
        }
    }

    /// `POST /jobs/autoreduction`; retries on any non-201 response.
    pub async fn post_autoreduction(
        &self,
        request: &AutoreductionScriptRequest,
    ) -> Result<AutoreductionScriptResponse, ScriptApiError> {
        let url = format!("{}/jobs/autoreduction", self.base_url);
        let mut last_status = None;

        for attempt in 0..self.retry.total_attempts() {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            }

            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(request)
                .timeout(HTTP_TIMEOUT)
                .send()
                .await?;

            if response.status() == StatusCode::CREATED {
                return Ok(response.json().await?);
            }
            warn!(
                attempt,
                status = %response.status(),
                "autoreduction script request did not return 201, retrying"
            );
            last_status = Some(response.status());
        }

        Err(ScriptApiError::Exhausted(
            last_status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        ))
    }

    /// `PATCH /job/<id>`; retries on any non-200 response, logs critically on
    /// exhaustion but does not stop the caller's cleanup from proceeding.
    pub async fn report_status(&self, job_id: i64, report: &JobStatusReport) -> Result<(), ReportError> {
        let url = format!("{}/job/{job_id}", self.base_url);
        let mut last_status = None;

        for attempt in 0..self.retry.total_attempts() {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt)).await;
            }

            let response = self
                .http
                .patch(&url)
                .bearer_auth(&self.api_key)
                .json(report)
                .timeout(HTTP_TIMEOUT)
                .send()
                .await?;

            if response.status() == StatusCode::OK {
                return Ok(());
            }
            warn!(attempt, status = %response.status(), "status report did not return 200, retrying");
            last_status = Some(response.status());
        }

        let status = last_status.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        error!(job_id, %status, "failed to contact script API after exhausting retries while updating job status");
        Err(ReportError::Exhausted(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_https_by_host() {
        let client = ScriptApiClient::new(reqwest::Client::new(), "fia-api.example", "key");
        assert_eq!(client.base_url, "https://fia-api.example");
    }
}
