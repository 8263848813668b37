use thiserror::Error;

/// Payload-level errors: the message decoded but its contents are invalid.
/// These are logged and acknowledged; they never hold up the queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageError {
    #[error("both user_number and experiment_number were set, exactly one is required")]
    AmbiguousOwner,
    #[error("neither user_number nor experiment_number was set, exactly one is required")]
    MissingOwner,
}

/// Errors from posting to or reading from the script/status HTTP API.
#[derive(Debug, Error)]
pub enum ScriptApiError {
    #[error("request to script API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("script API returned non-success status {0} after exhausting retries")]
    Exhausted(reqwest::StatusCode),
}

/// Errors from resolving a runner image reference to a content digest.
#[derive(Debug, Error)]
pub enum DigestResolutionError {
    #[error("image reference has no parseable org/image:tag segments: {0}")]
    Unparseable(String),
    #[error("registry request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors from reporting a job's terminal status to the script API.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("request to script API failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("script API returned non-success status {0} after exhausting retries")]
    Exhausted(reqwest::StatusCode),
}
