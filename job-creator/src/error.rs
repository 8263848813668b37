use jobcontroller_core::error::{MessageError, ScriptApiError};
use thiserror::Error;

/// Errors provisioning the cluster resources (volumes, claims, workload) for
/// one job. The caller logs these and abandons the message; nothing
/// propagates further.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("cluster API request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("failed to build manifest for {resource}: {source}")]
    ManifestBuild {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything that can go wrong dispatching one decoded message. Every
/// variant is logged at the call site and the message is still acknowledged;
/// this type exists so `dispatch` can report *why* to its caller without
/// panicking.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("message payload is invalid: {0}")]
    Message(#[from] MessageError),
    #[error("script API request failed: {0}")]
    ScriptApi(#[from] ScriptApiError),
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}
