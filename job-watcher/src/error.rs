use thiserror::Error;

/// Fatal errors that stop the watcher: both represent a broken deployment
/// rather than a transient condition the loop can retry through.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("cluster API request failed: {0}")]
    Kube(#[from] kube::Error),
    #[error("no pod matching partial name '{0}' was found in the namespace")]
    PodNotFound(String),
    #[error("container '{0}' was not found in the pod's status")]
    ContainerNotFound(String),
}
