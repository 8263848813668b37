use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The inbound message taxonomy, discriminated on `job_type`.
///
/// This replaces the source's open-mapping-plus-`.get()` approach with an
/// eagerly-validated tagged union: a message that doesn't match one of the
/// three shapes below fails to deserialize rather than silently proceeding
/// with missing fields.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "job_type", rename_all = "snake_case")]
pub enum JobRequest {
    Autoreduction(AutoreductionRequest),
    Rerun(RerunRequest),
    Simple(SimpleRequest),
}

impl<'de> Deserialize<'de> for JobRequest {
    /// A message missing `job_type` entirely defaults to `autoreduction`; the
    /// derived tagged-enum representation has no way to express that default,
    /// so the tag is filled in before delegating to it.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(tag = "job_type", rename_all = "snake_case")]
        enum Tagged {
            Autoreduction(AutoreductionRequest),
            Rerun(RerunRequest),
            Simple(SimpleRequest),
        }

        let mut value = serde_json::Value::deserialize(deserializer)?;
        if let Some(obj) = value.as_object_mut() {
            obj.entry("job_type")
                .or_insert_with(|| serde_json::Value::String("autoreduction".to_string()));
        }

        match serde_json::from_value(value).map_err(serde::de::Error::custom)? {
            Tagged::Autoreduction(req) => Ok(JobRequest::Autoreduction(req)),
            Tagged::Rerun(req) => Ok(JobRequest::Rerun(req)),
            Tagged::Simple(req) => Ok(JobRequest::Simple(req)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoreductionRequest {
    pub filepath: String,
    pub experiment_number: String,
    pub instrument: String,
    pub experiment_title: String,
    pub users: String,
    pub run_start: String,
    pub run_end: String,
    pub good_frames: i64,
    pub raw_frames: i64,
    #[serde(default)]
    pub additional_values: HashMap<String, serde_json::Value>,
    pub runner_image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RerunRequest {
    pub job_id: i64,
    pub runner_image: String,
    pub script: String,
    pub instrument: String,
    pub rb_number: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimpleRequest {
    pub runner_image: String,
    pub script: String,
    #[serde(default)]
    pub user_number: Option<String>,
    #[serde(default)]
    pub experiment_number: Option<String>,
    pub job_id: i64,
    #[serde(default)]
    pub taints: Vec<Taint>,
    #[serde(default)]
    pub affinity: Option<NodeAffinityRequest>,
}

impl SimpleRequest {
    /// Exactly one of `user_number`/`experiment_number` must be set.
    pub fn owner(&self) -> Result<SimpleOwner, crate::error::MessageError> {
        match (&self.user_number, &self.experiment_number) {
            (Some(_), Some(_)) => Err(crate::error::MessageError::AmbiguousOwner),
            (None, None) => Err(crate::error::MessageError::MissingOwner),
            (Some(user), None) => Ok(SimpleOwner::User(user.clone())),
            (None, Some(experiment)) => Ok(SimpleOwner::Experiment(experiment.clone())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleOwner {
    User(String),
    Experiment(String),
}

impl SimpleOwner {
    pub fn id(&self) -> &str {
        match self {
            SimpleOwner::User(id) | SimpleOwner::Experiment(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Taint {
    pub key: Option<String>,
    pub value: Option<String>,
    pub operator: Option<String>,
    pub effect: Option<String>,
}

/// A node affinity requirement as supplied on a `simple` message, e.g.
/// `{"key": "node-type", "operator": "In", "values": ["gpu-worker"]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeAffinityRequest {
    pub key: String,
    pub operator: String,
    pub values: Vec<String>,
}

/// Terminal state reported to the script API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobState {
    Successful,
    Unsuccessful,
    Error,
    NotStarted,
}

impl JobState {
    /// Parses the `status` field of a main-container success payload, which
    /// is free-form text from the script; unrecognised values fall back to
    /// `Unsuccessful` rather than failing the whole report.
    pub fn from_script_status(raw: &str) -> JobState {
        match raw.to_uppercase().as_str() {
            "SUCCESSFUL" => JobState::Successful,
            "ERROR" => JobState::Error,
            "NOT_STARTED" => JobState::NotStarted,
            _ => JobState::Unsuccessful,
        }
    }
}

/// The full status payload sent to `PATCH /job/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusReport {
    pub state: JobState,
    pub status_message: String,
    pub output_files: Vec<String>,
    pub stacktrace: String,
    pub start: String,
    pub end: String,
}

/// The JSON shape a main container writes as its last log line on success.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScriptSuccessPayload {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub output_files: Vec<String>,
    #[serde(default)]
    pub stacktrace: String,
}

/// The metadata bundle posted to `POST /jobs/autoreduction`; the response
/// carries the script the main container should run plus the job id the
/// watcher later reports against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoreductionScriptRequest {
    pub filename: String,
    pub experiment_number: String,
    pub instrument: String,
    pub experiment_title: String,
    pub users: String,
    pub run_start: String,
    pub run_end: String,
    pub good_frames: i64,
    pub raw_frames: i64,
    pub additional_values: HashMap<String, serde_json::Value>,
    pub runner_image: String,
}

/// The `201 Created` response body of `POST /jobs/autoreduction`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoreductionScriptResponse {
    pub script: String,
    pub job_id: i64,
}

/// The set of volumes and claims a creator provisioned for one job, recorded
/// in the workload's annotations and consumed by the watcher for cleanup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionedResources {
    pub volumes: Vec<String>,
    pub claims: Vec<String>,
}

/// One storage binding the creator attaches to the main container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageBinding {
    pub volume_name: String,
    pub claim_name: String,
    pub mount_path: String,
    pub read_only: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_request(user_number: Option<&str>, experiment_number: Option<&str>) -> SimpleRequest {
        SimpleRequest {
            runner_image: "reg/org/img:1".to_string(),
            script: "print(1)".to_string(),
            user_number: user_number.map(str::to_string),
            experiment_number: experiment_number.map(str::to_string),
            job_id: 99,
            taints: Vec::new(),
            affinity: None,
        }
    }

    #[test]
    fn owner_rejects_both_set() {
        let req = simple_request(Some("u7"), Some("RB1"));
        assert_eq!(req.owner(), Err(crate::error::MessageError::AmbiguousOwner));
    }

    #[test]
    fn owner_rejects_neither_set() {
        let req = simple_request(None, None);
        assert_eq!(req.owner(), Err(crate::error::MessageError::MissingOwner));
    }

    #[test]
    fn owner_accepts_user_number() {
        let req = simple_request(Some("u7"), None);
        assert_eq!(req.owner().unwrap(), SimpleOwner::User("u7".to_string()));
    }

    #[test]
    fn owner_accepts_experiment_number() {
        let req = simple_request(None, Some("RB1"));
        assert_eq!(req.owner().unwrap(), SimpleOwner::Experiment("RB1".to_string()));
    }

    #[test]
    fn deserializes_explicit_simple_job_type() {
        let json = serde_json::json!({
            "job_type": "simple",
            "runner_image": "reg/org/img:1",
            "script": "print(1)",
            "user_number": "u7",
            "job_id": 99,
        });
        let parsed: JobRequest = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed, JobRequest::Simple(_)));
    }

    #[test]
    fn deserializes_explicit_rerun_job_type() {
        let json = serde_json::json!({
            "job_type": "rerun",
            "job_id": 1,
            "runner_image": "reg/org/img:1",
            "script": "print(1)",
            "instrument": "mari",
            "rb_number": "RB1",
            "filename": "run123.nxs",
        });
        let parsed: JobRequest = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed, JobRequest::Rerun(_)));
    }

    #[test]
    fn missing_job_type_defaults_to_autoreduction() {
        let json = serde_json::json!({
            "filepath": "/data/run123.nxs",
            "experiment_number": "RB42",
            "instrument": "mari",
            "experiment_title": "t",
            "users": "u",
            "run_start": "2024-01-01T00:00:00",
            "run_end": "2024-01-01T01:00:00",
            "good_frames": 1000,
            "raw_frames": 1000,
        });
        let parsed: JobRequest = serde_json::from_value(json).unwrap();
        assert!(matches!(parsed, JobRequest::Autoreduction(_)));
    }

    #[test]
    fn unrecognised_job_type_fails_to_deserialize() {
        let json = serde_json::json!({"job_type": "explode"});
        let result: Result<JobRequest, _> = serde_json::from_value(json);
        assert!(result.is_err());
    }
}
