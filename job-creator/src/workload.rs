//! Assembles and submits the workload (main container + watcher sidecar +
//! scheduling + annotations) that a provisioned set of storage bindings
//! backs.
//!
//! Grounded in `job_creator.py::JobCreator.spawn_job`: one `V1Job` with a
//! `restart_policy="Never"`, `backoff_limit=0`, a 6 hour
//! `ttl_seconds_after_finished`, and the `pvs`/`pvcs`/`job-id` annotations
//! the watcher later reads back.

use jobcontroller_core::annotations;
use jobcontroller_core::model::{NodeAffinityRequest, ProvisionedResources, StorageBinding, Taint};
use k8s_openapi::api::batch::v1::Job;
use kube::api::PostParams;
use kube::{Api, Client};
use serde_json::{json, Value};

use crate::config::CreatorConfig;
use crate::error::ProvisioningError;
use crate::instrument_policy::TmpfsRequirement;
use crate::scheduling;

const TTL_SECONDS_AFTER_FINISHED: u32 = 6 * 60 * 60;
const UNBUFFERED_OUTPUT_ENV: &str = "UNBUFFERED_OUTPUT";

fn volume_mount_name(mount_path: &str) -> String {
    mount_path.trim_start_matches('/').replace('/', "-") + "-mount"
}

fn build_volumes_and_mounts(bindings: &[StorageBinding], tmpfs: Option<&TmpfsRequirement>) -> (Vec<Value>, Vec<Value>) {
    let mut volumes = Vec::new();
    let mut mounts = Vec::new();

    for binding in bindings {
        let name = volume_mount_name(&binding.mount_path);
        if binding.claim_name.is_empty() {
            volumes.push(json!({
                "name": name,
                "emptyDir": { "sizeLimit": "100Gi" }
            }));
        } else {
            volumes.push(json!({
                "name": name,
                "persistentVolumeClaim": {
                    "claimName": binding.claim_name,
                    "readOnly": binding.read_only
                }
            }));
        }
        mounts.push(json!({ "name": name, "mountPath": binding.mount_path }));
    }

    if let Some(tmpfs) = tmpfs {
        volumes.push(json!({
            "name": "dev-shm",
            "emptyDir": { "sizeLimit": format!("{}Gi", tmpfs.size_gib), "medium": "Memory" }
        }));
        mounts.push(json!({ "name": "dev-shm", "mountPath": "/dev/shm" }));
    }

    (volumes, mounts)
}

fn main_container(job_name: &str, image: &str, script: &str, mounts: &[Value]) -> Value {
    json!({
        "name": job_name,
        "image": image,
        "args": [script],
        "env": [{ "name": UNBUFFERED_OUTPUT_ENV, "value": "1" }],
        "volumeMounts": mounts,
    })
}

fn watcher_container(config: &CreatorConfig, job_name: &str) -> Value {
    json!({
        "name": "job-watcher",
        "image": config.watcher_image(),
        "env": [
            { "name": "API_HOST", "value": config.api_host },
            { "name": "API_KEY", "value": config.api_key },
            { "name": "MAX_JOB_DURATION", "value": config.max_job_duration_secs.to_string() },
            { "name": "CONTAINER_NAME", "value": job_name },
            { "name": "JOB_NAME", "value": job_name },
            { "name": "POD_NAME", "value": job_name },
        ],
    })
}

/// Everything the assembler needs beyond the storage bindings it already
/// provisioned.
pub struct WorkloadSpec<'a> {
    pub job_name: &'a str,
    pub script: &'a str,
    pub runner_image: &'a str,
    pub job_id: i64,
    pub taints: &'a [Taint],
    pub node_affinity: Option<&'a NodeAffinityRequest>,
    pub tmpfs: Option<&'a TmpfsRequirement>,
}

fn build_manifest(
    config: &CreatorConfig,
    spec: &WorkloadSpec,
    bindings: &[StorageBinding],
    resources: &ProvisionedResources,
) -> Value {
    let (volumes, mounts) = build_volumes_and_mounts(bindings, spec.tmpfs);
    let (pvs_annotation, pvcs_annotation) = annotations::encode_resources(resources);

    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": {
            "name": spec.job_name,
            "annotations": {
                "job-id": spec.job_id.to_string(),
                "pvs": pvs_annotation,
                "pvcs": pvcs_annotation,
                "kubectl.kubernetes.io/default-container": spec.job_name,
            },
        },
        "spec": {
            "backoffLimit": 0,
            "ttlSecondsAfterFinished": TTL_SECONDS_AFTER_FINISHED,
            "template": {
                "metadata": { "labels": scheduling::labels() },
                "spec": {
                    "affinity": scheduling::affinity(spec.node_affinity),
                    "serviceAccountName": "jobwatcher",
                    "restartPolicy": "Never",
                    "tolerations": scheduling::tolerations(spec.taints),
                    "volumes": volumes,
                    "containers": [
                        main_container(spec.job_name, spec.runner_image, spec.script, &mounts),
                        watcher_container(config, spec.job_name),
                    ],
                }
            }
        }
    })
}

/// Submits the workload for `spec`, backed by `bindings`/`resources` that
/// have already been provisioned and recorded in the workload's annotations.
pub async fn submit(
    client: &Client,
    config: &CreatorConfig,
    spec: &WorkloadSpec<'_>,
    bindings: &[StorageBinding],
    resources: &ProvisionedResources,
) -> Result<(), ProvisioningError> {
    let manifest = build_manifest(config, spec, bindings, resources);
    let job: Job = serde_json::from_value(manifest)
        .map_err(|source| ProvisioningError::ManifestBuild { resource: "Job", source })?;
    Api::<Job>::namespaced(client.clone(), &config.job_namespace)
        .create(&PostParams::default(), &job)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> CreatorConfig {
        CreatorConfig {
            dev_mode: false,
            default_runner_sha: "abc".to_string(),
            watcher_sha: "def".to_string(),
            api_host: "fia-api.example".to_string(),
            api_key: "secret".to_string(),
            queue_host: "mq".to_string(),
            queue_name: "queue".to_string(),
            queue_user: "user".to_string(),
            queue_password: "pass".to_string(),
            job_namespace: "fia".to_string(),
            archive_credentials_secret: "archive-creds".to_string(),
            shared_fs_share_id: "share".to_string(),
            shared_fs_access_id: "access".to_string(),
            max_job_duration_secs: 21600,
        }
    }

    fn sample_bindings() -> Vec<StorageBinding> {
        vec![StorageBinding {
            volume_name: "job-archive-pv-smb".to_string(),
            claim_name: "job-archive-pvc".to_string(),
            mount_path: "/archive".to_string(),
            read_only: true,
        }]
    }

    #[test]
    fn dev_mode_output_binding_becomes_empty_dir() {
        let bindings = vec![StorageBinding {
            volume_name: String::new(),
            claim_name: String::new(),
            mount_path: "/output".to_string(),
            read_only: false,
        }];
        let (volumes, _mounts) = build_volumes_and_mounts(&bindings, None);
        assert!(volumes[0]["emptyDir"]["sizeLimit"] == "100Gi");
        assert!(volumes[0].get("persistentVolumeClaim").is_none());
    }

    #[test]
    fn imat_tmpfs_is_sized_and_mounted_at_dev_shm() {
        let tmpfs = TmpfsRequirement { size_gib: 32 };
        let (volumes, mounts) = build_volumes_and_mounts(&sample_bindings(), Some(&tmpfs));
        let shm_volume = volumes.iter().find(|v| v["name"] == "dev-shm").unwrap();
        assert_eq!(shm_volume["emptyDir"]["sizeLimit"], "32Gi");
        assert_eq!(shm_volume["emptyDir"]["medium"], "Memory");
        assert!(mounts.iter().any(|m| m["mountPath"] == "/dev/shm"));
    }

    #[test]
    fn manifest_annotations_carry_exactly_the_provisioned_resources() {
        let config = sample_config();
        let resources = ProvisionedResources {
            volumes: vec!["job-archive-pv-smb".to_string()],
            claims: vec!["job-archive-pvc".to_string()],
        };
        let spec = WorkloadSpec {
            job_name: "run-run123-abc123",
            script: "print(1)",
            runner_image: "ghcr.io/fiaisis/mantid@sha256:abc",
            job_id: 42,
            taints: &[],
            node_affinity: None,
            tmpfs: None,
        };
        let manifest = build_manifest(&config, &spec, &sample_bindings(), &resources);
        let pvs = annotations::decode(manifest["metadata"]["annotations"]["pvs"].as_str().unwrap());
        let pvcs = annotations::decode(manifest["metadata"]["annotations"]["pvcs"].as_str().unwrap());
        assert_eq!(pvs, resources.volumes);
        assert_eq!(pvcs, resources.claims);
        assert_eq!(manifest["spec"]["backoffLimit"], 0);
        assert_eq!(manifest["spec"]["ttlSecondsAfterFinished"], TTL_SECONDS_AFTER_FINISHED);
    }
}
