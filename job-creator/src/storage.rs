//! Builds and submits the per-job persistent volumes and claims: archive
//! (network share, read-only), extras (shared filesystem, read-only),
//! output (cluster filesystem or ephemeral scratch, read-write), and any
//! instrument-specific extras.
//!
//! Grounded in `job_creator.py`'s `_setup_smb_pv`/`_setup_pvc`/
//! `_setup_extras_pv`/`_setup_ceph_pv`: each volume is a CSI-backed
//! `PersistentVolume` plus a `PersistentVolumeClaim` binding to it either by
//! name (archive, output) or by a label selector (extras), built here via
//! `serde_json::json!` and typed through `k8s_openapi`, the same pattern
//! `benchmarks/src/context/worker.rs` uses for ad-hoc pod/service manifests.

use jobcontroller_core::model::{ProvisionedResources, StorageBinding};
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::PostParams;
use kube::{Api, Client};
use serde_json::json;

use crate::config::CreatorConfig;
use crate::error::ProvisioningError;
use crate::instrument_policy::InstrumentPolicy;
use crate::naming;

const STORAGE_CAPACITY: &str = "1000Gi";

async fn create_pv(client: &Client, manifest: serde_json::Value) -> Result<(), ProvisioningError> {
    let pv: PersistentVolume =
        serde_json::from_value(manifest).map_err(|source| ProvisioningError::ManifestBuild { resource: "PersistentVolume", source })?;
    Api::<PersistentVolume>::all(client.clone())
        .create(&PostParams::default(), &pv)
        .await?;
    Ok(())
}

async fn create_pvc(client: &Client, namespace: &str, manifest: serde_json::Value) -> Result<(), ProvisioningError> {
    let pvc: PersistentVolumeClaim = serde_json::from_value(manifest)
        .map_err(|source| ProvisioningError::ManifestBuild { resource: "PersistentVolumeClaim", source })?;
    Api::<PersistentVolumeClaim>::namespaced(client.clone(), namespace)
        .create(&PostParams::default(), &pvc)
        .await?;
    Ok(())
}

fn smb_pv_manifest(pv_name: &str, secret_name: &str, secret_namespace: &str, source: &str, mount_options: &[&str]) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": {
            "name": pv_name,
            "annotations": { "pv.kubernetes.io/provisioned-by": "smb.csi.k8s.io" }
        },
        "spec": {
            "capacity": { "storage": STORAGE_CAPACITY },
            "accessModes": ["ReadOnlyMany"],
            "persistentVolumeReclaimPolicy": "Retain",
            "mountOptions": mount_options,
            "csi": {
                "driver": "smb.csi.k8s.io",
                "readOnly": true,
                "volumeHandle": pv_name,
                "volumeAttributes": { "source": source },
                "nodeStageSecretRef": { "name": secret_name, "namespace": secret_namespace }
            }
        }
    })
}

fn pvc_by_name_manifest(pvc_name: &str, pv_name: &str, access_mode: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": { "name": pvc_name },
        "spec": {
            "accessModes": [access_mode],
            "resources": { "requests": { "storage": STORAGE_CAPACITY } },
            "volumeName": pv_name,
            "storageClassName": ""
        }
    })
}

fn pvc_by_label_manifest(pvc_name: &str, pv_name: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolumeClaim",
        "metadata": { "name": pvc_name },
        "spec": {
            "accessModes": ["ReadOnlyMany"],
            "resources": { "requests": { "storage": STORAGE_CAPACITY } },
            "selector": { "matchExpressions": [{ "key": "name", "operator": "In", "values": [pv_name] }] },
            "storageClassName": ""
        }
    })
}

fn cephfs_pv_manifest(pv_name: &str, secret_name: &str, secret_namespace: &str, cluster_id: &str, fs_name: &str, mount_path: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": pv_name },
        "spec": {
            "capacity": { "storage": STORAGE_CAPACITY },
            "storageClassName": "",
            "accessModes": ["ReadWriteMany"],
            "persistentVolumeReclaimPolicy": "Retain",
            "volumeMode": "Filesystem",
            "csi": {
                "driver": "cephfs.csi.ceph.com",
                "volumeHandle": pv_name,
                "nodeStageSecretRef": { "name": secret_name, "namespace": secret_namespace },
                "volumeAttributes": {
                    "clusterID": cluster_id,
                    "mounter": "fuse",
                    "fsName": fs_name,
                    "staticVolume": "true",
                    "rootPath": mount_path
                }
            }
        }
    })
}

fn manila_pv_manifest(pv_name: &str, secret_namespace: &str, share_id: &str, access_id: &str) -> serde_json::Value {
    json!({
        "apiVersion": "v1",
        "kind": "PersistentVolume",
        "metadata": { "name": pv_name, "labels": { "name": pv_name } },
        "spec": {
            "capacity": { "storage": STORAGE_CAPACITY },
            "accessModes": ["ReadOnlyMany"],
            "csi": {
                "driver": "cephfs.manila.csi.openstack.org",
                "readOnly": true,
                "volumeHandle": pv_name,
                "volumeAttributes": { "shareID": share_id, "shareAccessID": access_id },
                "nodeStageSecretRef": { "name": "manila-creds", "namespace": secret_namespace },
                "nodePublishSecretRef": { "name": "manila-creds", "namespace": secret_namespace }
            }
        }
    })
}

/// The result of provisioning every storage binding for one job: the mount
/// bindings the main container attaches, plus the exact set of names the
/// watcher must later delete.
pub struct ProvisionedStorage {
    pub bindings: Vec<StorageBinding>,
    pub resources: ProvisionedResources,
}

/// Provisions archive, extras, output, and (conditionally) instrument
/// volumes/claims for `job_name`, strictly before the workload that
/// references them is submitted.
pub async fn provision(
    client: &Client,
    config: &CreatorConfig,
    job_name: &str,
    instrument: &str,
    instrument_policy: &InstrumentPolicy,
) -> Result<ProvisionedStorage, ProvisioningError> {
    let mut resources = ProvisionedResources::default();
    let mut bindings = Vec::new();

    // Archive: network file share, read-only, claim bound by name.
    let archive_pv = naming::archive_pv_name(job_name);
    create_pv(
        client,
        smb_pv_manifest(
            &archive_pv,
            &config.archive_credentials_secret,
            &config.job_namespace,
            "//isisdatar55.isis.cclrc.ac.uk/inst$/",
            &["noserverino", "_netdev", "vers=2.1"],
        ),
    )
    .await?;
    resources.volumes.push(archive_pv.clone());

    let archive_pvc = naming::archive_pvc_name(job_name);
    create_pvc(client, &config.job_namespace, pvc_by_name_manifest(&archive_pvc, &archive_pv, "ReadOnlyMany")).await?;
    resources.claims.push(archive_pvc.clone());
    bindings.push(StorageBinding {
        volume_name: archive_pv,
        claim_name: archive_pvc,
        mount_path: "/archive".to_string(),
        read_only: true,
    });

    // Extras: shared filesystem, claim bound by label (late binding).
    let extras_pv = naming::extras_pv_name(job_name);
    create_pv(
        client,
        manila_pv_manifest(&extras_pv, &config.job_namespace, &config.shared_fs_share_id, &config.shared_fs_access_id),
    )
    .await?;
    resources.volumes.push(extras_pv.clone());

    let extras_pvc = naming::extras_pvc_name(job_name);
    create_pvc(client, &config.job_namespace, pvc_by_label_manifest(&extras_pvc, &extras_pv)).await?;
    resources.claims.push(extras_pvc.clone());
    bindings.push(StorageBinding {
        volume_name: extras_pv,
        claim_name: extras_pvc,
        mount_path: "/extras".to_string(),
        read_only: true,
    });

    // Output: ceph filesystem in production, ephemeral scratch in dev_mode.
    if !config.dev_mode {
        let output_pv = naming::output_pv_name(job_name);
        create_pv(
            client,
            cephfs_pv_manifest(
                &output_pv,
                "ceph-creds",
                &config.job_namespace,
                "ba68226a-672f-4ba5-97bc-22840318b2ec",
                "deneb",
                "/",
            ),
        )
        .await?;
        resources.volumes.push(output_pv.clone());

        let output_pvc = naming::output_pvc_name(job_name);
        create_pvc(client, &config.job_namespace, pvc_by_name_manifest(&output_pvc, &output_pv, "ReadWriteMany")).await?;
        resources.claims.push(output_pvc.clone());
        bindings.push(StorageBinding {
            volume_name: output_pv,
            claim_name: output_pvc,
            mount_path: "/output".to_string(),
            read_only: false,
        });
    } else {
        // No PV/PVC is provisioned; the output mount is an ephemeral
        // scratch region the workload builder attaches directly.
        bindings.push(StorageBinding {
            volume_name: String::new(),
            claim_name: String::new(),
            mount_path: "/output".to_string(),
            read_only: false,
        });
    }

    // Instrument-specific extras (e.g. imat's dedicated network share).
    if let Some(share) = &instrument_policy.network_share {
        let instrument_label = instrument.to_lowercase();
        let instrument_pv = naming::instrument_pv_name(job_name, &instrument_label);
        create_pv(
            client,
            smb_pv_manifest(&instrument_pv, share.secret_name, &config.job_namespace, share.source, &[]),
        )
        .await?;
        resources.volumes.push(instrument_pv.clone());

        let instrument_pvc = naming::instrument_pvc_name(job_name, &instrument_label);
        create_pvc(client, &config.job_namespace, pvc_by_name_manifest(&instrument_pvc, &instrument_pv, "ReadOnlyMany")).await?;
        resources.claims.push(instrument_pvc.clone());
        bindings.push(StorageBinding {
            volume_name: instrument_pv,
            claim_name: instrument_pvc,
            mount_path: format!("/{instrument_label}"),
            read_only: true,
        });
    }

    Ok(ProvisionedStorage { bindings, resources })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smb_manifest_is_read_only() {
        let manifest = smb_pv_manifest("job-archive-pv-smb", "archive-creds", "fia", "//host/share", &[]);
        assert_eq!(manifest["spec"]["csi"]["readOnly"], true);
    }

    #[test]
    fn label_selected_pvc_does_not_reference_pv_by_name() {
        let manifest = pvc_by_label_manifest("job-extras-pvc", "job-extras-pv");
        assert!(manifest["spec"].get("volumeName").is_none());
        assert_eq!(manifest["spec"]["selector"]["matchExpressions"][0]["values"][0], "job-extras-pv");
    }
}
