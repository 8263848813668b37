//! Deletes the persistent volumes and claims a job's annotations recorded,
//! once the job has reached a terminal state or stalled out.
//!
//! Grounded in `job_watcher.py`'s `clean_up_pvs_for_job`/`clean_up_pvcs_for_job`:
//! best-effort, one delete call per name, logged and continued on individual
//! failure rather than aborting the whole cleanup.

use jobcontroller_core::annotations;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::DeleteParams;
use kube::{Api, Client};
use tracing::{info, warn};

/// Deletes every claim named in the `pvcs` annotation, then every volume
/// named in the `pvs` annotation. Order matters: a claim must be gone before
/// its volume can be released by most CSI drivers.
pub async fn clean_up_job(client: &Client, namespace: &str, pvs_annotation: &str, pvcs_annotation: &str) {
    let claims = annotations::decode(pvcs_annotation);
    info!(?claims, "deleting pvcs");
    let pvc_api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), namespace);
    for claim_name in &claims {
        match pvc_api.delete(claim_name, &DeleteParams::default()).await {
            Ok(_) => info!(claim_name, "deleted pvc"),
            Err(error) => warn!(claim_name, %error, "failed to delete pvc"),
        }
    }

    let volumes = annotations::decode(pvs_annotation);
    info!(?volumes, "deleting pvs");
    let pv_api: Api<PersistentVolume> = Api::all(client.clone());
    for volume_name in &volumes {
        match pv_api.delete(volume_name, &DeleteParams::default()).await {
            Ok(_) => info!(volume_name, "deleted pv"),
            Err(error) => warn!(volume_name, %error, "failed to delete pv"),
        }
    }
}
