//! Routes one decoded message to its job-type-specific handler and drives
//! that handler through digest resolution, storage provisioning, and
//! workload submission.
//!
//! Grounded in `main.py`'s `process_message`/`process_autoreduction_message`/
//! `process_rerun_message`/`process_simple_message`, restated against the
//! explicit `job_type` discriminator [`JobRequest`] carries instead of the
//! source's ambiguous key-sniffing.

use jobcontroller_core::digest;
use jobcontroller_core::model::{
    AutoreductionRequest, AutoreductionScriptRequest, JobRequest, RerunRequest, SimpleRequest,
};
use jobcontroller_core::script_api::ScriptApiClient;
use kube::Client;
use tracing::{error, info, warn};

use crate::config::CreatorConfig;
use crate::error::DispatchError;
use crate::instrument_policy::{self, InstrumentPolicy};
use crate::naming;
use crate::paths::{self, MountRoots};
use crate::storage;
use crate::workload::{self, WorkloadSpec};

pub struct Dispatcher {
    pub client: Client,
    pub config: CreatorConfig,
    pub script_api: ScriptApiClient,
    pub http: reqwest::Client,
    pub mount_roots: MountRoots,
}

impl Dispatcher {
    /// Processes one decoded message. Never returns an error the caller
    /// should treat as retryable: every failure here is logged with context
    /// and the message must still be acknowledged.
    pub async fn dispatch(&self, request: JobRequest) -> Result<(), DispatchError> {
        match request {
            JobRequest::Autoreduction(req) => self.dispatch_autoreduction(req).await,
            JobRequest::Rerun(req) => self.dispatch_rerun(req).await,
            JobRequest::Simple(req) => self.dispatch_simple(req).await,
        }
    }

    async fn dispatch_autoreduction(&self, req: AutoreductionRequest) -> Result<(), DispatchError> {
        let filename = naming::filename_stem(&req.filepath);
        let policy = instrument_policy::policy_for(&req.instrument);

        let runner_image = req.runner_image.clone().unwrap_or_else(|| {
            policy.default_runner_image.map(str::to_string).unwrap_or_else(|| {
                if !req.instrument.is_empty() {
                    warn!(instrument = %req.instrument, "no dedicated runner configured for instrument, using default");
                }
                self.config.default_runner_image()
            })
        });
        let resolved_image = digest::resolve_image_digest(&self.http, "ghcr.io", &runner_image).await;

        let script_request = AutoreductionScriptRequest {
            filename: filename.clone(),
            experiment_number: req.experiment_number.clone(),
            instrument: req.instrument.clone(),
            experiment_title: req.experiment_title.clone(),
            users: req.users.clone(),
            run_start: req.run_start.clone(),
            run_end: req.run_end.clone(),
            good_frames: req.good_frames,
            raw_frames: req.raw_frames,
            additional_values: req.additional_values.clone(),
            runner_image: resolved_image.clone(),
        };
        let response = self.script_api.post_autoreduction(&script_request).await?;

        // Best-effort: the main container's script is responsible for
        // writing under this path, the creator only ensures it exists.
        if let Err(error) = paths::autoreduction_output_path(&self.mount_roots, &req.instrument, &req.experiment_number) {
            warn!(%error, instrument = %req.instrument, "failed to ensure autoreduction output directory exists");
        }

        let job_name = naming::job_name_for_run(&filename);
        self.build_and_submit(
            &job_name,
            &req.instrument,
            response.job_id,
            &response.script,
            &resolved_image,
            &policy,
        )
        .await
    }

    async fn dispatch_rerun(&self, req: RerunRequest) -> Result<(), DispatchError> {
        let policy = instrument_policy::policy_for(&req.instrument);
        let resolved_image = digest::resolve_image_digest(&self.http, "ghcr.io", &req.runner_image).await;

        if let Err(error) = paths::autoreduction_output_path(&self.mount_roots, &req.instrument, &req.rb_number) {
            warn!(%error, instrument = %req.instrument, "failed to ensure rerun output directory exists");
        }

        let job_name = naming::job_name_for_run(&naming::filename_stem(&req.filename));
        self.build_and_submit(&job_name, &req.instrument, req.job_id, &req.script, &resolved_image, &policy)
            .await
    }

    async fn dispatch_simple(&self, req: SimpleRequest) -> Result<(), DispatchError> {
        let owner = req.owner()?;
        let resolved_image = digest::resolve_image_digest(&self.http, "ghcr.io", &req.runner_image).await;

        if let Err(error) = paths::simple_output_path(&self.mount_roots, &owner) {
            warn!(%error, owner_id = owner.id(), "failed to ensure simple output directory exists");
        }

        let job_name = naming::job_name_for_owner(owner.id());
        let policy = InstrumentPolicy::default();

        let manifest = storage::provision(&self.client, &self.config, &job_name, "", &policy).await?;
        let spec = WorkloadSpec {
            job_name: &job_name,
            script: &req.script,
            runner_image: &resolved_image,
            job_id: req.job_id,
            taints: &req.taints,
            node_affinity: req.affinity.as_ref(),
            tmpfs: policy.tmpfs.as_ref(),
        };
        workload::submit(&self.client, &self.config, &spec, &manifest.bindings, &manifest.resources).await?;
        info!(job_name, owner_id = owner.id(), "submitted simple workload");
        Ok(())
    }

    async fn build_and_submit(
        &self,
        job_name: &str,
        instrument: &str,
        job_id: i64,
        script: &str,
        runner_image: &str,
        policy: &InstrumentPolicy,
    ) -> Result<(), DispatchError> {
        let manifest = storage::provision(&self.client, &self.config, job_name, instrument, policy).await?;
        let spec = WorkloadSpec {
            job_name,
            script,
            runner_image,
            job_id,
            taints: &policy.scheduling.taints,
            node_affinity: policy.scheduling.node_affinity.as_ref(),
            tmpfs: policy.tmpfs.as_ref(),
        };
        workload::submit(&self.client, &self.config, &spec, &manifest.bindings, &manifest.resources).await?;
        info!(job_name, job_id, "submitted workload");
        Ok(())
    }
}

/// Logs `error` and swallows it. The only place a [`DispatchError`] is
/// allowed to disappear — called once the message has already been decoded
/// and is about to be acknowledged regardless of outcome.
pub fn log_and_drop(error: &DispatchError) {
    error!(%error, "failed to process job message, dropping it");
}
