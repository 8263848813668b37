//! Per-instrument policy: which runner image to default to, and which extra
//! storage/scheduling an instrument's workloads need.
//!
//! Grounded in `job_creator.py`'s `_setup_imat_pv_and_pvcs` (a hard-coded
//! special case for `imat`) generalised into a lookup table so other
//! instruments can be added without touching the assembly code.

use jobcontroller_core::model::{NodeAffinityRequest, Taint};

/// An in-memory scratch volume an instrument's main container needs beyond
/// the standard storage bindings (e.g. large-image instruments that load
/// whole datasets into `/dev/shm`).
#[derive(Debug, Clone)]
pub struct TmpfsRequirement {
    pub size_gib: u32,
}

/// An instrument's dedicated network share, attached read-only alongside the
/// standard archive/extras/output bindings.
#[derive(Debug, Clone)]
pub struct NetworkShare {
    pub secret_name: &'static str,
    pub source: &'static str,
}

/// Extra scheduling constraints applied to an instrument's workloads on top
/// of the universal anti-affinity, independent of anything a `simple`
/// message might separately request.
#[derive(Debug, Clone, Default)]
pub struct InstrumentScheduling {
    pub taints: Vec<Taint>,
    pub node_affinity: Option<NodeAffinityRequest>,
}

#[derive(Debug, Clone)]
pub struct InstrumentPolicy {
    pub default_runner_image: Option<&'static str>,
    pub network_share: Option<NetworkShare>,
    pub tmpfs: Option<TmpfsRequirement>,
    pub scheduling: InstrumentScheduling,
}

impl Default for InstrumentPolicy {
    fn default() -> Self {
        InstrumentPolicy {
            default_runner_image: None,
            network_share: None,
            tmpfs: None,
            scheduling: InstrumentScheduling::default(),
        }
    }
}

/// Looks up the policy for `instrument` (case-insensitive), falling back to
/// a policy with no extras and no default runner override.
pub fn policy_for(instrument: &str) -> InstrumentPolicy {
    match instrument.to_lowercase().as_str() {
        "imat" => InstrumentPolicy {
            default_runner_image: Some("ghcr.io/fiaisis/mantidimaging:latest"),
            network_share: Some(NetworkShare {
                secret_name: "imat-creds",
                source: "//NDXIMAT.isis.cclrc.ac.uk/data$/",
            }),
            tmpfs: Some(TmpfsRequirement { size_gib: 32 }),
            scheduling: InstrumentScheduling {
                taints: vec![Taint {
                    key: Some("gpu".to_string()),
                    value: None,
                    operator: Some("Exists".to_string()),
                    effect: Some("NoSchedule".to_string()),
                }],
                node_affinity: Some(NodeAffinityRequest {
                    key: "node-type".to_string(),
                    operator: "In".to_string(),
                    values: vec!["gpu-worker".to_string()],
                }),
            },
        },
        _ => InstrumentPolicy::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_instrument_has_no_extras() {
        let policy = policy_for("mari");
        assert!(policy.network_share.is_none());
        assert!(policy.tmpfs.is_none());
        assert!(policy.scheduling.taints.is_empty());
    }

    #[test]
    fn imat_gets_network_share_and_tmpfs_and_gpu_scheduling() {
        let policy = policy_for("IMAT");
        assert!(policy.network_share.is_some());
        assert_eq!(policy.tmpfs.unwrap().size_gib, 32);
        assert!(policy.scheduling.node_affinity.is_some());
        assert_eq!(policy.scheduling.taints.len(), 1);
    }
}
