//! Builds the pod-level scheduling constraints: the universal soft
//! anti-affinity every job carries, an optional required node affinity, and
//! tolerations derived from taints.
//!
//! Grounded in `job_creator.py`'s `_generate_affinities` /
//! `_generate_tolerations_from_taints`.

use jobcontroller_core::model::{NodeAffinityRequest, Taint};
use serde_json::{json, Value};

const JOB_SOURCE_LABEL_KEY: &str = "job-source";
const JOB_SOURCE_LABEL_VALUE: &str = "automated-reduction";

/// Builds the `Affinity` manifest fragment: always includes the soft
/// anti-affinity that spreads automated-reduction pods across nodes, plus an
/// optional required node affinity when one is supplied.
pub fn affinity(node_affinity: Option<&NodeAffinityRequest>) -> Value {
    let pod_anti_affinity = json!({
        "preferredDuringSchedulingIgnoredDuringExecution": [{
            "weight": 100,
            "podAffinityTerm": {
                "topologyKey": "kubernetes.io/hostname",
                "labelSelector": {
                    "matchLabels": { JOB_SOURCE_LABEL_KEY: JOB_SOURCE_LABEL_VALUE }
                }
            }
        }]
    });

    match node_affinity {
        Some(required) => json!({
            "podAntiAffinity": pod_anti_affinity,
            "nodeAffinity": {
                "requiredDuringSchedulingIgnoredDuringExecution": {
                    "nodeSelectorTerms": [{
                        "matchExpressions": [{
                            "key": required.key,
                            "operator": required.operator,
                            "values": required.values
                        }]
                    }]
                }
            }
        }),
        None => json!({ "podAntiAffinity": pod_anti_affinity }),
    }
}

/// Builds the `Toleration` manifest fragments from a taint list.
pub fn tolerations(taints: &[Taint]) -> Vec<Value> {
    taints
        .iter()
        .map(|taint| {
            json!({
                "key": taint.key,
                "value": taint.value,
                "operator": taint.operator,
                "effect": taint.effect,
            })
        })
        .collect()
}

pub fn labels() -> Value {
    json!({ JOB_SOURCE_LABEL_KEY: JOB_SOURCE_LABEL_VALUE })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affinity_without_node_requirement_has_no_node_affinity_key() {
        let value = affinity(None);
        assert!(value.get("nodeAffinity").is_none());
        assert!(value["podAntiAffinity"]["preferredDuringSchedulingIgnoredDuringExecution"][0]["weight"] == 100);
    }

    #[test]
    fn affinity_with_node_requirement_is_required_not_preferred() {
        let required = NodeAffinityRequest {
            key: "node-type".to_string(),
            operator: "In".to_string(),
            values: vec!["gpu-worker".to_string()],
        };
        let value = affinity(Some(&required));
        assert!(value["nodeAffinity"]["requiredDuringSchedulingIgnoredDuringExecution"].is_object());
    }

    #[test]
    fn tolerations_map_one_to_one_with_taints() {
        let taints = vec![Taint {
            key: Some("gpu".to_string()),
            value: None,
            operator: Some("Exists".to_string()),
            effect: Some("NoSchedule".to_string()),
        }];
        let built = tolerations(&taints);
        assert_eq!(built.len(), 1);
        assert_eq!(built[0]["key"], "gpu");
    }
}
