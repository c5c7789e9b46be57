//! `FleetAutoscaleReview` wire types (`autoscaling.agones.dev/v1`).
//!
//! Only the fields the policy reads are typed. Everything else is kept in
//! `extra` maps so the request can be echoed back. The echo is equal as
//! JSON, not byte for byte: object keys come back sorted and an explicit
//! `null` for an optional field comes back omitted.

use std::collections::BTreeMap;

use fleetscale_core::{CapacityCounter, FleetState, PolicyConfig, ScaleDecision};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope posted by the orchestrator on every poll.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetAutoscaleReview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<FleetAutoscaleRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<FleetAutoscaleResponse>,
    /// `kind`, `apiVersion` and anything else outside request/response.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FleetAutoscaleRequest {
    /// Correlation id, copied into the response.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    pub status: FleetStatus,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FleetStatus {
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub allocated_replicas: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counters: Option<BTreeMap<String, CounterStatus>>,
    /// `readyReplicas`, `reservedReplicas`, `lists`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterStatus {
    #[serde(default)]
    pub count: i64,
    #[serde(default)]
    pub capacity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FleetAutoscaleResponse {
    pub uid: String,
    pub scale: bool,
    pub replicas: u32,
}

impl FleetAutoscaleRequest {
    /// Project the wire request onto the fields the policy reads.
    ///
    /// The fixed replicas annotation is looked up on the request first
    /// and on the fleet status second.
    pub fn fleet_state(&self, config: &PolicyConfig) -> FleetState {
        let key = config.fixed_replicas_annotation.as_str();
        let fixed_replicas = [self.annotations.as_ref(), self.status.annotations.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|annotations| annotations.get(key).cloned());

        let capacity = self
            .status
            .counters
            .as_ref()
            .and_then(|counters| counters.get(&config.capacity_counter))
            .map(|c| CapacityCounter {
                count: c.count,
                capacity: c.capacity,
            });

        FleetState {
            current_replicas: self.status.replicas,
            allocated_replicas: self.status.allocated_replicas,
            capacity,
            fixed_replicas,
        }
    }

    pub fn respond(&self, decision: ScaleDecision) -> FleetAutoscaleResponse {
        FleetAutoscaleResponse {
            uid: self.uid.clone(),
            scale: decision.scale,
            replicas: decision.replicas,
        }
    }
}
