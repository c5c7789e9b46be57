//! Request-scoped domain types.
//!
//! Nothing here is persisted. A [`FleetState`] is built from each
//! inbound review, handed to the decision engine, and dropped together
//! with the [`ScaleDecision`] once the response is written.

use serde::{Deserialize, Serialize};

/// Aggregated occupancy counter summed across every replica in the fleet.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CapacityCounter {
    /// Occupied units (e.g. rooms in use).
    pub count: i64,
    /// Total units the fleet can host.
    pub capacity: i64,
}

/// Observed state of a fleet at the moment of a poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FleetState {
    /// Total replicas presently running.
    pub current_replicas: u32,
    /// Replicas currently serving a session.
    pub allocated_replicas: u32,
    /// The configured capacity counter, if the fleet reports it.
    pub capacity: Option<CapacityCounter>,
    /// Raw fixed-replicas annotation value, if the fleet carries one.
    pub fixed_replicas: Option<String>,
}

impl FleetState {
    /// A fleet with `current` replicas of which `allocated` are in use.
    pub fn new(current: u32, allocated: u32) -> Self {
        Self {
            current_replicas: current,
            allocated_replicas: allocated,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, count: i64, capacity: i64) -> Self {
        self.capacity = Some(CapacityCounter { count, capacity });
        self
    }

    pub fn with_fixed_replicas(mut self, value: impl Into<String>) -> Self {
        self.fixed_replicas = Some(value.into());
        self
    }
}

/// Outcome of a single scaling evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScaleDecision {
    /// Whether the orchestrator should act.
    pub scale: bool,
    /// Target replica count.
    pub replicas: u32,
}

impl ScaleDecision {
    /// Keep the fleet at its current size.
    pub fn no_change(current: u32) -> Self {
        Self {
            scale: false,
            replicas: current,
        }
    }

    /// Move the fleet to `replicas`.
    pub fn scale_to(replicas: u32) -> Self {
        Self {
            scale: true,
            replicas,
        }
    }
}
