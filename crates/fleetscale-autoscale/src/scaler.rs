//! Scaling decision engine.
//!
//! Each poll is classified into exactly one [`ScalingMode`] and then
//! evaluated. Classification and evaluation are both pure: nothing is
//! cached between calls and the policy is only ever read.

use fleetscale_core::{FleetState, PolicyConfig, PolicyError, PolicyResult, ScaleDecision};
use tracing::debug;

/// The signal a decision is driven by, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingMode {
    /// Operator-pinned replica count.
    FixedOverride { target: u32 },
    /// Aggregated occupancy counter with non-zero capacity.
    CapacityCounter { count: i64, capacity: i64 },
    /// Allocated/total replica fraction.
    UtilizationThreshold { allocated: u32, current: u32 },
    /// Nothing safe to compute from (zero replicas).
    NoSignal,
}

impl ScalingMode {
    pub fn name(&self) -> &'static str {
        match self {
            ScalingMode::FixedOverride { .. } => "fixed_override",
            ScalingMode::CapacityCounter { .. } => "capacity_counter",
            ScalingMode::UtilizationThreshold { .. } => "utilization_threshold",
            ScalingMode::NoSignal => "no_signal",
        }
    }
}

/// Pick the mode that governs this poll.
///
/// Fails only when the fixed override applies and its annotation is not
/// a non-negative integer.
pub fn classify(state: &FleetState, config: &PolicyConfig) -> PolicyResult<ScalingMode> {
    if config.fixed_override_enabled
        && let Some(raw) = &state.fixed_replicas
    {
        let target = parse_fixed_replicas(raw)?;
        return Ok(ScalingMode::FixedOverride { target });
    }

    let current = state.current_replicas;
    if current == 0 {
        return Ok(ScalingMode::NoSignal);
    }

    if let Some(counter) = state.capacity
        && counter.capacity > 0
    {
        return Ok(ScalingMode::CapacityCounter {
            count: counter.count,
            capacity: counter.capacity,
        });
    }

    Ok(ScalingMode::UtilizationThreshold {
        allocated: state.allocated_replicas,
        current,
    })
}

/// Compute the scaling decision for one poll.
pub fn decide(state: &FleetState, config: &PolicyConfig) -> PolicyResult<ScaleDecision> {
    let mode = classify(state, config)?;
    let decision = evaluate(mode, state.current_replicas, config);

    debug!(
        mode = mode.name(),
        from = state.current_replicas,
        to = decision.replicas,
        scale = decision.scale,
        "scaling decision"
    );

    Ok(decision)
}

/// Evaluate a classified poll, including the final max clamp.
pub fn evaluate(mode: ScalingMode, current: u32, config: &PolicyConfig) -> ScaleDecision {
    let decision = match mode {
        ScalingMode::FixedOverride { target } => ScaleDecision {
            scale: target != current,
            replicas: target,
        },
        ScalingMode::CapacityCounter { count, capacity } => {
            capacity_decision(count, capacity, current, config)
        }
        ScalingMode::UtilizationThreshold { allocated, current } => {
            threshold_decision(allocated, current, config)
        }
        ScalingMode::NoSignal => ScaleDecision::no_change(current),
    };

    match config.max_bound() {
        Some(max) if decision.replicas > max => ScaleDecision::scale_to(max),
        _ => decision,
    }
}

fn capacity_decision(count: i64, capacity: i64, current: u32, config: &PolicyConfig) -> ScaleDecision {
    let per_replica = config.capacity_per_replica.per_replica(capacity, current);
    let base = clamp_replicas((count as f64 / per_replica).ceil(), config);

    let target = if config.capacity_headroom {
        clamp_replicas((base as f64 * config.scale_factor).ceil(), config)
    } else {
        base
    };

    debug!(
        count,
        capacity,
        per_replica,
        base,
        target,
        current,
        min = config.min_replicas,
        max = config.max_replicas,
        "capacity sizing"
    );

    if target != current {
        ScaleDecision::scale_to(target)
    } else {
        ScaleDecision::no_change(current)
    }
}

fn threshold_decision(allocated: u32, current: u32, config: &PolicyConfig) -> ScaleDecision {
    let fraction = allocated as f64 / current as f64;

    if fraction > config.upper_threshold {
        // The new fleet sees fraction / scale_factor, which normalization
        // keeps at or above the downscale trigger.
        let mut target = to_replicas((current as f64 * config.scale_factor).ceil());
        if let Some(max) = config.max_bound() {
            target = target.min(max);
        }
        return ScaleDecision::scale_to(target);
    }

    if fraction < config.lower_threshold && current > config.min_replicas {
        let target = to_replicas((current as f64 / config.scale_factor).ceil()).max(config.min_replicas);
        return ScaleDecision::scale_to(target);
    }

    ScaleDecision::no_change(current)
}

/// Clamp a raw ceiling into `[min_replicas, max_replicas or +inf]`.
fn clamp_replicas(raw: f64, config: &PolicyConfig) -> u32 {
    let mut n = to_replicas(raw).max(config.min_replicas);
    if let Some(max) = config.max_bound() {
        n = n.min(max);
    }
    n
}

/// Saturating f64 to replica count conversion; negatives and NaN map to 0.
fn to_replicas(raw: f64) -> u32 {
    raw as u32
}

fn parse_fixed_replicas(raw: &str) -> PolicyResult<u32> {
    let invalid = |reason: &str| PolicyError::InvalidFixedReplicas {
        value: raw.to_string(),
        reason: reason.to_string(),
    };

    let n: i64 = raw.parse().map_err(|_| invalid("must be an integer"))?;
    if n < 0 {
        return Err(invalid("must be >= 0"));
    }
    u32::try_from(n).map_err(|_| invalid("exceeds the maximum replica count"))
}
