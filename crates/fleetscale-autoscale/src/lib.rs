//! fleetscale-autoscale — the fleet scaling decision engine.
//!
//! Classifies each poll into a [`ScalingMode`] and computes the target
//! replica count from it. Stateless: every call reads an immutable
//! [`PolicyConfig`](fleetscale_core::PolicyConfig) and a request-scoped
//! [`FleetState`](fleetscale_core::FleetState), so concurrent requests
//! need no coordination.
//!
//! # Scaling Algorithm
//!
//! ```text
//! if fixed override enabled and annotation present:
//!     target = annotation                      // rejects negatives
//! elif replicas == 0:
//!     no change
//! elif counter present and capacity > 0:
//!     base   = clamp(ceil(count / per_replica))
//!     target = clamp(ceil(base * scale_factor)) // headroom, optional
//! else:
//!     f = allocated / replicas
//!     if f > upper:                       target = min(ceil(replicas * factor), max)
//!     elif f < lower and replicas > min:  target = max(ceil(replicas / factor), min)
//!
//! if max > 0 and target > max:
//!     target = max, scale = true
//! ```
//!
//! Normalization of the policy keeps `lower < upper / scale_factor`, so a
//! fleet that just scaled up never qualifies for an immediate scale down.

pub mod scaler;

pub use scaler::{ScalingMode, classify, decide, evaluate};
