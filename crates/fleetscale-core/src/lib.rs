//! fleetscale-core — shared types for the fleet autoscaling webhook.
//!
//! Holds the immutable [`PolicyConfig`] built once at startup, the
//! request-scoped [`FleetState`] the decision engine reads, the
//! [`ScaleDecision`] it produces, and the error taxonomy shared by the
//! engine and the transport.

pub mod config;
pub mod error;
pub mod types;

pub use config::{CapacitySizing, PolicyConfig};
pub use error::{ConfigError, ConfigResult, PolicyError, PolicyResult};
pub use types::*;
