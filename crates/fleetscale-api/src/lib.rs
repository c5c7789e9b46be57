//! fleetscale-api — HTTP surface of the fleet autoscaling webhook.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/health` | Liveness probe |
//! | POST | `/scale` | Evaluate a `FleetAutoscaleReview` |

pub mod handlers;
pub mod review;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fleetscale_core::PolicyConfig;

pub use review::{FleetAutoscaleRequest, FleetAutoscaleResponse, FleetAutoscaleReview};

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<PolicyConfig>,
}

/// Build the webhook router.
pub fn build_router(config: Arc<PolicyConfig>) -> Router {
    let state = ApiState { config };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/scale", post(handlers::scale))
        .with_state(state)
}
