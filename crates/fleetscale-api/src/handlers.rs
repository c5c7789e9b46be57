//! Webhook handlers.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

use crate::ApiState;
use crate::review::FleetAutoscaleReview;

/// Error body returned for rejected reviews.
#[derive(serde::Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: msg.to_string(),
        }),
    )
        .into_response()
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "Healthy")
}

/// POST /scale
///
/// Decodes the review, runs the policy, and echoes the review back with
/// `response` filled in.
pub async fn scale(State(state): State<ApiState>, body: Bytes) -> Response {
    let mut review: FleetAutoscaleReview = match serde_json::from_slice(&body) {
        Ok(review) => review,
        Err(e) => {
            warn!(error = %e, "malformed autoscale review");
            return error_response(&format!("malformed review: {e}"), StatusCode::BAD_REQUEST);
        }
    };

    let Some(request) = review.request.as_ref() else {
        warn!("autoscale review without a request");
        return error_response("review has no request", StatusCode::BAD_REQUEST);
    };

    let fleet = request.fleet_state(&state.config);
    let decision = match fleetscale_autoscale::decide(&fleet, &state.config) {
        Ok(decision) => decision,
        Err(e) => {
            warn!(uid = %request.uid, error = %e, "rejecting autoscale review");
            return error_response(&e.to_string(), StatusCode::BAD_REQUEST);
        }
    };

    info!(
        uid = %request.uid,
        fleet = request.name.as_deref().unwrap_or_default(),
        replicas = fleet.current_replicas,
        allocated = fleet.allocated_replicas,
        scale = decision.scale,
        target = decision.replicas,
        "autoscale review"
    );

    review.response = Some(request.respond(decision));
    (StatusCode::OK, Json(review)).into_response()
}
