//! Webhook regression tests.
//!
//! Drives the full router the daemon serves with Agones-shaped reviews and
//! checks the decisions that come back.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use fleetscale_api::build_router;
use fleetscale_core::PolicyConfig;
use serde_json::{Value, json};
use tower::ServiceExt;

fn router_with_env(vars: &[(&str, &str)]) -> Router {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let config = PolicyConfig::from_lookup(|k| vars.get(k).cloned()).unwrap();
    build_router(Arc::new(config))
}

fn review(status: Value) -> Value {
    json!({
        "kind": "FleetAutoscaleReview",
        "apiVersion": "autoscaling.agones.dev/v1",
        "request": {
            "uid": "8d3c5e0b-review",
            "name": "arena",
            "namespace": "default",
            "status": status
        }
    })
}

async fn post_scale(router: Router, body: Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri("/scale")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let resp = router.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn health_endpoint() {
    let router = router_with_env(&[]);
    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn utilization_scale_up() {
    let router = router_with_env(&[]);
    let (status, body) = post_scale(
        router,
        review(json!({ "replicas": 10, "readyReplicas": 2, "allocatedReplicas": 8 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["response"],
        json!({ "uid": "8d3c5e0b-review", "scale": true, "replicas": 20 })
    );
}

#[tokio::test]
async fn utilization_scale_down() {
    let router = router_with_env(&[("REPLICA_DOWNSCALE_TRIGGER", "0.3"), ("MIN_REPLICAS_COUNT", "2")]);
    let (_, body) = post_scale(
        router,
        review(json!({ "replicas": 10, "allocatedReplicas": 2 })),
    )
    .await;
    assert_eq!(body["response"]["scale"], true);
    assert_eq!(body["response"]["replicas"], 5);
}

#[tokio::test]
async fn utilization_scale_up_capped_by_max() {
    let router = router_with_env(&[("MAX_REPLICAS_COUNT", "6")]);
    let (_, body) = post_scale(
        router,
        review(json!({ "replicas": 4, "allocatedReplicas": 3 })),
    )
    .await;
    assert_eq!(body["response"]["scale"], true);
    assert_eq!(body["response"]["replicas"], 6);
}

#[tokio::test]
async fn negative_fixed_override_rejected() {
    let router = router_with_env(&[("FIXED_REPLICAS", "true")]);
    let mut body = review(json!({ "replicas": 4, "allocatedReplicas": 3 }));
    body["request"]["annotations"] = json!({ "fixedReplicas": "-1" });

    let (status, body) = post_scale(router, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.get("response").is_none());
}

#[tokio::test]
async fn fixed_override_takes_precedence() {
    let router = router_with_env(&[("FIXED_REPLICAS", "true")]);
    let mut body = review(json!({
        "replicas": 4,
        "allocatedReplicas": 4,
        "counters": { "rooms": { "count": 100, "capacity": 100 } }
    }));
    body["request"]["annotations"] = json!({ "fixedReplicas": "3" });

    let (status, body) = post_scale(router, body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["replicas"], 3);
    assert_eq!(body["response"]["scale"], true);
}

#[tokio::test]
async fn capacity_counter_at_target() {
    let router = router_with_env(&[("CAPACITY_HEADROOM", "false")]);
    let (_, body) = post_scale(
        router,
        review(json!({
            "replicas": 10,
            "allocatedReplicas": 9,
            "counters": { "rooms": { "count": 50, "capacity": 100 } }
        })),
    )
    .await;
    assert_eq!(body["response"]["scale"], false);
    assert_eq!(body["response"]["replicas"], 10);
}

#[tokio::test]
async fn zero_replicas_does_not_scale() {
    let router = router_with_env(&[]);
    let (status, body) = post_scale(
        router,
        review(json!({
            "replicas": 0,
            "allocatedReplicas": 0,
            "counters": { "rooms": { "count": 50, "capacity": 100 } }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["scale"], false);
    assert_eq!(body["response"]["replicas"], 0);
}

#[tokio::test]
async fn request_is_echoed_verbatim() {
    let router = router_with_env(&[]);
    let sent = review(json!({
        "replicas": 10,
        "readyReplicas": 5,
        "reservedReplicas": 0,
        "allocatedReplicas": 5,
        "lists": { "maps": { "capacity": 3, "values": ["dust"] } }
    }));
    let (_, body) = post_scale(router, sent.clone()).await;
    assert_eq!(body["request"], sent["request"]);
    assert_eq!(body["kind"], "FleetAutoscaleReview");
}

#[tokio::test]
async fn malformed_body_rejected() {
    let router = router_with_env(&[]);
    let req = Request::builder()
        .method("POST")
        .uri("/scale")
        .body(Body::from("replicas=10"))
        .unwrap();
    let resp = router.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn responses_never_exceed_max() {
    let router = router_with_env(&[("MAX_REPLICAS_COUNT", "9"), ("FIXED_REPLICAS", "true")]);
    let cases = [
        (json!({ "replicas": 8, "allocatedReplicas": 8 }), None),
        (json!({ "replicas": 3, "allocatedReplicas": 0, "counters": { "rooms": { "count": 400, "capacity": 500 } } }), None),
        (json!({ "replicas": 3, "allocatedReplicas": 0 }), Some("40")),
    ];

    for (status, fixed) in cases {
        let mut body = review(status);
        if let Some(fixed) = fixed {
            body["request"]["annotations"] = json!({ "fixedReplicas": fixed });
        }
        let (code, body) = post_scale(router.clone(), body).await;
        assert_eq!(code, StatusCode::OK);
        assert!(body["response"]["replicas"].as_u64().unwrap() <= 9);
    }
}

#[tokio::test]
async fn router_answers_match_engine() {
    let config = PolicyConfig::default();
    let router = build_router(Arc::new(config.clone()));
    let fleets = [(10, 8), (10, 2), (10, 5), (2, 0), (0, 0), (7, 7)];

    for (replicas, allocated) in fleets {
        let state = fleetscale_core::FleetState::new(replicas, allocated);
        let expected = fleetscale_autoscale::decide(&state, &config).unwrap();

        let (code, body) = post_scale(
            router.clone(),
            review(json!({ "replicas": replicas, "allocatedReplicas": allocated })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["response"]["scale"], expected.scale, "{replicas}/{allocated}");
        assert_eq!(body["response"]["replicas"], expected.replicas, "{replicas}/{allocated}");
    }
}
