use axum::{Json, Router, routing::get};
use chrono::Utc;
use serde_json::json;

pub struct HealthController;

impl HealthController {
    pub fn app() -> Router {
        Router::new().route("/health", get(Self::health))
    }

    // nothing to probe beyond the process itself, upstream reachability is
    // not this proxy's liveness
    async fn health() -> Json<serde_json::Value> {
        Json(json!({
            "status": "ok",
            "timestamp": Utc::now().timestamp(),
        }))
    }
}
