//! Admission statistics.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use gantry_scheduler::StatsSnapshot;

use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

async fn stats(State(state): State<AppState>) -> Json<StatsSnapshot> {
    Json(state.admitter.stats())
}

#[cfg(test)]
mod tests {
    use crate::routes::tests::{TestApp, json_body};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_stats_and_readiness() {
        let app = TestApp::new(None);
        app.state.admitter.record_malformed();

        let response = app
            .router()
            .oneshot(Request::get("/api/v1/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["malformed"], 1);
        assert_eq!(body["queue_capacity"], 8);
        assert_eq!(body["queue_depth"], 0);

        let response = app
            .router()
            .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "ready");
    }
}
