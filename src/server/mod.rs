pub mod api;
pub mod ws;

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use log::info;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::broadcast::Broadcaster;
use crate::ingest::IngestPipeline;
use crate::query::QueryService;

/// Shared by every HTTP and websocket handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<IngestPipeline>,
    pub query: QueryService,
    pub broadcaster: Arc<Broadcaster>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::index_handler))
        .route("/api/imu", post(api::ingest_handler))
        .route("/api/latest", get(api::latest_handler))
        .route("/api/history", get(api::history_handler))
        .route("/api/alert", get(api::alert_handler))
        .route("/api/csv", get(api::csv_handler))
        .route("/api/stats", get(api::stats_handler))
        .route("/ws", get(ws::ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server<F>(addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::database::SampleStore;
    use crate::ingest::pipeline::tests::MemoryStore;
    use crate::ingest::{AlertEvaluator, LatestCache, RateGate};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    pub(crate) fn test_state(min_interval: Duration) -> (AppState, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let cache = Arc::new(LatestCache::new());
        let broadcaster = Arc::new(Broadcaster::new(8));
        let evaluator = AlertEvaluator::new(15.0);

        let pipeline = Arc::new(IngestPipeline::new(
            store.clone(),
            Arc::clone(&cache),
            Arc::clone(&broadcaster),
            evaluator,
            RateGate::new(min_interval),
        ));
        let query = QueryService::new(store.clone(), cache, evaluator, 500);

        (AppState { pipeline, query, broadcaster }, store)
    }

    fn test_app(min_interval: Duration) -> (Router, Arc<MemoryStore>) {
        let (state, store) = test_state(min_interval);
        (router(state), store)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_imu(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/imu")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_body(body: &str) -> Value {
        serde_json::from_str(body).unwrap()
    }

    #[tokio::test]
    async fn ingest_then_query() {
        let (app, _) = test_app(Duration::from_secs(60));

        let (status, body) = send(&app, get("/api/latest")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(&body), json!({"error": "no data yet"}));

        let (status, body) = send(&app, post_imu(r#"{"ax":0,"ay":0,"az":20}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"status": "ok", "alert": true}));

        // 60 秒窗口内的第二条一定被丢弃
        let (status, body) = send(&app, post_imu(r#"{"ax":1,"ay":1,"az":1}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(&body), json!({"status": "skipped"}));

        let (_, body) = send(&app, get("/api/latest")).await;
        let latest = json_body(&body);
        assert_eq!(latest["magnitude"], json!(20.0));
        assert!(latest["timestamp"].is_string());

        let (_, body) = send(&app, get("/api/alert")).await;
        assert_eq!(json_body(&body), json!({"alert": true}));

        let (_, body) = send(&app, get("/api/stats")).await;
        assert_eq!(json_body(&body), json!({"records": 1, "subscribers": 0}));
    }

    #[tokio::test]
    async fn malformed_ingest_is_bad_request() {
        let (app, store) = test_app(Duration::ZERO);

        for payload in [r#"{"ax":"abc"}"#, "not json", "[1,2,3]"] {
            let (status, body) = send(&app, post_imu(payload)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", payload);
            assert_eq!(json_body(&body)["status"], "error");
        }
        assert_eq!(store.count().unwrap(), 0);

        let (_, body) = send(&app, get("/api/alert")).await;
        assert_eq!(json_body(&body), json!({"alert": false}));
    }

    #[tokio::test]
    async fn history_is_newest_first_and_limited() {
        let (app, _) = test_app(Duration::ZERO);
        for ax in 1..=3 {
            let (status, _) = send(&app, post_imu(&format!(r#"{{"ax":{}}}"#, ax))).await;
            assert_eq!(status, StatusCode::OK);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let (status, body) = send(&app, get("/api/history")).await;
        assert_eq!(status, StatusCode::OK);
        let axes: Vec<f64> = json_body(&body)
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["ax"].as_f64().unwrap())
            .collect();
        assert_eq!(axes, vec![3.0, 2.0, 1.0]);

        let (_, body) = send(&app, get("/api/history?limit=1")).await;
        assert_eq!(json_body(&body).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn csv_export_is_an_attachment() {
        let (app, _) = test_app(Duration::ZERO);

        let response = app.clone().oneshot(get("/api/csv")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=imu_data.csv"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"ax,ay,az,magnitude,timestamp\n");

        send(&app, post_imu(r#"{"ax":3,"ay":4}"#)).await;
        tokio::time::sleep(Duration::from_millis(2)).await;
        send(&app, post_imu(r#"{"az":1}"#)).await;

        let (_, body) = send(&app, get("/api/csv")).await;
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("3,4,0,5,"));
        assert!(lines[2].starts_with("0,0,1,1,"));
    }

    #[tokio::test]
    async fn huge_axis_keeps_numeric_magnitude() {
        let (app, _) = test_app(Duration::ZERO);

        let (status, _) = send(&app, post_imu(r#"{"ax":1e200,"ay":0,"az":0}"#)).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, get("/api/latest")).await;
        assert_eq!(json_body(&body)["magnitude"], json!(1e200));

        let (status, body) = send(&app, post_imu(r#"{"ax":1.7e308,"ay":1.7e308}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(&body)["status"], "error");
    }

    #[tokio::test]
    async fn bad_history_limit_is_json_error() {
        let (app, _) = test_app(Duration::ZERO);

        for uri in ["/api/history?limit=abc", "/api/history?limit=-1"] {
            let (status, body) = send(&app, get(uri)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert!(json_body(&body)["error"].is_string(), "{}", body);
        }
    }
}
