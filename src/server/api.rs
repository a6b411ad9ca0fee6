use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use log::error;
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::database::csv_lines;
use crate::error::{IngestError, QueryError};
use crate::types::{ack_for, IngestOutcome};

pub const CSV_FILENAME: &str = "imu_data.csv";

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::NoData => StatusCode::NOT_FOUND,
            QueryError::Store(e) => {
                error!("Query failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn ingest_status(result: &Result<IngestOutcome, IngestError>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(IngestError::Invalid(_)) => StatusCode::BAD_REQUEST,
        Err(IngestError::Persistence(_)) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// 在阻塞线程池里执行，任务本身 panic 时返回 500
async fn run_blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("Blocking task failed: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal error" }))).into_response()
    })
}

pub async fn index_handler() -> &'static str {
    "IMU hub is running"
}

/// POST /api/imu
/// body: {"ax": number, "ay": number, "az": number}
pub async fn ingest_handler(State(state): State<AppState>, body: Bytes) -> Response {
    let arrival = Utc::now();
    let pipeline = Arc::clone(&state.pipeline);

    match run_blocking(move || pipeline.accept_bytes(&body, arrival)).await {
        Ok(result) => (ingest_status(&result), Json(ack_for(&result))).into_response(),
        Err(response) => response,
    }
}

pub async fn latest_handler(State(state): State<AppState>) -> Response {
    match state.query.latest() {
        Ok(sample) => Json(sample).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn alert_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "alert": state.query.alert() }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    limit: Option<usize>,
}

/// GET /api/history?limit=N，最新的在前
pub async fn history_handler(
    State(state): State<AppState>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> Response {
    let params = match params {
        Ok(Query(params)) => params,
        Err(rejection) => {
            return (rejection.status(), Json(json!({ "error": rejection.body_text() }))).into_response();
        }
    };
    let query = state.query.clone();

    match run_blocking(move || query.history(params.limit)).await {
        Ok(Ok(samples)) => Json(samples).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(response) => response,
    }
}

/// GET /api/csv，以附件形式流式输出全部记录
pub async fn csv_handler(State(state): State<AppState>) -> Response {
    let query = state.query.clone();

    let records = match run_blocking(move || query.records()).await {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => return e.into_response(),
        Err(response) => return response,
    };

    let lines = futures::stream::iter(csv_lines(records).map(Ok::<_, Infallible>));

    (
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename={}", CSV_FILENAME)),
        ],
        Body::from_stream(lines),
    )
        .into_response()
}

pub async fn stats_handler(State(state): State<AppState>) -> Response {
    let query = state.query.clone();

    match run_blocking(move || query.record_count()).await {
        Ok(Ok(records)) => Json(json!({
            "records": records,
            "subscribers": state.broadcaster.subscriber_count(),
        }))
        .into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(response) => response,
    }
}
