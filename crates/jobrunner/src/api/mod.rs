use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::api::models::{ListQueuesResponse, QueueJobsResponse, QueueSummary};
use crate::jobs::runners::RunnerRegistry;

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub registry: RunnerRegistry,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Inspect
        .route("/queues", get(list_queues))
        .route("/queues/:name/jobs", get(queue_jobs))
        // Metrics
        .route("/metrics/prom", get(metrics_prom))
        // Health
        .route("/health", get(health))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

async fn summaries(registry: &RunnerRegistry) -> Vec<QueueSummary> {
    let mut items = Vec::new();
    for runner in registry.all() {
        items.push(runner.snapshot().await.into());
    }
    items
}

pub async fn list_queues(State(state): State<ApiState>) -> Json<ListQueuesResponse> {
    Json(ListQueuesResponse {
        items: summaries(&state.registry).await,
    })
}

pub async fn queue_jobs(Path(name): Path<String>, State(state): State<ApiState>) -> Response {
    let Some(runner) = state.registry.by_queue_name(&name) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ErrorBody {
                error: format!("unknown queue {name}"),
            }),
        )
            .into_response();
    };

    let queue = runner.snapshot().await.into();
    let items = runner.pending_jobs().await;
    (StatusCode::OK, Json(QueueJobsResponse { queue, items })).into_response()
}

pub async fn metrics_prom(State(state): State<ApiState>) -> Response {
    let items = summaries(&state.registry).await;

    let mut body = String::from(concat!(
        "# HELP jobrunner_pending_jobs Jobs held by the queue, including the running one\n",
        "# TYPE jobrunner_pending_jobs gauge\n",
    ));
    for q in &items {
        body.push_str(&format!(
            "jobrunner_pending_jobs{{queue=\"{}\"}} {}\n",
            q.queue_name, q.pending
        ));
    }
    body.push_str(concat!(
        "# HELP jobrunner_job_running Whether the queue is running a job\n",
        "# TYPE jobrunner_job_running gauge\n",
    ));
    for q in &items {
        body.push_str(&format!(
            "jobrunner_job_running{{queue=\"{}\"}} {}\n",
            q.queue_name,
            u8::from(q.current_job.is_some())
        ));
    }

    (StatusCode::OK, body).into_response()
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
