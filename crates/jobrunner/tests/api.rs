mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{cfg, services, T0};
use http_body_util::BodyExt;
use jobrunner::api::{router, ApiState};
use jobrunner::jobs::bodies::{FakeOutcome, FakeSleepForJob, FakeSleepPayload};
use jobrunner::jobs::{MemoryQueueStore, RunnerRegistry};
use serde_json::Value;
use tower::ServiceExt;

async fn get(app: axum::Router, uri: &str) -> (StatusCode, String) {
    let res = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn registry_with_one_fake_job() -> RunnerRegistry {
    let services = services();
    let registry = RunnerRegistry::start(Arc::new(MemoryQueueStore::new()), services.clone(), cfg())
        .await
        .unwrap();
    let job = FakeSleepForJob::new(
        services,
        FakeSleepPayload::sleeping(0, FakeOutcome::Success),
        T0 + 3_600_000,
    );
    registry.add_job(Box::new(job)).await.unwrap();
    registry
}

#[tokio::test]
async fn health_and_queue_listing() {
    let registry = registry_with_one_fake_job().await;
    let app = router(ApiState {
        registry: registry.clone(),
    });

    let (status, body) = get(app.clone(), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "ok");

    let (status, body) = get(app, "/queues").await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    let items = v["items"].as_array().unwrap();
    assert_eq!(items.len(), 12);
    let fake = items
        .iter()
        .find(|q| q["queue_name"] == "jobRunner-FakeSleepForJobType")
        .unwrap();
    assert_eq!(fake["pending"], 1);
    assert_eq!(fake["state"], "scheduled");
    assert_eq!(fake["job_type"], "FakeSleepForJobType");

    registry.shutdown().await;
}

#[tokio::test]
async fn queue_jobs_and_metrics() {
    let registry = registry_with_one_fake_job().await;
    let app = router(ApiState {
        registry: registry.clone(),
    });

    let (status, body) = get(app.clone(), "/queues/jobRunner-FakeSleepForJobType/jobs").await;
    assert_eq!(status, StatusCode::OK);
    let v: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(v["items"][0]["jobType"], "FakeSleepForJobType");
    assert_eq!(v["items"][0]["payload"]["sleepDurationMs"], 0);

    let (status, _) = get(app.clone(), "/queues/jobRunner-Nope/jobs").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = get(app, "/metrics/prom").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("jobrunner_pending_jobs{queue=\"jobRunner-FakeSleepForJobType\"} 1"));
    assert!(body.contains("jobrunner_job_running{queue=\"jobRunner-UserSyncJobType\"} 0"));

    registry.shutdown().await;
}
