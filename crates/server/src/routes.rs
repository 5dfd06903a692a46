//! HTTP surface for job orchestration.
//!
//! Creation returns 202 with the job id as soon as the task is enqueued;
//! clients poll `GET /api/jobs/{id}` or subscribe to the job's progress
//! channel for updates.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use taleforge_common::AppResult;
use taleforge_core::{CreateJobRequest, Job, JobService, JobStatus};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Job orchestration operations.
    pub jobs: Arc<JobService>,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/jobs", post(create_job).get(list_active_jobs))
        .route("/api/jobs/{id}", get(get_job))
        .route("/api/jobs/{id}/cancel", post(cancel_job))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct CreatedResponse {
    job_id: String,
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    owner_id: String,
}

async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> AppResult<(StatusCode, Json<CreatedResponse>)> {
    let job = state.jobs.create_job(request).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(CreatedResponse {
            job_id: job.id,
            status: job.status,
        }),
    ))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Job>> {
    let job = state.jobs.get_job(&id).await?;
    Ok(Json(job))
}

async fn list_active_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<Vec<Job>>> {
    let jobs = state.jobs.list_active_jobs(&query.owner_id).await?;
    Ok(Json(jobs))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Job>> {
    let job = state.jobs.cancel_job(&id).await?;
    Ok(Json(job))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use taleforge_core::{InMemoryJobStore, TaskDispatch};
    use tower::ServiceExt;

    use super::*;

    struct NoopDispatcher;

    #[async_trait]
    impl TaskDispatch for NoopDispatcher {
        async fn dispatch(&self, job: &Job) -> AppResult<String> {
            Ok(format!("task-for-{}", job.id))
        }
    }

    fn test_router() -> Router {
        let service = JobService::new(Arc::new(InMemoryJobStore::new()), Arc::new(NoopDispatcher));
        router(AppState {
            jobs: Arc::new(service),
        })
    }

    async fn body_json(body: Body) -> serde_json::Value {
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn create_request(body: &str) -> Request<Body> {
        Request::builder()
            .uri("/api/jobs")
            .method("POST")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_job_returns_accepted() {
        let app = test_router();

        let response = app
            .oneshot(create_request(
                r#"{"owner_id":"user-1","job_type":"full_content_generation","input":{"theme":"dragons"}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response.into_body()).await;
        assert_eq!(json["status"], "QUEUED");
        assert!(json["job_id"].as_str().unwrap().len() == 26);
    }

    #[tokio::test]
    async fn test_create_job_rejects_empty_theme() {
        let app = test_router();

        let response = app
            .oneshot(create_request(
                r#"{"owner_id":"user-1","job_type":"full_content_generation","input":{"theme":""}}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_unknown_job_returns_404() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/jobs/does-not-exist")
                    .method("GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_then_get_and_list() {
        let app = test_router();

        let response = app
            .clone()
            .oneshot(create_request(
                r#"{"owner_id":"user-1","job_type":"full_content_generation","input":{"theme":"dragons"}}"#,
            ))
            .await
            .unwrap();
        let created = body_json(response.into_body()).await;
        let job_id = created["job_id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/api/jobs/{job_id}"))
                    .method("GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let job = body_json(response.into_body()).await;
        assert_eq!(job["status"], "QUEUED");
        assert_eq!(job["progress_percent"], 0);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/jobs?owner_id=user-1")
                    .method("GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let list = body_json(response.into_body()).await;
        assert_eq!(list.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let app = test_router();

        let response = app
            .clone()
            .oneshot(create_request(
                r#"{"owner_id":"user-1","job_type":"full_content_generation","input":{"theme":"dragons"}}"#,
            ))
            .await
            .unwrap();
        let created = body_json(response.into_body()).await;
        let job_id = created["job_id"].as_str().unwrap().to_string();

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/jobs/{job_id}/cancel"))
                        .method("POST")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            let job = body_json(response.into_body()).await;
            assert_eq!(job["status"], "CANCELLED");
        }
    }
}
