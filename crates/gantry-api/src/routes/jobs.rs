//! Job query and operator endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use gantry_core::{CommandLog, Job, JobId, JobStatus};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_jobs))
        .route("/search", get(search_jobs))
        .route("/commit/{sha}", get(get_job_by_commit))
        .route("/{id}", get(get_job))
        .route("/{id}/cancel", post(cancel_job))
}

pub fn repositories_router() -> Router<AppState> {
    Router::new().route("/jobs", get(list_for_branch))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RepositoryView {
    pub name: String,
    pub url: String,
}

/// A job as returned by the API, with its derived state spelled out.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobView {
    pub id: JobId,
    pub repository: RepositoryView,
    pub branch: String,
    pub commit: String,
    pub commit_url: String,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub tasks_started: Option<DateTime<Utc>>,
    pub tasks_finished: Option<DateTime<Utc>>,
    pub deploy_finished: Option<DateTime<Utc>>,
    pub cancelled: bool,
    pub status: JobStatus,
    pub running: bool,
    pub done: bool,
    pub url: String,
    pub command_logs: Vec<CommandLog>,
}

impl JobView {
    pub fn new(job: Job, server_url: &str) -> Self {
        Self {
            status: job.status(),
            running: job.is_running(),
            done: job.done(),
            url: job.url(server_url),
            id: job.id,
            repository: RepositoryView {
                name: job.repository.name,
                url: job.repository.url,
            },
            branch: job.branch,
            commit: job.commit,
            commit_url: job.commit_url,
            name: job.name,
            email: job.email,
            created_at: job.created_at,
            tasks_started: job.tasks_started,
            tasks_finished: job.tasks_finished,
            deploy_finished: job.deploy_finished,
            cancelled: job.cancelled,
            command_logs: job.command_logs,
        }
    }
}

fn views(jobs: Vec<Job>, server_url: &str) -> Vec<JobView> {
    jobs.into_iter()
        .map(|job| JobView::new(job, server_url))
        .collect()
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    offset: Option<i64>,
    limit: Option<i64>,
}

#[derive(Debug, Serialize)]
struct JobPage {
    jobs: Vec<JobView>,
    total: i64,
    offset: i64,
    limit: i64,
}

async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<JobPage>, ApiError> {
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::BadRequest("offset must not be negative".to_string()));
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let jobs = state.store.list_jobs(offset, limit).await?;
    let total = state.store.count_jobs().await?;

    Ok(Json(JobPage {
        jobs: views(jobs, &state.server_url),
        total,
        offset,
        limit,
    }))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

async fn search_jobs(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let query = query.q.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("search query is empty".to_string()));
    }
    let jobs = state.store.search_jobs(query).await?;
    Ok(Json(views(jobs, &state.server_url)))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.store.get_job(JobId::new(id)).await?;
    Ok(Json(JobView::new(job, &state.server_url)))
}

async fn get_job_by_commit(
    State(state): State<AppState>,
    Path(sha): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.store.get_job_by_commit(&sha).await?;
    Ok(Json(JobView::new(job, &state.server_url)))
}

#[derive(Debug, Deserialize)]
struct BranchQuery {
    url: String,
    branch: String,
}

async fn list_for_branch(
    State(state): State<AppState>,
    Query(query): Query<BranchQuery>,
) -> Result<Json<Vec<JobView>>, ApiError> {
    let jobs = state
        .store
        .list_for_branch(&query.url, &query.branch)
        .await?;
    Ok(Json(views(jobs, &state.server_url)))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<JobView>, ApiError> {
    let job = state.canceller.cancel(JobId::new(id)).await?;
    Ok(Json(JobView::new(job, &state.server_url)))
}
