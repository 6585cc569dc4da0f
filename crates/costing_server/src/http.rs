//! HTTP routing for the resolver and chat endpoints.
//!
//! # Responsibility
//! - Map query/path parameters onto resolver calls and wrap results in the
//!   `{status, data}` envelope.
//! - Translate `ServiceError` into 404/400/500 without leaking store details.
//!
//! # Invariants
//! - Every resolver call runs on a blocking worker with its own read-only
//!   connection.
//! - Routes are served under `/api/v1/bfa` and at the root.

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use costing_core::db::open_db_read_only;
use costing_core::{
    core_version, HistoryService, PermissionService, PersonService, RepoError, SchemaProfile,
    ServiceError, ServiceResult, SqliteDirectoryRepository, SqliteProjectRepository,
    TaskDetailService, TaskSelector, TaskService,
};
use futures_util::StreamExt;
use log::{error, info};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::config::{ServerConfig, StartupError};
use crate::relay::ChatRelay;

pub const API_PREFIX: &str = "/api/v1/bfa";
const REQUEST_ID_HEADER: &str = "x-request-id";
const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

#[derive(Clone)]
pub struct AppState {
    db_path: Arc<PathBuf>,
    profile: Arc<SchemaProfile>,
    relay: Arc<ChatRelay>,
    system_prompt: Arc<str>,
}

impl AppState {
    /// Builds shared state after checking that the store can be opened and
    /// carries the tables the resolvers read.
    pub fn new(config: &ServerConfig, profile: SchemaProfile) -> Result<Self, StartupError> {
        verify_store(&config.db_path)?;
        Ok(Self {
            db_path: Arc::new(config.db_path.clone()),
            profile: Arc::new(profile),
            relay: Arc::new(ChatRelay::new(&config.llm)?),
            system_prompt: Arc::from(config.llm.system_prompt.as_str()),
        })
    }
}

fn verify_store(path: &std::path::Path) -> Result<(), StartupError> {
    let unavailable = |err: &dyn std::fmt::Display| StartupError {
        code: "ERR_STORE_UNAVAILABLE",
        message: format!("cannot read store at {}: {}", path.display(), err),
    };
    let conn = open_db_read_only(path).map_err(|err| unavailable(&err))?;
    SqliteProjectRepository::try_new(&conn).map_err(|err| unavailable(&err))?;
    SqliteDirectoryRepository::try_new(&conn).map_err(|err| unavailable(&err))?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/tasks", get(list_tasks))
        .route("/tasks/{task_id}", get(task_detail))
        .route(
            "/tasks/{task_id}/reference-projects",
            get(reference_projects),
        )
        .route("/history", get(history))
        .route("/persons", get(persons))
        .route("/departments/{department_id}/sheets", get(department_sheets))
        .route("/chat", post(chat));

    Router::new()
        .nest(API_PREFIX, api.clone())
        .merge(api)
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct SuccessBody<T> {
    status: &'static str,
    data: T,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    status: &'static str,
    message: String,
}

fn success<T: Serialize>(data: T) -> Json<SuccessBody<T>> {
    Json(SuccessBody {
        status: "success",
        data,
    })
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Internal,
}

impl From<ServiceError> for ApiError {
    fn from(value: ServiceError) -> Self {
        match value {
            ServiceError::NotFound(what) => Self::NotFound(format!("{what} not found")),
            ServiceError::Validation(message) => Self::BadRequest(message),
            ServiceError::Upstream(_) => Self::Internal,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR_MESSAGE.to_string(),
            ),
        };
        (
            status,
            Json(ErrorBody {
                status: "error",
                message,
            }),
        )
            .into_response()
    }
}

/// Runs `op` on a blocking worker against a fresh read-only connection.
async fn resolve<T, F>(state: &AppState, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection, Arc<SchemaProfile>) -> ServiceResult<T> + Send + 'static,
{
    let db_path = Arc::clone(&state.db_path);
    let profile = Arc::clone(&state.profile);
    let joined = tokio::task::spawn_blocking(move || {
        let conn = open_db_read_only(db_path.as_path())
            .map_err(|err| ServiceError::upstream("open_store", RepoError::from(err)))?;
        op(&conn, profile)
    })
    .await;

    match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(err) => {
            error!(
                "event=request_failed module=http status=error error_code=worker_join error={}",
                err
            );
            Err(ApiError::Internal)
        }
    }
}

fn project_repo(conn: &Connection) -> ServiceResult<SqliteProjectRepository<'_>> {
    SqliteProjectRepository::try_new(conn)
        .map_err(|err| ServiceError::upstream("open_project_repository", err))
}

fn directory_repo(conn: &Connection) -> ServiceResult<SqliteDirectoryRepository<'_>> {
    SqliteDirectoryRepository::try_new(conn)
        .map_err(|err| ServiceError::upstream("open_directory_repository", err))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    success(HealthResponse {
        version: core_version(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct TaskListQuery {
    person_id: Option<String>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<TaskListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = resolve(&state, move |conn, profile| {
        TaskService::new(project_repo(conn)?, profile).list_open_tasks(query.person_id.as_deref())
    })
    .await?;
    Ok(success(tasks))
}

#[derive(Debug, Default, Deserialize)]
struct TaskDetailQuery {
    person_id: Option<String>,
    department_id: Option<String>,
}

async fn task_detail(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<TaskDetailQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = resolve(&state, move |conn, profile| {
        let selector = TaskSelector {
            person_id: query.person_id.as_deref(),
            department_id: query.department_id.as_deref(),
        };
        TaskDetailService::new(project_repo(conn)?, directory_repo(conn)?, profile)
            .get_task_detail(&task_id, selector)
    })
    .await?;
    Ok(success(detail))
}

#[derive(Debug, Default, Deserialize)]
struct ReferenceQuery {
    department_id: Option<String>,
}

async fn reference_projects(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<ReferenceQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let references = resolve(&state, move |conn, profile| {
        HistoryService::new(project_repo(conn)?, profile).list_reference_projects(
            &task_id,
            query.department_id.as_deref().unwrap_or_default(),
        )
    })
    .await?;
    Ok(success(references))
}

async fn history(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let projects = resolve(&state, |conn, profile| {
        HistoryService::new(project_repo(conn)?, profile).list_history()
    })
    .await?;
    Ok(success(projects))
}

async fn persons(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let persons = resolve(&state, |conn, profile| {
        PersonService::new(directory_repo(conn)?, profile).list_persons()
    })
    .await?;
    Ok(success(persons))
}

async fn department_sheets(
    State(state): State<AppState>,
    Path(department_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let sheets = resolve(&state, move |conn, _profile| {
        PermissionService::new(directory_repo(conn)?).visible_sheets(&department_id)
    })
    .await?;
    Ok(success(sheets))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let message = match payload {
        Ok(Json(request)) if !request.message.trim().is_empty() => request.message,
        Ok(_) | Err(_) => {
            return Err(ApiError::BadRequest(
                "message is required and must be a string".to_string(),
            ))
        }
    };

    let chunks = state
        .relay
        .stream_completion(&message, &state.system_prompt)
        .map(Ok::<_, Infallible>);
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(chunks),
    )
        .into_response())
}

async fn log_request(request: Request, next: Next) -> Response {
    let started_at = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    info!(
        "event=http_request module=http status={} method={} path={} request_id={} duration_ms={}",
        response.status().as_u16(),
        method,
        path,
        request_id,
        started_at.elapsed().as_millis()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_errors_map_to_status_codes() {
        let status = |err: ServiceError| ApiError::from(err).into_response().status();

        assert_eq!(
            status(ServiceError::NotFound("task `9`".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(ServiceError::Validation("bad".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(ServiceError::Upstream(RepoError::MissingRequiredTable(
                "lis_project"
            ))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
