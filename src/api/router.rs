//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{OriginalUri, Path, Query, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, warn};

use super::response::{ApiError, ApiResponse, json_api_envelope, page_not_found};
use crate::cache::ReadThroughCache;
use crate::config::Environment;
use crate::lms::{LmsClient, LmsCollection};
use crate::todo::{NewTodo, TodoPatch, TodoStore};

/// Shared application state
pub struct AppState {
    /// Read-through cache for LMS payloads
    pub cache: Arc<ReadThroughCache>,
    /// LMS API client
    pub lms: Arc<LmsClient>,
    /// Todo collection
    pub todos: Arc<TodoStore>,
    /// Deployment environment
    pub environment: Environment,
}

type HandlerResult = Result<ApiResponse, ApiError>;

/// Create the router
pub fn create_router(state: Arc<AppState>) -> Router {
    let lms_routes = Router::new()
        .route("/users", get(lms_users_handler))
        .route("/courses", get(lms_courses_handler))
        .route_layer(middleware::from_fn(json_api_envelope));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/todos", get(list_todos_handler).post(create_todo_handler))
        .route(
            "/api/todo/{id}",
            get(get_todo_handler)
                .put(update_todo_handler)
                .delete(delete_todo_handler),
        )
        .nest("/api/lms", lms_routes)
        .fallback(fallback_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "cache": state.cache.stats(),
            "todos": state.todos.len(),
        })),
    )
}

/// Unknown routes
async fn fallback_handler(OriginalUri(uri): OriginalUri) -> Response {
    warn!(path = %uri.path(), "Page not found");
    page_not_found()
}

/// Todo ids are positive integers; anything else is an unknown URL
fn parse_todo_id(raw: &str) -> Option<u64> {
    raw.parse::<u64>().ok()
}

/// GET /api/todo/{id}
async fn get_todo_handler(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(id) = parse_todo_id(&raw_id) else {
        return Ok(page_not_found());
    };
    debug!(id, "Fetching todo item");

    let todo = state.todos.get(id)?;
    Ok(ApiResponse::json(&todo)?.into_response())
}

/// PUT /api/todo/{id}
async fn update_todo_handler(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let Some(id) = parse_todo_id(&raw_id) else {
        return Ok(page_not_found());
    };
    let patch = TodoPatch::from_json(&body)?;
    debug!(id, ?patch, "Updating todo item");

    let todo = state.todos.update(id, patch)?;
    Ok(ApiResponse::json(&todo)?.into_response())
}

/// DELETE /api/todo/{id}
async fn delete_todo_handler(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let Some(id) = parse_todo_id(&raw_id) else {
        return Ok(page_not_found());
    };
    debug!(id, "Deleting todo item");

    state.todos.delete(id)?;
    Ok(ApiResponse::no_content().into_response())
}

/// Query parameters of GET /api/todos
#[derive(Debug, Deserialize)]
struct ListTodosParams {
    /// Filter by status
    completed: Option<bool>,
}

/// GET /api/todos
async fn list_todos_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListTodosParams>,
) -> HandlerResult {
    debug!(completed = ?params.completed, "Fetching all todo items");
    Ok(ApiResponse::json(&state.todos.list(params.completed))?)
}

/// POST /api/todos
async fn create_todo_handler(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    body: Bytes,
) -> HandlerResult {
    let new = NewTodo::from_json(&body)?;
    let todo = state.todos.create(new);
    debug!(?todo, "Created todo item");

    let location = format!("{}/{}", uri.path().trim_end_matches('/'), todo.id);
    Ok(ApiResponse::json(&todo)?
        .with_status(StatusCode::CREATED)
        .with_header(header::LOCATION, &location))
}

/// Serve a remote LMS collection through the read-through cache
async fn cached_lms_collection(state: &AppState, collection: LmsCollection) -> HandlerResult {
    debug!(collection = collection.path(), "Fetching LMS collection");

    let lms = Arc::clone(&state.lms);
    let payload = state
        .cache
        .get_or_fetch(
            collection.cache_key(),
            move || async move { lms.fetch(collection).await },
            None,
        )
        .await
        .map_err(|e| ApiError::from(e).in_environment(state.environment))?;

    Ok(ApiResponse::new(payload))
}

/// GET /api/lms/users
async fn lms_users_handler(State(state): State<Arc<AppState>>) -> HandlerResult {
    cached_lms_collection(&state, LmsCollection::Users).await
}

/// GET /api/lms/courses
async fn lms_courses_handler(State(state): State<Arc<AppState>>) -> HandlerResult {
    cached_lms_collection(&state, LmsCollection::Courses).await
}
