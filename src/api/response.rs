//! Response types and the JSON:API envelope middleware

use axum::{
    Json,
    body::Body,
    extract::Request,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::Error;
use crate::config::Environment;

/// JSON:API version advertised in enveloped responses
pub const JSONAPI_VERSION: &str = "1.0";

/// Handler result: a JSON payload with a status code and extra headers
///
/// Defaults are `200 OK` and no extra headers.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Response body
    pub payload: Value,
    /// Status code
    pub status: StatusCode,
    /// Extra response headers
    pub headers: HeaderMap,
}

impl ApiResponse {
    /// `200 OK` with `payload`
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            status: StatusCode::OK,
            headers: HeaderMap::new(),
        }
    }

    /// `200 OK` with a serialized value
    pub fn json<T: Serialize>(data: &T) -> crate::Result<Self> {
        Ok(Self::new(serde_json::to_value(data)?))
    }

    /// `204 No Content`
    pub fn no_content() -> Self {
        Self::new(Value::Null).with_status(StatusCode::NO_CONTENT)
    }

    /// Replace the status code
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Add a header; values that are not valid header text are dropped with a warning
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(e) => warn!(header = %name, error = %e, "Dropping invalid header value"),
        }
        self
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        if self.status == StatusCode::NO_CONTENT {
            return (self.status, self.headers).into_response();
        }
        (self.status, self.headers, Json(self.payload)).into_response()
    }
}

/// Error rendered as a JSON body with the status from [`Error::status_code`]
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    environment: Environment,
}

impl ApiError {
    /// Attach the deployment environment, which selects outage descriptions
    #[must_use]
    pub fn in_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self {
            error,
            environment: Environment::default(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = match &self.error {
            Error::StoreUnavailable(detail) => {
                error!(error = %detail, "Could not connect to the Redis cache!");
                let location = match self.environment {
                    Environment::Development => "a (containerized?) Redis server is running locally",
                    Environment::Production => {
                        "a Redis server has been provisioned for this app"
                    }
                };
                json!({
                    "message": "Could not connect to the Redis cache!",
                    "description": format!("Please confirm that {location}."),
                })
            }
            Error::FetchFailed { .. } => {
                warn!(error = %self.error, "Upstream fetch failed");
                json!({ "message": self.error.to_string() })
            }
            e if status.is_server_error() => {
                error!(error = %e, "Request failed");
                json!({ "message": e.to_string() })
            }
            e => json!({ "message": e.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

/// Body of the catch-all 404 response
pub fn page_not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "message": "Page not found!",
            "description": "The requested URL was not found on the server."
        })),
    )
        .into_response()
}

/// Wrap successful JSON responses as `{"data": ..., "jsonapi": {"version": "1.0"}}`
///
/// Error responses, empty `204` responses, and non-JSON bodies pass through untouched.
/// Handler bodies are already held in memory, so buffering them is not size-capped.
pub async fn json_api_envelope(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if !response.status().is_success() || response.status() == StatusCode::NO_CONTENT {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to buffer response body for envelope");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Failed to read response body" })),
            )
                .into_response();
        }
    };

    let Ok(data) = serde_json::from_slice::<Value>(&bytes) else {
        return Response::from_parts(parts, Body::from(bytes));
    };

    let enveloped = json!({
        "data": data,
        "jsonapi": { "version": JSONAPI_VERSION }
    });

    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    Response::from_parts(parts, Body::from(enveloped.to_string()))
}
