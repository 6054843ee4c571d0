//! LMS REST API client
//!
//! Credentials are sent as HTTP basic auth with the API token as user name
//! and an empty password. The token is never logged.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::LmsConfig;
use crate::{Error, Result};

/// Cache key for the remote users collection
pub const USERS_CACHE_KEY: &str = "lms:users";

/// Cache key for the remote courses collection
pub const COURSES_CACHE_KEY: &str = "lms:courses";

/// Remote collections exposed through the façade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmsCollection {
    /// `GET {base}/users`
    Users,
    /// `GET {base}/courses`
    Courses,
}

impl LmsCollection {
    /// Path segment under the API base URL
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Courses => "courses",
        }
    }

    /// Read-through cache key for this collection
    #[must_use]
    pub fn cache_key(self) -> &'static str {
        match self {
            Self::Users => USERS_CACHE_KEY,
            Self::Courses => COURSES_CACHE_KEY,
        }
    }
}

/// Client for the LMS REST API
#[derive(Clone)]
pub struct LmsClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl std::fmt::Debug for LmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmsClient")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl LmsClient {
    /// Create a client from configuration, resolving the API token
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn from_config(config: &LmsConfig) -> Result<Self> {
        let token = config.resolve_token();
        if token.is_none() {
            tracing::warn!(
                token = %config.token,
                "LMS token not resolved, requests will be sent unauthenticated"
            );
        }
        Self::new(&config.base_url, token, config.timeout)
    }

    /// Create a client for `base_url`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL is invalid or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> Result<Self> {
        // Trailing slash so that joined paths extend rather than replace the last segment
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .map_err(|e| Error::Config(format!("Invalid LMS base URL '{base_url}': {e}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lms-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Base URL requests are resolved against
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Fetch the users collection
    pub async fn users(&self) -> Result<Value> {
        self.fetch(LmsCollection::Users).await
    }

    /// Fetch the courses collection
    pub async fn courses(&self) -> Result<Value> {
        self.fetch(LmsCollection::Courses).await
    }

    /// Fetch a collection as raw JSON
    ///
    /// # Errors
    ///
    /// Returns [`Error::FetchFailed`] on transport errors, non-success
    /// statuses, and bodies that are not JSON.
    pub async fn fetch(&self, collection: LmsCollection) -> Result<Value> {
        let url = self
            .base_url
            .join(collection.path())
            .map_err(|e| Error::Internal(format!("Failed to build LMS URL: {e}")))?;

        debug!(url = %url, "Fetching from LMS");

        let mut request = self.client.get(url.clone());
        if let Some(ref token) = self.token {
            request = request.basic_auth(token, Some(""));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::fetch(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::FetchFailed {
                status: Some(status.as_u16()),
                message: upstream_message(status, &body),
            });
        }

        response.json::<Value>().await.map_err(|e| Error::FetchFailed {
            status: Some(status.as_u16()),
            message: format!("Malformed LMS payload from {url}: {e}"),
        })
    }
}

/// Describe an upstream failure, preferring the API's own error message
fn upstream_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/error/message")
            .or_else(|| v.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    });

    match detail {
        Some(message) => format!("LMS returned {status}: {message}"),
        None => format!("LMS returned {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_keys_are_disjoint() {
        assert_eq!(LmsCollection::Users.cache_key(), "lms:users");
        assert_eq!(LmsCollection::Courses.cache_key(), "lms:courses");
        assert_ne!(
            LmsCollection::Users.cache_key(),
            LmsCollection::Courses.cache_key()
        );
    }

    #[test]
    fn test_base_url_keeps_api_prefix() {
        let client = LmsClient::new(
            "https://example.talentlms.com/api/v1",
            None,
            Duration::from_secs(5),
        )
        .unwrap();
        let joined = client.base_url().join(LmsCollection::Users.path()).unwrap();
        assert_eq!(joined.as_str(), "https://example.talentlms.com/api/v1/users");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = LmsClient::new("::not a url::", None, Duration::from_secs(5));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_debug_hides_token() {
        let client = LmsClient::new(
            "https://example.com/api/v1",
            Some("secret-token".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("authenticated: true"));
    }

    #[test]
    fn test_upstream_message_extracts_api_error() {
        let body = r#"{"error":{"type":"invalid_request_error","message":"Invalid API key"}}"#;
        assert_eq!(
            upstream_message(StatusCode::UNAUTHORIZED, body),
            "LMS returned 401 Unauthorized: Invalid API key"
        );
        assert_eq!(
            upstream_message(StatusCode::BAD_GATEWAY, "<html>"),
            "LMS returned 502 Bad Gateway"
        );
    }
}
