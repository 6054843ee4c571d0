//! LMS API Library
//!
//! A small REST façade exposing a todo resource and a read-through cached
//! proxy to a learning-management-system API.
//!
//! # Features
//!
//! - **Read-through cache**: remote payloads are served from Redis (or an
//!   in-process store) until their TTL elapses, then fetched once and stored
//! - **Distinct failures**: an unreachable store and a failing upstream are
//!   reported separately (502 vs. pass-through)
//! - **JSON:API envelope** on proxied collections
//! - **Todo CRUD** over an in-memory collection

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod api;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod lms;
pub mod todo;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| Error::Config(format!("Invalid log level '{level}': {e}")))?;

    let subscriber = tracing_subscriber::registry().with(filter);

    let result = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    result.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
