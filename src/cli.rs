//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::CacheBackend;

/// REST façade with a todo resource and a read-through cached LMS proxy
#[derive(Parser, Debug)]
#[command(name = "lms-api")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "LMS_API_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "LMS_API_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "LMS_API_HOST")]
    pub host: Option<String>,

    /// Cache store backend (redis, memory)
    #[arg(long, env = "LMS_API_CACHE_BACKEND")]
    pub cache_backend: Option<CacheBackend>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LMS_API_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "LMS_API_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the API server (default)
    Serve,

    /// Load and validate the configuration, then print it with secrets masked
    CheckConfig,
}
