//! Configuration management

use std::{env, fmt, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default lifetime of cached remote payloads
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "LMS_API_";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    /// Environment files to load before resolving secrets.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    #[serde(default)]
    pub env_files: Vec<String>,
    /// Deployment environment
    pub environment: Environment,
    /// Server configuration
    pub server: ServerConfig,
    /// Cache configuration
    pub cache: CacheConfig,
    /// LMS API configuration
    pub lms: LmsConfig,
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development (containerized Redis expected on the host)
    Development,
    /// Provisioned deployment
    #[default]
    Production,
}

/// Key-value store backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Networked Redis server
    #[default]
    Redis,
    /// In-process store (single instance deployments, tests)
    Memory,
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => f.write_str("redis"),
            Self::Memory => f.write_str("memory"),
        }
    }
}

impl std::str::FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown cache backend '{other}' (expected redis or memory)")),
        }
    }
}

/// Cache configuration for the read-through cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Store backend
    pub backend: CacheBackend,
    /// Redis connection URL, `${VAR:-default}` patterns are expanded
    pub redis_url: String,
    /// Lifetime of cached payloads
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,
    /// Upper bound on acquiring a Redis connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Interval of the expired-entry sweep (memory backend)
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Redis,
            redis_url: "redis://:${REDIS_PASSWORD:-}@${REDIS_HOST:-127.0.0.1}:${REDIS_PORT:-6379}"
                .to_string(),
            default_ttl: DEFAULT_CACHE_TTL,
            connect_timeout: Duration::from_secs(5),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// LMS API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LmsConfig {
    /// Base URL of the LMS REST API
    pub base_url: String,
    /// API token. Supports: literal value or `env:VAR_NAME`
    pub token: String,
    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for LmsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://talend.talentlms.com/api/v1".to_string(),
            token: "env:LMS_TOKEN".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

impl LmsConfig {
    /// Resolve the API token (expand `env:` references)
    ///
    /// An `env:` reference to an unset variable resolves to `None`.
    #[must_use]
    pub fn resolve_token(&self) -> Option<String> {
        if let Some(var_name) = self.token.strip_prefix("env:") {
            env::var(var_name).ok().filter(|v| !v.is_empty())
        } else if self.token.is_empty() {
            None
        } else {
            Some(self.token.clone())
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or holds invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // Merge environment variables (LMS_API_ prefix, `__` for nesting)
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        // Load env files into process environment (before env var expansion)
        config.load_env_files();
        config.expand_env_vars();
        config.validate()?;

        Ok(config)
    }

    /// Reject values the service cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero duration, an unparsable LMS base
    /// URL, or an empty Redis URL when the Redis backend is selected.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("cache.default_ttl", self.cache.default_ttl),
            ("cache.connect_timeout", self.cache.connect_timeout),
            ("cache.sweep_interval", self.cache.sweep_interval),
            ("lms.timeout", self.lms.timeout),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::Config(format!("{name} must be positive")));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.trim().is_empty() {
            return Err(Error::Config("cache.redis_url is required for the redis backend".to_string()));
        }
        url::Url::parse(&self.lms.base_url)
            .map_err(|e| Error::Config(format!("Invalid lms.base_url '{}': {e}", self.lms.base_url)))?;
        Ok(())
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                if let Some(home) = dirs::home_dir() {
                    path_str.replacen('~', &home.display().to_string(), 1)
                } else {
                    path_str.clone()
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if path.exists() {
                match dotenvy::from_path(path) {
                    Ok(()) => {
                        tracing::info!("Loaded env file: {expanded}");
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load env file {expanded}: {e}");
                    }
                }
            } else {
                tracing::debug!("Env file not found (skipped): {expanded}");
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} patterns in config values
    fn expand_env_vars(&mut self) {
        let Ok(re) = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}") else {
            return;
        };

        self.cache.redis_url = Self::expand_string(&re, &self.cache.redis_url);
        self.lms.base_url = Self::expand_string(&re, &self.lms.base_url);
    }

    /// Expand environment variables in a string
    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let var_name = &caps[1];
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(var_name).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }

    /// Copy of the configuration with secrets masked, for display
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.lms.token.starts_with("env:") && !copy.lms.token.is_empty() {
            copy.lms.token = "********".to_string();
        }
        copy.cache.redis_url = redact_url_password(&copy.cache.redis_url);
        copy
    }
}

/// Replace the password component of a URL, leaving unparsable input intact
fn redact_url_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) if parsed.password().is_some_and(|p| !p.is_empty()) => {
            let _ = parsed.set_password(Some("********"));
            parsed.to_string()
        }
        _ => raw.to_string(),
    }
}

/// Custom humantime serde module for Duration
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize Duration to human-readable string (e.g., "30s")
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the serializer fails.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize human-readable duration string (e.g., "30s", "5m", "100ms")
    ///
    /// # Errors
    ///
    /// Returns a deserialization error if the string cannot be parsed as a duration.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        let s = match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => return Ok(Duration::from_secs(secs)),
            Raw::Text(s) => s,
        };
        let s = s.trim();

        // "ms" must be checked before "s" and "m"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else if let Some(mins) = s.strip_suffix('m') {
            scaled_secs(mins, 60)
        } else if let Some(hours) = s.strip_suffix('h') {
            scaled_secs(hours, 3600)
        } else {
            // Assume seconds
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }

    fn scaled_secs<E: serde::de::Error>(count: &str, unit_secs: u64) -> Result<Duration, E> {
        let count = count.parse::<u64>().map_err(E::custom)?;
        count
            .checked_mul(unit_secs)
            .map(Duration::from_secs)
            .ok_or_else(|| E::custom(format!("duration '{count}' overflows")))
    }
}
