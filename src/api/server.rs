//! API server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::router::{AppState, create_router};
use crate::cache::{KeyValueStore, MemoryStore, ReadThroughCache, RedisStore};
use crate::config::{CacheBackend, Config};
use crate::lms::LmsClient;
use crate::todo::TodoStore;
use crate::{Error, Result};

/// LMS API server
pub struct Server {
    /// Configuration
    config: Config,
    /// Shared handler state
    state: Arc<AppState>,
    /// Memory store handle for the expiry sweep, when that backend is selected
    memory_store: Option<Arc<MemoryStore>>,
}

impl Server {
    /// Create a new server, wiring the store, cache and LMS client
    ///
    /// The Redis backend does not connect here; outages surface per request.
    pub async fn new(config: Config) -> Result<Self> {
        let mut memory_store = None;
        let store: Arc<dyn KeyValueStore> = match config.cache.backend {
            CacheBackend::Redis => {
                let redis = RedisStore::new(&config.cache.redis_url, config.cache.connect_timeout)?;
                if let Err(e) = redis.ping().await {
                    warn!(error = %e, "Redis not reachable at startup, LMS routes will fail until it is");
                }
                Arc::new(redis)
            }
            CacheBackend::Memory => {
                let memory = Arc::new(MemoryStore::new());
                memory_store = Some(Arc::clone(&memory));
                memory
            }
        };

        let cache = Arc::new(ReadThroughCache::new(store, config.cache.default_ttl));
        let lms = Arc::new(LmsClient::from_config(&config.lms)?);

        let state = Arc::new(AppState {
            cache,
            lms,
            todos: Arc::new(TodoStore::seeded()),
            environment: config.environment,
        });

        Ok(Self {
            config,
            state,
            memory_store,
        })
    }

    /// Shared handler state
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    /// Run the server until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let (shutdown_tx, _) = broadcast::channel(1);

        let app = create_router(Arc::clone(&self.state));
        let listener = TcpListener::bind(addr).await?;

        info!("============================================================");
        info!("LMS API v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(host = %self.config.server.host, port = %self.config.server.port, "Listening");
        info!(
            backend = %self.config.cache.backend,
            ttl_secs = self.config.cache.default_ttl.as_secs(),
            "Read-through cache ready"
        );
        info!(base_url = %self.state.lms.base_url(), "LMS upstream");
        info!("  GET  /api/lms/users, /api/lms/courses  (cached)");
        info!("  CRUD /api/todos, /api/todo/{{id}}");
        info!("============================================================");

        // Expired-entry sweep for the in-process store
        if let Some(memory) = self.memory_store.clone() {
            let interval_period = self.config.cache.sweep_interval;
            let mut shutdown_rx = shutdown_tx.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(interval_period);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let evicted = memory.evict_expired();
                            if evicted > 0 {
                                debug!(evicted, "Swept expired cache entries");
                            }
                        }
                        _ = shutdown_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        let shutdown_timeout = self.config.server.shutdown_timeout;
        let mut drain_rx = shutdown_tx.subscribe();

        let serve = async {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(shutdown_tx.clone()))
                .await
                .map_err(|e| Error::Internal(e.to_string()))
        };

        let drain_deadline = async move {
            let _ = drain_rx.recv().await;
            tokio::time::sleep(shutdown_timeout).await;
        };

        tokio::select! {
            result = serve => result?,
            () = drain_deadline => {
                warn!(
                    timeout_secs = shutdown_timeout.as_secs(),
                    "In-flight requests did not drain before the shutdown timeout"
                );
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

/// Shutdown signal handler
async fn shutdown_signal(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
    let _ = shutdown_tx.send(());
}
