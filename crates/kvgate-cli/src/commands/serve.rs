use std::sync::Arc;

use axum::Router;
use clap::Args;
use kvgate_kv::handlers::{configure_routes, KvApiDoc, KvAppState};
use kvgate_kv::services::{DEFAULT_FETCH_ALL_TIMEOUT_MS, DEFAULT_OPERATION_TIMEOUT_MS};
use kvgate_kv::{KvConfig, KvService, RedisStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Args)]
pub struct ServeCommand {
    /// Address to bind the server to
    #[arg(long, default_value = "0.0.0.0:8080", env = "KVGATE_ADDRESS")]
    pub address: String,

    /// Redis connection URL
    #[arg(long, default_value = "redis://localhost:6379", env = "KVGATE_REDIS_URL")]
    pub redis_url: String,

    /// Timeout for a single Redis command, in milliseconds
    #[arg(long, default_value_t = DEFAULT_OPERATION_TIMEOUT_MS, env = "KVGATE_OPERATION_TIMEOUT_MS")]
    pub operation_timeout_ms: u64,

    /// Deadline for listing every key (/get-all), in milliseconds
    #[arg(long, default_value_t = DEFAULT_FETCH_ALL_TIMEOUT_MS, env = "KVGATE_FETCH_ALL_TIMEOUT_MS")]
    pub fetch_all_timeout_ms: u64,
}

impl ServeCommand {
    pub fn kv_config(&self) -> KvConfig {
        KvConfig {
            operation_timeout_ms: self.operation_timeout_ms,
            fetch_all_timeout_ms: self.fetch_all_timeout_ms,
        }
    }

    pub fn execute(self) -> anyhow::Result<()> {
        let config = self.kv_config();
        config.validate().map_err(|e| anyhow::anyhow!(e))?;

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(self.run(config))
    }

    async fn run(self, config: KvConfig) -> anyhow::Result<()> {
        debug!("Connecting to Redis at {}", self.redis_url);
        let store = RedisStore::connect(&self.redis_url).await?;
        let kv_service = Arc::new(KvService::new(Arc::new(store), config));

        let shutdown = CancellationToken::new();
        let app = build_router(kv_service, shutdown.clone());

        let listener = TcpListener::bind(&self.address).await?;
        info!("kvgate listening on {}", listener.local_addr()?);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal(shutdown))
            .await?;

        info!("Server stopped");
        Ok(())
    }
}

/// KV routes plus OpenAPI docs, with request tracing.
pub fn build_router(kv_service: Arc<KvService>, shutdown: CancellationToken) -> Router {
    let state = Arc::new(KvAppState::new(kv_service, shutdown));

    Router::new()
        .merge(configure_routes().with_state(state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", KvApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
}

/// Resolve on Ctrl+C or SIGTERM, then cancel in-flight enumerations.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
    shutdown.cancel();
}
