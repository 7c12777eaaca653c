use std::sync::Arc;

use assigner_core::{AssignmentStore, MemoryStore, PgStore};
use axum::Router;
use config::{Config, StorageBackend};
use envconfig::Envconfig;
use eyre::Result;
use tracing::level_filters::LevelFilter;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use handlers::{add_routes, AppState};
use http_metrics::setup_metrics_routes;

mod config;
mod handlers;
mod http_metrics;

async fn listen(app: Router, bind: String) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_store(config: &Config) -> Result<Arc<dyn AssignmentStore>> {
    match config.storage_backend {
        StorageBackend::Postgres => {
            let store = PgStore::new(&config.pool_config(), config.lock_timeout.0).await?;
            if config.run_migrations {
                store.migrate().await?;
                info!("database migrations applied");
            }
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            warn!("using in-memory storage, assignments are lost on restart");
            Ok(Arc::new(MemoryStore::new(config.lock_timeout.0)))
        }
    }
}

#[tokio::main]
async fn main() {
    // stdout with a level configured by the RUST_LOG envvar (default=INFO)
    let log_layer = tracing_subscriber::fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .from_env_lossy(),
    );
    tracing_subscriber::registry().with(log_layer).init();

    let config = Config::init_from_env().expect("failed to load configuration from env");

    let store = build_store(&config)
        .await
        .expect("failed to initialize assignment store");

    let state = AppState::new(store, config.retry_policy.policy(), config.max_groups);
    state
        .settings
        .seed_defaults(config.default_settings())
        .await
        .expect("failed to seed default settings");

    let app = add_routes(
        Router::new(),
        state,
        config.max_body_size,
        config.concurrency_limit,
    );
    let app = setup_metrics_routes(app);

    let bind = config.bind();
    info!("listening on {}", bind);

    match listen(app, bind).await {
        Ok(_) => {}
        Err(e) => error!("failed to start group assigner http server, {}", e),
    }
}
