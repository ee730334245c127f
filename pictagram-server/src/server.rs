use axum::{Extension, Router, response::IntoResponse, routing::get, serve};
use shared::config::server::{Config, DatabaseConfig, LogFormat};
use sqlx::postgres::PgPoolOptions;
use std::{
    net::SocketAddr,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::{
    app_state::AppState,
    db::bootstrap,
    handlers,
    middleware::request_context::{self, RequestIdState},
    realtime::{Relay, SharedRelay},
    routes,
    services::persistence::{OfflineGateway, PersistenceGateway, PgPersistenceGateway},
    tracer,
};
use axum::http::{HeaderValue, StatusCode, header};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub(crate) fn metrics_handle() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn metrics_endpoint(Extension(handle): Extension<PrometheusHandle>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; version=0.0.4"),
        )],
        handle.render(),
    )
}

/// Initializes the tracing subscriber for logging using the provided configuration.
pub fn initialize_tracing(config: &Config) -> String {
    let env_filter = build_env_filter(config);

    let fmt_builder = fmt::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    if matches!(config.logging.format, LogFormat::Json) {
        fmt_builder.json().with_ansi(false).init();
    } else {
        fmt_builder.with_ansi(true).init();
    }

    config.logging.level.clone()
}

fn build_env_filter(config: &Config) -> EnvFilter {
    let default_level = config
        .logging
        .level
        .parse::<LevelFilter>()
        .unwrap_or(LevelFilter::INFO);

    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default_level.into())
            .from_env_lossy()
    })
}

/// Creates a database connection pool from the given database settings.
///
/// # Errors
/// Returns an error if the database connection pool cannot be created.
pub async fn create_database_pool(db: &DatabaseConfig) -> Result<sqlx::PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(db.max_connections)
        .connect(&db.url)
        .await?;
    metrics::gauge!("db_pool_max_connections").set(f64::from(db.max_connections));
    Ok(pool)
}

/// Creates the shared application state, wiring the persistence gateway
/// to the pool when one is available.
#[must_use]
pub fn create_app_state(pool: Option<sqlx::PgPool>) -> Arc<AppState> {
    let gateway: Option<Arc<dyn PersistenceGateway>> = pool
        .as_ref()
        .map(|pool| Arc::new(PgPersistenceGateway::new(pool.clone())) as _);
    Arc::new(AppState { pool, gateway })
}

/// Creates the CORS layer for the application.
#[must_use]
pub fn create_cors_layer(config: &Config) -> CorsLayer {
    use http::Method;

    let methods = vec![
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ];

    let mut cors = CorsLayer::new()
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::any())
        .allow_credentials(config.server.cors.allow_credentials)
        .max_age(Duration::from_secs(config.server.cors.max_age_seconds));

    if config.server.cors.allowed_origins.is_empty() {
        cors = cors.allow_origin(AllowOrigin::any());
    } else {
        let origins = config
            .server
            .cors
            .allowed_origins
            .iter()
            .filter_map(|origin| http::HeaderValue::from_str(origin).ok())
            .collect::<Vec<_>>();
        cors = cors.allow_origin(AllowOrigin::list(origins));
    }

    cors
}

/// Creates the `/api` router: conversation endpoints plus the feature-gated
/// realtime WebSocket endpoint.
#[must_use]
pub fn create_api_router(config: &Config) -> Router {
    let mut router = Router::new().merge(routes::messages::create_messages_router());

    if config.features.realtime_v1 {
        router = router.route("/ws", get(handlers::realtime::ws_handler));
    }

    router
}

/// Creates the main application router with all middleware and routes.
#[must_use]
pub fn create_app_router(
    state: Arc<AppState>,
    config: Arc<Config>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let gateway: Arc<dyn PersistenceGateway> = state
        .gateway
        .clone()
        .unwrap_or_else(|| Arc::new(OfflineGateway) as _);
    let relay: SharedRelay = Arc::new(Relay::new(&config.realtime, gateway));

    let cors = create_cors_layer(&config);
    let request_id_state = RequestIdState::from_config(&config);

    Router::new()
        .nest("/api", create_api_router(&config))
        .merge(routes::health::create_health_router())
        .route("/metrics", get(metrics_endpoint))
        .layer(Extension(state))
        .layer(Extension(relay))
        .layer(Extension(config))
        .layer(Extension(metrics_handle))
        .layer(cors)
        .layer(tracer::create_trace_layer())
        .layer(axum::middleware::from_fn_with_state(
            request_id_state,
            request_context::assign_request_id,
        ))
}

/// Creates the graceful shutdown signal handler.
pub async fn create_shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutting down...");
}

/// Starts the relay server and binds it to the configured port.
///
/// A failed database connection is not fatal: the relay still serves the
/// realtime channel for ephemeral notifications, while persistence-backed
/// endpoints report `503` until the database returns.
///
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn run(config: Config) -> anyhow::Result<()> {
    initialize_tracing(&config);
    info!("Starting relay server...");

    let metrics_handle = metrics_handle();
    let config = Arc::new(config);

    let pool = match create_database_pool(&config.db).await {
        Ok(pool) => {
            bootstrap::ensure_liveness(&pool).await?;
            bootstrap::run(&pool).await?;
            bootstrap::ensure_readiness(&pool).await?;
            Some(pool)
        }
        Err(err) => {
            warn!(error = %err, "database unavailable, continuing without persistence");
            None
        }
    };

    let state = create_app_state(pool);
    let app = create_app_router(state, config.clone(), metrics_handle.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on {}", addr);

    let shutdown_signal = create_shutdown_signal();

    serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    Ok(())
}
