//! # hwctl: hardware inventory control layer
//!
//! An HTTP service that keeps an inventory of computers and the peripherals attached to them.
//!
//! ## Overview
//!
//! - **Computers** belong to the authenticated subject that created them. Every computer route
//!   requires a bearer token, and a computer owned by someone else is indistinguishable from one
//!   that does not exist.
//! - **Peripherals** are shared inventory. They are created unattached and can later be attached
//!   to exactly one computer.
//! - **Relationships** between the two are maintained by the [`relationships::RelationshipManager`],
//!   which keeps attachments consistent on top of an eventually consistent store and detaches
//!   every peripheral before a computer is deleted.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) -> api::handlers -> relationships -> db::handlers -> db::store (memory | postgres)
//! ```
//!
//! - [`api`]: route handlers, extractors and wire models
//! - [`auth`]: bearer token verification and subject extraction
//! - [`relationships`]: attach, detach and cascading delete
//! - [`db`]: typed repositories over the abstract [`db::store::EntityStore`]
//! - [`config`]: YAML + environment configuration
//! - [`telemetry`]: tracing and optional OTLP export
//!
//! ## Quick Start
//!
//! ```no_run
//! use hwctl::{Application, Config, telemetry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod relationships;
pub mod telemetry;
#[cfg(test)]
mod test_utils;
pub mod types;

use crate::api::handlers::{computers, method_not_allowed, peripherals, relationships as links};
use crate::config::{CorsOrigin, StoreConfig};
use crate::db::store::{EntityStore, MemoryStore, PostgresStore};
use axum::{
    Json, Router,
    http::{self, HeaderValue},
    routing::get,
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use openapi::ApiDoc;
pub use types::{ComputerId, PeripheralId, Subject};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .store(Arc::new(MemoryStore::new()))
///     .config(config)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub config: Config,
}

/// Get the entity store migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let origins = &config.cors.allowed_origins;
    let allow_origin = if origins.iter().any(|origin| matches!(origin, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut values = Vec::with_capacity(origins.len());
        for origin in origins {
            if let CorsOrigin::Url(url) = origin {
                values.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(values)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            http::Method::GET,
            http::Method::POST,
            http::Method::PUT,
            http::Method::PATCH,
            http::Method::DELETE,
        ])
        .allow_headers([http::header::AUTHORIZATION, http::header::CONTENT_TYPE, http::header::ACCEPT])
        .expose_headers([http::header::ALLOW]);

    if let Some(max_age) = config.cors.max_age {
        cors = cors.max_age(std::time::Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the application router with all endpoints and middleware.
///
/// Each resource route answers unsupported methods with 405 and an `Allow` header listing the
/// methods it does support. Prometheus metrics are mounted at `/internal/metrics` only when
/// `enable_metrics` is set, since the metrics layer installs a process-wide recorder.
#[instrument(skip_all)]
pub fn build_router(state: AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route(
            "/computers",
            get(computers::list_computers)
                .post(computers::create_computer)
                .fallback(|| async { method_not_allowed("GET, POST") }),
        )
        .route(
            "/computers/{computer_id}",
            get(computers::get_computer)
                .patch(computers::patch_computer)
                .put(computers::put_computer)
                .delete(computers::delete_computer)
                .fallback(|| async { method_not_allowed("GET, PATCH, PUT, DELETE") }),
        )
        .route(
            "/computers/{computer_id}/peripherals/{peripheral_id}",
            axum::routing::put(links::attach_peripheral)
                .delete(links::detach_peripheral)
                .fallback(|| async { method_not_allowed("PUT, DELETE") }),
        )
        .route(
            "/peripherals",
            get(peripherals::list_peripherals)
                .post(peripherals::create_peripheral)
                .fallback(|| async { method_not_allowed("GET, POST") }),
        )
        .route(
            "/peripherals/{peripheral_id}",
            get(peripherals::get_peripheral)
                .patch(peripherals::patch_peripheral)
                .put(peripherals::put_peripheral)
                .delete(peripherals::delete_peripheral)
                .fallback(|| async { method_not_allowed("GET, PATCH, PUT, DELETE") }),
        )
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    router = router.layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Open the configured entity store, running migrations for PostgreSQL.
async fn setup_store(config: &Config) -> anyhow::Result<Arc<dyn EntityStore>> {
    match &config.store {
        StoreConfig::Memory => {
            info!("Using in-memory entity store; contents are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::Postgres { url, pool } => {
            let store = PostgresStore::connect(url, pool).await?;
            store.migrate().await?;
            info!("PostgreSQL entity store ready");
            Ok(Arc::new(store))
        }
    }
}

/// The assembled service: store, state and router, ready to serve.
pub struct Application {
    router: Router,
    config: Config,
}

impl Application {
    /// Create a new application instance with its store opened and routes built
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting hwctl with configuration: {:#?}", config);

        let store = setup_store(&config).await?;
        let app_state = AppState::builder().store(store).config(config.clone()).build();
        let router = build_router(app_state)?;

        Ok(Self { router, config })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("hwctl listening on http://{}", bind_addr);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
