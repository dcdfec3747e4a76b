//! HTTP + SSE API for the star gift auction system.
//!
//! This crate composes the durable store (behind the [`sga_core::ports`]
//! traits), the fast caches and the background loops: the scheduler worker
//! pool driving round settlement, and the snapshot producers feeding the
//! subscription streams.

use axum::http::header;
use axum::{Json, Router, routing};
use serde::Serialize;
use sga_cache::{BidBoard, ExtensionCounters, OpCache, RateLimiter, UpdateHub, UserLocks};
use sga_core::ports::AuctionStore;
use std::sync::Arc;
use tower_http::cors;

pub mod config;
mod error;
mod extract;
mod jobs;
mod openapi;
mod producers;
mod routes;
mod settlement;
mod snipe;

pub use config::ServerConfig;
pub use error::ApiError;
pub use extract::{Caller, IdemKey, Now};
pub use jobs::spawn_workers;
pub use producers::{ProducerManager, spawn_all_auctions_producer};
pub use settlement::{JobError, execute_job};

/// Everything a request handler or a job worker can reach: the durable
/// store plus the in-process fast-store structures.
#[derive(Clone)]
pub struct AppState<T: AuctionStore> {
    /// The durable store
    pub store: T,
    /// The bid admission cache
    pub board: Arc<BidBoard>,
    /// Idempotency slots for multi-step operations
    pub ops: Arc<OpCache>,
    /// The per-user mutex table
    pub locks: Arc<UserLocks>,
    /// Request rate counters
    pub limiter: Arc<RateLimiter>,
    /// Pub/sub channels and snapshot seeds
    pub hub: Arc<UpdateHub>,
    /// Anti-snipe extension budgets
    pub extensions: Arc<ExtensionCounters>,
    /// Per-auction snapshot producer registry
    pub producers: Arc<ProducerManager>,
    /// Server tunables
    pub config: Arc<ServerConfig>,
}

/// Build the application state around a durable store.
pub fn state<T: AuctionStore>(store: T, config: ServerConfig) -> AppState<T> {
    AppState {
        store,
        board: Arc::new(BidBoard::new()),
        ops: Arc::new(OpCache::new()),
        locks: Arc::new(UserLocks::new()),
        limiter: Arc::new(RateLimiter::new()),
        hub: Arc::new(UpdateHub::new()),
        extensions: Arc::new(ExtensionCounters::new()),
        producers: Arc::new(ProducerManager::new()),
        config: Arc::new(config),
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

/// Simple health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Construct the full API router over the given state.
pub fn router<T: AuctionStore>(state: AppState<T>) -> Router {
    // To allow for web app access, we use a permissive CORS policy. This
    // also strips any implicit authorization, which suits a service that
    // trusts an upstream gateway for identity.
    let policy = cors::CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let mut app = Router::new()
        .route("/health", routing::get(health_check))
        .nest("/v0/auctions", routes::auctions::router())
        .nest("/v0/users", routes::users::router())
        .nest("/v0/streams", routes::streams::router());

    if state.config.testmode {
        app = app.nest("/v0/test", routes::testmode::router());
    }

    app.layer(policy)
        .with_state(state)
        .merge(openapi::openapi_router())
}

/// Start the HTTP server plus its background loops and serve until the
/// process exits.
pub async fn start<T: AuctionStore>(config: ServerConfig, store: T) {
    let app_state = state(store, config);

    let listener = tokio::net::TcpListener::bind(app_state.config.bind_address)
        .await
        .expect("Unable to bind local port");
    tracing::info!(
        "Listening for requests on {}",
        listener.local_addr().unwrap()
    );

    // The worker pool drives the auction state machine; the producer feeds
    // the all-auctions stream. Both run for the life of the process.
    let _workers = jobs::spawn_workers(app_state.clone());
    let _producer = producers::spawn_all_auctions_producer(app_state.clone());

    let service = router(app_state);
    axum::serve(listener, service).await.expect("server failed");
}
