//! API module for the directory HTTP service
//!
//! This module is split into several submodules:
//! - `handlers`: Extracts request parameters and calls the store or gateway
//! - `error`: Maps domain failures onto HTTP status codes and bodies
//! - `request_log`: Middleware logging every request with its latency

pub mod error;
pub mod handlers;
pub mod request_log;

use std::sync::Arc;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use sqlx::SqlitePool;

use crate::gateway::GeocodingGateway;

pub use error::ApiError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub gateway: Arc<GeocodingGateway>,
}

impl AppState {
    pub fn new(pool: SqlitePool, gateway: Arc<GeocodingGateway>) -> Self {
        Self { pool, gateway }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/specialties", get(handlers::list_specialties))
        .route("/api/v1/specialties/:id", get(handlers::get_specialty))
        .route("/api/v1/hospitals", get(handlers::list_hospitals))
        .route("/api/v1/hospitals/:id", get(handlers::get_hospital))
        .route("/api/v1/doctors", get(handlers::list_doctors))
        .route("/api/v1/doctors/search", get(handlers::search_doctors))
        .route("/api/v1/doctors/:id", get(handlers::get_doctor))
        .route(
            "/api/v1/reviews",
            get(handlers::list_reviews).post(handlers::create_review),
        )
        .route("/api/v1/reviews/:id", get(handlers::get_review))
        .route(
            "/api/v1/geo/geocode",
            get(handlers::geocode).delete(handlers::invalidate_geocode),
        )
        .route("/api/v1/geo/static_map", get(handlers::static_map))
        .layer(from_fn(request_log::log_requests))
        .with_state(state)
}
