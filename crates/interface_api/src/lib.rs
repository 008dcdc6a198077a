//! HTTP API Layer
//!
//! This crate provides the REST API for the consultation marketplace using Axum.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers for each domain
//! - **Middleware**: Authentication, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState, Ports};
//!
//! let state = AppState::new(config, Ports::postgres(pool), processor, notifier, clock)?;
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod config;
pub mod error;
pub mod middleware;
pub mod handlers;
pub mod dto;
pub mod auth;
pub mod notifier;
pub mod state;

use axum::{
    Router,
    routing::{get, post, put, delete},
    middleware as axum_middleware,
};
use tower_http::trace::TraceLayer;
use tower_http::cors::{CorsLayer, Any};

use crate::middleware::{auth_middleware, audit_middleware};
use crate::handlers::{pricing, bookings, payments, verification, invoices, health};

pub use crate::state::{AppState, Ports};

/// Creates the main API router
///
/// The webhook and the emailed activation link carry their own proof
/// (signature, token) and sit outside the JWT layer.
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let health_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let public_api = Router::new()
        .route("/payments/webhook", post(payments::webhook))
        .route("/host/verification/activate/:token", get(verification::activate));

    // Pricing routes; the path id is the tariff id, or the host id on GET
    let pricing_routes = Router::new()
        .route("/", post(pricing::upsert_tariff))
        .route("/search", get(pricing::search_hosts))
        .route("/:id", get(pricing::list_tariffs))
        .route("/:id/primary", post(pricing::set_primary))
        .route("/:id/:host_id", delete(pricing::delete_tariff));

    let booking_routes = Router::new()
        .route("/", post(bookings::create_booking))
        .route("/", get(bookings::list_bookings))
        .route("/:id", get(bookings::get_booking))
        .route("/:id/cancel", put(bookings::cancel_booking))
        .route("/:id/complete", post(bookings::complete_booking));

    let payment_routes = Router::new()
        .route("/intents", post(payments::create_intent))
        .route("/intents/:intent_id/status", get(payments::intent_status));

    let host_routes = Router::new()
        .route("/verification", get(verification::status))
        .route("/verification/request", post(verification::request))
        .route("/verification/documents", post(verification::submit_documents))
        .route("/verification/documents", get(verification::list_documents))
        .route("/payouts/account", post(verification::link_payout_account));

    let admin_routes = Router::new()
        .route("/verification/approve", post(verification::approve))
        .route("/verification/reject", post(verification::reject));

    let invoice_routes = Router::new()
        .route("/", get(invoices::list_invoices))
        .route("/:id", get(invoices::get_invoice))
        .route("/:id/download", post(invoices::download_invoice));

    // Protected API routes
    let protected_api = Router::new()
        .nest("/pricing", pricing_routes)
        .nest("/bookings", booking_routes)
        .nest("/payments", payment_routes)
        .nest("/host", host_routes)
        .nest("/admin", admin_routes)
        .nest("/invoices", invoice_routes)
        .layer(axum_middleware::from_fn(audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .merge(health_routes)
        .nest("/api/v1", public_api.merge(protected_api))
        // Equivalent to ServiceBuilder ordering (CORS outermost, then trace);
        // applied separately so each layer sees axum's `Body` type.
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
