//! API router.
//!
//! One router serves every route. The auth layer resolves a bearer token
//! when one is sent; handlers that need an account take `CurrentUser`.
//!
//! Middleware stack (outermost → innermost):
//! 1. Extension(ApiContext) → 2. CORS → 3. Cache-Control → 4. Auth resolver → 5. Audit logger

use std::sync::Arc;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post, put};
use axum::{Extension, Router};
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints::*;
use crate::api::middleware;
use crate::api::types::ApiContext;
use crate::api::websocket;
use crate::core_state::CoreState;

/// Build the full application router.
pub fn api_router(core: Arc<CoreState>) -> Router {
    build_router(ApiContext::new(core))
}

/// Build from a pre-constructed `ApiContext` (tests issue WS tickets directly).
#[cfg(test)]
pub(crate) fn api_router_with_ctx(ctx: ApiContext) -> Router {
    build_router(ctx)
}

fn build_router(ctx: ApiContext) -> Router {
    // NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
    // Static segments win over a param at the same position.
    let api = Router::new()
        .route("/health", get(health::check))
        // Sessions
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/ws-ticket", post(auth::ws_ticket))
        // Patients
        .route("/patients", post(patients::register).get(patients::list))
        .route("/patients/me", get(patients::me))
        .route("/patients/search", get(patients::search))
        .route("/patients/online", get(patients::online))
        .route(
            "/patients/:id",
            get(patients::detail).put(patients::update).delete(patients::remove),
        )
        // Clinics
        .route("/clinics", post(clinics::register).get(clinics::list))
        .route("/clinics/me", get(clinics::me))
        .route("/clinics/search", get(clinics::search))
        .route("/clinics/online", get(clinics::online))
        .route("/clinics/rating/:id", get(clinics::rating))
        .route(
            "/clinics/record-access/:patient_id",
            get(clinics::with_record_access),
        )
        .route(
            "/clinics/:id",
            get(clinics::detail).put(clinics::update).delete(clinics::remove),
        )
        // Appointments
        .route("/appointments", post(appointments::create).get(appointments::list))
        .route("/appointments/webhook", post(webhook::receive))
        .route("/appointments/latest/:id", get(appointments::latest))
        .route("/appointments/patient/:id", get(appointments::for_patient))
        .route("/appointments/clinic/:id", get(appointments::for_clinic))
        .route("/appointments/cancel/:id", put(appointments::cancel))
        .route("/appointments/approve/:id", put(appointments::approve))
        .route(
            "/appointments/:id",
            get(appointments::detail)
                .put(appointments::update)
                .delete(appointments::remove),
        )
        // Medical records and access ledger
        .route("/records", post(records::create).get(records::list))
        .route("/records/me", get(records::mine))
        .route(
            "/records/clinic-access",
            get(records::access_status).delete(records::revoke_access),
        )
        .route(
            "/records/:id",
            get(records::detail).put(records::update).delete(records::remove),
        )
        // Reviews
        .route("/reviews", post(reviews::create).get(reviews::list))
        .route("/reviews/patient/:id", get(reviews::by_patient))
        .route("/reviews/clinic/:id", get(reviews::by_clinic))
        .route(
            "/reviews/:id",
            get(reviews::detail).put(reviews::update).delete(reviews::remove),
        )
        // Chat rooms
        .route("/rooms/token", get(rooms::token))
        // Maintenance
        .route(
            "/maintenance/consistency",
            get(maintenance::check).post(maintenance::repair),
        );

    Router::new()
        .nest("/api", api)
        .route("/ws/connect", get(websocket::ws_upgrade))
        .with_state(ctx.clone())
        // Middleware stack (innermost first, outermost last):
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(axum::middleware::from_fn(middleware::auth::resolve_session))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        // Extension must be outermost so middleware can extract ApiContext
        .layer(Extension(ctx))
}
