//! Audit logging middleware.
//!
//! Logs every API request with principal, method, path and response
//! status. Runs innermost, after auth has injected `CurrentUser`.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::types::CurrentUser;

pub async fn log_access(req: Request<axum::body::Body>, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let principal = req
        .extensions()
        .get::<CurrentUser>()
        .map(|u| format!("{}:{}", u.principal.kind(), u.principal.id()))
        .unwrap_or_else(|| "anonymous".to_string());

    let response = next.run(req).await;

    tracing::info!(
        target: "caresync::audit",
        %principal,
        %method,
        %path,
        status = response.status().as_u16(),
        "API access"
    );
    response
}
