use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    http::{Method, Request},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use daybook_shared::constants::ANONYMOUS_SUBJECT;

use crate::admission::Decision;
use crate::api::AppState;
use crate::error::ServerError;

const CREATE_ENTRY_PATH: &str = "/api/entries";

/// Admission gate for `/api` routes.
///
/// The global policy runs for every request; the weekly quota runs only for
/// entry creation, keyed by the session user. The first denial wins.
pub async fn admission_gate(
    State(state): State<AppState>,
    req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ServerError> {
    let subject = extract_client_subject(&req);

    if let Decision::Denied(denial) = state.admission.check_global(&subject).await {
        warn!(subject = %subject, code = denial.code(), "Request rejected");
        return Err(ServerError::RateLimited(denial));
    }

    if is_entry_creation(&req) {
        let user = state.sessions.user_from_headers(req.headers()).ok();
        if let Decision::Denied(denial) = state.admission.check_entry_quota(user.as_ref()).await {
            warn!(subject = %subject, user = ?user, code = denial.code(), "Entry creation rejected");
            return Err(ServerError::RateLimited(denial));
        }
    }

    Ok(next.run(req).await)
}

fn is_entry_creation<B>(req: &Request<B>) -> bool {
    req.method() == Method::POST && req.uri().path().trim_end_matches('/') == CREATE_ENTRY_PATH
}

/// First `X-Forwarded-For` entry, then `X-Real-IP`, then the peer address.
fn extract_client_subject<B>(req: &Request<B>) -> String {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').map(str::trim).find(|s| !s.is_empty()) {
            return first.to_string();
        }
    }

    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }

    if let Some(connect_info) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return connect_info.0.ip().to_string();
    }

    ANONYMOUS_SUBJECT.to_string()
}
