//! Caller identity middleware
//!
//! Resolves the request token to a [`RequestContext`] and stores it in the
//! request extensions. Requests without any token pass through untouched;
//! handlers that need an identity reject them.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::state::AppState;
use crate::reader::RequestContext;

pub async fn identify(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token) = extract_token(req.headers(), &state.identity_header) else {
        return next.run(req).await;
    };

    let ctx = match state.verifier.verify(&token).await {
        Ok(subject) => RequestContext::new(subject),
        Err(e) => Err(e),
    };

    match ctx {
        Ok(ctx) => {
            req.extensions_mut().insert(ctx);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!("Identity rejected: {}", e);
            e.into_response()
        }
    }
}

/// Bearer token from `Authorization`, else the raw identity header value
fn extract_token(headers: &HeaderMap, identity_header: &axum::http::HeaderName) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            let (scheme, token) = v.trim().split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
        })
        .filter(|t| !t.is_empty());

    bearer
        .or_else(|| {
            headers
                .get(identity_header)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|t| !t.is_empty())
        })
        .map(str::to_string)
}
