use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::Deserialize;

use super::state::AppState;
use crate::error::{AuditLogError, Result};
use crate::reader::{PageRequest, RequestContext};
use crate::types::LogRecord;

/// Raw pagination parameters; normalized by [`PageRequest::from_params`]
#[derive(Debug, Default, Deserialize)]
pub struct ListLogsQuery {
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
}

/// `GET /logs`: the caller's own records, one page at a time
pub async fn list_logs(
    State(state): State<AppState>,
    ctx: Option<Extension<RequestContext>>,
    Query(query): Query<ListLogsQuery>,
) -> Result<Json<Vec<LogRecord>>> {
    let Some(Extension(ctx)) = ctx else {
        return Err(AuditLogError::Unauthorized(
            "missing identity token".to_string(),
        ));
    };

    let page = PageRequest::from_params(query.page.as_deref(), query.page_size.as_deref());
    let records = state.reader.list_by_subject(&ctx, page).await?;
    Ok(Json(records))
}

/// `GET /health`: store and broker reachability plus dead-letter count
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = state.store.health().await.unwrap_or(false);
    let broker = match state.provider {
        Some(ref provider) => Some((
            provider.name().to_string(),
            provider.health().await.unwrap_or(false),
        )),
        None => None,
    };
    let dead_letters = state.dlq.count().await.unwrap_or(0);

    let healthy = store_ok && broker.as_ref().map_or(true, |(_, ok)| *ok);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "store": { "backend": state.store.name(), "healthy": store_ok },
        "broker": broker.map(|(name, ok)| serde_json::json!({ "provider": name, "healthy": ok })),
        "dead_letters": dead_letters,
    });

    (status, Json(body))
}
