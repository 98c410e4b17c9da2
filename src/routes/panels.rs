//! Panel report and session endpoints.
//!
//! - `GET  /api/panels`                    — status of every panel session
//! - `GET  /api/panels/{id}/sms`           — SMS log envelope
//! - `GET  /api/panels/{id}/numbers`       — number inventory envelope
//! - `POST /api/panels/{id}/session/reset` — drop the session; next call logs in
//!
//! Reports come back as the DataTables envelope the panels use. When a panel
//! answers with something that is not an envelope, its body is relayed as-is.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

use crate::error::PanelError;
use crate::session::{Report, SessionClient, SessionStatus};
use crate::AppState;

#[derive(Clone, Copy)]
enum ReportKind {
    Sms,
    Numbers,
}

impl ReportKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Numbers => "numbers",
        }
    }
}

/// `GET /api/panels`
pub async fn list(State(state): State<AppState>) -> Json<Vec<SessionStatus>> {
    Json(state.panels.iter().map(|c| c.status()).collect())
}

/// `GET /api/panels/{id}/sms`
pub async fn sms(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    report(&state, &id, ReportKind::Sms).await
}

/// `GET /api/panels/{id}/numbers`
pub async fn numbers(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    report(&state, &id, ReportKind::Numbers).await
}

/// `POST /api/panels/{id}/session/reset`
pub async fn reset(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(client) = state.panels.get(&id) else {
        return unknown_panel(&id);
    };
    client.reset().await;
    Json(client.status()).into_response()
}

async fn report(state: &AppState, id: &str, kind: ReportKind) -> Response {
    let Some(client) = state.panels.get(id) else {
        return unknown_panel(id);
    };
    match fetch(client, kind).await {
        Ok(Report::Normalized(envelope)) => Json(envelope).into_response(),
        Ok(Report::Raw(body)) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => {
            warn!(panel = %id, report = kind.as_str(), code = e.code(), error = %e, "report failed");
            error_response(id, &e)
        }
    }
}

async fn fetch(client: &SessionClient, kind: ReportKind) -> Result<Report, PanelError> {
    match kind {
        ReportKind::Sms => client.fetch_message_log().await,
        ReportKind::Numbers => client.fetch_number_inventory().await,
    }
}

fn unknown_panel(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("no panel named {id:?}"), "code": "UNKNOWN_PANEL", "panel": id})),
    )
        .into_response()
}

/// `{error, code, panel}` with the error's status; blocks carry `Retry-After`.
fn error_response(id: &str, err: &PanelError) -> Response {
    let mut resp = (
        err.status(),
        Json(json!({"error": err.to_string(), "code": err.code(), "panel": id})),
    )
        .into_response();
    if let PanelError::Blocked { retry_in } = err {
        resp.headers_mut().insert(
            header::RETRY_AFTER,
            HeaderValue::from(retry_in.as_secs().max(1)),
        );
    }
    resp
}
