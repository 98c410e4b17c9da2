//! HTTP route handlers.
//!
//! | Method | Path                              | Auth | Description                     |
//! |--------|-----------------------------------|------|---------------------------------|
//! | GET    | `/api/health`                     | No   | Liveness probe                  |
//! | GET    | `/api/panels`                     | Yes  | Session status of every panel   |
//! | GET    | `/api/panels/{id}/sms`            | Yes  | SMS log envelope                |
//! | GET    | `/api/panels/{id}/numbers`        | Yes  | Number inventory envelope       |
//! | POST   | `/api/panels/{id}/session/reset`  | Yes  | Force a fresh login             |
//! | GET    | `/{id}/sms`, `/{id}/numbers`      | Yes  | Short aliases                   |
//!
//! "Auth" only applies when `auth.api_key` is configured; see [`crate::auth`].

pub mod health;
pub mod panels;

use axum::{
    middleware,
    routing::{get, post},
    Extension, Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::{self, ApiKey};
use crate::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new().route("/api/health", get(health::health));

    let mut authed_routes = Router::new()
        .route("/api/panels", get(panels::list))
        .route("/api/panels/{id}/sms", get(panels::sms))
        .route("/api/panels/{id}/numbers", get(panels::numbers))
        .route("/api/panels/{id}/session/reset", post(panels::reset))
        .route("/{id}/sms", get(panels::sms))
        .route("/{id}/numbers", get(panels::numbers));
    if let Some(key) = state.config.auth.api_key.clone() {
        authed_routes = authed_routes
            .layer(middleware::from_fn(auth::require_api_key))
            .layer(Extension(ApiKey(key)));
    }

    Router::new()
        .merge(public_routes)
        .merge(authed_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::config::{Config, PanelConfig};
    use crate::panel::PanelProfile;
    use crate::registry::PanelRegistry;
    use crate::session::SessionClient;
    use crate::transport::mock::ScriptedTransport;
    use crate::transport::{PanelRequest, PanelResponse, Transport, TransportError};

    const LOGIN_PAGE: &str = "<html>What is 1 + 2 = ?</html>";
    const REPORTS_PAGE: &str = "<script>csstr=TOKEN1&a=b</script>";
    const SMS_BODY: &str = r#"{"sEcho":3,"iTotalRecords":1,"iTotalDisplayRecords":1,"aaData":[
        ["2026-03-01 10:00:00","Range A","923001234567","WhatsApp","u1","code 42","$","0.01","ok"]
    ]}"#;

    fn app<F>(api_key: Option<&str>, handler: F) -> Router
    where
        F: Fn(&PanelRequest) -> Result<PanelResponse, TransportError> + Send + Sync + 'static,
    {
        let cfg = PanelConfig {
            id: "mait".into(),
            base_url: "http://panel.test".into(),
            preset: Some("mait".into()),
            username: "u".into(),
            password: "p".into(),
            ..PanelConfig::default()
        };
        let profile = Arc::new(PanelProfile::from_config(&cfg).unwrap());
        let transport: Arc<dyn Transport> = Arc::new(ScriptedTransport::new(handler));
        let client = Arc::new(SessionClient::new(profile, transport));
        let mut config = Config::default();
        config.auth.api_key = api_key.map(String::from);
        let registry = PanelRegistry::new(vec![client]).unwrap();
        router(AppState::new(config, registry))
    }

    fn healthy_panel(req: &PanelRequest) -> Result<PanelResponse, TransportError> {
        Ok(if req.url.ends_with("/ints/login") {
            PanelResponse::ok(LOGIN_PAGE)
        } else if req.url.ends_with("SMSCDRReports") {
            PanelResponse::ok(REPORTS_PAGE)
        } else {
            PanelResponse::ok(SMS_BODY)
        })
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let resp = app(Some("k"), healthy_panel)
            .oneshot(get("/api/health"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["panels"], 1);
    }

    #[tokio::test]
    async fn test_api_key_required() {
        let app = app(Some("k"), healthy_panel);

        let resp = app.clone().oneshot(get("/api/panels")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/api/panels")
            .header("authorization", "Bearer wrong")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.clone().oneshot(req).await.unwrap().status(), StatusCode::FORBIDDEN);

        let req = Request::builder()
            .uri("/api/panels")
            .header("x-api-key", "k")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body[0]["panel"], "mait");
        assert_eq!(body[0]["phase"], "no_session");
    }

    #[tokio::test]
    async fn test_sms_report() {
        let resp = app(None, healthy_panel)
            .oneshot(get("/api/panels/mait/sms"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["iTotalRecords"], 1);
        assert_eq!(body["aaData"][0][4], "code 42");
        assert_eq!(body["aaData"][0].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_short_alias() {
        let resp = app(None, healthy_panel)
            .oneshot(get("/mait/numbers"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["aaData"][0].as_array().unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_unknown_panel() {
        let resp = app(None, healthy_panel)
            .oneshot(get("/api/panels/nope/sms"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = json_body(resp).await;
        assert_eq!(body["code"], "UNKNOWN_PANEL");
        assert_eq!(body["panel"], "nope");
    }

    #[tokio::test]
    async fn test_blocked_sets_retry_after() {
        let resp = app(None, |_| {
            Ok(PanelResponse {
                status: 403,
                body: "Forbidden".into(),
            })
        })
        .oneshot(get("/api/panels/mait/sms"))
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()[header::RETRY_AFTER], "60");
        let body = json_body(resp).await;
        assert_eq!(body["code"], "BLOCKED");
    }

    #[tokio::test]
    async fn test_session_expired_is_bad_gateway() {
        let resp = app(None, |req| {
            Ok(if req.url.ends_with("/ints/login") {
                PanelResponse::ok(LOGIN_PAGE)
            } else if req.url.ends_with("SMSCDRReports") {
                PanelResponse::ok(REPORTS_PAGE)
            } else {
                PanelResponse::ok("<html><body>login</body></html>")
            })
        })
        .oneshot(get("/api/panels/mait/sms"))
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(json_body(resp).await["code"], "SESSION_EXPIRED");
    }

    #[tokio::test]
    async fn test_raw_passthrough() {
        let resp = app(None, |req| {
            Ok(if req.url.ends_with("/ints/login") {
                PanelResponse::ok(LOGIN_PAGE)
            } else if req.url.ends_with("SMSCDRReports") {
                PanelResponse::ok(REPORTS_PAGE)
            } else {
                PanelResponse::ok("{\"broken\":")
            })
        })
        .oneshot(get("/api/panels/mait/sms"))
        .await
        .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"{\"broken\":");
    }

    #[tokio::test]
    async fn test_session_reset() {
        let req = Request::builder()
            .method("POST")
            .uri("/api/panels/mait/session/reset")
            .body(Body::empty())
            .unwrap();
        let resp = app(None, healthy_panel).oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["phase"], "no_session");
    }
}
