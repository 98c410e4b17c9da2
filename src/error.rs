//! Error taxonomy for panel sessions.
//!
//! [`PanelError`] is what every [`crate::session::SessionClient`] operation
//! returns. Login failures are grouped under [`AuthError`] so callers can tell
//! "could not sign in" apart from "signed in, but the query kept bouncing".

use std::time::Duration;

use axum::http::StatusCode;

/// Failure while establishing a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The login page did not contain the "What is A + B = ?" prompt.
    CaptchaParse,
    /// Signed in, but no token pattern matched on the reports page.
    TokenNotFound,
    /// Cookie-only panel: sign-in returned without setting any cookie.
    NoCookies,
    /// A network failure during one of the login requests.
    Transport(String),
}

impl AuthError {
    /// Stable machine-readable code used in HTTP error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CaptchaParse => "CAPTCHA_PARSE",
            Self::TokenNotFound => "TOKEN_NOT_FOUND",
            Self::NoCookies => "NO_COOKIES",
            Self::Transport(_) => "AUTH_TRANSPORT",
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CaptchaParse => write!(f, "captcha prompt not found on login page"),
            Self::TokenNotFound => write!(f, "session token not found on reports page"),
            Self::NoCookies => write!(f, "sign-in returned no session cookies"),
            Self::Transport(e) => write!(f, "login request failed: {e}"),
        }
    }
}

impl std::error::Error for AuthError {}

/// Errors returned by panel queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelError {
    /// The login sequence failed.
    Auth(AuthError),
    /// The panel denied us at the firewall layer; back off for `retry_in`.
    Blocked { retry_in: Duration },
    /// The query returned the login page again after a fresh login.
    SessionExpired,
    /// Network failure or timeout on the query itself.
    Transport(String),
    /// The query body was not a DataTables envelope and passthrough is off.
    Decode(String),
}

impl PanelError {
    /// Stable machine-readable code used in HTTP error bodies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.code(),
            Self::Blocked { .. } => "BLOCKED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Transport(_) => "TRANSPORT",
            Self::Decode(_) => "DECODE",
        }
    }

    /// HTTP status the bridge answers with when this error reaches a handler.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Blocked { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Transport(msg) if msg.contains("timed out") => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::BAD_GATEWAY,
        }
    }

    /// Whether clearing the session and trying once more could help.
    ///
    /// A block is the one failure that must not be retried immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::Blocked { .. } | Self::Decode(_))
    }
}

impl std::fmt::Display for PanelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(e) => write!(f, "authentication failed: {e}"),
            Self::Blocked { retry_in } => {
                write!(f, "blocked by panel, retry in {}s", retry_in.as_secs())
            }
            Self::SessionExpired => write!(f, "session expired after re-login"),
            Self::Transport(e) => write!(f, "request failed: {e}"),
            Self::Decode(e) => write!(f, "unexpected response body: {e}"),
        }
    }
}

impl std::error::Error for PanelError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Auth(e) => Some(e),
            _ => None,
        }
    }
}

impl From<AuthError> for PanelError {
    fn from(e: AuthError) -> Self {
        Self::Auth(e)
    }
}
