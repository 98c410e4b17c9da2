//! Long-lived authenticated session against one panel.
//!
//! [`SessionClient`] owns the panel's transport (and therefore its cookie
//! jar), the cached session token and a single async lock. Every public
//! operation takes the lock for its whole duration, network calls included,
//! so a login and a query never interleave on the same panel and concurrent
//! callers share one login.
//!
//! ## States
//!
//! - `NoSession`: no token. The next call logs in.
//! - `Authenticating`: a login is in flight (inside the lock).
//! - `Active`: a token (or a cookie-only session) is cached.
//! - `CoolingDown`: the panel blocked us; calls fail fast until the deadline.
//!
//! A query that comes back as an HTML page means the panel dropped the
//! session. The token and cookies are cleared and the query is retried once
//! with a fresh login.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{AuthError, PanelError};
use crate::normalize::{self, Envelope};
use crate::panel::profile::{OnMissingToken, PanelProfile, ReportSpec, MAX_COOLDOWN_SECS};
use crate::scrape;
use crate::transport::{HttpTransport, PanelRequest, Transport, TransportError};

const MAX_ATTEMPTS: u32 = 2;

const PHASE_NO_SESSION: u8 = 0;
const PHASE_AUTHENTICATING: u8 = 1;
const PHASE_ACTIVE: u8 = 2;

/// Proof of an authenticated session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionToken {
    /// Sent back as the profile's token query parameter.
    Key(String),
    /// The session lives in the cookie jar alone.
    CookiesOnly,
}

/// Result of a report query.
#[derive(Debug, Clone, PartialEq)]
pub enum Report {
    /// Decoded and remapped to the bridge's schema.
    Normalized(Envelope),
    /// The panel's body, verbatim, because it was not a DataTables envelope.
    Raw(String),
}

/// Coarse session state, as reported by [`SessionClient::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NoSession,
    Authenticating,
    Active,
    CoolingDown,
}

/// Point-in-time view of a client, safe to take while it is busy.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub panel: String,
    pub phase: SessionPhase,
    /// An operation currently holds the client lock.
    pub busy: bool,
    pub session_age_secs: Option<u64>,
    pub cooldown_remaining_secs: Option<u64>,
    pub logins_total: u64,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct SessionMeta {
    established_at: Option<Instant>,
    blocked_until: Option<Instant>,
    last_error: Option<String>,
}

/// One panel's session, shared by every request for that panel.
pub struct SessionClient {
    profile: Arc<PanelProfile>,
    transport: Arc<dyn Transport>,
    /// Cached token. Held across whole operations.
    session: Mutex<Option<SessionToken>>,
    /// Bookkeeping read by `status()` without touching `session`.
    meta: std::sync::Mutex<SessionMeta>,
    phase: AtomicU8,
    logins_total: AtomicU64,
}

/// First four characters of a token, for logs.
fn token_prefix(token: &str) -> &str {
    token.char_indices().nth(4).map_or(token, |(i, _)| &token[..i])
}

fn login_transport(e: TransportError) -> PanelError {
    PanelError::Auth(AuthError::Transport(e.0))
}

impl SessionClient {
    pub fn new(profile: Arc<PanelProfile>, transport: Arc<dyn Transport>) -> Self {
        Self {
            profile,
            transport,
            session: Mutex::new(None),
            meta: std::sync::Mutex::new(SessionMeta::default()),
            phase: AtomicU8::new(PHASE_NO_SESSION),
            logins_total: AtomicU64::new(0),
        }
    }

    /// Build a client with its own [`HttpTransport`].
    pub fn from_profile(
        profile: Arc<PanelProfile>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let transport = HttpTransport::new(timeout, connect_timeout)?;
        Ok(Self::new(profile, Arc::new(transport)))
    }

    pub fn id(&self) -> &str {
        &self.profile.id
    }

    /// Return the cached session, logging in first if there is none.
    pub async fn ensure_session(&self) -> Result<SessionToken, PanelError> {
        let mut slot = self.session.lock().await;
        let result = self.ensure_locked(&mut slot).await;
        if let Err(e) = &result {
            self.record_error(e);
        }
        result
    }

    /// Fetch the SMS log, normalized to the bridge's message schema.
    pub async fn fetch_message_log(&self) -> Result<Report, PanelError> {
        self.fetch(&self.profile.sms, normalize::normalize_messages)
            .await
    }

    /// Fetch the full number inventory, normalized to the bridge's number schema.
    pub async fn fetch_number_inventory(&self) -> Result<Report, PanelError> {
        self.fetch(&self.profile.numbers, normalize::normalize_inventory)
            .await
    }

    /// Drop the session so the next call logs in again. Any cooldown stays.
    pub async fn reset(&self) {
        let mut slot = self.session.lock().await;
        self.clear_locked(&mut slot);
        info!(panel = %self.profile.id, "session reset");
    }

    /// Snapshot of the client's state. Never waits on the client lock.
    pub fn status(&self) -> SessionStatus {
        let now = Instant::now();
        let meta = self.meta.lock().unwrap_or_else(PoisonError::into_inner);
        let cooldown = meta
            .blocked_until
            .and_then(|until| until.checked_duration_since(now))
            .filter(|d| !d.is_zero());
        let phase = if cooldown.is_some() {
            SessionPhase::CoolingDown
        } else {
            match self.phase.load(Ordering::SeqCst) {
                PHASE_AUTHENTICATING => SessionPhase::Authenticating,
                PHASE_ACTIVE => SessionPhase::Active,
                _ => SessionPhase::NoSession,
            }
        };
        SessionStatus {
            panel: self.profile.id.clone(),
            phase,
            busy: self.session.try_lock().is_err(),
            session_age_secs: meta
                .established_at
                .map(|t| now.saturating_duration_since(t).as_secs()),
            cooldown_remaining_secs: cooldown.map(|d| d.as_secs().max(1)),
            logins_total: self.logins_total.load(Ordering::SeqCst),
            last_error: meta.last_error.clone(),
        }
    }

    /// The cached token value, if the session holds one.
    pub async fn token(&self) -> Option<String> {
        match &*self.session.lock().await {
            Some(SessionToken::Key(k)) => Some(k.clone()),
            _ => None,
        }
    }

    fn meta(&self) -> std::sync::MutexGuard<'_, SessionMeta> {
        self.meta.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_error(&self, e: &PanelError) {
        self.meta().last_error = Some(e.to_string());
    }

    fn cooldown_remaining(&self) -> Option<Duration> {
        self.meta()
            .blocked_until
            .and_then(|until| until.checked_duration_since(Instant::now()))
            .filter(|d| !d.is_zero())
    }

    fn start_cooldown(&self) -> PanelError {
        let cap = Duration::from_secs(MAX_COOLDOWN_SECS);
        let cooldown = self.profile.cooldown.min(cap);
        let now = Instant::now();
        let deadline = now.checked_add(cooldown).unwrap_or(now);
        self.meta().blocked_until = Some(deadline);
        warn!(
            panel = %self.profile.id,
            cooldown_secs = cooldown.as_secs(),
            "panel blocked login, cooling down"
        );
        PanelError::Blocked { retry_in: cooldown }
    }

    /// Forget the token and cookies. Caller holds the session lock.
    fn clear_locked(&self, slot: &mut Option<SessionToken>) {
        *slot = None;
        self.transport.clear_cookies();
        self.phase.store(PHASE_NO_SESSION, Ordering::SeqCst);
        self.meta().established_at = None;
    }

    async fn ensure_locked(
        &self,
        slot: &mut Option<SessionToken>,
    ) -> Result<SessionToken, PanelError> {
        if let Some(retry_in) = self.cooldown_remaining() {
            debug!(panel = %self.profile.id, "in cooldown, skipping login");
            return Err(PanelError::Blocked { retry_in });
        }
        match slot {
            Some(SessionToken::Key(k)) => return Ok(SessionToken::Key(k.clone())),
            Some(SessionToken::CookiesOnly) => {
                if self.transport.has_cookies(&self.profile.base_url) {
                    return Ok(SessionToken::CookiesOnly);
                }
                debug!(panel = %self.profile.id, "cookies gone, logging in again");
                self.clear_locked(slot);
            }
            None => {}
        }

        self.phase.store(PHASE_AUTHENTICATING, Ordering::SeqCst);
        self.logins_total.fetch_add(1, Ordering::SeqCst);
        match self.login().await {
            Ok(token) => {
                self.phase.store(PHASE_ACTIVE, Ordering::SeqCst);
                let mut meta = self.meta();
                meta.established_at = Some(Instant::now());
                meta.last_error = None;
                drop(meta);
                *slot = Some(token.clone());
                Ok(token)
            }
            Err(e) => {
                self.phase.store(PHASE_NO_SESSION, Ordering::SeqCst);
                warn!(panel = %self.profile.id, error = %e, "login failed");
                Err(e)
            }
        }
    }

    fn browser_request(&self, request: PanelRequest) -> PanelRequest {
        let mut request = request.header("User-Agent", self.profile.user_agent.as_str());
        for (name, value) in &self.profile.headers {
            request = request.header(name, value.as_str());
        }
        request
    }

    async fn login(&self) -> Result<SessionToken, PanelError> {
        let p = &*self.profile;
        info!(panel = %p.id, "logging in");

        debug!(panel = %p.id, url = %p.login_url, "fetching login page");
        let page = self
            .transport
            .send(self.browser_request(PanelRequest::get(&p.login_url)))
            .await
            .map_err(login_transport)?;
        if scrape::is_blocked(page.status, &page.body, &p.block_markers) {
            return Err(self.start_cooldown());
        }
        let answer = scrape::solve_captcha(&page.body).ok_or(AuthError::CaptchaParse)?;
        info!(panel = %p.id, answer, "captcha solved");

        let form = vec![
            ("username".to_string(), p.credentials.username.clone()),
            ("password".to_string(), p.credentials.password.clone()),
            ("capt".to_string(), answer.to_string()),
        ];
        let mut signin = self
            .browser_request(PanelRequest::post_form(&p.signin_url, form))
            .header("Referer", p.login_url.as_str());
        if p.send_origin {
            signin = signin.header("Origin", p.base_url.as_str());
        }
        debug!(panel = %p.id, url = %p.signin_url, "submitting credentials");
        self.transport.send(signin).await.map_err(login_transport)?;

        if p.token.cookies_only {
            if self.transport.has_cookies(&p.base_url) {
                info!(panel = %p.id, "signed in, cookie session");
                return Ok(SessionToken::CookiesOnly);
            }
            return Err(AuthError::NoCookies.into());
        }

        let Some(reports_url) = p.reports_url.as_deref() else {
            return Err(AuthError::TokenNotFound.into());
        };
        let mut reports = self.browser_request(PanelRequest::get(reports_url));
        if let Some(referer) = &p.reports_referer {
            reports = reports.header("Referer", referer.as_str());
        }
        debug!(panel = %p.id, url = %reports_url, "fetching reports page");
        let page = self
            .transport
            .send(reports)
            .await
            .map_err(login_transport)?;

        match scrape::extract_token(&page.body, &p.token.patterns) {
            Some(token) => {
                info!(panel = %p.id, token_prefix = token_prefix(&token), "signed in");
                Ok(SessionToken::Key(token))
            }
            None if p.token.on_missing == OnMissingToken::Cookies => {
                warn!(panel = %p.id, "no session token on reports page, using cookies alone");
                Ok(SessionToken::CookiesOnly)
            }
            None => Err(AuthError::TokenNotFound.into()),
        }
    }

    async fn fetch<L>(
        &self,
        report: &ReportSpec<L>,
        normalize: fn(Envelope, &L) -> Envelope,
    ) -> Result<Report, PanelError> {
        let mut slot = self.session.lock().await;
        let mut attempt = 1;
        let body = loop {
            match self.query_once(&mut slot, report).await {
                Ok(body) => break body,
                Err(e) if !e.is_retryable() || attempt >= MAX_ATTEMPTS => {
                    if e == PanelError::SessionExpired {
                        self.clear_locked(&mut slot);
                    }
                    self.record_error(&e);
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        panel = %self.profile.id,
                        attempt,
                        error = %e,
                        "query failed, clearing session and retrying"
                    );
                    self.clear_locked(&mut slot);
                    attempt += 1;
                }
            }
        };
        drop(slot);

        match Envelope::parse(&body) {
            Ok(envelope) => {
                let rows_in = envelope.aa_data.len();
                let out = normalize(envelope, &report.layout);
                debug!(
                    panel = %self.profile.id,
                    rows_in,
                    rows_out = out.aa_data.len(),
                    "report normalized"
                );
                Ok(Report::Normalized(out))
            }
            Err(e) if self.profile.passthrough_undecodable => {
                warn!(panel = %self.profile.id, error = %e, "undecodable report, passing through");
                Ok(Report::Raw(body))
            }
            Err(e) => {
                let err = PanelError::Decode(e.to_string());
                self.record_error(&err);
                Err(err)
            }
        }
    }

    async fn query_once<L>(
        &self,
        slot: &mut Option<SessionToken>,
        report: &ReportSpec<L>,
    ) -> Result<String, PanelError> {
        let token = self.ensure_locked(slot).await?;
        let p = &*self.profile;

        let key = match &token {
            SessionToken::Key(k) if report.query.send_token => Some((p.token.param.as_str(), k.as_str())),
            _ => None,
        };
        let params = report.query.params(report.query.window.bounds(), key);
        let mut request = self
            .browser_request(PanelRequest::get(&report.url).with_query(params))
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(referer) = &report.referer {
            request = request.header("Referer", referer.as_str());
        }
        if p.send_origin {
            request = request.header("Origin", p.base_url.as_str());
        }

        debug!(panel = %p.id, url = %report.url, "querying report");
        let resp = self
            .transport
            .send(request)
            .await
            .map_err(|e| PanelError::Transport(e.0))?;
        if scrape::looks_like_html(&resp.body) {
            debug!(panel = %p.id, status = resp.status, "query returned an HTML page");
            return Err(PanelError::SessionExpired);
        }
        Ok(resp.body)
    }
}
