//! Outbound HTTP for panel sessions.
//!
//! [`Transport`] is the seam between the session state machine and the
//! network. [`HttpTransport`] is the production implementation: a
//! `reqwest::Client` with a cookie store that can be wiped when a session is
//! invalidated, which the stock `reqwest::cookie::Jar` cannot do.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::Url;

/// HTTP method of a [`PanelRequest`]. Panels only ever see these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A single request to a panel, independent of the HTTP library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelRequest {
    pub method: Method,
    pub url: String,
    /// Query-string pairs, encoded in order.
    pub query: Vec<(String, String)>,
    /// `application/x-www-form-urlencoded` body pairs (POST only).
    pub form: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl PanelRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            form: Vec::new(),
            headers: Vec::new(),
        }
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            method: Method::Post,
            form,
            ..Self::get(url)
        }
    }

    #[must_use]
    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First header value with the given name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First query value with the given key.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First form value with the given key.
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Status and body of a panel response. Bodies are small HTML pages or JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelResponse {
    pub status: u16,
    pub body: String,
}

impl PanelResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// A network-level failure: connect error, timeout, truncated body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self(format!("request timed out: {e}"))
        } else {
            Self(e.to_string())
        }
    }
}

/// Carries requests for one panel and owns that panel's cookies.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: PanelRequest) -> Result<PanelResponse, TransportError>;

    /// Drop every stored cookie.
    fn clear_cookies(&self);

    /// Whether any cookie would be sent to `url`.
    fn has_cookies(&self, url: &str) -> bool;
}

/// Cookie store whose contents can be replaced wholesale.
#[derive(Default)]
struct ResettableJar(RwLock<Jar>);

impl ResettableJar {
    fn reset(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Jar::default();
    }
}

impl CookieStore for ResettableJar {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.0
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cookies(url)
    }
}

/// [`Transport`] backed by `reqwest`, one instance per panel.
pub struct HttpTransport {
    http: reqwest::Client,
    cookies: Arc<ResettableJar>,
}

impl HttpTransport {
    /// Build a client whose every request is bounded by `timeout`.
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self, TransportError> {
        let cookies = Arc::new(ResettableJar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self { http, cookies })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: PanelRequest) -> Result<PanelResponse, TransportError> {
        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if !request.form.is_empty() {
            builder = builder.form(&request.form);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        Ok(PanelResponse { status, body })
    }

    fn clear_cookies(&self) {
        self.cookies.reset();
    }

    fn has_cookies(&self, url: &str) -> bool {
        Url::parse(url).is_ok_and(|u| self.cookies.cookies(&u).is_some())
    }
}

#[cfg(test)]
pub mod mock {
    //! Scripted in-memory transport for session tests.

    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::{Method, PanelRequest, PanelResponse, Transport, TransportError};

    type Handler = Box<dyn Fn(&PanelRequest) -> Result<PanelResponse, TransportError> + Send + Sync>;

    /// Answers every request through a handler closure and records it.
    ///
    /// A successful form POST sets a cookie, mimicking the panels' sign-in.
    pub struct ScriptedTransport {
        handler: Handler,
        latency: Duration,
        pub requests: Mutex<Vec<PanelRequest>>,
        pub cookie_set: AtomicBool,
        pub cookie_clears: AtomicUsize,
        pub cookies_on_signin: AtomicBool,
    }

    impl ScriptedTransport {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&PanelRequest) -> Result<PanelResponse, TransportError> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                latency: Duration::ZERO,
                requests: Mutex::new(Vec::new()),
                cookie_set: AtomicBool::new(false),
                cookie_clears: AtomicUsize::new(0),
                cookies_on_signin: AtomicBool::new(true),
            }
        }

        /// Serve `responses` in order; extra requests get a transport error.
        pub fn queue(responses: Vec<Result<PanelResponse, TransportError>>) -> Self {
            let queue = Mutex::new(std::collections::VecDeque::from(responses));
            Self::new(move |_| {
                queue
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(TransportError("script exhausted".into())))
            })
        }

        /// Sleep this long inside every `send`, so concurrent callers interleave.
        #[must_use]
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn urls(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.url.clone())
                .collect()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: PanelRequest) -> Result<PanelResponse, TransportError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            self.requests.lock().unwrap().push(request.clone());
            let result = (self.handler)(&request);
            if request.method == Method::Post
                && result.is_ok()
                && self.cookies_on_signin.load(Ordering::SeqCst)
            {
                self.cookie_set.store(true, Ordering::SeqCst);
            }
            result
        }

        fn clear_cookies(&self) {
            self.cookie_set.store(false, Ordering::SeqCst);
            self.cookie_clears.fetch_add(1, Ordering::SeqCst);
        }

        fn has_cookies(&self, _url: &str) -> bool {
            self.cookie_set.load(Ordering::SeqCst)
        }
    }
}
