#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::unused_async)]
#![allow(clippy::redundant_closure_for_method_calls)]

//! panelbridge library: long-lived authenticated sessions against SMS
//! reseller panels, exposed as a small JSON API.
//!
//! - `config` — TOML + environment configuration
//! - `panel` — presets, resolved per-panel profiles, date windows
//! - `scrape` — captcha, token and block detection on panel HTML
//! - `transport` — outbound HTTP seam with a clearable cookie jar
//! - `session` — the per-panel session state machine
//! - `normalize` — DataTables envelope and row remapping
//! - `registry` — one session client per configured panel
//! - `routes` / `auth` / `state` — the axum server

pub mod auth;
pub mod config;
pub mod error;
pub mod normalize;
pub mod panel;
pub mod registry;
pub mod routes;
pub mod scrape;
pub mod session;
pub mod state;
pub mod transport;

// Re-export key types at crate root for convenience.
pub use auth::ApiKey;
pub use config::Config;
pub use error::{AuthError, PanelError};
pub use registry::PanelRegistry;
pub use session::{Report, SessionClient};
pub use state::AppState;
