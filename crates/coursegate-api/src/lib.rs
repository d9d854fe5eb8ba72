//! JSON HTTP API for Coursegate.
//!
//! Exposes an axum [`Router`] backed by any [`LearningStore`] and
//! [`PaymentGateway`]. Sessions are bearer tokens issued by the `coursegate`
//! binary; TLS is the caller's responsibility.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/me`, `/me/activity` | session required |
//! | `GET`  | `/courses`, `/courses/{id}` | inactive courses only for admins |
//! | `GET`  | `/courses/{id}/modules`, `/courses/{id}/downloads` | |
//! | `GET`  | `/courses/{id}/access` | fails closed without a session |
//! | `GET`  | `/courses/{id}/progress[/stream]` | session required |
//! | `POST` | `/courses/{id}/purchase` | begins a purchase, returns a payment link |
//! | `POST` | `/modules/{id}/access`, `/modules/{id}/complete` | module access required |
//! | `POST` | `/payments/confirm` | signed gateway callback |
//! | `POST` | `/me/upgrade` | begins a tier upgrade, returns a payment link |
//! | `POST` | `/payments/upgrades/confirm` | signed gateway callback for upgrades |
//! | `*`    | `/admin/...` | administrator allow-list |

pub mod admin;
pub mod courses;
pub mod error;
pub mod gateway;
pub mod me;
pub mod payments;
pub mod progress;
pub mod session;
pub mod watch;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use coursegate_core::{
  access::PurchasePolicy, admin::AdminPolicy, payment::PaymentGateway,
  store::LearningStore, upgrade::UpgradePricing,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `COURSEGATE_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                String,
  pub port:                u16,
  pub store_path:          PathBuf,
  #[serde(default)]
  pub admin_emails:        Vec<String>,
  #[serde(default)]
  pub purchase_policy:     PurchasePolicy,
  #[serde(default = "default_session_ttl_hours")]
  pub session_ttl_hours:   u32,
  #[serde(default = "default_watch_interval_secs")]
  pub watch_interval_secs: u64,
  /// Tiers without a price here cannot be bought through `/me/upgrade`.
  #[serde(default)]
  pub upgrade_prices:      UpgradePricing,
  pub payment:             PaymentSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentSettings {
  /// Endpoint that creates hosted payment links.
  pub link_endpoint:  String,
  /// Shared secret for the HMAC on confirmation callbacks.
  pub webhook_secret: String,
}

fn default_session_ttl_hours() -> u32 { 24 * 7 }

fn default_watch_interval_secs() -> u64 { 5 }

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, G> {
  pub store:   Arc<S>,
  pub gateway: Arc<G>,
  pub config:  Arc<ServerConfig>,
  pub admins:  Arc<AdminPolicy>,
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      gateway: self.gateway.clone(),
      config:  self.config.clone(),
      admins:  self.admins.clone(),
    }
  }
}

impl<S, G> AppState<S, G> {
  pub fn new(store: S, gateway: G, config: ServerConfig) -> Self {
    let admins = AdminPolicy::from_emails(&config.admin_emails);
    Self {
      store:   Arc::new(store),
      gateway: Arc::new(gateway),
      config:  Arc::new(config),
      admins:  Arc::new(admins),
    }
  }

  pub fn webhook_secret(&self) -> &[u8] {
    self.config.payment.webhook_secret.as_bytes()
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full API router for `state`.
pub fn router<S, G>(state: AppState<S, G>) -> Router
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  Router::new()
    // Session
    .route("/me", get(me::profile::<S, G>))
    .route("/me/activity", get(me::activity::<S, G>))
    // Catalogue & decisions
    .route("/courses", get(courses::list::<S, G>))
    .route("/courses/{id}", get(courses::get_one::<S, G>))
    .route("/courses/{id}/modules", get(courses::modules::<S, G>))
    .route("/courses/{id}/downloads", get(courses::downloads::<S, G>))
    .route("/courses/{id}/access", get(courses::access::<S, G>))
    // Progress
    .route("/courses/{id}/progress", get(progress::course::<S, G>))
    .route("/courses/{id}/progress/stream", get(progress::stream::<S, G>))
    .route("/modules/{id}/access", post(progress::access::<S, G>))
    .route("/modules/{id}/complete", post(progress::complete::<S, G>))
    // Purchases
    .route("/courses/{id}/purchase", post(payments::purchase::<S, G>))
    .route("/payments/confirm", post(payments::confirm::<S, G>))
    .route("/me/upgrade", post(payments::upgrade::<S, G>))
    .route(
      "/payments/upgrades/confirm",
      post(payments::confirm_upgrade::<S, G>),
    )
    // Administration
    .route("/admin/courses", post(admin::create_course::<S, G>))
    .route(
      "/admin/courses/{id}",
      put(admin::update_course::<S, G>).delete(admin::delete_course::<S, G>),
    )
    .route("/admin/courses/{id}/active", put(admin::set_active::<S, G>))
    .route("/admin/courses/{id}/modules", post(admin::add_module::<S, G>))
    .route("/admin/courses/{id}/downloads", post(admin::add_download::<S, G>))
    .route(
      "/admin/modules/{id}",
      put(admin::update_module::<S, G>).delete(admin::delete_module::<S, G>),
    )
    .route(
      "/admin/downloads/{id}",
      axum::routing::delete(admin::delete_download::<S, G>),
    )
    .route("/admin/profiles", get(admin::list_profiles::<S, G>))
    .route("/admin/profiles/{id}/tier", put(admin::set_tier::<S, G>))
    .route("/admin/stats", get(admin::stats::<S, G>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

#[cfg(test)]
mod tests;
