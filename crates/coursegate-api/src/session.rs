//! Bearer-token sessions and the request extractors built on them.
//!
//! Tokens are random, URL-safe strings handed to the client once. The store
//! only ever sees their SHA-256 digest.

use axum::{
  extract::FromRequestParts,
  http::{header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use coursegate_core::{
  payment::PaymentGateway,
  profile::{Session, session_digest},
  store::LearningStore,
};
use rand_core::{OsRng, RngCore as _};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// A fresh 256-bit bearer token.
pub fn mint_token() -> String {
  let mut bytes = [0u8; 32];
  OsRng.fill_bytes(&mut bytes);
  URL_SAFE_NO_PAD.encode(bytes)
}

/// Create (or refresh) the user's profile and store a new session for it.
/// Returns the bearer token.
pub async fn issue_session<S: LearningStore>(
  store: &S,
  user_id: Uuid,
  email: String,
  ttl: Duration,
) -> Result<String, S::Error> {
  store.ensure_profile(user_id, email.clone()).await?;

  let token = mint_token();
  let session = Session {
    user_id,
    email,
    expires_at: Utc::now() + ttl,
  };
  store.store_session(session_digest(&token), session).await?;
  Ok(token)
}

fn bearer(parts: &Parts) -> Option<&str> {
  parts
    .headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

// ─── Viewer ───────────────────────────────────────────────────────────────────

/// Whoever is making the request. A missing, unknown or expired token yields
/// an anonymous viewer; only a store failure rejects the request.
#[derive(Debug, Clone)]
pub struct Viewer {
  session:  Option<Session>,
  is_admin: bool,
}

impl Viewer {
  pub fn anonymous() -> Self {
    Self { session: None, is_admin: false }
  }

  pub fn session(&self) -> Option<&Session> { self.session.as_ref() }

  pub fn user_id(&self) -> Option<Uuid> {
    self.session.as_ref().map(|s| s.user_id)
  }

  pub fn is_admin(&self) -> bool { self.is_admin }

  /// The session, or 401.
  pub fn require(self) -> Result<Session, ApiError> {
    self.session.ok_or(ApiError::Unauthorized)
  }
}

impl<S, G> FromRequestParts<AppState<S, G>> for Viewer
where
  S: LearningStore,
  G: PaymentGateway,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, G>,
  ) -> Result<Self, Self::Rejection> {
    let Some(token) = bearer(parts) else {
      return Ok(Self::anonymous());
    };

    let session = state
      .store
      .find_session(&session_digest(token))
      .await
      .map_err(ApiError::store)?;

    match session {
      Some(session) if session.is_live(Utc::now()) => {
        let is_admin = state.admins.is_admin(&session.email);
        Ok(Self { session: Some(session), is_admin })
      }
      Some(session) => {
        tracing::debug!(user_id = %session.user_id, "expired session");
        Ok(Self::anonymous())
      }
      None => Ok(Self::anonymous()),
    }
  }
}

// ─── Admin ────────────────────────────────────────────────────────────────────

/// Present in a handler means the caller is on the administrator allow-list.
pub struct Admin(pub Session);

impl<S, G> FromRequestParts<AppState<S, G>> for Admin
where
  S: LearningStore,
  G: PaymentGateway,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S, G>,
  ) -> Result<Self, Self::Rejection> {
    let viewer = Viewer::from_request_parts(parts, state).await?;
    let is_admin = viewer.is_admin();
    let session = viewer.require()?;
    if !is_admin {
      tracing::warn!(email = %session.email, "non-admin called an admin endpoint");
      return Err(ApiError::Forbidden("administrator access required".into()));
    }
    Ok(Admin(session))
  }
}
