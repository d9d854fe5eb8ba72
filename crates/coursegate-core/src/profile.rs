//! User profiles and the sessions that identify them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::tier::Tier;

/// Per-user record read by the access evaluator. Only administrative tier
/// changes and purchase confirmation mutate it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
  pub user_id:           Uuid,
  pub email:             String,
  pub subscription_tier: Tier,
  pub created_at:        DateTime<Utc>,
  pub updated_at:        DateTime<Utc>,
}

/// An authenticated session. The bearer token itself is never stored; see
/// [`session_digest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
  pub user_id:    Uuid,
  pub email:      String,
  pub expires_at: DateTime<Utc>,
}

impl Session {
  pub fn is_live(&self, now: DateTime<Utc>) -> bool { self.expires_at > now }
}

/// Lookup key for a bearer token: hex SHA-256 of the token bytes.
pub fn session_digest(token: &str) -> String {
  hex::encode(Sha256::digest(token.as_bytes()))
}
