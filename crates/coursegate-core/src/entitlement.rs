//! Entitlements (a user's claim on a course) and their lifecycle.
//!
//! ```text
//! none ──begin──▶ pending ──confirm──▶ completed ──(time)──▶ expired
//!                    │
//!                    └──fail──▶ failed
//! ```
//!
//! `expired` is never stored. It is derived from the wall clock on every read
//! by [`EntitlementState::of`]. A failed attempt is terminal; retrying creates
//! a fresh row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::tier::Tier;

// ─── Stored status ───────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
  Pending,
  Completed,
  Failed,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str { self.into() }
}

// ─── Entitlement ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
  pub entitlement_id: Uuid,
  pub user_id:        Uuid,
  pub course_id:      Uuid,
  pub payment_status: PaymentStatus,
  /// Course price captured when the purchase began, in minor units.
  pub purchase_price: i64,
  pub expires_at:     Option<DateTime<Utc>>,
  /// Gateway-side reference, set by the confirmation callback.
  pub payment_ref:    Option<String>,
  pub created_at:     DateTime<Utc>,
  pub confirmed_at:   Option<DateTime<Utc>>,
}

impl Entitlement {
  /// Paid and not lapsed at `now`.
  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    self.payment_status == PaymentStatus::Completed
      && self.expires_at.is_none_or(|expiry| expiry > now)
  }

  pub fn state_at(&self, now: DateTime<Utc>) -> EntitlementState {
    match self.payment_status {
      PaymentStatus::Pending => EntitlementState::Pending,
      PaymentStatus::Failed => EntitlementState::Failed,
      PaymentStatus::Completed if self.is_valid_at(now) => {
        EntitlementState::Completed
      }
      PaymentStatus::Completed => EntitlementState::Expired,
    }
  }

  /// `true` if `self` stays valid at least as long as `other`. A missing
  /// expiry outlasts everything.
  fn outlasts(&self, other: &Self) -> bool {
    match (self.expires_at, other.expires_at) {
      (None, _) => true,
      (Some(_), None) => false,
      (Some(a), Some(b)) => a >= b,
    }
  }
}

/// Pick the row that speaks for a (user, course) pair.
///
/// Among completed rows, the one that lasts longest wins. Without a completed
/// row, the most recently created attempt wins.
pub fn authoritative<'a, I>(rows: I) -> Option<&'a Entitlement>
where
  I: IntoIterator<Item = &'a Entitlement>,
{
  let mut best_completed: Option<&Entitlement> = None;
  let mut latest: Option<&Entitlement> = None;

  for row in rows {
    if row.payment_status == PaymentStatus::Completed
      && best_completed.is_none_or(|best| row.outlasts(best))
    {
      best_completed = Some(row);
    }
    if latest.is_none_or(|l| row.created_at > l.created_at) {
      latest = Some(row);
    }
  }

  best_completed.or(latest)
}

// ─── Derived state ───────────────────────────────────────────────────────────

/// The lifecycle state of a (user, course) pair at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntitlementState {
  None,
  Pending,
  Completed,
  Expired,
  Failed,
}

impl EntitlementState {
  pub fn of(entitlement: Option<&Entitlement>, now: DateTime<Utc>) -> Self {
    entitlement.map_or(Self::None, |e| e.state_at(now))
  }

  pub fn grants_access(self) -> bool { matches!(self, Self::Completed) }
}

// ─── Transition result ───────────────────────────────────────────────────────

/// Outcome of a pending → completed confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
  pub entitlement:     Entitlement,
  /// `false` when the entitlement was already completed and this call was a
  /// duplicate; no side effects were applied.
  pub newly_completed: bool,
  /// Set when confirming raised the buyer's tier.
  pub upgraded_to:     Option<Tier>,
}
