//! Self-service tier upgrades.
//!
//! An upgrade is paid through the same gateway as a course purchase and walks
//! the same states: `pending` until the signed callback arrives, then
//! `completed` (tier raised exactly once) or `failed` (terminal, a retry
//! starts a new attempt).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, entitlement::PaymentStatus, tier::Tier};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierUpgrade {
  pub upgrade_id:     Uuid,
  pub user_id:        Uuid,
  /// The tier held when the attempt began.
  pub from_tier:      Tier,
  pub target_tier:    Tier,
  /// Price captured when the attempt began, in minor units.
  pub price:          i64,
  pub payment_status: PaymentStatus,
  pub payment_ref:    Option<String>,
  pub created_at:     DateTime<Utc>,
  pub confirmed_at:   Option<DateTime<Utc>>,
}

/// Outcome of a pending → completed upgrade confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeConfirmation {
  pub upgrade:         TierUpgrade,
  /// `false` for a duplicate callback; nothing was applied.
  pub newly_completed: bool,
  /// `None` when the holder already sat at or above the target tier.
  pub upgraded_to:     Option<Tier>,
}

/// What each paid tier costs. A tier without a price cannot be bought.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradePricing {
  #[serde(default)]
  pub basic:   Option<i64>,
  #[serde(default)]
  pub premium: Option<i64>,
}

impl UpgradePricing {
  pub fn price_for(&self, tier: Tier) -> Result<i64> {
    let price = match tier {
      Tier::Free => None,
      Tier::Basic => self.basic,
      Tier::Premium => self.premium,
    };
    match price {
      Some(p) if p >= 0 => Ok(p),
      Some(_) => Err(Error::InvalidInput(format!(
        "upgrade price for {tier} is negative"
      ))),
      None => Err(Error::InvalidInput(format!(
        "upgrades to {tier} are not offered"
      ))),
    }
  }
}
