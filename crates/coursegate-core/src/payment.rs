//! Payment gateway contract and confirmation-callback verification.
//!
//! The gateway is an external collaborator. This module only fixes the shape
//! of the two exchanges with it: creating a payment link, and verifying the
//! signed callback that reports the outcome.

use std::future::Future;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

// ─── Payment links ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLinkRequest {
  /// Minor currency units.
  pub amount:     i64,
  pub email:      String,
  /// The pending entitlement or tier-upgrade id; the gateway echoes it back
  /// in the callback.
  pub product_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentLink {
  pub success:          bool,
  #[serde(default)]
  pub payment_link_url: Option<String>,
}

/// Creates hosted payment links. One call per purchase attempt, no retries.
pub trait PaymentGateway: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn create_payment_link<'a>(
    &'a self,
    request: &'a PaymentLinkRequest,
  ) -> impl Future<Output = Result<PaymentLink, Self::Error>> + Send + 'a;
}

// ─── Confirmation callback ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
  Completed,
  Failed,
}

impl ConfirmationStatus {
  fn as_str(self) -> &'static str {
    match self {
      Self::Completed => "completed",
      Self::Failed => "failed",
    }
  }
}

/// Body of the gateway's outcome callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
  /// The pending entitlement or tier upgrade the link was created for.
  #[serde(alias = "entitlement_id")]
  pub attempt_id:  Uuid,
  pub payment_ref: String,
  pub amount:      i64,
  pub status:      ConfirmationStatus,
  /// Hex HMAC-SHA256 of [`PaymentConfirmation::signing_payload`].
  #[serde(default)]
  pub signature:   String,
}

impl PaymentConfirmation {
  /// `"{attempt_id}|{payment_ref}|{amount}|{status}"`
  pub fn signing_payload(&self) -> String {
    format!(
      "{}|{}|{}|{}",
      self.attempt_id,
      self.payment_ref,
      self.amount,
      self.status.as_str()
    )
  }

  fn mac(&self, secret: &[u8]) -> Result<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| {
      Error::PaymentVerificationMismatch("unusable webhook secret".into())
    })?;
    mac.update(self.signing_payload().as_bytes());
    Ok(mac)
  }

  /// Compute the signature the gateway is expected to send.
  pub fn sign(&self, secret: &[u8]) -> Result<String> {
    Ok(hex::encode(self.mac(secret)?.finalize().into_bytes()))
  }

  /// Populate `signature` in place. Used by gateway simulators and tests.
  pub fn signed(mut self, secret: &[u8]) -> Result<Self> {
    self.signature = self.sign(secret)?;
    Ok(self)
  }

  /// Check the signature (constant time) and that the reported amount is the
  /// price captured when the attempt began.
  pub fn verify(&self, secret: &[u8], expected_amount: i64) -> Result<()> {
    let provided = hex::decode(self.signature.trim()).map_err(|_| {
      Error::PaymentVerificationMismatch("signature is not hex".into())
    })?;
    self.mac(secret)?.verify_slice(&provided).map_err(|_| {
      Error::PaymentVerificationMismatch("signature does not match".into())
    })?;
    if self.amount != expected_amount {
      return Err(Error::PaymentVerificationMismatch(format!(
        "amount {} does not match purchase price {expected_amount}",
        self.amount
      )));
    }
    Ok(())
  }
}
