//! Purchases, tier upgrades, and the gateway's confirmation callbacks.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/courses/{id}/purchase` | 201 with a payment link; 409 if already entitled |
//! | `POST` | `/payments/confirm` | body: signed [`PaymentConfirmation`] |
//! | `POST` | `/me/upgrade` | body: `{ "tier": "premium" }`; 201 with a payment link |
//! | `POST` | `/payments/upgrades/confirm` | body: signed [`PaymentConfirmation`] |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use coursegate_core::{
  Tier,
  entitlement::{Confirmation, Entitlement},
  payment::{ConfirmationStatus, PaymentConfirmation, PaymentGateway, PaymentLinkRequest},
  store::LearningStore,
  upgrade::{TierUpgrade, UpgradeConfirmation},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, courses::visible_snapshot, error::ApiError, session::Viewer};

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
  pub entitlement:      Entitlement,
  pub payment_link_url: String,
}

#[derive(Debug, Deserialize)]
pub struct UpgradeRequest {
  pub tier: Tier,
}

#[derive(Debug, Serialize)]
pub struct UpgradeResponse {
  pub upgrade:          TierUpgrade,
  pub payment_link_url: String,
}

/// Ask the gateway for a link paying `amount` against `attempt_id`.
async fn payment_link<G: PaymentGateway>(
  gateway: &G,
  attempt_id: Uuid,
  amount: i64,
  email: &str,
) -> Result<String, ApiError> {
  let request = PaymentLinkRequest {
    amount,
    email: email.to_owned(),
    product_id: attempt_id.to_string(),
  };
  let link = gateway.create_payment_link(&request).await.map_err(|e| {
    tracing::warn!(%attempt_id, error = %e, "payment link request failed");
    ApiError::BadGateway(e.to_string())
  })?;

  match link.payment_link_url {
    Some(url) if link.success => Ok(url),
    _ => Err(ApiError::BadGateway(
      "gateway did not return a payment link".into(),
    )),
  }
}

/// `POST /courses/{id}/purchase`
///
/// Creates (or reuses) the pending entitlement and asks the gateway for a
/// payment link. A gateway failure leaves the pending row in place.
pub async fn purchase<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<impl IntoResponse, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  viewer.user_id().ok_or(ApiError::Unauthorized)?;
  let snapshot = visible_snapshot(&state, &viewer, id).await?;
  let session = viewer.require()?;

  if snapshot.course_access() {
    return Err(
      coursegate_core::Error::AlreadyEntitled {
        user_id:   session.user_id,
        course_id: id,
      }
      .into(),
    );
  }
  if !snapshot.can_purchase(state.config.purchase_policy) {
    return Err(
      coursegate_core::Error::UpgradeRequired {
        required: snapshot.course.required_tier,
      }
      .into(),
    );
  }

  let entitlement = state
    .store
    .begin_purchase(session.user_id, id)
    .await
    .map_err(ApiError::store)?;

  let payment_link_url = payment_link(
    state.gateway.as_ref(),
    entitlement.entitlement_id,
    entitlement.purchase_price,
    &session.email,
  )
  .await?;

  Ok((
    StatusCode::CREATED,
    Json(PurchaseResponse { entitlement, payment_link_url }),
  ))
}

/// `POST /payments/confirm`
///
/// Verifies the callback signature and amount before touching the
/// entitlement. A mismatch is answered with 400 and changes nothing.
pub async fn confirm<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<PaymentConfirmation>,
) -> Result<Json<Confirmation>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let entitlement = state
    .store
    .get_entitlement(body.attempt_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("entitlement {} not found", body.attempt_id))
    })?;

  if let Err(e) = body.verify(state.webhook_secret(), entitlement.purchase_price) {
    tracing::warn!(
      entitlement_id = %body.attempt_id,
      payment_ref = %body.payment_ref,
      error = %e,
      "payment confirmation rejected"
    );
    return Err(e.into());
  }

  let confirmation = match body.status {
    ConfirmationStatus::Completed => state
      .store
      .confirm_entitlement(body.attempt_id, body.payment_ref)
      .await
      .map_err(ApiError::store)?,
    ConfirmationStatus::Failed => {
      let entitlement = state
        .store
        .fail_entitlement(body.attempt_id, body.payment_ref)
        .await
        .map_err(ApiError::store)?;
      Confirmation {
        entitlement,
        newly_completed: false,
        upgraded_to: None,
      }
    }
  };
  Ok(Json(confirmation))
}

/// `POST /me/upgrade`
///
/// Prices the requested tier from config, opens (or reuses) the pending
/// upgrade, and asks the gateway for a payment link.
pub async fn upgrade<S, G>(
  State(state): State<AppState<S, G>>,
  viewer: Viewer,
  Json(body): Json<UpgradeRequest>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let session = viewer.require()?;
  let price = state.config.upgrade_prices.price_for(body.tier)?;

  let upgrade = state
    .store
    .begin_upgrade(session.user_id, body.tier, price)
    .await
    .map_err(ApiError::store)?;

  let payment_link_url = payment_link(
    state.gateway.as_ref(),
    upgrade.upgrade_id,
    upgrade.price,
    &session.email,
  )
  .await?;

  Ok((
    StatusCode::CREATED,
    Json(UpgradeResponse { upgrade, payment_link_url }),
  ))
}

/// `POST /payments/upgrades/confirm`
///
/// Same verification as the purchase callback, checked against the price
/// captured when the upgrade began.
pub async fn confirm_upgrade<S, G>(
  State(state): State<AppState<S, G>>,
  Json(body): Json<PaymentConfirmation>,
) -> Result<Json<UpgradeConfirmation>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let upgrade = state
    .store
    .get_upgrade(body.attempt_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("tier upgrade {} not found", body.attempt_id))
    })?;

  if let Err(e) = body.verify(state.webhook_secret(), upgrade.price) {
    tracing::warn!(
      upgrade_id = %body.attempt_id,
      payment_ref = %body.payment_ref,
      error = %e,
      "upgrade confirmation rejected"
    );
    return Err(e.into());
  }

  let confirmation = match body.status {
    ConfirmationStatus::Completed => state
      .store
      .confirm_upgrade(body.attempt_id, body.payment_ref)
      .await
      .map_err(ApiError::store)?,
    ConfirmationStatus::Failed => {
      let upgrade = state
        .store
        .fail_upgrade(body.attempt_id, body.payment_ref)
        .await
        .map_err(ApiError::store)?;
      UpgradeConfirmation {
        upgrade,
        newly_completed: false,
        upgraded_to: None,
      }
    }
  };
  Ok(Json(confirmation))
}
