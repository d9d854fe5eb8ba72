//! Handlers for the caller's own profile.

use axum::{
  Json,
  extract::{Query, State},
};
use coursegate_core::{
  activity::Activity, payment::PaymentGateway, profile::UserProfile,
  store::LearningStore,
};
use serde::Deserialize;

use crate::{AppState, error::ApiError, session::Viewer};

const MAX_ACTIVITY: usize = 100;

/// `GET /me`
pub async fn profile<S, G>(
  State(state): State<AppState<S, G>>,
  viewer: Viewer,
) -> Result<Json<UserProfile>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let session = viewer.require()?;
  let profile = state
    .store
    .get_profile(session.user_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("profile {} not found", session.user_id)))?;
  Ok(Json(profile))
}

#[derive(Debug, Deserialize)]
pub struct ActivityParams {
  pub limit: Option<usize>,
}

/// `GET /me/activity[?limit=<n>]`, newest first, default 10.
pub async fn activity<S, G>(
  State(state): State<AppState<S, G>>,
  Query(params): Query<ActivityParams>,
  viewer: Viewer,
) -> Result<Json<Vec<Activity>>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let session = viewer.require()?;
  let limit = params.limit.unwrap_or(10).min(MAX_ACTIVITY);
  let entries = state
    .store
    .list_activity(session.user_id, limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entries))
}
