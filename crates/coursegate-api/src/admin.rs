//! Administrator endpoints. Every handler takes the [`Admin`] extractor, so
//! callers off the allow-list get 403 before any work is done.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/admin/courses` | body: [`NewCourse`] |
//! | `PUT`    | `/admin/courses/{id}` | replaces every editable field |
//! | `DELETE` | `/admin/courses/{id}` | cascades to modules, downloads, entitlements, progress |
//! | `PUT`    | `/admin/courses/{id}/active` | body: `{"is_active":false}` |
//! | `POST`   | `/admin/courses/{id}/modules` | 409 on a taken position |
//! | `PUT`    | `/admin/modules/{id}` | |
//! | `DELETE` | `/admin/modules/{id}` | |
//! | `POST`   | `/admin/courses/{id}/downloads` | |
//! | `DELETE` | `/admin/downloads/{id}` | |
//! | `GET`    | `/admin/profiles` | |
//! | `PUT`    | `/admin/profiles/{id}/tier` | body: `{"tier":"premium"}` |
//! | `GET`    | `/admin/stats` | platform counts |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use coursegate_core::{
  Tier,
  admin::PlatformStats,
  course::{Course, Module, NewCourse, NewDownload, NewModule},
  payment::PaymentGateway,
  profile::UserProfile,
  store::LearningStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, session::Admin};

// ─── Courses ──────────────────────────────────────────────────────────────────

/// `POST /admin/courses`
pub async fn create_course<S, G>(
  State(state): State<AppState<S, G>>,
  Admin(admin): Admin,
  Json(body): Json<NewCourse>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let course = state.store.add_course(body).await.map_err(ApiError::store)?;
  tracing::info!(by = %admin.email, course_id = %course.course_id, "admin created course");
  Ok((StatusCode::CREATED, Json(course)))
}

/// `PUT /admin/courses/{id}`
pub async fn update_course<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  _: Admin,
  Json(body): Json<NewCourse>,
) -> Result<Json<Course>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let course = state
    .store
    .update_course(id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(course))
}

/// `DELETE /admin/courses/{id}`
pub async fn delete_course<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  Admin(admin): Admin,
) -> Result<StatusCode, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  state.store.delete_course(id).await.map_err(ApiError::store)?;
  tracing::info!(by = %admin.email, course_id = %id, "admin deleted course");
  Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ActiveBody {
  pub is_active: bool,
}

/// `PUT /admin/courses/{id}/active`
pub async fn set_active<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  _: Admin,
  Json(body): Json<ActiveBody>,
) -> Result<Json<Course>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let course = state
    .store
    .set_course_active(id, body.is_active)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(course))
}

// ─── Modules ──────────────────────────────────────────────────────────────────

/// `POST /admin/courses/{id}/modules`
pub async fn add_module<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  _: Admin,
  Json(body): Json<NewModule>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let module = state
    .store
    .add_module(id, body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(module)))
}

/// `PUT /admin/modules/{id}`
pub async fn update_module<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  _: Admin,
  Json(body): Json<NewModule>,
) -> Result<Json<Module>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let module = state
    .store
    .update_module(id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(module))
}

/// `DELETE /admin/modules/{id}`
pub async fn delete_module<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  _: Admin,
) -> Result<StatusCode, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  state.store.delete_module(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Downloads ────────────────────────────────────────────────────────────────

/// `POST /admin/courses/{id}/downloads`
pub async fn add_download<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  _: Admin,
  Json(body): Json<NewDownload>,
) -> Result<impl IntoResponse, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let download = state
    .store
    .add_download(id, body)
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(download)))
}

/// `DELETE /admin/downloads/{id}`
pub async fn delete_download<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  _: Admin,
) -> Result<StatusCode, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  state.store.delete_download(id).await.map_err(ApiError::store)?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Profiles ─────────────────────────────────────────────────────────────────

/// `GET /admin/profiles`
pub async fn list_profiles<S, G>(
  State(state): State<AppState<S, G>>,
  _: Admin,
) -> Result<Json<Vec<UserProfile>>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let profiles = state.store.list_profiles().await.map_err(ApiError::store)?;
  Ok(Json(profiles))
}

#[derive(Debug, Deserialize)]
pub struct TierBody {
  pub tier: Tier,
}

/// `PUT /admin/profiles/{id}/tier`
pub async fn set_tier<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  Admin(admin): Admin,
  Json(body): Json<TierBody>,
) -> Result<Json<UserProfile>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let profile = state
    .store
    .set_tier(id, body.tier)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(by = %admin.email, user_id = %id, tier = %body.tier, "admin set tier");
  Ok(Json(profile))
}

// ─── Stats ────────────────────────────────────────────────────────────────────

/// `GET /admin/stats`
pub async fn stats<S, G>(
  State(state): State<AppState<S, G>>,
  _: Admin,
) -> Result<Json<PlatformStats>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let stats = state.store.stats().await.map_err(ApiError::store)?;
  Ok(Json(stats))
}
