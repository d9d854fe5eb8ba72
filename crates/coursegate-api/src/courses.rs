//! Catalogue reads and access decisions.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/courses` | active courses; all courses for admins |
//! | `GET`  | `/courses/{id}` | 404 for inactive courses unless admin |
//! | `GET`  | `/courses/{id}/modules` | ascending `position` |
//! | `GET`  | `/courses/{id}/downloads` | `url` only when accessible |
//! | `GET`  | `/courses/{id}/access` | snapshot decision, fails closed |

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::Utc;
use coursegate_core::{
  Tier,
  access::{AccessSnapshot, ModuleDecision},
  course::{Course, Module},
  entitlement::EntitlementState,
  payment::PaymentGateway,
  progress::CourseProgress,
  store::{LearningStore, load_snapshot},
};
use serde::Serialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError, session::Viewer};

/// Load the snapshot for `course_id` as seen by `viewer`. Inactive courses
/// are invisible to everyone but administrators.
pub(crate) async fn visible_snapshot<S, G>(
  state: &AppState<S, G>,
  viewer: &Viewer,
  course_id: Uuid,
) -> Result<AccessSnapshot, ApiError>
where
  S: LearningStore,
{
  let snapshot = load_snapshot(&*state.store, viewer.user_id(), course_id, Utc::now())
    .await
    .map_err(ApiError::store)?
    .filter(|s| s.course.is_active || viewer.is_admin())
    .ok_or_else(|| ApiError::NotFound(format!("course {course_id} not found")))?;
  Ok(snapshot)
}

// ─── List / get ───────────────────────────────────────────────────────────────

/// `GET /courses`
pub async fn list<S, G>(
  State(state): State<AppState<S, G>>,
  viewer: Viewer,
) -> Result<Json<Vec<Course>>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let courses = state
    .store
    .list_courses(viewer.is_admin())
    .await
    .map_err(ApiError::store)?;
  Ok(Json(courses))
}

/// `GET /courses/{id}`
pub async fn get_one<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Json<Course>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let course = state
    .store
    .get_course(id)
    .await
    .map_err(ApiError::store)?
    .filter(|c| c.is_active || viewer.is_admin())
    .ok_or_else(|| ApiError::NotFound(format!("course {id} not found")))?;
  Ok(Json(course))
}

/// `GET /courses/{id}/modules`
pub async fn modules<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Json<Vec<Module>>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let snapshot = visible_snapshot(&state, &viewer, id).await?;
  Ok(Json(snapshot.modules))
}

// ─── Downloads ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DownloadView {
  pub download_id: Uuid,
  pub title:       String,
  pub is_premium:  bool,
  pub accessible:  bool,
  /// Withheld unless `accessible`.
  pub url:         Option<String>,
}

/// `GET /courses/{id}/downloads`
pub async fn downloads<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Json<Vec<DownloadView>>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let snapshot = visible_snapshot(&state, &viewer, id).await?;
  let downloads = state.store.list_downloads(id).await.map_err(ApiError::store)?;

  let views = downloads
    .into_iter()
    .map(|d| {
      let accessible = snapshot.download_access(&d);
      DownloadView {
        download_id: d.download_id,
        title: d.title,
        is_premium: d.is_premium,
        accessible,
        url: accessible.then_some(d.url),
      }
    })
    .collect();
  Ok(Json(views))
}

// ─── Access decision ──────────────────────────────────────────────────────────

/// Everything a course view needs to decide what to show.
#[derive(Debug, Serialize)]
pub struct AccessView {
  pub course_id:     Uuid,
  pub authenticated: bool,
  pub tier:          Option<Tier>,
  pub entitlement:   EntitlementState,
  pub course_access: bool,
  pub can_purchase:  bool,
  pub modules:       Vec<ModuleDecision>,
  pub progress:      CourseProgress,
}

impl AccessView {
  pub fn from_snapshot(
    snapshot: &AccessSnapshot,
    policy: coursegate_core::access::PurchasePolicy,
  ) -> Self {
    Self {
      course_id:     snapshot.course.course_id,
      authenticated: snapshot.profile.is_some(),
      tier:          snapshot.tier(),
      entitlement:   snapshot.entitlement_state(),
      course_access: snapshot.course_access(),
      can_purchase:  snapshot.can_purchase(policy),
      modules:       snapshot.module_decisions(),
      progress:      snapshot.course_progress(),
    }
  }
}

/// `GET /courses/{id}/access`
pub async fn access<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Json<AccessView>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let snapshot = visible_snapshot(&state, &viewer, id).await?;
  Ok(Json(AccessView::from_snapshot(
    &snapshot,
    state.config.purchase_policy,
  )))
}
