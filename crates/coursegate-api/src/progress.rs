//! Progress tracking endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/courses/{id}/progress` | `{completed,total,percentage}` |
//! | `GET`  | `/courses/{id}/progress/stream` | SSE, one `progress` event per change |
//! | `POST` | `/modules/{id}/access` | records `last_accessed` |
//! | `POST` | `/modules/{id}/complete` | idempotent |

use std::{convert::Infallible, time::Duration};

use axum::{
  Json,
  extract::{Path, State},
  response::sse::{Event, KeepAlive, Sse},
};
use coursegate_core::{
  course::Module,
  payment::PaymentGateway,
  progress::{CourseProgress, Progress},
  store::LearningStore,
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
  AppState, courses::visible_snapshot, error::ApiError, session::Viewer,
  watch::watch_progress,
};

/// `GET /courses/{id}/progress`
pub async fn course<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Json<CourseProgress>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  viewer.user_id().ok_or(ApiError::Unauthorized)?;
  let snapshot = visible_snapshot(&state, &viewer, id).await?;
  Ok(Json(snapshot.course_progress()))
}

/// `GET /courses/{id}/progress/stream`
///
/// The watcher task is tied to the response stream: when the client goes
/// away the stream is dropped and the task is cancelled.
pub async fn stream<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let user_id = viewer.user_id().ok_or(ApiError::Unauthorized)?;
  visible_snapshot(&state, &viewer, id).await?;

  let cancel = CancellationToken::new();
  let guard = cancel.clone().drop_guard();
  let every = Duration::from_secs(state.config.watch_interval_secs.max(1));
  let rx = watch_progress(state.store.clone(), user_id, id, every, cancel);
  tracing::debug!(%user_id, course_id = %id, "progress stream opened");

  let events = ReceiverStream::new(rx).filter_map(move |progress| {
    let _guard = &guard;
    let event = match serde_json::to_string(&progress) {
      Ok(json) => Some(Ok(Event::default().event("progress").data(json))),
      Err(e) => {
        tracing::warn!("failed to serialise progress: {e}");
        None
      }
    };
    async move { event }
  });

  Ok(Sse::new(events).keep_alive(
    KeepAlive::new()
      .interval(Duration::from_secs(15))
      .text("keep-alive"),
  ))
}

// ─── Writes ───────────────────────────────────────────────────────────────────

/// Resolve a module and check the caller may use it.
async fn playable_module<S, G>(
  state: &AppState<S, G>,
  viewer: &Viewer,
  module_id: Uuid,
) -> Result<Module, ApiError>
where
  S: LearningStore,
{
  viewer.user_id().ok_or(ApiError::Unauthorized)?;
  let module = state
    .store
    .get_module(module_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("module {module_id} not found")))?;

  let snapshot = visible_snapshot(state, viewer, module.course_id).await?;
  if !snapshot.module_access(module_id) {
    return Err(ApiError::Forbidden(format!(
      "no access to module {module_id}"
    )));
  }
  Ok(module)
}

/// `POST /modules/{id}/access`
pub async fn access<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Json<Progress>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  playable_module(&state, &viewer, id).await?;
  let user_id = viewer.require()?.user_id;
  let progress = state
    .store
    .record_access(user_id, id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(progress))
}

/// `POST /modules/{id}/complete`
pub async fn complete<S, G>(
  State(state): State<AppState<S, G>>,
  Path(id): Path<Uuid>,
  viewer: Viewer,
) -> Result<Json<Progress>, ApiError>
where
  S: LearningStore + 'static,
  G: PaymentGateway + 'static,
{
  let module = playable_module(&state, &viewer, id).await?;
  let user_id = viewer.require()?.user_id;
  let progress = state
    .store
    .mark_complete(user_id, id)
    .await
    .map_err(ApiError::store)?;
  tracing::info!(
    %user_id,
    course_id = %module.course_id,
    module_id = %id,
    "module completed"
  );
  Ok(Json(progress))
}
