//! The `LearningStore` trait and the snapshot loader built on it.
//!
//! The trait is implemented by storage backends (e.g.
//! `coursegate-store-sqlite`). Higher layers depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error,
  access::AccessSnapshot,
  activity::{Activity, NewActivity},
  admin::PlatformStats,
  course::{Course, Download, Module, NewCourse, NewDownload, NewModule},
  entitlement::{Confirmation, Entitlement},
  profile::{Session, UserProfile},
  progress::{CourseProgress, Progress},
  tier::Tier,
  upgrade::{TierUpgrade, UpgradeConfirmation},
};

/// Backend errors must say whether they carry a domain outcome (not found,
/// conflict, ...) or an infrastructure failure.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  /// The domain error behind this failure, if there is one. `None` means
  /// infrastructure trouble that a caller should surface as retryable.
  fn domain(&self) -> Option<&Error>;
}

/// Abstraction over a Coursegate storage backend.
///
/// Progress writes are upserts keyed on (user, module). The pending →
/// completed entitlement transition is conditional and applies its side
/// effects at most once.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait LearningStore: Send + Sync {
  type Error: StoreError;

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Return the profile for `user_id`, creating it at the lowest tier if it
  /// does not exist. An existing profile keeps its tier; its email is
  /// refreshed.
  fn ensure_profile(
    &self,
    user_id: Uuid,
    email: String,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  fn get_profile(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Option<UserProfile>, Self::Error>> + Send + '_;

  fn list_profiles(
    &self,
  ) -> impl Future<Output = Result<Vec<UserProfile>, Self::Error>> + Send + '_;

  /// Administrative tier change. Records a `tier_upgrade` activity when the
  /// rank rises.
  fn set_tier(
    &self,
    user_id: Uuid,
    tier: Tier,
  ) -> impl Future<Output = Result<UserProfile, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Persist a session under the digest of its bearer token.
  fn store_session(
    &self,
    digest: String,
    session: Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Look up a session by token digest. Expired sessions are returned; the
  /// caller decides liveness.
  fn find_session<'a>(
    &'a self,
    digest: &'a str,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + 'a;

  // ── Courses ───────────────────────────────────────────────────────────

  fn add_course(
    &self,
    input: NewCourse,
  ) -> impl Future<Output = Result<Course, Self::Error>> + Send + '_;

  /// Replace every editable field of a course.
  fn update_course(
    &self,
    course_id: Uuid,
    input: NewCourse,
  ) -> impl Future<Output = Result<Course, Self::Error>> + Send + '_;

  fn set_course_active(
    &self,
    course_id: Uuid,
    is_active: bool,
  ) -> impl Future<Output = Result<Course, Self::Error>> + Send + '_;

  /// Remove a course together with its modules, downloads, entitlements and
  /// progress rows.
  fn delete_course(
    &self,
    course_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_course(
    &self,
    course_id: Uuid,
  ) -> impl Future<Output = Result<Option<Course>, Self::Error>> + Send + '_;

  fn list_courses(
    &self,
    include_inactive: bool,
  ) -> impl Future<Output = Result<Vec<Course>, Self::Error>> + Send + '_;

  // ── Modules ───────────────────────────────────────────────────────────

  /// Fails with `DuplicateModulePosition` if the position is taken.
  fn add_module(
    &self,
    course_id: Uuid,
    input: NewModule,
  ) -> impl Future<Output = Result<Module, Self::Error>> + Send + '_;

  fn update_module(
    &self,
    module_id: Uuid,
    input: NewModule,
  ) -> impl Future<Output = Result<Module, Self::Error>> + Send + '_;

  fn delete_module(
    &self,
    module_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_module(
    &self,
    module_id: Uuid,
  ) -> impl Future<Output = Result<Option<Module>, Self::Error>> + Send + '_;

  /// Modules of a course in ascending `position`.
  fn list_modules(
    &self,
    course_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Module>, Self::Error>> + Send + '_;

  // ── Downloads ─────────────────────────────────────────────────────────

  fn add_download(
    &self,
    course_id: Uuid,
    input: NewDownload,
  ) -> impl Future<Output = Result<Download, Self::Error>> + Send + '_;

  fn delete_download(
    &self,
    download_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_downloads(
    &self,
    course_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Download>, Self::Error>> + Send + '_;

  // ── Entitlements ──────────────────────────────────────────────────────

  /// none → pending. Returns the existing pending row if there is one; fails
  /// with `AlreadyEntitled` if a valid completed row exists.
  fn begin_purchase(
    &self,
    user_id: Uuid,
    course_id: Uuid,
  ) -> impl Future<Output = Result<Entitlement, Self::Error>> + Send + '_;

  fn get_entitlement(
    &self,
    entitlement_id: Uuid,
  ) -> impl Future<Output = Result<Option<Entitlement>, Self::Error>> + Send + '_;

  /// Every entitlement row for the user, optionally restricted to a course.
  fn list_entitlements(
    &self,
    user_id: Uuid,
    course_id: Option<Uuid>,
  ) -> impl Future<Output = Result<Vec<Entitlement>, Self::Error>> + Send + '_;

  /// pending → completed, idempotently. Sets the expiry from the course's
  /// access window, raises the buyer's tier when the course tier is higher,
  /// and records a `course_purchase` activity, all only on the call that
  /// performs the transition.
  fn confirm_entitlement(
    &self,
    entitlement_id: Uuid,
    payment_ref: String,
  ) -> impl Future<Output = Result<Confirmation, Self::Error>> + Send + '_;

  /// pending → failed. Repeating on an already-failed row is a no-op.
  fn fail_entitlement(
    &self,
    entitlement_id: Uuid,
    payment_ref: String,
  ) -> impl Future<Output = Result<Entitlement, Self::Error>> + Send + '_;

  // ── Tier upgrades ─────────────────────────────────────────────────────

  /// none → pending for a self-service upgrade to `target` at `price`.
  ///
  /// Fails with `AlreadyAtTier` if the user already holds `target` or
  /// higher. A pending attempt for the same target and price is returned
  /// as-is; a pending attempt for anything else is failed and replaced.
  fn begin_upgrade(
    &self,
    user_id: Uuid,
    target: Tier,
    price: i64,
  ) -> impl Future<Output = Result<TierUpgrade, Self::Error>> + Send + '_;

  fn get_upgrade(
    &self,
    upgrade_id: Uuid,
  ) -> impl Future<Output = Result<Option<TierUpgrade>, Self::Error>> + Send + '_;

  /// pending → completed, idempotently. Raises the tier and records a
  /// `tier_upgrade` activity only on the call that performs the transition,
  /// and never lowers a tier that has meanwhile risen past the target.
  fn confirm_upgrade(
    &self,
    upgrade_id: Uuid,
    payment_ref: String,
  ) -> impl Future<Output = Result<UpgradeConfirmation, Self::Error>> + Send + '_;

  /// pending → failed. Repeating on an already-failed attempt is a no-op.
  fn fail_upgrade(
    &self,
    upgrade_id: Uuid,
    payment_ref: String,
  ) -> impl Future<Output = Result<TierUpgrade, Self::Error>> + Send + '_;

  // ── Progress ──────────────────────────────────────────────────────────

  /// Upsert `completed = true`, `progress_percentage = 100`. The first
  /// completion time is kept on repeated calls.
  fn mark_complete(
    &self,
    user_id: Uuid,
    module_id: Uuid,
  ) -> impl Future<Output = Result<Progress, Self::Error>> + Send + '_;

  /// Upsert `last_accessed = now` without touching completion state.
  fn record_access(
    &self,
    user_id: Uuid,
    module_id: Uuid,
  ) -> impl Future<Output = Result<Progress, Self::Error>> + Send + '_;

  /// The user's progress rows for modules of `course_id`.
  fn list_progress(
    &self,
    user_id: Uuid,
    course_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Progress>, Self::Error>> + Send + '_;

  fn course_progress(
    &self,
    user_id: Uuid,
    course_id: Uuid,
  ) -> impl Future<Output = Result<CourseProgress, Self::Error>> + Send + '_;

  // ── Activity ──────────────────────────────────────────────────────────

  fn record_activity(
    &self,
    input: NewActivity,
  ) -> impl Future<Output = Result<Activity, Self::Error>> + Send + '_;

  /// Most recent first.
  fn list_activity(
    &self,
    user_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<Activity>, Self::Error>> + Send + '_;

  // ── Administration ────────────────────────────────────────────────────

  fn stats(
    &self,
  ) -> impl Future<Output = Result<PlatformStats, Self::Error>> + Send + '_;
}

/// Fetch everything needed to evaluate `course_id` for `user_id` at `now`.
///
/// Returns `None` if the course does not exist. With no user, the snapshot
/// carries no profile and every check in it fails closed. Fetch failures
/// propagate; they are never turned into a decision.
pub async fn load_snapshot<S: LearningStore>(
  store: &S,
  user_id: Option<Uuid>,
  course_id: Uuid,
  now: DateTime<Utc>,
) -> Result<Option<AccessSnapshot>, S::Error> {
  let Some(course) = store.get_course(course_id).await? else {
    return Ok(None);
  };
  let modules = store.list_modules(course_id).await?;

  let (profile, entitlements, progress) = match user_id {
    Some(user_id) => (
      store.get_profile(user_id).await?,
      store.list_entitlements(user_id, Some(course_id)).await?,
      store.list_progress(user_id, course_id).await?,
    ),
    None => (None, Vec::new(), Vec::new()),
  };

  Ok(Some(AccessSnapshot::new(
    profile,
    course,
    modules,
    entitlements,
    progress,
    now,
  )))
}
