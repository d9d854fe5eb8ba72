//! Error types for `coursegate-core`.
//!
//! A denied access check is never an error: the evaluator answers `false`.
//! These variants describe business outcomes a caller must react to, plus the
//! serialization failures that can occur while building domain values.

use thiserror::Error;
use uuid::Uuid;

use crate::{entitlement::PaymentStatus, tier::Tier};

#[derive(Debug, Error)]
pub enum Error {
  #[error("not authenticated")]
  NotAuthenticated,

  #[error("invalid tier: {0:?}")]
  InvalidTier(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("profile not found: {0}")]
  ProfileNotFound(Uuid),

  #[error("course not found: {0}")]
  CourseNotFound(Uuid),

  #[error("module not found: {0}")]
  ModuleNotFound(Uuid),

  #[error("download not found: {0}")]
  DownloadNotFound(Uuid),

  #[error("entitlement not found: {0}")]
  EntitlementNotFound(Uuid),

  #[error("tier upgrade not found: {0}")]
  UpgradeNotFound(Uuid),

  #[error("already at or above the {tier} tier")]
  AlreadyAtTier { tier: Tier },

  #[error("user {user_id} already has access to course {course_id}")]
  AlreadyEntitled { user_id: Uuid, course_id: Uuid },

  #[error("this course requires the {required} tier")]
  UpgradeRequired { required: Tier },

  #[error("course {course_id} already has a module at position {position}")]
  DuplicateModulePosition { course_id: Uuid, position: u32 },

  /// `attempt_id` names an entitlement or a tier upgrade.
  #[error("payment attempt {attempt_id} cannot move from {from} to {to}")]
  InvalidTransition {
    attempt_id: Uuid,
    from:       PaymentStatus,
    to:         PaymentStatus,
  },

  #[error("payment verification failed: {0}")]
  PaymentVerificationMismatch(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
