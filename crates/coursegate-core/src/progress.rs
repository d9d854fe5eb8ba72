//! Per-module completion records and course-level progress.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::course::Module;

/// One row per (user, module). Writes are upserts on that pair.
///
/// `completed` implies `progress_percentage == 100`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
  pub user_id:             Uuid,
  pub module_id:           Uuid,
  pub completed:           bool,
  pub progress_percentage: u8,
  pub completed_at:        Option<DateTime<Utc>>,
  pub last_accessed:       Option<DateTime<Utc>>,
}

/// Completed-over-total summary for one user and one course.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize,
)]
pub struct CourseProgress {
  pub completed:  u32,
  pub total:      u32,
  pub percentage: u8,
}

impl CourseProgress {
  /// `percentage` rounds half up; an empty course is `{0, 0, 0}`.
  pub fn from_counts(completed: u32, total: u32) -> Self {
    if total == 0 {
      return Self::default();
    }
    let completed = completed.min(total);
    let percentage =
      (u64::from(completed) * 100 + u64::from(total) / 2) / u64::from(total);
    Self {
      completed,
      total,
      percentage: percentage as u8,
    }
  }

  /// Count completed rows that belong to `modules`. Rows for modules outside
  /// the course, and duplicate rows, are ignored.
  pub fn compute<'a, I>(modules: &[Module], progress: I) -> Self
  where
    I: IntoIterator<Item = &'a Progress>,
  {
    let in_course: HashSet<Uuid> =
      modules.iter().map(|m| m.module_id).collect();
    let done: HashSet<Uuid> = progress
      .into_iter()
      .filter(|p| p.completed && in_course.contains(&p.module_id))
      .map(|p| p.module_id)
      .collect();
    Self::from_counts(done.len() as u32, in_course.len() as u32)
  }
}
