//! Catalogue types: courses, their ordered modules, and downloadable
//! resources.
//!
//! Catalogue rows are written by administrators only. End users read them
//! through the access evaluator.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result, tier::Tier};

// ─── Course ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
  pub course_id:     Uuid,
  pub title:         String,
  pub description:   String,
  pub required_tier: Tier,
  /// Price in minor currency units.
  pub price:         i64,
  pub is_active:     bool,
  /// When set, an entitlement confirmed for this course lapses this many days
  /// after confirmation.
  pub access_days:   Option<u32>,
  pub created_at:    DateTime<Utc>,
  pub updated_at:    DateTime<Utc>,
}

/// Longest access window a course may grant.
pub const MAX_ACCESS_DAYS: u32 = 36_500;

impl Course {
  /// The expiry stamped on an entitlement confirmed at `confirmed_at`.
  /// Fails instead of overflowing when the window runs past the calendar.
  pub fn expiry_from(&self, confirmed_at: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    let Some(days) = self.access_days else {
      return Ok(None);
    };
    confirmed_at
      .checked_add_signed(Duration::days(i64::from(days)))
      .map(Some)
      .ok_or_else(|| {
        Error::InvalidInput(format!("access window of {days} days is out of range"))
      })
  }
}

/// Input to course creation and replacement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCourse {
  pub title:         String,
  #[serde(default)]
  pub description:   String,
  pub required_tier: Tier,
  pub price:         i64,
  #[serde(default = "default_active")]
  pub is_active:     bool,
  #[serde(default)]
  pub access_days:   Option<u32>,
}

fn default_active() -> bool { true }

impl NewCourse {
  pub fn new(title: impl Into<String>, required_tier: Tier, price: i64) -> Self {
    Self {
      title: title.into(),
      description: String::new(),
      required_tier,
      price,
      is_active: true,
      access_days: None,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.title.trim().is_empty() {
      return Err(Error::InvalidInput("course title is empty".into()));
    }
    if self.price < 0 {
      return Err(Error::InvalidInput("course price is negative".into()));
    }
    match self.access_days {
      Some(0) => {
        return Err(Error::InvalidInput("access_days must be positive".into()));
      }
      Some(days) if days > MAX_ACCESS_DAYS => {
        return Err(Error::InvalidInput(format!(
          "access_days may not exceed {MAX_ACCESS_DAYS}"
        )));
      }
      _ => {}
    }
    Ok(())
  }
}

// ─── Module ──────────────────────────────────────────────────────────────────

/// The smallest playable unit of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
  pub module_id:     Uuid,
  pub course_id:     Uuid,
  /// Play order; unique within the course.
  pub position:      u32,
  pub title:         String,
  pub required_tier: Tier,
  /// Locks the module to premium holders regardless of `required_tier`.
  pub is_premium:    bool,
  pub duration_secs: Option<u32>,
  /// Opaque reference to the media asset (e.g. a playback id).
  pub media_ref:     Option<String>,
}

/// Input to module creation and replacement. The owning course is given
/// separately and never changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewModule {
  pub position:      u32,
  pub title:         String,
  pub required_tier: Tier,
  #[serde(default)]
  pub is_premium:    bool,
  #[serde(default)]
  pub duration_secs: Option<u32>,
  #[serde(default)]
  pub media_ref:     Option<String>,
}

impl NewModule {
  pub fn new(position: u32, title: impl Into<String>, required_tier: Tier) -> Self {
    Self {
      position,
      title: title.into(),
      required_tier,
      is_premium: false,
      duration_secs: None,
      media_ref: None,
    }
  }

  pub fn premium(mut self) -> Self {
    self.is_premium = true;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.title.trim().is_empty() {
      return Err(Error::InvalidInput("module title is empty".into()));
    }
    Ok(())
  }
}

// ─── Download ────────────────────────────────────────────────────────────────

/// A resource attached to a course (worksheet, project files, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Download {
  pub download_id: Uuid,
  pub course_id:   Uuid,
  pub title:       String,
  pub url:         String,
  pub is_premium:  bool,
  pub created_at:  DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDownload {
  pub title:      String,
  pub url:        String,
  #[serde(default)]
  pub is_premium: bool,
}

impl NewDownload {
  pub fn validate(&self) -> Result<()> {
    if self.title.trim().is_empty() || self.url.trim().is_empty() {
      return Err(Error::InvalidInput("download needs a title and a url".into()));
    }
    Ok(())
  }
}
