//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`),
//! so lexical order in SQL matches chronological order. UUIDs are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use coursegate_core::{
  Tier,
  activity::{Activity, ActivityKind},
  course::{Course, Download, Module},
  entitlement::{Entitlement, PaymentStatus},
  profile::{Session, UserProfile},
  progress::Progress,
  upgrade::TierUpgrade,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

fn decode_opt_dt(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
  s.as_deref().map(decode_dt).transpose()
}

// ─── Tier ────────────────────────────────────────────────────────────────────

pub fn encode_tier(t: Tier) -> &'static str { t.as_str() }

/// A content gate that no longer parses is corrupt data, not "free".
pub fn decode_required_tier(s: &str) -> Result<Tier> {
  Tier::parse(s).map_err(|_| Error::Decode(format!("unknown required tier: {s:?}")))
}

/// A user's tier that no longer parses drops to the lowest rank.
pub fn decode_user_tier(s: &str) -> Tier {
  let tier = Tier::from_str_lenient(s);
  if tier.as_str() != s {
    tracing::warn!(stored = s, "unknown subscription tier, treating as free");
  }
  tier
}

// ─── PaymentStatus / ActivityKind ───────────────────────────────────────────

pub fn encode_status(s: PaymentStatus) -> &'static str { s.as_str() }

pub fn decode_status(s: &str) -> Result<PaymentStatus> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown payment status: {s:?}")))
}

pub fn encode_activity_kind(k: ActivityKind) -> &'static str { k.as_str() }

pub fn decode_activity_kind(s: &str) -> Result<ActivityKind> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown activity type: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list shared by every `profiles` query, in [`RawProfile`] order.
pub const PROFILE_COLUMNS: &str =
  "user_id, email, subscription_tier, created_at, updated_at";

/// Raw strings read directly from a `profiles` row.
pub struct RawProfile {
  pub user_id:           String,
  pub email:             String,
  pub subscription_tier: String,
  pub created_at:        String,
  pub updated_at:        String,
}

impl RawProfile {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:           row.get(0)?,
      email:             row.get(1)?,
      subscription_tier: row.get(2)?,
      created_at:        row.get(3)?,
      updated_at:        row.get(4)?,
    })
  }

  pub fn into_profile(self) -> Result<UserProfile> {
    Ok(UserProfile {
      user_id:           decode_uuid(&self.user_id)?,
      email:             self.email,
      subscription_tier: decode_user_tier(&self.subscription_tier),
      created_at:        decode_dt(&self.created_at)?,
      updated_at:        decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawSession {
  pub user_id:    String,
  pub email:      String,
  pub expires_at: String,
}

impl RawSession {
  pub fn into_session(self) -> Result<Session> {
    Ok(Session {
      user_id:    decode_uuid(&self.user_id)?,
      email:      self.email,
      expires_at: decode_dt(&self.expires_at)?,
    })
  }
}

pub const COURSE_COLUMNS: &str = "course_id, title, description, required_tier, \
   price, is_active, access_days, created_at, updated_at";

pub struct RawCourse {
  pub course_id:     String,
  pub title:         String,
  pub description:   String,
  pub required_tier: String,
  pub price:         i64,
  pub is_active:     bool,
  pub access_days:   Option<u32>,
  pub created_at:    String,
  pub updated_at:    String,
}

impl RawCourse {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      course_id:     row.get(0)?,
      title:         row.get(1)?,
      description:   row.get(2)?,
      required_tier: row.get(3)?,
      price:         row.get(4)?,
      is_active:     row.get(5)?,
      access_days:   row.get(6)?,
      created_at:    row.get(7)?,
      updated_at:    row.get(8)?,
    })
  }

  pub fn into_course(self) -> Result<Course> {
    Ok(Course {
      course_id:     decode_uuid(&self.course_id)?,
      title:         self.title,
      description:   self.description,
      required_tier: decode_required_tier(&self.required_tier)?,
      price:         self.price,
      is_active:     self.is_active,
      access_days:   self.access_days,
      created_at:    decode_dt(&self.created_at)?,
      updated_at:    decode_dt(&self.updated_at)?,
    })
  }
}

pub const MODULE_COLUMNS: &str = "module_id, course_id, position, title, \
   required_tier, is_premium, duration_secs, media_ref";

pub struct RawModule {
  pub module_id:     String,
  pub course_id:     String,
  pub position:      u32,
  pub title:         String,
  pub required_tier: String,
  pub is_premium:    bool,
  pub duration_secs: Option<u32>,
  pub media_ref:     Option<String>,
}

impl RawModule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      module_id:     row.get(0)?,
      course_id:     row.get(1)?,
      position:      row.get(2)?,
      title:         row.get(3)?,
      required_tier: row.get(4)?,
      is_premium:    row.get(5)?,
      duration_secs: row.get(6)?,
      media_ref:     row.get(7)?,
    })
  }

  pub fn into_module(self) -> Result<Module> {
    Ok(Module {
      module_id:     decode_uuid(&self.module_id)?,
      course_id:     decode_uuid(&self.course_id)?,
      position:      self.position,
      title:         self.title,
      required_tier: decode_required_tier(&self.required_tier)?,
      is_premium:    self.is_premium,
      duration_secs: self.duration_secs,
      media_ref:     self.media_ref,
    })
  }
}

pub const DOWNLOAD_COLUMNS: &str =
  "download_id, course_id, title, url, is_premium, created_at";

pub struct RawDownload {
  pub download_id: String,
  pub course_id:   String,
  pub title:       String,
  pub url:         String,
  pub is_premium:  bool,
  pub created_at:  String,
}

impl RawDownload {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      download_id: row.get(0)?,
      course_id:   row.get(1)?,
      title:       row.get(2)?,
      url:         row.get(3)?,
      is_premium:  row.get(4)?,
      created_at:  row.get(5)?,
    })
  }

  pub fn into_download(self) -> Result<Download> {
    Ok(Download {
      download_id: decode_uuid(&self.download_id)?,
      course_id:   decode_uuid(&self.course_id)?,
      title:       self.title,
      url:         self.url,
      is_premium:  self.is_premium,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}

pub const ENTITLEMENT_COLUMNS: &str = "entitlement_id, user_id, course_id, \
   payment_status, purchase_price, expires_at, payment_ref, created_at, confirmed_at";

pub struct RawEntitlement {
  pub entitlement_id: String,
  pub user_id:        String,
  pub course_id:      String,
  pub payment_status: String,
  pub purchase_price: i64,
  pub expires_at:     Option<String>,
  pub payment_ref:    Option<String>,
  pub created_at:     String,
  pub confirmed_at:   Option<String>,
}

impl RawEntitlement {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entitlement_id: row.get(0)?,
      user_id:        row.get(1)?,
      course_id:      row.get(2)?,
      payment_status: row.get(3)?,
      purchase_price: row.get(4)?,
      expires_at:     row.get(5)?,
      payment_ref:    row.get(6)?,
      created_at:     row.get(7)?,
      confirmed_at:   row.get(8)?,
    })
  }

  pub fn into_entitlement(self) -> Result<Entitlement> {
    Ok(Entitlement {
      entitlement_id: decode_uuid(&self.entitlement_id)?,
      user_id:        decode_uuid(&self.user_id)?,
      course_id:      decode_uuid(&self.course_id)?,
      payment_status: decode_status(&self.payment_status)?,
      purchase_price: self.purchase_price,
      expires_at:     decode_opt_dt(self.expires_at)?,
      payment_ref:    self.payment_ref,
      created_at:     decode_dt(&self.created_at)?,
      confirmed_at:   decode_opt_dt(self.confirmed_at)?,
    })
  }
}

pub const UPGRADE_COLUMNS: &str = "upgrade_id, user_id, from_tier, \
   target_tier, price, payment_status, payment_ref, created_at, confirmed_at";

pub struct RawUpgrade {
  pub upgrade_id:     String,
  pub user_id:        String,
  pub from_tier:      String,
  pub target_tier:    String,
  pub price:          i64,
  pub payment_status: String,
  pub payment_ref:    Option<String>,
  pub created_at:     String,
  pub confirmed_at:   Option<String>,
}

impl RawUpgrade {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      upgrade_id:     row.get(0)?,
      user_id:        row.get(1)?,
      from_tier:      row.get(2)?,
      target_tier:    row.get(3)?,
      price:          row.get(4)?,
      payment_status: row.get(5)?,
      payment_ref:    row.get(6)?,
      created_at:     row.get(7)?,
      confirmed_at:   row.get(8)?,
    })
  }

  pub fn into_upgrade(self) -> Result<TierUpgrade> {
    Ok(TierUpgrade {
      upgrade_id:     decode_uuid(&self.upgrade_id)?,
      user_id:        decode_uuid(&self.user_id)?,
      from_tier:      decode_user_tier(&self.from_tier),
      target_tier:    decode_required_tier(&self.target_tier)?,
      price:          self.price,
      payment_status: decode_status(&self.payment_status)?,
      payment_ref:    self.payment_ref,
      created_at:     decode_dt(&self.created_at)?,
      confirmed_at:   decode_opt_dt(self.confirmed_at)?,
    })
  }
}

pub const PROGRESS_COLUMNS: &str = "user_id, module_id, completed, \
   progress_percentage, completed_at, last_accessed";

pub struct RawProgress {
  pub user_id:             String,
  pub module_id:           String,
  pub completed:           bool,
  pub progress_percentage: u8,
  pub completed_at:        Option<String>,
  pub last_accessed:       Option<String>,
}

impl RawProgress {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:             row.get(0)?,
      module_id:           row.get(1)?,
      completed:           row.get(2)?,
      progress_percentage: row.get(3)?,
      completed_at:        row.get(4)?,
      last_accessed:       row.get(5)?,
    })
  }

  pub fn into_progress(self) -> Result<Progress> {
    Ok(Progress {
      user_id:             decode_uuid(&self.user_id)?,
      module_id:           decode_uuid(&self.module_id)?,
      completed:           self.completed,
      progress_percentage: self.progress_percentage,
      completed_at:        decode_opt_dt(self.completed_at)?,
      last_accessed:       decode_opt_dt(self.last_accessed)?,
    })
  }
}

pub const ACTIVITY_COLUMNS: &str =
  "activity_id, user_id, activity_type, course_id, module_id, metadata, created_at";

pub struct RawActivity {
  pub activity_id:   String,
  pub user_id:       String,
  pub activity_type: String,
  pub course_id:     Option<String>,
  pub module_id:     Option<String>,
  pub metadata:      String,
  pub created_at:    String,
}

impl RawActivity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id:   row.get(0)?,
      user_id:       row.get(1)?,
      activity_type: row.get(2)?,
      course_id:     row.get(3)?,
      module_id:     row.get(4)?,
      metadata:      row.get(5)?,
      created_at:    row.get(6)?,
    })
  }

  pub fn into_activity(self) -> Result<Activity> {
    Ok(Activity {
      activity_id: decode_uuid(&self.activity_id)?,
      user_id:     decode_uuid(&self.user_id)?,
      kind:        decode_activity_kind(&self.activity_type)?,
      course_id:   decode_opt_uuid(self.course_id)?,
      module_id:   decode_opt_uuid(self.module_id)?,
      metadata:    serde_json::from_str(&self.metadata)?,
      created_at:  decode_dt(&self.created_at)?,
    })
  }
}
