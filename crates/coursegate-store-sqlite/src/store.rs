//! [`SqliteStore`]: the SQLite implementation of [`LearningStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use serde_json::json;
use uuid::Uuid;

use coursegate_core::{
  Tier,
  activity::{Activity, ActivityKind, NewActivity},
  admin::PlatformStats,
  course::{Course, Download, Module, NewCourse, NewDownload, NewModule},
  entitlement::{Confirmation, Entitlement, PaymentStatus},
  profile::{Session, UserProfile},
  progress::{CourseProgress, Progress},
  store::LearningStore,
  upgrade::{TierUpgrade, UpgradeConfirmation},
};

use crate::{
  Error, Result,
  encode::{
    ACTIVITY_COLUMNS, COURSE_COLUMNS, DOWNLOAD_COLUMNS, ENTITLEMENT_COLUMNS,
    MODULE_COLUMNS, PROFILE_COLUMNS, PROGRESS_COLUMNS, RawActivity, RawCourse,
    RawDownload, RawEntitlement, RawModule, RawProfile, RawProgress,
    RawSession, RawUpgrade, UPGRADE_COLUMNS, decode_status, decode_user_tier,
    decode_uuid, encode_activity_kind, encode_dt, encode_status, encode_tier,
    encode_uuid,
  },
  schema::SCHEMA,
};

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What a write decided on the connection thread. Turned into domain errors
/// once back on the async side.
enum Outcome<T> {
  Done(T),
  /// The row the call addresses does not exist.
  Missing,
  /// The acting user has no profile.
  NoProfile,
  /// A module position is taken; carries the owning course id.
  Conflict(String),
}

enum Purchase {
  Created(RawEntitlement),
  Existing(RawEntitlement),
  Entitled,
  NoProfile,
  NoCourse,
}

enum Upgrade {
  Created(RawUpgrade),
  Existing(RawUpgrade),
  AtTier,
  NoProfile,
}

/// A conditional status update on an entitlement or upgrade row.
enum Transition<R> {
  Applied(R, Option<Tier>),
  Unchanged(R),
  /// The row sits in a state the update may not leave; carries that state.
  Refused(String),
  Missing,
}

// ─── Row helpers ─────────────────────────────────────────────────────────────

fn fetch_profile(
  conn: &rusqlite::Connection,
  user_id: &str,
) -> rusqlite::Result<Option<RawProfile>> {
  conn
    .query_row(
      &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = ?1"),
      [user_id],
      RawProfile::from_row,
    )
    .optional()
}

fn fetch_course(
  conn: &rusqlite::Connection,
  course_id: &str,
) -> rusqlite::Result<Option<RawCourse>> {
  conn
    .query_row(
      &format!("SELECT {COURSE_COLUMNS} FROM courses WHERE course_id = ?1"),
      [course_id],
      RawCourse::from_row,
    )
    .optional()
}

fn fetch_module(
  conn: &rusqlite::Connection,
  module_id: &str,
) -> rusqlite::Result<Option<RawModule>> {
  conn
    .query_row(
      &format!("SELECT {MODULE_COLUMNS} FROM course_modules WHERE module_id = ?1"),
      [module_id],
      RawModule::from_row,
    )
    .optional()
}

fn fetch_entitlement(
  conn: &rusqlite::Connection,
  entitlement_id: &str,
) -> rusqlite::Result<Option<RawEntitlement>> {
  conn
    .query_row(
      &format!(
        "SELECT {ENTITLEMENT_COLUMNS} FROM user_courses WHERE entitlement_id = ?1"
      ),
      [entitlement_id],
      RawEntitlement::from_row,
    )
    .optional()
}

fn fetch_upgrade(
  conn: &rusqlite::Connection,
  upgrade_id: &str,
) -> rusqlite::Result<Option<RawUpgrade>> {
  conn
    .query_row(
      &format!("SELECT {UPGRADE_COLUMNS} FROM tier_upgrades WHERE upgrade_id = ?1"),
      [upgrade_id],
      RawUpgrade::from_row,
    )
    .optional()
}

fn fetch_progress(
  conn: &rusqlite::Connection,
  user_id: &str,
  module_id: &str,
) -> rusqlite::Result<Option<RawProgress>> {
  conn
    .query_row(
      &format!(
        "SELECT {PROGRESS_COLUMNS} FROM user_progress
         WHERE user_id = ?1 AND module_id = ?2"
      ),
      [user_id, module_id],
      RawProgress::from_row,
    )
    .optional()
}

fn exists(
  conn: &rusqlite::Connection,
  sql: &str,
  params: impl rusqlite::Params,
) -> rusqlite::Result<bool> {
  Ok(conn.query_row(sql, params, |_| Ok(())).optional()?.is_some())
}

fn profile_exists(conn: &rusqlite::Connection, user_id: &str) -> rusqlite::Result<bool> {
  exists(conn, "SELECT 1 FROM profiles WHERE user_id = ?1", [user_id])
}

fn position_taken(
  conn: &rusqlite::Connection,
  course_id: &str,
  position: u32,
  except_module: Option<&str>,
) -> rusqlite::Result<bool> {
  exists(
    conn,
    "SELECT 1 FROM course_modules
     WHERE course_id = ?1 AND position = ?2
       AND (?3 IS NULL OR module_id <> ?3)",
    rusqlite::params![course_id, position, except_module],
  )
}

/// Append one row to `user_activity`. Returns the new activity id.
fn insert_activity(
  conn: &rusqlite::Connection,
  user_id: &str,
  kind: ActivityKind,
  course_id: Option<&str>,
  module_id: Option<&str>,
  metadata: &serde_json::Value,
  at: &str,
) -> rusqlite::Result<String> {
  let activity_id = encode_uuid(Uuid::new_v4());
  conn.execute(
    "INSERT INTO user_activity (
       activity_id, user_id, activity_type, course_id, module_id, metadata, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    rusqlite::params![
      activity_id,
      user_id,
      encode_activity_kind(kind),
      course_id,
      module_id,
      metadata.to_string(),
      at,
    ],
  )?;
  Ok(activity_id)
}

fn tier_upgrade_metadata(from: Tier, to: Tier, source: &str) -> serde_json::Value {
  json!({ "from": from.as_str(), "to": to.as_str(), "source": source })
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Coursegate learning store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Progress upsert shared by `mark_complete` and `record_access`.
  async fn write_progress(
    &self,
    user_id: Uuid,
    module_id: Uuid,
    complete: bool,
  ) -> Result<Progress> {
    let user_str   = encode_uuid(user_id);
    let module_str = encode_uuid(module_id);
    let now_str    = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let module: Option<(String, Option<bool>)> = tx
          .query_row(
            "SELECT m.course_id, p.completed
             FROM course_modules m
             LEFT JOIN user_progress p
               ON p.module_id = m.module_id AND p.user_id = ?2
             WHERE m.module_id = ?1",
            [&module_str, &user_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        let Some((course_str, was_completed)) = module else {
          return Ok(Outcome::Missing);
        };
        if !profile_exists(&tx, &user_str)? {
          return Ok(Outcome::NoProfile);
        }

        if complete {
          tx.execute(
            "INSERT INTO user_progress (
               user_id, module_id, completed, progress_percentage,
               completed_at, last_accessed
             ) VALUES (?1, ?2, 1, 100, ?3, NULL)
             ON CONFLICT (user_id, module_id) DO UPDATE SET
               completed           = 1,
               progress_percentage = 100,
               completed_at        = COALESCE(user_progress.completed_at, excluded.completed_at)",
            [&user_str, &module_str, &now_str],
          )?;
          if !was_completed.unwrap_or(false) {
            insert_activity(
              &tx,
              &user_str,
              ActivityKind::ModuleComplete,
              Some(&course_str),
              Some(&module_str),
              &json!({}),
              &now_str,
            )?;
          }
        } else {
          tx.execute(
            "INSERT INTO user_progress (
               user_id, module_id, completed, progress_percentage,
               completed_at, last_accessed
             ) VALUES (?1, ?2, 0, 0, NULL, ?3)
             ON CONFLICT (user_id, module_id) DO UPDATE SET
               last_accessed = excluded.last_accessed",
            [&user_str, &module_str, &now_str],
          )?;
          insert_activity(
            &tx,
            &user_str,
            ActivityKind::ModuleAccess,
            Some(&course_str),
            Some(&module_str),
            &json!({}),
            &now_str,
          )?;
        }

        let row = fetch_progress(&tx, &user_str, &module_str)?;
        tx.commit()?;
        Ok(row.map_or(Outcome::Missing, Outcome::Done))
      })
      .await?;

    match outcome {
      Outcome::Done(raw) => raw.into_progress(),
      Outcome::NoProfile => {
        Err(coursegate_core::Error::ProfileNotFound(user_id).into())
      }
      Outcome::Missing | Outcome::Conflict(_) => {
        Err(coursegate_core::Error::ModuleNotFound(module_id).into())
      }
    }
  }
}

fn purchase_outcome(user_id: Uuid, course_id: Uuid, outcome: Purchase) -> Result<RawEntitlement> {
  match outcome {
    Purchase::Created(raw) | Purchase::Existing(raw) => Ok(raw),
    Purchase::Entitled => {
      Err(coursegate_core::Error::AlreadyEntitled { user_id, course_id }.into())
    }
    Purchase::NoProfile => Err(coursegate_core::Error::ProfileNotFound(user_id).into()),
    Purchase::NoCourse => Err(coursegate_core::Error::CourseNotFound(course_id).into()),
  }
}

fn refused(attempt_id: Uuid, from: &str, to: PaymentStatus) -> Error {
  match decode_status(from) {
    Ok(from) => coursegate_core::Error::InvalidTransition { attempt_id, from, to }.into(),
    Err(e) => e,
  }
}

// ─── LearningStore impl ──────────────────────────────────────────────────────

impl LearningStore for SqliteStore {
  type Error = Error;

  // ── Profiles ──────────────────────────────────────────────────────────────

  async fn ensure_profile(&self, user_id: Uuid, email: String) -> Result<UserProfile> {
    let id_str  = encode_uuid(user_id);
    let now_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO profiles (user_id, email, subscription_tier, created_at, updated_at)
           VALUES (?1, ?2, 'free', ?3, ?3)
           ON CONFLICT (user_id) DO UPDATE SET
             email      = excluded.email,
             updated_at = excluded.updated_at
           WHERE profiles.email <> excluded.email",
          rusqlite::params![id_str, email, now_str],
        )?;
        Ok(fetch_profile(conn, &id_str)?)
      })
      .await?;

    raw
      .ok_or(coursegate_core::Error::ProfileNotFound(user_id))?
      .into_profile()
  }

  async fn get_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
    let id_str = encode_uuid(user_id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_profile(conn, &id_str)?))
      .await?;
    raw.map(RawProfile::into_profile).transpose()
  }

  async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
    let raws: Vec<RawProfile> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY created_at, email"
        ))?;
        let rows = stmt
          .query_map([], RawProfile::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProfile::into_profile).collect()
  }

  async fn set_tier(&self, user_id: Uuid, tier: Tier) -> Result<UserProfile> {
    let id_str  = encode_uuid(user_id);
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(before) = fetch_profile(&tx, &id_str)? else {
          return Ok(Outcome::Missing);
        };
        let from = decode_user_tier(&before.subscription_tier);

        tx.execute(
          "UPDATE profiles SET subscription_tier = ?2, updated_at = ?3 WHERE user_id = ?1",
          rusqlite::params![id_str, encode_tier(tier), now_str],
        )?;
        if tier > from {
          insert_activity(
            &tx,
            &id_str,
            ActivityKind::TierUpgrade,
            None,
            None,
            &tier_upgrade_metadata(from, tier, "admin"),
            &now_str,
          )?;
        }

        let after = fetch_profile(&tx, &id_str)?;
        tx.commit()?;
        Ok(after.map_or(Outcome::Missing, Outcome::Done))
      })
      .await?;

    match outcome {
      Outcome::Done(raw) => {
        tracing::info!(%user_id, %tier, "subscription tier set");
        raw.into_profile()
      }
      _ => Err(coursegate_core::Error::ProfileNotFound(user_id).into()),
    }
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn store_session(&self, digest: String, session: Session) -> Result<()> {
    let user_str    = encode_uuid(session.user_id);
    let expires_str = encode_dt(session.expires_at);

    let stored = self
      .conn
      .call(move |conn| {
        if !profile_exists(conn, &user_str)? {
          return Ok(false);
        }
        conn.execute(
          "INSERT OR REPLACE INTO sessions (token_digest, user_id, email, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![digest, user_str, session.email, expires_str],
        )?;
        Ok(true)
      })
      .await?;

    if !stored {
      return Err(coursegate_core::Error::ProfileNotFound(session.user_id).into());
    }
    Ok(())
  }

  async fn find_session<'a>(&'a self, digest: &'a str) -> Result<Option<Session>> {
    let digest = digest.to_owned();
    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT user_id, email, expires_at FROM sessions WHERE token_digest = ?1",
            [digest],
            |row| {
              Ok(RawSession {
                user_id:    row.get(0)?,
                email:      row.get(1)?,
                expires_at: row.get(2)?,
              })
            },
          )
          .optional()?)
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  // ── Courses ───────────────────────────────────────────────────────────────

  async fn add_course(&self, input: NewCourse) -> Result<Course> {
    input.validate()?;
    let now = Utc::now();
    let course = Course {
      course_id:     Uuid::new_v4(),
      title:         input.title,
      description:   input.description,
      required_tier: input.required_tier,
      price:         input.price,
      is_active:     input.is_active,
      access_days:   input.access_days,
      created_at:    now,
      updated_at:    now,
    };

    let id_str   = encode_uuid(course.course_id);
    let title    = course.title.clone();
    let desc     = course.description.clone();
    let tier_str = encode_tier(course.required_tier);
    let price    = course.price;
    let active   = course.is_active;
    let days     = course.access_days;
    let at_str   = encode_dt(now);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO courses (
             course_id, title, description, required_tier, price,
             is_active, access_days, created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
          rusqlite::params![id_str, title, desc, tier_str, price, active, days, at_str],
        )?;
        Ok(())
      })
      .await?;

    tracing::info!(course_id = %course.course_id, title = %course.title, "course added");
    Ok(course)
  }

  async fn update_course(&self, course_id: Uuid, input: NewCourse) -> Result<Course> {
    input.validate()?;
    let id_str  = encode_uuid(course_id);
    let now_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE courses SET
             title = ?2, description = ?3, required_tier = ?4, price = ?5,
             is_active = ?6, access_days = ?7, updated_at = ?8
           WHERE course_id = ?1",
          rusqlite::params![
            id_str,
            input.title,
            input.description,
            encode_tier(input.required_tier),
            input.price,
            input.is_active,
            input.access_days,
            now_str,
          ],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_course(conn, &id_str)?)
      })
      .await?;

    raw
      .ok_or(coursegate_core::Error::CourseNotFound(course_id))?
      .into_course()
  }

  async fn set_course_active(&self, course_id: Uuid, is_active: bool) -> Result<Course> {
    let id_str  = encode_uuid(course_id);
    let now_str = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE courses SET is_active = ?2, updated_at = ?3 WHERE course_id = ?1",
          rusqlite::params![id_str, is_active, now_str],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        Ok(fetch_course(conn, &id_str)?)
      })
      .await?;

    raw
      .ok_or(coursegate_core::Error::CourseNotFound(course_id))?
      .into_course()
  }

  async fn delete_course(&self, course_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(course_id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM courses WHERE course_id = ?1", [id_str])?)
      })
      .await?;

    if deleted == 0 {
      return Err(coursegate_core::Error::CourseNotFound(course_id).into());
    }
    tracing::info!(%course_id, "course deleted");
    Ok(())
  }

  async fn get_course(&self, course_id: Uuid) -> Result<Option<Course>> {
    let id_str = encode_uuid(course_id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_course(conn, &id_str)?))
      .await?;
    raw.map(RawCourse::into_course).transpose()
  }

  async fn list_courses(&self, include_inactive: bool) -> Result<Vec<Course>> {
    let raws: Vec<RawCourse> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {COURSE_COLUMNS} FROM courses
           WHERE ?1 OR is_active = 1
           ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map([include_inactive], RawCourse::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawCourse::into_course).collect()
  }

  // ── Modules ───────────────────────────────────────────────────────────────

  async fn add_module(&self, course_id: Uuid, input: NewModule) -> Result<Module> {
    input.validate()?;
    let module = Module {
      module_id:     Uuid::new_v4(),
      course_id,
      position:      input.position,
      title:         input.title,
      required_tier: input.required_tier,
      is_premium:    input.is_premium,
      duration_secs: input.duration_secs,
      media_ref:     input.media_ref,
    };

    let id_str     = encode_uuid(module.module_id);
    let course_str = encode_uuid(course_id);
    let position   = module.position;
    let title      = module.title.clone();
    let tier_str   = encode_tier(module.required_tier);
    let premium    = module.is_premium;
    let duration   = module.duration_secs;
    let media      = module.media_ref.clone();

    let outcome = self
      .conn
      .call(move |conn| {
        if fetch_course(conn, &course_str)?.is_none() {
          return Ok(Outcome::Missing);
        }
        if position_taken(conn, &course_str, position, None)? {
          return Ok(Outcome::Conflict(course_str));
        }
        conn.execute(
          "INSERT INTO course_modules (
             module_id, course_id, position, title, required_tier,
             is_premium, duration_secs, media_ref
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, course_str, position, title, tier_str, premium, duration, media
          ],
        )?;
        Ok(Outcome::Done(()))
      })
      .await?;

    match outcome {
      Outcome::Done(()) => Ok(module),
      Outcome::Conflict(_) => Err(
        coursegate_core::Error::DuplicateModulePosition { course_id, position }.into(),
      ),
      Outcome::Missing | Outcome::NoProfile => {
        Err(coursegate_core::Error::CourseNotFound(course_id).into())
      }
    }
  }

  async fn update_module(&self, module_id: Uuid, input: NewModule) -> Result<Module> {
    input.validate()?;
    let id_str   = encode_uuid(module_id);
    let position = input.position;

    let outcome = self
      .conn
      .call(move |conn| {
        let Some(current) = fetch_module(conn, &id_str)? else {
          return Ok(Outcome::Missing);
        };
        if position_taken(conn, &current.course_id, input.position, Some(&id_str))? {
          return Ok(Outcome::Conflict(current.course_id));
        }
        conn.execute(
          "UPDATE course_modules SET
             position = ?2, title = ?3, required_tier = ?4,
             is_premium = ?5, duration_secs = ?6, media_ref = ?7
           WHERE module_id = ?1",
          rusqlite::params![
            id_str,
            input.position,
            input.title,
            encode_tier(input.required_tier),
            input.is_premium,
            input.duration_secs,
            input.media_ref,
          ],
        )?;
        Ok(fetch_module(conn, &id_str)?.map_or(Outcome::Missing, Outcome::Done))
      })
      .await?;

    match outcome {
      Outcome::Done(raw) => raw.into_module(),
      Outcome::Conflict(course_str) => Err(
        coursegate_core::Error::DuplicateModulePosition {
          course_id: decode_uuid(&course_str)?,
          position,
        }
        .into(),
      ),
      Outcome::Missing | Outcome::NoProfile => {
        Err(coursegate_core::Error::ModuleNotFound(module_id).into())
      }
    }
  }

  async fn delete_module(&self, module_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(module_id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM course_modules WHERE module_id = ?1", [id_str])?)
      })
      .await?;

    if deleted == 0 {
      return Err(coursegate_core::Error::ModuleNotFound(module_id).into());
    }
    Ok(())
  }

  async fn get_module(&self, module_id: Uuid) -> Result<Option<Module>> {
    let id_str = encode_uuid(module_id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_module(conn, &id_str)?))
      .await?;
    raw.map(RawModule::into_module).transpose()
  }

  async fn list_modules(&self, course_id: Uuid) -> Result<Vec<Module>> {
    let course_str = encode_uuid(course_id);
    let raws: Vec<RawModule> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MODULE_COLUMNS} FROM course_modules
           WHERE course_id = ?1 ORDER BY position"
        ))?;
        let rows = stmt
          .query_map([course_str], RawModule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawModule::into_module).collect()
  }

  // ── Downloads ─────────────────────────────────────────────────────────────

  async fn add_download(&self, course_id: Uuid, input: NewDownload) -> Result<Download> {
    input.validate()?;
    let download = Download {
      download_id: Uuid::new_v4(),
      course_id,
      title:       input.title,
      url:         input.url,
      is_premium:  input.is_premium,
      created_at:  Utc::now(),
    };

    let id_str     = encode_uuid(download.download_id);
    let course_str = encode_uuid(course_id);
    let title      = download.title.clone();
    let url        = download.url.clone();
    let premium    = download.is_premium;
    let at_str     = encode_dt(download.created_at);

    let added = self
      .conn
      .call(move |conn| {
        if fetch_course(conn, &course_str)?.is_none() {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO course_downloads (
             download_id, course_id, title, url, is_premium, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, course_str, title, url, premium, at_str],
        )?;
        Ok(true)
      })
      .await?;

    if !added {
      return Err(coursegate_core::Error::CourseNotFound(course_id).into());
    }
    Ok(download)
  }

  async fn delete_download(&self, download_id: Uuid) -> Result<()> {
    let id_str = encode_uuid(download_id);
    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute("DELETE FROM course_downloads WHERE download_id = ?1", [id_str])?)
      })
      .await?;

    if deleted == 0 {
      return Err(coursegate_core::Error::DownloadNotFound(download_id).into());
    }
    Ok(())
  }

  async fn list_downloads(&self, course_id: Uuid) -> Result<Vec<Download>> {
    let course_str = encode_uuid(course_id);
    let raws: Vec<RawDownload> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {DOWNLOAD_COLUMNS} FROM course_downloads
           WHERE course_id = ?1 ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map([course_str], RawDownload::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDownload::into_download).collect()
  }

  // ── Entitlements ──────────────────────────────────────────────────────────

  async fn begin_purchase(&self, user_id: Uuid, course_id: Uuid) -> Result<Entitlement> {
    let user_str   = encode_uuid(user_id);
    let course_str = encode_uuid(course_id);
    let now_str    = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if !profile_exists(&tx, &user_str)? {
          return Ok(Purchase::NoProfile);
        }
        let course = match fetch_course(&tx, &course_str)? {
          Some(c) if c.is_active => c,
          _ => return Ok(Purchase::NoCourse),
        };

        let pending = tx
          .query_row(
            &format!(
              "SELECT {ENTITLEMENT_COLUMNS} FROM user_courses
               WHERE user_id = ?1 AND course_id = ?2 AND payment_status = 'pending'"
            ),
            [&user_str, &course_str],
            RawEntitlement::from_row,
          )
          .optional()?;
        if let Some(raw) = pending {
          return Ok(Purchase::Existing(raw));
        }

        let entitled = exists(
          &tx,
          "SELECT 1 FROM user_courses
           WHERE user_id = ?1 AND course_id = ?2 AND payment_status = 'completed'
             AND (expires_at IS NULL OR expires_at > ?3)",
          [&user_str, &course_str, &now_str],
        )?;
        if entitled {
          return Ok(Purchase::Entitled);
        }

        let id_str = encode_uuid(Uuid::new_v4());
        tx.execute(
          "INSERT INTO user_courses (
             entitlement_id, user_id, course_id, payment_status,
             purchase_price, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id_str,
            user_str,
            course_str,
            encode_status(PaymentStatus::Pending),
            course.price,
            now_str,
          ],
        )?;
        let created = fetch_entitlement(&tx, &id_str)?;
        tx.commit()?;
        Ok(created.map_or(Purchase::NoCourse, Purchase::Created))
      })
      .await?;

    let created = matches!(outcome, Purchase::Created(_));
    let entitlement = purchase_outcome(user_id, course_id, outcome)?.into_entitlement()?;
    if created {
      tracing::info!(
        entitlement_id = %entitlement.entitlement_id,
        %user_id,
        %course_id,
        price = entitlement.purchase_price,
        "purchase started"
      );
    }
    Ok(entitlement)
  }

  async fn get_entitlement(&self, entitlement_id: Uuid) -> Result<Option<Entitlement>> {
    let id_str = encode_uuid(entitlement_id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_entitlement(conn, &id_str)?))
      .await?;
    raw.map(RawEntitlement::into_entitlement).transpose()
  }

  async fn list_entitlements(
    &self,
    user_id: Uuid,
    course_id: Option<Uuid>,
  ) -> Result<Vec<Entitlement>> {
    let user_str   = encode_uuid(user_id);
    let course_str = course_id.map(encode_uuid);

    let raws: Vec<RawEntitlement> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ENTITLEMENT_COLUMNS} FROM user_courses
           WHERE user_id = ?1 AND (?2 IS NULL OR course_id = ?2)
           ORDER BY created_at, rowid"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![user_str, course_str],
            RawEntitlement::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntitlement::into_entitlement).collect()
  }

  async fn confirm_entitlement(
    &self,
    entitlement_id: Uuid,
    payment_ref: String,
  ) -> Result<Confirmation> {
    let Some(current) = self.get_entitlement(entitlement_id).await? else {
      return Err(coursegate_core::Error::EntitlementNotFound(entitlement_id).into());
    };
    let course = self
      .get_course(current.course_id)
      .await?
      .ok_or(coursegate_core::Error::CourseNotFound(current.course_id))?;

    let now: DateTime<Utc> = Utc::now();
    let id_str      = encode_uuid(entitlement_id);
    let now_str     = encode_dt(now);
    let expires_str = course.expiry_from(now)?.map(encode_dt);
    let course_tier = course.required_tier;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE user_courses SET
             payment_status = 'completed',
             payment_ref    = ?2,
             confirmed_at   = ?3,
             expires_at     = ?4
           WHERE entitlement_id = ?1 AND payment_status = 'pending'",
          rusqlite::params![id_str, payment_ref, now_str, expires_str],
        )?;

        let Some(row) = fetch_entitlement(&tx, &id_str)? else {
          return Ok(Transition::Missing);
        };
        if changed == 0 {
          return Ok(if row.payment_status == "completed" {
            Transition::Unchanged(row)
          } else {
            Transition::Refused(row.payment_status)
          });
        }

        let mut upgraded_to = None;
        if let Some(profile) = fetch_profile(&tx, &row.user_id)? {
          let from = decode_user_tier(&profile.subscription_tier);
          if course_tier > from {
            tx.execute(
              "UPDATE profiles SET subscription_tier = ?2, updated_at = ?3
               WHERE user_id = ?1",
              rusqlite::params![row.user_id, encode_tier(course_tier), now_str],
            )?;
            insert_activity(
              &tx,
              &row.user_id,
              ActivityKind::TierUpgrade,
              Some(&row.course_id),
              None,
              &tier_upgrade_metadata(from, course_tier, "purchase"),
              &now_str,
            )?;
            upgraded_to = Some(course_tier);
          }
        }

        insert_activity(
          &tx,
          &row.user_id,
          ActivityKind::CoursePurchase,
          Some(&row.course_id),
          None,
          &json!({
            "entitlement_id": row.entitlement_id,
            "amount": row.purchase_price,
            "payment_ref": row.payment_ref,
          }),
          &now_str,
        )?;

        tx.commit()?;
        Ok(Transition::Applied(row, upgraded_to))
      })
      .await?;

    match outcome {
      Transition::Applied(raw, upgraded_to) => {
        let entitlement = raw.into_entitlement()?;
        tracing::info!(
          %entitlement_id,
          user_id = %entitlement.user_id,
          course_id = %entitlement.course_id,
          upgraded_to = ?upgraded_to,
          "entitlement completed"
        );
        Ok(Confirmation { entitlement, newly_completed: true, upgraded_to })
      }
      Transition::Unchanged(raw) => {
        tracing::debug!(%entitlement_id, "duplicate confirmation ignored");
        Ok(Confirmation {
          entitlement:     raw.into_entitlement()?,
          newly_completed: false,
          upgraded_to:     None,
        })
      }
      Transition::Refused(from) => {
        Err(refused(entitlement_id, &from, PaymentStatus::Completed))
      }
      Transition::Missing => {
        Err(coursegate_core::Error::EntitlementNotFound(entitlement_id).into())
      }
    }
  }

  async fn fail_entitlement(
    &self,
    entitlement_id: Uuid,
    payment_ref: String,
  ) -> Result<Entitlement> {
    let id_str = encode_uuid(entitlement_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE user_courses SET payment_status = 'failed', payment_ref = ?2
           WHERE entitlement_id = ?1 AND payment_status = 'pending'",
          rusqlite::params![id_str, payment_ref],
        )?;
        let Some(row) = fetch_entitlement(conn, &id_str)? else {
          return Ok(Transition::Missing);
        };
        if changed > 0 {
          return Ok(Transition::Applied(row, None));
        }
        Ok(if row.payment_status == "failed" {
          Transition::Unchanged(row)
        } else {
          Transition::Refused(row.payment_status)
        })
      })
      .await?;

    match outcome {
      Transition::Applied(raw, _) => {
        tracing::info!(%entitlement_id, "entitlement failed");
        raw.into_entitlement()
      }
      Transition::Unchanged(raw) => raw.into_entitlement(),
      Transition::Refused(from) => {
        Err(refused(entitlement_id, &from, PaymentStatus::Failed))
      }
      Transition::Missing => {
        Err(coursegate_core::Error::EntitlementNotFound(entitlement_id).into())
      }
    }
  }

  // ── Tier upgrades ─────────────────────────────────────────────────────────

  async fn begin_upgrade(&self, user_id: Uuid, target: Tier, price: i64) -> Result<TierUpgrade> {
    let user_str = encode_uuid(user_id);
    let now_str  = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(profile) = fetch_profile(&tx, &user_str)? else {
          return Ok(Upgrade::NoProfile);
        };
        let current = decode_user_tier(&profile.subscription_tier);
        if current >= target {
          return Ok(Upgrade::AtTier);
        }

        let pending = tx
          .query_row(
            &format!(
              "SELECT {UPGRADE_COLUMNS} FROM tier_upgrades
               WHERE user_id = ?1 AND payment_status = 'pending'"
            ),
            [&user_str],
            RawUpgrade::from_row,
          )
          .optional()?;
        if let Some(raw) = pending {
          if raw.target_tier == encode_tier(target) && raw.price == price {
            return Ok(Upgrade::Existing(raw));
          }
          tx.execute(
            "UPDATE tier_upgrades SET payment_status = 'failed' WHERE upgrade_id = ?1",
            [&raw.upgrade_id],
          )?;
        }

        let id_str = encode_uuid(Uuid::new_v4());
        tx.execute(
          "INSERT INTO tier_upgrades (
             upgrade_id, user_id, from_tier, target_tier, price,
             payment_status, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          rusqlite::params![
            id_str,
            user_str,
            encode_tier(current),
            encode_tier(target),
            price,
            encode_status(PaymentStatus::Pending),
            now_str,
          ],
        )?;
        let created = fetch_upgrade(&tx, &id_str)?;
        tx.commit()?;
        Ok(created.map_or(Upgrade::NoProfile, Upgrade::Created))
      })
      .await?;

    let raw = match outcome {
      Upgrade::Created(raw) => {
        tracing::info!(%user_id, %target, price, "tier upgrade started");
        raw
      }
      Upgrade::Existing(raw) => raw,
      Upgrade::AtTier => {
        return Err(coursegate_core::Error::AlreadyAtTier { tier: target }.into());
      }
      Upgrade::NoProfile => {
        return Err(coursegate_core::Error::ProfileNotFound(user_id).into());
      }
    };
    raw.into_upgrade()
  }

  async fn get_upgrade(&self, upgrade_id: Uuid) -> Result<Option<TierUpgrade>> {
    let id_str = encode_uuid(upgrade_id);
    let raw = self
      .conn
      .call(move |conn| Ok(fetch_upgrade(conn, &id_str)?))
      .await?;
    raw.map(RawUpgrade::into_upgrade).transpose()
  }

  async fn confirm_upgrade(
    &self,
    upgrade_id: Uuid,
    payment_ref: String,
  ) -> Result<UpgradeConfirmation> {
    let Some(current) = self.get_upgrade(upgrade_id).await? else {
      return Err(coursegate_core::Error::UpgradeNotFound(upgrade_id).into());
    };
    let target  = current.target_tier;
    let id_str  = encode_uuid(upgrade_id);
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let changed = tx.execute(
          "UPDATE tier_upgrades SET
             payment_status = 'completed',
             payment_ref    = ?2,
             confirmed_at   = ?3
           WHERE upgrade_id = ?1 AND payment_status = 'pending'",
          rusqlite::params![id_str, payment_ref, now_str],
        )?;

        let Some(row) = fetch_upgrade(&tx, &id_str)? else {
          return Ok(Transition::Missing);
        };
        if changed == 0 {
          return Ok(if row.payment_status == "completed" {
            Transition::Unchanged(row)
          } else {
            Transition::Refused(row.payment_status)
          });
        }

        let mut upgraded_to = None;
        if let Some(profile) = fetch_profile(&tx, &row.user_id)? {
          let from = decode_user_tier(&profile.subscription_tier);
          if target > from {
            tx.execute(
              "UPDATE profiles SET subscription_tier = ?2, updated_at = ?3
               WHERE user_id = ?1",
              rusqlite::params![row.user_id, encode_tier(target), now_str],
            )?;
            let mut metadata = tier_upgrade_metadata(from, target, "upgrade");
            metadata["upgrade_id"] = json!(row.upgrade_id);
            metadata["amount"] = json!(row.price);
            insert_activity(
              &tx,
              &row.user_id,
              ActivityKind::TierUpgrade,
              None,
              None,
              &metadata,
              &now_str,
            )?;
            upgraded_to = Some(target);
          }
        }

        tx.commit()?;
        Ok(Transition::Applied(row, upgraded_to))
      })
      .await?;

    match outcome {
      Transition::Applied(raw, upgraded_to) => {
        let upgrade = raw.into_upgrade()?;
        tracing::info!(
          %upgrade_id,
          user_id = %upgrade.user_id,
          upgraded_to = ?upgraded_to,
          "tier upgrade completed"
        );
        Ok(UpgradeConfirmation { upgrade, newly_completed: true, upgraded_to })
      }
      Transition::Unchanged(raw) => {
        tracing::debug!(%upgrade_id, "duplicate upgrade confirmation ignored");
        Ok(UpgradeConfirmation {
          upgrade:         raw.into_upgrade()?,
          newly_completed: false,
          upgraded_to:     None,
        })
      }
      Transition::Refused(from) => Err(refused(upgrade_id, &from, PaymentStatus::Completed)),
      Transition::Missing => {
        Err(coursegate_core::Error::UpgradeNotFound(upgrade_id).into())
      }
    }
  }

  async fn fail_upgrade(&self, upgrade_id: Uuid, payment_ref: String) -> Result<TierUpgrade> {
    let id_str = encode_uuid(upgrade_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE tier_upgrades SET payment_status = 'failed', payment_ref = ?2
           WHERE upgrade_id = ?1 AND payment_status = 'pending'",
          rusqlite::params![id_str, payment_ref],
        )?;
        let Some(row) = fetch_upgrade(conn, &id_str)? else {
          return Ok(Transition::Missing);
        };
        if changed > 0 {
          return Ok(Transition::Applied(row, None));
        }
        Ok(if row.payment_status == "failed" {
          Transition::Unchanged(row)
        } else {
          Transition::Refused(row.payment_status)
        })
      })
      .await?;

    match outcome {
      Transition::Applied(raw, _) => {
        tracing::info!(%upgrade_id, "tier upgrade failed");
        raw.into_upgrade()
      }
      Transition::Unchanged(raw) => raw.into_upgrade(),
      Transition::Refused(from) => Err(refused(upgrade_id, &from, PaymentStatus::Failed)),
      Transition::Missing => {
        Err(coursegate_core::Error::UpgradeNotFound(upgrade_id).into())
      }
    }
  }

  // ── Progress ──────────────────────────────────────────────────────────────

  async fn mark_complete(&self, user_id: Uuid, module_id: Uuid) -> Result<Progress> {
    self.write_progress(user_id, module_id, true).await
  }

  async fn record_access(&self, user_id: Uuid, module_id: Uuid) -> Result<Progress> {
    self.write_progress(user_id, module_id, false).await
  }

  async fn list_progress(&self, user_id: Uuid, course_id: Uuid) -> Result<Vec<Progress>> {
    let user_str   = encode_uuid(user_id);
    let course_str = encode_uuid(course_id);

    let raws: Vec<RawProgress> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT p.user_id, p.module_id, p.completed, p.progress_percentage,
                  p.completed_at, p.last_accessed
           FROM user_progress p
           JOIN course_modules m ON m.module_id = p.module_id
           WHERE p.user_id = ?1 AND m.course_id = ?2
           ORDER BY m.position",
        )?;
        let rows = stmt
          .query_map([user_str, course_str], RawProgress::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawProgress::into_progress).collect()
  }

  async fn course_progress(&self, user_id: Uuid, course_id: Uuid) -> Result<CourseProgress> {
    let modules  = self.list_modules(course_id).await?;
    let progress = self.list_progress(user_id, course_id).await?;
    Ok(CourseProgress::compute(&modules, &progress))
  }

  // ── Activity ──────────────────────────────────────────────────────────────

  async fn record_activity(&self, input: NewActivity) -> Result<Activity> {
    let created_at = Utc::now();
    let user_str   = encode_uuid(input.user_id);
    let course_str = input.course_id.map(encode_uuid);
    let module_str = input.module_id.map(encode_uuid);
    let metadata   = input.metadata.clone();
    let kind       = input.kind;
    let at_str     = encode_dt(created_at);

    let outcome = self
      .conn
      .call(move |conn| {
        if !profile_exists(conn, &user_str)? {
          return Ok(Outcome::NoProfile);
        }
        let id = insert_activity(
          conn,
          &user_str,
          kind,
          course_str.as_deref(),
          module_str.as_deref(),
          &metadata,
          &at_str,
        )?;
        Ok(Outcome::Done(id))
      })
      .await?;

    let activity_id = match outcome {
      Outcome::Done(id) => decode_uuid(&id)?,
      _ => return Err(coursegate_core::Error::ProfileNotFound(input.user_id).into()),
    };

    Ok(Activity {
      activity_id,
      user_id: input.user_id,
      kind: input.kind,
      course_id: input.course_id,
      module_id: input.module_id,
      metadata: input.metadata,
      created_at,
    })
  }

  async fn list_activity(&self, user_id: Uuid, limit: usize) -> Result<Vec<Activity>> {
    let user_str  = encode_uuid(user_id);
    let limit_val = i64::try_from(limit).unwrap_or(i64::MAX);

    let raws: Vec<RawActivity> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {ACTIVITY_COLUMNS} FROM user_activity
           WHERE user_id = ?1
           ORDER BY created_at DESC, rowid DESC
           LIMIT ?2"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_str, limit_val], RawActivity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawActivity::into_activity).collect()
  }

  // ── Administration ────────────────────────────────────────────────────────

  async fn stats(&self) -> Result<PlatformStats> {
    let stats = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT COUNT(*) FROM profiles),
             (SELECT COUNT(*) FROM courses),
             (SELECT COUNT(*) FROM courses WHERE is_active = 1),
             (SELECT COUNT(*) FROM course_modules)",
          [],
          |row| {
            let count = |idx: usize| row.get::<_, i64>(idx).map(|n| n.max(0) as u64);
            Ok(PlatformStats {
              total_students: count(0)?,
              total_courses:  count(1)?,
              active_courses: count(2)?,
              total_modules:  count(3)?,
            })
          },
        )?)
      })
      .await?;
    Ok(stats)
  }
}
