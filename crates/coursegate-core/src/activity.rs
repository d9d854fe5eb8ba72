//! Append-only learner activity log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};
use uuid::Uuid;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
  ModuleAccess,
  ModuleComplete,
  CoursePurchase,
  TierUpgrade,
}

impl ActivityKind {
  pub fn as_str(self) -> &'static str { self.into() }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
  pub activity_id: Uuid,
  pub user_id:     Uuid,
  pub kind:        ActivityKind,
  pub course_id:   Option<Uuid>,
  pub module_id:   Option<Uuid>,
  pub metadata:    serde_json::Value,
  pub created_at:  DateTime<Utc>,
}

/// Input to [`crate::store::LearningStore::record_activity`].
#[derive(Debug, Clone)]
pub struct NewActivity {
  pub user_id:   Uuid,
  pub kind:      ActivityKind,
  pub course_id: Option<Uuid>,
  pub module_id: Option<Uuid>,
  pub metadata:  serde_json::Value,
}

impl NewActivity {
  pub fn new(user_id: Uuid, kind: ActivityKind) -> Self {
    Self {
      user_id,
      kind,
      course_id: None,
      module_id: None,
      metadata: serde_json::Value::Object(Default::default()),
    }
  }

  pub fn course(mut self, course_id: Uuid) -> Self {
    self.course_id = Some(course_id);
    self
  }

  pub fn module(mut self, module_id: Uuid) -> Self {
    self.module_id = Some(module_id);
    self
  }

  pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
    self.metadata = metadata;
    self
  }
}
