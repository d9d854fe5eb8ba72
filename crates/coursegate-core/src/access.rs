//! The access evaluator.
//!
//! Every function here is pure. Callers fetch data once per view-load into an
//! [`AccessSnapshot`] and evaluate against it; re-fetch after any mutation.
//!
//! A missing profile means the caller is not authenticated, and every check
//! then answers `false`. Denial is a normal answer, never an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  course::{Course, Download, Module},
  entitlement::{Entitlement, EntitlementState, authoritative},
  profile::UserProfile,
  progress::{CourseProgress, Progress},
  tier::{Tier, rank},
};

// ─── Purchase policy ─────────────────────────────────────────────────────────

/// Who may buy a course they do not yet have access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchasePolicy {
  /// The buyer's tier must already meet the course's tier; lower tiers are
  /// told to upgrade instead.
  #[default]
  RequireQualifyingTier,
  /// Anyone may buy; confirming the purchase raises the buyer to the
  /// course's tier.
  AllowAnyTier,
}

// ─── Decisions ───────────────────────────────────────────────────────────────

/// Course-level gate: a valid entitlement *and* a qualifying tier.
pub fn has_course_access(
  profile: Option<&UserProfile>,
  course: &Course,
  entitlement: Option<&Entitlement>,
  now: DateTime<Utc>,
) -> bool {
  let Some(profile) = profile else {
    return false;
  };
  let Some(entitlement) = entitlement else {
    return false;
  };
  if entitlement.user_id != profile.user_id
    || entitlement.course_id != course.course_id
    || !entitlement.is_valid_at(now)
  {
    return false;
  }
  rank(profile.subscription_tier) >= rank(course.required_tier)
}

/// Module-level gate. `is_premium` wins over `required_tier`: a premium module
/// stays locked to non-premium holders even when the rank check would pass.
pub fn has_module_access(
  profile: Option<&UserProfile>,
  module: &Module,
  course_access: bool,
) -> bool {
  let Some(profile) = profile else {
    return false;
  };
  if !course_access {
    return false;
  }
  if module.is_premium && profile.subscription_tier != Tier::Premium {
    return false;
  }
  rank(profile.subscription_tier) >= rank(module.required_tier)
}

/// Whether to offer a purchase of `course`.
pub fn can_purchase(
  profile: Option<&UserProfile>,
  course: &Course,
  entitlement: Option<&Entitlement>,
  policy: PurchasePolicy,
  now: DateTime<Utc>,
) -> bool {
  let Some(user) = profile else {
    return false;
  };
  if !course.is_active || has_course_access(profile, course, entitlement, now) {
    return false;
  }
  match policy {
    PurchasePolicy::RequireQualifyingTier => {
      rank(user.subscription_tier) >= rank(course.required_tier)
    }
    PurchasePolicy::AllowAnyTier => true,
  }
}

/// Downloads follow the course gate; premium downloads also need the premium
/// tier.
pub fn has_download_access(
  profile: Option<&UserProfile>,
  download: &Download,
  course_access: bool,
) -> bool {
  let Some(profile) = profile else {
    return false;
  };
  course_access
    && (!download.is_premium || profile.subscription_tier == Tier::Premium)
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// Per-module outcome, in play order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDecision {
  pub module_id:  Uuid,
  pub position:   u32,
  pub accessible: bool,
  pub completed:  bool,
}

/// Everything one view-load needs, fetched once and evaluated at one instant.
#[derive(Debug, Clone)]
pub struct AccessSnapshot {
  pub profile:      Option<UserProfile>,
  pub course:       Course,
  /// Sorted by `position`.
  pub modules:      Vec<Module>,
  /// All of the user's entitlement rows for this course.
  pub entitlements: Vec<Entitlement>,
  /// The user's progress rows for this course's modules.
  pub progress:     Vec<Progress>,
  pub as_of:        DateTime<Utc>,
}

impl AccessSnapshot {
  /// Build a snapshot, ordering modules by position.
  pub fn new(
    profile: Option<UserProfile>,
    course: Course,
    mut modules: Vec<Module>,
    entitlements: Vec<Entitlement>,
    progress: Vec<Progress>,
    as_of: DateTime<Utc>,
  ) -> Self {
    modules.sort_by_key(|m| m.position);
    Self { profile, course, modules, entitlements, progress, as_of }
  }

  pub fn tier(&self) -> Option<Tier> {
    self.profile.as_ref().map(|p| p.subscription_tier)
  }

  pub fn entitlement(&self) -> Option<&Entitlement> {
    authoritative(&self.entitlements)
  }

  pub fn entitlement_state(&self) -> EntitlementState {
    EntitlementState::of(self.entitlement(), self.as_of)
  }

  pub fn course_access(&self) -> bool {
    has_course_access(
      self.profile.as_ref(),
      &self.course,
      self.entitlement(),
      self.as_of,
    )
  }

  /// `false` for modules that are not part of this course.
  pub fn module_access(&self, module_id: Uuid) -> bool {
    self
      .module(module_id)
      .is_some_and(|m| has_module_access(self.profile.as_ref(), m, self.course_access()))
  }

  pub fn download_access(&self, download: &Download) -> bool {
    download.course_id == self.course.course_id
      && has_download_access(self.profile.as_ref(), download, self.course_access())
  }

  pub fn can_purchase(&self, policy: PurchasePolicy) -> bool {
    can_purchase(
      self.profile.as_ref(),
      &self.course,
      self.entitlement(),
      policy,
      self.as_of,
    )
  }

  pub fn module(&self, module_id: Uuid) -> Option<&Module> {
    self.modules.iter().find(|m| m.module_id == module_id)
  }

  pub fn is_completed(&self, module_id: Uuid) -> bool {
    self
      .progress
      .iter()
      .any(|p| p.module_id == module_id && p.completed)
  }

  pub fn course_progress(&self) -> CourseProgress {
    CourseProgress::compute(&self.modules, &self.progress)
  }

  pub fn module_decisions(&self) -> Vec<ModuleDecision> {
    let course_access = self.course_access();
    self
      .modules
      .iter()
      .map(|m| ModuleDecision {
        module_id:  m.module_id,
        position:   m.position,
        accessible: has_module_access(self.profile.as_ref(), m, course_access),
        completed:  self.is_completed(m.module_id),
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;

  use super::*;
  use crate::entitlement::PaymentStatus;

  fn profile(tier: Tier) -> UserProfile {
    let now = Utc::now();
    UserProfile {
      user_id:           Uuid::new_v4(),
      email:             "learner@example.com".into(),
      subscription_tier: tier,
      created_at:        now,
      updated_at:        now,
    }
  }

  fn course(required_tier: Tier) -> Course {
    let now = Utc::now();
    Course {
      course_id: Uuid::new_v4(),
      title: "Course".into(),
      description: String::new(),
      required_tier,
      price: 4900,
      is_active: true,
      access_days: None,
      created_at: now,
      updated_at: now,
    }
  }

  fn module(
    course: &Course,
    position: u32,
    required_tier: Tier,
    is_premium: bool,
  ) -> Module {
    Module {
      module_id: Uuid::new_v4(),
      course_id: course.course_id,
      position,
      title: format!("M{position}"),
      required_tier,
      is_premium,
      duration_secs: Some(600),
      media_ref: None,
    }
  }

  fn entitlement(
    user: &UserProfile,
    course: &Course,
    status: PaymentStatus,
    expires_at: Option<DateTime<Utc>>,
  ) -> Entitlement {
    Entitlement {
      entitlement_id: Uuid::new_v4(),
      user_id: user.user_id,
      course_id: course.course_id,
      payment_status: status,
      purchase_price: course.price,
      expires_at,
      payment_ref: None,
      created_at: Utc::now(),
      confirmed_at: None,
    }
  }

  // ── Course access ──────────────────────────────────────────────────────────

  #[test]
  fn no_entitlement_means_no_access_at_any_tier() {
    let now = Utc::now();
    let c = course(Tier::Free);
    for tier in [Tier::Free, Tier::Basic, Tier::Premium] {
      assert!(!has_course_access(Some(&profile(tier)), &c, None, now));
    }
  }

  #[test]
  fn unauthenticated_fails_closed() {
    let now = Utc::now();
    let c = course(Tier::Free);
    let u = profile(Tier::Premium);
    let e = entitlement(&u, &c, PaymentStatus::Completed, None);
    assert!(!has_course_access(None, &c, Some(&e), now));
    assert!(!has_module_access(None, &module(&c, 1, Tier::Free, false), true));
    assert!(!can_purchase(None, &c, None, PurchasePolicy::AllowAnyTier, now));
  }

  #[test]
  fn pending_or_failed_payment_denies() {
    let now = Utc::now();
    let c = course(Tier::Basic);
    let u = profile(Tier::Premium);
    for status in [PaymentStatus::Pending, PaymentStatus::Failed] {
      let e = entitlement(&u, &c, status, None);
      assert!(!has_course_access(Some(&u), &c, Some(&e), now));
    }
  }

  #[test]
  fn expired_one_second_ago_denies() {
    let now = Utc::now();
    let c = course(Tier::Basic);
    let u = profile(Tier::Basic);
    let e = entitlement(
      &u,
      &c,
      PaymentStatus::Completed,
      Some(now - Duration::seconds(1)),
    );
    assert!(!has_course_access(Some(&u), &c, Some(&e), now));

    let future = entitlement(
      &u,
      &c,
      PaymentStatus::Completed,
      Some(now + Duration::seconds(1)),
    );
    assert!(has_course_access(Some(&u), &c, Some(&future), now));
  }

  #[test]
  fn tier_below_course_requirement_denies_even_when_paid() {
    let now = Utc::now();
    let c = course(Tier::Premium);
    let u = profile(Tier::Basic);
    let e = entitlement(&u, &c, PaymentStatus::Completed, None);
    assert!(!has_course_access(Some(&u), &c, Some(&e), now));
  }

  #[test]
  fn entitlement_for_another_user_or_course_denies() {
    let now = Utc::now();
    let c = course(Tier::Free);
    let u = profile(Tier::Basic);
    let stranger = profile(Tier::Basic);
    let e = entitlement(&stranger, &c, PaymentStatus::Completed, None);
    assert!(!has_course_access(Some(&u), &c, Some(&e), now));

    let other_course = course(Tier::Free);
    let e = entitlement(&u, &other_course, PaymentStatus::Completed, None);
    assert!(!has_course_access(Some(&u), &c, Some(&e), now));
  }

  // ── Module access ──────────────────────────────────────────────────────────

  #[test]
  fn module_requires_course_access() {
    let c = course(Tier::Free);
    let m = module(&c, 1, Tier::Free, false);
    assert!(!has_module_access(Some(&profile(Tier::Premium)), &m, false));
  }

  #[test]
  fn premium_flag_beats_basic_requirement() {
    let c = course(Tier::Basic);
    let m = module(&c, 1, Tier::Basic, true);
    assert!(!has_module_access(Some(&profile(Tier::Basic)), &m, true));
    assert!(has_module_access(Some(&profile(Tier::Premium)), &m, true));
  }

  #[test]
  fn premium_flag_beats_free_requirement() {
    let c = course(Tier::Free);
    let m = module(&c, 1, Tier::Free, true);
    assert!(!has_module_access(Some(&profile(Tier::Free)), &m, true));
    assert!(!has_module_access(Some(&profile(Tier::Basic)), &m, true));
  }

  #[test]
  fn module_rank_check_applies_without_flag() {
    let c = course(Tier::Free);
    let m = module(&c, 1, Tier::Premium, false);
    assert!(!has_module_access(Some(&profile(Tier::Basic)), &m, true));
    assert!(has_module_access(Some(&profile(Tier::Premium)), &m, true));
  }

  // ── Purchase ───────────────────────────────────────────────────────────────

  #[test]
  fn purchase_requires_qualifying_tier_by_default() {
    let now = Utc::now();
    let c = course(Tier::Premium);
    let basic = profile(Tier::Basic);
    let premium = profile(Tier::Premium);
    let policy = PurchasePolicy::default();
    assert!(!can_purchase(Some(&basic), &c, None, policy, now));
    assert!(can_purchase(Some(&premium), &c, None, policy, now));
    assert!(can_purchase(
      Some(&basic),
      &c,
      None,
      PurchasePolicy::AllowAnyTier,
      now
    ));
  }

  #[test]
  fn purchase_not_offered_when_access_held() {
    let now = Utc::now();
    let c = course(Tier::Basic);
    let u = profile(Tier::Basic);
    let e = entitlement(&u, &c, PaymentStatus::Completed, None);
    assert!(!can_purchase(Some(&u), &c, Some(&e), PurchasePolicy::default(), now));

    let expired = entitlement(
      &u,
      &c,
      PaymentStatus::Completed,
      Some(now - Duration::days(1)),
    );
    assert!(can_purchase(
      Some(&u),
      &c,
      Some(&expired),
      PurchasePolicy::default(),
      now
    ));
  }

  #[test]
  fn inactive_course_is_not_purchasable() {
    let now = Utc::now();
    let mut c = course(Tier::Free);
    c.is_active = false;
    assert!(!can_purchase(
      Some(&profile(Tier::Premium)),
      &c,
      None,
      PurchasePolicy::AllowAnyTier,
      now
    ));
  }

  // ── Downloads ──────────────────────────────────────────────────────────────

  #[test]
  fn premium_download_needs_premium_tier() {
    let c = course(Tier::Free);
    let d = Download {
      download_id: Uuid::new_v4(),
      course_id:   c.course_id,
      title:       "Slides".into(),
      url:         "https://files.example/slides.pdf".into(),
      is_premium:  true,
      created_at:  Utc::now(),
    };
    assert!(!has_download_access(Some(&profile(Tier::Basic)), &d, true));
    assert!(has_download_access(Some(&profile(Tier::Premium)), &d, true));
    assert!(!has_download_access(Some(&profile(Tier::Premium)), &d, false));
  }

  // ── Snapshot ───────────────────────────────────────────────────────────────

  #[test]
  fn basic_user_scenario() {
    let now = Utc::now();
    let c = course(Tier::Basic);
    let m1 = module(&c, 1, Tier::Basic, false);
    let m2 = module(&c, 2, Tier::Premium, true);
    let u = profile(Tier::Basic);
    let e = entitlement(&u, &c, PaymentStatus::Completed, None);

    let snap = AccessSnapshot::new(
      Some(u),
      c,
      vec![m2.clone(), m1.clone()],
      vec![e],
      vec![],
      now,
    );

    assert!(snap.course_access());
    assert!(snap.module_access(m1.module_id));
    assert!(!snap.module_access(m2.module_id));
    assert!(!snap.module_access(Uuid::new_v4()));
    assert_eq!(snap.entitlement_state(), EntitlementState::Completed);

    let decisions = snap.module_decisions();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].module_id, m1.module_id);
    assert!(decisions[0].accessible);
    assert!(!decisions[1].accessible);
  }

  #[test]
  fn snapshot_uses_authoritative_entitlement() {
    let now = Utc::now();
    let c = course(Tier::Free);
    let u = profile(Tier::Free);
    let failed = entitlement(&u, &c, PaymentStatus::Failed, None);
    let paid = entitlement(&u, &c, PaymentStatus::Completed, None);

    let snap =
      AccessSnapshot::new(Some(u), c, vec![], vec![failed, paid], vec![], now);
    assert!(snap.course_access());
    assert!(!snap.can_purchase(PurchasePolicy::AllowAnyTier));
  }

  #[test]
  fn snapshot_progress_and_completion() {
    let now = Utc::now();
    let c = course(Tier::Free);
    let m1 = module(&c, 1, Tier::Free, false);
    let m2 = module(&c, 2, Tier::Free, false);
    let u = profile(Tier::Free);
    let row = Progress {
      user_id:             u.user_id,
      module_id:           m2.module_id,
      completed:           true,
      progress_percentage: 100,
      completed_at:        Some(now),
      last_accessed:       None,
    };

    let snap = AccessSnapshot::new(
      Some(u),
      c,
      vec![m1.clone(), m2.clone()],
      vec![],
      vec![row],
      now,
    );
    assert!(snap.is_completed(m2.module_id));
    assert!(!snap.is_completed(m1.module_id));
    assert_eq!(
      snap.course_progress(),
      CourseProgress { completed: 1, total: 2, percentage: 50 }
    );
  }
}
