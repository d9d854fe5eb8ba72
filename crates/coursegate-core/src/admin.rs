//! The "is this caller an administrator" predicate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A case-insensitive allow-list of administrator emails.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
  emails: BTreeSet<String>,
}

impl AdminPolicy {
  pub fn from_emails<I, T>(emails: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
  {
    let emails = emails
      .into_iter()
      .map(|e| normalize(e.as_ref()))
      .filter(|e| !e.is_empty())
      .collect();
    Self { emails }
  }

  pub fn is_admin(&self, email: &str) -> bool {
    self.emails.contains(&normalize(email))
  }
}

fn normalize(email: &str) -> String { email.trim().to_ascii_lowercase() }

/// Headline counts for the administrator dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformStats {
  pub total_students: u64,
  pub total_courses:  u64,
  pub active_courses: u64,
  pub total_modules:  u64,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn matching_ignores_case_and_whitespace() {
    let policy = AdminPolicy::from_emails(["Owner@Example.com", " "]);
    assert!(policy.is_admin("owner@example.com"));
    assert!(policy.is_admin(" OWNER@example.COM "));
    assert!(!policy.is_admin("student@example.com"));
    assert!(!policy.is_admin(""));
  }

  #[test]
  fn empty_policy_admits_nobody() {
    assert!(!AdminPolicy::default().is_admin("owner@example.com"));
  }
}
