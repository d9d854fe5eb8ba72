//! Subscription tiers and the rank table that orders them.
//!
//! Every gating decision goes through [`rank`]. Tier names are never compared
//! as strings; the order below is the only source of truth.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::{Error, Result};

/// An ordered subscription level. Declaration order is rank order.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Tier {
  #[default]
  Free,
  Basic,
  Premium,
}

/// The explicit rank table.
pub const fn rank(tier: Tier) -> u8 {
  match tier {
    Tier::Free => 0,
    Tier::Basic => 1,
    Tier::Premium => 2,
  }
}

impl Tier {
  pub const fn rank(self) -> u8 { rank(self) }

  /// The name stored in databases and sent over the wire.
  pub fn as_str(self) -> &'static str { self.into() }

  /// Strict parse; unknown names are an [`Error::InvalidTier`].
  pub fn parse(s: &str) -> Result<Self> {
    s.trim()
      .parse()
      .map_err(|_| Error::InvalidTier(s.to_owned()))
  }

  /// Parse a tier a *user* holds. Unknown names fall to the lowest rank so a
  /// corrupt profile can never unlock content.
  pub fn from_str_lenient(s: &str) -> Self {
    Self::parse(s).unwrap_or(Tier::Free)
  }

  /// `true` when a holder of `self` meets a `required` gate.
  pub const fn satisfies(self, required: Tier) -> bool {
    rank(self) >= rank(required)
  }
}

impl Ord for Tier {
  fn cmp(&self, other: &Self) -> Ordering { rank(*self).cmp(&rank(*other)) }
}

impl PartialOrd for Tier {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}
