//! Core types and policy for the Coursegate learning platform.
//!
//! This crate holds the tier ordering, the access evaluator, progress maths,
//! the entitlement and tier-upgrade lifecycles and the storage trait. It has no HTTP or
//! database dependencies; every other crate in the workspace depends on it.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod access;
pub mod activity;
pub mod admin;
pub mod course;
pub mod entitlement;
pub mod error;
pub mod payment;
pub mod profile;
pub mod progress;
pub mod store;
pub mod tier;
pub mod upgrade;

pub use error::{Error, Result};
pub use tier::{Tier, rank};
