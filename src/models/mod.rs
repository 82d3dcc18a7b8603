// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod member;
pub mod session;
pub mod stats;

pub use member::{Member, MembershipType, Preferences, ProfileUpdate};
pub use session::{Session, SessionSummary};
pub use stats::MemberStats;
