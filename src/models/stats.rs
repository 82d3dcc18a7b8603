// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-member activity counts for the profile page.
//!
//! Computed on request from the `bookings` and `events` collections; nothing
//! is stored.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Booking and event counts for one member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct MemberStats {
    /// Bookings made by the member, any status
    pub total_bookings: u32,
    /// Events listing the member as an attendee
    pub events_attended: u32,
    /// Events the member organizes
    pub events_organized: u32,
}
