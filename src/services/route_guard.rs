// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Route guard: decides render vs. redirect for each navigable screen.
//!
//! Checks run in strict priority order:
//! 1. still loading -> wait, no decision yet
//! 2. no session -> sign-in screen
//! 3. admin required but not admin -> member home
//! 4. complete profile required but incomplete, and not already on the
//!    role's profile screen -> that profile screen, with a reason flag
//! 5. otherwise render
//!
//! `evaluate` is a pure function of its input.

use serde::Serialize;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::services::policy::{self, ProfileCompletenessPolicy};
use crate::services::session::AuthSnapshot;

pub const HOME_PATH: &str = "/";
pub const SIGN_IN_PATH: &str = "/login";
pub const MEMBER_HOME_PATH: &str = "/member";
pub const MEMBER_PROFILE_PATH: &str = "/member/profile";
pub const ADMIN_PROFILE_PATH: &str = "/admin/profile";

/// Static per-screen requirements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteRequirements {
    pub require_admin: bool,
    pub require_profile_complete: bool,
}

impl RouteRequirements {
    pub const SIGNED_IN: Self = Self {
        require_admin: false,
        require_profile_complete: false,
    };
    pub const ADMIN: Self = Self {
        require_admin: true,
        require_profile_complete: false,
    };
    pub const COMPLETE_PROFILE: Self = Self {
        require_admin: false,
        require_profile_complete: true,
    };
    pub const ADMIN_COMPLETE_PROFILE: Self = Self {
        require_admin: true,
        require_profile_complete: true,
    };
}

/// How a screen is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Public,
    Protected(RouteRequirements),
}

/// Why the guard sent the user elsewhere, for a targeted prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub enum RedirectReason {
    RequireProfileComplete,
}

/// Outcome of one navigation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(tag = "decision", rename_all = "lowercase")]
pub enum GuardDecision {
    /// Session state not settled; show a neutral spinner.
    Waiting,
    Render,
    Redirect {
        to: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<RedirectReason>,
    },
}

impl GuardDecision {
    fn redirect(to: &str) -> Self {
        GuardDecision::Redirect {
            to: to.to_string(),
            reason: None,
        }
    }
}

/// Everything the guard looks at.
#[derive(Debug, Clone, Copy)]
pub struct GuardInput<'a> {
    pub loading: bool,
    pub has_session: bool,
    pub is_admin: bool,
    pub is_profile_complete: bool,
    pub current_path: &'a str,
    pub requirements: RouteRequirements,
}

impl<'a> GuardInput<'a> {
    /// Derive flags from a session-store snapshot.
    pub fn from_snapshot(
        snapshot: &AuthSnapshot,
        completeness: &ProfileCompletenessPolicy,
        current_path: &'a str,
        requirements: RouteRequirements,
    ) -> Self {
        let profile = snapshot.profile.as_ref();
        Self {
            loading: snapshot.loading,
            has_session: snapshot.session.is_some(),
            is_admin: profile.map(policy::is_admin).unwrap_or(false),
            is_profile_complete: profile
                .map(|p| completeness.is_complete(p))
                .unwrap_or(false),
            current_path,
            requirements,
        }
    }
}

/// Profile-completion screen for the user's role.
pub fn profile_completion_path(is_admin: bool) -> &'static str {
    if is_admin {
        ADMIN_PROFILE_PATH
    } else {
        MEMBER_PROFILE_PATH
    }
}

/// Decide what happens for one navigation attempt.
pub fn evaluate(input: &GuardInput<'_>) -> GuardDecision {
    if input.loading {
        return GuardDecision::Waiting;
    }

    if !input.has_session {
        return GuardDecision::redirect(SIGN_IN_PATH);
    }

    if input.requirements.require_admin && !input.is_admin {
        return GuardDecision::redirect(MEMBER_HOME_PATH);
    }

    if input.requirements.require_profile_complete && !input.is_profile_complete {
        let profile_path = profile_completion_path(input.is_admin);
        if normalize_path(input.current_path) != profile_path {
            return GuardDecision::Redirect {
                to: profile_path.to_string(),
                reason: Some(RedirectReason::RequireProfileComplete),
            };
        }
    }

    GuardDecision::Render
}

/// Strip a trailing slash (except on the root).
fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        HOME_PATH
    } else {
        trimmed
    }
}

/// Screen paths and their access requirements.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<(&'static str, RouteAccess)>,
}

impl Default for RouteTable {
    fn default() -> Self {
        use RouteAccess::{Protected, Public};

        Self {
            routes: vec![
                (HOME_PATH, Public),
                (SIGN_IN_PATH, Public),
                ("/admin", Protected(RouteRequirements::ADMIN_COMPLETE_PROFILE)),
                ("/admin/members", Protected(RouteRequirements::ADMIN_COMPLETE_PROFILE)),
                ("/admin/amenities", Protected(RouteRequirements::ADMIN_COMPLETE_PROFILE)),
                ("/admin/bookings", Protected(RouteRequirements::ADMIN_COMPLETE_PROFILE)),
                ("/admin/events", Protected(RouteRequirements::ADMIN_COMPLETE_PROFILE)),
                (ADMIN_PROFILE_PATH, Protected(RouteRequirements::ADMIN)),
                (MEMBER_HOME_PATH, Protected(RouteRequirements::COMPLETE_PROFILE)),
                ("/member/bookings", Protected(RouteRequirements::COMPLETE_PROFILE)),
                ("/member/events", Protected(RouteRequirements::COMPLETE_PROFILE)),
                (MEMBER_PROFILE_PATH, Protected(RouteRequirements::SIGNED_IN)),
            ],
        }
    }
}

impl RouteTable {
    pub fn new(routes: Vec<(&'static str, RouteAccess)>) -> Self {
        Self { routes }
    }

    /// Exact-match lookup; `None` for unknown screens.
    pub fn resolve(&self, path: &str) -> Option<RouteAccess> {
        let path = normalize_path(path);
        self.routes
            .iter()
            .find(|(route, _)| *route == path)
            .map(|(_, access)| *access)
    }

    /// Full navigation decision: unknown screens go home, public screens
    /// always render, protected screens go through [`evaluate`].
    pub fn navigate(
        &self,
        snapshot: &AuthSnapshot,
        completeness: &ProfileCompletenessPolicy,
        path: &str,
    ) -> GuardDecision {
        match self.resolve(path) {
            None => GuardDecision::redirect(HOME_PATH),
            Some(RouteAccess::Public) => GuardDecision::Render,
            Some(RouteAccess::Protected(requirements)) => evaluate(&GuardInput::from_snapshot(
                snapshot,
                completeness,
                path,
                requirements,
            )),
        }
    }
}
