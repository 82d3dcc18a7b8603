// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod functions;
pub mod identity;
pub mod policy;
pub mod profiles;
pub mod route_guard;
pub mod session;

pub use functions::{BookingConflicts, FunctionsClient, SlotAvailability};
pub use identity::{IdentityClient, IdentityProvider, IdpCredential};
pub use policy::{ProfileCompletenessPolicy, ProfileField};
pub use profiles::ProfileRepository;
pub use route_guard::{GuardDecision, RouteRequirements, RouteTable};
pub use session::{AuthSnapshot, AuthView, SessionRegistry, SessionStore};
