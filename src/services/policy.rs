// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authorization policy derived from a member profile.
//!
//! Pure functions only: the route guard calls these on every navigation
//! decision, so they must not touch the network or any shared state.

use crate::models::{Member, MembershipType};
use std::collections::BTreeSet;
use std::str::FromStr;

/// True iff the profile's membership type is `admin`.
pub fn is_admin(profile: &Member) -> bool {
    profile.membership_type == MembershipType::Admin
}

/// Profile text fields a completeness policy can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProfileField {
    DisplayName,
    Email,
    Phone,
    Bio,
    Company,
    JobTitle,
    LinkedIn,
    Website,
    PhotoUrl,
}

impl ProfileField {
    pub fn value<'a>(&self, profile: &'a Member) -> &'a str {
        match self {
            ProfileField::DisplayName => &profile.display_name,
            ProfileField::Email => &profile.email,
            ProfileField::Phone => &profile.phone,
            ProfileField::Bio => &profile.bio,
            ProfileField::Company => &profile.company,
            ProfileField::JobTitle => &profile.job_title,
            ProfileField::LinkedIn => &profile.linked_in,
            ProfileField::Website => &profile.website,
            ProfileField::PhotoUrl => &profile.photo_url,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileField::DisplayName => "displayName",
            ProfileField::Email => "email",
            ProfileField::Phone => "phone",
            ProfileField::Bio => "bio",
            ProfileField::Company => "company",
            ProfileField::JobTitle => "jobTitle",
            ProfileField::LinkedIn => "linkedIn",
            ProfileField::Website => "website",
            ProfileField::PhotoUrl => "photoURL",
        }
    }
}

impl FromStr for ProfileField {
    type Err = String;

    /// Accepts the stored camelCase name or its snake_case spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "displayname" => Ok(ProfileField::DisplayName),
            "email" => Ok(ProfileField::Email),
            "phone" => Ok(ProfileField::Phone),
            "bio" => Ok(ProfileField::Bio),
            "company" => Ok(ProfileField::Company),
            "jobtitle" | "role" => Ok(ProfileField::JobTitle),
            "linkedin" => Ok(ProfileField::LinkedIn),
            "website" => Ok(ProfileField::Website),
            "photourl" => Ok(ProfileField::PhotoUrl),
            _ => Err(format!("unknown profile field '{}'", s.trim())),
        }
    }
}

/// Which onboarding fields must be filled in before gated screens open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileCompletenessPolicy {
    required_fields: BTreeSet<ProfileField>,
}

impl Default for ProfileCompletenessPolicy {
    /// Company + job title.
    fn default() -> Self {
        Self::new([ProfileField::Company, ProfileField::JobTitle])
    }
}

impl ProfileCompletenessPolicy {
    pub fn new(fields: impl IntoIterator<Item = ProfileField>) -> Self {
        Self {
            required_fields: fields.into_iter().collect(),
        }
    }

    pub fn required_fields(&self) -> &BTreeSet<ProfileField> {
        &self.required_fields
    }

    /// True iff every required field is non-blank.
    pub fn is_complete(&self, profile: &Member) -> bool {
        self.missing_fields(profile).next().is_none()
    }

    /// Required fields that are still blank, in a stable order.
    pub fn missing_fields<'a>(
        &'a self,
        profile: &'a Member,
    ) -> impl Iterator<Item = ProfileField> + 'a {
        self.required_fields
            .iter()
            .copied()
            .filter(move |field| field.value(profile).trim().is_empty())
    }
}

impl FromStr for ProfileCompletenessPolicy {
    type Err = String;

    /// Comma-separated field names; an empty list requires nothing.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(ProfileField::from_str)
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(Self {
            required_fields: fields,
        })
    }
}
