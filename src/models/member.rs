// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Member profile model for storage and API.
//!
//! Documents live in the `members` collection keyed by the identity
//! provider's user id. Field names are camelCase on the wire so existing
//! documents written by the web client keep deserializing.

use serde::{Deserialize, Serialize};
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;
use validator::{Validate, ValidationError};

use crate::models::Session;

/// Role stored on a member profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "lowercase")]
pub enum MembershipType {
    #[default]
    Member,
    Admin,
}

impl MembershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipType::Member => "member",
            MembershipType::Admin => "admin",
        }
    }
}

impl std::fmt::Display for MembershipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_true() -> bool {
    true
}

/// Notification preferences. Missing flags read as enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default = "default_true")]
    pub email_notifications: bool,
    #[serde(default = "default_true")]
    pub event_reminders: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            email_notifications: true,
            event_reminders: true,
        }
    }
}

/// Member profile stored in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// Identity provider user id (also used as document ID)
    pub uid: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub job_title: String,
    /// LinkedIn profile URL
    #[serde(default)]
    pub linked_in: String,
    /// Personal or company website URL
    #[serde(default)]
    pub website: String,
    /// Avatar URL
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    /// Role; only changed through the admin path
    #[serde(default)]
    pub membership_type: MembershipType,
    #[serde(default)]
    pub preferences: Preferences,
    /// When the profile was first created (ISO 8601)
    pub created_at: String,
    /// Last self-service or admin update (ISO 8601)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Member {
    /// Default profile for a first sign-in.
    pub fn from_session(session: &Session, created_at: String) -> Self {
        Self {
            uid: session.uid.clone(),
            display_name: session.display_name.clone().unwrap_or_default(),
            email: session.email.clone().unwrap_or_default(),
            phone: String::new(),
            bio: String::new(),
            company: String::new(),
            job_title: String::new(),
            linked_in: String::new(),
            website: String::new(),
            photo_url: session.photo_url.clone().unwrap_or_default(),
            membership_type: MembershipType::Member,
            preferences: Preferences::default(),
            created_at,
            updated_at: None,
        }
    }
}

/// Self-service profile changes.
///
/// `membershipType` is deliberately absent: owners cannot change their own
/// role through this type. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_linked_in"))]
    pub linked_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_website"))]
    pub website: Option<String>,
    #[serde(default, rename = "photoURL", skip_serializing_if = "Option::is_none")]
    #[validate(custom(function = "validate_photo_url"))]
    pub photo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Preferences>,
    /// When set, the write only happens if the stored `updatedAt` still
    /// matches this value.
    #[serde(default, skip_serializing)]
    pub expected_updated_at: Option<String>,
}

impl ProfileUpdate {
    /// Trim every text field.
    pub fn normalized(mut self) -> Self {
        for field in [
            &mut self.display_name,
            &mut self.email,
            &mut self.phone,
            &mut self.bio,
            &mut self.company,
            &mut self.job_title,
            &mut self.linked_in,
            &mut self.website,
            &mut self.photo_url,
        ]
        .into_iter()
        .flatten()
        {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
        self
    }

    /// True when no field would change.
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.bio.is_none()
            && self.company.is_none()
            && self.job_title.is_none()
            && self.linked_in.is_none()
            && self.website.is_none()
            && self.photo_url.is_none()
            && self.preferences.is_none()
    }

    /// First validation failure as a user-facing message.
    pub fn validation_message(&self) -> Option<String> {
        let errors = self.validate().err()?;
        let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
        // Report in a stable order regardless of map iteration.
        fields.sort_by_key(|(name, _)| field_rank(name));
        fields
            .into_iter()
            .flat_map(|(_, errs)| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
    }
}

fn field_rank(name: &str) -> usize {
    match name {
        "linked_in" => 0,
        "website" => 1,
        "phone" => 2,
        _ => 3,
    }
}

/// Absolute http(s) URL with a dotted host part.
static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://.+\..+").expect("URL pattern compiles")
});

/// Digits, whitespace, dashes, plus sign and parentheses only.
static PHONE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\d\s\-+()]+$").expect("phone pattern compiles")
});

fn is_http_url(value: &str) -> bool {
    URL_PATTERN.is_match(value)
}

fn url_error(message: &'static str) -> ValidationError {
    ValidationError::new("url").with_message(Cow::Borrowed(message))
}

fn validate_linked_in(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || is_http_url(value.trim()) {
        Ok(())
    } else {
        Err(url_error("LinkedIn must be a valid URL"))
    }
}

fn validate_website(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || is_http_url(value.trim()) {
        Ok(())
    } else {
        Err(url_error("Website must be a valid URL"))
    }
}

fn validate_photo_url(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() || is_http_url(value.trim()) {
        Ok(())
    } else {
        Err(url_error("Photo must be a valid URL"))
    }
}

fn validate_phone(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() || PHONE_PATTERN.is_match(value) {
        Ok(())
    } else {
        Err(ValidationError::new("phone").with_message(Cow::Borrowed(
            "Phone can only contain digits, spaces, dashes, plus sign, and parentheses",
        )))
    }
}
