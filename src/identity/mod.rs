//! # Identity
//!
//! The canonical user record every login strategy produces, and the helpers
//! that turn provider-specific names into Kubernetes-safe tokens.

pub mod normalize;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use normalize::{dns1123, short_id};

/// Display name extension key
pub const EXT_NAME: &str = "name";
/// Avatar URL extension key
pub const EXT_AVATAR_URL: &str = "avatarUrl";
/// Email extension key
pub const EXT_EMAIL: &str = "email";
/// Profile URL extension key (GitHub)
pub const EXT_URL: &str = "url";

/// Authenticated principal produced by a successful login.
///
/// Created per login and consumed immediately by issuance; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub username: String,
    pub id: String,
    pub groups: Vec<String>,
    pub extensions: BTreeMap<String, String>,
}

impl UserInfo {
    /// Create a user with a fresh opaque id
    pub fn new(username: impl Into<String>, groups: Vec<String>) -> Self {
        Self { username: username.into(), id: short_id(), groups, extensions: BTreeMap::new() }
    }

    /// Attach an extension, skipping empty values
    pub fn with_extension(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.extensions.insert(key.to_string(), value);
        }
        self
    }

    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }

    pub fn display_name(&self) -> Option<&str> {
        self.extension(EXT_NAME)
    }

    pub fn avatar_url(&self) -> Option<&str> {
        self.extension(EXT_AVATAR_URL)
    }
}

/// Raw identity fields gathered from a provider before normalization.
///
/// REST-action overrides are applied to this record, never to [`UserInfo`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderClaims {
    pub preferred_username: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub groups: Vec<String>,
    /// Provider-specific extensions carried through verbatim
    pub extra: BTreeMap<String, String>,
}

impl ProviderClaims {
    /// Convert into a [`UserInfo`] with a fresh id. Returns `None` when the
    /// username is missing or empty.
    pub fn normalize(self) -> Option<UserInfo> {
        let username = self.preferred_username.filter(|u| !u.is_empty())?;

        let mut user = UserInfo::new(username, self.groups);
        user.extensions = self.extra;
        if let Some(name) = self.name {
            user = user.with_extension(EXT_NAME, name);
        }
        if let Some(avatar) = self.avatar_url {
            user = user.with_extension(EXT_AVATAR_URL, avatar);
        }
        if let Some(email) = self.email {
            user = user.with_extension(EXT_EMAIL, email);
        }
        Some(user)
    }
}
