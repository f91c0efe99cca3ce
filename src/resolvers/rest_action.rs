//! REST-action calls and the identity overrides they return.
//!
//! A REST action is a templated HTTP call executed by the snowplow service.
//! The gateway passes the provider's bearer token along as an extra, and the
//! action's `status` object may override identity fields.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::ObjectRef;
use crate::errors::{Error, Result};
use crate::identity::ProviderClaims;
use crate::session::SessionIssuer;
use crate::signup::SERVICE_GROUP;

const SERVICE_TOKEN_LIFETIME: Duration = Duration::from_secs(5 * 60);

/// Resolve a REST action on behalf of a user holding `bearer_token`
#[async_trait]
pub trait RestActionResolver: Send + Sync {
    async fn resolve(&self, reference: &ObjectRef, bearer_token: &str) -> Result<Map<String, Value>>;
}

/// Identity fields a REST action may override.
///
/// Built from the action's `status` map: null values are ignored, unknown
/// keys and wrongly typed values reject the whole map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOverride {
    pub name: Option<String>,
    pub email: Option<String>,
    pub preferred_username: Option<String>,
    pub groups: Option<Vec<String>>,
    pub avatar_url: Option<String>,
}

impl IdentityOverride {
    pub fn from_status(status: &Map<String, Value>) -> Result<Self> {
        let mut parsed = Self::default();

        for (key, value) in status {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "name" => parsed.name = Some(string_field(key, value)?),
                "email" => parsed.email = Some(string_field(key, value)?),
                "preferredUsername" => parsed.preferred_username = Some(string_field(key, value)?),
                "avatarURL" => parsed.avatar_url = Some(string_field(key, value)?),
                "groups" => parsed.groups = Some(string_array_field(key, value)?),
                other => {
                    return Err(Error::field_validation(
                        format!("error parsing updated config: {} is not an overridable field", other),
                        other,
                    ))
                }
            }
        }

        Ok(parsed)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Overwrite the claims' fields with every value present here
    pub fn apply(self, claims: &mut ProviderClaims) {
        if let Some(name) = self.name {
            claims.name = Some(name);
        }
        if let Some(email) = self.email {
            claims.email = Some(email);
        }
        if let Some(username) = self.preferred_username {
            claims.preferred_username = Some(username);
        }
        if let Some(groups) = self.groups {
            claims.groups = groups;
        }
        if let Some(avatar) = self.avatar_url {
            claims.avatar_url = Some(avatar);
        }
    }
}

fn string_field(key: &str, value: &Value) -> Result<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        Error::field_validation(format!("error parsing updated config: {} is not type string", key), key)
    })
}

fn string_array_field(key: &str, value: &Value) -> Result<Vec<String>> {
    let items = value.as_array().ok_or_else(|| {
        Error::field_validation(format!("error parsing updated config: {} is not type array", key), key)
    })?;

    items
        .iter()
        .map(|item| {
            item.as_str().map(str::to_string).ok_or_else(|| {
                Error::field_validation(
                    format!("error parsing updated config: {} is not type string array", key),
                    key,
                )
            })
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct CallResponse {
    #[serde(default)]
    status: Option<Map<String, Value>>,
}

/// Calls REST actions through the snowplow service
pub struct SnowplowResolver {
    client: reqwest::Client,
    base_url: String,
    service_username: String,
    issuer: Option<SessionIssuer>,
}

impl SnowplowResolver {
    pub fn new(base_url: impl Into<String>, service_username: impl Into<String>, issuer: Option<SessionIssuer>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, service_username, issuer)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        service_username: impl Into<String>,
        issuer: Option<SessionIssuer>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url, service_username: service_username.into(), issuer }
    }

    fn service_token(&self) -> Result<String> {
        let issuer = self
            .issuer
            .as_ref()
            .ok_or_else(|| Error::internal("failed to retrieve jwt token for authn: no signing key configured"))?;
        issuer.issue_for(&self.service_username, &[SERVICE_GROUP.to_string()], SERVICE_TOKEN_LIFETIME)
    }
}

#[async_trait]
impl RestActionResolver for SnowplowResolver {
    #[instrument(skip(self, bearer_token), fields(restaction = %reference.name, namespace = %reference.namespace))]
    async fn resolve(&self, reference: &ObjectRef, bearer_token: &str) -> Result<Map<String, Value>> {
        let extras = serde_json::json!({ "token": bearer_token }).to_string();
        let service_token = self.service_token()?;

        let response = self
            .client
            .get(format!("{}/call", self.base_url))
            .query(&[
                ("apiVersion", "templates.krateo.io/v1"),
                ("resource", "restactions"),
                ("name", reference.name.as_str()),
                ("namespace", reference.namespace.as_str()),
                ("extras", extras.as_str()),
            ])
            .bearer_auth(service_token)
            .send()
            .await
            .map_err(|e| {
                Error::provider_with_source("failed to send restaction call to snowplow", Box::new(e))
            })?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::provider(format!(
                "snowplow endpoint returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: CallResponse = serde_json::from_str(&body).map_err(|e| {
            Error::provider_with_source("error parsing restaction response payload", Box::new(e))
        })?;

        let overrides = parsed.status.unwrap_or_default();
        debug!(fields = overrides.len(), "REST action resolved");
        Ok(overrides)
    }
}
