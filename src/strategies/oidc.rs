//! OpenID Connect login.
//!
//! Endpoints come from the configuration object or its discovery document.
//! Identity fields are read from the ID token claims first; the userinfo
//! endpoint only fills fields the claims lack.
//!
//! The ID token signature is not verified. The token is received directly
//! from the token endpoint over TLS.

use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use super::token::{decode_unverified_claims, CodeExchange};
use super::{LoginError, LoginRequest, LoginStrategy, StrategyContext, StrategyKind, WithStatus};
use crate::errors::{Error, Result};
use crate::identity::{dns1123, ProviderClaims, UserInfo};
use crate::resolvers::OidcConfigSpec;

const CLAIM_USERNAME: &str = "preferred_username";
const CLAIM_NAME: &str = "name";
const CLAIM_PICTURE: &str = "picture";
const CLAIM_EMAIL: &str = "email";
const CLAIM_GROUPS: &str = "groups";

/// Endpoints of an OIDC provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OidcEndpoints {
    pub authorization_url: String,
    pub token_url: String,
    pub user_info_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct DiscoveryDocument {
    #[serde(default)]
    authorization_endpoint: String,
    #[serde(default)]
    token_endpoint: String,
    #[serde(default)]
    userinfo_endpoint: String,
}

/// Configured endpoints, completed from the discovery document when any is
/// missing and a discovery URL is set
pub async fn resolve_endpoints(http: &reqwest::Client, spec: &OidcConfigSpec) -> Result<OidcEndpoints> {
    let mut endpoints = OidcEndpoints {
        authorization_url: spec.authorization_url.clone().unwrap_or_default(),
        token_url: spec.token_url.clone().unwrap_or_default(),
        user_info_url: spec.user_info_url.clone().unwrap_or_default(),
    };

    let incomplete = endpoints.authorization_url.is_empty()
        || endpoints.token_url.is_empty()
        || endpoints.user_info_url.is_empty();

    if let Some(discovery_url) = spec.discovery_url.as_deref().filter(|u| !u.is_empty() && incomplete) {
        let document = discover(http, discovery_url).await?;
        debug!(discovery_url = %discovery_url, "OIDC discovery document fetched");

        if !document.authorization_endpoint.is_empty() {
            endpoints.authorization_url = document.authorization_endpoint;
        }
        if !document.token_endpoint.is_empty() {
            endpoints.token_url = document.token_endpoint;
        }
        if !document.userinfo_endpoint.is_empty() {
            endpoints.user_info_url = document.userinfo_endpoint;
        }
    }

    if endpoints.token_url.is_empty() || endpoints.authorization_url.is_empty() {
        return Err(Error::configuration("url for discovery and authorize/token endpoints cannot be empty"));
    }
    Ok(endpoints)
}

async fn discover(http: &reqwest::Client, url: &str) -> Result<DiscoveryDocument> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| Error::configuration_with_source("failed to send discovery request", Box::new(e)))?;

    if !response.status().is_success() {
        return Err(Error::configuration(format!("discovery endpoint returned {}", response.status())));
    }

    response
        .json()
        .await
        .map_err(|e| Error::configuration_with_source("failed to unmarshal discovery response", Box::new(e)))
}

/// Identity fields read from the ID token, plus which of them were absent
#[derive(Debug, Default)]
struct ClaimSet {
    claims: ProviderClaims,
    missing: Vec<&'static str>,
}

fn read_claims(raw: &Map<String, Value>) -> Result<ClaimSet> {
    let mut set = ClaimSet::default();
    let mut take = |key: &'static str| -> Option<String> {
        match raw.get(key).and_then(Value::as_str) {
            Some(value) => Some(value.to_string()),
            None => {
                set.missing.push(key);
                None
            }
        }
    };

    let preferred_username = take(CLAIM_USERNAME);
    let name = take(CLAIM_NAME);
    let avatar_url = take(CLAIM_PICTURE);
    let email = take(CLAIM_EMAIL);

    set.claims = ProviderClaims {
        preferred_username,
        name,
        email,
        avatar_url,
        groups: claim_groups(raw)?,
        ..Default::default()
    };
    Ok(set)
}

fn claim_groups(raw: &Map<String, Value>) -> Result<Vec<String>> {
    let Some(value) = raw.get(CLAIM_GROUPS).filter(|v| !v.is_null()) else {
        return Ok(Vec::new());
    };

    value
        .as_array()
        .ok_or_else(|| Error::provider("groups claim is not an array"))?
        .iter()
        .map(|g| g.as_str().map(str::to_string).ok_or_else(|| Error::provider("groups claim is not a string array")))
        .collect()
}

/// Fill the fields in `missing` from a userinfo response
fn merge_user_info(set: &mut ClaimSet, user_info: &Map<String, Value>) {
    for key in &set.missing {
        let Some(value) = user_info.get(*key).and_then(Value::as_str).map(str::to_string) else {
            continue;
        };
        match *key {
            CLAIM_USERNAME => set.claims.preferred_username = Some(value),
            CLAIM_NAME => set.claims.name = Some(value),
            CLAIM_PICTURE => set.claims.avatar_url = Some(value),
            CLAIM_EMAIL => set.claims.email = Some(value),
            _ => {}
        }
    }
}

pub struct OidcStrategy {
    context: StrategyContext,
}

impl OidcStrategy {
    pub fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    async fn fetch_user_info(&self, url: &str, access_token: &str) -> Result<Map<String, Value>> {
        let response = self
            .context
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::provider_with_source("failed to send userinfo request", Box::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::provider(format!("userinfo endpoint returned {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| Error::provider_with_source("error parsing userinfo payload JSON", Box::new(e)))
    }

    /// Token exchange, claim extraction and userinfo merge
    async fn login(
        &self,
        spec: &OidcConfigSpec,
        endpoints: &OidcEndpoints,
        client_secret: &str,
        code: &str,
    ) -> Result<(ClaimSet, String)> {
        let token = CodeExchange {
            token_url: &endpoints.token_url,
            client_id: &spec.client_id,
            client_secret,
            redirect_uri: &spec.redirect_uri,
        }
        .exchange(&self.context.http, code)
        .await?;

        let raw = decode_unverified_claims(&token.id_token)
            .map_err(|e| Error::provider(format!("failed to decode JWT token: {}", e)))?;
        let mut set = read_claims(&raw)?;

        if !set.missing.is_empty() && !endpoints.user_info_url.is_empty() {
            let access_token = token
                .access_token()
                .map_err(|_| Error::provider("unable to get access_token from response"))?;
            debug!(missing = ?set.missing, "Querying userinfo endpoint");
            let user_info = self.fetch_user_info(&endpoints.user_info_url, access_token).await?;
            merge_user_info(&mut set, &user_info);
        }

        Ok((set, token.access_token))
    }
}

#[async_trait]
impl LoginStrategy for OidcStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Oidc
    }

    #[instrument(skip(self, request), fields(strategy = "oidc", name = %request.name))]
    async fn authenticate(&self, request: &LoginRequest) -> std::result::Result<UserInfo, LoginError> {
        let code = request.code()?;

        let config = self
            .context
            .resolver
            .get_oidc(&request.name)
            .await
            .map_err(|_| Error::configuration("unable to resolve OIDC configuration"))
            .with_status(StatusCode::EXPECTATION_FAILED)?;
        let spec = &config.spec;
        let client_secret = self
            .context
            .optional_secret(spec.client_secret.as_ref())
            .await
            .with_status(StatusCode::EXPECTATION_FAILED)?;
        let endpoints = resolve_endpoints(&self.context.http, spec)
            .await
            .with_status(StatusCode::EXPECTATION_FAILED)?;

        let (set, access_token) = self
            .login(spec, &endpoints, &client_secret, code)
            .await
            .with_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        let mut claims = set.claims;

        if let Some(reference) = spec.rest_action_ref.as_ref() {
            if access_token.is_empty() {
                return Err(LoginError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Error::provider("unable to get access_token from response"),
                ));
            }
            self.context
                .apply_rest_action(reference, &access_token, &mut claims)
                .await
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        }

        claims.preferred_username = claims.preferred_username.as_deref().map(dns1123);
        let user = claims
            .normalize()
            .ok_or_else(|| Error::provider("preferred_username is missing or empty"))
            .with_status(StatusCode::FORBIDDEN)?;

        info!(user = %user.username, groups = ?user.groups, "User info successfully fetched");
        Ok(user)
    }
}
