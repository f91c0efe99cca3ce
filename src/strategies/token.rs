//! Authorization-code exchange and token helpers shared by the OAuth2
//! flavored strategies.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use crate::errors::{Error, Result};

/// Token endpoint response
#[derive(Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub id_token: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("has_id_token", &!self.id_token.is_empty())
            .finish_non_exhaustive()
    }
}

impl TokenResponse {
    pub fn is_bearer(&self) -> bool {
        self.token_type.eq_ignore_ascii_case("bearer")
    }

    /// The access token, for flows that call the provider or a REST action with it
    pub fn access_token(&self) -> Result<&str> {
        if self.access_token.is_empty() {
            return Err(Error::provider("server response missing access_token"));
        }
        Ok(&self.access_token)
    }
}

/// Parameters of an authorization-code grant
#[derive(Clone)]
pub struct CodeExchange<'a> {
    pub token_url: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub redirect_uri: &'a str,
}

impl CodeExchange<'_> {
    /// POST the code to the token endpoint and decode the token
    pub async fn exchange(&self, http: &reqwest::Client, code: &str) -> Result<TokenResponse> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri),
            ("client_id", self.client_id),
            ("client_secret", self.client_secret),
        ];

        let response = http
            .post(self.token_url)
            .header(http::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| Error::provider_with_source("failed to send request to token endpoint", Box::new(e)))?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::provider(format!(
                "token endpoint returned non-200 status code: {}, body: {}",
                status.as_u16(),
                body
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::provider_with_source("failed to unmarshal token response", Box::new(e)))?;

        if let Some(code) = token.error.as_deref() {
            return Err(Error::provider(format!(
                "token endpoint rejected the code: {} {}",
                code,
                token.error_description.as_deref().unwrap_or_default()
            )));
        }
        Ok(token)
    }
}

/// Decode the claim set of a JWT without verifying its signature
pub fn decode_unverified_claims(token: &str) -> Result<Map<String, Value>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::provider(format!("invalid token: expected 3 parts, got {}", parts.len())));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| Error::provider(format!("error decoding payload: {}", e)))?;

    serde_json::from_slice(&payload).map_err(|e| Error::provider(format!("error parsing payload JSON: {}", e)))
}

/// Append query parameters to an authorization endpoint
pub fn authorization_url(base: &str, params: &[(&str, &str)]) -> Result<String> {
    let mut url = Url::parse(base)
        .map_err(|e| Error::configuration(format!("invalid authorization url '{}': {}", base, e)))?;
    url.query_pairs_mut().extend_pairs(params);
    Ok(url.into())
}

/// Random `state` value for authorization requests
pub fn random_state() -> String {
    rand::thread_rng().sample_iter(&Alphanumeric).take(16).map(char::from).collect()
}
