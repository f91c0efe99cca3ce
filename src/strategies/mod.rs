//! # Login Strategies
//!
//! One [`LoginStrategy`] per identity source. Each turns the credentials of a
//! login request into a [`UserInfo`] or a [`LoginError`] carrying the HTTP
//! status that source reports for the failure.
//!
//! | Strategy | Credentials | Identity source |
//! |---|---|---|
//! | [`basic`] | HTTP Basic | `User` objects + password secrets |
//! | [`ldap`] | username/password | LDAP directory |
//! | [`oauth`] | authorization code | generic OAuth2 + REST action |
//! | [`github`] | authorization code | GitHub user and team APIs |
//! | [`oidc`] | authorization code | OIDC token + userinfo endpoints |

pub mod basic;
pub mod github;
pub mod ldap;
pub mod listing;
pub mod oauth;
pub mod oidc;
pub mod token;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use tracing::debug;

use crate::errors::Error;
use crate::identity::{ProviderClaims, UserInfo};
use crate::resolvers::{
    ConfigResolver, IdentityOverride, ObjectRef, RestActionResolver, SecretKeySelector, SecretStore,
};

pub use basic::BasicStrategy;
pub use github::GithubStrategy;
pub use ldap::{Directory, DirectoryEntry, DirectorySession, LdapDirectory, LdapStrategy};
pub use listing::{list_strategies, StrategyEntry};
pub use oauth::OAuthStrategy;
pub use oidc::OidcStrategy;
pub use crate::resolvers::StrategyKind;

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Credentials presented with a login
#[derive(Clone)]
pub enum Credentials {
    /// Username and password (Basic and LDAP)
    Password { username: String, password: String },
    /// Authorization code returned by the provider's consent page
    AuthCode(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Password { username, .. } => {
                f.debug_struct("Password").field("username", username).finish_non_exhaustive()
            }
            Credentials::AuthCode(_) => f.write_str("AuthCode(..)"),
        }
    }
}

/// A login attempt against one configured strategy instance
#[derive(Debug, Clone)]
pub struct LoginRequest {
    /// Name of the strategy's configuration object; unused by Basic
    pub name: String,
    pub credentials: Credentials,
}

impl LoginRequest {
    pub fn password(name: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            credentials: Credentials::Password { username: username.into(), password: password.into() },
        }
    }

    pub fn auth_code(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self { name: name.into(), credentials: Credentials::AuthCode(code.into()) }
    }

    fn password_pair(&self) -> Result<(&str, &str), LoginError> {
        match &self.credentials {
            Credentials::Password { username, password } => Ok((username, password)),
            Credentials::AuthCode(_) => Err(Error::validation("username and password are required").into()),
        }
    }

    fn code(&self) -> Result<&str, LoginError> {
        match &self.credentials {
            Credentials::AuthCode(code) if !code.is_empty() => Ok(code),
            _ => Err(Error::validation("empty authorization code").into()),
        }
    }
}

/// A failed login and the status reported for it
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct LoginError {
    pub status: StatusCode,
    #[source]
    pub error: Error,
}

impl LoginError {
    pub fn new(status: StatusCode, error: Error) -> Self {
        Self { status, error }
    }
}

impl From<Error> for LoginError {
    fn from(error: Error) -> Self {
        let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self { status, error }
    }
}

/// Attach an explicit status to a failed step
pub trait WithStatus<T> {
    fn with_status(self, status: StatusCode) -> Result<T, LoginError>;
}

impl<T> WithStatus<T> for crate::errors::Result<T> {
    fn with_status(self, status: StatusCode) -> Result<T, LoginError> {
        self.map_err(|error| LoginError::new(status, error))
    }
}

/// Authenticates a login request against one identity source
#[async_trait]
pub trait LoginStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    async fn authenticate(&self, request: &LoginRequest) -> Result<UserInfo, LoginError>;
}

/// Collaborators shared by every strategy
#[derive(Clone)]
pub struct StrategyContext {
    pub resolver: Arc<dyn ConfigResolver>,
    pub secrets: Arc<dyn SecretStore>,
    pub rest_actions: Arc<dyn RestActionResolver>,
    pub http: reqwest::Client,
}

impl StrategyContext {
    pub fn new(
        resolver: Arc<dyn ConfigResolver>,
        secrets: Arc<dyn SecretStore>,
        rest_actions: Arc<dyn RestActionResolver>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { resolver, secrets, rest_actions, http }
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Value of an optional secret reference, empty when unset
    async fn optional_secret(&self, selector: Option<&SecretKeySelector>) -> crate::errors::Result<String> {
        match selector {
            Some(selector) => self.secrets.get_value(selector).await,
            None => Ok(String::new()),
        }
    }

    /// Resolve a REST action and apply its overrides to `claims`
    async fn apply_rest_action(
        &self,
        reference: &ObjectRef,
        bearer_token: &str,
        claims: &mut ProviderClaims,
    ) -> crate::errors::Result<()> {
        let status = self.rest_actions.resolve(reference, bearer_token).await?;
        let overrides = IdentityOverride::from_status(&status)?;
        debug!(restaction = %reference.name, empty = overrides.is_empty(), "Applying identity overrides");
        overrides.apply(claims);
        Ok(())
    }
}

/// All five strategies keyed by kind
#[derive(Clone)]
pub struct StrategyRegistry {
    strategies: Vec<Arc<dyn LoginStrategy>>,
}

impl StrategyRegistry {
    pub fn new(context: &StrategyContext, directory: Arc<dyn Directory>) -> Self {
        Self {
            strategies: vec![
                Arc::new(BasicStrategy::new(context.clone())),
                Arc::new(LdapStrategy::new(context.clone(), directory)),
                Arc::new(OAuthStrategy::new(context.clone())),
                Arc::new(GithubStrategy::new(context.clone())),
                Arc::new(OidcStrategy::new(context.clone())),
            ],
        }
    }

    pub fn get(&self, kind: StrategyKind) -> Option<Arc<dyn LoginStrategy>> {
        self.strategies.iter().find(|s| s.kind() == kind).cloned()
    }
}
