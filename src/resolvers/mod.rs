//! # Configuration Resolvers
//!
//! Boundary to the configuration store: typed login strategy configuration,
//! secret values, and REST-action calls. The Kubernetes implementation lives in
//! [`cluster`], an in-memory one for tests and local runs in [`memory`].

pub mod cluster;
pub mod memory;
pub mod rest_action;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

pub use cluster::KubeResolver;
pub use memory::MemoryResolver;
pub use rest_action::{IdentityOverride, RestActionResolver, SnowplowResolver};

/// Login strategy kinds, one per configuration object type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Basic,
    Ldap,
    #[serde(rename = "oauth")]
    OAuth,
    Github,
    Oidc,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] =
        [StrategyKind::Basic, StrategyKind::Ldap, StrategyKind::OAuth, StrategyKind::Github, StrategyKind::Oidc];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Basic => "basic",
            StrategyKind::Ldap => "ldap",
            StrategyKind::OAuth => "oauth",
            StrategyKind::Github => "github",
            StrategyKind::Oidc => "oidc",
        }
    }

    /// HTTP route serving this strategy's login
    pub fn login_path(&self) -> &'static str {
        match self {
            StrategyKind::Basic => "/basic/login",
            StrategyKind::Ldap => "/ldap/login",
            StrategyKind::OAuth => "/oauth/login",
            StrategyKind::Github => "/github/login",
            StrategyKind::Oidc => "/oidc/login",
        }
    }

    /// API group, object kind and plural resource name of the configuration object
    pub fn resource(&self) -> (&'static str, &'static str, &'static str) {
        match self {
            StrategyKind::Basic => ("basic.authn.krateo.io", "User", "users"),
            StrategyKind::Ldap => ("ldap.authn.krateo.io", "LDAPConfig", "ldapconfigs"),
            StrategyKind::OAuth => ("oauth.authn.krateo.io", "OAuthConfig", "oauthconfigs"),
            StrategyKind::Github => ("oauth.authn.krateo.io", "GithubConfig", "githubconfigs"),
            StrategyKind::Oidc => ("oidc.authn.krateo.io", "OIDCConfig", "oidcconfigs"),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a namespaced object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
}

/// Reference to one key of a secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeySelector {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    pub key: String,
}

/// Rendering hints for the login page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graphics {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub icon: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub background_color: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text_color: String,
}

/// Local user for basic authentication
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSpec {
    pub password_ref: Option<SecretKeySelector>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "avatarURL")]
    pub avatar_url: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LdapConfigSpec {
    #[serde(rename = "dialURL")]
    pub dial_url: String,
    #[serde(default, rename = "bindDN")]
    pub bind_dn: Option<String>,
    #[serde(default, rename = "bindSecret")]
    pub bind_secret: Option<SecretKeySelector>,
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    #[serde(default)]
    pub tls: Option<bool>,
    #[serde(default)]
    pub graphics: Option<Graphics>,
}

/// Fields shared by the OAuth2 flavored configurations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuth2Spec {
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(default, rename = "clientSecretRef")]
    pub client_secret_ref: Option<SecretKeySelector>,
    #[serde(rename = "authURL")]
    pub auth_url: String,
    #[serde(rename = "tokenURL")]
    pub token_url: String,
    #[serde(rename = "redirectURL")]
    pub redirect_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub graphics: Option<Graphics>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfigSpec {
    #[serde(flatten)]
    pub oauth2: OAuth2Spec,
    #[serde(default, rename = "restActionRef")]
    pub rest_action_ref: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubConfigSpec {
    #[serde(flatten)]
    pub oauth2: OAuth2Spec,
    pub organization: String,
    #[serde(default, rename = "apiUrl")]
    pub api_url: Option<String>,
    #[serde(default, rename = "restActionRef")]
    pub rest_action_ref: Option<ObjectRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcConfigSpec {
    #[serde(default, rename = "discoveryURL")]
    pub discovery_url: Option<String>,
    #[serde(default, rename = "authorizationURL")]
    pub authorization_url: Option<String>,
    #[serde(default, rename = "tokenURL")]
    pub token_url: Option<String>,
    #[serde(default, rename = "userInfoURL")]
    pub user_info_url: Option<String>,
    #[serde(rename = "redirectURI")]
    pub redirect_uri: String,
    #[serde(rename = "clientID")]
    pub client_id: String,
    #[serde(default, rename = "clientSecret")]
    pub client_secret: Option<SecretKeySelector>,
    #[serde(default, rename = "additionalScopes")]
    pub additional_scopes: Option<String>,
    #[serde(default, rename = "restActionRef")]
    pub rest_action_ref: Option<ObjectRef>,
    #[serde(default)]
    pub graphics: Option<Graphics>,
}

/// A configuration object together with its name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Named<T> {
    pub name: String,
    pub spec: T,
}

impl<T> Named<T> {
    pub fn new(name: impl Into<String>, spec: T) -> Self {
        Self { name: name.into(), spec }
    }
}

/// Login strategy configuration, one variant per strategy kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StrategyConfig {
    Basic(Named<UserSpec>),
    Ldap(Named<LdapConfigSpec>),
    OAuth(Named<OAuthConfigSpec>),
    Github(Named<GithubConfigSpec>),
    Oidc(Named<OidcConfigSpec>),
}

impl StrategyConfig {
    pub fn kind(&self) -> StrategyKind {
        match self {
            StrategyConfig::Basic(_) => StrategyKind::Basic,
            StrategyConfig::Ldap(_) => StrategyKind::Ldap,
            StrategyConfig::OAuth(_) => StrategyKind::OAuth,
            StrategyConfig::Github(_) => StrategyKind::Github,
            StrategyConfig::Oidc(_) => StrategyKind::Oidc,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            StrategyConfig::Basic(c) => &c.name,
            StrategyConfig::Ldap(c) => &c.name,
            StrategyConfig::OAuth(c) => &c.name,
            StrategyConfig::Github(c) => &c.name,
            StrategyConfig::Oidc(c) => &c.name,
        }
    }

    /// Decode a configuration object's `spec` for the given kind
    pub fn from_spec(kind: StrategyKind, name: &str, spec: serde_json::Value) -> Result<Self> {
        let name = name.to_string();
        let decoded = match kind {
            StrategyKind::Basic => serde_json::from_value(spec).map(|s| Self::Basic(Named { name, spec: s })),
            StrategyKind::Ldap => serde_json::from_value(spec).map(|s| Self::Ldap(Named { name, spec: s })),
            StrategyKind::OAuth => serde_json::from_value(spec).map(|s| Self::OAuth(Named { name, spec: s })),
            StrategyKind::Github => serde_json::from_value(spec).map(|s| Self::Github(Named { name, spec: s })),
            StrategyKind::Oidc => serde_json::from_value(spec).map(|s| Self::Oidc(Named { name, spec: s })),
        };

        decoded.map_err(|e| {
            Error::configuration_with_source(format!("invalid {} spec", kind.resource().1), Box::new(e))
        })
    }
}

fn wrong_kind(expected: StrategyKind, got: &StrategyConfig) -> Error {
    Error::internal(format!("resolver returned {} config for {} lookup", got.kind(), expected))
}

/// Read access to login strategy configuration objects.
///
/// `get` fails with a configuration error when the object does not exist.
/// `list` returns an empty list when the kind is not installed.
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn get(&self, kind: StrategyKind, name: &str) -> Result<StrategyConfig>;

    async fn list(&self, kind: StrategyKind) -> Result<Vec<StrategyConfig>>;

    async fn get_user(&self, name: &str) -> Result<Named<UserSpec>> {
        match self.get(StrategyKind::Basic, name).await? {
            StrategyConfig::Basic(user) => Ok(user),
            other => Err(wrong_kind(StrategyKind::Basic, &other)),
        }
    }

    async fn get_ldap(&self, name: &str) -> Result<Named<LdapConfigSpec>> {
        match self.get(StrategyKind::Ldap, name).await? {
            StrategyConfig::Ldap(cfg) => Ok(cfg),
            other => Err(wrong_kind(StrategyKind::Ldap, &other)),
        }
    }

    async fn get_oauth(&self, name: &str) -> Result<Named<OAuthConfigSpec>> {
        match self.get(StrategyKind::OAuth, name).await? {
            StrategyConfig::OAuth(cfg) => Ok(cfg),
            other => Err(wrong_kind(StrategyKind::OAuth, &other)),
        }
    }

    async fn get_github(&self, name: &str) -> Result<Named<GithubConfigSpec>> {
        match self.get(StrategyKind::Github, name).await? {
            StrategyConfig::Github(cfg) => Ok(cfg),
            other => Err(wrong_kind(StrategyKind::Github, &other)),
        }
    }

    async fn get_oidc(&self, name: &str) -> Result<Named<OidcConfigSpec>> {
        match self.get(StrategyKind::Oidc, name).await? {
            StrategyConfig::Oidc(cfg) => Ok(cfg),
            other => Err(wrong_kind(StrategyKind::Oidc, &other)),
        }
    }
}

/// Read access to secret values.
///
/// An empty selector namespace means the store's own namespace.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_value(&self, selector: &SecretKeySelector) -> Result<String>;
}
