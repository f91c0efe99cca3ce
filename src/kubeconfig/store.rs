//! AuthInfo persistence.
//!
//! One secret per user, `<dns1123(username)>-clientconfig`, rewritten on every
//! successful login.

use std::collections::BTreeMap;

use async_trait::async_trait;
use dashmap::DashMap;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{Error, Result};
use crate::identity::dns1123;

pub const CLIENT_CERT_KEY: &str = "client-certificate-data";
pub const CLIENT_KEY_KEY: &str = "client-key-data";
pub const CA_KEY: &str = "certificate-authority-data";
pub const PROXY_URL_KEY: &str = "proxy-url";
pub const SERVER_URL_KEY: &str = "server-url";

/// Issued credential bundle for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthInfo {
    pub server: String,
    #[serde(rename = "proxy-url", default, skip_serializing_if = "String::is_empty")]
    pub proxy_url: String,
    #[serde(rename = "certificate-authority-data")]
    pub ca_data: String,
    #[serde(rename = "client-certificate-data")]
    pub cert_data: String,
    #[serde(rename = "client-key-data")]
    pub key_data: String,
}

impl AuthInfo {
    fn to_string_data(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (CA_KEY.to_string(), self.ca_data.clone()),
            (CLIENT_CERT_KEY.to_string(), self.cert_data.clone()),
            (CLIENT_KEY_KEY.to_string(), self.key_data.clone()),
            (SERVER_URL_KEY.to_string(), self.server.clone()),
            (PROXY_URL_KEY.to_string(), self.proxy_url.clone()),
        ])
    }

    fn from_secret(name: &str, secret: &Secret) -> Result<Self> {
        let data = secret.data.as_ref();
        let field = |key: &str| -> Result<String> {
            data.and_then(|d| d.get(key))
                .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
                .ok_or_else(|| Error::persistence(format!("{} not found (secret: {})", key, name)))
        };

        Ok(Self {
            cert_data: field(CLIENT_CERT_KEY)?,
            key_data: field(CLIENT_KEY_KEY)?,
            server: field(SERVER_URL_KEY)?,
            proxy_url: field(PROXY_URL_KEY)?,
            ca_data: field(CA_KEY)?,
        })
    }
}

/// Secret name holding a user's AuthInfo
pub fn secret_name(username: &str) -> String {
    format!("{}-clientconfig", dns1123(username))
}

/// Keyed storage of issued credentials
#[async_trait]
pub trait AuthInfoStore: Send + Sync {
    /// Create or overwrite the record for `username`
    async fn put(&self, username: &str, info: &AuthInfo) -> Result<()>;

    async fn get(&self, username: &str) -> Result<AuthInfo>;
}

/// AuthInfo kept in cluster secrets
#[derive(Clone)]
pub struct SecretAuthInfoStore {
    api: Api<Secret>,
    namespace: String,
}

impl SecretAuthInfoStore {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self { api: Api::namespaced(client, namespace), namespace: namespace.to_string() }
    }
}

#[async_trait]
impl AuthInfoStore for SecretAuthInfoStore {
    async fn put(&self, username: &str, info: &AuthInfo) -> Result<()> {
        let name = secret_name(username);
        let mut secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            string_data: Some(info.to_string_data()),
            ..Default::default()
        };

        match self.api.create(&PostParams::default(), &secret).await {
            Ok(_) => {
                debug!(secret = %name, "AuthInfo created");
                return Ok(());
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {}
            Err(e) => {
                return Err(Error::persistence_with_source(
                    format!("unable to create secret '{}'", name),
                    Box::new(e),
                ))
            }
        }

        // Replace with the current resource version so concurrent writers conflict
        let existing = self.api.get(&name).await.map_err(|e| {
            Error::persistence_with_source(format!("unable to read secret '{}'", name), Box::new(e))
        })?;
        secret.metadata.resource_version = existing.metadata.resource_version;

        self.api.replace(&name, &PostParams::default(), &secret).await.map_err(|e| {
            Error::persistence_with_source(format!("unable to update secret '{}'", name), Box::new(e))
        })?;

        debug!(secret = %name, "AuthInfo updated");
        Ok(())
    }

    async fn get(&self, username: &str) -> Result<AuthInfo> {
        let name = secret_name(username);
        let secret = self.api.get(&name).await.map_err(|e| {
            Error::persistence_with_source(
                format!("unable to read secret '{}' (namespace: {})", name, self.namespace),
                Box::new(e),
            )
        })?;
        AuthInfo::from_secret(&name, &secret)
    }
}

/// AuthInfo kept in process memory
#[derive(Debug, Default)]
pub struct MemoryAuthInfoStore {
    entries: DashMap<String, AuthInfo>,
}

impl MemoryAuthInfoStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl AuthInfoStore for MemoryAuthInfoStore {
    async fn put(&self, username: &str, info: &AuthInfo) -> Result<()> {
        self.entries.insert(secret_name(username), info.clone());
        Ok(())
    }

    async fn get(&self, username: &str) -> Result<AuthInfo> {
        let name = secret_name(username);
        self.entries
            .get(&name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::persistence(format!("secret '{}' not found", name)))
    }
}
