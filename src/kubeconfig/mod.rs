//! # Kubeconfig Generation
//!
//! Turns an authenticated [`UserInfo`] into a kubeconfig document: the
//! cluster CA and API server address come from the environment the gateway
//! runs in, the client credential from the [`IssuanceEngine`]. The resulting
//! [`AuthInfo`] is persisted before the document is handed back, so `/info`
//! can serve it later.

pub mod document;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube::Client;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::KubeconfigConfig;
use crate::errors::{Error, Result};
use crate::identity::UserInfo;
use crate::issuance::IssuanceEngine;

pub use document::{CertInfo, ClusterInfo, KubeConfig};
pub use store::{AuthInfo, AuthInfoStore, MemoryAuthInfoStore, SecretAuthInfoStore};

/// ConfigMap published by the API server in every namespace
pub const ROOT_CA_CONFIGMAP: &str = "kube-root-ca.crt";
pub const ROOT_CA_KEY: &str = "ca.crt";

/// Source of the cluster CA bundle (PEM)
#[async_trait]
pub trait CaSource: Send + Sync {
    async fn ca_pem(&self) -> Result<Vec<u8>>;
}

/// Reads the CA bundle from the root CA ConfigMap
pub struct ConfigMapCaSource {
    api: Api<ConfigMap>,
    namespace: String,
}

impl ConfigMapCaSource {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self { api: Api::namespaced(client, namespace), namespace: namespace.to_string() }
    }
}

#[async_trait]
impl CaSource for ConfigMapCaSource {
    async fn ca_pem(&self) -> Result<Vec<u8>> {
        let cm = self.api.get(ROOT_CA_CONFIGMAP).await.map_err(|e| {
            Error::issuance_with_source(
                format!("unable to read configmap '{}' (namespace: {})", ROOT_CA_CONFIGMAP, self.namespace),
                Box::new(e),
            )
        })?;

        cm.data
            .and_then(|mut data| data.remove(ROOT_CA_KEY))
            .map(String::into_bytes)
            .ok_or_else(|| {
                Error::issuance(format!("key '{}' not found in configmap '{}'", ROOT_CA_KEY, ROOT_CA_CONFIGMAP))
            })
    }
}

/// Fixed CA bundle
pub struct StaticCaSource(pub Vec<u8>);

#[async_trait]
impl CaSource for StaticCaSource {
    async fn ca_pem(&self) -> Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// Address of the API server: the configured URL, else the in-cluster service
/// address.
pub fn resolve_server_url(
    configured: Option<&str>,
    service_host: Option<&str>,
    service_port: Option<&str>,
) -> Result<String> {
    if let Some(url) = configured.filter(|u| !u.is_empty()) {
        return Ok(url.to_string());
    }

    match (service_host.filter(|h| !h.is_empty()), service_port.filter(|p| !p.is_empty())) {
        (Some(host), Some(port)) if host.contains(':') => Ok(format!("https://[{}]:{}", host, port)),
        (Some(host), Some(port)) => Ok(format!("https://{}:{}", host, port)),
        _ => Err(Error::NotInCluster),
    }
}

/// Builds and records kubeconfigs for authenticated users
pub struct KubeconfigGenerator {
    issuer: IssuanceEngine,
    store: Arc<dyn AuthInfoStore>,
    ca_source: Arc<dyn CaSource>,
    ca_data: OnceCell<String>,
    cluster_name: String,
    server_url: Option<String>,
    proxy_url: Option<String>,
    cert_duration: Duration,
}

impl KubeconfigGenerator {
    pub fn new(
        issuer: IssuanceEngine,
        store: Arc<dyn AuthInfoStore>,
        ca_source: Arc<dyn CaSource>,
        config: &KubeconfigConfig,
    ) -> Self {
        Self {
            issuer,
            store,
            ca_source,
            ca_data: OnceCell::new(),
            cluster_name: config.cluster_name.clone(),
            server_url: config.server_url.clone(),
            proxy_url: config.proxy_url.clone().filter(|p| !p.is_empty()),
            cert_duration: config.cert_expires,
        }
    }

    pub fn store(&self) -> &Arc<dyn AuthInfoStore> {
        &self.store
    }

    pub fn cert_duration(&self) -> Duration {
        self.cert_duration
    }

    /// Base64 CA bundle, fetched once
    pub async fn ca_data(&self) -> Result<String> {
        self.ca_data
            .get_or_try_init(|| async {
                let pem = self.ca_source.ca_pem().await?;
                debug!(bytes = pem.len(), "Cluster CA loaded");
                Ok(STANDARD.encode(pem))
            })
            .await
            .cloned()
    }

    pub fn server_url(&self) -> Result<String> {
        resolve_server_url(
            self.server_url.as_deref(),
            std::env::var("KUBERNETES_SERVICE_HOST").ok().as_deref(),
            std::env::var("KUBERNETES_SERVICE_PORT").ok().as_deref(),
        )
    }

    /// Kubeconfig with a certificate valid for the configured duration
    pub async fn generate(&self, user: &UserInfo) -> Result<KubeConfig> {
        self.generate_with_validity(user, self.cert_duration).await
    }

    pub async fn generate_with_validity(&self, user: &UserInfo, validity: Duration) -> Result<KubeConfig> {
        let ca_data = self.ca_data().await?;
        let server = self.server_url()?;

        let credential = self.issuer.issue(user, validity).await?;

        let auth_info = AuthInfo {
            server: server.clone(),
            proxy_url: self.proxy_url.clone().unwrap_or_default(),
            ca_data: ca_data.clone(),
            cert_data: credential.certificate_data(),
            key_data: credential.key_data(),
        };
        self.store.put(&user.username, &auth_info).await?;
        info!(username = %user.username, cluster = %self.cluster_name, "Kubeconfig generated");

        Ok(KubeConfig::single(
            &self.cluster_name,
            &user.username,
            ClusterInfo { server, certificate_authority_data: ca_data, proxy_url: self.proxy_url.clone() },
            CertInfo { client_certificate_data: auth_info.cert_data, client_key_data: auth_info.key_data },
        ))
    }
}
