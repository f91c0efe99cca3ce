//! # Configuration Settings
//!
//! Defines the configuration structure for the authentication gateway.

use serde::{Deserialize, Deserializer};
use std::time::Duration;
use validator::Validate;

use super::parse_duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Generated kubeconfig and issued certificate settings
    #[validate(nested)]
    pub kubeconfig: KubeconfigConfig,

    /// Session token settings
    pub session: SessionConfig,

    /// REST-action service settings
    #[validate(nested)]
    pub restaction: RestActionConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Listen port
    #[validate(range(min = 1, message = "Port must be greater than 0"))]
    pub port: u16,

    /// Enable permissive CORS
    pub cors: bool,

    /// Grace period for in-flight requests on shutdown, in seconds
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8082, cors: true, shutdown_grace_seconds: 30 }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }
}

/// Settings that shape the issued credential and the document around it
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct KubeconfigConfig {
    /// Validity requested for issued client certificates
    #[serde(deserialize_with = "deserialize_duration")]
    pub cert_expires: Duration,

    /// Cluster and context name written into the kubeconfig
    #[validate(length(min = 1, message = "Cluster name cannot be empty"))]
    pub cluster_name: String,

    /// Explicit API server URL; derived in-cluster when absent
    #[validate(url(message = "Server URL must be a valid URL"))]
    pub server_url: Option<String>,

    /// Optional proxy URL written next to the server URL
    pub proxy_url: Option<String>,

    /// Namespace holding configuration objects and issued AuthInfo secrets
    pub namespace: Option<String>,

    /// Path to a kubeconfig for running outside the cluster
    pub kubeconfig_path: Option<String>,
}

impl Default for KubeconfigConfig {
    fn default() -> Self {
        Self {
            cert_expires: Duration::from_secs(24 * 60 * 60),
            cluster_name: "krateo".to_string(),
            server_url: None,
            proxy_url: None,
            namespace: None,
            kubeconfig_path: None,
        }
    }
}

/// Bearer session token settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HS256 signing key; no token is issued when unset
    pub jwt_sign_key: Option<String>,

    #[serde(deserialize_with = "deserialize_duration")]
    pub jwt_duration: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { jwt_sign_key: None, jwt_duration: Duration::from_secs(8 * 60 * 60) }
    }
}

/// REST-action service settings
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct RestActionConfig {
    #[validate(url(message = "Snowplow URL must be a valid URL"))]
    pub snowplow_url: String,

    /// Username of the gateway's own service identity
    #[validate(length(min = 1, message = "Service username cannot be empty"))]
    pub authn_username: String,
}

impl Default for RestActionConfig {
    fn default() -> Self {
        Self {
            snowplow_url: "http://snowplow.krateo-system.svc.cluster.local:8081".to_string(),
            authn_username: "authn".to_string(),
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing service name
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Metrics exporter port (0 = disabled)
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "authn".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            metrics_port: 0,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}
