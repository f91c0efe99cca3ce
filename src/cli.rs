//! # Command Line Interface
//!
//! Flags for the gateway process. Every flag falls back to an environment
//! variable; anything left unset is taken from the optional config file or the
//! built-in defaults.

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;
use crate::errors::Result;

#[derive(Parser, Debug, Default)]
#[command(name = "authn")]
#[command(about = "Krateo authentication gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, env = "AUTHN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(long, env = "AUTHN_PORT")]
    pub port: Option<u16>,

    /// Enable permissive CORS
    #[arg(long, env = "AUTHN_CORS")]
    pub cors: Option<bool>,

    /// Enable debug logging
    #[arg(long, env = "AUTHN_DEBUG")]
    pub debug: bool,

    /// Emit logs as JSON
    #[arg(long, env = "AUTHN_LOG_JSON")]
    pub log_json: Option<bool>,

    /// Validity of issued client certificates (e.g. 24h)
    #[arg(long, env = "AUTHN_KUBECONFIG_CRT_EXPIRES_IN")]
    pub cert_expires: Option<String>,

    /// Cluster name written into generated kubeconfigs
    #[arg(long, env = "AUTHN_KUBECONFIG_CLUSTER_NAME")]
    pub kubeconfig_cluster_name: Option<String>,

    /// API server URL written into generated kubeconfigs
    #[arg(long, env = "AUTHN_KUBECONFIG_SERVER_URL")]
    pub kubeconfig_server_url: Option<String>,

    /// Proxy URL written into generated kubeconfigs
    #[arg(long, env = "AUTHN_KUBECONFIG_PROXY_URL")]
    pub kubeconfig_proxy_url: Option<String>,

    /// Namespace holding configuration objects and issued secrets
    #[arg(long, env = "AUTHN_NAMESPACE")]
    pub namespace: Option<String>,

    /// REST-action service base URL
    #[arg(long, env = "URL_SNOWPLOW")]
    pub snowplow_url: Option<String>,

    /// Username of the gateway's own service identity
    #[arg(long, env = "AUTHN_USERNAME")]
    pub authn_username: Option<String>,

    /// Session token signing key
    #[arg(long, env = "AUTHN_JWT_SIGN_KEY", hide_env_values = true)]
    pub jwt_sign_key: Option<String>,

    /// Session token lifetime (e.g. 8h)
    #[arg(long, env = "AUTHN_JWT_DURATION")]
    pub jwt_duration: Option<String>,

    /// Prometheus exporter port (0 disables it)
    #[arg(long, env = "AUTHN_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Kubeconfig used when running outside the cluster
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,
}

impl Cli {
    /// Dotted-key overrides for the settings tree; unset or empty values are skipped
    pub fn overrides(&self) -> Vec<(&'static str, config::Value)> {
        let mut out: Vec<(&'static str, config::Value)> = Vec::new();

        let text = |value: &Option<String>| value.as_deref().filter(|v| !v.is_empty()).map(str::to_string);

        if let Some(port) = self.port {
            out.push(("server.port", i64::from(port).into()));
        }
        if let Some(cors) = self.cors {
            out.push(("server.cors", cors.into()));
        }
        if self.debug {
            out.push(("observability.log_level", "debug".into()));
        }
        if let Some(json) = self.log_json {
            out.push(("observability.json_logging", json.into()));
        }
        if let Some(port) = self.metrics_port {
            out.push(("observability.metrics_port", i64::from(port).into()));
        }

        let strings = [
            ("kubeconfig.cert_expires", text(&self.cert_expires)),
            ("kubeconfig.cluster_name", text(&self.kubeconfig_cluster_name)),
            ("kubeconfig.server_url", text(&self.kubeconfig_server_url)),
            ("kubeconfig.proxy_url", text(&self.kubeconfig_proxy_url)),
            ("kubeconfig.namespace", text(&self.namespace)),
            ("kubeconfig.kubeconfig_path", text(&self.kubeconfig)),
            ("restaction.snowplow_url", text(&self.snowplow_url)),
            ("restaction.authn_username", text(&self.authn_username)),
            ("session.jwt_sign_key", text(&self.jwt_sign_key)),
            ("session.jwt_duration", text(&self.jwt_duration)),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                out.push((key, value.into()));
            }
        }

        out
    }

    /// Build the validated application settings
    pub fn load_config(&self) -> Result<AppConfig> {
        AppConfig::load(self.config.as_deref(), self.overrides())
    }
}
