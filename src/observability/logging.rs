//! # Structured Logging
//!
//! Subscriber setup plus span helpers shared by the HTTP handlers.
//!
//! `RUST_LOG` wins over the configured level when it is set, so operators can
//! raise verbosity for one module without redeploying with `--debug`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{AppConfig, ObservabilityConfig};

/// Create a tracing span for request tracking.
///
/// ```rust,ignore
/// let span = request_span!("POST", "/ldap/login", strategy = "ldap");
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            username = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %uuid::Uuid::new_v4(),
            username = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for one certificate issuance
#[macro_export]
macro_rules! issuance_span {
    ($csr_name:expr) => {
        tracing::info_span!(
            "csr_issuance",
            csr = %$csr_name,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_logging {
        registry.with(fmt::layer().json().with_current_span(true).with_span_list(false)).try_init()
    } else {
        registry.with(fmt::layer().compact().with_target(false)).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}

/// Log configuration at startup. Secrets are reported by presence only.
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        cors = config.server.cors,
        cluster_name = %config.kubeconfig.cluster_name,
        cert_expires_secs = config.kubeconfig.cert_expires.as_secs(),
        server_url = config.kubeconfig.server_url.as_deref().unwrap_or("<in-cluster>"),
        namespace = config.kubeconfig.namespace.as_deref().unwrap_or("<pod namespace>"),
        snowplow_url = %config.restaction.snowplow_url,
        session_tokens = config.session.jwt_sign_key.is_some(),
        "authn configuration"
    );
}
