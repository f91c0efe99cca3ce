//! # Configuration Management
//!
//! Settings are layered: built-in defaults, then an optional config file, then
//! command line flags (which clap already merges with their environment
//! variables). The merged result is validated before use.

pub mod settings;

pub use settings::{
    AppConfig, KubeconfigConfig, ObservabilityConfig, RestActionConfig, ServerConfig,
    SessionConfig,
};

use std::path::Path;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use validator::Validate;

use crate::errors::{Error, Result};

/// Environment variable carrying the namespace the pod runs in
pub const NAMESPACE_ENV_VAR: &str = "POD_NAMESPACE";

const SERVICE_ACCOUNT_NAMESPACE_FILE: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/namespace";

static DURATION_PART: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(ms|s|m|h|d)").expect("static duration regex"));

impl AppConfig {
    /// Load configuration from an optional file plus explicit overrides.
    ///
    /// Overrides use dotted keys (`server.port`, `kubeconfig.cert_expires`)
    /// and win over anything the file provides.
    pub fn load(
        file: Option<&Path>,
        overrides: Vec<(&'static str, config::Value)>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path));
        }

        for (key, value) in overrides {
            builder = builder.set_override(key, value)?;
        }

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(Error::from)?;

        if self.kubeconfig.cert_expires.is_zero() {
            return Err(Error::configuration("Certificate duration must be greater than zero"));
        }

        Ok(())
    }
}

/// Parse durations like `90s`, `15m`, `24h`, `1h30m` or `7d`. A bare number is seconds.
pub fn parse_duration(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::configuration("empty duration"));
    }

    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in DURATION_PART.captures_iter(trimmed) {
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        consumed += whole.len();

        let value: u64 = caps[1]
            .parse()
            .map_err(|_| Error::configuration(format!("invalid duration '{}'", input)))?;
        total += match &caps[2] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 60 * 60),
            _ => Duration::from_secs(value * 24 * 60 * 60),
        };
    }

    if consumed != trimmed.len() {
        return Err(Error::configuration(format!("invalid duration '{}'", input)));
    }

    Ok(total)
}

/// Resolve the namespace that holds configuration objects and issued secrets.
///
/// Order: explicit setting, `POD_NAMESPACE`, the service account namespace file.
pub fn resolve_namespace(explicit: Option<&str>) -> Result<String> {
    if let Some(ns) = explicit.filter(|ns| !ns.is_empty()) {
        return Ok(ns.to_string());
    }

    if let Ok(ns) = std::env::var(NAMESPACE_ENV_VAR) {
        if !ns.is_empty() {
            return Ok(ns);
        }
    }

    match std::fs::read_to_string(SERVICE_ACCOUNT_NAMESPACE_FILE) {
        Ok(ns) => Ok(ns.trim().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(Error::configuration("namespace not found for current environment"))
        }
        Err(e) => Err(e.into()),
    }
}
