//! Login page catalogue: which strategies are configured and how to start
//! each of them.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::warn;

use super::oidc::resolve_endpoints;
use super::token::{authorization_url, random_state};
use super::{StrategyContext, StrategyKind};
use crate::errors::Result;
use crate::resolvers::{Graphics, Named, OAuth2Spec, OidcConfigSpec, StrategyConfig};

const DEFAULT_ICON: &str = "key";
const DEFAULT_BACKGROUND_COLOR: &str = "#ffffff";
const DEFAULT_TEXT_COLOR: &str = "#000000";
const EXT_AUTH_CODE_URL: &str = "authCodeURL";
const EXT_REDIRECT_URL: &str = "redirectURL";

/// One entry of the `/strategies` listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyEntry {
    pub kind: StrategyKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graphics: Option<Graphics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<BTreeMap<String, String>>,
}

impl StrategyEntry {
    fn new(kind: StrategyKind, name: Option<String>) -> Self {
        Self { kind, name, path: kind.login_path().to_string(), graphics: None, extensions: None }
    }
}

fn default_graphics(provider: &str) -> Graphics {
    Graphics {
        icon: DEFAULT_ICON.to_string(),
        display_name: format!("Login with {}", provider),
        background_color: DEFAULT_BACKGROUND_COLOR.to_string(),
        text_color: DEFAULT_TEXT_COLOR.to_string(),
    }
}

fn extensions(auth_code_url: String, redirect_url: &str) -> Option<BTreeMap<String, String>> {
    Some(BTreeMap::from([
        (EXT_AUTH_CODE_URL.to_string(), auth_code_url),
        (EXT_REDIRECT_URL.to_string(), redirect_url.to_string()),
    ]))
}

/// Authorization URL for the OAuth2 and GitHub flavors; `state` is the config name
pub fn oauth2_auth_code_url(name: &str, spec: &OAuth2Spec) -> Result<String> {
    let scope = spec.scopes.join(" ");
    authorization_url(
        &spec.auth_url,
        &[
            ("client_id", spec.client_id.as_str()),
            ("redirect_uri", spec.redirect_url.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", name),
        ],
    )
}

/// Authorization URL for an OIDC provider
pub fn oidc_auth_code_url(authorization_endpoint: &str, spec: &OidcConfigSpec) -> Result<String> {
    let scope = match spec.additional_scopes.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(extra) => format!("openid email profile {}", extra),
        None => "openid email profile".to_string(),
    };
    let state = random_state();

    authorization_url(
        authorization_endpoint,
        &[
            ("response_type", "code"),
            ("response_mode", "query"),
            ("client_id", spec.client_id.as_str()),
            ("redirect_uri", spec.redirect_uri.as_str()),
            ("scope", scope.as_str()),
            ("state", state.as_str()),
        ],
    )
}

async fn oidc_entry(context: &StrategyContext, config: &Named<OidcConfigSpec>) -> Result<StrategyEntry> {
    let endpoints = resolve_endpoints(&context.http, &config.spec).await?;
    let mut entry = StrategyEntry::new(StrategyKind::Oidc, Some(config.name.clone()));
    entry.graphics = Some(config.spec.graphics.clone().unwrap_or_else(|| default_graphics("OIDC")));
    entry.extensions = extensions(
        oidc_auth_code_url(&endpoints.authorization_url, &config.spec)?,
        &config.spec.redirect_uri,
    );
    Ok(entry)
}

fn oauth2_entry(kind: StrategyKind, name: &str, spec: &OAuth2Spec, provider: &str) -> Result<StrategyEntry> {
    let mut entry = StrategyEntry::new(kind, Some(name.to_string()));
    entry.graphics = Some(spec.graphics.clone().unwrap_or_else(|| default_graphics(provider)));
    entry.extensions = extensions(oauth2_auth_code_url(name, spec)?, &spec.redirect_url);
    Ok(entry)
}

async fn entries_for(context: &StrategyContext, kind: StrategyKind) -> Result<Vec<StrategyEntry>> {
    let configs = context.resolver.list(kind).await?;

    if kind == StrategyKind::Basic {
        // Users are not listed one by one
        return Ok(if configs.is_empty() { Vec::new() } else { vec![StrategyEntry::new(kind, None)] });
    }

    let mut entries = Vec::with_capacity(configs.len());
    for config in &configs {
        let entry = match config {
            StrategyConfig::Basic(_) => continue,
            StrategyConfig::Ldap(c) => {
                let mut entry = StrategyEntry::new(kind, Some(c.name.clone()));
                entry.graphics = c.spec.graphics.clone();
                entry
            }
            StrategyConfig::Oidc(c) => oidc_entry(context, c).await?,
            StrategyConfig::OAuth(c) => oauth2_entry(kind, &c.name, &c.spec.oauth2, "OAuth2")?,
            StrategyConfig::Github(c) => oauth2_entry(kind, &c.name, &c.spec.oauth2, "GitHub")?,
        };
        entries.push(entry);
    }
    Ok(entries)
}

/// Every configured strategy. A kind that fails to list is logged and left out.
pub async fn list_strategies(context: &StrategyContext) -> Vec<StrategyEntry> {
    let order = [StrategyKind::Basic, StrategyKind::Oidc, StrategyKind::Ldap, StrategyKind::OAuth, StrategyKind::Github];

    let mut all = Vec::new();
    for kind in order {
        match entries_for(context, kind).await {
            Ok(entries) => all.extend(entries),
            Err(e) => warn!(kind = %kind, error = %e, "Unable to list login strategies"),
        }
    }
    all
}
