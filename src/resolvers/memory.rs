//! In-memory configuration and secret store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    ConfigResolver, GithubConfigSpec, LdapConfigSpec, Named, OAuthConfigSpec, OidcConfigSpec,
    SecretKeySelector, SecretStore, StrategyConfig, StrategyKind, UserSpec,
};
use crate::errors::{Error, Result};

/// Configuration objects and secrets held in process memory
#[derive(Debug, Default)]
pub struct MemoryResolver {
    namespace: String,
    configs: DashMap<(StrategyKind, String), StrategyConfig>,
    secrets: DashMap<(String, String), HashMap<String, String>>,
}

impl MemoryResolver {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), ..Default::default() }
    }

    pub fn insert(&self, config: StrategyConfig) {
        self.configs.insert((config.kind(), config.name().to_string()), config);
    }

    pub fn with_user(self, name: &str, spec: UserSpec) -> Self {
        self.insert(StrategyConfig::Basic(Named::new(name, spec)));
        self
    }

    pub fn with_ldap(self, name: &str, spec: LdapConfigSpec) -> Self {
        self.insert(StrategyConfig::Ldap(Named::new(name, spec)));
        self
    }

    pub fn with_oauth(self, name: &str, spec: OAuthConfigSpec) -> Self {
        self.insert(StrategyConfig::OAuth(Named::new(name, spec)));
        self
    }

    pub fn with_github(self, name: &str, spec: GithubConfigSpec) -> Self {
        self.insert(StrategyConfig::Github(Named::new(name, spec)));
        self
    }

    pub fn with_oidc(self, name: &str, spec: OidcConfigSpec) -> Self {
        self.insert(StrategyConfig::Oidc(Named::new(name, spec)));
        self
    }

    /// Store a secret value; an empty namespace means the resolver's namespace
    pub fn with_secret(self, namespace: &str, name: &str, key: &str, value: &str) -> Self {
        let namespace = self.effective_namespace(namespace).to_string();
        self.secrets
            .entry((namespace, name.to_string()))
            .or_default()
            .insert(key.to_string(), value.to_string());
        self
    }

    fn effective_namespace<'a>(&'a self, namespace: &'a str) -> &'a str {
        if namespace.is_empty() {
            &self.namespace
        } else {
            namespace
        }
    }
}

#[async_trait]
impl ConfigResolver for MemoryResolver {
    async fn get(&self, kind: StrategyKind, name: &str) -> Result<StrategyConfig> {
        self.configs.get(&(kind, name.to_string())).map(|entry| entry.value().clone()).ok_or_else(|| {
            Error::configuration(format!("{} '{}' not found", kind.resource().1, name))
        })
    }

    async fn list(&self, kind: StrategyKind) -> Result<Vec<StrategyConfig>> {
        // Sorted by name so listings are stable
        let sorted: BTreeMap<String, StrategyConfig> = self
            .configs
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        Ok(sorted.into_values().collect())
    }
}

#[async_trait]
impl SecretStore for MemoryResolver {
    async fn get_value(&self, selector: &SecretKeySelector) -> Result<String> {
        let namespace = self.effective_namespace(&selector.namespace).to_string();
        self.secrets
            .get(&(namespace.clone(), selector.name.clone()))
            .and_then(|secret| secret.get(&selector.key).cloned())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "key '{}' not found in secret '{}/{}'",
                    selector.key, namespace, selector.name
                ))
            })
    }
}
