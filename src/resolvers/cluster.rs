//! Kubernetes-backed configuration and secret resolution.
//!
//! Strategy configuration objects are custom resources read untyped through
//! `DynamicObject`; only their `spec` is decoded.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DynamicObject, ListParams};
use kube::discovery::ApiResource;
use kube::Client;
use tracing::{debug, warn};

use super::{ConfigResolver, SecretKeySelector, SecretStore, StrategyConfig, StrategyKind};
use crate::errors::{Error, Result};

const CONFIG_VERSION: &str = "v1alpha1";

/// Resolves strategy configuration and secrets from one namespace
#[derive(Clone)]
pub struct KubeResolver {
    client: Client,
    namespace: String,
}

impl KubeResolver {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self { client, namespace: namespace.into() }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn api_for(&self, kind: StrategyKind) -> Api<DynamicObject> {
        let ar = api_resource(kind);
        Api::namespaced_with(self.client.clone(), &self.namespace, &ar)
    }

    fn decode(kind: StrategyKind, obj: &DynamicObject) -> Result<StrategyConfig> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let spec = obj.data.get("spec").cloned().unwrap_or(serde_json::Value::Null);
        StrategyConfig::from_spec(kind, &name, spec)
    }
}

/// API resource describing a strategy's configuration object
pub fn api_resource(kind: StrategyKind) -> ApiResource {
    let (group, object_kind, plural) = kind.resource();
    ApiResource {
        group: group.to_string(),
        version: CONFIG_VERSION.to_string(),
        api_version: format!("{}/{}", group, CONFIG_VERSION),
        kind: object_kind.to_string(),
        plural: plural.to_string(),
    }
}

#[async_trait]
impl ConfigResolver for KubeResolver {
    async fn get(&self, kind: StrategyKind, name: &str) -> Result<StrategyConfig> {
        let (_, object_kind, _) = kind.resource();
        match self.api_for(kind).get(name).await {
            Ok(obj) => Self::decode(kind, &obj),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::configuration(format!(
                "{} '{}' not found in namespace '{}'",
                object_kind, name, self.namespace
            ))),
            Err(e) => Err(Error::configuration_with_source(
                format!("unable to resolve {} '{}'", object_kind, name),
                Box::new(e),
            )),
        }
    }

    async fn list(&self, kind: StrategyKind) -> Result<Vec<StrategyConfig>> {
        let list = match self.api_for(kind).list(&ListParams::default()).await {
            Ok(list) => list,
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                debug!(kind = %kind, "Configuration kind not installed");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut configs = Vec::with_capacity(list.items.len());
        for obj in &list.items {
            match Self::decode(kind, obj) {
                Ok(config) => configs.push(config),
                Err(e) => warn!(
                    kind = %kind,
                    name = obj.metadata.name.as_deref().unwrap_or_default(),
                    error = %e,
                    "Skipping unreadable configuration object"
                ),
            }
        }
        Ok(configs)
    }
}

#[async_trait]
impl SecretStore for KubeResolver {
    async fn get_value(&self, selector: &SecretKeySelector) -> Result<String> {
        let namespace =
            if selector.namespace.is_empty() { self.namespace.as_str() } else { selector.namespace.as_str() };
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);

        let secret = api.get(&selector.name).await.map_err(|e| {
            Error::configuration_with_source(
                format!("unable to read secret '{}/{}'", namespace, selector.name),
                Box::new(e),
            )
        })?;

        secret
            .data
            .as_ref()
            .and_then(|data| data.get(&selector.key))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
            .or_else(|| secret.string_data.as_ref().and_then(|data| data.get(&selector.key)).cloned())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "key '{}' not found in secret '{}/{}'",
                    selector.key, namespace, selector.name
                ))
            })
    }
}
