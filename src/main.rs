use std::sync::Arc;

use authn::{
    api::{start_api_server, ApiState, HealthFlag},
    cli::Cli,
    config::{resolve_namespace, AppConfig},
    issuance::{IssuanceEngine, KubeCsrClient},
    kubeconfig::{ConfigMapCaSource, KubeconfigGenerator, SecretAuthInfoStore},
    observability::{init_observability, log_config_info, MetricsRecorder},
    resolvers::{KubeResolver, SnowplowResolver},
    session::SessionIssuer,
    signup::sign_up,
    strategies::{LdapDirectory, StrategyContext, StrategyRegistry},
    Error, Result, APP_NAME, VERSION,
};
use clap::Parser;
use kube::config::{KubeConfigOptions, Kubeconfig};
use tracing::{error, info};

fn install_rustls_provider() {
    use rustls::crypto::{ring, CryptoProvider};

    if CryptoProvider::get_default().is_none() {
        // Fails only when another provider won the race, which is fine
        let _ = ring::default_provider().install_default();
    }
}

/// Client from an explicit kubeconfig, else in-cluster or inferred settings
async fn kube_client(path: Option<&str>) -> Result<kube::Client> {
    let config = match path.filter(|p| !p.is_empty()) {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| Error::configuration(format!("Unable to read kubeconfig {}: {}", path, e)))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::configuration(format!("Invalid kubeconfig {}: {}", path, e)))?
        }
        None => kube::Config::infer()
            .await
            .map_err(|e| Error::configuration(format!("Unable to infer cluster configuration: {}", e)))?,
    };

    Ok(kube::Client::try_from(config)?)
}

async fn build_state(config: &AppConfig) -> Result<ApiState> {
    let client = kube_client(config.kubeconfig.kubeconfig_path.as_deref()).await?;
    let namespace = resolve_namespace(config.kubeconfig.namespace.as_deref())?;
    info!(namespace = %namespace, "Using storage namespace");

    let session = SessionIssuer::from_config(&config.session);

    let resolver = Arc::new(KubeResolver::new(client.clone(), namespace.clone()));
    let rest_actions = Arc::new(SnowplowResolver::new(
        config.restaction.snowplow_url.clone(),
        config.restaction.authn_username.clone(),
        session.clone(),
    ));
    let context = StrategyContext::new(resolver.clone(), resolver, rest_actions);
    let registry = StrategyRegistry::new(&context, Arc::new(LdapDirectory));

    let issuer = IssuanceEngine::new(Arc::new(KubeCsrClient::new(client.clone())));
    let generator = Arc::new(KubeconfigGenerator::new(
        issuer,
        Arc::new(SecretAuthInfoStore::new(client.clone(), &namespace)),
        Arc::new(ConfigMapCaSource::new(client, &namespace)),
        &config.kubeconfig,
    ));

    Ok(ApiState {
        registry,
        context,
        generator,
        session,
        health: HealthFlag::new(false),
        metrics: MetricsRecorder::new(),
        service_name: config.observability.service_name.clone(),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    install_rustls_provider();

    // Load .env file if it exists (optional - won't fail if missing)
    // This must happen before flags fall back to the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();
    let config = cli.load_config()?;

    init_observability(&config.observability).await?;
    info!(app_name = APP_NAME, version = VERSION, "Starting authentication gateway");
    log_config_info(&config);

    let state = build_state(&config).await?;

    let generator = state.generator.clone();
    let service_username = config.restaction.authn_username.clone();
    tokio::spawn(async move {
        if let Err(e) = sign_up(&generator, &service_username).await {
            error!(error = %e, username = %service_username, "Unable to sign up service identity");
        }
    });

    if let Err(e) = start_api_server(&config.server, state).await {
        error!(error = %e, "API server terminated with error");
        std::process::exit(1);
    }

    info!("authn shutdown completed");
    Ok(())
}
