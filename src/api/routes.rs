use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::kubeconfig::KubeconfigGenerator;
use crate::observability::MetricsRecorder;
use crate::session::SessionIssuer;
use crate::strategies::{StrategyContext, StrategyRegistry};

use super::handlers::{
    basic_login_handler, github_login_handler, health_handler, info_handler, ldap_login_handler,
    oauth_login_handler, oidc_login_handler, strategies_handler, AUTH_CODE_HEADER,
};

const CORS_MAX_AGE: Duration = Duration::from_secs(300);

/// Serving flag reported by `/health`
#[derive(Debug, Clone, Default)]
pub struct HealthFlag(Arc<AtomicBool>);

impl HealthFlag {
    pub fn new(healthy: bool) -> Self {
        Self(Arc::new(AtomicBool::new(healthy)))
    }

    pub fn set(&self, healthy: bool) {
        self.0.store(healthy, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiState {
    pub registry: StrategyRegistry,
    pub context: StrategyContext,
    pub generator: Arc<KubeconfigGenerator>,
    pub session: Option<SessionIssuer>,
    pub health: HealthFlag,
    pub metrics: MetricsRecorder,
    pub service_name: String,
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(AUTH_CODE_HEADER),
        ])
        .expose_headers([header::LINK])
        .max_age(CORS_MAX_AGE)
}

pub fn build_router(state: ApiState, cors: bool) -> Router {
    let router = Router::new()
        .route("/basic/login", get(basic_login_handler))
        .route("/ldap/login", post(ldap_login_handler))
        .route("/oauth/login", get(oauth_login_handler))
        .route("/github/login", get(github_login_handler))
        .route("/oidc/login", get(oidc_login_handler))
        .route("/strategies", get(strategies_handler))
        .route("/info", get(info_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let router = router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
    if cors {
        router.layer(cors_layer())
    } else {
        router
    }
}
