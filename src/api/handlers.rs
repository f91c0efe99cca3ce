//! Login, listing, info and health handlers.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::headers::{authorization::Basic, Authorization, HeaderMapExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Instrument, Span};

use crate::errors::Error;
use crate::request_span;
use crate::strategies::{list_strategies, LoginRequest, StrategyKind};

use super::envelope::{attachment, Envelope};
use super::error::ApiError;
use super::routes::ApiState;

/// Header carrying the provider authorization code
pub const AUTH_CODE_HEADER: &str = "x-auth-code";

const BASIC_CHALLENGE: &str = r#"Basic realm="krateo", charset="UTF-8""#;

#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    pub name: Option<String>,
    /// Present (with any value) to download the kubeconfig as a file
    pub d: Option<String>,
}

impl LoginParams {
    fn required_name(&self) -> Result<&str, ApiError> {
        self.name.as_deref().filter(|n| !n.is_empty()).ok_or_else(|| ApiError::bad_request("missing name"))
    }
}

#[derive(Debug, Deserialize)]
pub struct PasswordBody {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub name: String,
    pub version: &'static str,
}

/// Authenticate, issue the kubeconfig and build the response
async fn complete_login(
    state: &ApiState,
    kind: StrategyKind,
    request: LoginRequest,
    download: bool,
) -> Result<Response, ApiError> {
    let strategy = state
        .registry
        .get(kind)
        .ok_or_else(|| ApiError::internal(format!("strategy {} is not registered", kind)))?;

    let user = match strategy.authenticate(&request).await {
        Ok(user) => user,
        Err(err) => {
            state.metrics.record_login(kind.as_str(), &err.error.kind().to_string());
            warn!(status = err.status.as_u16(), error = %err, "Login rejected");
            return Err(err.into());
        }
    };
    Span::current().record("username", user.username.as_str());

    let kubeconfig = state.generator.generate(&user).await.map_err(|err| {
        state.metrics.record_login(kind.as_str(), &err.kind().to_string());
        warn!(error = %err, "Unable to generate kubeconfig");
        ApiError::from(err)
    })?;
    state.metrics.record_login(kind.as_str(), "success");
    info!(groups = ?user.groups, "Login succeeded");

    if download {
        let body = serde_json::to_vec(&kubeconfig).map_err(Error::from)?;
        return Ok(attachment(&user.username, body));
    }

    let access_token = match &state.session {
        Some(issuer) => Some(issuer.issue(&user.username, &user.groups)?),
        None => None,
    };

    Ok(Envelope::for_user(&user, access_token, kubeconfig).into_response())
}

fn basic_challenge() -> Response {
    let mut response = ApiError::new(StatusCode::UNAUTHORIZED, "missing basic credentials").into_response();
    response.headers_mut().insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(BASIC_CHALLENGE));
    response
}

fn auth_code(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(AUTH_CODE_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::bad_request("missing authorization code"))
}

pub async fn basic_login_handler(
    State(state): State<ApiState>,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let span = request_span!(Method::GET, StrategyKind::Basic.login_path(), strategy = "basic");
    async move {
        let Some(credentials) = headers.typed_get::<Authorization<Basic>>() else {
            return Ok(basic_challenge());
        };
        let request = LoginRequest::password("", credentials.username(), credentials.password());
        complete_login(&state, StrategyKind::Basic, request, params.d.is_some()).await
    }
    .instrument(span)
    .await
}

pub async fn ldap_login_handler(
    State(state): State<ApiState>,
    Query(params): Query<LoginParams>,
    body: Result<Json<PasswordBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let span = request_span!(Method::POST, StrategyKind::Ldap.login_path(), strategy = "ldap");
    async move {
        let name = params.required_name()?;
        let Json(body) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
        let request = LoginRequest::password(name, body.username, body.password);
        complete_login(&state, StrategyKind::Ldap, request, false).await
    }
    .instrument(span)
    .await
}

async fn code_login(
    state: ApiState,
    kind: StrategyKind,
    params: LoginParams,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let span = request_span!(Method::GET, kind.login_path(), strategy = %kind);
    async move {
        let name = params.required_name()?;
        let code = auth_code(&headers)?;
        complete_login(&state, kind, LoginRequest::auth_code(name, code), false).await
    }
    .instrument(span)
    .await
}

pub async fn oauth_login_handler(
    State(state): State<ApiState>,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    code_login(state, StrategyKind::OAuth, params, headers).await
}

pub async fn github_login_handler(
    State(state): State<ApiState>,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    code_login(state, StrategyKind::Github, params, headers).await
}

pub async fn oidc_login_handler(
    State(state): State<ApiState>,
    Query(params): Query<LoginParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    code_login(state, StrategyKind::Oidc, params, headers).await
}

pub async fn strategies_handler(State(state): State<ApiState>) -> Response {
    let span = request_span!(Method::GET, "/strategies");
    let entries = list_strategies(&state.context).instrument(span).await;
    Json(entries).into_response()
}

pub async fn info_handler(
    State(state): State<ApiState>,
    Query(params): Query<LoginParams>,
) -> Result<Response, ApiError> {
    let span = request_span!(Method::GET, "/info");
    async move {
        let username = params.required_name()?;
        Span::current().record("username", username);
        let auth_info = state.generator.store().get(username).await.map_err(|err| {
            warn!(error = %err, "Unable to read AuthInfo");
            ApiError::internal(err.to_string())
        })?;
        Ok(Envelope::data(auth_info).into_response())
    }
    .instrument(span)
    .await
}

pub async fn health_handler(State(state): State<ApiState>) -> Response {
    let body = HealthBody { name: state.service_name.clone(), version: env!("CARGO_PKG_VERSION") };
    let status = if state.health.is_healthy() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status, Json(body)).into_response()
}
