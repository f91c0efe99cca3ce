//! Generic OAuth2 login. The provider only hands out a token; the identity
//! itself comes from the configured REST action.

use async_trait::async_trait;
use http::StatusCode;
use tracing::{debug, info, instrument};

use super::token::CodeExchange;
use super::{LoginError, LoginRequest, LoginStrategy, StrategyContext, StrategyKind, WithStatus};
use crate::errors::Error;
use crate::identity::{dns1123, ProviderClaims, UserInfo};

pub struct OAuthStrategy {
    context: StrategyContext,
}

impl OAuthStrategy {
    pub fn new(context: StrategyContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl LoginStrategy for OAuthStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::OAuth
    }

    #[instrument(skip(self, request), fields(strategy = "oauth", name = %request.name))]
    async fn authenticate(&self, request: &LoginRequest) -> Result<UserInfo, LoginError> {
        let code = request.code()?;

        let config = self
            .context
            .resolver
            .get_oauth(&request.name)
            .await
            .map_err(|_| Error::configuration("unable to resolve OAuth configuration"))
            .with_status(StatusCode::EXPECTATION_FAILED)?;
        let spec = &config.spec.oauth2;
        let client_secret = self
            .context
            .optional_secret(spec.client_secret_ref.as_ref())
            .await
            .with_status(StatusCode::EXPECTATION_FAILED)?;

        let token = CodeExchange {
            token_url: &spec.token_url,
            client_id: &spec.client_id,
            client_secret: &client_secret,
            redirect_uri: &spec.redirect_url,
        }
        .exchange(&self.context.http, code)
        .await
        .with_status(StatusCode::EXPECTATION_FAILED)?;
        let access_token = token.access_token().with_status(StatusCode::EXPECTATION_FAILED)?;

        let mut claims = ProviderClaims::default();
        if let Some(reference) = config.spec.rest_action_ref.as_ref() {
            if !token.is_bearer() {
                return Err(LoginError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Error::provider(format!("oauth2 token is not type bearer: {}", token.token_type)),
                ));
            }
            self.context
                .apply_rest_action(reference, access_token, &mut claims)
                .await
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        } else {
            debug!("No REST action configured");
        }

        claims.preferred_username = claims.preferred_username.as_deref().map(dns1123);
        let user = claims
            .normalize()
            .ok_or_else(|| Error::provider("unable to determine a username for the login"))
            .with_status(StatusCode::EXPECTATION_FAILED)?;

        info!(user = %user.username, groups = ?user.groups, "User info successfully fetched");
        Ok(user)
    }
}
