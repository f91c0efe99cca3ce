//! Username/password login against `User` configuration objects.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::{LoginError, LoginRequest, LoginStrategy, StrategyContext, StrategyKind};
use crate::errors::{Error, Result};
use crate::identity::{UserInfo, EXT_AVATAR_URL, EXT_NAME};

pub struct BasicStrategy {
    context: StrategyContext,
}

impl BasicStrategy {
    pub fn new(context: StrategyContext) -> Self {
        Self { context }
    }

    async fn verify(&self, username: &str, password: &str) -> Result<UserInfo> {
        let user = self.context.resolver.get_user(username).await?;
        let password_ref = user
            .spec
            .password_ref
            .as_ref()
            .ok_or_else(|| Error::configuration(format!("user '{}' has no passwordRef", user.name)))?;

        let expected = self.context.secrets.get_value(password_ref).await?;
        if expected.as_bytes() != password.as_bytes() {
            return Err(Error::credential_mismatch("password mismatch"));
        }

        Ok(UserInfo::new(user.name, user.spec.groups)
            .with_extension(EXT_NAME, user.spec.display_name)
            .with_extension(EXT_AVATAR_URL, user.spec.avatar_url))
    }
}

#[async_trait]
impl LoginStrategy for BasicStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Basic
    }

    #[instrument(skip(self, request), fields(strategy = "basic"))]
    async fn authenticate(&self, request: &LoginRequest) -> std::result::Result<UserInfo, LoginError> {
        let (username, password) = request.password_pair()?;

        // Lookup, secret and comparison failures all look the same to the caller
        self.verify(username, password).await.map_err(|e| {
            debug!(username = %username, error = %e, "Basic authentication failed");
            LoginError::from(Error::credential_mismatch("invalid credentials"))
        })
    }
}
