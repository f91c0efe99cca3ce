//! GitHub login. Groups are the organization teams the user belongs to,
//! unless a configured REST action overrides them.

use async_trait::async_trait;
use futures::future::try_join_all;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::token::CodeExchange;
use super::{LoginError, LoginRequest, LoginStrategy, StrategyContext, StrategyKind, WithStatus};
use crate::errors::{Error, Result};
use crate::identity::{dns1123, ProviderClaims, UserInfo, EXT_URL};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubUser {
    #[serde(default)]
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GithubTeam {
    #[serde(default)]
    pub name: String,
    pub slug: String,
}

/// Minimal GitHub REST client bound to one access token and organization
pub struct GithubClient<'a> {
    http: &'a reqwest::Client,
    api_url: String,
    organization: String,
    token: String,
}

impl<'a> GithubClient<'a> {
    pub fn new(http: &'a reqwest::Client, api_url: &str, organization: &str, token: &str) -> Self {
        Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            organization: organization.to_string(),
            token: token.to_string(),
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .get(format!("{}{}", self.api_url, path))
            .bearer_auth(&self.token)
            .header(http::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(http::header::USER_AGENT, "authn")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.get(path).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(Error::provider(format!("GET {} returned {}", path, status)));
        }
        Ok(response.json().await?)
    }

    pub async fn user(&self) -> Result<GithubUser> {
        self.get_json("/user").await
    }

    pub async fn teams(&self) -> Result<Vec<GithubTeam>> {
        self.get_json(&format!("/orgs/{}/teams", self.organization)).await
    }

    /// Any status other than 200 means "not a member"; transport errors fail
    pub async fn is_member(&self, team: &GithubTeam, login: &str) -> Result<bool> {
        let path = format!("/orgs/{}/teams/{}/memberships/{}", self.organization, team.slug, login);
        let response = self.get(&path).send().await?;
        Ok(response.status() == reqwest::StatusCode::OK)
    }

    /// Slugs of the teams `login` belongs to, in team-list order
    pub async fn member_teams(&self, login: &str) -> Result<Vec<String>> {
        let teams = self.teams().await?;
        let memberships = try_join_all(teams.iter().map(|team| self.is_member(team, login))).await?;

        Ok(teams
            .into_iter()
            .zip(memberships)
            .filter_map(|(team, member)| member.then_some(team.slug))
            .collect())
    }
}

pub struct GithubStrategy {
    context: StrategyContext,
}

impl GithubStrategy {
    pub fn new(context: StrategyContext) -> Self {
        Self { context }
    }
}

#[async_trait]
impl LoginStrategy for GithubStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Github
    }

    #[instrument(skip(self, request), fields(strategy = "github", name = %request.name))]
    async fn authenticate(&self, request: &LoginRequest) -> std::result::Result<UserInfo, LoginError> {
        let code = request.code()?;

        let config = self
            .context
            .resolver
            .get_github(&request.name)
            .await
            .map_err(|_| Error::configuration("unable to resolve Github configuration"))
            .with_status(StatusCode::EXPECTATION_FAILED)?;
        let spec = &config.spec;
        let client_secret = self
            .context
            .optional_secret(spec.oauth2.client_secret_ref.as_ref())
            .await
            .with_status(StatusCode::EXPECTATION_FAILED)?;

        let token = CodeExchange {
            token_url: &spec.oauth2.token_url,
            client_id: &spec.oauth2.client_id,
            client_secret: &client_secret,
            redirect_uri: &spec.oauth2.redirect_url,
        }
        .exchange(&self.context.http, code)
        .await
        .with_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        let access_token = token.access_token().with_status(StatusCode::INTERNAL_SERVER_ERROR)?;

        let api_url = spec.api_url.as_deref().filter(|u| !u.is_empty()).unwrap_or(DEFAULT_API_URL);
        let client = GithubClient::new(&self.context.http, api_url, &spec.organization, access_token);

        let profile = client.user().await.with_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        let groups = client.member_teams(&profile.login).await.with_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        debug!(login = %profile.login, teams = groups.len(), "Team memberships resolved");

        let mut claims = ProviderClaims {
            preferred_username: Some(profile.login),
            name: profile.name,
            email: profile.email,
            avatar_url: profile.avatar_url,
            groups,
            extra: profile.url.into_iter().map(|url| (EXT_URL.to_string(), url)).collect(),
        };

        if let Some(reference) = spec.rest_action_ref.as_ref() {
            if !token.is_bearer() {
                return Err(LoginError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Error::provider(format!("github token is not type bearer: {}", token.token_type)),
                ));
            }
            self.context
                .apply_rest_action(reference, access_token, &mut claims)
                .await
                .with_status(StatusCode::INTERNAL_SERVER_ERROR)?;
        }

        claims.preferred_username = claims.preferred_username.as_deref().map(dns1123);
        let user = claims
            .normalize()
            .ok_or_else(|| Error::provider("github user has no login"))
            .with_status(StatusCode::INTERNAL_SERVER_ERROR)?;

        info!(user = %user.username, groups = ?user.groups, "User info successfully fetched");
        Ok(user)
    }
}
