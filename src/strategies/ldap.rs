//! LDAP login: service bind, single-entry search, user re-bind.
//!
//! The directory is reached through [`Directory`] so the protocol can be
//! exercised without a server; [`LdapDirectory`] is the `ldap3` backed one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use ldap3::{ldap_escape, LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use tracing::{debug, instrument, warn};

use super::{LoginError, LoginRequest, LoginStrategy, StrategyContext, StrategyKind, WithStatus};
use crate::errors::{Error, Result};
use crate::identity::{UserInfo, EXT_AVATAR_URL, EXT_EMAIL, EXT_NAME};
use crate::resolvers::LdapConfigSpec;

/// Attributes requested for the matched entry
pub const SEARCH_ATTRIBUTES: [&str; 6] = ["uid", "cn", "mail", "memberof", "ou", "o"];

/// Search filter for `username`; the value is filter-escaped
pub fn search_filter(username: &str) -> String {
    let value = ldap_escape(username);
    format!("(|(cn={v})(uid={v})(userPrincipalName={v})(mail={v}))", v = value)
}

/// One search result
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    pub attrs: HashMap<String, Vec<String>>,
}

impl DirectoryEntry {
    pub fn first(&self, attr: &str) -> &str {
        self.attrs.get(attr).and_then(|v| v.first()).map(String::as_str).unwrap_or_default()
    }

    pub fn all(&self, attr: &str) -> Vec<String> {
        self.attrs.get(attr).cloned().unwrap_or_default()
    }
}

/// Connection parameters for one login
#[derive(Debug, Clone)]
pub struct DirectorySettings {
    pub dial_url: String,
    pub start_tls: bool,
}

/// An open directory connection
#[async_trait]
pub trait DirectorySession: Send {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()>;

    async fn search(&mut self, base_dn: &str, filter: &str, attrs: &[&str]) -> Result<Vec<DirectoryEntry>>;

    async fn close(&mut self);
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn connect(&self, settings: &DirectorySettings) -> Result<Box<dyn DirectorySession>>;
}

/// Directory access over `ldap3`
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapDirectory;

struct Ldap3Session {
    ldap: ldap3::Ldap,
}

#[async_trait]
impl Directory for LdapDirectory {
    async fn connect(&self, settings: &DirectorySettings) -> Result<Box<dyn DirectorySession>> {
        // Directory servers commonly present certificates from private CAs
        let conn_settings = LdapConnSettings::new().set_starttls(settings.start_tls).set_no_tls_verify(true);

        let (conn, ldap) = LdapConnAsync::with_settings(conn_settings, &settings.dial_url).await.map_err(|e| {
            Error::provider_with_source(format!("unable to dial '{}'", settings.dial_url), Box::new(e))
        })?;
        ldap3::drive!(conn);

        Ok(Box::new(Ldap3Session { ldap }))
    }
}

#[async_trait]
impl DirectorySession for Ldap3Session {
    async fn bind(&mut self, dn: &str, password: &str) -> Result<()> {
        self.ldap
            .simple_bind(dn, password)
            .await
            .and_then(|res| res.success())
            .map(|_| ())
            .map_err(|e| Error::credential_mismatch(format!("LDAP bind failed: {}", e)))
    }

    async fn search(&mut self, base_dn: &str, filter: &str, attrs: &[&str]) -> Result<Vec<DirectoryEntry>> {
        let (entries, _) = self
            .ldap
            .search(base_dn, Scope::Subtree, filter, attrs.to_vec())
            .await
            .and_then(|res| res.success())
            .map_err(|e| Error::provider_with_source("LDAP search failed", Box::new(e)))?;

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(|entry| DirectoryEntry { dn: entry.dn, attrs: entry.attrs })
            .collect())
    }

    async fn close(&mut self) {
        if let Err(e) = self.ldap.unbind().await {
            debug!(error = %e, "LDAP unbind failed");
        }
    }
}

pub struct LdapStrategy {
    context: StrategyContext,
    directory: Arc<dyn Directory>,
}

impl LdapStrategy {
    pub fn new(context: StrategyContext, directory: Arc<dyn Directory>) -> Self {
        Self { context, directory }
    }

    async fn login(
        &self,
        config: &LdapConfigSpec,
        bind_secret: &str,
        username: &str,
        password: &str,
    ) -> Result<UserInfo> {
        let settings = DirectorySettings { dial_url: config.dial_url.clone(), start_tls: config.tls.unwrap_or(false) };
        let mut session = self.directory.connect(&settings).await?;

        let result = search_and_bind(session.as_mut(), config, bind_secret, username, password).await;
        session.close().await;

        result.map(|entry| entry_to_user(&entry))
    }
}

async fn search_and_bind(
    session: &mut dyn DirectorySession,
    config: &LdapConfigSpec,
    bind_secret: &str,
    username: &str,
    password: &str,
) -> Result<DirectoryEntry> {
    session.bind(config.bind_dn.as_deref().unwrap_or_default(), bind_secret).await?;

    let mut entries = session.search(&config.base_dn, &search_filter(username), &SEARCH_ATTRIBUTES).await?;
    let entry = match entries.len() {
        0 => return Err(Error::identity_not_found("user not found")),
        1 => entries.remove(0),
        n => return Err(Error::identity_ambiguous(format!("too many entries returned ({})", n))),
    };

    session.bind(&entry.dn, password).await?;
    Ok(entry)
}

fn entry_to_user(entry: &DirectoryEntry) -> UserInfo {
    let cn = entry.first("cn");
    let avatar = url::form_urlencoded::Serializer::new(String::new()).append_pair("name", cn).finish();

    UserInfo::new(entry.first("uid"), entry.all("ou"))
        .with_extension(EXT_NAME, cn)
        .with_extension(EXT_EMAIL, entry.first("mail"))
        .with_extension(
            EXT_AVATAR_URL,
            format!("https://ui-avatars.com/api/?{}&size=128&bold=true&background=random&rounded=true", avatar),
        )
}

#[async_trait]
impl LoginStrategy for LdapStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Ldap
    }

    #[instrument(skip(self, request), fields(strategy = "ldap", name = %request.name))]
    async fn authenticate(&self, request: &LoginRequest) -> std::result::Result<UserInfo, LoginError> {
        let (username, password) = request.password_pair()?;
        if username.is_empty() || password.is_empty() {
            return Err(Error::validation("username and password must be specified").into());
        }

        let config = self
            .context
            .resolver
            .get_ldap(&request.name)
            .await
            .map_err(|_| Error::configuration("unable to resolve LDAP configuration"))
            .with_status(StatusCode::EXPECTATION_FAILED)?;
        let bind_secret = self
            .context
            .optional_secret(config.spec.bind_secret.as_ref())
            .await
            .with_status(StatusCode::EXPECTATION_FAILED)?;

        self.login(&config.spec, &bind_secret, username, password).await.map_err(|e| {
            warn!(dial_url = %config.spec.dial_url, user = %username, error = %e, "Login with LDAP server failed");
            match e {
                Error::IdentityNotFound { .. } | Error::IdentityAmbiguous { .. } => LoginError::from(e),
                other => LoginError::new(StatusCode::FORBIDDEN, other),
            }
        })
    }
}
