//! Success envelopes.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::identity::UserInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub username: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    #[serde(rename = "avatarURL")]
    pub avatar_url: String,
}

impl From<&UserInfo> for UserSummary {
    fn from(user: &UserInfo) -> Self {
        Self {
            username: user.username.clone(),
            display_name: user.display_name().unwrap_or_default().to_string(),
            avatar_url: user.avatar_url().unwrap_or_default().to_string(),
        }
    }
}

/// `{accessToken?, user?, groups?, data}`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Self {
        Self { access_token: None, user: None, groups: None, data }
    }

    pub fn for_user(user: &UserInfo, access_token: Option<String>, data: T) -> Self {
        Self {
            access_token,
            user: Some(UserSummary::from(user)),
            groups: (!user.groups.is_empty()).then(|| user.groups.clone()),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Kubeconfig served as a file download
pub fn attachment(username: &str, body: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename={}.json", username)),
        ],
        body,
    )
        .into_response()
}
