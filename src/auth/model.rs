use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::token_manager::{TokenManager, TokenUpdate};
use crate::auth::types::OperationType;

pub const EMAIL_PASSWORD_PROVIDER_ID: &str = "password";
pub const EMAIL_LINK_SIGN_IN_METHOD: &str = "emailLink";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserInfo {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub provider_id: String,
}

/// A signed-in account together with its tokens.
#[derive(Clone, Debug)]
pub struct User {
    info: UserInfo,
    email_verified: bool,
    token_manager: TokenManager,
}

impl User {
    pub fn new(info: UserInfo) -> Self {
        Self {
            info,
            email_verified: false,
            token_manager: TokenManager::default(),
        }
    }

    pub(crate) fn from_sign_in(response: &SignInResponse) -> AuthResult<Self> {
        let mut user = User::new(UserInfo {
            uid: response.local_id.clone(),
            display_name: response.display_name.clone(),
            email: response.email.clone(),
            provider_id: EMAIL_PASSWORD_PROVIDER_ID.to_string(),
        });
        user.email_verified = response.email_verified.unwrap_or(false);
        let expires_in = response.expires_in.as_deref().map(parse_expires_in).transpose()?;
        user.update_tokens(
            Some(response.id_token.clone()),
            response.refresh_token.clone(),
            expires_in,
        );
        Ok(user)
    }

    pub fn uid(&self) -> &str {
        &self.info.uid
    }

    pub fn email(&self) -> Option<&str> {
        self.info.email.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.info.display_name.as_deref()
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn info(&self) -> &UserInfo {
        &self.info
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.token_manager.refresh_token()
    }

    pub fn token_manager(&self) -> &TokenManager {
        &self.token_manager
    }

    pub fn update_tokens(&self, id_token: Option<String>, refresh_token: Option<String>, expires_in: Option<Duration>) {
        self.token_manager
            .update(TokenUpdate::new(id_token, refresh_token, expires_in));
    }
}

#[derive(Clone, Debug)]
pub struct UserCredential {
    pub user: Arc<User>,
    pub provider_id: Option<String>,
    pub operation_type: OperationType,
    pub is_new_user: bool,
}

fn parse_expires_in(value: &str) -> AuthResult<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_secs)
        .map_err(|err| AuthError::InvalidArgument(format!("Invalid expiresIn value '{value}': {err}")))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInWithPasswordRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignUpRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub return_secure_token: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInWithEmailLinkRequest<'a> {
    pub email: &'a str,
    pub oob_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<&'a str>,
}

/// Shared shape of the sign-in and sign-up responses.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SignInResponse {
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    pub id_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<String>,
    #[serde(default)]
    pub email_verified: Option<bool>,
    #[serde(default)]
    pub is_new_user: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SendOobCodeRequest<'a> {
    pub request_type: &'a str,
    pub email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continue_url: Option<&'a str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub can_handle_code_in_app: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_link_domain: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_domain: Option<&'a str>,
    #[serde(rename = "iOSBundleId", skip_serializing_if = "Option::is_none")]
    pub ios_bundle_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_package_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_install_app: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_minimum_version_code: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResetPasswordRequest<'a> {
    pub oob_code: &'a str,
    pub new_password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorResponse {
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: Option<String>,
}
