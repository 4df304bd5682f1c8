use std::collections::HashMap;

use url::Url;

/// How a [`UserCredential`](crate::auth::UserCredential) was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationType {
    SignIn,
    SignUp,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::SignIn => "signIn",
            OperationType::SignUp => "signUp",
        }
    }
}

/// Where out-of-band links send the user and whether the app completes them itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionCodeSettings {
    pub url: String,
    pub handle_code_in_app: bool,
    pub ios: Option<IosSettings>,
    pub android: Option<AndroidSettings>,
    pub dynamic_link_domain: Option<String>,
    pub link_domain: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IosSettings {
    pub bundle_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AndroidSettings {
    pub package_name: String,
    pub install_app: Option<bool>,
    pub minimum_version: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionCodeOperation {
    PasswordReset,
    RecoverEmail,
    EmailSignIn,
    VerifyAndChangeEmail,
    VerifyEmail,
}

impl ActionCodeOperation {
    /// `requestType` value for `accounts:sendOobCode`.
    pub fn as_request_type(&self) -> &'static str {
        match self {
            ActionCodeOperation::PasswordReset => "PASSWORD_RESET",
            ActionCodeOperation::RecoverEmail => "RECOVER_EMAIL",
            ActionCodeOperation::EmailSignIn => "EMAIL_SIGNIN",
            ActionCodeOperation::VerifyAndChangeEmail => "VERIFY_AND_CHANGE_EMAIL",
            ActionCodeOperation::VerifyEmail => "VERIFY_EMAIL",
        }
    }

    /// Parses the `mode` query parameter of an action link.
    pub fn from_mode(value: &str) -> Option<Self> {
        match value {
            "recoverEmail" => Some(ActionCodeOperation::RecoverEmail),
            "resetPassword" => Some(ActionCodeOperation::PasswordReset),
            "signIn" => Some(ActionCodeOperation::EmailSignIn),
            "verifyEmail" => Some(ActionCodeOperation::VerifyEmail),
            "verifyAndChangeEmail" => Some(ActionCodeOperation::VerifyAndChangeEmail),
            _ => None,
        }
    }
}

/// Parsed out-of-band action link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActionCodeUrl {
    pub api_key: String,
    pub code: String,
    pub continue_url: Option<String>,
    pub language_code: Option<String>,
    pub tenant_id: Option<String>,
    pub operation: ActionCodeOperation,
}

impl ActionCodeUrl {
    /// Returns `None` unless the link carries `apiKey`, `oobCode` and a known `mode`.
    ///
    /// Links wrapped by dynamic-link redirectors (`link=` or `deep_link_id=`) are unwrapped first.
    pub fn parse(link: &str) -> Option<Self> {
        let resolved = unwrap_action_link(link, 0)?;
        let parsed = Url::parse(&resolved).ok()?;
        let query: HashMap<String, String> = parsed.query_pairs().into_owned().collect();

        let operation = query.get("mode").and_then(|mode| ActionCodeOperation::from_mode(mode))?;
        Some(Self {
            api_key: query.get("apiKey")?.clone(),
            code: query.get("oobCode")?.clone(),
            continue_url: query.get("continueUrl").cloned(),
            language_code: query
                .get("lang")
                .or_else(|| query.get("languageCode"))
                .cloned(),
            tenant_id: query.get("tenantId").cloned(),
            operation,
        })
    }
}

const MAX_LINK_NESTING: usize = 4;

fn unwrap_action_link(link: &str, depth: usize) -> Option<String> {
    let parsed = Url::parse(link).ok()?;
    if depth >= MAX_LINK_NESTING {
        return Some(link.to_string());
    }
    let inner = parsed
        .query_pairs()
        .find(|(key, _)| key == "link" || key == "deep_link_id")
        .map(|(_, value)| value.into_owned());
    match inner {
        Some(inner) => unwrap_action_link(&inner, depth + 1).or(Some(inner)),
        None => Some(link.to_string()),
    }
}
