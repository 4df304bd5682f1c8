use std::fmt;

use crate::app::AppError;

pub type AuthResult<T> = Result<T, AuthError>;

/// Stable error codes surfaced for identity toolkit failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthErrorCode {
    UserNotFound,
    WrongPassword,
    InvalidCredential,
    EmailAlreadyInUse,
    InvalidEmail,
    WeakPassword,
    MissingPassword,
    UserDisabled,
    TooManyRequests,
    OperationNotAllowed,
    InvalidActionCode,
    ExpiredActionCode,
    InvalidApiKey,
    UserTokenExpired,
    InternalError,
}

impl AuthErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorCode::UserNotFound => "auth/user-not-found",
            AuthErrorCode::WrongPassword => "auth/wrong-password",
            AuthErrorCode::InvalidCredential => "auth/invalid-credential",
            AuthErrorCode::EmailAlreadyInUse => "auth/email-already-in-use",
            AuthErrorCode::InvalidEmail => "auth/invalid-email",
            AuthErrorCode::WeakPassword => "auth/weak-password",
            AuthErrorCode::MissingPassword => "auth/missing-password",
            AuthErrorCode::UserDisabled => "auth/user-disabled",
            AuthErrorCode::TooManyRequests => "auth/too-many-requests",
            AuthErrorCode::OperationNotAllowed => "auth/operation-not-allowed",
            AuthErrorCode::InvalidActionCode => "auth/invalid-action-code",
            AuthErrorCode::ExpiredActionCode => "auth/expired-action-code",
            AuthErrorCode::InvalidApiKey => "auth/invalid-api-key",
            AuthErrorCode::UserTokenExpired => "auth/user-token-expired",
            AuthErrorCode::InternalError => "auth/internal-error",
        }
    }

    /// Maps the leading token of a server message (`EMAIL_NOT_FOUND : detail`).
    pub fn from_server_code(code: &str) -> Self {
        match code {
            "EMAIL_NOT_FOUND" => AuthErrorCode::UserNotFound,
            "INVALID_PASSWORD" => AuthErrorCode::WrongPassword,
            "INVALID_LOGIN_CREDENTIALS" | "INVALID_IDP_RESPONSE" => AuthErrorCode::InvalidCredential,
            "EMAIL_EXISTS" => AuthErrorCode::EmailAlreadyInUse,
            "INVALID_EMAIL" | "MISSING_EMAIL" => AuthErrorCode::InvalidEmail,
            "WEAK_PASSWORD" => AuthErrorCode::WeakPassword,
            "MISSING_PASSWORD" => AuthErrorCode::MissingPassword,
            "USER_DISABLED" => AuthErrorCode::UserDisabled,
            "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthErrorCode::TooManyRequests,
            "OPERATION_NOT_ALLOWED" | "PASSWORD_LOGIN_DISABLED" => AuthErrorCode::OperationNotAllowed,
            "INVALID_OOB_CODE" => AuthErrorCode::InvalidActionCode,
            "EXPIRED_OOB_CODE" => AuthErrorCode::ExpiredActionCode,
            "INVALID_API_KEY" | "API_KEY_INVALID" => AuthErrorCode::InvalidApiKey,
            "TOKEN_EXPIRED" | "USER_TOKEN_EXPIRED" => AuthErrorCode::UserTokenExpired,
            _ => AuthErrorCode::InternalError,
        }
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub enum AuthError {
    /// Rejected by the identity toolkit backend.
    Api {
        code: AuthErrorCode,
        message: String,
    },
    App(AppError),
    Network(String),
    InvalidArgument(String),
}

impl AuthError {
    pub fn api(code: AuthErrorCode, message: impl Into<String>) -> Self {
        AuthError::Api {
            code,
            message: message.into(),
        }
    }

    /// Builds an error from a backend message such as `WEAK_PASSWORD : Password should be at
    /// least 6 characters`.
    pub fn from_server_message(message: &str) -> Self {
        let (server_code, detail) = match message.split_once(" : ") {
            Some((code, detail)) => (code.trim(), detail.trim()),
            None => (message.trim(), ""),
        };
        let detail = if detail.is_empty() { server_code } else { detail };
        AuthError::api(AuthErrorCode::from_server_code(server_code), detail)
    }

    pub fn code(&self) -> Option<AuthErrorCode> {
        match self {
            AuthError::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            AuthError::Api { code, .. } => code.as_str(),
            AuthError::App(err) => err.code_str(),
            AuthError::Network(_) => "auth/network-request-failed",
            AuthError::InvalidArgument(_) => "auth/argument-error",
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::Api { code, message } => write!(f, "{message} ({code})"),
            AuthError::App(err) => write!(f, "{err}"),
            AuthError::Network(message) => write!(f, "Network error: {message}"),
            AuthError::InvalidArgument(message) => write!(f, "Invalid argument: {message}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AppError> for AuthError {
    fn from(error: AppError) -> Self {
        AuthError::App(error)
    }
}
