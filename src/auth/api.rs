use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Client;

mod account;

use crate::app::{get_app, AppService, FirebaseApp};
use crate::auth::error::{AuthError, AuthErrorCode, AuthResult};
use crate::auth::logger::LOGGER;
use crate::auth::model::{
    ResetPasswordRequest, SendOobCodeRequest, SignInResponse, SignInWithEmailLinkRequest, SignInWithPasswordRequest,
    SignUpRequest, User, UserCredential, EMAIL_PASSWORD_PROVIDER_ID,
};
use crate::auth::token_manager::TOKEN_EXPIRY_TOLERANCE;
use crate::auth::types::{ActionCodeOperation, ActionCodeSettings, ActionCodeUrl, OperationType};
use crate::platform::environment::{default_emulator_host, split_host_and_port};
use crate::util::{ObserverList, Subscription};

/// Registry name under which an app's [`Auth`] instance is cached.
pub const AUTH_COMPONENT_NAME: &str = "auth";

pub const DEFAULT_IDENTITY_TOOLKIT_ENDPOINT: &str = "https://identitytoolkit.googleapis.com/v1";

pub struct Auth {
    app: FirebaseApp,
    api_key: String,
    endpoint: Mutex<String>,
    rest_client: Client,
    current_user: Mutex<Option<Arc<User>>>,
    listeners: ObserverList<Option<Arc<User>>>,
}

impl Auth {
    /// Builds an instance for `app`, which must carry an API key.
    pub fn new(app: FirebaseApp) -> AuthResult<Self> {
        let api_key = app
            .options()
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| AuthError::api(AuthErrorCode::InvalidApiKey, "Missing API key"))?;

        Ok(Self {
            app,
            api_key,
            endpoint: Mutex::new(DEFAULT_IDENTITY_TOOLKIT_ENDPOINT.to_string()),
            rest_client: Client::new(),
            current_user: Mutex::new(None),
            listeners: ObserverList::new(),
        })
    }

    pub fn app(&self) -> &FirebaseApp {
        &self.app
    }

    fn endpoint(&self) -> String {
        self.endpoint
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .clone()
    }

    fn user_slot(&self) -> MutexGuard<'_, Option<Arc<User>>> {
        self.current_user
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Overrides the identity toolkit base URL (`.../v1`).
    pub fn set_identity_toolkit_endpoint(&self, endpoint: impl Into<String>) {
        *self.endpoint.lock().unwrap_or_else(|poison| poison.into_inner()) = endpoint.into();
    }

    /// Routes identity toolkit calls to a local auth emulator.
    pub fn connect_auth_emulator(&self, host: &str, port: u16) -> AuthResult<()> {
        if host.trim().is_empty() {
            return Err(AuthError::InvalidArgument("Emulator host must not be empty".into()));
        }
        let authority = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        self.set_identity_toolkit_endpoint(format!("http://{authority}/identitytoolkit.googleapis.com/v1"));
        LOGGER.info(format!("Using the auth emulator at http://{authority}"));
        Ok(())
    }

    pub fn current_user(&self) -> Option<Arc<User>> {
        self.user_slot().clone()
    }

    pub fn sign_out(&self) {
        let previous = self.user_slot().take();
        if previous.is_some() {
            self.listeners.notify(&None);
        }
    }

    /// Calls `observer` with the current user now and after every sign-in or sign-out.
    pub fn on_auth_state_changed<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&Option<Arc<User>>) + Send + Sync + 'static,
    {
        observer(&self.current_user());
        self.listeners.subscribe(observer)
    }

    pub async fn sign_in_with_email_and_password(&self, email: &str, password: &str) -> AuthResult<UserCredential> {
        self.app.check_destroyed()?;
        let request = SignInWithPasswordRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response =
            account::sign_in_with_password(&self.rest_client, &self.endpoint(), &self.api_key, &request).await?;
        self.complete_sign_in(&response, OperationType::SignIn, false)
    }

    pub async fn create_user_with_email_and_password(&self, email: &str, password: &str) -> AuthResult<UserCredential> {
        self.app.check_destroyed()?;
        let request = SignUpRequest {
            email,
            password,
            return_secure_token: true,
        };
        let response = account::sign_up(&self.rest_client, &self.endpoint(), &self.api_key, &request).await?;
        self.complete_sign_in(&response, OperationType::SignUp, true)
    }

    pub async fn send_password_reset_email(&self, email: &str) -> AuthResult<()> {
        self.send_oob_code(ActionCodeOperation::PasswordReset, email, None)
            .await
    }

    /// Completes a password reset started by [`send_password_reset_email`](Self::send_password_reset_email).
    pub async fn confirm_password_reset(&self, oob_code: &str, new_password: &str) -> AuthResult<()> {
        self.app.check_destroyed()?;
        let request = ResetPasswordRequest {
            oob_code,
            new_password,
        };
        account::reset_password(&self.rest_client, &self.endpoint(), &self.api_key, &request).await
    }

    /// Emails a sign-in link. `settings.handle_code_in_app` must be set since the link is
    /// completed by [`sign_in_with_email_link`](Self::sign_in_with_email_link).
    pub async fn send_sign_in_link_to_email(&self, email: &str, settings: &ActionCodeSettings) -> AuthResult<()> {
        if !settings.handle_code_in_app {
            return Err(AuthError::InvalidArgument(
                "handle_code_in_app must be true when sending sign in links".into(),
            ));
        }
        self.send_oob_code(ActionCodeOperation::EmailSignIn, email, Some(settings))
            .await
    }

    pub fn is_sign_in_with_email_link(&self, link: &str) -> bool {
        ActionCodeUrl::parse(link).is_some_and(|parsed| parsed.operation == ActionCodeOperation::EmailSignIn)
    }

    pub async fn sign_in_with_email_link(&self, email: &str, link: &str) -> AuthResult<UserCredential> {
        self.app.check_destroyed()?;
        let parsed = ActionCodeUrl::parse(link)
            .filter(|parsed| parsed.operation == ActionCodeOperation::EmailSignIn)
            .ok_or_else(|| AuthError::api(AuthErrorCode::InvalidActionCode, "Link is not an email sign in link"))?;

        let request = SignInWithEmailLinkRequest {
            email,
            oob_code: &parsed.code,
            tenant_id: parsed.tenant_id.as_deref(),
        };
        let response =
            account::sign_in_with_email_link(&self.rest_client, &self.endpoint(), &self.api_key, &request).await?;
        let is_new_user = response.is_new_user.unwrap_or(false);
        self.complete_sign_in(&response, OperationType::SignIn, is_new_user)
    }

    /// ID token of the current user; `Ok(None)` when signed out.
    ///
    /// Tokens are never refreshed here, so an expired token (or `force_refresh`) yields
    /// `auth/user-token-expired` and the caller signs in again.
    pub async fn get_token(&self, force_refresh: bool) -> AuthResult<Option<String>> {
        let Some(user) = self.current_user() else {
            return Ok(None);
        };
        let tokens = user.token_manager();
        if force_refresh || tokens.is_expired(TOKEN_EXPIRY_TOLERANCE) {
            return Err(AuthError::api(
                AuthErrorCode::UserTokenExpired,
                "The user's credential is no longer valid. The user must sign in again.",
            ));
        }
        Ok(tokens.id_token())
    }

    async fn send_oob_code(
        &self,
        operation: ActionCodeOperation,
        email: &str,
        settings: Option<&ActionCodeSettings>,
    ) -> AuthResult<()> {
        self.app.check_destroyed()?;
        let android = settings.and_then(|settings| settings.android.as_ref());
        let request = SendOobCodeRequest {
            request_type: operation.as_request_type(),
            email,
            continue_url: settings
                .map(|settings| settings.url.as_str())
                .filter(|url| !url.is_empty()),
            can_handle_code_in_app: settings.is_some_and(|settings| settings.handle_code_in_app),
            dynamic_link_domain: settings.and_then(|settings| settings.dynamic_link_domain.as_deref()),
            link_domain: settings.and_then(|settings| settings.link_domain.as_deref()),
            ios_bundle_id: settings
                .and_then(|settings| settings.ios.as_ref())
                .map(|ios| ios.bundle_id.as_str()),
            android_package_name: android.map(|android| android.package_name.as_str()),
            android_install_app: android.and_then(|android| android.install_app),
            android_minimum_version_code: android.and_then(|android| android.minimum_version.as_deref()),
        };
        account::send_oob_code(&self.rest_client, &self.endpoint(), &self.api_key, &request).await
    }

    fn complete_sign_in(
        &self,
        response: &SignInResponse,
        operation_type: OperationType,
        is_new_user: bool,
    ) -> AuthResult<UserCredential> {
        let user = Arc::new(User::from_sign_in(response)?);
        *self.user_slot() = Some(user.clone());
        LOGGER.debug(format!("Signed in user {}", user.uid()));
        self.listeners.notify(&Some(user.clone()));

        Ok(UserCredential {
            user,
            provider_id: Some(EMAIL_PASSWORD_PROVIDER_ID.to_string()),
            operation_type,
            is_new_user,
        })
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("app", &self.app.name())
            .field("endpoint", &self.endpoint())
            .finish()
    }
}

impl AppService for Auth {
    fn on_app_deleted(&self) {
        self.user_slot().take();
        self.listeners.clear();
    }
}

/// Returns the cached [`Auth`] for `app` (the default app when `None`).
///
/// A fresh instance talks to the emulator named by `FIREBASE_AUTH_EMULATOR_HOST`, if set.
pub fn auth_for_app(app: Option<FirebaseApp>) -> AuthResult<Arc<Auth>> {
    let app = match app {
        Some(app) => app,
        None => get_app(None)?,
    };
    app.check_destroyed()?;

    app.services().get_or_try_init(AUTH_COMPONENT_NAME, None, || {
        let auth = Auth::new(app.clone())?;
        if let Some(emulator) = default_emulator_host("auth") {
            match split_host_and_port(&emulator) {
                Some((host, port)) => auth.connect_auth_emulator(&host, port)?,
                None => LOGGER.warn(format!("Ignoring malformed auth emulator host '{emulator}'")),
            }
        }
        Ok(auth)
    })
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;
    use crate::app::delete_app;
    use crate::auth::types::AndroidSettings;
    use crate::test_support::test_app;
    use httpmock::prelude::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEST_API_KEY: &str = "test-api-key";
    const SIGN_IN_LINK: &str =
        "https://example.firebaseapp.com/__/auth/action?apiKey=test-api-key&mode=signIn&oobCode=link-code";

    fn auth_with_server(prefix: &str, server: &MockServer) -> Arc<Auth> {
        let auth = auth_for_app(Some(test_app(prefix, None))).unwrap();
        auth.connect_auth_emulator(&server.host(), server.port())
            .unwrap();
        auth
    }

    fn toolkit_path(method: &str) -> String {
        format!("/identitytoolkit.googleapis.com/v1/accounts:{method}")
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sign_in_with_password_sets_current_user() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(toolkit_path("signInWithPassword"))
                    .query_param("key", TEST_API_KEY)
                    .json_body(json!({
                        "email": "user@example.com",
                        "password": "secret",
                        "returnSecureToken": true
                    }));
                then.status(200).json_body(json!({
                    "localId": "uid-123",
                    "email": "user@example.com",
                    "idToken": "id-token",
                    "refreshToken": "refresh-token",
                    "expiresIn": "3600"
                }));
            })
            .await;

        let auth = auth_with_server("auth-sign-in", &server);
        let credential = auth
            .sign_in_with_email_and_password("user@example.com", "secret")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(credential.user.uid(), "uid-123");
        assert_eq!(credential.operation_type, OperationType::SignIn);
        assert!(!credential.is_new_user);
        assert_eq!(auth.current_user().unwrap().uid(), "uid-123");
        assert_eq!(auth.get_token(false).await.unwrap().as_deref(), Some("id-token"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sign_up_marks_new_user() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path(toolkit_path("signUp"));
                then.status(200).json_body(json!({
                    "localId": "uid-new",
                    "email": "new@example.com",
                    "idToken": "id-token",
                    "refreshToken": "refresh-token",
                    "expiresIn": "3600"
                }));
            })
            .await;

        let auth = auth_with_server("auth-sign-up", &server);
        let credential = auth
            .create_user_with_email_and_password("new@example.com", "secret")
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(credential.operation_type, OperationType::SignUp);
        assert!(credential.is_new_user);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn server_errors_map_to_auth_codes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(toolkit_path("signInWithPassword"));
                then.status(400)
                    .json_body(json!({"error": {"code": 400, "message": "INVALID_PASSWORD"}}));
            })
            .await;

        let auth = auth_with_server("auth-errors", &server);
        let err = auth
            .sign_in_with_email_and_password("user@example.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "auth/wrong-password");
        assert!(auth.current_user().is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn password_reset_round_trip() {
        let server = MockServer::start_async().await;
        let send = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(toolkit_path("sendOobCode"))
                    .json_body(json!({"requestType": "PASSWORD_RESET", "email": "user@example.com"}));
                then.status(200).json_body(json!({"email": "user@example.com"}));
            })
            .await;
        let confirm = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(toolkit_path("resetPassword"))
                    .json_body(json!({"oobCode": "reset-code", "newPassword": "new-secret"}));
                then.status(200).json_body(json!({"email": "user@example.com"}));
            })
            .await;

        let auth = auth_with_server("auth-reset", &server);
        auth.send_password_reset_email("user@example.com")
            .await
            .unwrap();
        auth.confirm_password_reset("reset-code", "new-secret")
            .await
            .unwrap();

        send.assert_async().await;
        confirm.assert_async().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn email_link_flow() {
        let server = MockServer::start_async().await;
        let send = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(toolkit_path("sendOobCode"))
                    .json_body(json!({
                        "requestType": "EMAIL_SIGNIN",
                        "email": "user@example.com",
                        "continueUrl": "https://example.com/finish",
                        "canHandleCodeInApp": true,
                        "androidPackageName": "com.example.app",
                        "androidInstallApp": true
                    }));
                then.status(200).json_body(json!({"email": "user@example.com"}));
            })
            .await;
        let sign_in = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path(toolkit_path("signInWithEmailLink"))
                    .json_body(json!({"email": "user@example.com", "oobCode": "link-code"}));
                then.status(200).json_body(json!({
                    "localId": "uid-link",
                    "email": "user@example.com",
                    "idToken": "id-token",
                    "refreshToken": "refresh-token",
                    "expiresIn": "3600",
                    "isNewUser": true
                }));
            })
            .await;

        let auth = auth_with_server("auth-link", &server);
        let settings = ActionCodeSettings {
            url: "https://example.com/finish".into(),
            handle_code_in_app: true,
            android: Some(AndroidSettings {
                package_name: "com.example.app".into(),
                install_app: Some(true),
                minimum_version: None,
            }),
            ..Default::default()
        };
        auth.send_sign_in_link_to_email("user@example.com", &settings)
            .await
            .unwrap();

        assert!(auth.is_sign_in_with_email_link(SIGN_IN_LINK));
        let credential = auth
            .sign_in_with_email_link("user@example.com", SIGN_IN_LINK)
            .await
            .unwrap();
        assert!(credential.is_new_user);

        send.assert_async().await;
        sign_in.assert_async().await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn sign_in_link_requires_in_app_handling() {
        let auth = auth_for_app(Some(test_app("auth-link-settings", None))).unwrap();
        let err = auth
            .send_sign_in_link_to_email("user@example.com", &ActionCodeSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "auth/argument-error");

        assert!(!auth.is_sign_in_with_email_link("https://example.com/?mode=resetPassword&apiKey=k&oobCode=c"));
        let err = auth
            .sign_in_with_email_link("user@example.com", "https://example.com/")
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "auth/invalid-action-code");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn observers_see_sign_in_and_sign_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(toolkit_path("signInWithPassword"));
                then.status(200).json_body(json!({
                    "localId": "uid-obs",
                    "idToken": "id-token",
                    "expiresIn": "3600"
                }));
            })
            .await;

        let auth = auth_with_server("auth-observers", &server);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let subscription = auth.on_auth_state_changed(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        auth.sign_in_with_email_and_password("user@example.com", "secret")
            .await
            .unwrap();
        auth.sign_out();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(auth.get_token(false).await.unwrap(), None);

        subscription.unsubscribe();
        auth.sign_out();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn forced_refresh_reports_expired_token() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path(toolkit_path("signInWithPassword"));
                then.status(200)
                    .json_body(json!({"localId": "uid", "idToken": "id-token", "expiresIn": "3600"}));
            })
            .await;

        let auth = auth_with_server("auth-refresh", &server);
        auth.sign_in_with_email_and_password("user@example.com", "secret")
            .await
            .unwrap();
        let err = auth.get_token(true).await.unwrap_err();
        assert_eq!(err.code_str(), "auth/user-token-expired");
    }

    #[test]
    fn instances_are_cached_and_cleared_on_delete() {
        let app = test_app("auth-cache", None);
        let first = auth_for_app(Some(app.clone())).unwrap();
        let second = auth_for_app(Some(app.clone())).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        delete_app(&app).unwrap();
        assert_eq!(
            auth_for_app(Some(app)).unwrap_err().code_str(),
            "app/app-deleted"
        );
    }

    #[test]
    fn debug_output_names_app_and_endpoint() {
        let app = test_app("auth-debug", None);
        let auth = auth_for_app(Some(app.clone())).unwrap();
        auth.connect_auth_emulator("localhost", 9099).unwrap();

        let rendered = format!("{auth:?}");
        assert!(rendered.starts_with("Auth {"));
        assert!(rendered.contains(app.name()));
        assert!(rendered.contains("http://localhost:9099/identitytoolkit.googleapis.com/v1"));
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let app = FirebaseApp::new(
            Default::default(),
            crate::app::FirebaseAppConfig::new(crate::test_support::unique_app_name("auth-no-key"), false),
        );
        assert_eq!(
            auth_for_app(Some(app)).unwrap_err().code_str(),
            "auth/invalid-api-key"
        );
    }
}
