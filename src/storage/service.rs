use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::app::{AppService, FirebaseApp, SDK_VERSION};
use crate::auth::{Auth, AUTH_COMPONENT_NAME};
use crate::platform::token::{AsyncTokenProvider, TokenProviderArc};
use crate::storage::constants::{DEFAULT_HOST, DEFAULT_PROTOCOL};
use crate::storage::error::{app_deleted, invalid_argument, no_default_bucket, StorageResult};
use crate::storage::location::Location;
use crate::storage::logger::LOGGER;
use crate::storage::reference::StorageReference;
use crate::storage::request::{HttpClient, RequestFailure, RequestInfo, ReqwestTransport, TransportArc};
use crate::storage::settings::StorageSettings;

/// One storage instance per `(app, bucket)`: shared configuration plus the HTTP client.
///
/// Configuration lives behind a mutex and is copied out per request, so emulator or settings
/// changes apply to requests issued afterwards.
pub struct FirebaseStorageImpl {
    app: FirebaseApp,
    url_override: Option<String>,
    client: HttpClient,
    state: Mutex<FirebaseStorageState>,
    deleted: AtomicBool,
}

struct FirebaseStorageState {
    bucket: Option<Location>,
    host: String,
    protocol: String,
    settings: StorageSettings,
    override_auth_token: Option<String>,
    is_using_emulator: bool,
    auth_provider: Option<TokenProviderArc>,
    app_check_provider: Option<TokenProviderArc>,
}

impl FirebaseStorageImpl {
    pub fn new(app: FirebaseApp, url_override: Option<String>, transport: Option<TransportArc>) -> StorageResult<Self> {
        let host = DEFAULT_HOST.to_string();
        let bucket = compute_bucket(&app, url_override.as_deref(), &host)?;
        let transport = transport.unwrap_or_else(|| Arc::new(ReqwestTransport::new()) as TransportArc);

        let state = FirebaseStorageState {
            bucket,
            host,
            protocol: DEFAULT_PROTOCOL.to_string(),
            settings: StorageSettings::default(),
            override_auth_token: None,
            is_using_emulator: false,
            auth_provider: None,
            app_check_provider: None,
        };

        Ok(Self {
            app,
            url_override,
            client: HttpClient::new(transport),
            state: Mutex::new(state),
            deleted: AtomicBool::new(false),
        })
    }

    fn state(&self) -> MutexGuard<'_, FirebaseStorageState> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn app(&self) -> &FirebaseApp {
        &self.app
    }

    pub fn host(&self) -> String {
        self.state().host.clone()
    }

    pub fn protocol(&self) -> String {
        self.state().protocol.clone()
    }

    pub fn bucket(&self) -> Option<Location> {
        self.state().bucket.clone()
    }

    pub fn settings(&self) -> StorageSettings {
        self.state().settings.clone()
    }

    pub fn set_settings(&self, settings: StorageSettings) -> StorageResult<()> {
        settings.validate()?;
        self.state().settings = settings;
        Ok(())
    }

    pub fn set_max_operation_retry_time(&self, duration: Duration) {
        self.state().settings.max_operation_retry_time = duration;
    }

    pub fn set_max_upload_retry_time(&self, duration: Duration) {
        self.state().settings.max_upload_retry_time = duration;
    }

    pub fn is_using_emulator(&self) -> bool {
        self.state().is_using_emulator
    }

    /// Supplies the ID token used in `Authorization` headers, overriding the app's auth instance.
    pub fn set_auth_token_provider(&self, provider: Option<TokenProviderArc>) {
        self.state().auth_provider = provider;
    }

    /// Supplies the attestation token sent as `X-Firebase-AppCheck`.
    pub fn set_app_check_token_provider(&self, provider: Option<TokenProviderArc>) {
        self.state().app_check_provider = provider;
    }

    /// Routes requests to `host:port` over plain HTTP.
    pub fn connect_emulator(&self, host: &str, port: u16, mock_user_token: Option<String>) -> StorageResult<()> {
        if host.trim().is_empty() {
            return Err(invalid_argument("Emulator host must not be empty."));
        }
        let host_string = if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };
        let bucket = compute_bucket(&self.app, self.url_override.as_deref(), &host_string)?;

        let mut state = self.state();
        state.host = host_string.clone();
        state.bucket = bucket;
        state.protocol = "http".to_string();
        state.is_using_emulator = true;
        state.override_auth_token = mock_user_token;
        drop(state);

        LOGGER.info(format!("Using the storage emulator at http://{host_string}"));
        Ok(())
    }

    /// Absolute request URL for a `/b/...` path on the configured host.
    pub fn request_url(&self, server_path: &str) -> String {
        let state = self.state();
        format!("{}://{}/v0{}", state.protocol, state.host, server_path)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::SeqCst) || self.app.is_deleted()
    }

    pub(crate) fn check_available(&self) -> StorageResult<()> {
        if self.is_deleted() {
            Err(app_deleted())
        } else {
            Ok(())
        }
    }

    pub fn root_reference(self: &Arc<Self>) -> StorageResult<StorageReference> {
        let bucket = self.bucket().ok_or_else(no_default_bucket)?;
        Ok(StorageReference::new(Arc::clone(self), bucket.root()))
    }

    /// Resolves a path against the default bucket, or parses a `gs://` / `http(s)://` URL.
    pub fn reference_from_path(self: &Arc<Self>, path: Option<&str>) -> StorageResult<StorageReference> {
        let location = match path {
            Some(value) if is_url(value) => Location::from_url(value, &self.host())?,
            Some(value) => self.bucket().ok_or_else(no_default_bucket)?.child(value),
            None => self.bucket().ok_or_else(no_default_bucket)?,
        };
        Ok(StorageReference::new(Arc::clone(self), location))
    }

    pub(crate) fn make_reference(self: &Arc<Self>, location: Location) -> StorageReference {
        StorageReference::new(Arc::clone(self), location)
    }

    /// Runs a request with the operation retry budget.
    pub async fn run_request<O>(&self, info: RequestInfo<O>) -> StorageResult<O> {
        self.check_available()?;
        let settings = self.settings();
        let info = self.prepare_request(info).await;
        self.client
            .execute(info, &settings.retry_policy, settings.max_operation_retry_time)
            .await
    }

    /// Runs a request with the upload retry budget.
    pub async fn run_upload_request<O>(&self, info: RequestInfo<O>) -> StorageResult<O> {
        self.check_available()?;
        let settings = self.settings();
        let info = self.prepare_request(info).await;
        self.client
            .execute(info, &settings.retry_policy, settings.max_upload_retry_time)
            .await
    }

    /// Sends a request exactly once; the caller owns retries.
    pub(crate) async fn attempt_request<O>(&self, info: RequestInfo<O>) -> Result<O, RequestFailure> {
        self.check_available().map_err(RequestFailure::Fatal)?;
        let policy = self.settings().retry_policy;
        let info = self.prepare_request(info).await;
        self.client.attempt(&info, &policy).await
    }

    async fn prepare_request<O>(&self, mut info: RequestInfo<O>) -> RequestInfo<O> {
        if let Some(token) = self.auth_token().await {
            info.headers
                .insert("Authorization".to_string(), format!("Firebase {token}"));
        }

        if let Some(token) = self.app_check_token().await {
            info.headers.insert("X-Firebase-AppCheck".to_string(), token);
        }

        info.headers
            .entry("X-Firebase-Storage-Version".to_string())
            .or_insert_with(|| format!("rust/{SDK_VERSION}"));

        if let Some(app_id) = self.app.options().app_id.filter(|id| !id.is_empty()) {
            info.headers.entry("X-Firebase-GMPID".to_string()).or_insert(app_id);
        }

        info
    }

    fn app_auth_provider(&self) -> Option<TokenProviderArc> {
        self.app
            .services()
            .get::<Auth>(AUTH_COMPONENT_NAME, None)
            .map(|auth| auth as Arc<dyn AsyncTokenProvider>)
    }

    async fn auth_token(&self) -> Option<String> {
        let (override_token, provider) = {
            let state = self.state();
            (state.override_auth_token.clone(), state.auth_provider.clone())
        };
        if override_token.is_some() {
            return override_token;
        }

        let provider = provider.or_else(|| self.app_auth_provider())?;
        match provider.get_token(false).await {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(err) => {
                LOGGER.warn(format!("Failed to obtain auth token, sending request unauthenticated: {err}"));
                None
            }
        }
    }

    async fn app_check_token(&self) -> Option<String> {
        let provider = self.state().app_check_provider.clone()?;
        match provider.get_token(false).await {
            Ok(token) => token.filter(|token| !token.is_empty()),
            Err(err) => {
                LOGGER.warn(format!("Failed to obtain App Check token: {err}"));
                None
            }
        }
    }
}

impl AppService for FirebaseStorageImpl {
    fn on_app_deleted(&self) {
        self.deleted.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for FirebaseStorageImpl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("FirebaseStorageImpl")
            .field("app", &self.app.name())
            .field("bucket", &state.bucket)
            .field("host", &state.host)
            .field("is_using_emulator", &state.is_using_emulator)
            .finish()
    }
}

pub(crate) fn is_url(value: &str) -> bool {
    ["gs://", "http://", "https://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

fn compute_bucket(app: &FirebaseApp, url_override: Option<&str>, host: &str) -> StorageResult<Option<Location>> {
    match url_override.map(str::to_owned).or_else(|| app.options().storage_bucket) {
        Some(spec) => Ok(Some(Location::from_bucket_or_url(&spec, host)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::token::StaticTokenProvider;
    use crate::storage::request::ResponseHandler;
    use crate::test_support::{storage_with_bucket, test_app};
    use reqwest::Method;

    fn test_request() -> RequestInfo<()> {
        let handler: ResponseHandler<()> = Arc::new(|_| Ok(()));
        RequestInfo::new("https://example.com", Method::GET, Duration::from_secs(5), handler)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prepare_request_uses_emulator_mock_token() {
        let storage = storage_with_bucket("my-bucket");
        storage.set_auth_token_provider(Some(Arc::new(StaticTokenProvider::new("real-token"))));
        storage
            .connect_emulator("localhost", 9199, Some("mock-token".into()))
            .unwrap();

        let prepared = storage.prepare_request(test_request()).await;
        assert_eq!(prepared.headers["Authorization"], "Firebase mock-token");
        assert_eq!(prepared.headers["X-Firebase-Storage-Version"], format!("rust/{SDK_VERSION}"));
        assert!(!prepared.headers.contains_key("X-Firebase-AppCheck"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn prepare_request_includes_provider_tokens() {
        let storage = storage_with_bucket("my-bucket");
        storage.set_auth_token_provider(Some(Arc::new(StaticTokenProvider::new("id-token"))));
        storage.set_app_check_token_provider(Some(Arc::new(StaticTokenProvider::new("attest"))));

        let prepared = storage.prepare_request(test_request()).await;
        assert_eq!(prepared.headers["Authorization"], "Firebase id-token");
        assert_eq!(prepared.headers["X-Firebase-AppCheck"], "attest");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn empty_token_is_not_sent() {
        let storage = storage_with_bucket("my-bucket");
        storage.set_auth_token_provider(Some(Arc::new(StaticTokenProvider::empty())));
        let prepared = storage.prepare_request(test_request()).await;
        assert!(!prepared.headers.contains_key("Authorization"));
    }

    #[test]
    fn emulator_switches_host_and_protocol() {
        let storage = storage_with_bucket("my-bucket");
        storage.connect_emulator("127.0.0.1", 9199, None).unwrap();
        assert!(storage.is_using_emulator());
        assert_eq!(
            storage.request_url("/b/my-bucket/o"),
            "http://127.0.0.1:9199/v0/b/my-bucket/o"
        );
    }

    #[test]
    fn references_resolve_paths_and_urls() {
        let storage = storage_with_bucket("my-bucket");
        let nested = storage.reference_from_path(Some("/a//b/")).unwrap();
        assert_eq!(nested.full_path(), "a/b");
        assert_eq!(nested.bucket(), "my-bucket");

        let other = storage.reference_from_path(Some("gs://other-bucket/x/y")).unwrap();
        assert_eq!(other.bucket(), "other-bucket");
        assert_eq!(other.full_path(), "x/y");

        assert!(storage.reference_from_path(None).unwrap().full_path().is_empty());
    }

    #[test]
    fn missing_bucket_is_reported() {
        let app = test_app("storage-no-bucket", None);
        let storage = Arc::new(FirebaseStorageImpl::new(app, None, None).unwrap());
        assert_eq!(
            storage.reference_from_path(Some("a")).unwrap_err().code_str(),
            "storage/no-default-bucket"
        );
        assert!(storage.reference_from_path(Some("gs://explicit/a")).is_ok());
    }

    #[test]
    fn app_deletion_disables_instance() {
        let storage = storage_with_bucket("my-bucket");
        storage.on_app_deleted();
        assert_eq!(storage.check_available().unwrap_err().code_str(), "storage/app-deleted");
    }
}
