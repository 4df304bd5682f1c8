use std::sync::Arc;

use crate::app::{get_app, AppError, FirebaseApp};
use crate::platform::environment::{default_emulator_host, split_host_and_port};
use crate::storage::constants::STORAGE_TYPE;
use crate::storage::error::{app_deleted, invalid_argument, StorageError, StorageResult};
use crate::storage::list::{ListOptions, ListResult};
use crate::storage::logger::LOGGER;
use crate::storage::metadata::{FullMetadata, SettableMetadata, UploadMetadata};
use crate::storage::reference::StorageReference;
use crate::storage::service::{is_url, FirebaseStorageImpl};
use crate::storage::string::StringFormat;
use crate::storage::upload::{UploadResult, UploadTask};
use crate::util::{create_mock_user_token, EmulatorMockTokenOptions};

/// Token presented to the emulator in place of a real ID token.
#[derive(Clone, Debug, PartialEq)]
pub enum MockUserToken {
    /// Sent verbatim.
    Raw(String),
    /// Minted into an unsigned JWT for the app's project.
    Claims(EmulatorMockTokenOptions),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EmulatorOptions {
    pub mock_user_token: Option<MockUserToken>,
}

fn app_error(err: AppError) -> StorageError {
    match err {
        AppError::AppDeleted { .. } => app_deleted(),
        other => invalid_argument(other.to_string()),
    }
}

/// Returns the storage instance for `app` (the default app when `None`) and bucket.
///
/// Instances are cached per `(app, bucket_url)`, so repeated calls hand back the same `Arc`.
/// A fresh instance connects to the emulator named by `FIREBASE_STORAGE_EMULATOR_HOST`.
pub fn get_storage_for_app(app: Option<FirebaseApp>, bucket_url: Option<&str>) -> StorageResult<Arc<FirebaseStorageImpl>> {
    let app = match app {
        Some(app) => app,
        None => get_app(None).map_err(app_error)?,
    };
    app.check_destroyed().map_err(app_error)?;

    app.services()
        .get_or_try_init(STORAGE_TYPE, bucket_url, || {
            let storage = FirebaseStorageImpl::new(app.clone(), bucket_url.map(str::to_owned), None)?;
            if let Some(emulator) = default_emulator_host("storage") {
                match split_host_and_port(&emulator) {
                    Some((host, port)) => storage.connect_emulator(&host, port, None)?,
                    None => LOGGER.warn(format!("Ignoring malformed storage emulator host '{emulator}'")),
                }
            }
            Ok(storage)
        })
}

/// Points `storage` at a local emulator.
///
/// # Errors
///
/// `storage/invalid-argument` for an empty host or claims without a subject.
pub fn connect_storage_emulator(
    storage: &FirebaseStorageImpl,
    host: &str,
    port: u16,
    options: Option<EmulatorOptions>,
) -> StorageResult<()> {
    let mock_user_token = match options.and_then(|options| options.mock_user_token) {
        None => None,
        Some(MockUserToken::Raw(token)) => Some(token),
        Some(MockUserToken::Claims(claims)) => {
            let project_id = storage.app().options().project_id;
            let token = create_mock_user_token(&claims, project_id.as_deref())
                .ok_or_else(|| invalid_argument("Mock user token claims need a `sub` or `user_id`."))?;
            Some(token)
        }
    };
    storage.connect_emulator(host, port, mock_user_token)
}

/// Reference to `path_or_url` (or the bucket root) in `storage`.
pub fn storage_ref_from_storage(
    storage: &Arc<FirebaseStorageImpl>,
    path_or_url: Option<&str>,
) -> StorageResult<StorageReference> {
    storage.reference_from_path(path_or_url)
}

/// Reference to `path` below `reference`. URLs are only accepted by [`storage_ref_from_storage`].
pub fn storage_ref_from_reference(reference: &StorageReference, path: Option<&str>) -> StorageResult<StorageReference> {
    match path {
        Some(value) if is_url(value) => Err(invalid_argument(
            "To use ref(service, url), the first argument must be a storage instance.",
        )),
        Some(value) => Ok(reference.child(value)),
        None => Ok(reference.clone()),
    }
}

pub async fn get_metadata(reference: &StorageReference) -> StorageResult<FullMetadata> {
    reference.get_metadata().await
}

pub async fn update_metadata(reference: &StorageReference, metadata: &SettableMetadata) -> StorageResult<FullMetadata> {
    reference.update_metadata(metadata).await
}

pub async fn get_bytes(reference: &StorageReference, max_download_size_bytes: Option<u64>) -> StorageResult<Vec<u8>> {
    reference.get_bytes(max_download_size_bytes).await
}

pub async fn get_download_url(reference: &StorageReference) -> StorageResult<String> {
    reference.get_download_url().await
}

pub async fn delete_object(reference: &StorageReference) -> StorageResult<()> {
    reference.delete_object().await
}

pub async fn list(reference: &StorageReference, options: Option<ListOptions>) -> StorageResult<ListResult> {
    reference.list(options).await
}

pub async fn list_all(reference: &StorageReference) -> StorageResult<ListResult> {
    reference.list_all().await
}

pub async fn upload_bytes(
    reference: &StorageReference,
    data: Vec<u8>,
    metadata: Option<UploadMetadata>,
) -> StorageResult<UploadResult> {
    reference.upload_bytes(data, metadata).await
}

pub fn upload_bytes_resumable(
    reference: &StorageReference,
    data: Vec<u8>,
    metadata: Option<UploadMetadata>,
) -> StorageResult<UploadTask> {
    reference.upload_bytes_resumable(data, metadata)
}

pub async fn upload_string(
    reference: &StorageReference,
    value: &str,
    format: StringFormat,
    metadata: Option<UploadMetadata>,
) -> StorageResult<UploadResult> {
    reference.upload_string(value, format, metadata).await
}
