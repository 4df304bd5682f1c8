use std::fmt;
use std::sync::Arc;

use crate::storage::error::{invalid_root_operation, no_download_url, StorageResult};
use crate::storage::list::{ListOptions, ListResult};
use crate::storage::location::{encode_component, Location};
use crate::storage::metadata::{FullMetadata, SettableMetadata, UploadMetadata};
use crate::storage::request::{
    delete_object_request, download_bytes_request, get_metadata_request, list_request, multipart_upload_request,
    update_metadata_request,
};
use crate::storage::service::FirebaseStorageImpl;
use crate::storage::string::{decode_string, StringFormat};
use crate::storage::upload::{UploadResult, UploadTask};

/// Handle to an object or folder in a bucket.
///
/// References are cheap to clone and never touch the network until an operation is called.
#[derive(Clone)]
pub struct StorageReference {
    storage: Arc<FirebaseStorageImpl>,
    location: Location,
}

impl StorageReference {
    pub(crate) fn new(storage: Arc<FirebaseStorageImpl>, location: Location) -> Self {
        Self { storage, location }
    }

    pub fn storage(&self) -> Arc<FirebaseStorageImpl> {
        Arc::clone(&self.storage)
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn bucket(&self) -> &str {
        self.location.bucket()
    }

    pub fn full_path(&self) -> &str {
        self.location.path()
    }

    /// Last path segment, empty for the bucket root.
    pub fn name(&self) -> &str {
        self.location.name()
    }

    pub fn root(&self) -> StorageReference {
        self.storage.make_reference(self.location.root())
    }

    /// `None` at the bucket root.
    pub fn parent(&self) -> Option<StorageReference> {
        self.location
            .parent()
            .map(|location| self.storage.make_reference(location))
    }

    /// Resolves a relative path beneath this reference; empty segments are dropped.
    pub fn child(&self, path: &str) -> StorageReference {
        self.storage.make_reference(self.location.child(path))
    }

    pub fn to_gs_url(&self) -> String {
        format!("gs://{}/{}", self.location.bucket(), self.location.path())
    }

    fn ensure_not_root(&self, operation: &str) -> StorageResult<()> {
        if self.location.is_root() {
            Err(invalid_root_operation(operation))
        } else {
            Ok(())
        }
    }

    /// Fetches the object's metadata.
    ///
    /// # Errors
    ///
    /// `storage/invalid-root-operation` on the bucket root, `storage/object-not-found` when the
    /// object does not exist.
    pub async fn get_metadata(&self) -> StorageResult<FullMetadata> {
        self.ensure_not_root("get_metadata")?;
        let request = get_metadata_request(&self.storage, &self.location);
        self.storage.run_request(request).await
    }

    /// Applies a partial metadata update and returns the object's new metadata.
    ///
    /// Fields left [`Unchanged`](crate::storage::FieldUpdate::Unchanged) are not sent; fields set
    /// to [`Clear`](crate::storage::FieldUpdate::Clear) are removed on the server.
    pub async fn update_metadata(&self, metadata: &SettableMetadata) -> StorageResult<FullMetadata> {
        self.ensure_not_root("update_metadata")?;
        let request = update_metadata_request(&self.storage, &self.location, metadata)?;
        self.storage.run_request(request).await
    }

    /// Downloads the object into memory, at most `max_download_size_bytes` bytes when given.
    pub async fn get_bytes(&self, max_download_size_bytes: Option<u64>) -> StorageResult<Vec<u8>> {
        self.ensure_not_root("get_bytes")?;
        let request = download_bytes_request(&self.storage, &self.location, max_download_size_bytes);
        self.storage.run_request(request).await
    }

    /// Returns a tokenized URL that downloads the object without further authorization.
    ///
    /// # Errors
    ///
    /// `storage/no-download-url` when the object has no download tokens.
    pub async fn get_download_url(&self) -> StorageResult<String> {
        self.ensure_not_root("get_download_url")?;
        let metadata = self.get_metadata().await?;
        let token = metadata
            .download_tokens
            .iter()
            .find(|token| !token.is_empty())
            .ok_or_else(no_download_url)?;

        let location = Location::new(metadata.bucket.clone(), &metadata.full_path);
        Ok(format!(
            "{}?alt=media&token={}",
            self.storage.request_url(&location.full_server_url()),
            encode_component(token)
        ))
    }

    pub async fn delete_object(&self) -> StorageResult<()> {
        self.ensure_not_root("delete_object")?;
        let request = delete_object_request(&self.storage, &self.location);
        self.storage.run_request(request).await
    }

    /// Lists the items and prefixes directly beneath this reference, one page at a time.
    pub async fn list(&self, options: Option<ListOptions>) -> StorageResult<ListResult> {
        let options = options.unwrap_or_default();
        options.validate()?;
        let request = list_request(&self.storage, &self.location, &options);
        let page = self.storage.run_request(request).await?;

        let (prefixes, items, next_page_token) = page.locations(self.location.bucket());
        Ok(ListResult {
            prefixes: prefixes
                .into_iter()
                .map(|location| self.storage.make_reference(location))
                .collect(),
            items: items
                .into_iter()
                .map(|location| self.storage.make_reference(location))
                .collect(),
            next_page_token,
        })
    }

    /// Follows page tokens until the listing is exhausted and concatenates the pages.
    ///
    /// Pages are fetched one after another, so objects written or deleted meanwhile may or may
    /// not appear in the result.
    pub async fn list_all(&self) -> StorageResult<ListResult> {
        let mut merged = ListResult::default();
        let mut page_token = None;
        loop {
            let page = self
                .list(Some(ListOptions {
                    max_results: None,
                    page_token,
                }))
                .await?;
            merged.absorb(page);
            match merged.next_page_token.take() {
                Some(token) => page_token = Some(token),
                None => return Ok(merged),
            }
        }
    }

    /// Uploads `data` in a single multipart request.
    pub async fn upload_bytes(&self, data: Vec<u8>, metadata: Option<UploadMetadata>) -> StorageResult<UploadResult> {
        self.ensure_not_root("upload_bytes")?;
        let metadata = metadata.unwrap_or_default();
        let request = multipart_upload_request(&self.storage, &self.location, &data, &metadata);
        let metadata = self.storage.run_upload_request(request).await?;
        Ok(UploadResult {
            reference: self.clone(),
            metadata,
        })
    }

    /// Starts a resumable upload running in the background.
    ///
    /// Payloads of at most 256 KiB still go out as one multipart request, but are driven by the
    /// same task so callers observe a uniform lifecycle.
    pub fn upload_bytes_resumable(&self, data: Vec<u8>, metadata: Option<UploadMetadata>) -> StorageResult<UploadTask> {
        self.ensure_not_root("upload_bytes_resumable")?;
        Ok(UploadTask::start(self.clone(), data, metadata.unwrap_or_default()))
    }

    /// Decodes `value` according to `format` and uploads the bytes.
    ///
    /// A data URL's media type becomes the content type unless `metadata` sets one.
    pub async fn upload_string(
        &self,
        value: &str,
        format: StringFormat,
        metadata: Option<UploadMetadata>,
    ) -> StorageResult<UploadResult> {
        self.ensure_not_root("upload_string")?;
        let payload = decode_string(value, format)?;
        let mut metadata = metadata.unwrap_or_default();
        if metadata.content_type.is_none() {
            metadata.content_type = payload.content_type;
        }
        self.upload_bytes(payload.bytes, Some(metadata)).await
    }
}

impl fmt::Debug for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StorageReference").field(&self.to_gs_url()).finish()
    }
}

impl fmt::Display for StorageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_gs_url())
    }
}

impl PartialEq for StorageReference {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage) && self.location == other.location
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::metadata::FieldUpdate;
    use crate::test_support::{storage_with_backend, storage_with_bucket, FakeStorageBackend};

    fn reference(path: &str) -> StorageReference {
        storage_with_bucket("my-bucket").reference_from_path(Some(path)).unwrap()
    }

    #[test]
    fn navigation_follows_path_rules() {
        let file = reference("photos/2024/cat.png");
        assert_eq!(file.name(), "cat.png");
        assert_eq!(file.to_gs_url(), "gs://my-bucket/photos/2024/cat.png");

        let parent = file.parent().unwrap();
        assert_eq!(parent.full_path(), "photos/2024");
        assert_eq!(parent.child("cat.png"), file);

        let root = file.root();
        assert_eq!(root.full_path(), "");
        assert_eq!(root.to_gs_url(), "gs://my-bucket/");
        assert!(root.parent().is_none());
        assert_eq!(root.child("a//b/").full_path(), "a/b");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn root_operations_are_rejected() {
        let root = reference("a").root();
        let err = root.get_metadata().await.unwrap_err();
        assert_eq!(err.code_str(), "storage/invalid-root-operation");
        assert!(root.delete_object().await.is_err());
        assert!(root.upload_bytes(vec![1], None).await.is_err());
        assert!(root.upload_bytes_resumable(vec![1], None).is_err());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn upload_then_read_back() {
        let backend = FakeStorageBackend::new();
        let storage = storage_with_backend("my-bucket", &backend);
        let file = storage.reference_from_path(Some("docs/readme.txt")).unwrap();

        let uploaded = file
            .upload_bytes(b"hello".to_vec(), Some(UploadMetadata::new().with_content_type("text/plain")))
            .await
            .unwrap();
        assert_eq!(uploaded.reference, file);
        assert_eq!(uploaded.metadata.size, 5);
        assert_eq!(uploaded.metadata.content_type.as_deref(), Some("text/plain"));

        assert_eq!(file.get_bytes(None).await.unwrap(), b"hello");
        assert_eq!(file.get_bytes(Some(2)).await.unwrap(), b"he");

        let metadata = file.get_metadata().await.unwrap();
        assert_eq!(metadata.full_path, "docs/readme.txt");
        assert_eq!(metadata.name, "readme.txt");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn update_metadata_clears_and_sets_fields() {
        let backend = FakeStorageBackend::new();
        let storage = storage_with_backend("my-bucket", &backend);
        let file = storage.reference_from_path(Some("a.txt")).unwrap();
        let metadata = UploadMetadata {
            content_language: Some("en".into()),
            ..UploadMetadata::new().with_custom_metadata("owner", "ana")
        };
        file.upload_bytes(b"x".to_vec(), Some(metadata)).await.unwrap();

        let update = SettableMetadata {
            content_language: FieldUpdate::Clear,
            cache_control: FieldUpdate::Set("no-cache".into()),
            ..SettableMetadata::new()
        };
        let updated = file.update_metadata(&update).await.unwrap();
        assert_eq!(updated.content_language, None);
        assert_eq!(updated.cache_control.as_deref(), Some("no-cache"));
        assert_eq!(updated.custom_metadata.get("owner").map(String::as_str), Some("ana"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_object_maps_to_object_not_found() {
        let backend = FakeStorageBackend::new();
        let storage = storage_with_backend("my-bucket", &backend);
        let file = storage.reference_from_path(Some("missing.bin")).unwrap();
        let err = file.get_metadata().await.unwrap_err();
        assert_eq!(err.code_str(), "storage/object-not-found");
        assert_eq!(file.delete_object().await.unwrap_err().code_str(), "storage/object-not-found");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn delete_removes_object() {
        let backend = FakeStorageBackend::new();
        let storage = storage_with_backend("my-bucket", &backend);
        let file = storage.reference_from_path(Some("tmp/file")).unwrap();
        file.upload_bytes(vec![1, 2, 3], None).await.unwrap();
        file.delete_object().await.unwrap();
        assert!(backend.object("my-bucket", "tmp/file").is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn download_url_uses_first_token() {
        let backend = FakeStorageBackend::new();
        let storage = storage_with_backend("my-bucket", &backend);
        let file = storage.reference_from_path(Some("images/a b.png")).unwrap();
        file.upload_bytes(vec![0; 4], None).await.unwrap();

        let url = file.get_download_url().await.unwrap();
        let token = backend.object("my-bucket", "images/a b.png").unwrap().download_token;
        assert_eq!(
            url,
            format!("https://firebasestorage.googleapis.com/v0/b/my-bucket/o/images%2Fa%20b.png?alt=media&token={token}")
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn list_all_concatenates_pages() {
        let backend = FakeStorageBackend::new().with_page_size(2);
        let storage = storage_with_backend("my-bucket", &backend);
        for name in ["dir/a", "dir/b", "dir/c", "dir/sub/d", "dir/sub2/e"] {
            backend.insert_object("my-bucket", name, b"x".to_vec());
        }
        let dir = storage.reference_from_path(Some("dir")).unwrap();

        let first = dir.list(Some(ListOptions { max_results: Some(2), page_token: None })).await.unwrap();
        assert_eq!(first.items.len() + first.prefixes.len(), 2);
        assert!(first.next_page_token.is_some());

        let all = dir.list_all().await.unwrap();
        let items: Vec<_> = all.items.iter().map(|item| item.full_path().to_string()).collect();
        let prefixes: Vec<_> = all.prefixes.iter().map(|prefix| prefix.full_path().to_string()).collect();
        assert_eq!(items, ["dir/a", "dir/b", "dir/c"]);
        assert_eq!(prefixes, ["dir/sub", "dir/sub2"]);
        assert!(all.next_page_token.is_none());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn list_rejects_invalid_page_size() {
        let file = reference("dir");
        let err = file
            .list(Some(ListOptions { max_results: Some(0), page_token: None }))
            .await
            .unwrap_err();
        assert_eq!(err.code_str(), "storage/invalid-argument");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn upload_string_uses_data_url_content_type() {
        let backend = FakeStorageBackend::new();
        let storage = storage_with_backend("my-bucket", &backend);
        let file = storage.reference_from_path(Some("notes/hello.txt")).unwrap();

        let result = file
            .upload_string("data:text/plain;base64,aGVsbG8=", StringFormat::DataUrl, None)
            .await
            .unwrap();
        assert_eq!(result.metadata.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.get_bytes(None).await.unwrap(), b"hello");

        let explicit = file
            .upload_string(
                "data:text/plain;base64,aGVsbG8=",
                StringFormat::DataUrl,
                Some(UploadMetadata::new().with_content_type("application/x-custom")),
            )
            .await
            .unwrap();
        assert_eq!(explicit.metadata.content_type.as_deref(), Some("application/x-custom"));
    }
}
