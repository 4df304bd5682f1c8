//! Cloud Storage for Firebase.
//!
//! [`get_storage_for_app`] returns the per-bucket [`FirebaseStorageImpl`]; references created
//! from it download, list and update objects, and start [`UploadTask`]s for large payloads.
//!
//! ```no_run
//! # use firebase_rs_storage::app::{initialize_app, FirebaseOptions};
//! # use firebase_rs_storage::storage::{get_storage_for_app, UploadTaskState};
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = FirebaseOptions {
//!     storage_bucket: Some("my-bucket".into()),
//!     ..Default::default()
//! };
//! let app = initialize_app(options, None)?;
//! let storage = get_storage_for_app(Some(app), None)?;
//! let video = storage.reference_from_path(Some("videos/launch.mp4"))?;
//!
//! let task = video.upload_bytes_resumable(vec![0_u8; 8 * 1024 * 1024], None)?;
//! let _progress = task.on_state_changed(|snapshot| {
//!     if snapshot.state == UploadTaskState::Running {
//!         println!("{}/{} bytes", snapshot.bytes_transferred, snapshot.total_bytes);
//!     }
//! });
//! let uploaded = task.await_completion().await?;
//! println!("stored {} bytes at {}", uploaded.metadata.size, uploaded.reference);
//! # Ok(())
//! # }
//! ```

pub mod api;
mod constants;
mod error;
mod list;
mod location;
mod logger;
mod metadata;
mod path;
mod reference;
pub mod request;
mod service;
mod settings;
mod string;
mod upload;

#[doc(inline)]
pub use api::{
    connect_storage_emulator, get_storage_for_app, storage_ref_from_reference, storage_ref_from_storage,
    EmulatorOptions, MockUserToken,
};

#[doc(inline)]
pub use constants::{
    DEFAULT_HOST, DEFAULT_MAX_OPERATION_RETRY_TIME_MS, DEFAULT_MAX_UPLOAD_RETRY_TIME_MS, DEFAULT_PROTOCOL,
    MAX_RESUMABLE_CHUNK_SIZE, RESUMABLE_UPLOAD_CHUNK_SIZE, STORAGE_TYPE,
};

#[doc(inline)]
pub use error::{StorageError, StorageErrorCode, StorageResult};

#[doc(inline)]
pub use list::{ListOptions, ListResult};

#[doc(inline)]
pub use location::Location;

pub use logger::LOGGER;

#[doc(inline)]
pub use metadata::{FieldUpdate, FullMetadata, SettableMetadata, UploadMetadata};

#[doc(inline)]
pub use reference::StorageReference;

#[doc(inline)]
pub use service::FirebaseStorageImpl;

#[doc(inline)]
pub use settings::{RetryPolicy, StorageSettings};

#[doc(inline)]
pub use string::{decode_string, StringFormat, StringPayload};

#[doc(inline)]
pub use upload::{UploadResult, UploadTask, UploadTaskSnapshot, UploadTaskState};
