//! Rust client for Cloud Storage for Firebase.
//!
//! The crate follows the modular Firebase Web SDK surface: an [`app`] registry holds the
//! project options, [`storage`] resolves references and drives uploads and downloads, and
//! [`auth`] provides the email sign-in helpers whose ID tokens authorize storage requests.
//!
//! ```no_run
//! # use firebase_rs_storage::app::{initialize_app, FirebaseOptions};
//! # use firebase_rs_storage::storage::get_storage_for_app;
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = FirebaseOptions {
//!     storage_bucket: Some("my-bucket".into()),
//!     ..Default::default()
//! };
//! let app = initialize_app(options, None)?;
//! let storage = get_storage_for_app(Some(app), None)?;
//! let avatar = storage.reference_from_path(Some("avatars/user.png"))?;
//! avatar.upload_bytes(vec![0_u8; 512], None).await?;
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod auth;
pub mod logger;
pub mod platform;
pub mod storage;
pub mod util;

#[cfg(test)]
pub mod test_support;
