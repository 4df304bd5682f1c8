use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageErrorCode {
    Unknown,
    ObjectNotFound,
    BucketNotFound,
    ProjectNotFound,
    QuotaExceeded,
    Unauthenticated,
    Unauthorized,
    RetryLimitExceeded,
    InvalidChecksum,
    Canceled,
    InvalidUrl,
    InvalidDefaultBucket,
    NoDefaultBucket,
    InvalidArgument,
    AppDeleted,
    InvalidRootOperation,
    InternalError,
    ServerFileWrongSize,
    NoDownloadUrl,
}

impl StorageErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorCode::Unknown => "storage/unknown",
            StorageErrorCode::ObjectNotFound => "storage/object-not-found",
            StorageErrorCode::BucketNotFound => "storage/bucket-not-found",
            StorageErrorCode::ProjectNotFound => "storage/project-not-found",
            StorageErrorCode::QuotaExceeded => "storage/quota-exceeded",
            StorageErrorCode::Unauthenticated => "storage/unauthenticated",
            StorageErrorCode::Unauthorized => "storage/unauthorized",
            StorageErrorCode::RetryLimitExceeded => "storage/retry-limit-exceeded",
            StorageErrorCode::InvalidChecksum => "storage/invalid-checksum",
            StorageErrorCode::Canceled => "storage/canceled",
            StorageErrorCode::InvalidUrl => "storage/invalid-url",
            StorageErrorCode::InvalidDefaultBucket => "storage/invalid-default-bucket",
            StorageErrorCode::NoDefaultBucket => "storage/no-default-bucket",
            StorageErrorCode::InvalidArgument => "storage/invalid-argument",
            StorageErrorCode::AppDeleted => "storage/app-deleted",
            StorageErrorCode::InvalidRootOperation => "storage/invalid-root-operation",
            StorageErrorCode::InternalError => "storage/internal-error",
            StorageErrorCode::ServerFileWrongSize => "storage/server-file-wrong-size",
            StorageErrorCode::NoDownloadUrl => "storage/no-download-url",
        }
    }
}

impl Display for StorageErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageError {
    pub code: StorageErrorCode,
    message: String,
    pub status: Option<u16>,
    pub server_response: Option<String>,
}

impl StorageError {
    pub fn new(code: StorageErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status: None,
            server_response: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_server_response(mut self, response: impl Into<String>) -> Self {
        self.server_response = Some(response.into());
        self
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is(&self, code: StorageErrorCode) -> bool {
        self.code == code
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(server) = &self.server_response {
            write!(f, "{} ({}): {}", self.message, self.code_str(), server)
        } else {
            write!(f, "{} ({})", self.message, self.code_str())
        }
    }
}

impl Error for StorageError {}

pub type StorageResult<T> = Result<T, StorageError>;

pub fn unknown_error() -> StorageError {
    StorageError::new(
        StorageErrorCode::Unknown,
        "An unknown error occurred, please check the error payload for server response.",
    )
}

pub fn object_not_found(path: &str) -> StorageError {
    StorageError::new(StorageErrorCode::ObjectNotFound, format!("Object '{path}' does not exist."))
}

pub fn bucket_not_found(bucket: &str) -> StorageError {
    StorageError::new(StorageErrorCode::BucketNotFound, format!("Bucket '{bucket}' does not exist."))
}

pub fn project_not_found(bucket: &str) -> StorageError {
    StorageError::new(
        StorageErrorCode::ProjectNotFound,
        format!("The project owning bucket '{bucket}' does not exist."),
    )
}

pub fn quota_exceeded(bucket: &str) -> StorageError {
    StorageError::new(
        StorageErrorCode::QuotaExceeded,
        format!("Quota for bucket '{bucket}' exceeded, please view quota on https://firebase.google.com/pricing/."),
    )
}

pub fn unauthenticated() -> StorageError {
    StorageError::new(
        StorageErrorCode::Unauthenticated,
        "User is not authenticated, please authenticate using Firebase Authentication and try again.",
    )
}

pub fn unauthorized(path: &str) -> StorageError {
    StorageError::new(
        StorageErrorCode::Unauthorized,
        format!("User does not have permission to access '{path}'."),
    )
}

pub fn retry_limit_exceeded() -> StorageError {
    StorageError::new(
        StorageErrorCode::RetryLimitExceeded,
        "Max retry time for operation exceeded, please try again.",
    )
}

pub fn invalid_checksum(path: &str) -> StorageError {
    StorageError::new(
        StorageErrorCode::InvalidChecksum,
        format!("Uploaded object '{path}' failed the server's checksum validation. Please retry the upload."),
    )
}

pub fn canceled() -> StorageError {
    StorageError::new(StorageErrorCode::Canceled, "User canceled the upload/download.")
}

pub fn invalid_url(url: &str) -> StorageError {
    StorageError::new(StorageErrorCode::InvalidUrl, format!("Invalid URL '{url}'."))
}

pub fn invalid_default_bucket(bucket: &str) -> StorageError {
    StorageError::new(
        StorageErrorCode::InvalidDefaultBucket,
        format!("Invalid default bucket '{bucket}'."),
    )
}

pub fn no_default_bucket() -> StorageError {
    StorageError::new(
        StorageErrorCode::NoDefaultBucket,
        "No default bucket found. Did you set the 'storage_bucket' property when initializing the app?",
    )
}

pub fn invalid_argument(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::InvalidArgument, message)
}

pub fn app_deleted() -> StorageError {
    StorageError::new(StorageErrorCode::AppDeleted, "The Firebase app was deleted.")
}

pub fn invalid_root_operation(operation: &str) -> StorageError {
    StorageError::new(
        StorageErrorCode::InvalidRootOperation,
        format!("The operation '{operation}' cannot be performed on a root reference, create a non-root reference using child, such as .child('file.png')."),
    )
}

pub fn internal_error(message: impl Into<String>) -> StorageError {
    StorageError::new(StorageErrorCode::InternalError, message)
}

pub fn server_file_wrong_size() -> StorageError {
    StorageError::new(
        StorageErrorCode::ServerFileWrongSize,
        "Server recorded incorrect upload file size, please retry the upload.",
    )
}

pub fn no_download_url() -> StorageError {
    StorageError::new(
        StorageErrorCode::NoDownloadUrl,
        "The given file does not have any download URLs.",
    )
}

/// Maps a non-success HTTP status to the error surfaced for an object request.
///
/// `path` names the object (or bucket) the request targeted, `body` is the raw response body.
pub fn error_for_status(status: u16, bucket: &str, path: &str, body: &str) -> StorageError {
    let error = match status {
        401 => {
            if body.contains("Firebase App Check token is invalid") {
                unauthorized(path)
            } else {
                unauthenticated()
            }
        }
        402 => quota_exceeded(bucket),
        403 => {
            if body.contains("quota") || body.contains("Quota") {
                quota_exceeded(bucket)
            } else {
                unauthorized(path)
            }
        }
        400 if mentions_checksum(body) => invalid_checksum(path),
        404 => {
            let lowered = body.to_ascii_lowercase();
            if reports_missing(&lowered, "project") {
                project_not_found(bucket)
            } else if reports_missing(&lowered, "bucket") {
                bucket_not_found(bucket)
            } else {
                object_not_found(path)
            }
        }
        _ => {
            let mut error = unknown_error();
            if !body.is_empty() {
                error = error.with_server_response(body.to_string());
            }
            return error.with_status(status);
        }
    };
    error.with_status(status).with_server_response(body.to_string())
}

/// Matches phrases like "bucket does not exist" or "project not found" in a lowercased body.
fn reports_missing(lowered: &str, subject: &str) -> bool {
    ["does not exist", "not found"]
        .iter()
        .any(|phrase| lowered.contains(&format!("{subject} {phrase}")))
}

fn mentions_checksum(body: &str) -> bool {
    let lowered = body.to_ascii_lowercase();
    lowered.contains("checksum") || (lowered.contains("hash") && lowered.contains("match"))
}
