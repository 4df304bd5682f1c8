pub mod backoff;
pub mod builders;
pub mod info;
pub mod transport;

pub use backoff::{BackoffConfig, BackoffState};
pub use builders::{
    continue_resumable_upload_request, create_resumable_upload_request, delete_object_request, download_bytes_request,
    get_metadata_request, get_resumable_upload_status_request, list_request, multipart_upload_request,
    update_metadata_request, ResumableUploadStatus,
};
pub(crate) use transport::exhausted;
pub use info::{ErrorHandler, RequestBody, RequestInfo, ResponseHandler};
pub use transport::{
    HttpClient, HttpRequest, ReqwestTransport, RequestFailure, ResponsePayload, StorageTransport, TransportArc,
    TransportError,
};
