//! Resumable uploads driven in the background.
//!
//! An [`UploadTask`] owns a driver future spawned on the ambient runtime. The driver opens a
//! resumable session, sends the payload in chunks that double after every success (up to
//! 32 MiB), and reports each transition to the registered observers. Transient failures back
//! off, ask the server how many bytes it kept, and continue from that offset.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_channel::{Receiver, Sender};
use futures::future::{select, Either};

use crate::platform::runtime;
use crate::storage::constants::{MAX_RESUMABLE_CHUNK_SIZE, RESUMABLE_UPLOAD_CHUNK_SIZE};
use crate::storage::error::{canceled, internal_error, server_file_wrong_size, StorageError, StorageResult};
use crate::storage::logger::LOGGER;
use crate::storage::metadata::{FullMetadata, UploadMetadata};
use crate::storage::reference::StorageReference;
use crate::storage::request::{
    continue_resumable_upload_request, create_resumable_upload_request, exhausted, get_metadata_request,
    get_resumable_upload_status_request, multipart_upload_request, BackoffConfig, BackoffState, RequestFailure,
    ResumableUploadStatus,
};
use crate::util::{ObserverList, Subscription};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UploadTaskState {
    Running,
    /// Pause requested; the in-flight request is allowed to finish first.
    Pausing,
    Paused,
    Success,
    /// Cancel requested; no further progress is reported.
    Canceling,
    Canceled,
    Error,
}

impl UploadTaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            UploadTaskState::Success | UploadTaskState::Canceled | UploadTaskState::Error
        )
    }
}

/// Point-in-time view of an upload, delivered to observers on every transition and chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadTaskSnapshot {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub state: UploadTaskState,
    /// Final object metadata, present once the upload succeeded.
    pub metadata: Option<FullMetadata>,
    /// Present in the `Error` and `Canceled` states.
    pub error: Option<StorageError>,
}

/// A finished upload: where it went and what the server stored.
#[derive(Clone, Debug)]
pub struct UploadResult {
    pub reference: StorageReference,
    pub metadata: FullMetadata,
}

/// Handle to a running upload. Clones share the same task.
#[derive(Clone)]
pub struct UploadTask {
    inner: Arc<UploadTaskInner>,
}

struct UploadTaskInner {
    reference: StorageReference,
    data: Vec<u8>,
    metadata: UploadMetadata,
    resumable: bool,
    base_chunk_size: usize,
    core: Mutex<TaskCore>,
    observers: ObserverList<UploadTaskSnapshot>,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

struct TaskCore {
    state: UploadTaskState,
    transferred: u64,
    session_url: Option<String>,
    chunk_multiplier: usize,
    needs_status_query: bool,
    needs_metadata: bool,
    metadata: Option<FullMetadata>,
    error: Option<StorageError>,
}

impl TaskCore {
    fn snapshot(&self, total_bytes: u64) -> UploadTaskSnapshot {
        UploadTaskSnapshot {
            bytes_transferred: self.transferred,
            total_bytes,
            state: self.state,
            metadata: self.metadata.clone(),
            error: self.error.clone(),
        }
    }

    fn chunk_size(&self, base_chunk_size: usize) -> usize {
        base_chunk_size
            .saturating_mul(self.chunk_multiplier)
            .min(MAX_RESUMABLE_CHUNK_SIZE)
    }
}

enum Step {
    Multipart,
    CreateSession,
    QueryStatus(String),
    FetchMetadata,
    UploadChunk {
        url: String,
        offset: u64,
        end: u64,
        finalize: bool,
    },
}

enum StepOutput {
    Metadata(FullMetadata),
    Session(String),
    Status(ResumableUploadStatus),
}

enum Checkpoint {
    Proceed(Step),
    Wait,
    Stop,
}

impl UploadTask {
    pub(crate) fn start(reference: StorageReference, data: Vec<u8>, metadata: UploadMetadata) -> Self {
        let base_chunk_size = reference.storage().settings().chunk_size;
        let resumable = data.len() > RESUMABLE_UPLOAD_CHUNK_SIZE;
        let (wake_tx, wake_rx) = async_channel::unbounded();
        let (cancel_tx, cancel_rx) = async_channel::unbounded();
        let (done_tx, done_rx) = async_channel::unbounded();

        let inner = Arc::new(UploadTaskInner {
            reference,
            data,
            metadata,
            resumable,
            base_chunk_size,
            core: Mutex::new(TaskCore {
                state: UploadTaskState::Running,
                transferred: 0,
                session_url: None,
                chunk_multiplier: 1,
                needs_status_query: false,
                needs_metadata: false,
                metadata: None,
                error: None,
            }),
            observers: ObserverList::new(),
            wake_tx,
            wake_rx,
            cancel_tx,
            cancel_rx,
            done_tx,
            done_rx,
        });

        runtime::spawn_detached(drive(Arc::clone(&inner)));
        Self { inner }
    }

    pub fn reference(&self) -> &StorageReference {
        &self.inner.reference
    }

    pub fn snapshot(&self) -> UploadTaskSnapshot {
        self.inner.snapshot()
    }

    pub fn state(&self) -> UploadTaskState {
        self.inner.core().state
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.inner.core().transferred
    }

    pub fn total_bytes(&self) -> u64 {
        self.inner.total_bytes()
    }

    /// Session URL of a resumable upload once the server has opened it.
    pub fn upload_session_url(&self) -> Option<String> {
        self.inner.core().session_url.clone()
    }

    /// Registers an observer and immediately delivers the current snapshot to it.
    ///
    /// Observers added after the task finished therefore see the terminal snapshot exactly once.
    pub fn on_state_changed<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&UploadTaskSnapshot) + Send + Sync + 'static,
    {
        let current = self.snapshot();
        observer(&current);
        if current.state.is_terminal() {
            return Subscription::noop();
        }
        self.inner.observers.subscribe(observer)
    }

    /// Requests a pause. Returns `false` unless the task was running.
    pub fn pause(&self) -> bool {
        self.inner.transition(|state| match state {
            UploadTaskState::Running => Some(UploadTaskState::Pausing),
            _ => None,
        })
    }

    /// Resumes a paused (or pausing) task. Returns `false` otherwise.
    pub fn resume(&self) -> bool {
        self.inner.transition(|state| match state {
            UploadTaskState::Paused | UploadTaskState::Pausing => Some(UploadTaskState::Running),
            _ => None,
        })
    }

    /// Cancels the task, aborting any in-flight request. Returns `false` once the task is
    /// finished or already canceling.
    pub fn cancel(&self) -> bool {
        let changed = self.inner.transition(|state| match state {
            UploadTaskState::Running | UploadTaskState::Pausing | UploadTaskState::Paused => {
                Some(UploadTaskState::Canceling)
            }
            _ => None,
        });
        if changed {
            let _ = self.inner.cancel_tx.try_send(());
        }
        changed
    }

    /// Waits for the task to finish.
    ///
    /// # Errors
    ///
    /// `storage/canceled` after [`cancel`](Self::cancel), otherwise the error that stopped the
    /// upload (for example `storage/retry-limit-exceeded`).
    pub async fn await_completion(&self) -> StorageResult<UploadResult> {
        loop {
            if let Some(result) = self.inner.outcome() {
                return result;
            }
            if self.inner.done_rx.recv().await.is_err() {
                return self
                    .inner
                    .outcome()
                    .unwrap_or_else(|| Err(internal_error("upload task stopped without finishing")));
            }
        }
    }
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.inner.core();
        f.debug_struct("UploadTask")
            .field("reference", &self.inner.reference)
            .field("state", &core.state)
            .field("bytes_transferred", &core.transferred)
            .field("total_bytes", &self.inner.total_bytes())
            .finish()
    }
}

impl UploadTaskInner {
    fn core(&self) -> MutexGuard<'_, TaskCore> {
        self.core.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn total_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    fn snapshot(&self) -> UploadTaskSnapshot {
        self.core().snapshot(self.total_bytes())
    }

    fn transition<F>(&self, next: F) -> bool
    where
        F: FnOnce(UploadTaskState) -> Option<UploadTaskState>,
    {
        let snapshot = {
            let mut core = self.core();
            match next(core.state) {
                Some(state) => {
                    core.state = state;
                    core.snapshot(self.total_bytes())
                }
                None => return false,
            }
        };
        let _ = self.wake_tx.try_send(());
        self.observers.notify(&snapshot);
        true
    }

    fn outcome(&self) -> Option<StorageResult<UploadResult>> {
        let core = self.core();
        match core.state {
            UploadTaskState::Success => Some(match &core.metadata {
                Some(metadata) => Ok(UploadResult {
                    reference: self.reference.clone(),
                    metadata: metadata.clone(),
                }),
                None => Err(internal_error("upload finished without metadata")),
            }),
            UploadTaskState::Canceled | UploadTaskState::Error => {
                Some(Err(core.error.clone().unwrap_or_else(canceled)))
            }
            _ => None,
        }
    }

    fn checkpoint(&self) -> Checkpoint {
        let mut core = self.core();
        match core.state {
            UploadTaskState::Running => Checkpoint::Proceed(self.plan(&core)),
            UploadTaskState::Paused => Checkpoint::Wait,
            UploadTaskState::Pausing => {
                core.state = UploadTaskState::Paused;
                let snapshot = core.snapshot(self.total_bytes());
                drop(core);
                self.observers.notify(&snapshot);
                Checkpoint::Wait
            }
            UploadTaskState::Canceling => {
                drop(core);
                self.finish(UploadTaskState::Canceled, None, Some(canceled()));
                Checkpoint::Stop
            }
            UploadTaskState::Success | UploadTaskState::Canceled | UploadTaskState::Error => Checkpoint::Stop,
        }
    }

    fn plan(&self, core: &TaskCore) -> Step {
        if !self.resumable {
            return Step::Multipart;
        }
        let Some(url) = core.session_url.clone() else {
            return Step::CreateSession;
        };
        if core.needs_status_query {
            return Step::QueryStatus(url);
        }
        if core.needs_metadata {
            return Step::FetchMetadata;
        }

        let chunk_size = core.chunk_size(self.base_chunk_size) as u64;
        let offset = core.transferred;
        let end = (offset + chunk_size).min(self.total_bytes());
        Step::UploadChunk {
            url,
            offset,
            end,
            finalize: end == self.total_bytes(),
        }
    }

    async fn execute(&self, step: Step) -> Result<StepOutput, RequestFailure> {
        let storage = self.reference.storage();
        let location = self.reference.location();
        match step {
            Step::Multipart => {
                let request = multipart_upload_request(&storage, location, &self.data, &self.metadata);
                storage.attempt_request(request).await.map(StepOutput::Metadata)
            }
            Step::CreateSession => {
                let request = create_resumable_upload_request(&storage, location, self.data.len(), &self.metadata);
                storage.attempt_request(request).await.map(StepOutput::Session)
            }
            Step::QueryStatus(url) => {
                let request = get_resumable_upload_status_request(&storage, location, &url, self.total_bytes());
                storage.attempt_request(request).await.map(StepOutput::Status)
            }
            Step::FetchMetadata => {
                let request = get_metadata_request(&storage, location);
                storage.attempt_request(request).await.map(StepOutput::Metadata)
            }
            Step::UploadChunk {
                url,
                offset,
                end,
                finalize,
            } => {
                let chunk = self.data[offset as usize..end as usize].to_vec();
                let request = continue_resumable_upload_request(
                    &storage,
                    location,
                    &url,
                    offset,
                    self.total_bytes(),
                    chunk,
                    finalize,
                );
                storage.attempt_request(request).await.map(StepOutput::Status)
            }
        }
    }

    /// Folds a successful step into the task state.
    fn apply(&self, output: StepOutput) {
        let mut core = self.core();
        if core.state == UploadTaskState::Canceling {
            drop(core);
            self.finish(UploadTaskState::Canceled, None, Some(canceled()));
            return;
        }

        match output {
            StepOutput::Session(url) => {
                core.session_url = Some(url);
            }
            StepOutput::Metadata(metadata) => {
                core.transferred = self.total_bytes();
                drop(core);
                self.finish(UploadTaskState::Success, Some(metadata), None);
            }
            StepOutput::Status(status) => {
                if status.current > self.total_bytes() {
                    drop(core);
                    self.finish(UploadTaskState::Error, None, Some(server_file_wrong_size()));
                    return;
                }
                let was_query = core.needs_status_query;
                core.needs_status_query = false;
                core.transferred = status.current;
                if !was_query && core.chunk_size(self.base_chunk_size) < MAX_RESUMABLE_CHUNK_SIZE {
                    core.chunk_multiplier *= 2;
                }

                if status.finalized {
                    match status.metadata {
                        Some(metadata) => {
                            drop(core);
                            self.finish(UploadTaskState::Success, Some(metadata), None);
                        }
                        None => core.needs_metadata = true,
                    }
                    return;
                }

                let snapshot = core.snapshot(self.total_bytes());
                drop(core);
                self.observers.notify(&snapshot);
            }
        }
    }

    /// Records a failed step. Returns `true` when the driver should back off and retry.
    fn record_failure(&self, failure: &RequestFailure) -> bool {
        let mut core = self.core();
        core.chunk_multiplier = 1;
        if core.session_url.is_some() {
            core.needs_status_query = true;
        }
        failure.is_transient()
    }

    fn finish(&self, state: UploadTaskState, metadata: Option<FullMetadata>, error: Option<StorageError>) {
        let snapshot = {
            let mut core = self.core();
            if core.state.is_terminal() {
                return;
            }
            core.state = state;
            if metadata.is_some() {
                core.metadata = metadata;
            }
            core.error = error;
            core.snapshot(self.total_bytes())
        };

        match (&snapshot.state, &snapshot.error) {
            (UploadTaskState::Error, Some(err)) => {
                LOGGER.debug(format!("upload to {} failed: {err}", self.reference));
            }
            _ => LOGGER.debug(format!("upload to {} finished as {:?}", self.reference, snapshot.state)),
        }

        self.observers.notify(&snapshot);
        self.observers.clear();
        self.done_tx.close();
    }
}

async fn drive(inner: Arc<UploadTaskInner>) {
    let mut backoff: Option<BackoffState> = None;

    loop {
        let step = match inner.checkpoint() {
            Checkpoint::Proceed(step) => step,
            Checkpoint::Wait => {
                let _ = inner.wake_rx.recv().await;
                continue;
            }
            Checkpoint::Stop => return,
        };

        let resets_backoff = !matches!(step, Step::QueryStatus(_));
        let outcome = {
            let request = Box::pin(inner.execute(step));
            let cancel = Box::pin(inner.cancel_rx.recv());
            match select(request, cancel).await {
                Either::Left((outcome, _)) => Some(outcome),
                Either::Right(_) => None,
            }
        };
        let Some(outcome) = outcome else {
            inner.finish(UploadTaskState::Canceled, None, Some(canceled()));
            return;
        };

        match outcome {
            Ok(output) => {
                if resets_backoff {
                    backoff = None;
                }
                inner.apply(output);
            }
            Err(failure) => {
                if !inner.record_failure(&failure) {
                    inner.finish(UploadTaskState::Error, None, Some(failure.into_error()));
                    continue;
                }

                let state = backoff.get_or_insert_with(|| {
                    let settings = inner.reference.storage().settings();
                    BackoffState::new(BackoffConfig::from_policy(
                        &settings.retry_policy,
                        settings.max_upload_retry_time,
                    ))
                });
                if !state.can_retry() {
                    inner.finish(UploadTaskState::Error, None, Some(exhausted(failure.into_error())));
                    continue;
                }

                let delay = state.next_delay();
                LOGGER.debug(format!(
                    "upload to {} hit a transient error, retrying in {delay:?}: {}",
                    inner.reference,
                    failure.into_error()
                ));
                backoff_sleep(&inner, delay).await;
            }
        }
    }
}

/// Sleeps for `delay`, waking early only once the task leaves `Running`.
async fn backoff_sleep(inner: &UploadTaskInner, delay: Duration) {
    while inner.wake_rx.try_recv().is_ok() {}

    let mut sleep = Box::pin(runtime::sleep(delay));
    loop {
        let wake = Box::pin(inner.wake_rx.recv());
        match select(sleep, wake).await {
            Either::Left(_) | Either::Right((Err(_), _)) => return,
            Either::Right((Ok(()), pending)) => {
                if inner.core().state != UploadTaskState::Running {
                    return;
                }
                sleep = pending;
            }
        }
    }
}
