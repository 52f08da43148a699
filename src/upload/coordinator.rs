//! Upload coordinator
//!
//! Owns one upload's lifecycle. [`UploadCoordinator::initialize`] opens (or
//! restores) a session; [`UploadCoordinator::start`] runs a single control
//! loop that launches part transfers through a bounded pool, applies the
//! retry policy, persists progress and finally completes or aborts the
//! session.
//!
//! Part tasks never touch shared state: each one reports a [`PartOutcome`]
//! through the [`JoinSet`] and the loop applies every state change.
//!
//! # Example
//!
//! ```no_run
//! use kata_uploadr::backend::{BackendConfig, BearerToken, HttpBackend};
//! use kata_uploadr::resume::{MemoryStore, ResumeStore};
//! use kata_uploadr::transport::HttpPartTransport;
//! use kata_uploadr::upload::{CoordinatorOptions, FileSource, UploadCoordinator, UploadFile};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = HttpBackend::new(BackendConfig {
//!     base_url: "https://app.example.com/api/uploads".into(),
//!     request_timeout: std::time::Duration::from_secs(30),
//! })?;
//! let mut coordinator = UploadCoordinator::new(
//!     Arc::new(backend),
//!     Arc::new(HttpPartTransport::new()?),
//!     ResumeStore::new(Arc::new(MemoryStore::new())),
//!     BearerToken::new("user-session-token")?,
//!     CoordinatorOptions::default(),
//! );
//!
//! let source = FileSource::open("onboarding.mp4").await?;
//! coordinator.initialize(UploadFile::new(Arc::new(source))).await?;
//! let done = coordinator.start().await?;
//! println!("stored at {}", done.locator);
//! # Ok(())
//! # }
//! ```

use super::finalize::{abort_upload, complete_upload};
use super::planner::{compute_parts, DeviceClass, PartPlan};
use super::progress::{PartProgress, PartProgressCallback, UploadProgress};
use super::retry::RetryPolicy;
use super::session::{PartRecord, PartState, SessionState, UploadSession};
use super::source::{guess_content_type, ByteSource};
use super::{CompletedUpload, UploadError, UploadFailure};
use crate::backend::{
    BearerToken, InitRequest, InitResponse, RequestError, SignPartRequest, StorageBackend,
};
use crate::config::UploadConfig;
use crate::metrics;
use crate::resume::{FileFingerprint, ResumeSnapshot, ResumeStore, ResumeWriter};
use crate::transport::{ByteRange, PartTransport, PartUpload};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Per-session coordinator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Maximum in-flight part transfers
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Bound on one part attempt (signing plus transfer)
    pub part_timeout: Duration,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            part_timeout: Duration::from_secs(60),
        }
    }
}

impl From<&UploadConfig> for CoordinatorOptions {
    fn from(config: &UploadConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::from(&config.retry),
            part_timeout: Duration::from_secs(config.part_timeout_secs),
        }
    }
}

/// The file handed to [`UploadCoordinator::initialize`]
#[derive(Clone)]
pub struct UploadFile {
    pub source: Arc<dyn ByteSource>,
    pub content_type: String,
    pub device_class: DeviceClass,
}

impl UploadFile {
    /// Content type guessed from the name, standard device class
    pub fn new(source: Arc<dyn ByteSource>) -> Self {
        let content_type = guess_content_type(source.name()).to_string();
        Self {
            source,
            content_type,
            device_class: DeviceClass::Standard,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn with_device_class(mut self, device_class: DeviceClass) -> Self {
        self.device_class = device_class;
        self
    }
}

/// Clonable handle that cancels a running upload
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Result reported by a part task
struct PartOutcome {
    part_number: u32,
    attempt: u32,
    bytes: u64,
    elapsed: Duration,
    result: Result<String, AttemptError>,
}

enum AttemptError {
    Read(std::io::Error),
    Request(RequestError),
}

/// Everything a part task needs, owned so the task is `'static`
struct PartJob {
    backend: Arc<dyn StorageBackend>,
    transport: Arc<dyn PartTransport>,
    source: Arc<dyn ByteSource>,
    token: BearerToken,
    sign: SignPartRequest,
    range: ByteRange,
    part_timeout: Duration,
    progress: PartProgressCallback,
    cancel: CancellationToken,
}

/// Control loop bookkeeping
struct Schedule {
    ready: VecDeque<u32>,
    delayed: Vec<(Instant, u32)>,
    fatal: Option<UploadError>,
    cancelled: bool,
    transfers: CancellationToken,
}

impl Schedule {
    fn escalate(&mut self, error: UploadError) {
        if self.fatal.is_none() && !self.cancelled {
            warn!(error = %error, "Unrecoverable part failure; stopping upload");
            self.fatal = Some(error);
            self.transfers.cancel();
        }
    }

    fn is_stopping(&self) -> bool {
        self.fatal.is_some() || self.cancelled
    }
}

/// Drives one resumable multipart upload
pub struct UploadCoordinator {
    backend: Arc<dyn StorageBackend>,
    transport: Arc<dyn PartTransport>,
    store: ResumeStore,
    token: BearerToken,
    options: CoordinatorOptions,
    file: Option<UploadFile>,
    session: Option<UploadSession>,
    parts: Vec<PartRecord>,
    cancel: CancellationToken,
    progress_tx: watch::Sender<UploadProgress>,
    part_progress: PartProgressCallback,
}

impl UploadCoordinator {
    pub fn new(
        backend: Arc<dyn StorageBackend>,
        transport: Arc<dyn PartTransport>,
        store: ResumeStore,
        token: BearerToken,
        options: CoordinatorOptions,
    ) -> Self {
        let (progress_tx, _) = watch::channel(UploadProgress::empty());
        Self {
            backend,
            transport,
            store,
            token,
            options,
            file: None,
            session: None,
            parts: Vec::new(),
            cancel: CancellationToken::new(),
            progress_tx,
            part_progress: super::progress::no_part_progress(),
        }
    }

    /// Receive aggregate progress after every part state change
    pub fn subscribe(&self) -> watch::Receiver<UploadProgress> {
        self.progress_tx.subscribe()
    }

    /// Latest aggregate progress
    pub fn progress(&self) -> UploadProgress {
        self.progress_tx.borrow().clone()
    }

    /// Receive byte-level progress of individual part transfers
    pub fn on_part_progress<F>(&mut self, callback: F)
    where
        F: Fn(PartProgress) + Send + Sync + 'static,
    {
        self.part_progress = Arc::new(callback);
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn parts(&self) -> &[PartRecord] {
        &self.parts
    }

    pub fn options(&self) -> &CoordinatorOptions {
        &self.options
    }

    /// Handle for cancelling from another task while `start()` runs.
    ///
    /// `initialize` after a cancelled run installs a fresh token; handles
    /// taken before then no longer apply.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.cancel.clone())
    }

    /// Request cancellation of the running upload
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Open a session for `file`, restoring one from the resume store if possible
    #[tracing::instrument(
        name = "upload.initialize",
        skip(self, file),
        fields(
            file.name = %file.source.name(),
            file.size = file.source.len(),
            upload_id = tracing::field::Empty
        ),
        err
    )]
    pub async fn initialize(&mut self, file: UploadFile) -> Result<&UploadSession, UploadError> {
        if let Some(session) = &self.session {
            if !session.state().is_terminal() {
                return Err(UploadError::InvalidState(format!(
                    "upload {} is still {}",
                    session.upload_id,
                    session.state()
                )));
            }
        }

        let file_size = file.source.len();
        if file_size == 0 {
            return Err(UploadError::EmptyFile);
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let fingerprint = FileFingerprint::new(file.source.name(), file_size);
        let local_plan = compute_parts(file_size, file.device_class.is_constrained());

        let session = match self.restorable_snapshot(&fingerprint, file_size).await {
            Some(snapshot) => {
                info!(
                    upload_id = %snapshot.upload_id,
                    completed = snapshot.completed_parts.len(),
                    "Restoring upload session from resume snapshot"
                );
                let plan = PartPlan {
                    part_size: snapshot.part_size,
                    part_count: snapshot.part_count,
                };
                UploadSession::new(
                    snapshot.upload_id,
                    snapshot.object_key,
                    plan,
                    file_size,
                    fingerprint,
                )
            }
            None => {
                let request = InitRequest {
                    filename: file.source.name().to_string(),
                    content_type: file.content_type.clone(),
                    file_size,
                    device_class: file.device_class,
                };
                let response = self
                    .backend
                    .init(&self.token, &request)
                    .await
                    .map_err(UploadError::Init)?;
                let plan = resolve_plan(&response, file_size, local_plan)?;
                let session = UploadSession::new(
                    response.upload_id,
                    response.object_key,
                    plan,
                    file_size,
                    fingerprint,
                );
                self.save_snapshot(&session_snapshot(&session, &[])).await;
                session
            }
        };

        tracing::Span::current().record("upload_id", session.upload_id.as_str());
        info!(
            upload_id = %session.upload_id,
            object_key = %session.object_key,
            part_size = session.part_size,
            part_count = session.part_count,
            "Upload session ready"
        );

        self.parts = session.part_numbers().map(PartRecord::pending).collect();
        self.file = Some(file);
        self.publish(&session);
        Ok(self.session.insert(session))
    }

    /// Upload every pending part, then complete; abort on failure or cancellation
    #[tracing::instrument(name = "upload.start", skip(self), fields(upload_id = tracing::field::Empty))]
    pub async fn start(&mut self) -> Result<CompletedUpload, UploadFailure> {
        let Some(mut session) = self.session.take() else {
            return Err(UploadFailure::new(UploadError::NoSession, self.progress()));
        };
        tracing::Span::current().record("upload_id", session.upload_id.as_str());

        let result = self.drive(&mut session).await;
        self.publish(&session);
        self.session = Some(session);

        match result {
            Ok(done) => {
                metrics::record_upload_success(done.part_count);
                Ok(done)
            }
            Err(error) => {
                let failure = UploadFailure::new(error, self.progress());
                metrics::record_upload_failure(failure.is_cancelled());
                Err(failure)
            }
        }
    }

    /// Abort an idle session.
    ///
    /// Rejected once the upload is `DONE`; a no-op when already `ABORTED`.
    #[tracing::instrument(name = "upload.abort_session", skip(self), err)]
    pub async fn abort(&mut self) -> Result<(), UploadError> {
        let Some(mut session) = self.session.take() else {
            return Err(UploadError::NoSession);
        };
        let result = self.abort_session(&mut session).await;
        self.publish(&session);
        self.session = Some(session);
        result
    }

    async fn abort_session(&mut self, session: &mut UploadSession) -> Result<(), UploadError> {
        match session.state() {
            SessionState::Aborted => Ok(()),
            SessionState::Init | SessionState::Uploading => {
                session.transition(SessionState::Aborting)?;
                self.publish(session);
                let acknowledged = abort_upload(
                    self.backend.as_ref(),
                    &self.token,
                    &session.upload_id,
                    &session.object_key,
                )
                .await;
                if let Err(e) = self.store.clear(&session.object_key).await {
                    warn!(error = %e, "Failed to clear resume snapshot");
                }
                session.transition(if acknowledged {
                    SessionState::Aborted
                } else {
                    SessionState::Failed
                })
            }
            state => Err(UploadError::InvalidState(format!(
                "cannot abort upload {} in state {}",
                session.upload_id, state
            ))),
        }
    }

    async fn drive(&mut self, session: &mut UploadSession) -> Result<CompletedUpload, UploadError> {
        if !session.state().is_resumable() {
            return Err(UploadError::InvalidState(format!(
                "upload {} is {} and cannot be started",
                session.upload_id,
                session.state()
            )));
        }
        let source = self
            .file
            .as_ref()
            .map(|f| Arc::clone(&f.source))
            .ok_or(UploadError::NoSession)?;

        self.seed_completed_parts(session).await;
        session.transition(SessionState::Uploading)?;
        self.publish(session);

        let writer = ResumeWriter::spawn(self.store.clone());
        let outcome = self.run_parts(session, source, &writer).await;

        let result = match outcome {
            Ok(()) => {
                session.transition(SessionState::Completing)?;
                self.publish(session);
                let completed =
                    complete_upload(self.backend.as_ref(), &self.token, session, &self.parts)
                        .await;
                match completed {
                    Ok(locator) => {
                        session.transition(SessionState::Done)?;
                        Ok(CompletedUpload {
                            locator,
                            upload_id: session.upload_id.clone(),
                            object_key: session.object_key.clone(),
                            part_count: session.part_count,
                            bytes: session.file_size,
                        })
                    }
                    Err(e) => {
                        session.transition(SessionState::Failed)?;
                        Err(e)
                    }
                }
            }
            Err(e) => {
                session.transition(SessionState::Aborting)?;
                self.publish(session);
                let acknowledged = abort_upload(
                    self.backend.as_ref(),
                    &self.token,
                    &session.upload_id,
                    &session.object_key,
                )
                .await;
                session.transition(if acknowledged {
                    SessionState::Aborted
                } else {
                    SessionState::Failed
                })?;
                Err(e)
            }
        };

        // No outcome of start() leaves a resumable session behind
        writer.clear(session.object_key.clone());
        writer.close().await;
        result
    }

    /// Mark parts completed from a snapshot of this exact session
    async fn seed_completed_parts(&mut self, session: &UploadSession) {
        for part in &mut self.parts {
            if !part.is_completed() {
                part.state = PartState::Pending;
                part.attempt_count = 0;
            }
        }

        let Some(snapshot) = self
            .restorable_snapshot(&session.file_fingerprint, session.file_size)
            .await
        else {
            return;
        };
        if snapshot.upload_id != session.upload_id || snapshot.part_size != session.part_size {
            debug!(snapshot_upload_id = %snapshot.upload_id, "Resume snapshot belongs to another session");
            return;
        }

        let mut seeded = 0u32;
        for (part_number, tag) in snapshot.valid_completed_parts() {
            let part = &mut self.parts[(*part_number - 1) as usize];
            if !part.is_completed() {
                part.complete(tag.clone());
                seeded += 1;
            }
        }
        if seeded > 0 {
            info!(seeded, "Skipping parts completed before interruption");
            metrics::record_upload_resumed();
        }
    }

    /// The scheduling loop. Returns once every part completed, or after a
    /// fatal error or cancellation once in-flight tasks have settled.
    async fn run_parts(
        &mut self,
        session: &UploadSession,
        source: Arc<dyn ByteSource>,
        writer: &ResumeWriter,
    ) -> Result<(), UploadError> {
        let permits = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let cancel = self.cancel.clone();
        let mut in_flight: JoinSet<PartOutcome> = JoinSet::new();
        let mut schedule = Schedule {
            ready: self
                .parts
                .iter()
                .filter(|p| !p.is_completed())
                .map(|p| p.part_number)
                .collect(),
            delayed: Vec::new(),
            fatal: None,
            cancelled: cancel.is_cancelled(),
            transfers: cancel.child_token(),
        };

        loop {
            if !schedule.cancelled && cancel.is_cancelled() {
                info!(in_flight = in_flight.len(), "Upload cancelled; stopping part scheduling");
                schedule.cancelled = true;
            }

            let now = Instant::now();
            let ready = &mut schedule.ready;
            schedule.delayed.retain(|&(due, part_number)| {
                if due <= now {
                    ready.push_back(part_number);
                    false
                } else {
                    true
                }
            });

            if !schedule.is_stopping() {
                while let Some(&part_number) = schedule.ready.front() {
                    let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                        break;
                    };
                    schedule.ready.pop_front();
                    self.launch(
                        &mut in_flight,
                        session,
                        &source,
                        part_number,
                        permit,
                        schedule.transfers.clone(),
                    );
                }
            }

            let drained = schedule.ready.is_empty() && schedule.delayed.is_empty();
            if in_flight.is_empty() && (schedule.is_stopping() || drained) {
                break;
            }

            let next_retry = schedule.delayed.iter().map(|(due, _)| *due).min();
            let wait_for_retry = next_retry.is_some() && !schedule.is_stopping();

            // Cancellation is polled first so a simultaneous settlement never schedules more parts
            tokio::select! {
                biased;
                _ = cancel.cancelled(), if !schedule.cancelled => {
                    info!(in_flight = in_flight.len(), "Upload cancelled; stopping part scheduling");
                    schedule.cancelled = true;
                }
                Some(joined) = in_flight.join_next() => {
                    self.settle(joined, session, writer, &mut schedule);
                }
                _ = sleep_until(next_retry.unwrap_or(now)), if wait_for_retry => {}
                else => break,
            }
        }

        match schedule.fatal {
            Some(error) => Err(error),
            None if schedule.cancelled => Err(UploadError::Cancelled),
            None => Ok(()),
        }
    }

    fn launch(
        &mut self,
        in_flight: &mut JoinSet<PartOutcome>,
        session: &UploadSession,
        source: &Arc<dyn ByteSource>,
        part_number: u32,
        permit: OwnedSemaphorePermit,
        cancel: CancellationToken,
    ) {
        let part = &mut self.parts[(part_number - 1) as usize];
        part.state = PartState::InFlight;
        part.attempt_count += 1;
        let attempt = part.attempt_count;

        let range = session.byte_range(part_number);
        let job = PartJob {
            backend: Arc::clone(&self.backend),
            transport: Arc::clone(&self.transport),
            source: Arc::clone(source),
            token: self.token.clone(),
            sign: SignPartRequest {
                object_key: session.object_key.clone(),
                upload_id: session.upload_id.clone(),
                part_number,
            },
            range,
            part_timeout: self.options.part_timeout,
            progress: Arc::clone(&self.part_progress),
            cancel,
        };

        debug!(part_number, attempt, "Launching part transfer");
        let span = tracing::debug_span!("upload.part", part_number, attempt);
        in_flight.spawn(
            async move {
                let _permit = permit;
                let started = Instant::now();
                let result = transfer_part(job).await;
                PartOutcome {
                    part_number,
                    attempt,
                    bytes: range.len(),
                    elapsed: started.elapsed(),
                    result,
                }
            }
            .instrument(span),
        );
    }

    /// Apply one part task's outcome
    fn settle(
        &mut self,
        joined: Result<PartOutcome, JoinError>,
        session: &UploadSession,
        writer: &ResumeWriter,
        schedule: &mut Schedule,
    ) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                schedule.escalate(UploadError::Worker(e.to_string()));
                return;
            }
        };
        let PartOutcome {
            part_number,
            attempt,
            bytes,
            elapsed,
            result,
        } = outcome;
        let secs = elapsed.as_secs_f64();
        let part = &mut self.parts[(part_number - 1) as usize];

        match result {
            Ok(tag) => {
                debug!(part_number, attempt, "Part completed");
                metrics::record_part("success", bytes, secs);
                part.complete(tag);
                writer.save(session_snapshot(session, &self.parts));
                self.publish(session);
            }
            Err(AttemptError::Request(RequestError::Cancelled)) => {
                metrics::record_part("cancelled", bytes, secs);
                part.state = PartState::Pending;
            }
            Err(_) if schedule.is_stopping() => {
                // Draining after a terminal condition; the first error already decided the outcome
                part.state = PartState::Failed;
            }
            Err(AttemptError::Request(error))
                if error.is_retryable() && self.options.retry.allows_retry(attempt) =>
            {
                let delay = self.options.retry.backoff(attempt);
                warn!(
                    part_number,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Part failed; retrying"
                );
                metrics::record_part("retry", bytes, secs);
                part.state = PartState::Pending;
                schedule.delayed.push((Instant::now() + delay, part_number));
            }
            Err(AttemptError::Request(error)) => {
                metrics::record_part("failure", bytes, secs);
                part.state = PartState::Failed;
                schedule.escalate(UploadError::Part {
                    part_number,
                    attempts: attempt,
                    source: error,
                });
            }
            Err(AttemptError::Read(error)) => {
                metrics::record_part("failure", bytes, secs);
                part.state = PartState::Failed;
                schedule.escalate(UploadError::Io(error));
            }
        }
    }

    /// Snapshot usable for `fingerprint` with a plan consistent with `file_size`
    async fn restorable_snapshot(
        &self,
        fingerprint: &FileFingerprint,
        file_size: u64,
    ) -> Option<ResumeSnapshot> {
        let snapshot = match self.store.load(fingerprint).await {
            Ok(snapshot) => snapshot?,
            Err(e) => {
                warn!(error = %e, "Resume store unavailable; starting fresh");
                return None;
            }
        };
        let consistent = PartPlan::with_part_size(file_size, snapshot.part_size)
            .is_some_and(|plan| plan.part_count == snapshot.part_count);
        if !consistent {
            debug!(upload_id = %snapshot.upload_id, "Ignoring resume snapshot with inconsistent plan");
            return None;
        }
        Some(snapshot)
    }

    async fn save_snapshot(&self, snapshot: &ResumeSnapshot) {
        if let Err(e) = self.store.save(snapshot).await {
            warn!(upload_id = %snapshot.upload_id, error = %e, "Failed to persist resume snapshot");
        }
    }

    fn publish(&self, session: &UploadSession) {
        self.progress_tx
            .send_replace(aggregate_progress(session, &self.parts));
    }
}

/// One attempt: read the slice, sign, transfer
async fn transfer_part(job: PartJob) -> Result<String, AttemptError> {
    if job.cancel.is_cancelled() {
        return Err(AttemptError::Request(RequestError::Cancelled));
    }
    let body = job
        .source
        .read_range(job.range)
        .await
        .map_err(AttemptError::Read)?;

    let attempt = async {
        let signed = tokio::select! {
            biased;
            _ = job.cancel.cancelled() => return Err(RequestError::Cancelled),
            signed = job.backend.sign_part(&job.token, &job.sign) => signed?,
        };
        let upload = PartUpload {
            part_number: job.sign.part_number,
            url: signed.url,
            range: job.range,
            body,
        };
        job.transport
            .upload_part(upload, Arc::clone(&job.progress), job.cancel.clone())
            .await
    };

    match timeout(job.part_timeout, attempt).await {
        Ok(result) => result.map_err(AttemptError::Request),
        Err(_) => Err(AttemptError::Request(RequestError::Timeout)),
    }
}

/// Choose the plan from the Init response, falling back to the local plan
fn resolve_plan(
    response: &InitResponse,
    file_size: u64,
    local_plan: PartPlan,
) -> Result<PartPlan, UploadError> {
    let plan = match response.part_size {
        Some(part_size) => PartPlan::with_part_size(file_size, part_size).ok_or_else(|| {
            UploadError::Init(RequestError::InvalidResponse(format!(
                "unusable part size {part_size}"
            )))
        })?,
        None => local_plan,
    };

    match response.part_count {
        Some(count) if count != plan.part_count => Err(UploadError::Init(
            RequestError::InvalidResponse(format!(
                "part count {} does not match {} parts of {} bytes",
                count, plan.part_count, plan.part_size
            )),
        )),
        _ => Ok(plan),
    }
}

fn session_snapshot(session: &UploadSession, parts: &[PartRecord]) -> ResumeSnapshot {
    let mut snapshot = ResumeSnapshot::new(
        session.upload_id.clone(),
        session.object_key.clone(),
        session.part_size,
        session.part_count,
        session.file_fingerprint.clone(),
    );
    snapshot.completed_parts = parts
        .iter()
        .filter_map(|p| match (&p.state, &p.integrity_tag) {
            (PartState::Completed, Some(tag)) => Some((p.part_number, tag.clone())),
            _ => None,
        })
        .collect();
    snapshot
}

fn aggregate_progress(session: &UploadSession, parts: &[PartRecord]) -> UploadProgress {
    let (completed_parts, completed_bytes) = parts
        .iter()
        .filter(|p| p.is_completed())
        .fold((0u32, 0u64), |(count, bytes), p| {
            (count + 1, bytes + session.byte_range(p.part_number).len())
        });
    UploadProgress {
        completed_bytes,
        total_bytes: session.file_size,
        completed_parts,
        total_parts: session.part_count,
        state: session.state(),
    }
}
