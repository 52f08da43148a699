//! Shared fakes for coordinator integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use kata_uploadr::backend::{
    AbortRequest, BearerToken, CompleteRequest, CompleteResponse, InitRequest, InitResponse,
    RequestError, SignPartRequest, SignPartResponse, StorageBackend,
};
use kata_uploadr::resume::{KeyValueStore, MemoryStore, ResumeStore};
use kata_uploadr::transport::{PartTransport, PartUpload};
use kata_uploadr::upload::progress::{PartProgress, PartProgressCallback};
use kata_uploadr::upload::{CoordinatorOptions, MemorySource, RetryPolicy, UploadCoordinator, UploadFile};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const MIB: u64 = 1024 * 1024;

/// In-memory upload service
pub struct FakeBackend {
    pub init_response: Mutex<Result<InitResponse, RequestError>>,
    pub complete_response: Mutex<Result<CompleteResponse, RequestError>>,
    pub abort_response: Mutex<Result<(), RequestError>>,
    pub init_calls: Mutex<Vec<InitRequest>>,
    pub sign_calls: AtomicUsize,
    pub sign_requests: Mutex<Vec<u32>>,
    sign_failures: Mutex<HashMap<u32, VecDeque<RequestError>>>,
    pub complete_calls: Mutex<Vec<CompleteRequest>>,
    pub abort_calls: Mutex<Vec<AbortRequest>>,
    pub tokens: Mutex<Vec<String>>,
}

impl FakeBackend {
    /// Backend that lets the client plan the parts
    pub fn new() -> Self {
        Self::with_plan(None, None)
    }

    /// Backend that dictates the part size, for files smaller than the planner minimum
    pub fn with_part_size(part_size: u64, file_size: u64) -> Self {
        Self::with_plan(
            Some(part_size),
            Some(file_size.div_ceil(part_size) as u32),
        )
    }

    fn with_plan(part_size: Option<u64>, part_count: Option<u32>) -> Self {
        Self {
            init_response: Mutex::new(Ok(InitResponse {
                upload_id: "upload-1".into(),
                object_key: "videos/lesson.mp4".into(),
                part_size,
                part_count,
            })),
            complete_response: Mutex::new(Ok(CompleteResponse {
                final_object_locator: "https://cdn.example.com/videos/lesson.mp4".into(),
            })),
            abort_response: Mutex::new(Ok(())),
            init_calls: Mutex::new(Vec::new()),
            sign_calls: AtomicUsize::new(0),
            sign_requests: Mutex::new(Vec::new()),
            sign_failures: Mutex::new(HashMap::new()),
            complete_calls: Mutex::new(Vec::new()),
            abort_calls: Mutex::new(Vec::new()),
            tokens: Mutex::new(Vec::new()),
        }
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.lock().unwrap().len()
    }

    pub fn complete_count(&self) -> usize {
        self.complete_calls.lock().unwrap().len()
    }

    pub fn abort_count(&self) -> usize {
        self.abort_calls.lock().unwrap().len()
    }

    /// Fail successive SignPart calls for one part; later calls succeed
    pub fn fail_sign(self, part_number: u32, errors: impl IntoIterator<Item = RequestError>) -> Self {
        self.sign_failures
            .lock()
            .unwrap()
            .entry(part_number)
            .or_default()
            .extend(errors);
        self
    }

    pub fn sign_count_for(&self, part_number: u32) -> usize {
        self.sign_requests
            .lock()
            .unwrap()
            .iter()
            .filter(|&&n| n == part_number)
            .count()
    }

    fn record_token(&self, token: &BearerToken) {
        self.tokens.lock().unwrap().push(token.expose().to_string());
    }
}

#[async_trait]
impl StorageBackend for FakeBackend {
    async fn init(
        &self,
        token: &BearerToken,
        request: &InitRequest,
    ) -> Result<InitResponse, RequestError> {
        self.record_token(token);
        self.init_calls.lock().unwrap().push(request.clone());
        self.init_response.lock().unwrap().clone()
    }

    async fn sign_part(
        &self,
        token: &BearerToken,
        request: &SignPartRequest,
    ) -> Result<SignPartResponse, RequestError> {
        self.record_token(token);
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        self.sign_requests.lock().unwrap().push(request.part_number);
        let failure = self
            .sign_failures
            .lock()
            .unwrap()
            .get_mut(&request.part_number)
            .and_then(VecDeque::pop_front);
        if let Some(error) = failure {
            return Err(error);
        }
        Ok(SignPartResponse {
            url: format!(
                "https://storage.example.com/{}?partNumber={}",
                request.upload_id, request.part_number
            ),
        })
    }

    async fn complete(
        &self,
        token: &BearerToken,
        request: &CompleteRequest,
    ) -> Result<CompleteResponse, RequestError> {
        self.record_token(token);
        self.complete_calls.lock().unwrap().push(request.clone());
        self.complete_response.lock().unwrap().clone()
    }

    async fn abort(&self, token: &BearerToken, request: &AbortRequest) -> Result<(), RequestError> {
        self.record_token(token);
        self.abort_calls.lock().unwrap().push(request.clone());
        self.abort_response.lock().unwrap().clone()
    }
}

/// What a scripted transport call does
#[derive(Debug, Clone)]
pub enum Step {
    Respond(Result<String, RequestError>),
    /// Never respond; only cancellation or a timeout ends the call
    Hang,
}

/// Transport that records calls and concurrency
pub struct FakeTransport {
    delay: Duration,
    script: Mutex<HashMap<u32, VecDeque<Step>>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<u32>>,
    cancelled: AtomicUsize,
    bodies: Mutex<HashMap<u32, Bytes>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            delay: Duration::from_millis(5),
            script: Mutex::new(HashMap::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            cancelled: AtomicUsize::new(0),
            bodies: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue behaviours for successive calls of one part; later calls succeed
    pub fn script(self, part_number: u32, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(part_number)
            .or_default()
            .extend(steps);
        self
    }

    pub fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, part_number: u32) -> usize {
        self.calls().iter().filter(|&&n| n == part_number).count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn body(&self, part_number: u32) -> Option<Bytes> {
        self.bodies.lock().unwrap().get(&part_number).cloned()
    }
}

pub fn tag(part_number: u32) -> String {
    format!("\"etag-{part_number}\"")
}

#[async_trait]
impl PartTransport for FakeTransport {
    async fn upload_part(
        &self,
        part: PartUpload,
        progress: PartProgressCallback,
        cancel: CancellationToken,
    ) -> Result<String, RequestError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(part.part_number);

        let step = self
            .script
            .lock()
            .unwrap()
            .get_mut(&part.part_number)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Step::Respond(Ok(tag(part.part_number))));
        let wait = match step {
            Step::Hang => Duration::from_secs(3600),
            Step::Respond(_) => self.delay,
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(RequestError::Cancelled)
            }
            _ = tokio::time::sleep(wait) => {
                let len = part.body.len() as u64;
                progress(PartProgress { part_number: part.part_number, bytes_sent: len, part_bytes: len });
                match step {
                    Step::Respond(result) => result,
                    Step::Hang => Err(RequestError::Timeout),
                }
            }
        };

        if result.is_ok() {
            self.bodies.lock().unwrap().insert(part.part_number, part.body);
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Key-value store that counts writes
#[derive(Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    pub sets: AtomicUsize,
    pub fail: std::sync::atomic::AtomicBool,
}

impl RecordingStore {
    pub fn failing() -> Self {
        let store = Self::default();
        store.fail.store(true, Ordering::SeqCst);
        store
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    fn check(&self) -> io::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RecordingStore {
    async fn get(&self, key: &str) -> io::Result<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> io::Result<()> {
        self.check()?;
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> io::Result<()> {
        self.check()?;
        self.inner.delete(key).await
    }
}

/// Fast retry policy for tests
pub fn fast_options(concurrency: usize) -> CoordinatorOptions {
    CoordinatorOptions {
        concurrency,
        retry: RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40)),
        part_timeout: Duration::from_secs(5),
    }
}

pub fn token() -> BearerToken {
    BearerToken::new("user-token").unwrap()
}

/// Deterministic file contents
pub fn file(name: &str, size: u64) -> UploadFile {
    let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
    UploadFile::new(Arc::new(MemorySource::new(name, data)))
}

pub fn coordinator(
    backend: &Arc<FakeBackend>,
    transport: &Arc<FakeTransport>,
    store: ResumeStore,
    options: CoordinatorOptions,
) -> UploadCoordinator {
    UploadCoordinator::new(
        backend.clone(),
        transport.clone(),
        store,
        token(),
        options,
    )
}

pub fn memory_store() -> (ResumeStore, Arc<MemoryStore>) {
    let kv = Arc::new(MemoryStore::new());
    (ResumeStore::new(kv.clone()), kv)
}
