use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::StreamExt;
use md5::{Digest, Md5};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, USER_AGENT};
use reqwest::multipart;
use reqwest::Client;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::config::{UploadConfig, UploadMethod, DEFAULT_USER_AGENT, IDLE_TIMEOUT};
use crate::error::LegError;
use crate::result::{UploadResponse, UploadResult};

/// A leg's position in the state machine described in the design notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LegState {
    Preparing,
    Active,
    Stalled,
    Finalizing,
    Done,
}

/// What the coordinator forwards to the source reader.
#[derive(Debug, Clone, Copy)]
pub enum CoordinatorSignal {
    Stuck(usize),
    Unstuck(usize),
    Unusable,
}

enum BufMsg {
    Chunk(Bytes),
    Abort(String),
}

/// Single-shot, re-armable idle watchdog. `arm`/`clear` are cheap and can
/// be called from any write path; the background task only ever sleeps
/// while armed.
struct IdleTimer {
    armed: Arc<AtomicBool>,
    notify: Arc<Notify>,
    timed_out: Arc<AtomicBool>,
}

impl IdleTimer {
    fn spawn(cancel: CancellationToken) -> Self {
        let armed = Arc::new(AtomicBool::new(false));
        let notify = Arc::new(Notify::new());
        let timed_out = Arc::new(AtomicBool::new(false));

        let (armed2, notify2, timed_out2) = (armed.clone(), notify.clone(), timed_out.clone());
        tokio::spawn(async move {
            loop {
                if !armed2.load(Ordering::Acquire) {
                    tokio::select! {
                        _ = notify2.notified() => continue,
                        _ = cancel.cancelled() => return,
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(IDLE_TIMEOUT) => {
                        if armed2.load(Ordering::Acquire) {
                            timed_out2.store(true, Ordering::Release);
                            cancel.cancel();
                            return;
                        }
                    }
                    _ = notify2.notified() => continue,
                    _ = cancel.cancelled() => return,
                }
            }
        });

        Self { armed, notify, timed_out }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn clear(&self) {
        self.armed.store(false, Ordering::Release);
        self.notify.notify_one();
    }

    fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::Acquire)
    }
}

struct LegInner {
    occupancy: AtomicU64,
    uploaded_bytes: AtomicU64,
    declared_size: Mutex<Option<u64>>,
    file_name: Mutex<Option<String>>,
    hash: Mutex<Option<Md5>>,
    state: Mutex<LegState>,
    final_error: Mutex<Option<LegError>>,
    final_md5: Mutex<Option<String>>,
    cancel: CancellationToken,
    idle: IdleTimer,
    tx: Mutex<Option<mpsc::UnboundedSender<BufMsg>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<BufMsg>>>,
    ready_tx: Mutex<Option<oneshot::Sender<u64>>>,
    ready_rx: Mutex<Option<oneshot::Receiver<u64>>>,
    signal_tx: mpsc::UnboundedSender<CoordinatorSignal>,
}

/// One upload destination: a bounded buffer, a running hash, a byte
/// counter, an idle timer, a cancellation handle, and the eventual HTTP
/// request. Cheap to clone -- every clone shares the same underlying state.
#[derive(Clone)]
pub struct Leg {
    pub index: usize,
    config: UploadConfig,
    inner: Arc<LegInner>,
}

impl Leg {
    /// `prepare`: allocate buffer, hash, and cancellation handle. No I/O.
    pub fn new(
        index: usize,
        config: UploadConfig,
        calculate_md5: bool,
        signal_tx: mpsc::UnboundedSender<CoordinatorSignal>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        let idle = IdleTimer::spawn(cancel.clone());

        let inner = Arc::new(LegInner {
            occupancy: AtomicU64::new(0),
            uploaded_bytes: AtomicU64::new(0),
            declared_size: Mutex::new(None),
            file_name: Mutex::new(config.file_name.clone()),
            hash: Mutex::new(if calculate_md5 { Some(Md5::new()) } else { None }),
            state: Mutex::new(LegState::Preparing),
            final_error: Mutex::new(None),
            final_md5: Mutex::new(None),
            cancel,
            idle,
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
            ready_tx: Mutex::new(Some(ready_tx)),
            ready_rx: Mutex::new(Some(ready_rx)),
            signal_tx,
        });

        Self { index, config, inner }
    }

    /// `setSize`: declared size becomes `content_length + random_bytes_count`,
    /// arms the idle timer, transitions to `Active`.
    pub fn set_size(&self, content_length: u64) {
        let mut declared = self.inner.declared_size.lock().unwrap();
        if declared.is_some() {
            return;
        }
        let size = content_length + self.config.random_bytes_count as u64;
        *declared = Some(size);
        drop(declared);

        *self.inner.state.lock().unwrap() = LegState::Active;
        self.inner.idle.arm();

        if let Some(tx) = self.inner.ready_tx.lock().unwrap().take() {
            let _ = tx.send(size);
        }
    }

    /// `setFilename`: adopted only if the leg doesn't already have one.
    pub fn set_filename(&self, name: &str) {
        let mut file_name = self.inner.file_name.lock().unwrap();
        if file_name.is_none() {
            *file_name = Some(name.to_string());
        }
    }

    /// `write`: enqueue `chunk`, update counters/hash, and report whether
    /// the buffer is still within `BUFFER_CAP` after this write.
    pub fn write(&self, chunk: Bytes) -> bool {
        let state = *self.inner.state.lock().unwrap();
        if !matches!(state, LegState::Active | LegState::Stalled) {
            return true;
        }

        let accepted = self.push(chunk);

        let mut state_guard = self.inner.state.lock().unwrap();
        if accepted {
            self.inner.idle.arm();
            if *state_guard == LegState::Stalled {
                *state_guard = LegState::Active;
            }
        } else {
            *state_guard = LegState::Stalled;
            self.inner.idle.clear();
        }
        accepted
    }

    fn push(&self, chunk: Bytes) -> bool {
        let len = chunk.len() as u64;
        self.inner.uploaded_bytes.fetch_add(len, Ordering::AcqRel);
        if let Some(hash) = self.inner.hash.lock().unwrap().as_mut() {
            hash.update(&chunk);
        }
        let new_occupancy = self.inner.occupancy.fetch_add(len, Ordering::AcqRel) + len;

        if let Some(tx) = self.inner.tx.lock().unwrap().as_ref() {
            let _ = tx.send(BufMsg::Chunk(chunk));
        }

        new_occupancy <= crate::config::BUFFER_CAP
    }

    /// `finalize`: append the random suffix (if any), digest the hash,
    /// and close the buffer so the HTTP body completes once drained.
    pub fn finalize(&self) {
        {
            let state = *self.inner.state.lock().unwrap();
            if !matches!(state, LegState::Active | LegState::Stalled) {
                return;
            }
        }

        if self.config.random_bytes_count > 0 {
            let mut suffix = vec![0u8; self.config.random_bytes_count as usize];
            use rand::RngCore;
            rand::thread_rng().fill_bytes(&mut suffix);
            self.push(Bytes::from(suffix));
        }

        if let Some(hash) = self.inner.hash.lock().unwrap().take() {
            *self.inner.final_md5.lock().unwrap() = Some(hex::encode(hash.finalize()));
        }

        *self.inner.state.lock().unwrap() = LegState::Finalizing;
        self.inner.idle.clear();
        self.inner.tx.lock().unwrap().take();
    }

    /// `abort`: trip cancellation, destroy the buffer with `error`, and
    /// move straight to `Done`.
    pub fn abort(&self, error: LegError) {
        let mut state = self.inner.state.lock().unwrap();
        if *state == LegState::Done {
            return;
        }
        *state = LegState::Done;
        drop(state);

        *self.inner.final_error.lock().unwrap() = Some(error.clone());
        self.inner.idle.clear();
        self.inner.cancel.cancel();

        if let Some(tx) = self.inner.tx.lock().unwrap().take() {
            let _ = tx.send(BufMsg::Abort(error.to_string()));
        }
    }

    /// `isAlive`: true while the leg could still accept writes or is
    /// mid-upload.
    pub fn is_alive(&self) -> bool {
        !matches!(*self.inner.state.lock().unwrap(), LegState::Done)
    }

    pub fn declared_size(&self) -> u64 {
        self.inner.declared_size.lock().unwrap().unwrap_or(0)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.inner.uploaded_bytes.load(Ordering::Acquire)
    }

    /// The per-leg HTTP client override, if the caller supplied one.
    pub fn agent(&self) -> Option<Client> {
        self.config.agent.clone()
    }

    /// `run`: perform the outbound HTTP request and return the leg's
    /// final `UploadResult` once it settles, one way or another.
    pub async fn run(&self, client: Client) -> UploadResult {
        let ready_rx = self
            .inner
            .ready_rx
            .lock()
            .unwrap()
            .take()
            .expect("run() called more than once on the same leg");
        let rx = self
            .inner
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("run() called more than once on the same leg");

        let declared_size = tokio::select! {
            size = ready_rx => size.unwrap_or(0),
            _ = self.inner.cancel.cancelled() => 0,
        };

        let signal_tx = self.inner.signal_tx.clone();
        let inner = self.inner.clone();
        let index = self.index;

        let stream = UnboundedReceiverStream::new(rx).map(move |msg| match msg {
            BufMsg::Chunk(bytes) => {
                let len = bytes.len() as u64;
                let before = inner.occupancy.fetch_sub(len, Ordering::AcqRel);
                if before == len {
                    // occupancy just reached zero: onDrain
                    let mut state = inner.state.lock().unwrap();
                    if *state == LegState::Stalled {
                        *state = LegState::Active;
                    }
                    drop(state);
                    inner.idle.arm();
                    let _ = signal_tx.send(CoordinatorSignal::Unstuck(index));
                }
                Ok::<Bytes, std::io::Error>(bytes)
            }
            BufMsg::Abort(message) => Err(std::io::Error::other(message)),
        });

        let result = self.send_request(client, declared_size, stream).await;

        *self.inner.state.lock().unwrap() = LegState::Done;
        self.inner.idle.clear();

        self.build_result(declared_size, result)
    }

    async fn send_request(
        &self,
        client: Client,
        declared_size: u64,
        stream: impl futures::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
    ) -> Result<(reqwest::StatusCode, String), LegError> {
        let file_name = self
            .inner
            .file_name
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| "download".to_string());

        let mut headers = HeaderMap::new();
        for (key, value) in &self.config.headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            }
        }
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        }

        let body = reqwest::Body::wrap_stream(stream);

        let request = match self.config.method {
            UploadMethod::Put => {
                headers.insert(CONTENT_LENGTH, HeaderValue::from(declared_size));
                client
                    .put(&self.config.upload_url)
                    .headers(headers)
                    .body(body)
            }
            UploadMethod::Post => {
                let part = multipart::Part::stream_with_length(body, declared_size)
                    .file_name(file_name);
                let form = multipart::Form::new().part("file", part);
                client
                    .post(&self.config.upload_url)
                    .headers(headers)
                    .multipart(form)
            }
        };

        let send = async {
            let response = request.send().await.map_err(LegError::from)?;
            let status = response.status();
            let text = response.text().await.map_err(LegError::from)?;
            Ok((status, text))
        };

        tokio::select! {
            result = send => result,
            _ = self.inner.cancel.cancelled() => {
                if self.inner.idle.timed_out() {
                    Err(LegError::IdleTimeout)
                } else {
                    Err(LegError::Cancelled("leg cancelled".to_string()))
                }
            }
        }
    }

    fn build_result(
        &self,
        declared_size: u64,
        outcome: Result<(reqwest::StatusCode, String), LegError>,
    ) -> UploadResult {
        let file_name = self.inner.file_name.lock().unwrap().clone();
        let uploaded_bytes = self.uploaded_bytes();
        let random_bytes_count = if self.config.random_bytes_count > 0 {
            Some(self.config.random_bytes_count)
        } else {
            None
        };

        match outcome {
            Ok((_status, text)) => {
                let md5 = self.inner.final_md5.lock().unwrap().clone();
                let response = serde_json::from_str::<serde_json::Value>(&text)
                    .map(UploadResponse::Json)
                    .unwrap_or(UploadResponse::Text(text));

                UploadResult {
                    upload_url: self.config.upload_url.clone(),
                    file_name,
                    size: declared_size,
                    uploaded_byes: uploaded_bytes,
                    random_bytes_count,
                    md5,
                    response: Some(response),
                    error: None,
                }
            }
            Err(err) => {
                *self.inner.final_error.lock().unwrap() = Some(err.clone());
                UploadResult {
                    upload_url: self.config.upload_url.clone(),
                    file_name,
                    size: declared_size,
                    uploaded_byes: uploaded_bytes,
                    random_bytes_count,
                    md5: None,
                    response: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }
}
