use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use md5::{Digest, Md5};
use reqwest::header::USER_AGENT;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::config::DEFAULT_USER_AGENT;
use crate::coordinator::FanoutCoordinator;
use crate::error::{LegError, TransloadError};
use crate::filename;
use crate::leg::CoordinatorSignal;
use crate::logger::{self, LogLevel, Logger};

/// Everything the source reader learned about the download, handed back
/// to the session for result assembly.
pub struct SourceOutcome {
    pub content_length: u64,
    pub filename: String,
    pub md5: Option<String>,
    pub local: Option<(String, u64)>,
}

/// Shared counters the session's progress-logger task polls; owned here so
/// `run` doesn't need a callback to report interim progress.
#[derive(Clone)]
pub struct ProgressCounters {
    pub bytes_downloaded: Arc<AtomicU64>,
    pub content_length: Arc<AtomicU64>,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self { bytes_downloaded: Arc::new(AtomicU64::new(0)), content_length: Arc::new(AtomicU64::new(0)) }
    }
}

/// The session-level knobs that affect how the source reader pumps bytes,
/// grouped so `run` stays under a sane argument count.
pub struct SourceOptions<'a> {
    pub calculate_md5: bool,
    pub save_to_local_path: Option<&'a str>,
    pub logger: Option<&'a dyn Logger>,
}

/// Opens the download, derives size/filename, and pumps the body into
/// the coordinator (and, optionally, a local file), honoring pause/resume
/// signals from the coordinator's fan-out.
pub async fn run(
    download_url: &str,
    agent: Option<Client>,
    coordinator: &FanoutCoordinator,
    mut signal_rx: mpsc::UnboundedReceiver<CoordinatorSignal>,
    options: SourceOptions<'_>,
    progress: ProgressCounters,
) -> Result<SourceOutcome, TransloadError> {
    let SourceOptions { calculate_md5, save_to_local_path, logger } = options;
    let client = agent.unwrap_or_default();

    let response = client
        .get(download_url)
        .header(USER_AGENT, DEFAULT_USER_AGENT)
        .send()
        .await
        .map_err(|e| TransloadError::SourceOpen(e.to_string()))?;

    // A declared content-length is load-bearing: it becomes each leg's
    // `declaredSize` (sent as `Content-Length`/multipart part length) and
    // the random-suffix math in `Leg::finalize`. A chunked source with no
    // `Content-Length` header is out of scope -- see the design notes.
    let content_length = response
        .content_length()
        .ok_or_else(|| TransloadError::SourceOpen("source did not declare a content-length".to_string()))?;
    let content_disposition = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .map(|v| v.as_bytes().to_vec());
    let derived_filename = filename::derive(download_url, content_disposition.as_deref());

    coordinator.set_filename(&derived_filename);
    coordinator.set_size(content_length);
    progress.content_length.store(content_length, Ordering::Relaxed);

    logger::emit(
        logger,
        LogLevel::Info,
        &format!("source opened: {derived_filename} ({content_length} bytes declared)"),
    );

    let mut local_writer = match save_to_local_path {
        Some(path) => {
            let file = tokio::fs::File::create(path)
                .await
                .map_err(|e| LegError::Io(e.to_string()))
                .map_err(|e| TransloadError::SourceOpen(e.to_string()))?;
            Some((path.to_string(), tokio::io::BufWriter::new(file), 0u64))
        }
        None => None,
    };

    let mut session_hash = if calculate_md5 { Some(Md5::new()) } else { None };
    let mut bytes_downloaded: u64 = 0;
    let mut stalled: HashSet<usize> = HashSet::new();
    let mut completed_normally = false;

    let mut stream = response.bytes_stream();

    'pump: loop {
        // Drain any signals that arrived without blocking the producer.
        while let Ok(signal) = signal_rx.try_recv() {
            if !apply_signal(signal, &mut stalled, save_to_local_path.is_some()) {
                break 'pump;
            }
        }

        if !stalled.is_empty() {
            match signal_rx.recv().await {
                Some(signal) => {
                    if !apply_signal(signal, &mut stalled, save_to_local_path.is_some()) {
                        break 'pump;
                    }
                }
                None => break 'pump,
            }
            continue;
        }

        match stream.next().await {
            Some(Ok(chunk)) => {
                bytes_downloaded += chunk.len() as u64;
                progress.bytes_downloaded.store(bytes_downloaded, Ordering::Relaxed);
                if let Some(hash) = session_hash.as_mut() {
                    hash.update(&chunk);
                }
                coordinator.broadcast(&chunk);
                if let Some((_, writer, written)) = local_writer.as_mut() {
                    if let Err(e) = writer.write_all(&chunk).await {
                        logger::emit(logger, LogLevel::Warn, &format!("local write failed: {e}"));
                    } else {
                        *written += chunk.len() as u64;
                    }
                }
            }
            Some(Err(e)) => {
                logger::emit(logger, LogLevel::Error, &format!("source stream error: {e}"));
                coordinator.abort_all(LegError::SourceStream(e.to_string()));
                break 'pump;
            }
            None => {
                completed_normally = true;
                break 'pump;
            }
        }
    }

    if completed_normally {
        coordinator.finalize_all();
    }

    let md5 = if completed_normally {
        session_hash.map(|h| hex::encode(h.finalize()))
    } else {
        None
    };

    let local = if let Some((path, mut writer, written)) = local_writer {
        let _ = writer.flush().await;
        Some((path, written))
    } else {
        None
    };

    Ok(SourceOutcome { content_length, filename: derived_filename, md5, local })
}

/// Applies one coordinator signal to the pause-tracking set. Returns
/// `false` if the pump loop should stop reading from the source.
fn apply_signal(signal: CoordinatorSignal, stalled: &mut HashSet<usize>, has_local_save: bool) -> bool {
    match signal {
        CoordinatorSignal::Stuck(idx) => {
            stalled.insert(idx);
            true
        }
        CoordinatorSignal::Unstuck(idx) => {
            stalled.remove(&idx);
            true
        }
        CoordinatorSignal::Unusable => {
            if has_local_save {
                stalled.clear();
                true
            } else {
                false
            }
        }
    }
}
