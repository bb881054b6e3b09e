//! The public entry point: wires a source download and its upload legs
//! together through a [`FanoutCoordinator`] and assembles the result.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::task::JoinSet;

use crate::config::{SessionConfig, UploadConfig};
use crate::coordinator::FanoutCoordinator;
use crate::error::{LegError, TransloadError};
use crate::leg::Leg;
use crate::logger::{self, LogLevel};
use crate::result::{LocalSaveResult, TransloadResult, UploadResult};
use crate::source::{self, ProgressCounters, SourceOptions};

/// How often the progress logger task (when a `Logger` is configured)
/// reports `bytesDownloaded`/`contentLength`.
const PROGRESS_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// One download, fanned out to any number of upload destinations.
///
/// Built once with [`Transload::new`] and driven to completion with
/// [`Transload::run`]; a session is single-use.
pub struct Transload {
    download_url: String,
    uploads: Vec<UploadConfig>,
    config: SessionConfig,
}

impl Transload {
    pub fn new(
        download_url: impl Into<String>,
        uploads: Vec<UploadConfig>,
        config: SessionConfig,
    ) -> Self {
        Self { download_url: download_url.into(), uploads, config }
    }

    /// Runs the download, streams it to every upload leg (and, if
    /// configured, a local file), and returns the aggregate result.
    ///
    /// Only a failure to ever receive a single byte from the source
    /// propagates as `Err`; every per-leg failure is instead recorded on
    /// that leg's [`UploadResult::error`].
    pub async fn run(self) -> Result<TransloadResult, TransloadError> {
        let (mut coordinator, signal_tx) = FanoutCoordinator::new();

        let mut legs = Vec::with_capacity(self.uploads.len());
        for (index, upload_config) in self.uploads.into_iter().enumerate() {
            let leg = Leg::new(index, upload_config, self.config.calculate_md5, signal_tx.clone());
            coordinator.add_leg(leg.clone());
            legs.push(leg);
        }
        drop(signal_tx);

        let signal_rx = coordinator.take_signals();
        logger::emit(
            self.config.logger.as_deref(),
            LogLevel::Debug,
            &format!("starting transload with {} upload leg(s)", coordinator.legs().len()),
        );
        let coordinator = Arc::new(coordinator);

        let default_client = self.config.agent.clone().unwrap_or_default();
        let mut join_set = JoinSet::new();
        for leg in &legs {
            let leg = leg.clone();
            let client = leg.agent().unwrap_or_else(|| default_client.clone());
            join_set.spawn(async move {
                let index = leg.index;
                let result = leg.run(client).await;
                (index, result)
            });
        }

        let leg_count = legs.len();
        let coordinator_for_watch = coordinator.clone();
        let watcher = tokio::spawn(async move {
            let mut results: Vec<Option<UploadResult>> = (0..leg_count).map(|_| None).collect();
            while let Some(joined) = join_set.join_next().await {
                let (index, result) = joined.expect("leg task panicked");
                coordinator_for_watch.on_leg_finished(index, result.error.is_some());
                results[index] = Some(result);
            }
            results
        });

        let progress = ProgressCounters::new();
        let progress_handle = self.config.logger.clone().map(|logger| {
            let progress = progress.clone();
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let downloaded = progress.bytes_downloaded.load(Ordering::Relaxed);
                    let size = progress.content_length.load(Ordering::Relaxed);
                    logger::emit(
                        Some(logger.as_ref()),
                        LogLevel::Info,
                        &format!("progress: {downloaded}/{size} bytes downloaded"),
                    );
                    for leg in coordinator.legs() {
                        logger::emit(
                            Some(logger.as_ref()),
                            LogLevel::Debug,
                            &format!(
                                "leg {}: {}/{} bytes uploaded",
                                leg.index,
                                leg.uploaded_bytes(),
                                leg.declared_size(),
                            ),
                        );
                    }
                }
            })
        });

        let source_result = source::run(
            &self.download_url,
            self.config.agent.clone(),
            &coordinator,
            signal_rx,
            SourceOptions {
                calculate_md5: self.config.calculate_md5,
                save_to_local_path: self.config.save_to_local_path.as_deref(),
                logger: self.config.logger.as_deref(),
            },
            progress,
        )
        .await;

        if let Some(handle) = progress_handle {
            handle.abort();
        }

        // A source that never opened leaves every leg parked waiting on a
        // `setSize` that will never arrive; abort them so their `run()`
        // tasks settle and this call can actually return the error.
        if let Err(ref err) = source_result {
            coordinator.abort_all(LegError::SourceUnavailable(err.to_string()));
        }

        let upload_results = watcher.await.expect("leg watcher task panicked");
        let uploads: Vec<UploadResult> = upload_results
            .into_iter()
            .map(|r| r.expect("every spawned leg reports exactly one result"))
            .collect();

        let outcome = source_result?;

        Ok(TransloadResult {
            url: self.download_url,
            size: outcome.content_length,
            filename: outcome.filename,
            md5: outcome.md5,
            local: outcome.local.map(|(path, size)| LocalSaveResult { path, size }),
            uploads,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_accepts_no_uploads() {
        let session = Transload::new("http://example.invalid/f", Vec::new(), SessionConfig::new());
        assert_eq!(session.uploads.len(), 0);
    }
}
