use thiserror::Error;

/// The one category of failure `Transload::run` can return as an `Err`.
///
/// Every other failure mode is recorded on the affected leg instead of
/// unwinding the whole session; see [`crate::result::UploadResult::error`].
#[derive(Error, Debug, Clone)]
pub enum TransloadError {
    /// The initial GET against the source never produced a body: DNS
    /// failure, connection refused, TLS error, or the request itself
    /// erroring before any bytes arrived.
    #[error("failed to open source: {0}")]
    SourceOpen(String),
}

/// Per-leg failure taxonomy. Never escapes `Transload::run` as an `Err`;
/// it is recorded on the owning [`crate::leg::Leg`] and surfaced through
/// [`crate::result::UploadResult::error`].
#[derive(Error, Debug, Clone)]
pub enum LegError {
    /// The source body errored mid-transfer; every live leg is aborted
    /// with this reason.
    #[error("source stream error: {0}")]
    SourceStream(String),

    /// The source never opened at all; every leg is aborted so its
    /// `run()` task settles instead of waiting forever on a `setSize`
    /// that will never come.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The leg's own HTTP request failed (connection reset, non-2xx is
    /// *not* included here -- see the open question in the design notes).
    #[error("upload request failed: {0}")]
    LegHttp(String),

    /// No forward progress on an `Active` leg for 60 seconds.
    #[error("idle timeout: no forward progress for 60s")]
    IdleTimeout,

    /// The caller (or a session-wide cancellation) aborted the leg.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Writing to the local save path failed.
    #[error("local save failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for LegError {
    fn from(err: std::io::Error) -> Self {
        LegError::Io(err.to_string())
    }
}

impl From<reqwest::Error> for LegError {
    fn from(err: reqwest::Error) -> Self {
        LegError::LegHttp(err.to_string())
    }
}
