//! The caller-supplied logger is an external, opaque collaborator: the
//! session only ever calls `log`, never inspects or owns the sink.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(s)
    }
}

/// A sink the caller plugs in for session-lifetime diagnostics.
///
/// This is distinct from the crate's own `tracing` instrumentation: the
/// two are independent. A caller that never sets a `Logger` still gets
/// `tracing` events; a caller that sets one gets both.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

pub(crate) fn emit(logger: Option<&dyn Logger>, level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{message}"),
        LogLevel::Info => tracing::info!("{message}"),
        LogLevel::Warn => tracing::warn!("{message}"),
        LogLevel::Error => tracing::error!("{message}"),
    }
    if let Some(logger) = logger {
        logger.log(level, message);
    }
}
