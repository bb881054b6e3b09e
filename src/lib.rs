//! Transload - stream one source download simultaneously to many upload
//! destinations without buffering the whole payload.
//!
//! A single HTTP GET is read once and fanned out to every configured
//! upload leg (and, optionally, a local file) as bytes arrive. Each leg
//! has its own bounded buffer and idle timeout, so a slow or broken
//! destination applies backpressure to the source read instead of the
//! whole session.
//!
//! ```no_run
//! use transload::{SessionConfig, Transload, UploadConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let result = Transload::new(
//!     "https://example.com/file.bin",
//!     vec![UploadConfig::new("https://upload.example.com/put")],
//!     SessionConfig::new().calculate_md5(true),
//! )
//! .run()
//! .await?;
//! println!("{} bytes transferred", result.size);
//! # Ok(())
//! # }
//! ```

mod config;
mod coordinator;
mod error;
mod filename;
mod leg;
mod logger;
mod result;
mod session;
mod source;

pub use config::{SessionConfig, UploadConfig, UploadMethod};
pub use error::{LegError, TransloadError};
pub use logger::{LogLevel, Logger};
pub use result::{LocalSaveResult, TransloadResult, UploadResponse, UploadResult};
pub use session::Transload;
