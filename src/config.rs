use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

use crate::logger::Logger;

/// HTTP method used for an upload leg's outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadMethod {
    #[default]
    Post,
    Put,
}

/// Immutable configuration for a single upload destination.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub upload_url: String,
    pub method: UploadMethod,
    pub file_name: Option<String>,
    pub random_bytes_count: u32,
    pub headers: HashMap<String, String>,
    pub agent: Option<Client>,
}

impl UploadConfig {
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            upload_url: upload_url.into(),
            method: UploadMethod::Post,
            file_name: None,
            random_bytes_count: 0,
            headers: HashMap::new(),
            agent: None,
        }
    }

    pub fn method(mut self, method: UploadMethod) -> Self {
        self.method = method;
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn random_bytes_count(mut self, count: u32) -> Self {
        self.random_bytes_count = count;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn agent(mut self, client: Client) -> Self {
        self.agent = Some(client);
        self
    }
}

/// Immutable, session-wide options.
#[derive(Clone, Default)]
pub struct SessionConfig {
    pub save_to_local_path: Option<String>,
    pub calculate_md5: bool,
    pub logger: Option<Arc<dyn Logger>>,
    pub agent: Option<Client>,
}

impl std::fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionConfig")
            .field("save_to_local_path", &self.save_to_local_path)
            .field("calculate_md5", &self.calculate_md5)
            .field("logger", &self.logger.is_some())
            .field("agent", &self.agent.is_some())
            .finish()
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_to_local_path(mut self, path: impl Into<String>) -> Self {
        self.save_to_local_path = Some(path.into());
        self
    }

    pub fn calculate_md5(mut self, enabled: bool) -> Self {
        self.calculate_md5 = enabled;
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn agent(mut self, client: Client) -> Self {
        self.agent = Some(client);
        self
    }
}

/// The default User-Agent used for both the source GET and any upload leg
/// that doesn't supply its own `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36";

/// Bound on a leg's buffered-but-not-yet-uploaded bytes before it signals
/// `stuck` back to the coordinator.
pub const BUFFER_CAP: u64 = 20 * 1024 * 1024;

/// Per-leg inactivity window before an `Active` leg is aborted.
pub const IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);
