//! Configuration data model.
//!
//! `userInfoBlock` is modeled as a boxed closure rather than a deserializable
//! field — it is host code supplied at build time, never loaded from a file
//! or environment variable.

use crate::record::Fields;
use std::path::PathBuf;
use std::sync::Arc;

use super::defaults::{
    DEFAULT_AUTO_FLUSH_THRESHOLD_BYTES, DEFAULT_BASE_URL, DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
    DEFAULT_TEE_TO_SYSTEM_LOG, DEFAULT_USE_HTTPS,
};

/// Hook invoked on the caller's thread for every `log()` call to augment the
/// record with additional fields. Must be re-entrancy-safe and must not
/// itself log.
pub type UserInfoBlock = Arc<dyn Fn(&mut Fields) + Send + Sync>;

/// Top-level agent configuration.
#[derive(Clone)]
pub struct Config {
    /// Directory the agent persists state and buffer files under.
    pub directory: PathBuf,
    /// Associated with each new Session.
    pub user_id: Option<String>,
    /// Selects `https://` vs `http://` for upload URLs.
    pub use_https: bool,
    /// Collector host (without scheme), e.g. `collector.example.com`.
    pub base_url: String,
    /// Extra HTTP headers applied to every Transmitter request.
    pub headers: Vec<(String, String)>,
    /// Maximum suspend interval for which `resume` continues the prior
    /// session.
    pub session_idle_timeout_secs: u64,
    /// Tail-buffer byte count that triggers freeze + flush.
    pub auto_flush_threshold_bytes: u64,
    /// Delegated to the frontend; not consulted by the core itself.
    pub tee_to_system_log: bool,
    /// Copied into each new Session's metadata. Underscored keys may be
    /// overwritten by the agent.
    pub session_info: Fields,
    /// Invoked by the frontend on each log call to augment the record.
    pub user_info_block: Option<UserInfoBlock>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("directory", &self.directory)
            .field("user_id", &self.user_id)
            .field("use_https", &self.use_https)
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("session_idle_timeout_secs", &self.session_idle_timeout_secs)
            .field(
                "auto_flush_threshold_bytes",
                &self.auto_flush_threshold_bytes,
            )
            .field("tee_to_system_log", &self.tee_to_system_log)
            .field("session_info", &self.session_info)
            .field(
                "user_info_block",
                &self.user_info_block.as_ref().map(|_| "<closure>"),
            )
            .finish()
    }
}

impl Config {
    /// Resolved upload base URL, e.g. `https://collector.example.com`.
    pub fn upload_base_url(&self) -> String {
        let scheme = if self.use_https { "https" } else { "http" };
        format!("{scheme}://{}", self.base_url)
    }

    /// Start a [`ConfigBuilder`] rooted at `directory`.
    pub fn builder(directory: impl Into<PathBuf>) -> ConfigBuilder {
        ConfigBuilder::new(directory)
    }
}

/// Builder for [`Config`]. The primary construction path for an embedded
/// SDK: host apps set only the fields they care about, with documented
/// defaults filling in the rest.
pub struct ConfigBuilder {
    inner: Config,
}

impl ConfigBuilder {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            inner: Config {
                directory: directory.into(),
                user_id: None,
                use_https: DEFAULT_USE_HTTPS,
                base_url: DEFAULT_BASE_URL.to_string(),
                headers: Vec::new(),
                session_idle_timeout_secs: DEFAULT_SESSION_IDLE_TIMEOUT_SECS,
                auto_flush_threshold_bytes: DEFAULT_AUTO_FLUSH_THRESHOLD_BYTES,
                tee_to_system_log: DEFAULT_TEE_TO_SYSTEM_LOG,
                session_info: Fields::new(),
                user_info_block: None,
            },
        }
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.inner.user_id = Some(user_id.into());
        self
    }

    pub fn use_https(mut self, use_https: bool) -> Self {
        self.inner.use_https = use_https;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.inner.base_url = base_url.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.headers.push((name.into(), value.into()));
        self
    }

    pub fn session_idle_timeout_secs(mut self, secs: u64) -> Self {
        self.inner.session_idle_timeout_secs = secs;
        self
    }

    pub fn auto_flush_threshold_bytes(mut self, bytes: u64) -> Self {
        self.inner.auto_flush_threshold_bytes = bytes;
        self
    }

    pub fn tee_to_system_log(mut self, tee: bool) -> Self {
        self.inner.tee_to_system_log = tee;
        self
    }

    pub fn session_info(mut self, info: Fields) -> Self {
        self.inner.session_info = info;
        self
    }

    pub fn user_info_block<F>(mut self, block: F) -> Self
    where
        F: Fn(&mut Fields) + Send + Sync + 'static,
    {
        self.inner.user_info_block = Some(Arc::new(block));
        self
    }

    pub fn build(self) -> Config {
        self.inner
    }
}
