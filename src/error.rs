//! Unified error types for the agent core.
//!
//! `IoError`, `TransportError`, `ProtocolError`, and `StateError` (corrupt
//! or unreadable state document) each carry enough context to log and
//! recover without propagating further, plus a top-level `CentauriError`
//! carrying a `Programmer` variant for invariant violations that must not
//! crash the host app.

use std::fmt;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or parsing configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// IoError — local disk failures (state document, buffer files)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IoError {
    Read(std::path::PathBuf, std::io::Error),
    Write(std::path::PathBuf, std::io::Error),
    Rename(std::path::PathBuf, std::path::PathBuf, std::io::Error),
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read(path, e) => write!(f, "failed to read {}: {e}", path.display()),
            Self::Write(path, e) => write!(f, "failed to write {}: {e}", path.display()),
            Self::Rename(from, to, e) => write!(
                f,
                "failed to rename {} -> {}: {e}",
                from.display(),
                to.display()
            ),
        }
    }
}

impl std::error::Error for IoError {}

// ---------------------------------------------------------------------------
// TransportError — network/transport failures (timeouts, connect, 5xx)
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum TransportError {
    Http(reqwest::Error),
    Status { code: u16, body: String },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(e) => write!(f, "transport: {e}"),
            Self::Status { code, body } => write!(f, "server error {code}: {body}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e)
    }
}

// ---------------------------------------------------------------------------
// ProtocolError — permanent 4xx rejection from the collector
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ProtocolError {
    pub code: u16,
    pub body: String,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rejected with status {}: {}", self.code, self.body)
    }
}

impl std::error::Error for ProtocolError {}

// ---------------------------------------------------------------------------
// StateError — the spec's "CorruptState": persisted document unreadable
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StateError {
    Io(std::io::Error),
    Corrupt(serde_json::Error),
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Corrupt(e) => write!(f, "corrupt state document: {e}"),
        }
    }
}

impl std::error::Error for StateError {}

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Corrupt(e)
    }
}

// ---------------------------------------------------------------------------
// CentauriError — top-level
// ---------------------------------------------------------------------------

/// Top-level error type for the agent core.
#[derive(Debug)]
pub enum CentauriError {
    Config(ConfigError),
    Io(IoError),
    Transport(TransportError),
    Protocol(ProtocolError),
    State(StateError),
    /// An invariant was violated (e.g. append to a frozen buffer, a reused
    /// session UUID). Fatal to the offending subsystem, never to the host
    /// app: the caller logs this via `tracing::error!` and self-disables.
    Programmer(String),
}

impl fmt::Display for CentauriError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Protocol(e) => write!(f, "protocol: {e}"),
            Self::State(e) => write!(f, "state: {e}"),
            Self::Programmer(msg) => write!(f, "programmer error: {msg}"),
        }
    }
}

impl std::error::Error for CentauriError {}

impl From<ConfigError> for CentauriError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<IoError> for CentauriError {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

impl From<TransportError> for CentauriError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

impl From<ProtocolError> for CentauriError {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<StateError> for CentauriError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}
