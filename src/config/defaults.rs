//! Default configuration constants.

/// `sessionIdleTimeout` default: 5 minutes.
pub const DEFAULT_SESSION_IDLE_TIMEOUT_SECS: u64 = 300;

/// `autoFlushThreshold` default: 64 KiB.
pub const DEFAULT_AUTO_FLUSH_THRESHOLD_BYTES: u64 = 65536;

/// `useHTTPS` default: plain HTTP.
pub const DEFAULT_USE_HTTPS: bool = false;

/// `teeToSystemLog` default: on (delegated to the frontend; the core only
/// carries the flag through).
pub const DEFAULT_TEE_TO_SYSTEM_LOG: bool = true;

/// Default collector host used when a host app has not set one explicitly.
/// Demo/dev convenience only; production embedders always set this.
pub const DEFAULT_BASE_URL: &str = "localhost:8080";
