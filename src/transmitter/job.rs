//! Transmitter job definitions: a JSON or raw-byte request job, and a
//! no-op marker job used to sequence "run this after everything queued
//! ahead of it resolves."

use super::retry::TransmitStatus;

/// Invoked once a `Request` job resolves to a terminal outcome (`Success` or
/// `PermanentFailure`). Never invoked for a `TemporaryFailure` — the job is
/// requeued instead.
pub type Completion = Box<dyn FnOnce(TransmitStatus) + Send>;

/// Invoked when a `Marker` job is reached, i.e. once every job enqueued
/// ahead of it has resolved.
pub type MarkerCompletion = Box<dyn FnOnce() + Send>;

/// Body of an upload request: a JSON parameter mapping, or a raw byte stream
/// (a frozen buffer's contents).
#[derive(Debug, Clone)]
pub enum RequestBody {
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

/// One unit of work on the Transmitter's FIFO queue.
pub enum Job {
    /// An HTTP request against `<base_url><path>`.
    Request {
        method: reqwest::Method,
        path: String,
        body: RequestBody,
        completion: Completion,
    },
    /// A no-op that only invokes its callback once it reaches the front of
    /// the queue — used to sequence "run this after every prior upload
    /// settles" without blocking on a specific request's completion.
    Marker { completion: MarkerCompletion },
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::Request { method, path, .. } => f
                .debug_struct("Request")
                .field("method", method)
                .field("path", path)
                .finish(),
            Job::Marker { .. } => f.debug_struct("Marker").finish(),
        }
    }
}
