//! Retry classification and backoff for the Transmitter.
//!
//! There is no bounded-attempts cap: the Transmitter pauses itself and
//! reschedules the same job at the head of the queue, so only a growing
//! backoff bounds how often it retries. The backoff resets on success.

use rand::Rng;
use std::time::Duration;

/// Outcome classification for one completed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitStatus {
    Success,
    TemporaryFailure,
    PermanentFailure,
}

/// Classify an HTTP status code. 2xx is success; 5xx, 429 (rate limited),
/// and 408 (request timeout) are temporary transport-level failures worth
/// retrying; every other 4xx (and unexpected 1xx/3xx) is a permanent
/// rejection of that specific payload.
pub fn classify_status(code: u16) -> TransmitStatus {
    match code {
        200..=299 => TransmitStatus::Success,
        408 | 429 => TransmitStatus::TemporaryFailure,
        500..=599 => TransmitStatus::TemporaryFailure,
        _ => TransmitStatus::PermanentFailure,
    }
}

/// Network/timeout/connect failures are always temporary.
pub fn classify_transport_error() -> TransmitStatus {
    TransmitStatus::TemporaryFailure
}

/// Exponential backoff with jitter, bounded `[min, max]` (spec §4.4: "30s ->
/// 1h"). The counter resets on any `Success`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    failures: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(30),
            max: Duration::from_secs(3600),
            failures: 0,
        }
    }
}

impl Backoff {
    #[cfg(test)]
    pub(crate) fn with_bounds(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            failures: 0,
        }
    }

    /// Record a temporary failure and return the delay before the next
    /// attempt: exponential growth from `min`, capped at `max`, with up to
    /// ±20% jitter so many clients don't retry in lockstep.
    pub fn next_delay(&mut self) -> Duration {
        let pow = 2u64.saturating_pow(self.failures);
        self.failures = self.failures.saturating_add(1);
        let base_millis = self
            .min
            .as_millis()
            .saturating_mul(pow as u128)
            .min(self.max.as_millis());
        let base_millis = base_millis as u64;
        let jitter_span = base_millis / 5; // ±20%
        let jitter = if jitter_span == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=2 * jitter_span) as i64 - jitter_span as i64
        };
        let millis = (base_millis as i64 + jitter).max(self.min.as_millis() as i64) as u64;
        Duration::from_millis(millis.min(self.max.as_millis() as u64))
    }

    /// Reset the backoff counter. Called on any `Success`.
    pub fn reset(&mut self) {
        self.failures = 0;
    }
}
