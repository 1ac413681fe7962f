//! Session lifecycle state machine: the Active/Suspended/Ended/Invalid
//! states, per-session metadata and timing, and ownership of the ordered
//! Buffer list that tracks what still needs to reach the collector.

use crate::buffer::Buffer;
use crate::error::IoError;
use crate::record::{Fields, LogRecord};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// The four states a Session can be in. Derived from the
/// persisted fields below rather than stored redundantly, so it can never
/// disagree with them after a deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Suspended,
    Ended,
    Invalid,
}

/// One contiguous period of app use, bracketed by begin/end notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub app_token: String,
    pub info: Fields,
    pub user_id: Option<String>,
    pub uuid: String,
    pub begin_millis: u64,
    pub last_activity_millis: u64,
    pub suspended_millis: Option<u64>,
    pub invalid: bool,
    pub end_millis: Option<u64>,
    /// Set when `end()` was called with `abnormal = true` (crash recovery).
    pub abnormal_end: bool,
    pub begin_posted: bool,
    pub end_posted: bool,
    /// Ordered by `sequence_number`; the last entry is the active tail
    /// unless the Session is ended. Invariant: at most one non-frozen
    /// entry at a time.
    pub buffers: Vec<Buffer>,
    pub maximum_buffer_size: u64,
    pub buffer_sequence_number: i64,
}

impl Session {
    /// Create a new Active session. Does not allocate a tail buffer yet —
    /// call [`Session::ensure_tail`] before the first `buffer_message`.
    pub fn new(
        app_token: impl Into<String>,
        info: Fields,
        user_id: Option<String>,
        maximum_buffer_size: u64,
        now_millis: u64,
    ) -> Self {
        Self {
            app_token: app_token.into(),
            info,
            user_id,
            uuid: generate_session_uuid(),
            begin_millis: now_millis,
            last_activity_millis: now_millis,
            suspended_millis: None,
            invalid: false,
            end_millis: None,
            abnormal_end: false,
            begin_posted: false,
            end_posted: false,
            buffers: Vec::new(),
            maximum_buffer_size,
            buffer_sequence_number: 1,
        }
    }

    /// Derive the current lifecycle state from the persisted fields.
    pub fn state(&self) -> SessionState {
        if self.invalid {
            SessionState::Invalid
        } else if self.end_millis.is_some() {
            SessionState::Ended
        } else if self.suspended_millis.is_some() {
            SessionState::Suspended
        } else {
            SessionState::Active
        }
    }

    /// Ensure there is a non-frozen tail buffer to append to, allocating one
    /// under `dir` if the last buffer is missing or frozen. No-op in the
    /// Ended/Invalid states: a Session that is invalid or has ended creates
    /// no further buffers.
    pub fn ensure_tail(&mut self, dir: &Path) -> Result<(), IoError> {
        if matches!(self.state(), SessionState::Ended | SessionState::Invalid) {
            return Ok(());
        }
        let needs_new = match self.buffers.last() {
            Some(tail) => tail.frozen,
            None => true,
        };
        if needs_new {
            let seq = self.buffer_sequence_number;
            let buffer = Buffer::create(dir, &self.uuid, seq)?;
            self.buffers.push(buffer);
            self.buffer_sequence_number += 1;
        }
        Ok(())
    }

    /// Append `record` to the tail buffer, touching `lastActivity` only
    /// while Active. Returns `true` iff the tail buffer's byte
    /// count crossed `maximumBufferSize` as a result of this append — the
    /// signal the Coordinator uses to freeze the tail and allocate a new
    /// one.
    pub fn buffer_message(
        &mut self,
        dir: &Path,
        record: &LogRecord,
        now_millis: u64,
    ) -> Result<bool, IoError> {
        if matches!(self.state(), SessionState::Ended | SessionState::Invalid) {
            tracing::warn!(uuid = %self.uuid, "buffer_message called on ended/invalid session");
            return Ok(false);
        }
        if self.state() == SessionState::Active {
            self.last_activity_millis = now_millis;
        }
        self.ensure_tail(dir)?;
        let Some(tail) = self.buffers.last_mut() else {
            return Ok(false);
        };
        let was_under = tail.bytes_buffered <= self.maximum_buffer_size;
        tail.append(record)?;
        let now_over = tail.bytes_buffered > self.maximum_buffer_size;
        Ok(was_under && now_over)
    }

    /// `endDate - beginDate` if ended, else `now - beginDate`.
    pub fn duration_millis(&self, now_millis: u64) -> u64 {
        let end = self.end_millis.unwrap_or(now_millis);
        end.saturating_sub(self.begin_millis)
    }

    /// `now - suspendedDate` if suspended, else 0.
    pub fn idle_seconds(&self, now_millis: u64) -> u64 {
        match self.suspended_millis {
            Some(suspended) => now_millis.saturating_sub(suspended) / 1000,
            None => 0,
        }
    }

    /// `Active -> Suspended`. Records `suspendedDate`.
    pub fn suspend(&mut self, now_millis: u64) {
        if self.state() == SessionState::Active {
            self.suspended_millis = Some(now_millis);
        }
    }

    /// `Suspended -> Active` iff `(now - suspendedDate) <= idle_timeout`.
    /// Returns `true` when the session continues, `false` when the idle
    /// interval was exceeded (the caller must then `end()` this session and
    /// create a new one).
    pub fn resume(&mut self, now_millis: u64, idle_timeout_secs: u64) -> bool {
        if self.state() != SessionState::Suspended {
            return true;
        }
        if self.idle_seconds(now_millis) <= idle_timeout_secs {
            self.suspended_millis = None;
            self.last_activity_millis = now_millis;
            true
        } else {
            false
        }
    }

    /// `Active|Suspended -> Ended`.
    pub fn end(&mut self, abnormal: bool, now_millis: u64) {
        if self.state() == SessionState::Invalid {
            return;
        }
        self.end_millis = Some(now_millis);
        self.abnormal_end = abnormal;
        if let Some(tail) = self.buffers.last_mut() {
            if !tail.frozen {
                tail.freeze();
            }
        }
    }

    /// `any -> Invalid`. All buffers are discarded by the caller (the
    /// Coordinator deletes their files and clears the list).
    pub fn invalidate(&mut self) {
        self.invalid = true;
    }

    /// Frozen buffers in sequence order, ready to hand to the Transmitter.
    pub fn frozen_buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.buffers.iter().filter(|b| b.frozen)
    }

    /// Remove a buffer (by sequence number) from the list after its upload
    /// has resolved (Success or PermanentFailure).
    pub fn remove_buffer(&mut self, sequence_number: i64) {
        self.buffers.retain(|b| b.sequence_number != sequence_number);
    }

    /// `true` iff `{beginPosted, endPosted, buffers empty}` all hold —
    /// the Session is eligible for deletion.
    pub fn ready_for_cleanup(&self) -> bool {
        self.begin_posted && self.end_posted && self.buffers.is_empty()
    }
}

/// Generate an opaque, unique session identifier. Uses the OS RNG rather
/// than a full RFC 4122 UUID implementation — callers only need uniqueness
/// and opacity, not interoperability with other UUID producers.
pub fn generate_session_uuid() -> String {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    format!(
        "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
        u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
        u16::from_be_bytes(bytes[4..6].try_into().unwrap()),
        u16::from_be_bytes(bytes[6..8].try_into().unwrap()),
        u16::from_be_bytes(bytes[8..10].try_into().unwrap()),
        u64::from_be_bytes([
            0, 0, bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
        ])
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    fn new_session(max_buffer: u64) -> Session {
        Session::new("APP", Fields::new(), None, max_buffer, 1_000)
    }

    #[test]
    fn new_session_is_active() {
        let session = new_session(1024);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn buffer_sequence_numbers_are_dense_and_start_at_one() {
        let dir = TestTempDir::new("session");
        let mut session = new_session(16);
        for i in 0..40 {
            session
                .buffer_message(dir.path(), &LogRecord::new(format!("msg {i}")), 1_000 + i)
                .unwrap();
        }
        let seqs: Vec<i64> = session.buffers.iter().map(|b| b.sequence_number).collect();
        let mut expected: Vec<i64> = (1..=*seqs.iter().max().unwrap()).collect();
        expected.sort();
        let mut actual = seqs.clone();
        actual.sort();
        actual.dedup();
        assert_eq!(actual, expected);
    }

    #[test]
    fn at_most_one_non_frozen_buffer_at_a_time() {
        let dir = TestTempDir::new("session");
        let mut session = new_session(10);
        for i in 0..20 {
            session
                .buffer_message(dir.path(), &LogRecord::new(format!("{i:03}")), 1_000 + i)
                .unwrap();
        }
        let non_frozen = session.buffers.iter().filter(|b| !b.frozen).count();
        assert!(non_frozen <= 1, "found {non_frozen} non-frozen buffers");
    }

    #[test]
    fn threshold_crossing_is_reported_exactly_once_per_buffer() {
        let dir = TestTempDir::new("session");
        let mut session = new_session(30);
        let mut crossings = 0;
        for i in 0..5 {
            if session
                .buffer_message(dir.path(), &LogRecord::new("x".repeat(10)), 1_000 + i)
                .unwrap()
            {
                crossings += 1;
                // Coordinator freezes + reallocates on a crossing signal.
                session.buffers.last_mut().unwrap().freeze();
            }
        }
        assert!(crossings >= 1);
    }

    #[test]
    fn suspend_then_resume_within_timeout_continues_session() {
        let mut session = new_session(1024);
        let uuid_before = session.uuid.clone();
        session.suspend(2_000);
        assert_eq!(session.state(), SessionState::Suspended);
        let continued = session.resume(4_000, 5);
        assert!(continued);
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.uuid, uuid_before);
    }

    #[test]
    fn resume_past_timeout_reports_session_should_end() {
        let mut session = new_session(1024);
        session.suspend(2_000);
        let continued = session.resume(2_000 + 11_000, 5);
        assert!(!continued);
    }

    #[test]
    fn lastactivity_not_touched_while_suspended() {
        let dir = TestTempDir::new("session");
        let mut session = new_session(1024);
        session.suspend(2_000);
        let before = session.last_activity_millis;
        session
            .buffer_message(dir.path(), &LogRecord::new("while suspended"), 9_000)
            .unwrap();
        assert_eq!(session.last_activity_millis, before);
    }

    #[test]
    fn end_freezes_the_tail_buffer() {
        let dir = TestTempDir::new("session");
        let mut session = new_session(1024);
        session
            .buffer_message(dir.path(), &LogRecord::new("hi"), 1_000)
            .unwrap();
        session.end(false, 2_000);
        assert!(session.buffers.last().unwrap().frozen);
        assert_eq!(session.state(), SessionState::Ended);
    }

    #[test]
    fn ready_for_cleanup_requires_both_posted_flags_and_empty_buffers() {
        let mut session = new_session(1024);
        assert!(!session.ready_for_cleanup());
        session.begin_posted = true;
        session.end_posted = true;
        assert!(session.ready_for_cleanup());
    }

    #[test]
    fn invalidate_is_terminal() {
        let mut session = new_session(1024);
        session.invalidate();
        assert_eq!(session.state(), SessionState::Invalid);
        session.suspend(2_000);
        assert_eq!(session.state(), SessionState::Invalid);
    }

    #[test]
    fn generated_uuids_are_unique() {
        let a = generate_session_uuid();
        let b = generate_session_uuid();
        assert_ne!(a, b);
    }
}
