//! Append-only per-segment message buffer.
//!
//! On-disk format: a stream of length-prefixed JSON records — a 4-byte
//! little-endian `u32` byte length, followed by that many bytes of
//! `serde_json`-encoded [`LogRecord`]. This framing is what makes
//! partial-write recovery well-defined: a crash mid-write leaves at most
//! one truncated trailing frame, which recovery discards, leaving every
//! record before it intact.

use crate::error::IoError;
use crate::record::LogRecord;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// A length prefix this wide bounds a single record to 4 GiB, far beyond
/// any reasonable log message.
const LENGTH_PREFIX_BYTES: usize = 4;

/// One on-disk segment of log records belonging to exactly one Session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Buffer {
    pub session_uuid: String,
    pub sequence_number: i64,
    pub path: PathBuf,
    pub bytes_buffered: u64,
    pub frozen: bool,
}

impl Buffer {
    /// Allocate a buffer file path under `dir`, named `{session_uuid}-{seq}`.
    pub fn create(dir: &Path, session_uuid: &str, sequence_number: i64) -> Result<Self, IoError> {
        fs::create_dir_all(dir)
            .map_err(|e| IoError::Write(dir.to_path_buf(), e))?;
        let path = dir.join(format!("{session_uuid}-{sequence_number}"));
        // Touch the file so it exists even before the first append.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| IoError::Write(path.clone(), e))?;
        Ok(Self {
            session_uuid: session_uuid.to_string(),
            sequence_number,
            path,
            bytes_buffered: 0,
            frozen: false,
        })
    }

    /// Reconstruct a `Buffer` handle from a persisted manifest entry, without
    /// touching the file (used when loading state from the `StateStore`).
    pub fn from_manifest(
        session_uuid: String,
        sequence_number: i64,
        path: PathBuf,
        bytes_buffered: u64,
        frozen: bool,
    ) -> Self {
        Self {
            session_uuid,
            sequence_number,
            path,
            bytes_buffered,
            frozen,
        }
    }

    /// Serialize `record` with length-prefixed framing and append it to the
    /// backing file. Updates `bytes_buffered` by the serialized length
    /// *after* a successful write, so a distrusted persisted count can
    /// always be recomputed by rescanning.
    ///
    /// Failing a write is an `IoError`: the record is lost but the
    /// Buffer remains usable — the caller does not propagate this as fatal.
    pub fn append(&mut self, record: &LogRecord) -> Result<(), IoError> {
        if self.frozen {
            // Appending after freeze is a programmer error. Callers are
            // expected to check `frozen` first; this is a last-resort guard,
            // not the primary contract.
            tracing::error!(path = %self.path.display(), "append called on frozen buffer");
            return Err(IoError::Write(
                self.path.clone(),
                std::io::Error::other("buffer is frozen"),
            ));
        }

        let payload = serde_json::to_vec(record).map_err(|e| {
            IoError::Write(self.path.clone(), std::io::Error::other(e.to_string()))
        })?;
        let len = payload.len() as u32;

        let mut file = OpenOptions::new()
            .append(true)
            .open(&self.path)
            .map_err(|e| IoError::Write(self.path.clone(), e))?;
        file.write_all(&len.to_le_bytes())
            .and_then(|_| file.write_all(&payload))
            .map_err(|e| IoError::Write(self.path.clone(), e))?;

        self.bytes_buffered += (LENGTH_PREFIX_BYTES + payload.len()) as u64;
        Ok(())
    }

    /// Mark frozen. Idempotent.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Read the full buffer contents for upload. The spec calls for a
    /// "one-shot stream ... the caller consumes it once"; buffer sizes are
    /// bounded by `autoFlushThreshold` (default 64 KiB), small enough that
    /// reading fully into memory before handing it to the HTTP client is
    /// simpler than a true streaming reader and carries no meaningful cost.
    pub fn read_contents(&self) -> Result<Vec<u8>, IoError> {
        fs::read(&self.path).map_err(|e| IoError::Read(self.path.clone(), e))
    }

    /// Unlink the backing file. Idempotent against an already-missing file.
    pub fn delete(&self) -> Result<(), IoError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IoError::Write(self.path.clone(), e)),
        }
    }

    /// Rescan the backing file frame-by-frame and return the byte offset at
    /// which the stream stops being well-formed (a complete run of whole
    /// frames). Used by startup recovery to truncate a tail buffer that was
    /// mid-write when the process died, discarding at most one trailing
    /// partial record.
    pub fn recover_valid_length(path: &Path) -> Result<u64, IoError> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(IoError::Read(path.to_path_buf(), e)),
        };
        let mut offset: u64 = 0;
        loop {
            let mut len_buf = [0u8; LENGTH_PREFIX_BYTES];
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(IoError::Read(path.to_path_buf(), e)),
            }
            let record_len = u32::from_le_bytes(len_buf) as u64;
            let mut body = vec![0u8; record_len as usize];
            match file.read_exact(&mut body) {
                Ok(()) => {
                    offset += LENGTH_PREFIX_BYTES as u64 + record_len;
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(IoError::Read(path.to_path_buf(), e)),
            }
        }
        Ok(offset)
    }

    /// Truncate the backing file to `recover_valid_length`'s result and
    /// reset `bytes_buffered` to match. Called once at startup recovery for
    /// any buffer whose owning Session lacked `endPosted` (abnormal end).
    pub fn recover(&mut self) -> Result<(), IoError> {
        let valid_len = Self::recover_valid_length(&self.path)?;
        let file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .map_err(|e| IoError::Write(self.path.clone(), e))?;
        file.set_len(valid_len)
            .map_err(|e| IoError::Write(self.path.clone(), e))?;
        self.bytes_buffered = valid_len;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    #[test]
    fn append_updates_byte_count_monotonically() {
        let dir = TestTempDir::new("buffer");
        let mut buf = Buffer::create(dir.path(), "sess-1", 1).unwrap();
        assert_eq!(buf.bytes_buffered, 0);
        buf.append(&LogRecord::new("hello")).unwrap();
        let after_one = buf.bytes_buffered;
        assert!(after_one > 0);
        buf.append(&LogRecord::new("world")).unwrap();
        assert!(buf.bytes_buffered > after_one);
    }

    #[test]
    fn freeze_is_idempotent() {
        let dir = TestTempDir::new("buffer");
        let mut buf = Buffer::create(dir.path(), "sess-1", 1).unwrap();
        buf.freeze();
        buf.freeze();
        assert!(buf.frozen);
    }

    #[test]
    fn append_after_freeze_is_rejected() {
        let dir = TestTempDir::new("buffer");
        let mut buf = Buffer::create(dir.path(), "sess-1", 1).unwrap();
        buf.freeze();
        assert!(buf.append(&LogRecord::new("too late")).is_err());
    }

    #[test]
    fn delete_is_idempotent_against_missing_file() {
        let dir = TestTempDir::new("buffer");
        let buf = Buffer::create(dir.path(), "sess-1", 1).unwrap();
        buf.delete().unwrap();
        buf.delete().unwrap();
    }

    #[test]
    fn read_contents_round_trips_appended_bytes() {
        let dir = TestTempDir::new("buffer");
        let mut buf = Buffer::create(dir.path(), "sess-1", 1).unwrap();
        buf.append(&LogRecord::new("a")).unwrap();
        buf.append(&LogRecord::new("b")).unwrap();
        let contents = buf.read_contents().unwrap();
        assert_eq!(contents.len() as u64, buf.bytes_buffered);
    }

    #[test]
    fn recover_discards_truncated_trailing_record() {
        let dir = TestTempDir::new("buffer");
        let mut buf = Buffer::create(dir.path(), "sess-1", 1).unwrap();
        buf.append(&LogRecord::new("whole record")).unwrap();
        let whole_len = buf.bytes_buffered;

        // Simulate a crash mid-write: append a length prefix claiming more
        // bytes than are actually present.
        {
            let mut file = OpenOptions::new().append(true).open(&buf.path).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(b"short").unwrap();
        }

        buf.recover().unwrap();
        assert_eq!(buf.bytes_buffered, whole_len);
        let contents = buf.read_contents().unwrap();
        assert_eq!(contents.len() as u64, whole_len);
    }

    #[test]
    fn recover_on_fully_intact_file_is_a_no_op() {
        let dir = TestTempDir::new("buffer");
        let mut buf = Buffer::create(dir.path(), "sess-1", 1).unwrap();
        buf.append(&LogRecord::new("one")).unwrap();
        buf.append(&LogRecord::new("two")).unwrap();
        let before = buf.bytes_buffered;
        buf.recover().unwrap();
        assert_eq!(buf.bytes_buffered, before);
    }

    #[cfg(feature = "fuzz-tests")]
    mod prop_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn append_then_recover_never_loses_a_whole_record(
                messages in proptest::collection::vec(
                    proptest::string::string_regex("[ -~]{0,40}").expect("regex"),
                    0..12
                )
            ) {
                let dir = TestTempDir::new("buffer-prop");
                let mut buf = Buffer::create(dir.path(), "sess-prop", 1).unwrap();
                for message in &messages {
                    buf.append(&LogRecord::new(message)).unwrap();
                }
                let before = buf.bytes_buffered;

                // An intact file recovers to exactly its own byte count: no
                // well-formed record is ever mistaken for a truncated one.
                buf.recover().unwrap();
                prop_assert_eq!(buf.bytes_buffered, before);
                let contents = buf.read_contents().unwrap();
                prop_assert_eq!(contents.len() as u64, before);
            }
        }
    }
}
