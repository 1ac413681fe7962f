//! Persistent State Store.
//!
//! Holds a single serialized document: the ordered list of known Sessions
//! with their Buffers' manifests (paths, sequence numbers, sizes, frozen
//! flag) — not the buffer contents themselves, which live in their own
//! files.
//!
//! Saves are atomic: write to a sibling temp path, then rename, so a crash
//! mid-write cannot corrupt the previously-saved state.

use crate::error::StateError;
use crate::session::Session;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// On-disk filename for the state document, inside the agent directory.
const STATE_FILE_NAME: &str = "centauri-state.json";

/// On-disk schema version, bumped if the document shape changes.
const STATE_FILE_VERSION: u32 = 1;

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct StateDocument {
    #[serde(default)]
    version: u32,
    #[serde(default)]
    sessions: Vec<Session>,
}

/// Abstraction over where the Session list is durably kept. Queried once at
/// startup and written after every state-mutating event.
pub trait StateStore: Send + Sync {
    /// Returns an empty list if no prior state; never errors on a missing
    /// directory (creates it as needed).
    fn load(&self) -> Result<Vec<Session>, StateError>;

    /// Atomically replace the state document.
    fn save(&self, sessions: &[Session]) -> Result<(), StateError>;
}

/// Production implementation: a JSON document under the agent directory,
/// written via a sibling temp file and an atomic rename so a crash during
/// `save` cannot corrupt the previously-saved state.
pub struct FileStateStore {
    directory: PathBuf,
}

impl FileStateStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn state_path(&self) -> PathBuf {
        self.directory.join(STATE_FILE_NAME)
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Vec<Session>, StateError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.state_path();
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StateError::Io(e)),
        };
        match serde_json::from_str::<StateDocument>(&text) {
            Ok(doc) => Ok(doc.sessions),
            Err(e) => {
                // CorruptState: treated as empty, a fresh state is
                // started. The caller is expected to run an orphan sweep
                // afterward since buffer files referencing the lost state
                // may remain on disk.
                tracing::error!(
                    path = %path.display(),
                    error = %e,
                    "state document is corrupt; starting from empty state"
                );
                Ok(Vec::new())
            }
        }
    }

    fn save(&self, sessions: &[Session]) -> Result<(), StateError> {
        fs::create_dir_all(&self.directory)?;
        let path = self.state_path();
        let tmp_path = path.with_extension("json.tmp");
        let doc = StateDocument {
            version: STATE_FILE_VERSION,
            sessions: sessions.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&doc)?;
        fs::write(&tmp_path, json)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// In-memory test double for exercising Session/Coordinator logic without
/// touching the filesystem.
#[derive(Default)]
pub struct InMemoryStateStore {
    sessions: Mutex<Vec<Session>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for InMemoryStateStore {
    fn load(&self) -> Result<Vec<Session>, StateError> {
        Ok(self.sessions.lock().unwrap().clone())
    }

    fn save(&self, sessions: &[Session]) -> Result<(), StateError> {
        *self.sessions.lock().unwrap() = sessions.to_vec();
        Ok(())
    }
}

/// Delete buffer files under `dir` that are not referenced by any loaded
/// Session. The state document itself is excluded.
pub fn sweep_orphaned_buffers(dir: &Path, sessions: &[Session]) -> std::io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    let known: std::collections::HashSet<&Path> = sessions
        .iter()
        .flat_map(|s| s.buffers.iter())
        .map(|b| b.path.as_path())
        .collect();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some(STATE_FILE_NAME) {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) == Some("tmp") {
            continue;
        }
        if !known.contains(path.as_path()) {
            tracing::warn!(path = %path.display(), "removing orphaned buffer file");
            let _ = fs::remove_file(&path);
        }
    }
    Ok(())
}
