//! Startup recovery: reconcile the loaded Session list against whatever the
//! process actually did before it last exited.
//!
//! A loaded Session that is still `Active`/`Suspended` can only mean the
//! process that owned it died before calling `endSession`: forcing it
//! through `end(abnormal = true)` also freezes its tail buffer, after which
//! the normal drain path re-enqueues whatever it still owes the server. A
//! Session that was already `Ended` (just not yet `endPosted`) is left
//! alone — re-stamping its end time here would misreport a clean shutdown
//! as a crash.

use crate::session::{Session, SessionState};
use std::path::Path;

pub(super) fn recover_sessions(mut sessions: Vec<Session>, dir: &Path, now_millis: u64) -> Vec<Session> {
    for session in sessions.iter_mut() {
        if matches!(session.state(), SessionState::Active | SessionState::Suspended) {
            tracing::warn!(uuid = %session.uuid, "recovering session that did not end cleanly");
            session.end(true, now_millis);
        }
        if let Some(tail) = session.buffers.last_mut() {
            if let Err(e) = tail.recover() {
                tracing::error!(
                    uuid = %session.uuid,
                    error = %e,
                    "failed to recover tail buffer on startup"
                );
            }
        }
    }
    if let Err(e) = crate::state_store::sweep_orphaned_buffers(dir, &sessions) {
        tracing::error!(error = %e, "failed to sweep orphaned buffer files on startup");
    }
    sessions
}
