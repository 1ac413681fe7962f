//! Drain scheduling: turning a Session's outstanding begin/buffer/end
//! notifications into Transmitter jobs, in strict order, with completion
//! callbacks hopping back onto the session worker to mutate Session state.

use std::collections::HashSet;

use crate::session::{Session, SessionState};
use crate::transmitter::{RequestBody, TransmitStatus};

use super::{find_session_mut, hop, Inner, WorkerCtx};

/// Per-session bookkeeping for jobs already enqueued but not yet resolved.
/// Ephemeral — never persisted. A fresh process start rebuilds it empty;
/// `schedule_drain` re-enqueues whatever the loaded state still owes
/// regardless (idempotent against a cold `drain_tracking`).
#[derive(Default)]
pub(super) struct DrainTracking {
    begin_in_flight: bool,
    end_in_flight: bool,
    buffers_in_flight: HashSet<i64>,
}

/// Enqueue whatever `uuid`'s session still owes the server: begin
/// notification, frozen buffers in sequence order, end notification, then a
/// cleanup marker — skipping anything already in flight or already posted.
/// Safe to call repeatedly (suspend/flush/threshold-crossing all funnel
/// through here).
pub(super) fn schedule_drain(ctx: &WorkerCtx, inner: &mut Inner, uuid: &str) {
    let Some(session) = inner.sessions.iter().find(|s| s.uuid == uuid) else {
        return;
    };
    if session.invalid {
        return;
    }

    if !session.begin_posted {
        let tracking = inner.drain_tracking.entry(uuid.to_string()).or_default();
        if !tracking.begin_in_flight {
            tracking.begin_in_flight = true;
            let session = inner.sessions.iter().find(|s| s.uuid == uuid).expect("checked above");
            enqueue_begin(ctx, session, uuid);
        }
    }

    let session = inner.sessions.iter().find(|s| s.uuid == uuid).expect("checked above");
    let pending: Vec<(i64, Vec<u8>)> = {
        let tracking = inner.drain_tracking.entry(uuid.to_string()).or_default();
        session
            .frozen_buffers()
            .filter(|b| !tracking.buffers_in_flight.contains(&b.sequence_number))
            .filter_map(|b| match b.read_contents() {
                Ok(bytes) => Some((b.sequence_number, bytes)),
                Err(e) => {
                    tracing::error!(
                        uuid = %uuid,
                        seq = b.sequence_number,
                        error = %e,
                        "failed to read buffer for upload"
                    );
                    None
                }
            })
            .collect()
    };
    {
        let tracking = inner.drain_tracking.entry(uuid.to_string()).or_default();
        for (seq, _) in &pending {
            tracking.buffers_in_flight.insert(*seq);
        }
    }
    for (seq, bytes) in pending {
        enqueue_buffer(ctx, uuid, seq, bytes);
    }

    let session = inner.sessions.iter().find(|s| s.uuid == uuid).expect("checked above");
    let is_ended = session.state() == SessionState::Ended;
    let end_posted = session.end_posted;
    if is_ended && !end_posted {
        let tracking = inner.drain_tracking.entry(uuid.to_string()).or_default();
        if !tracking.end_in_flight {
            tracking.end_in_flight = true;
            let session = inner.sessions.iter().find(|s| s.uuid == uuid).expect("checked above");
            enqueue_end(ctx, session, uuid);
        }
    }

    enqueue_cleanup_marker(ctx, uuid);
}

fn enqueue_begin(ctx: &WorkerCtx, session: &Session, uuid: &str) {
    let body = serde_json::json!({
        "uuid": session.uuid,
        "app_token": session.app_token,
        "user_id": session.user_id,
        "info": session.info,
        "begin_millis": session.begin_millis,
    });
    let hop_ctx = ctx.clone();
    let hop_uuid = uuid.to_string();
    ctx.transmitter.enqueue_request(
        reqwest::Method::POST,
        "/session",
        RequestBody::Json(body),
        Box::new(move |status| on_begin_resolved(hop_ctx, hop_uuid, status)),
    );
}

fn enqueue_buffer(ctx: &WorkerCtx, uuid: &str, seq: i64, bytes: Vec<u8>) {
    let hop_ctx = ctx.clone();
    let hop_uuid = uuid.to_string();
    ctx.transmitter.enqueue_request(
        reqwest::Method::POST,
        format!("/session/{uuid}/log"),
        RequestBody::Bytes(bytes),
        Box::new(move |status| on_buffer_resolved(hop_ctx, hop_uuid, seq, status)),
    );
}

fn enqueue_end(ctx: &WorkerCtx, session: &Session, uuid: &str) {
    let body = serde_json::json!({
        "uuid": session.uuid,
        "end_millis": session.end_millis,
        "abnormal": session.abnormal_end,
    });
    let hop_ctx = ctx.clone();
    let hop_uuid = uuid.to_string();
    ctx.transmitter.enqueue_request(
        reqwest::Method::POST,
        format!("/session/{uuid}/end"),
        RequestBody::Json(body),
        Box::new(move |status| on_end_resolved(hop_ctx, hop_uuid, status)),
    );
}

fn enqueue_cleanup_marker(ctx: &WorkerCtx, uuid: &str) {
    let hop_ctx = ctx.clone();
    let hop_uuid = uuid.to_string();
    ctx.transmitter.enqueue_marker(Box::new(move || {
        hop(&hop_ctx, move |_ctx, inner| {
            let ready = find_session_mut(&mut inner.sessions, &hop_uuid)
                .map(|s| s.ready_for_cleanup())
                .unwrap_or(false);
            if ready {
                inner.sessions.retain(|s| s.uuid != hop_uuid);
                inner.drain_tracking.remove(&hop_uuid);
            }
        });
    }));
}

fn on_begin_resolved(ctx: WorkerCtx, uuid: String, status: TransmitStatus) {
    hop(&ctx, move |ctx, inner| {
        if let Some(tracking) = inner.drain_tracking.get_mut(&uuid) {
            tracking.begin_in_flight = false;
        }
        if status == TransmitStatus::PermanentFailure {
            // A rejected begin notification marks the session permanently
            // invalid and discards everything it was holding.
            if let Some(session) = find_session_mut(&mut inner.sessions, &uuid) {
                session.invalidate();
            }
            discard_all_buffers(inner, &uuid);
            inner.sessions.retain(|s| s.uuid != uuid);
            inner.drain_tracking.remove(&uuid);
            ctx.persist(inner);
            return;
        }
        if status == TransmitStatus::Success {
            if let Some(session) = find_session_mut(&mut inner.sessions, &uuid) {
                session.begin_posted = true;
            }
        }
        ctx.persist(inner);
        schedule_drain(ctx, inner, &uuid);
    });
}

fn on_buffer_resolved(ctx: WorkerCtx, uuid: String, seq: i64, status: TransmitStatus) {
    hop(&ctx, move |ctx, inner| {
        if let Some(tracking) = inner.drain_tracking.get_mut(&uuid) {
            tracking.buffers_in_flight.remove(&seq);
        }
        if matches!(status, TransmitStatus::Success | TransmitStatus::PermanentFailure) {
            if let Some(session) = find_session_mut(&mut inner.sessions, &uuid) {
                if let Some(buffer) = session.buffers.iter().find(|b| b.sequence_number == seq) {
                    let _ = buffer.delete();
                }
                session.remove_buffer(seq);
            }
        }
        ctx.persist(inner);
        schedule_drain(ctx, inner, &uuid);
    });
}

fn on_end_resolved(ctx: WorkerCtx, uuid: String, status: TransmitStatus) {
    hop(&ctx, move |ctx, inner| {
        if let Some(tracking) = inner.drain_tracking.get_mut(&uuid) {
            tracking.end_in_flight = false;
        }
        if matches!(status, TransmitStatus::Success | TransmitStatus::PermanentFailure) {
            if let Some(session) = find_session_mut(&mut inner.sessions, &uuid) {
                session.end_posted = true;
            }
        }
        ctx.persist(inner);
        schedule_drain(ctx, inner, &uuid);
    });
}

fn discard_all_buffers(inner: &mut Inner, uuid: &str) {
    if let Some(session) = find_session_mut(&mut inner.sessions, uuid) {
        for buffer in &session.buffers {
            let _ = buffer.delete();
        }
        session.buffers.clear();
    }
    if let Some(tracking) = inner.drain_tracking.get_mut(uuid) {
        tracking.buffers_in_flight.clear();
    }
}
