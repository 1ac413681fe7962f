//! Process-wide orchestration brain.
//!
//! Owns the live Sessions, a reference to the State Store and Transmitter,
//! and a serial worker (built on [`crate::worker::SerialWorker`], the same
//! primitive the Transmitter uses) on which all session/buffer mutations
//! run. Ingress calls from arbitrary caller threads marshal a closure onto
//! that worker rather than taking a lock directly — the lock inside
//! [`WorkerCtx`] exists so state can still be inspected, it is not the
//! mechanism that serializes mutation.

mod drain;
mod recovery;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::ThreadId;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::CentauriError;
use crate::record::{LogRecord, LogSeverity};
use crate::session::{Session, SessionState};
use crate::state_store::{FileStateStore, StateStore};
use crate::transmitter::Transmitter;
use crate::worker::SerialWorker;

use drain::DrainTracking;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct Inner {
    sessions: Vec<Session>,
    drain_tracking: HashMap<String, DrainTracking>,
}

/// Everything a closure running on the session worker needs: the shared
/// session list, the Transmitter handle, the State Store, the worker handle
/// itself (so completion callbacks can hop back onto it), and a read-only
/// copy of the configuration. Cheap to clone — every field is an `Arc` or a
/// `Clone`-cheap value.
#[derive(Clone)]
pub(crate) struct WorkerCtx {
    inner: Arc<Mutex<Inner>>,
    transmitter: Transmitter,
    store: Arc<dyn StateStore>,
    worker: Arc<SerialWorker>,
    config: Config,
}

impl WorkerCtx {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("coordinator state lock poisoned")
    }

    fn persist(&self, inner: &Inner) {
        if let Err(e) = self.store.save(&inner.sessions) {
            tracing::error!(error = %e, "failed to persist coordinator state");
        }
    }
}

/// Post a mutation back onto the session worker. Used by every Transmitter
/// completion callback: they run on the transmit worker but must only
/// touch Session state from the session worker.
fn hop<F>(ctx: &WorkerCtx, f: F)
where
    F: FnOnce(&WorkerCtx, &mut Inner) + Send + 'static,
{
    let ctx = ctx.clone();
    if ctx
        .worker
        .clone()
        .submit(move || {
            let mut inner = ctx.lock();
            f(&ctx, &mut inner);
        })
        .is_err()
    {
        tracing::error!("coordinator session worker is no longer running; dropping completion");
    }
}

pub(crate) fn find_session_mut<'a>(sessions: &'a mut [Session], uuid: &str) -> Option<&'a mut Session> {
    sessions.iter_mut().find(|s| s.uuid == uuid)
}

fn current_session_uuid(sessions: &[Session]) -> Option<String> {
    sessions
        .iter()
        .rev()
        .find(|s| matches!(s.state(), SessionState::Active | SessionState::Suspended))
        .map(|s| s.uuid.clone())
}

fn end_session_locked(inner: &mut Inner, uuid: &str, abnormal: bool, now: u64) {
    if let Some(session) = find_session_mut(&mut inner.sessions, uuid) {
        session.end(abnormal, now);
    }
}

fn flush_all_locked(ctx: &WorkerCtx, inner: &mut Inner) {
    let uuids: Vec<String> = inner.sessions.iter().map(|s| s.uuid.clone()).collect();
    for uuid in uuids {
        drain::schedule_drain(ctx, inner, &uuid);
    }
}

/// The process-wide orchestration brain. Construct with
/// [`Coordinator::new`] for a caller-managed instance, or
/// [`Coordinator::install`] to populate the module-level singleton
/// accessed via [`Coordinator::global`].
pub struct Coordinator {
    inner: Arc<Mutex<Inner>>,
    worker: Arc<SerialWorker>,
    transmitter: Transmitter,
    store: Arc<dyn StateStore>,
    config: Config,
    logging_enabled: Arc<AtomicBool>,
    reentrancy_guard: Arc<Mutex<HashSet<ThreadId>>>,
}

static INSTANCE: OnceLock<Coordinator> = OnceLock::new();

impl Coordinator {
    /// Construct a Coordinator rooted at `config.directory`, running
    /// startup recovery synchronously before returning.
    pub fn new(config: Config) -> Result<Self, CentauriError> {
        let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(config.directory.clone()));
        let loaded = store.load()?;
        let recovered = recovery::recover_sessions(loaded, &config.directory, now_millis());
        store.save(&recovered)?;

        let transmitter = Transmitter::spawn(config.upload_base_url());
        for (name, value) in &config.headers {
            transmitter.set_header(name.clone(), value.clone());
        }

        let coordinator = Self {
            inner: Arc::new(Mutex::new(Inner {
                sessions: recovered,
                drain_tracking: HashMap::new(),
            })),
            worker: Arc::new(SerialWorker::new("centauri-session")),
            transmitter,
            store,
            config,
            logging_enabled: Arc::new(AtomicBool::new(true)),
            reentrancy_guard: Arc::new(Mutex::new(HashSet::new())),
        };
        coordinator.flush();
        Ok(coordinator)
    }

    /// Install the process-wide singleton. Must be called exactly once by
    /// host startup code — there is no implicit lazy initialization, since
    /// construction performs I/O.
    pub fn install(config: Config) -> Result<&'static Coordinator, CentauriError> {
        let coordinator = Self::new(config)?;
        INSTANCE
            .set(coordinator)
            .map_err(|_| CentauriError::Programmer("coordinator already installed".into()))?;
        Ok(INSTANCE.get().expect("just installed"))
    }

    /// Access the installed singleton, if [`Coordinator::install`] has been
    /// called.
    pub fn global() -> Option<&'static Coordinator> {
        INSTANCE.get()
    }

    fn ctx(&self) -> WorkerCtx {
        WorkerCtx {
            inner: self.inner.clone(),
            transmitter: self.transmitter.clone(),
            store: self.store.clone(),
            worker: self.worker.clone(),
            config: self.config.clone(),
        }
    }

    fn run_on_worker<F>(&self, f: F)
    where
        F: FnOnce(&WorkerCtx) + Send + 'static,
    {
        let ctx = self.ctx();
        if self.worker.submit(move || f(&ctx)).is_err() {
            tracing::error!("coordinator session worker is no longer running");
        }
    }

    // -- ingress API ----------------------------------------

    /// Start a new current Session, ending any still-open one first (at
    /// most one current Session at a time).
    pub fn begin_session(&self, app_token: impl Into<String>) {
        let app_token = app_token.into();
        self.run_on_worker(move |ctx| {
            let mut inner = ctx.lock();
            let now = now_millis();
            let old_uuid = current_session_uuid(&inner.sessions);
            if let Some(uuid) = &old_uuid {
                end_session_locked(&mut inner, uuid, false, now);
            }
            let session = Session::new(
                app_token,
                ctx.config.session_info.clone(),
                ctx.config.user_id.clone(),
                ctx.config.auto_flush_threshold_bytes,
                now,
            );
            let uuid = session.uuid.clone();
            inner.sessions.push(session);
            ctx.persist(&inner);
            if let Some(old_uuid) = old_uuid {
                drain::schedule_drain(ctx, &mut inner, &old_uuid);
            }
            drain::schedule_drain(ctx, &mut inner, &uuid);
        });
    }

    /// End the current Session, if any.
    pub fn end_session(&self) {
        self.run_on_worker(move |ctx| {
            let mut inner = ctx.lock();
            if let Some(uuid) = current_session_uuid(&inner.sessions) {
                end_session_locked(&mut inner, &uuid, false, now_millis());
                ctx.persist(&inner);
                drain::schedule_drain(ctx, &mut inner, &uuid);
            }
        });
    }

    /// Suspend the current Session and flush every Session with frozen
    /// buffers.
    pub fn suspend(&self) {
        self.run_on_worker(move |ctx| {
            let mut inner = ctx.lock();
            if let Some(uuid) = current_session_uuid(&inner.sessions) {
                if let Some(session) = find_session_mut(&mut inner.sessions, &uuid) {
                    session.suspend(now_millis());
                }
            }
            ctx.persist(&inner);
            flush_all_locked(ctx, &mut inner);
        });
    }

    /// Resume the current Session if within `sessionIdleTimeout`, otherwise
    /// end it and start a new one continuing the same app token and session
    /// metadata.
    pub fn resume(&self) {
        self.run_on_worker(move |ctx| {
            let mut inner = ctx.lock();
            let Some(uuid) = current_session_uuid(&inner.sessions) else {
                return;
            };
            let (continued, app_token, info, user_id, max_buffer) = {
                let Some(session) = find_session_mut(&mut inner.sessions, &uuid) else {
                    return;
                };
                let continued = session.resume(now_millis(), ctx.config.session_idle_timeout_secs);
                (
                    continued,
                    session.app_token.clone(),
                    session.info.clone(),
                    session.user_id.clone(),
                    session.maximum_buffer_size,
                )
            };
            if continued {
                ctx.persist(&inner);
                drain::schedule_drain(ctx, &mut inner, &uuid);
                return;
            }
            end_session_locked(&mut inner, &uuid, false, now_millis());
            let new_session = Session::new(app_token, info, user_id, max_buffer, now_millis());
            let new_uuid = new_session.uuid.clone();
            inner.sessions.push(new_session);
            ctx.persist(&inner);
            drain::schedule_drain(ctx, &mut inner, &uuid);
            drain::schedule_drain(ctx, &mut inner, &new_uuid);
        });
    }

    /// Explicitly drain every Session that has frozen buffers. Returns
    /// before uploads complete — it only guarantees they are enqueued
    ///.
    pub fn flush(&self) {
        self.run_on_worker(move |ctx| {
            let mut inner = ctx.lock();
            flush_all_locked(ctx, &mut inner);
        });
    }

    /// Re-enable `log()` ingestion. Session lifecycle events are
    /// tracked regardless of this flag.
    pub fn begin_logging(&self) {
        self.logging_enabled.store(true, Ordering::SeqCst);
    }

    /// Disable `log()` ingestion without affecting session tracking: between
    /// `end_logging` and `begin_logging` the Coordinator still tracks
    /// sessions but discards log records.
    pub fn end_logging(&self) {
        self.logging_enabled.store(false, Ordering::SeqCst);
    }

    /// Tag `message` with environment fields and buffer it onto the current
    /// Session, freezing and rotating the tail buffer if this append
    /// crosses `autoFlushThreshold`. Dropped silently while logging is
    /// disabled or there is no current Session.
    pub fn log(&self, severity: LogSeverity, tags: Option<String>, message: impl Into<String>) {
        let thread_id = std::thread::current().id();
        {
            let mut guard = self
                .reentrancy_guard
                .lock()
                .expect("reentrancy guard lock poisoned");
            if !guard.insert(thread_id) {
                // The userInfoBlock hook must not itself log; a re-entrant
                // call from the same thread is dropped rather than
                // recursing unboundedly.
                tracing::warn!("dropped re-entrant log() call from the userInfoBlock hook");
                return;
            }
        }

        let mut record = LogRecord::new(message.into()).with_severity(severity);
        if let Some(tags) = tags {
            record = record.with_tags(tags);
        }
        if let Some(block) = &self.config.user_info_block {
            block(&mut record.fields);
        }

        self.reentrancy_guard
            .lock()
            .expect("reentrancy guard lock poisoned")
            .remove(&thread_id);

        if !self.logging_enabled.load(Ordering::SeqCst) {
            return;
        }
        record.thread_id = Some(format!("{thread_id:?}"));

        self.run_on_worker(move |ctx| {
            let mut inner = ctx.lock();
            let now = now_millis();
            let Some(uuid) = current_session_uuid(&inner.sessions) else {
                return;
            };
            let directory = ctx.config.directory.clone();
            let crossed = {
                let Some(session) = find_session_mut(&mut inner.sessions, &uuid) else {
                    return;
                };
                let mut record = record;
                record.timestamp_millis = now;
                match session.buffer_message(&directory, &record, now) {
                    Ok(crossed) => crossed,
                    Err(e) => {
                        tracing::error!(uuid = %uuid, error = %e, "failed to buffer log record");
                        return;
                    }
                }
            };
            if crossed {
                if let Some(session) = find_session_mut(&mut inner.sessions, &uuid) {
                    if let Some(tail) = session.buffers.last_mut() {
                        tail.freeze();
                    }
                }
            }
            ctx.persist(&inner);
            if crossed {
                drain::schedule_drain(ctx, &mut inner, &uuid);
            }
        });
    }
}
