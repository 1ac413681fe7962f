//! Ordered, pausable upload queue.
//!
//! A handle holding `mpsc::Sender`s talks to a single `tokio::spawn`ed actor
//! task that owns all mutable state: the base URL, headers, pause flag, and
//! the job queue itself.
//!
//! The actor keeps its own `VecDeque<Job>` rather than relying on the
//! `mpsc` channel as the queue of record, because a temporary failure must
//! requeue the in-flight job at the *head* of the line — something an mpsc
//! channel cannot do.

mod http;
mod job;
pub mod retry;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

pub use job::{Completion, MarkerCompletion, RequestBody};
pub use retry::TransmitStatus;

use job::Job;
use retry::Backoff;

enum Control {
    Pause,
    Resume,
    SetHeader(String, String),
    SetBaseUrl(String),
}

/// Handle to a running Transmitter actor. Cheaply `Clone`able; every clone
/// talks to the same queue.
#[derive(Clone)]
pub struct Transmitter {
    jobs_tx: mpsc::UnboundedSender<Job>,
    control_tx: mpsc::UnboundedSender<Control>,
    paused: Arc<AtomicBool>,
}

impl Transmitter {
    /// Spawn a Transmitter actor uploading to `base_url` (no trailing
    /// slash expected, but tolerated).
    pub fn spawn(base_url: impl Into<String>) -> Self {
        Self::spawn_with_backoff(base_url, Backoff::default())
    }

    /// Test seam: spawn with injected backoff bounds so retry tests don't
    /// have to wait out the real 30s-1h range.
    #[cfg(test)]
    pub(crate) fn spawn_with_backoff_bounds(
        base_url: impl Into<String>,
        min: std::time::Duration,
        max: std::time::Duration,
    ) -> Self {
        Self::spawn_with_backoff(base_url, Backoff::with_bounds(min, max))
    }

    fn spawn_with_backoff(base_url: impl Into<String>, backoff: Backoff) -> Self {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let paused = Arc::new(AtomicBool::new(false));
        let actor_paused = paused.clone();
        let resume_tx = control_tx.clone();
        tokio::spawn(run(
            reqwest::Client::new(),
            base_url.into(),
            jobs_rx,
            control_rx,
            actor_paused,
            resume_tx,
            backoff,
        ));
        Self {
            jobs_tx,
            control_tx,
            paused,
        }
    }

    /// Enqueue an HTTP request. `completion` fires with `Success` or
    /// `PermanentFailure`; a `TemporaryFailure` is retried internally and
    /// never observed by the caller.
    pub fn enqueue_request(
        &self,
        method: reqwest::Method,
        path: impl Into<String>,
        body: RequestBody,
        completion: Completion,
    ) {
        let job = Job::Request {
            method,
            path: path.into(),
            body,
            completion,
        };
        if self.jobs_tx.send(job).is_err() {
            tracing::error!("transmitter actor is gone; dropping request job");
        }
    }

    /// Enqueue a marker: `completion` fires once every job enqueued ahead
    /// of it has resolved.
    pub fn enqueue_marker(&self, completion: MarkerCompletion) {
        if self.jobs_tx.send(Job::Marker { completion }).is_err() {
            tracing::error!("transmitter actor is gone; dropping marker job");
        }
    }

    /// Stop dispatching queued jobs until `resume()` is called.
    pub fn pause(&self) {
        let _ = self.control_tx.send(Control::Pause);
    }

    /// Resume dispatching after a `pause()` (explicit or backoff-driven).
    pub fn resume(&self) {
        let _ = self.control_tx.send(Control::Resume);
    }

    /// Set (or overwrite) a header applied to every subsequent request.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) {
        let _ = self
            .control_tx
            .send(Control::SetHeader(name.into(), value.into()));
    }

    /// Replace the collector base URL used for subsequent requests.
    pub fn set_base_url(&self, base_url: impl Into<String>) {
        let _ = self.control_tx.send(Control::SetBaseUrl(base_url.into()));
    }

    /// `true` once a `pause()` (explicit or backoff-driven) has taken
    /// effect and before its matching `resume()`.
    pub fn paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

async fn run(
    http: reqwest::Client,
    mut base_url: String,
    mut jobs_rx: mpsc::UnboundedReceiver<Job>,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
    paused: Arc<AtomicBool>,
    control_tx: mpsc::UnboundedSender<Control>,
    mut backoff: Backoff,
) {
    let mut headers: Vec<(String, String)> = Vec::new();
    let mut queue: VecDeque<Job> = VecDeque::new();

    loop {
        while let Ok(job) = jobs_rx.try_recv() {
            queue.push_back(job);
        }
        while let Ok(ctrl) = control_rx.try_recv() {
            apply_control(ctrl, &paused, &mut base_url, &mut headers);
        }

        if paused.load(Ordering::SeqCst) || queue.is_empty() {
            tokio::select! {
                maybe_job = jobs_rx.recv() => match maybe_job {
                    Some(job) => queue.push_back(job),
                    None => return,
                },
                maybe_ctrl = control_rx.recv() => match maybe_ctrl {
                    Some(ctrl) => apply_control(ctrl, &paused, &mut base_url, &mut headers),
                    None => return,
                },
            }
            continue;
        }

        let job = queue.pop_front().expect("queue checked non-empty above");
        match job {
            Job::Marker { completion } => completion(),
            Job::Request {
                method,
                path,
                body,
                completion,
            } => {
                let status = http::dispatch(&http, &base_url, &headers, &method, &path, &body).await;
                match status {
                    TransmitStatus::Success => {
                        backoff.reset();
                        completion(TransmitStatus::Success);
                    }
                    TransmitStatus::PermanentFailure => {
                        completion(TransmitStatus::PermanentFailure);
                    }
                    TransmitStatus::TemporaryFailure => {
                        let delay = backoff.next_delay();
                        paused.store(true, Ordering::SeqCst);
                        queue.push_front(Job::Request {
                            method,
                            path,
                            body,
                            completion,
                        });
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            "transmitter pausing after temporary failure"
                        );
                        let resume_tx = control_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = resume_tx.send(Control::Resume);
                        });
                    }
                }
            }
        }
    }
}

fn apply_control(
    ctrl: Control,
    paused: &Arc<AtomicBool>,
    base_url: &mut String,
    headers: &mut Vec<(String, String)>,
) {
    match ctrl {
        Control::Pause => paused.store(true, Ordering::SeqCst),
        Control::Resume => paused.store(false, Ordering::SeqCst),
        Control::SetHeader(name, value) => {
            if let Some(existing) = headers.iter_mut().find(|(n, _)| *n == name) {
                existing.1 = value;
            } else {
                headers.push((name, value));
            }
        }
        Control::SetBaseUrl(new_base) => *base_url = new_base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn status_reason(status: u16) -> &'static str {
        match status {
            200 => "OK",
            422 => "Unprocessable Entity",
            500 => "Internal Server Error",
            _ => "Status",
        }
    }

    /// Spawn a loopback server returning `status` for every request it
    /// accepts, and report how many requests it received.
    async fn spawn_fixed_status_server(status: u16) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                hits_clone.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status,
                    status_reason(status)
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    #[tokio::test]
    async fn success_request_invokes_completion_with_success() {
        let (addr, hits) = spawn_fixed_status_server(200).await;
        let transmitter = Transmitter::spawn(format!("http://{addr}"));
        let (tx, rx) = oneshot::channel();
        transmitter.enqueue_request(
            reqwest::Method::POST,
            "/session",
            RequestBody::Json(serde_json::json!({"a": 1})),
            Box::new(move |status| {
                let _ = tx.send(status);
            }),
        );
        let status = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("completion did not fire")
            .unwrap();
        assert_eq!(status, TransmitStatus::Success);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permanent_failure_invokes_completion_without_retry() {
        let (addr, hits) = spawn_fixed_status_server(422).await;
        let transmitter = Transmitter::spawn(format!("http://{addr}"));
        let (tx, rx) = oneshot::channel();
        transmitter.enqueue_request(
            reqwest::Method::POST,
            "/session",
            RequestBody::Json(serde_json::json!({})),
            Box::new(move |status| {
                let _ = tx.send(status);
            }),
        );
        let status = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("completion did not fire")
            .unwrap();
        assert_eq!(status, TransmitStatus::PermanentFailure);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn marker_fires_after_preceding_request_settles() {
        let (addr, _hits) = spawn_fixed_status_server(200).await;
        let transmitter = Transmitter::spawn(format!("http://{addr}"));
        let (req_tx, req_rx) = oneshot::channel();
        let (marker_tx, marker_rx) = oneshot::channel();
        transmitter.enqueue_request(
            reqwest::Method::POST,
            "/session",
            RequestBody::Json(serde_json::json!({})),
            Box::new(move |_| {
                let _ = req_tx.send(());
            }),
        );
        transmitter.enqueue_marker(Box::new(move || {
            let _ = marker_tx.send(());
        }));
        tokio::time::timeout(Duration::from_secs(2), req_rx)
            .await
            .expect("request did not settle")
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), marker_rx)
            .await
            .expect("marker did not fire")
            .unwrap();
    }

    #[tokio::test]
    async fn pause_blocks_dispatch_until_resume() {
        let (addr, hits) = spawn_fixed_status_server(200).await;
        let transmitter = Transmitter::spawn(format!("http://{addr}"));
        transmitter.pause();
        assert!(transmitter.paused());
        let (tx, rx) = oneshot::channel();
        transmitter.enqueue_request(
            reqwest::Method::GET,
            "/ping",
            RequestBody::Bytes(Vec::new()),
            Box::new(move |status| {
                let _ = tx.send(status);
            }),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0, "paused queue must not dispatch");
        transmitter.resume();
        let status = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("completion did not fire after resume")
            .unwrap();
        assert_eq!(status, TransmitStatus::Success);
    }

    /// Spawn a loopback server that returns `first_status` for the first
    /// `fail_count` requests, then 200 for every request after.
    async fn spawn_flaky_server(
        first_status: u16,
        fail_count: usize,
    ) -> (SocketAddr, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_clone = hits.clone();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(_) => return,
                };
                let seen = hits_clone.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let status = if seen < fail_count { first_status } else { 200 };
                let response = format!(
                    "HTTP/1.1 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status,
                    status_reason(status)
                );
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });
        (addr, hits)
    }

    #[tokio::test]
    async fn temporary_failure_pauses_then_retries_the_same_job_at_the_head() {
        let (addr, hits) = spawn_flaky_server(503, 1).await;
        let transmitter = Transmitter::spawn_with_backoff_bounds(
            format!("http://{addr}"),
            Duration::from_millis(10),
            Duration::from_millis(100),
        );
        let (tx, rx) = oneshot::channel();
        transmitter.enqueue_request(
            reqwest::Method::POST,
            "/session/abc/log",
            RequestBody::Json(serde_json::json!({"seq": 1})),
            Box::new(move |status| {
                let _ = tx.send(status);
            }),
        );
        // Only one completion ever fires for this job: the transient 503
        // is invisible to the caller, retried internally until it succeeds.
        let status = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("completion did not fire after retry")
            .unwrap();
        assert_eq!(status, TransmitStatus::Success);
        assert_eq!(
            hits.load(Ordering::SeqCst),
            2,
            "one failed attempt plus one successful retry, no duplicate or dropped delivery"
        );
    }

    #[tokio::test]
    async fn set_base_url_and_header_affect_the_next_request() {
        let (addr, _hits) = spawn_fixed_status_server(200).await;
        let transmitter = Transmitter::spawn("http://example.invalid");
        transmitter.set_base_url(format!("http://{addr}"));
        transmitter.set_header("X-Centauri-Token", "abc123");
        // Give the control message a moment to land before the request does.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let (tx, rx) = oneshot::channel();
        transmitter.enqueue_request(
            reqwest::Method::GET,
            "/ping",
            RequestBody::Bytes(Vec::new()),
            Box::new(move |status| {
                let _ = tx.send(status);
            }),
        );
        let status = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .expect("completion did not fire")
            .unwrap();
        assert_eq!(status, TransmitStatus::Success);
    }
}
