//! HTTP dispatch for the Transmitter.
//!
//! Build the request, send it, classify the response rather than bubbling a
//! raw `reqwest::Error` up to callers.

use super::job::RequestBody;
use super::retry::{classify_status, classify_transport_error, TransmitStatus};

/// Perform one HTTP request and classify the outcome. Never returns an
/// `Err` — every failure mode collapses into a `TransmitStatus` so the
/// actor loop has one decision to make.
pub(super) async fn dispatch(
    http: &reqwest::Client,
    base_url: &str,
    headers: &[(String, String)],
    method: &reqwest::Method,
    path: &str,
    body: &RequestBody,
) -> TransmitStatus {
    let url = format!("{}{}", base_url.trim_end_matches('/'), path);
    let mut request = http.request(method.clone(), url);
    for (name, value) in headers {
        request = request.header(name, value);
    }
    request = match body {
        RequestBody::Json(value) => request.json(value),
        RequestBody::Bytes(bytes) => request.body(bytes.clone()),
    };

    match request.send().await {
        Ok(response) => classify_status(response.status().as_u16()),
        Err(e) => {
            tracing::warn!(error = %e, path = %path, "transmitter request failed");
            classify_transport_error()
        }
    }
}
