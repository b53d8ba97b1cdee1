//! Upload transfer with progress and cancellation.
//!
//! The request body is a lazily polled chunk stream: each chunk reports its
//! cumulative offset as the transport pulls it, which keeps progress
//! monotonically non-decreasing without a side channel. Cancellation runs
//! through a token owned by the [`UploadSession`], so a caller-held handle
//! composes with pipeline-level cancellation instead of ambient state.

use bytes::Bytes;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shelfscan_core::{ScanError, ScanOutcome, ScanResult, UploadProgress};

/// Progress observer for one upload.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// No-op progress callback.
pub fn noop_progress() -> ProgressCallback {
    Arc::new(|_| {})
}

const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// Handle to one in-flight scan transfer.
///
/// Dropping the session cancels the transfer; awaiting [`finish`] consumes
/// it and yields the outcome.
///
/// [`finish`]: UploadSession::finish
pub struct UploadSession {
    token: CancellationToken,
    task: Option<JoinHandle<Result<ScanOutcome, ScanError>>>,
}

impl UploadSession {
    pub(crate) fn new(
        token: CancellationToken,
        task: JoinHandle<Result<ScanOutcome, ScanError>>,
    ) -> Self {
        Self {
            token,
            task: Some(task),
        }
    }

    /// Cancel the transfer. No further progress callbacks fire afterwards.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Await the transfer result.
    pub async fn finish(mut self) -> Result<ScanOutcome, ScanError> {
        let Some(task) = self.task.take() else {
            return Err(ScanError::Internal("upload session already consumed".to_string()));
        };
        match task.await {
            Ok(result) => result,
            Err(err) => Err(ScanError::Internal(format!("upload task failed: {}", err))),
        }
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        // A session discarded before completion releases its transfer.
        if let Some(task) = &self.task {
            if !task.is_finished() {
                self.token.cancel();
            }
        }
    }
}

/// Read an integer `Retry-After` header, in seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
    details: Option<String>,
}

/// Build the structured HTTP error for a non-success response, surfacing the
/// gateway-provided message when the body carries one.
pub(crate) fn build_http_error(status: u16, retry_after: Option<u64>, body: &str) -> ScanError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|parsed| match (parsed.message, parsed.details) {
            (Some(message), Some(details)) => Some(format!("{}: {}", message, details)),
            (Some(message), None) => Some(message),
            (None, Some(details)) => Some(details),
            (None, None) => None,
        });

    ScanError::Http {
        status,
        retry_after,
        message,
    }
}

/// Run one multipart upload against the scan endpoint.
pub(crate) async fn perform_upload(
    client: &reqwest::Client,
    endpoint: &str,
    blob: Bytes,
    on_progress: ProgressCallback,
    token: CancellationToken,
) -> Result<ScanOutcome, ScanError> {
    let total = blob.len();
    tracing::debug!(endpoint, bytes = total, "Starting scan upload");

    let stream_token = token.clone();
    let stream_progress = on_progress.clone();
    let data = blob.clone();
    let chunk_starts: Vec<usize> = (0..total).step_by(UPLOAD_CHUNK_BYTES).collect();
    let body_stream = futures::stream::iter(chunk_starts.into_iter().map(move |start| {
        let end = (start + UPLOAD_CHUNK_BYTES).min(total);
        let chunk = data.slice(start..end);
        if !stream_token.is_cancelled() && total > 0 {
            let progress = ((end as f64 / total as f64) * 100.0).round() as u8;
            stream_progress(UploadProgress::uploading(progress));
        }
        Ok::<Bytes, std::io::Error>(chunk)
    }));

    let part = reqwest::multipart::Part::stream_with_length(
        reqwest::Body::wrap_stream(body_stream),
        total as u64,
    )
    .file_name("scan.jpg")
    .mime_str("image/jpeg")
    .map_err(ScanError::network)?;
    let form = reqwest::multipart::Form::new().part("image", part);

    let response = tokio::select! {
        _ = token.cancelled() => {
            tracing::debug!("Upload aborted before response");
            return Err(ScanError::Aborted);
        }
        sent = client.post(endpoint).multipart(form).send() => {
            sent.map_err(ScanError::network)?
        }
    };

    let status = response.status();
    if !status.is_success() {
        let retry_after = parse_retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        let err = build_http_error(status.as_u16(), retry_after, &text);
        tracing::warn!(status = status.as_u16(), "Scan upload rejected");
        return Err(err);
    }

    if !token.is_cancelled() {
        on_progress(UploadProgress::processing());
    }

    let text = tokio::select! {
        _ = token.cancelled() => return Err(ScanError::Aborted),
        body = response.text() => body.map_err(ScanError::network)?,
    };

    let outcome = match serde_json::from_str::<ScanResult>(&text) {
        Ok(result) => {
            tracing::info!(
                books = result.books.len(),
                model = %result.model_used,
                "Scan complete"
            );
            ScanOutcome::Books(result)
        }
        Err(err) => {
            // The gateway contract may evolve; keep the payload instead of
            // failing the scan on shape.
            tracing::warn!(error = %err, "Scan response did not match the expected shape");
            ScanOutcome::Raw(text)
        }
    };

    if !token.is_cancelled() {
        on_progress(UploadProgress::complete());
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_parses_integer_seconds() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "15".parse().unwrap());
        assert_eq!(parse_retry_after(&headers), Some(15));

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::RETRY_AFTER,
            "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap(),
        );
        // HTTP-date form is not an integer; treated as absent
        assert_eq!(parse_retry_after(&headers), None);

        assert_eq!(parse_retry_after(&reqwest::header::HeaderMap::new()), None);
    }

    #[test]
    fn http_error_surfaces_backend_message() {
        let err = build_http_error(500, None, r#"{"message": "model unavailable"}"#);
        match err {
            ScanError::Http {
                status, message, ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(message.as_deref(), Some("model unavailable"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = build_http_error(
            422,
            None,
            r#"{"message": "bad image", "details": "zero pixels"}"#,
        );
        match err {
            ScanError::Http { message, .. } => {
                assert_eq!(message.as_deref(), Some("bad image: zero pixels"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn http_error_tolerates_non_json_bodies() {
        let err = build_http_error(429, Some(5), "slow down");
        match err {
            ScanError::Http {
                status,
                retry_after,
                message,
            } => {
                assert_eq!(status, 429);
                assert_eq!(retry_after, Some(5));
                assert_eq!(message, None);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
