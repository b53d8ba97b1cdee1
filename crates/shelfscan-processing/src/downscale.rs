//! Size bounding with background offload.
//!
//! Small payloads are redrawn on the calling task (offload overhead exceeds
//! the benefit); large ones are dispatched to a dedicated worker task over a
//! bounded channel. A worker error or a missed 5-second deadline falls back
//! to the in-thread path, so this stage recovers locally and never surfaces
//! a failure caused by the offload machinery itself.

use anyhow::{Context, Result};
use bytes::Bytes;
use image::ImageReader;
use shelfscan_core::ScanError;
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::orientation;
use crate::sanitize::encode_jpeg;

/// Payloads at or above this size are dispatched to the worker.
pub const OFFLOAD_THRESHOLD_BYTES: usize = 1024 * 1024;

/// Deadline for one worker reply before falling back in-thread.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(5);

/// JPEG quality for downscaled output.
pub const DOWNSCALE_JPEG_QUALITY: u8 = 85;

/// Bound an image to `max_long_edge`, preserving aspect ratio, and re-encode
/// as JPEG.
///
/// Re-encodes even when no resize is needed: this stage also guarantees a
/// consistent, metadata-free JPEG when invoked standalone.
pub fn downscale_sync(data: &[u8], max_long_edge: u32) -> Result<Bytes> {
    let img = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .context("Unrecognized image container")?
        .decode()
        .context("Image decode failed")?;
    let img = orientation::apply_orientation(img, data);

    let (width, height) = (img.width(), img.height());
    let long_edge = width.max(height);
    let scale = (max_long_edge as f64 / long_edge as f64).min(1.0);

    let img = if scale < 1.0 {
        let new_width = (width as f64 * scale).round() as u32;
        let new_height = (height as f64 * scale).round() as u32;
        tracing::debug!(width, height, new_width, new_height, "Downscaling image");
        img.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
    } else {
        img
    };

    encode_jpeg(&img, DOWNSCALE_JPEG_QUALITY)
}

struct DownscaleRequest {
    data: Bytes,
    max_long_edge: u32,
    reply: oneshot::Sender<std::result::Result<Bytes, String>>,
}

/// Downscaling front end with one background worker task.
///
/// One request is in flight per call; replies are matched 1:1 through a
/// dedicated oneshot channel, so a late reply can never be attributed to a
/// later request.
#[derive(Clone)]
pub struct DownscaleService {
    tx: mpsc::Sender<DownscaleRequest>,
    shutdown_tx: mpsc::Sender<()>,
}

impl DownscaleService {
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::channel::<DownscaleRequest>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_req = rx.recv() => {
                        let Some(req) = maybe_req else { break };
                        let DownscaleRequest { data, max_long_edge, reply } = req;
                        let result = tokio::task::spawn_blocking(move || {
                            downscale_sync(&data, max_long_edge).map_err(|e| e.to_string())
                        })
                        .await
                        .unwrap_or_else(|join_err| Err(join_err.to_string()));
                        let _ = reply.send(result);
                    }
                    _ = shutdown_rx.recv() => {
                        tracing::debug!("Downscale worker shutting down");
                        break;
                    }
                }
            }
        });

        Self { tx, shutdown_tx }
    }

    /// Stop the worker task. Subsequent large downscales use the in-thread
    /// fallback.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }

    /// Downscale `data` to `max_long_edge`, offloading large payloads.
    pub async fn downscale(&self, data: Bytes, max_long_edge: u32) -> Result<Bytes, ScanError> {
        if data.len() >= OFFLOAD_THRESHOLD_BYTES {
            self.offload_with_fallback(data, max_long_edge).await
        } else {
            downscale_sync(&data, max_long_edge)
                .map_err(|e| ScanError::Internal(format!("downscale failed: {:#}", e)))
        }
    }

    async fn offload_with_fallback(
        &self,
        data: Bytes,
        max_long_edge: u32,
    ) -> Result<Bytes, ScanError> {
        match self.try_offload(data.clone(), max_long_edge).await {
            Ok(bytes) => Ok(bytes),
            Err(err) => {
                // Recovered locally, never reported to the caller.
                tracing::warn!(error = %err, "Downscale worker failed, falling back in-thread");
                downscale_sync(&data, max_long_edge)
                    .map_err(|e| ScanError::Internal(format!("downscale failed: {:#}", e)))
            }
        }
    }

    async fn try_offload(&self, data: Bytes, max_long_edge: u32) -> Result<Bytes, ScanError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = DownscaleRequest {
            data,
            max_long_edge,
            reply: reply_tx,
        };

        let exchange = async {
            self.tx
                .send(request)
                .await
                .map_err(|_| ScanError::worker("worker unavailable"))?;
            reply_rx
                .await
                .map_err(|_| ScanError::worker("worker dropped the reply"))?
                .map_err(ScanError::Worker)
        };

        match tokio::time::timeout(WORKER_TIMEOUT, exchange).await {
            Ok(result) => result,
            Err(_) => Err(ScanError::worker("worker timed out")),
        }
    }
}

impl Default for DownscaleService {
    fn default() -> Self {
        Self::new()
    }
}
