//! Scan orchestration: validate → convert → sanitize → downscale → upload.
//!
//! Stages run strictly sequentially within one scan; the step machine is
//! transitioned around each phase for UI narration. Dominant-color
//! extraction runs as an independent task against the sanitized preview and
//! never blocks or fails the upload path. A 429 from the gateway starts a
//! countdown and retries the original upload once per cycle; every other
//! failure aborts the scan and resets the step machine.
//!
//! The pipeline does not guard against concurrent scans itself; callers
//! disable re-entry while [`ScanPipeline::is_uploading`] is true.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use shelfscan_core::config::DEFAULT_MAX_LONG_EDGE;
use shelfscan_core::{BookIdentity, ImageAsset, RgbColor, ScanError, ScanOutcome};
use shelfscan_processing::{
    extract_dominant_color, DownscaleService, HeicConverter, Sanitizer,
};

use crate::steps::{PipelineSteps, StepKey, StepStatus};
use crate::upload::{noop_progress, ProgressCallback};
use crate::GatewayClient;
use crate::retry::RetrySession;

/// Observation hooks for one scan. All optional; absent hooks are no-ops.
#[derive(Clone, Default)]
pub struct ScanHooks {
    /// Upload progress reports.
    pub on_progress: Option<ProgressCallback>,
    /// Step machine transitions, in order.
    pub on_step: Option<Arc<dyn Fn(StepKey, StepStatus) + Send + Sync>>,
    /// A rate-limit countdown started; the receiver yields remaining seconds.
    pub on_retry: Option<Arc<dyn Fn(watch::Receiver<u64>) + Send + Sync>>,
}

/// Result of one completed scan.
#[derive(Debug)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub outcome: ScanOutcome,
    /// Identities shaped for the enrichment/recommendation collaborators.
    pub identities: Vec<BookIdentity>,
    /// Background color for theming; `None` when unavailable.
    pub dominant_color: Option<RgbColor>,
}

/// Drives a full scan over a [`GatewayClient`] and a [`DownscaleService`].
pub struct ScanPipeline {
    client: GatewayClient,
    downscaler: DownscaleService,
    sanitizer: Sanitizer,
    converter: HeicConverter,
    steps: Arc<Mutex<PipelineSteps>>,
    uploading: Arc<AtomicBool>,
    max_long_edge: u32,
    extract_color: bool,
}

impl ScanPipeline {
    pub fn new(client: GatewayClient, downscaler: DownscaleService) -> Self {
        Self {
            client,
            downscaler,
            sanitizer: Sanitizer,
            converter: HeicConverter,
            steps: Arc::new(Mutex::new(PipelineSteps::new())),
            uploading: Arc::new(AtomicBool::new(false)),
            max_long_edge: DEFAULT_MAX_LONG_EDGE,
            extract_color: true,
        }
    }

    pub fn with_max_long_edge(mut self, max_long_edge: u32) -> Self {
        self.max_long_edge = max_long_edge;
        self
    }

    pub fn with_color_extraction(mut self, enabled: bool) -> Self {
        self.extract_color = enabled;
        self
    }

    /// Whether a scan is currently running. Callers use this to disable
    /// re-entry; the pipeline itself does not queue or reject overlap.
    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::SeqCst)
    }

    pub fn steps_snapshot(&self) -> Vec<(StepKey, StepStatus)> {
        self.steps.lock().unwrap().snapshot()
    }

    /// Run one scan to completion. `cancel` aborts the upload or a pending
    /// rate-limit countdown; the caller keeps the token.
    pub async fn scan(
        &self,
        asset: ImageAsset,
        cancel: CancellationToken,
        hooks: &ScanHooks,
    ) -> Result<ScanReport, ScanError> {
        self.uploading.store(true, Ordering::SeqCst);
        let result = self.run(asset, &cancel, hooks).await;
        self.uploading.store(false, Ordering::SeqCst);

        if let Err(err) = &result {
            // Recovery path: narration returns to pending so the next scan
            // starts clean.
            tracing::debug!(error = %err, "Scan failed, resetting step state");
            self.reset_steps(hooks);
        }
        result
    }

    async fn run(
        &self,
        asset: ImageAsset,
        cancel: &CancellationToken,
        hooks: &ScanHooks,
    ) -> Result<ScanReport, ScanError> {
        let scan_id = Uuid::new_v4();
        tracing::info!(
            scan_id = %scan_id,
            file_name = %asset.file_name,
            content_type = %asset.content_type,
            bytes = asset.len(),
            "Starting scan"
        );

        self.reset_steps(hooks);
        self.transition(hooks, StepKey::Optimize, StepStatus::Active)?;

        let class = shelfscan_processing::ensure_supported(&asset.content_type, &asset.file_name)?;
        let asset = if class.is_heic {
            self.converter.to_jpeg(&asset).await?
        } else {
            asset
        };

        let sanitized = self.sanitizer.sanitize(&asset).await?;

        // Presentation only: runs concurrently with the upload path and is
        // joined at the very end.
        let color_task = if self.extract_color {
            let preview = sanitized.bytes.clone();
            Some(tokio::task::spawn_blocking(move || {
                extract_dominant_color(&preview)
            }))
        } else {
            None
        };

        let optimized = self
            .downscaler
            .downscale(sanitized.bytes.clone(), self.max_long_edge)
            .await?;
        self.transition(hooks, StepKey::Optimize, StepStatus::Done)?;

        self.transition(hooks, StepKey::Upload, StepStatus::Active)?;
        let outcome = self.upload_with_retry(optimized, cancel, hooks).await?;
        self.transition(hooks, StepKey::Upload, StepStatus::Done)?;

        self.transition(hooks, StepKey::Analyze, StepStatus::Active)?;
        let books = outcome.books().to_vec();
        self.transition(hooks, StepKey::Analyze, StepStatus::Done)?;

        self.transition(hooks, StepKey::Extract, StepStatus::Active)?;
        tracing::debug!(scan_id = %scan_id, books = books.len(), "Books extracted");
        self.transition(hooks, StepKey::Extract, StepStatus::Done)?;

        self.transition(hooks, StepKey::Enrich, StepStatus::Active)?;
        let identities = BookIdentity::from_books(&books);
        self.transition(hooks, StepKey::Enrich, StepStatus::Done)?;

        let dominant_color = match color_task {
            Some(task) => task.await.unwrap_or(None),
            None => None,
        };

        Ok(ScanReport {
            scan_id,
            outcome,
            identities,
            dominant_color,
        })
    }

    /// Upload with the rate-limit retry cycle: each 429 starts a countdown,
    /// and the original upload is retried exactly once when it reaches zero.
    /// Consecutive 429s restart the cycle. Step state is held (not reset)
    /// while a retry is pending.
    async fn upload_with_retry(
        &self,
        blob: Bytes,
        cancel: &CancellationToken,
        hooks: &ScanHooks,
    ) -> Result<ScanOutcome, ScanError> {
        let progress = hooks.on_progress.clone().unwrap_or_else(noop_progress);

        loop {
            if cancel.is_cancelled() {
                return Err(ScanError::Aborted);
            }

            let session =
                self.client
                    .start_upload_with_token(blob.clone(), progress.clone(), cancel.child_token());
            match session.finish().await {
                Ok(outcome) => return Ok(outcome),
                Err(err) if err.is_rate_limited() => {
                    let seconds = err
                        .retry_after_seconds()
                        .unwrap_or(shelfscan_core::DEFAULT_RETRY_AFTER_SECS);
                    tracing::warn!(seconds, "Rate limited, scheduling automatic retry");

                    let retry = RetrySession::start(seconds);
                    if let Some(on_retry) = &hooks.on_retry {
                        on_retry(retry.subscribe());
                    }
                    let canceller = retry.canceller();

                    let finished = tokio::select! {
                        _ = cancel.cancelled() => {
                            canceller.cancel();
                            false
                        }
                        finished = retry.completed() => finished,
                    };
                    if !finished {
                        return Err(ScanError::Aborted);
                    }
                    // Loop retries the original upload once; a further 429
                    // starts the next cycle.
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn reset_steps(&self, hooks: &ScanHooks) {
        self.steps.lock().unwrap().reset();
        if let Some(on_step) = &hooks.on_step {
            for key in StepKey::ALL {
                on_step(key, StepStatus::Pending);
            }
        }
    }

    fn transition(
        &self,
        hooks: &ScanHooks,
        key: StepKey,
        status: StepStatus,
    ) -> Result<(), ScanError> {
        {
            let mut steps = self.steps.lock().unwrap();
            let result = match status {
                StepStatus::Active => steps.activate(key),
                StepStatus::Done => steps.complete(key),
                StepStatus::Pending => Ok(steps.reset()),
            };
            result.map_err(|e| ScanError::Internal(format!("step machine violation: {}", e)))?;
        }

        tracing::debug!(step = key.label(), status = ?status, "Pipeline step transition");
        if let Some(on_step) = &hooks.on_step {
            on_step(key, status);
        }
        Ok(())
    }
}
