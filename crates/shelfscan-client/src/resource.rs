//! Manually managed resources: preview files and the camera handle.
//!
//! Previews and the camera stream are the only resources in the pipeline
//! that are not reclaimed by ordinary ownership. Both get explicit
//! acquire/release semantics here, with `Drop` as a backstop so teardown is
//! deterministic instead of waiting on collection.

use shelfscan_core::ScanError;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Holds at most one locally generated preview file.
///
/// Previews are exclusive-use-once: writing a new preview releases the
/// previous file before the replacement exists, and clearing or dropping the
/// slot releases the last one.
#[derive(Default)]
pub struct PreviewSlot {
    current: Option<NamedTempFile>,
}

impl PreviewSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `bytes` as the new preview, releasing any previous one first.
    pub fn replace(&mut self, bytes: &[u8]) -> Result<std::path::PathBuf, ScanError> {
        // Release before replace, never after
        self.clear();

        let mut file = NamedTempFile::with_prefix("shelfscan-preview-")
            .map_err(|e| ScanError::Internal(format!("preview file create failed: {}", e)))?;
        file.write_all(bytes)
            .map_err(|e| ScanError::Internal(format!("preview file write failed: {}", e)))?;

        let path = file.path().to_path_buf();
        self.current = Some(file);
        Ok(path)
    }

    /// Release the current preview, if any.
    pub fn clear(&mut self) {
        if let Some(file) = self.current.take() {
            tracing::debug!(path = %file.path().display(), "Releasing preview file");
            drop(file);
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.current.as_ref().map(|file| file.path())
    }
}

/// A camera-like capture source. Implementations wrap the platform capture
/// API; `stop` must release the underlying hardware stream.
pub trait CaptureDevice: Send {
    fn stop(&mut self);
}

/// Exclusive guard over one open capture stream.
///
/// The camera is a single exclusive hardware resource: exactly one stream
/// may be open at a time, and it must be released when the capture surface
/// closes, the page is hidden, or the owning scope is torn down. `release`
/// is idempotent; `Drop` releases as a backstop.
pub struct CaptureGuard<D: CaptureDevice> {
    device: Option<D>,
}

impl<D: CaptureDevice> CaptureGuard<D> {
    pub fn acquire(device: D) -> Self {
        Self {
            device: Some(device),
        }
    }

    /// Stop the stream now. Safe to call more than once.
    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            tracing::debug!("Releasing capture stream");
            device.stop();
        }
    }

    pub fn is_released(&self) -> bool {
        self.device.is_none()
    }
}

impl<D: CaptureDevice> Drop for CaptureGuard<D> {
    fn drop(&mut self) {
        self.release();
    }
}
