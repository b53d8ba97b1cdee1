//! Upload progress reporting.

use serde::{Deserialize, Serialize};

/// Coarse phase of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStage {
    Uploading,
    Processing,
    Complete,
}

/// One progress report delivered to the caller's callback.
///
/// `progress` is a 0-100 integer, monotonically non-decreasing within a
/// stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadProgress {
    pub stage: UploadStage,
    pub progress: u8,
    pub message: String,
}

impl UploadProgress {
    pub fn uploading(progress: u8) -> Self {
        Self {
            stage: UploadStage::Uploading,
            progress: progress.min(100),
            message: format!("Uploading photo ({}%)", progress.min(100)),
        }
    }

    pub fn processing() -> Self {
        Self {
            stage: UploadStage::Processing,
            progress: 100,
            message: "Analyzing shelf".to_string(),
        }
    }

    pub fn complete() -> Self {
        Self {
            stage: UploadStage::Complete,
            progress: 100,
            message: "Scan complete".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploading_caps_at_100() {
        assert_eq!(UploadProgress::uploading(250).progress, 100);
        assert_eq!(UploadProgress::uploading(42).progress, 42);
    }

    #[test]
    fn stage_serializes_lowercase() {
        let json = serde_json::to_string(&UploadProgress::processing()).unwrap();
        assert!(json.contains("\"processing\""));
    }
}
