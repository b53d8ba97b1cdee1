//! Image asset flowing through the pipeline.

use bytes::Bytes;
use std::time::SystemTime;

/// One image payload between pipeline stages.
///
/// Every stage produces a new `ImageAsset`; stages never mutate an asset in
/// place, and once an asset is handed to the next stage the previous owner
/// must not reuse it. Every asset leaving the sanitizer carries
/// `image/jpeg` and no EXIF segment.
#[derive(Clone, Debug)]
pub struct ImageAsset {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: String,
    /// Source file modification time, preserved across conversion.
    pub modified: Option<SystemTime>,
}

impl ImageAsset {
    pub fn new(
        bytes: impl Into<Bytes>,
        content_type: impl Into<String>,
        file_name: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.into(),
            file_name: file_name.into(),
            modified: None,
        }
    }

    pub fn with_modified(mut self, modified: SystemTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The asset's file name with its extension rewritten to `.jpg`.
    pub fn jpeg_file_name(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => format!("{}.jpg", stem),
            _ => format!("{}.jpg", self.file_name),
        }
    }
}
