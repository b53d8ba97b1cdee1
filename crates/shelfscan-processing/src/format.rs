//! Format gating for selected photos.
//!
//! Classification works from the declared content type with a filename
//! fallback for HEIC, because several platforms hand HEIC files over with a
//! missing or generic content type.

use shelfscan_core::ScanError;

/// Non-HEIC content types the pipeline accepts.
pub const SUPPORTED_IMAGE_TYPES: [&str; 7] = [
    "image/jpeg",
    "image/jpg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/bmp",
    "image/tiff",
];

/// HEIC/HEIF content types, routed through conversion first.
pub const HEIC_IMAGE_TYPES: [&str; 4] = [
    "image/heic",
    "image/heif",
    "image/heic-sequence",
    "image/heif-sequence",
];

/// Classification of one selected file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatClass {
    pub supported: bool,
    pub is_heic: bool,
}

fn has_heic_suffix(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    lower.ends_with(".heic") || lower.ends_with(".heif")
}

/// Content types that carry no format information.
fn is_generic_type(content_type: &str) -> bool {
    content_type.is_empty() || content_type == "application/octet-stream"
}

/// Classify a file by declared content type and file name. Infallible; the
/// pipeline gate is [`ensure_supported`].
pub fn classify(content_type: &str, file_name: &str) -> FormatClass {
    let normalized = content_type.trim().to_lowercase();

    if HEIC_IMAGE_TYPES.contains(&normalized.as_str()) {
        return FormatClass {
            supported: true,
            is_heic: true,
        };
    }

    // Some platforms report HEIC files with a missing or generic type; the
    // suffix is the only signal left.
    if is_generic_type(&normalized) && has_heic_suffix(file_name) {
        return FormatClass {
            supported: true,
            is_heic: true,
        };
    }

    FormatClass {
        supported: SUPPORTED_IMAGE_TYPES.contains(&normalized.as_str()),
        is_heic: false,
    }
}

/// Gate used by the pipeline: classification plus the user-facing rejection,
/// distinguishing non-image files from unsupported image formats.
pub fn ensure_supported(content_type: &str, file_name: &str) -> Result<FormatClass, ScanError> {
    let class = classify(content_type, file_name);
    if class.supported {
        return Ok(class);
    }

    let normalized = content_type.trim().to_lowercase();
    if !normalized.starts_with("image/") {
        tracing::debug!(content_type, file_name, "Rejected non-image file");
        return Err(ScanError::not_an_image(content_type));
    }

    tracing::debug!(content_type, file_name, "Rejected unsupported image format");
    Err(ScanError::unsupported_format(content_type))
}
