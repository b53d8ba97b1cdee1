//! Image acquisition pipeline stages.
//!
//! Everything between a raw user-selected photo and an upload-ready JPEG:
//! format gating, HEIC conversion, privacy sanitization, size bounding with
//! background offload, and dominant-color extraction for theming.

pub mod color;
pub mod convert;
pub mod downscale;
pub mod format;
pub mod orientation;
pub mod sanitize;

pub use color::extract_dominant_color;
pub use convert::HeicConverter;
pub use downscale::{downscale_sync, DownscaleService, OFFLOAD_THRESHOLD_BYTES};
pub use format::{classify, ensure_supported, FormatClass};
pub use sanitize::{has_exif, Sanitizer};
