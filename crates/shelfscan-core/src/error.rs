//! Error types module
//!
//! All failures in the scan pipeline are unified under the [`ScanError`] enum.
//! Each variant maps onto one phase of the pipeline: format gating, HEIC
//! conversion, sanitization, background downscaling, and the network transfer.
//!
//! Errors self-describe their presentation through [`ErrorPresentation`]: the
//! orchestration layer reads the user-facing message, recoverability, and log
//! level from the error instead of matching on variants at every call site.

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for locally recovered issues like worker fallbacks
    Warn,
    /// Error level - for failures that abort the scan
    Error,
}

/// Presentation metadata for errors - defines how an error is shown and logged.
/// The notification channel that renders messages is an external collaborator;
/// this trait is the single point it reads from.
pub trait ErrorPresentation {
    /// Human-readable message suitable for the notification channel
    fn user_message(&self) -> String;

    /// Whether the failure is recovered or retried rather than aborting the scan
    fn is_recoverable(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// File type rejected before any processing. The message distinguishes
    /// non-image files from unsupported image formats.
    #[error("{0}")]
    Format(String),

    #[error("HEIC conversion failed: {0}")]
    Conversion(String),

    #[error("Image sanitization failed: {0}")]
    Sanitization(String),

    /// Background downscale failed or timed out. Recovered locally via the
    /// synchronous fallback; never surfaced to the user.
    #[error("Downscale worker failed: {0}")]
    Worker(String),

    /// No response received from the gateway at all.
    #[error("Network error: {0}")]
    Network(String),

    /// Gateway responded with a non-success status.
    #[error("Gateway returned status {status}")]
    Http {
        status: u16,
        retry_after: Option<u64>,
        message: Option<String>,
    },

    /// The caller cancelled the in-flight transfer or retry countdown.
    #[error("Upload aborted")]
    Aborted,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Allowed non-HEIC image formats, for user-facing messages.
pub const ALLOWED_FORMATS_LABEL: &str = "JPEG, PNG, WEBP, GIF, BMP, TIFF, or HEIC";

impl ScanError {
    /// File is not an image at all (e.g. `text/plain`).
    pub fn not_an_image(content_type: &str) -> Self {
        ScanError::Format(format!(
            "That file is not a photo ({}). Please choose an image file.",
            if content_type.is_empty() {
                "unknown type"
            } else {
                content_type
            }
        ))
    }

    /// File is an image, but not in a format the pipeline accepts.
    pub fn unsupported_format(content_type: &str) -> Self {
        ScanError::Format(format!(
            "Unsupported image format {}. Please use {}.",
            content_type, ALLOWED_FORMATS_LABEL
        ))
    }

    pub fn conversion(err: impl std::fmt::Display) -> Self {
        ScanError::Conversion(err.to_string())
    }

    pub fn sanitization(err: impl std::fmt::Display) -> Self {
        ScanError::Sanitization(err.to_string())
    }

    pub fn worker(err: impl std::fmt::Display) -> Self {
        ScanError::Worker(err.to_string())
    }

    pub fn network(err: impl std::fmt::Display) -> Self {
        ScanError::Network(err.to_string())
    }

    /// Seconds to wait before the automatic retry, when this error is a
    /// rate-limit response.
    pub fn retry_after_seconds(&self) -> Option<u64> {
        match self {
            ScanError::Http {
                status: 429,
                retry_after,
                ..
            } => Some(retry_after.unwrap_or(crate::config::DEFAULT_RETRY_AFTER_SECS)),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ScanError::Http { status: 429, .. })
    }
}

impl ErrorPresentation for ScanError {
    fn user_message(&self) -> String {
        match self {
            ScanError::Format(msg) => msg.clone(),
            ScanError::Conversion(msg) => {
                format!("Couldn't convert this HEIC photo: {}", msg)
            }
            ScanError::Sanitization(_) => {
                "Couldn't prepare this photo for upload. Please try another one.".to_string()
            }
            ScanError::Worker(_) => "Retrying photo optimization".to_string(),
            ScanError::Network(_) => {
                "Scan failed. Check your connection and try again.".to_string()
            }
            ScanError::Http {
                status: 413, ..
            } => "That photo is too large to scan. Try a smaller one.".to_string(),
            ScanError::Http {
                status: 415, ..
            } => format!(
                "The gateway rejected this image type. Please use {}.",
                ALLOWED_FORMATS_LABEL
            ),
            ScanError::Http {
                status: 429,
                retry_after,
                ..
            } => format!(
                "Too many scans right now. Retrying in {} seconds.",
                retry_after.unwrap_or(crate::config::DEFAULT_RETRY_AFTER_SECS)
            ),
            ScanError::Http {
                status, message, ..
            } => message
                .clone()
                .unwrap_or_else(|| format!("Scan failed (status {}). Please try again.", status)),
            ScanError::Aborted => "Scan cancelled.".to_string(),
            ScanError::Config(msg) => msg.clone(),
            ScanError::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            // Worker failures fall back to the synchronous path; 429s are
            // retried after the countdown.
            ScanError::Worker(_) => true,
            ScanError::Http { status: 429, .. } => true,
            _ => false,
        }
    }

    fn log_level(&self) -> LogLevel {
        match self {
            ScanError::Format(_) | ScanError::Aborted => LogLevel::Debug,
            ScanError::Worker(_) | ScanError::Http { status: 429, .. } => LogLevel::Warn,
            ScanError::Http { status, .. } if *status < 500 => LogLevel::Warn,
            _ => LogLevel::Error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_errors_are_distinct() {
        let not_image = ScanError::not_an_image("text/plain");
        let unsupported = ScanError::unsupported_format("image/x-icon");
        assert!(not_image.user_message().contains("not a photo"));
        assert!(unsupported.user_message().contains("Unsupported image format"));
        assert_ne!(not_image.user_message(), unsupported.user_message());
    }

    #[test]
    fn rate_limit_retry_after_defaults() {
        let explicit = ScanError::Http {
            status: 429,
            retry_after: Some(5),
            message: None,
        };
        assert_eq!(explicit.retry_after_seconds(), Some(5));

        let absent = ScanError::Http {
            status: 429,
            retry_after: None,
            message: None,
        };
        assert_eq!(
            absent.retry_after_seconds(),
            Some(crate::config::DEFAULT_RETRY_AFTER_SECS)
        );

        let other = ScanError::Network("offline".to_string());
        assert_eq!(other.retry_after_seconds(), None);
    }

    #[test]
    fn http_status_guidance() {
        let too_large = ScanError::Http {
            status: 413,
            retry_after: None,
            message: None,
        };
        assert!(too_large.user_message().contains("too large"));

        let backend_message = ScanError::Http {
            status: 500,
            retry_after: None,
            message: Some("model unavailable".to_string()),
        };
        assert_eq!(backend_message.user_message(), "model unavailable");

        let generic = ScanError::Http {
            status: 502,
            retry_after: None,
            message: None,
        };
        assert!(generic.user_message().contains("502"));
    }

    #[test]
    fn recoverability() {
        assert!(ScanError::Worker("timeout".to_string()).is_recoverable());
        assert!(ScanError::Http {
            status: 429,
            retry_after: None,
            message: None
        }
        .is_recoverable());
        assert!(!ScanError::Sanitization("decode".to_string()).is_recoverable());
        assert_eq!(
            ScanError::Worker("timeout".to_string()).log_level(),
            LogLevel::Warn
        );
    }
}
