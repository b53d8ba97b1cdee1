//! Configuration module
//!
//! The pipeline consumes a single external setting: the base URL of the scan
//! gateway, read from `SHELFSCAN_GATEWAY_URL`. The value must be an absolute
//! `http`/`https` URL; anything else falls back to the default local gateway.

use crate::error::ScanError;

/// Fallback gateway when no valid base URL is configured.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8000";

/// Seconds to wait before retrying a rate-limited upload when the gateway
/// omits the `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 15;

/// Default bound on the long edge of uploaded images, in pixels.
pub const DEFAULT_MAX_LONG_EDGE: u32 = 2048;

const GATEWAY_URL_ENV: &str = "SHELFSCAN_GATEWAY_URL";

/// Gateway connection configuration.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    base_url: String,
}

impl GatewayConfig {
    /// Build from an explicit base URL. Fails on anything that is not an
    /// absolute `http`/`https` URL.
    pub fn new(base_url: &str) -> Result<Self, ScanError> {
        match validate_base_url(base_url) {
            Some(url) => Ok(Self { base_url: url }),
            None => Err(ScanError::Config(format!(
                "Invalid gateway URL: {:?} (expected an absolute http/https URL)",
                base_url
            ))),
        }
    }

    /// Build from `SHELFSCAN_GATEWAY_URL`. Invalid or empty values fall back
    /// to [`DEFAULT_GATEWAY_URL`] with a warning rather than failing startup.
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(GATEWAY_URL_ENV).ok().as_deref())
    }

    fn from_value(value: Option<&str>) -> Self {
        match value.and_then(validate_base_url) {
            Some(url) => Self { base_url: url },
            None => {
                if let Some(raw) = value {
                    if !raw.trim().is_empty() {
                        tracing::warn!(
                            url = raw,
                            fallback = DEFAULT_GATEWAY_URL,
                            "Ignoring invalid gateway URL"
                        );
                    }
                }
                Self {
                    base_url: DEFAULT_GATEWAY_URL.to_string(),
                }
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Upload endpoint for shelf photos.
    pub fn scan_endpoint(&self) -> String {
        format!("{}/api/scan", self.base_url)
    }

    /// Enrichment collaborator endpoint.
    pub fn enrich_endpoint(&self) -> String {
        format!("{}/api/books/enrich", self.base_url)
    }

    /// Recommendation collaborator endpoint.
    pub fn recommend_endpoint(&self) -> String {
        format!("{}/api/recommend", self.base_url)
    }
}

/// Returns the normalized base URL (no trailing slash) when the input is a
/// well-formed absolute `http`/`https` URL.
fn validate_base_url(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = url::Url::parse(trimmed).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return None;
    }
    Some(trimmed.trim_end_matches('/').to_string())
}
