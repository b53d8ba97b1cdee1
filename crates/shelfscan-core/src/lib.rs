//! Shelfscan Core Library
//!
//! This crate provides the domain models, error types, and configuration
//! shared across all shelfscan components.

pub mod config;
pub mod error;
pub mod models;

// Re-export commonly used types
pub use config::{GatewayConfig, DEFAULT_GATEWAY_URL, DEFAULT_RETRY_AFTER_SECS};
pub use error::{ErrorPresentation, LogLevel, ScanError};
pub use models::{
    BookIdentity, BoundingBox, EnrichedBook, ImageAsset, RgbColor, ScanOutcome, ScanResult,
    ScoredBook, UploadProgress, UploadStage, UserPreferences,
};
