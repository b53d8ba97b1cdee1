//! Domain models shared across the pipeline.

pub mod book;
pub mod color;
pub mod image;
pub mod progress;

pub use book::{
    BookIdentity, BoundingBox, EnrichedBook, ScanOutcome, ScanResult, ScoredBook, UserPreferences,
};
pub use color::RgbColor;
pub use image::ImageAsset;
pub use progress::{UploadProgress, UploadStage};
