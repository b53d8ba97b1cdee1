//! Privacy sanitization.
//!
//! Every image is redrawn from raw pixels and re-encoded as JPEG before it
//! leaves the device. A fresh encode carries no source metadata, so GPS and
//! the rest of the EXIF block are removed by construction rather than by
//! parsing, regardless of whether the image is later resized. The embedded
//! orientation is applied first so the visual result is unchanged.

use anyhow::{Context, Result};
use bytes::Bytes;
use image::{DynamicImage, ImageReader};
use shelfscan_core::{ImageAsset, ScanError};
use std::io::Cursor;

use crate::orientation;

/// JPEG quality for sanitized full-resolution output.
pub const SANITIZE_JPEG_QUALITY: u8 = 90;

/// Encode a decoded image as baseline-progressive JPEG at the given quality.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Bytes> {
    let rgb_img = img.to_rgb8();
    let (width, height) = rgb_img.dimensions();

    let mut comp = mozjpeg::Compress::new(mozjpeg::ColorSpace::JCS_RGB);
    comp.set_size(width as usize, height as usize);
    comp.set_quality(quality as f32);
    comp.set_progressive_mode();
    comp.set_optimize_coding(true);

    let mut comp = comp
        .start_compress(Vec::new())
        .context("JPEG compressor start failed")?;
    comp.write_scanlines(&rgb_img)
        .context("JPEG scanline write failed")?;
    let jpeg_data = comp.finish().context("JPEG compressor finish failed")?;

    Ok(Bytes::from(jpeg_data))
}

/// Whether the bytes still carry an EXIF segment. Used for logging and to
/// back the sanitizer's invariant in tests.
pub fn has_exif(data: &[u8]) -> bool {
    use img_parts::ImageEXIF;

    if let Ok(jpeg) = img_parts::jpeg::Jpeg::from_bytes(data.to_vec().into()) {
        return jpeg.exif().is_some();
    }
    if let Ok(png) = img_parts::png::Png::from_bytes(data.to_vec().into()) {
        return png.exif().is_some();
    }
    false
}

/// Strips all metadata from an image by redrawing it.
pub struct Sanitizer;

impl Sanitizer {
    /// Produce a metadata-free JPEG asset from any decodable input.
    ///
    /// Runs unconditionally on every image regardless of source format; a
    /// failure here is fatal to the scan, because raw bytes must never reach
    /// the upload path.
    pub async fn sanitize(&self, asset: &ImageAsset) -> Result<ImageAsset, ScanError> {
        let input = asset.clone();
        let sanitized = tokio::task::spawn_blocking(move || sanitize_sync(&input))
            .await
            .map_err(ScanError::sanitization)?
            .map_err(ScanError::sanitization)?;

        tracing::debug!(
            file_name = %sanitized.file_name,
            input_bytes = asset.len(),
            output_bytes = sanitized.len(),
            "Sanitized image"
        );
        Ok(sanitized)
    }
}

fn sanitize_sync(asset: &ImageAsset) -> Result<ImageAsset> {
    let img = ImageReader::new(Cursor::new(asset.bytes.as_ref()))
        .with_guessed_format()
        .context("Unrecognized image container")?
        .decode()
        .context("Image decode failed")?;

    // Orientation from the original bytes; the redraw below discards the tag.
    let img = orientation::apply_orientation(img, asset.bytes.as_ref());
    let bytes = encode_jpeg(&img, SANITIZE_JPEG_QUALITY)?;

    let mut out = ImageAsset::new(bytes, "image/jpeg", asset.jpeg_file_name());
    if let Some(modified) = asset.modified {
        out = out.with_modified(modified);
    }
    Ok(out)
}
