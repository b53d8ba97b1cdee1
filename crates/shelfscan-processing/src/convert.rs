//! HEIC/HEIF to JPEG conversion.
//!
//! HEIC cannot be decoded by the standard raster path, so it is converted
//! up front and the rest of the pipeline only ever sees JPEG. Conversion
//! failures abort the scan with the underlying message; there is no silent
//! fallback. Decoding is provided by libheif behind the `heic` feature;
//! builds without it still classify HEIC correctly but fail conversion with
//! a descriptive error.

use shelfscan_core::{ImageAsset, ScanError};

/// JPEG quality for converted HEIC output.
pub const CONVERT_JPEG_QUALITY: u8 = 90;

/// Converts HEIC/HEIF assets to JPEG.
pub struct HeicConverter;

impl HeicConverter {
    /// Convert a HEIC asset to a JPEG asset.
    ///
    /// The output file name is rewritten to `.jpg`, the content type forced
    /// to `image/jpeg`, and the source modification time preserved.
    pub async fn to_jpeg(&self, asset: &ImageAsset) -> Result<ImageAsset, ScanError> {
        let input = asset.clone();
        let converted = tokio::task::spawn_blocking(move || convert_sync(&input))
            .await
            .map_err(ScanError::conversion)??;

        tracing::debug!(
            file_name = %converted.file_name,
            input_bytes = asset.len(),
            output_bytes = converted.len(),
            "Converted HEIC to JPEG"
        );
        Ok(converted)
    }
}

#[cfg(feature = "heic")]
fn convert_sync(asset: &ImageAsset) -> Result<ImageAsset, ScanError> {
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let lib_heif = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(asset.bytes.as_ref())
        .map_err(ScanError::conversion)?;
    let handle = ctx.primary_image_handle().map_err(ScanError::conversion)?;
    let decoded = lib_heif
        .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(ScanError::conversion)?;

    let planes = decoded.planes();
    let interleaved = planes
        .interleaved
        .ok_or_else(|| ScanError::Conversion("decoder returned no RGB plane".to_string()))?;

    let width = interleaved.width;
    let height = interleaved.height;
    let stride = interleaved.stride;

    // Rows may be padded to the decoder's stride; copy them out tightly.
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for row in 0..height as usize {
        let start = row * stride;
        rgb.extend_from_slice(&interleaved.data[start..start + width as usize * 3]);
    }
    let buffer = image::RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| ScanError::Conversion("decoded plane has unexpected size".to_string()))?;

    let bytes = crate::sanitize::encode_jpeg(&image::DynamicImage::ImageRgb8(buffer), CONVERT_JPEG_QUALITY)
        .map_err(ScanError::conversion)?;

    let mut out = ImageAsset::new(bytes, "image/jpeg", asset.jpeg_file_name());
    if let Some(modified) = asset.modified {
        out = out.with_modified(modified);
    }
    Ok(out)
}

#[cfg(not(feature = "heic"))]
fn convert_sync(_asset: &ImageAsset) -> Result<ImageAsset, ScanError> {
    Err(ScanError::Conversion(
        "HEIC decoding is not available in this build (enable the `heic` feature)".to_string(),
    ))
}
