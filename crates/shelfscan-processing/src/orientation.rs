//! EXIF orientation handling.
//!
//! Decoding with `image` does not apply the EXIF orientation tag, so the
//! sanitizer and downscaler read it here and redraw accordingly. The tag
//! itself never survives: both stages re-encode from raw pixels.

use image::{imageops, DynamicImage};
use std::io::Cursor;

/// Read the EXIF orientation tag (1-8) from raw image bytes.
/// Returns 1 (normal) when the image has no parseable EXIF block.
pub fn read_orientation(data: &[u8]) -> u8 {
    let mut cursor = Cursor::new(data);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(reader) => reader,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(|v| v as u8)
        .unwrap_or(1)
}

/// Rotation and flips needed for a given EXIF orientation.
/// Returns (clockwise rotate angle, flip horizontal, flip vertical).
pub fn orientation_transforms(orientation: u8) -> (Option<u16>, bool, bool) {
    match orientation {
        1 => (None, false, false),      // Normal
        2 => (None, true, false),       // Mirror horizontal
        3 => (Some(180), false, false), // Rotate 180
        4 => (None, false, true),       // Mirror vertical
        5 => (Some(270), true, false),  // Mirror horizontal + rotate 270 CW
        6 => (Some(90), false, false),  // Rotate 90 CW
        7 => (Some(90), true, false),   // Mirror horizontal + rotate 90 CW
        8 => (Some(270), false, false), // Rotate 270 CW
        _ => (None, false, false),      // Invalid, treat as normal
    }
}

/// Redraw `img` so its visual orientation matches what the EXIF tag in
/// `data` declared.
pub fn apply_orientation(mut img: DynamicImage, data: &[u8]) -> DynamicImage {
    let orientation = read_orientation(data);
    let (rotate, flip_h, flip_v) = orientation_transforms(orientation);

    if orientation != 1 {
        tracing::debug!(
            orientation,
            rotate = ?rotate,
            flip_horizontal = flip_h,
            flip_vertical = flip_v,
            "Applying EXIF orientation"
        );
    }

    if let Some(angle) = rotate {
        img = match angle {
            90 => DynamicImage::ImageRgba8(imageops::rotate90(&img.to_rgba8())),
            180 => DynamicImage::ImageRgba8(imageops::rotate180(&img.to_rgba8())),
            270 => DynamicImage::ImageRgba8(imageops::rotate270(&img.to_rgba8())),
            _ => img,
        };
    }
    if flip_h {
        img = DynamicImage::ImageRgba8(imageops::flip_horizontal(&img.to_rgba8()));
    }
    if flip_v {
        img = DynamicImage::ImageRgba8(imageops::flip_vertical(&img.to_rgba8()));
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    #[test]
    fn transforms_cover_all_orientations() {
        assert_eq!(orientation_transforms(1), (None, false, false));
        assert_eq!(orientation_transforms(2), (None, true, false));
        assert_eq!(orientation_transforms(3), (Some(180), false, false));
        assert_eq!(orientation_transforms(4), (None, false, true));
        assert_eq!(orientation_transforms(5), (Some(270), true, false));
        assert_eq!(orientation_transforms(6), (Some(90), false, false));
        assert_eq!(orientation_transforms(7), (Some(90), true, false));
        assert_eq!(orientation_transforms(8), (Some(270), false, false));
    }

    #[test]
    fn invalid_orientation_is_identity() {
        assert_eq!(orientation_transforms(0), (None, false, false));
        assert_eq!(orientation_transforms(9), (None, false, false));
        assert_eq!(orientation_transforms(255), (None, false, false));
    }

    #[test]
    fn no_exif_means_no_transform() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255])));
        // Plain PNG bytes carry no EXIF
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        assert_eq!(read_orientation(&png), 1);
        let out = apply_orientation(img.clone(), &png);
        assert_eq!(out.dimensions(), img.dimensions());
    }
}
