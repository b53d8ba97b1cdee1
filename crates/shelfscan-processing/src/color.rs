//! Dominant background color extraction.
//!
//! Samples the outer border of a preview image and clusters the samples with
//! a small fixed-iteration k-means. Border pixels represent the photographed
//! wall or shelf surface rather than the book covers in the center, which is
//! what the UI wants to tint against. Extraction is best-effort presentation
//! logic: it returns `None` instead of erroring, and must never block or
//! fail the upload path.

use shelfscan_core::RgbColor;

/// Long-edge bound for the clustering input; caps cost.
const SAMPLE_MAX_EDGE: u32 = 128;

/// Fraction of width/height taken from each edge as the border strip.
const BORDER_FRACTION: f32 = 0.12;

/// Samples with alpha at or below this (of 255) are ignored.
const ALPHA_CUTOFF: u8 = 8;

const KMEANS_ITERATIONS: usize = 10;
const KMEANS_MAX_CLUSTERS: usize = 6;
const KMEANS_PREFERRED_CLUSTERS: usize = 3;

/// Extract the dominant border color of an encoded image.
///
/// Returns `None` when the image cannot be decoded or when no opaque border
/// pixels exist; callers treat that as "no color available", not an error.
pub fn extract_dominant_color(data: &[u8]) -> Option<RgbColor> {
    let img = match image::load_from_memory(data) {
        Ok(img) => img,
        Err(err) => {
            tracing::debug!(error = %err, "Preview decode failed, no dominant color");
            return None;
        }
    };

    let img = if img.width().max(img.height()) > SAMPLE_MAX_EDGE {
        img.thumbnail(SAMPLE_MAX_EDGE, SAMPLE_MAX_EDGE)
    } else {
        img
    };

    let samples = border_samples(&img.to_rgba8());
    if samples.is_empty() {
        return None;
    }

    let dominant = kmeans_dominant(&samples);
    Some(RgbColor::new(dominant[0], dominant[1], dominant[2]))
}

/// Collect normalized RGB samples from the border strips of the image.
fn border_samples(rgba: &image::RgbaImage) -> Vec<[f32; 3]> {
    let (width, height) = rgba.dimensions();
    let strip_x = ((width as f32 * BORDER_FRACTION).round() as u32).max(1);
    let strip_y = ((height as f32 * BORDER_FRACTION).round() as u32).max(1);

    let mut samples = Vec::new();
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let in_border = x < strip_x || x >= width.saturating_sub(strip_x)
            || y < strip_y
            || y >= height.saturating_sub(strip_y);
        if !in_border || pixel[3] <= ALPHA_CUTOFF {
            continue;
        }
        samples.push([
            pixel[0] as f32 / 255.0,
            pixel[1] as f32 / 255.0,
            pixel[2] as f32 / 255.0,
        ]);
    }
    samples
}

fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dr = a[0] - b[0];
    let dg = a[1] - b[1];
    let db = a[2] - b[2];
    dr * dr + dg * dg + db * db
}

fn nearest_centroid(sample: &[f32; 3], centroids: &[[f32; 3]]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (i, centroid) in centroids.iter().enumerate() {
        let dist = squared_distance(sample, centroid);
        if dist < best_dist {
            best_dist = dist;
            best = i;
        }
    }
    best
}

/// Fixed-iteration k-means over the samples; returns the centroid of the
/// largest cluster. Centroids are seeded at evenly spaced sample indices so
/// the result is deterministic.
fn kmeans_dominant(samples: &[[f32; 3]]) -> [f32; 3] {
    let n = samples.len();
    let k = KMEANS_PREFERRED_CLUSTERS.clamp(1, n.min(KMEANS_MAX_CLUSTERS));

    let stride = n / k;
    let mut centroids: Vec<[f32; 3]> = (0..k).map(|i| samples[i * stride]).collect();

    let mut assignments = vec![0usize; n];
    for _ in 0..KMEANS_ITERATIONS {
        for (i, sample) in samples.iter().enumerate() {
            assignments[i] = nearest_centroid(sample, &centroids);
        }

        let mut sums = vec![[0.0f32; 3]; k];
        let mut counts = vec![0usize; k];
        for (sample, &cluster) in samples.iter().zip(&assignments) {
            sums[cluster][0] += sample[0];
            sums[cluster][1] += sample[1];
            sums[cluster][2] += sample[2];
            counts[cluster] += 1;
        }
        for cluster in 0..k {
            // Empty clusters keep their previous position
            if counts[cluster] > 0 {
                let count = counts[cluster] as f32;
                centroids[cluster] = [
                    sums[cluster][0] / count,
                    sums[cluster][1] / count,
                    sums[cluster][2] / count,
                ];
            }
        }
    }

    // Final assignment against the settled centroids decides cluster sizes
    let mut counts = vec![0usize; k];
    for sample in samples {
        counts[nearest_centroid(sample, &centroids)] += 1;
    }
    let largest = counts
        .iter()
        .enumerate()
        .max_by_key(|(_, &count)| count)
        .map(|(i, _)| i)
        .unwrap_or(0);

    centroids[largest]
}
