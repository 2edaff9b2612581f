//! Grid-geometry detection.
//!
//! Recovers the ordered horizontal/vertical line positions that separate the
//! cells of a photographed grid. Detection walks an explicit sequence of
//! phases (primary morphology+Hough detection, a 1-D projection fallback,
//! one irregular-grid retry with a larger kernel) and fails hard when none
//! of them produces a usable geometry.

use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::{
    contrast::adaptive_threshold,
    distance_transform::Norm,
    edges::canny,
    hough::{detect_lines, LineDetectionOptions, PolarLine},
    morphology::{dilate, grayscale_open, Mask},
};
use tracing::*;

use crate::{
    config::DetectConfig,
    geometry::{median_spacing, GridGeometry},
    Axis, GridError, SmallVecLine,
};

/// Kernel length relative to the estimated line spacing.
const KERNEL_SPACING_FACTOR: f32 = 1.2;
/// Clamp for the adaptively sized kernel.
const KERNEL_LEN_MIN: u32 = 15;
const KERNEL_LEN_MAX: u32 = 60;
/// Kernel growth factor for the irregular-grid retry.
const RETRY_KERNEL_FACTOR: f32 = 1.5;
/// Side of the square opening that clears solid foreground regions, relative
/// to the line kernel length.
const BLOB_SIDE_RATIO: f32 = 0.25;
/// Peak finding over edge-projection profiles.
const PEAK_MIN_DISTANCE: usize = 10;
const PEAK_MIN_PROMINENCE: f32 = 0.05;
/// Canny band for the projection fallback and spacing estimation.
const CANNY_LOW: f32 = 50.0;
const CANNY_HIGH: f32 = 150.0;
/// Gaps beyond this multiple of the median spacing get synthetic inserts.
const NORMALIZE_GAP_RATIO: f32 = 1.4;
/// Re-merge distance after normalization, relative to the median spacing.
const REMERGE_SPACING_RATIO: f32 = 0.4;
/// A grid needs at least this many lines per axis.
const MIN_LINES_PER_AXIS: usize = 2;

/// Detection phases, in the order they are attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PrimaryDetect,
    ProjectionFallback,
    IrregularRetry,
}

/// Detects the grid geometry of `image`.
///
/// # Errors
/// - [`GridError::InvalidDimensions`] for empty images.
/// - [`GridError::InsufficientLines`] when fewer than 2 lines are found on
///   either axis after both primary detection and the projection fallback.
/// - [`GridError::IrregularGeometry`] when neither the first pass nor the
///   larger-kernel retry yields evenly spaced lines.
pub fn detect_grid(image: &DynamicImage, config: &DetectConfig) -> Result<GridGeometry, GridError> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        error!("Invalid image dimensions: width={}, height={}", width, height);
        return Err(GridError::InvalidDimensions { width, height });
    }

    let gray = image.to_luma8();
    let mut binary =
        adaptive_threshold(&gray, config.threshold_block_radius, config.threshold_delta);
    // Grid lines are dark in the photograph; make them foreground.
    imageops::invert(&mut binary);

    let kernel_len = grid_kernel_len(&gray, config);
    debug!(kernel_len, "structuring kernel length");
    let binary = suppress_solid_regions(&binary, kernel_len);

    let mut phase = Phase::PrimaryDetect;
    let (mut h_positions, mut v_positions) =
        axis_positions(&binary, kernel_len, config.vote_threshold, config);

    if h_positions.len() < MIN_LINES_PER_AXIS || v_positions.len() < MIN_LINES_PER_AXIS {
        debug!(
            horizontal = h_positions.len(),
            vertical = v_positions.len(),
            "primary detection found too few lines, falling back to projection"
        );
        phase = Phase::ProjectionFallback;
        (h_positions, v_positions) = projection_positions(&gray, config);
        if h_positions.len() < MIN_LINES_PER_AXIS || v_positions.len() < MIN_LINES_PER_AXIS {
            warn!(
                horizontal = h_positions.len(),
                vertical = v_positions.len(),
                "projection fallback still found too few lines"
            );
            return Err(GridError::InsufficientLines {
                horizontal: h_positions.len(),
                vertical: v_positions.len(),
            });
        }
    }

    let h_positions = postprocess_positions(h_positions, config);
    let v_positions = postprocess_positions(v_positions, config);

    let h_irregular = is_irregular(&h_positions, config);
    let v_irregular = is_irregular(&v_positions, config);
    if !h_irregular && !v_irregular {
        trace!(?phase, "accepted geometry");
        return Ok(build_geometry(h_positions, v_positions));
    }

    phase = Phase::IrregularRetry;
    let strong_kernel = (kernel_len as f32 * RETRY_KERNEL_FACTOR) as u32;
    debug!(
        ?phase,
        strong_kernel, "irregular spacing, retrying with larger kernel and stricter votes"
    );
    let (retry_h, retry_v) =
        axis_positions(&binary, strong_kernel, config.vote_threshold_strong, config);
    if retry_h.len() >= MIN_LINES_PER_AXIS && retry_v.len() >= MIN_LINES_PER_AXIS {
        let retry_h = postprocess_positions(retry_h, config);
        let retry_v = postprocess_positions(retry_v, config);
        if !is_irregular(&retry_h, config) && !is_irregular(&retry_v, config) {
            trace!(?phase, "retry produced a regular geometry");
            return Ok(build_geometry(retry_h, retry_v));
        }
    }

    let axis = if h_irregular { Axis::Rows } else { Axis::Columns };
    warn!(%axis, "grid geometry remained irregular after retry");
    Err(GridError::IrregularGeometry { axis })
}

fn build_geometry(h_positions: Vec<u32>, v_positions: Vec<u32>) -> GridGeometry {
    GridGeometry::new(
        SmallVecLine::from_vec(h_positions),
        SmallVecLine::from_vec(v_positions),
    )
}

/// Structuring-kernel length: the estimated line spacing scaled and clamped,
/// or a fixed ratio of the image size when estimation is inconclusive.
fn grid_kernel_len(gray: &GrayImage, config: &DetectConfig) -> u32 {
    if let Some(spacing) = estimate_line_spacing(gray) {
        return ((spacing * KERNEL_SPACING_FACTOR) as u32).clamp(KERNEL_LEN_MIN, KERNEL_LEN_MAX);
    }
    let (width, height) = gray.dimensions();
    config
        .kernel_len_min
        .max((width.min(height) as f32 * config.kernel_len_ratio) as u32)
}

/// Clears foreground regions that are thicker than a line in both directions.
///
/// Flat areas (plain margins, pale panels) can land on the foreground side of
/// the adaptive threshold, and a wide enough one reads as a grid line after
/// the axis openings. Anything that survives an opening with a small square
/// element is such a region rather than a line; it is cleared together with a
/// half-side dilation to catch its fringe.
fn suppress_solid_regions(binary: &GrayImage, kernel_len: u32) -> GrayImage {
    let side = ((kernel_len as f32 * BLOB_SIDE_RATIO) as u32).clamp(3, 255);
    let square = GrayImage::from_pixel(side, side, Luma([255u8]));
    let square = Mask::from_image(&square, (side / 2) as u8, (side / 2) as u8);
    let blobs = grayscale_open(binary, &square);
    let blobs = dilate(&blobs, Norm::LInf, (side / 2) as u8);

    let mut cleaned = binary.clone();
    for (x, y, pixel) in blobs.enumerate_pixels() {
        if pixel[0] > 0 {
            cleaned.put_pixel(x, y, Luma([0]));
        }
    }
    cleaned
}

/// Estimates the dominant line spacing from edge-projection peaks.
///
/// Returns `None` when neither axis shows enough peaks to take a median gap.
fn estimate_line_spacing(gray: &GrayImage) -> Option<f32> {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let (row_profile, col_profile) = edge_profiles(&edges);

    let mut spacings = Vec::new();
    for profile in [row_profile, col_profile] {
        let max = profile.iter().cloned().fold(0.0f32, f32::max);
        if max <= 0.0 {
            continue;
        }
        let normalized: Vec<f32> = profile.iter().map(|v| v / max).collect();
        let peaks = find_peaks(&normalized, PEAK_MIN_DISTANCE, PEAK_MIN_PROMINENCE);
        if peaks.len() > 2 {
            let positions: Vec<u32> = peaks.iter().map(|&p| p as u32).collect();
            spacings.push(median_spacing(&positions));
        }
    }

    if spacings.is_empty() {
        None
    } else {
        Some(spacings.iter().sum::<f32>() / spacings.len() as f32)
    }
}

/// Per-axis counts of edge pixels: `row_profile[y]` and `col_profile[x]`.
fn edge_profiles(edges: &GrayImage) -> (Vec<f32>, Vec<f32>) {
    let (width, height) = edges.dimensions();
    let mut row_profile = vec![0.0f32; height as usize];
    let mut col_profile = vec![0.0f32; width as usize];
    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel[0] > 0 {
            row_profile[y as usize] += 1.0;
            col_profile[x as usize] += 1.0;
        }
    }
    (row_profile, col_profile)
}

/// Local maxima with at least `min_prominence`, thinned so surviving peaks
/// are at least `min_distance` apart (highest peaks win).
fn find_peaks(profile: &[f32], min_distance: usize, min_prominence: f32) -> Vec<usize> {
    let n = profile.len();
    let mut candidates: Vec<(usize, f32)> = Vec::new();
    for i in 1..n.saturating_sub(1) {
        if profile[i] > profile[i - 1] && profile[i] >= profile[i + 1] {
            let prominence = peak_prominence(profile, i);
            if prominence >= min_prominence {
                candidates.push((i, profile[i]));
            }
        }
    }
    candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut kept: Vec<usize> = Vec::new();
    for (i, _) in candidates {
        if kept.iter().all(|&k| k.abs_diff(i) >= min_distance) {
            kept.push(i);
        }
    }
    kept.sort_unstable();
    kept
}

/// Height above the higher of the two bases (the minima on each side before
/// reaching higher terrain or the profile edge).
fn peak_prominence(profile: &[f32], peak: usize) -> f32 {
    let height = profile[peak];
    let mut left_base = height;
    for j in (0..peak).rev() {
        if profile[j] > height {
            break;
        }
        left_base = left_base.min(profile[j]);
    }
    let mut right_base = height;
    for &v in &profile[peak + 1..] {
        if v > height {
            break;
        }
        right_base = right_base.min(v);
    }
    height - left_base.max(right_base)
}

/// Runs morphological isolation plus Hough detection for both axes,
/// returning (horizontal line y positions, vertical line x positions).
fn axis_positions(
    binary: &GrayImage,
    kernel_len: u32,
    vote_threshold: u32,
    config: &DetectConfig,
) -> (Vec<u32>, Vec<u32>) {
    let detect_axis = |horizontal: bool| -> Vec<u32> {
        let mask = line_mask(kernel_len, horizontal);
        let isolated = grayscale_open(binary, &mask);
        let lines = detect_lines(
            &isolated,
            LineDetectionOptions {
                vote_threshold,
                suppression_radius: config.suppression_radius,
            },
        );
        let extent = if horizontal {
            binary.height()
        } else {
            binary.width()
        };
        line_positions(&lines, horizontal, config.angle_tolerance, extent)
    };

    if config.enable_parallel {
        rayon::join(|| detect_axis(true), || detect_axis(false))
    } else {
        (detect_axis(true), detect_axis(false))
    }
}

/// A wide-and-thin (horizontal) or tall-and-thin (vertical) structuring
/// element.
fn line_mask(len: u32, horizontal: bool) -> Mask {
    let len = len.clamp(3, 255);
    let (width, height) = if horizontal { (len, 1) } else { (1, len) };
    let kernel = GrayImage::from_pixel(width, height, Luma([255u8]));
    Mask::from_image(&kernel, (width / 2) as u8, (height / 2) as u8)
}

/// Collapses detected lines to single perpendicular-offset coordinates,
/// keeping only lines within the angle tolerance of the requested axis.
///
/// Lines may be slightly skewed, so classification uses a tolerance band
/// rather than exact 0°/90° angles.
fn line_positions(lines: &[PolarLine], horizontal: bool, tolerance: u32, extent: u32) -> Vec<u32> {
    let mut positions = Vec::new();
    for line in lines {
        let angle = line.angle_in_degrees;
        let theta = (angle as f32).to_radians();
        let offset = if horizontal {
            // A horizontal line has a near-vertical normal: angle near 90.
            if angle.abs_diff(90) > tolerance {
                continue;
            }
            line.r / theta.sin()
        } else {
            // A vertical line has a near-horizontal normal: angle near 0 or 180.
            if angle.min(180u32.saturating_sub(angle)) > tolerance {
                continue;
            }
            line.r / theta.cos()
        };
        let offset = offset.round();
        if offset >= 0.0 && (offset as u32) < extent {
            positions.push(offset as u32);
        }
    }
    positions.sort_unstable();
    positions.dedup();
    positions
}

/// 1-D projection fallback: sum edge magnitude along each axis, threshold at
/// median + k·stddev, take midpoints of contiguous above-threshold runs.
fn projection_positions(gray: &GrayImage, config: &DetectConfig) -> (Vec<u32>, Vec<u32>) {
    let edges = canny(gray, CANNY_LOW, CANNY_HIGH);
    let (row_profile, col_profile) = edge_profiles(&edges);
    (
        positions_from_profile(&row_profile, config.projection_std_ratio),
        positions_from_profile(&col_profile, config.projection_std_ratio),
    )
}

fn positions_from_profile(profile: &[f32], std_ratio: f32) -> Vec<u32> {
    if profile.is_empty() {
        return Vec::new();
    }
    let threshold = median_f32(profile) + stddev_f32(profile) * std_ratio;

    let mut positions = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_end = 0usize;
    for (i, &value) in profile.iter().enumerate() {
        if value >= threshold {
            if run_start.is_none() {
                run_start = Some(i);
            }
            run_end = i;
        } else if let Some(start) = run_start.take() {
            positions.push(((start + run_end) / 2) as u32);
        }
    }
    if let Some(start) = run_start {
        positions.push(((start + run_end) / 2) as u32);
    }
    positions
}

fn median_f32(values: &[f32]) -> f32 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn stddev_f32(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f32>() / values.len() as f32;
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / values.len() as f32;
    variance.sqrt()
}

/// Merges close positions and normalizes gaps for one axis.
fn postprocess_positions(positions: Vec<u32>, config: &DetectConfig) -> Vec<u32> {
    let spacing = median_spacing(&positions);
    let min_distance = if spacing > 0.0 {
        config
            .merge_min_distance
            .max((spacing * config.merge_spacing_ratio) as u32)
    } else {
        config.merge_min_distance
    };
    let merged = merge_close_positions(&positions, min_distance);
    normalize_positions(merged)
}

/// Cluster-and-average merge: consecutive positions within `min_distance`
/// form a cluster replaced by its rounded mean (not first-wins).
pub(crate) fn merge_close_positions(positions: &[u32], min_distance: u32) -> Vec<u32> {
    if positions.is_empty() {
        return Vec::new();
    }
    let mut sorted = positions.to_vec();
    sorted.sort_unstable();

    let mut merged = Vec::new();
    let mut cluster: Vec<u32> = vec![sorted[0]];
    for &pos in &sorted[1..] {
        if pos - cluster[cluster.len() - 1] <= min_distance {
            cluster.push(pos);
        } else {
            merged.push(cluster_mean(&cluster));
            cluster = vec![pos];
        }
    }
    merged.push(cluster_mean(&cluster));
    merged
}

fn cluster_mean(cluster: &[u32]) -> u32 {
    (cluster.iter().map(|&p| p as f64).sum::<f64>() / cluster.len() as f64).round() as u32
}

/// Inserts evenly spaced synthetic positions into gaps that exceed
/// `NORMALIZE_GAP_RATIO` times the median spacing, recovering missed lines,
/// then re-merges.
fn normalize_positions(positions: Vec<u32>) -> Vec<u32> {
    if positions.len() < 3 {
        return positions;
    }
    let spacing = median_spacing(&positions);
    if spacing <= 0.0 {
        return positions;
    }

    let gaps: Vec<u32> = positions.windows(2).map(|w| w[1] - w[0]).collect();
    let cv = stddev_f32(&gaps.iter().map(|&g| g as f32).collect::<Vec<_>>()) / spacing;
    let min_gap = *gaps.iter().min().unwrap_or(&0) as f32;
    // Already even; nothing to repair.
    if cv < 0.2 && min_gap > spacing * 0.6 {
        return positions;
    }

    let mut filled = vec![positions[0]];
    for window in positions.windows(2) {
        let (prev, next) = (window[0], window[1]);
        let gap = (next - prev) as f32;
        if gap > spacing * NORMALIZE_GAP_RATIO {
            let missing = (gap / spacing).round() as u32 - 1;
            if missing > 0 {
                trace!(prev, next, missing, "inserting synthetic positions");
                let step = gap / (missing + 1) as f32;
                for j in 1..=missing {
                    filled.push(prev + (j as f32 * step) as u32);
                }
            }
        }
        filled.push(next);
    }

    filled.sort_unstable();
    let min_distance = (spacing * REMERGE_SPACING_RATIO) as u32;
    merge_close_positions(&filled, min_distance.max(5))
}

/// A grid is irregular when its gaps vary too much or its smallest gap is
/// much smaller than the median.
fn is_irregular(positions: &[u32], config: &DetectConfig) -> bool {
    if positions.len() < 3 {
        return false;
    }
    let spacing = median_spacing(positions);
    if spacing <= 0.0 {
        return false;
    }
    let gaps: Vec<f32> = positions.windows(2).map(|w| (w[1] - w[0]) as f32).collect();
    let cv = stddev_f32(&gaps) / spacing;
    let min_gap = gaps.iter().cloned().fold(f32::INFINITY, f32::min);
    cv > config.irregular_cv || min_gap < spacing * config.irregular_min_ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use insta::assert_yaml_snapshot;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use test_case::test_case;

    /// Renders a grid of `rows` x `cols` cells of `cell` pixels, with `margin`
    /// pixels of plain background on every side. Lines are 2px thick and dark.
    /// `noisy` adds a deterministic per-pixel perturbation of up to ±20.
    fn synthetic_grid(rows: u32, cols: u32, cell: u32, margin: u32, noisy: bool) -> DynamicImage {
        let width = cols * cell + 2 + 2 * margin;
        let height = rows * cell + 2 + 2 * margin;
        let img = GrayImage::from_fn(width, height, |x, y| {
            let on_line = in_line_band(x, margin, cols, cell) || in_line_band(y, margin, rows, cell);
            let base: i16 = if on_line { 20 } else { 250 };
            let value = if noisy {
                base + ((x * 31 + y * 17) % 41) as i16 - 20
            } else {
                base
            };
            Luma([value.clamp(0, 255) as u8])
        });
        DynamicImage::ImageLuma8(img)
    }

    fn in_line_band(coord: u32, margin: u32, cells: u32, cell: u32) -> bool {
        if coord < margin {
            return false;
        }
        let offset = coord - margin;
        offset <= cells * cell + 1 && offset % cell <= 1
    }

    #[test_case(0; "no margin")]
    #[test_case(5; "small margin")]
    #[test_case(12; "medium margin")]
    #[test_case(25; "margin wider than a cell")]
    #[test_case(40; "margin wider than the threshold window")]
    fn test_detect_recovers_boundaries_across_margins(margin: u32) {
        let img = synthetic_grid(6, 8, 24, margin, false);
        let geometry = detect_grid(&img, &DetectConfig::default()).unwrap();
        assert_eq!(geometry.row_boundaries.len(), 7);
        assert_eq!(geometry.col_boundaries.len(), 9);
    }

    #[test]
    fn test_detect_survives_pixel_noise() {
        let img = synthetic_grid(6, 8, 24, 10, true);
        let geometry = detect_grid(&img, &DetectConfig::default()).unwrap();
        assert_eq!(geometry.row_boundaries.len(), 7);
        assert_eq!(geometry.col_boundaries.len(), 9);
    }

    #[test]
    fn test_solid_regions_are_cleared_but_lines_kept() {
        // A 2px line and a 20x20 solid block of foreground.
        let mut binary = GrayImage::from_pixel(100, 60, Luma([0]));
        for x in 0..100 {
            binary.put_pixel(x, 40, Luma([255]));
            binary.put_pixel(x, 41, Luma([255]));
        }
        for x in 10..30 {
            for y in 5..25 {
                binary.put_pixel(x, y, Luma([255]));
            }
        }
        let cleaned = suppress_solid_regions(&binary, 28);
        assert_eq!(cleaned.get_pixel(50, 40)[0], 255, "line must survive");
        assert_eq!(cleaned.get_pixel(20, 15)[0], 0, "block must be cleared");
    }

    #[test]
    fn test_detect_sequential_matches_parallel() {
        let img = synthetic_grid(5, 5, 30, 8, false);
        let parallel = detect_grid(&img, &DetectConfig::default()).unwrap();
        let sequential = detect_grid(
            &img,
            &DetectConfig {
                enable_parallel: false,
                ..DetectConfig::default()
            },
        )
        .unwrap();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn test_blank_image_fails_with_insufficient_lines() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 200, Luma([250])));
        match detect_grid(&img, &DetectConfig::default()) {
            Err(GridError::InsufficientLines { .. }) => {}
            other => panic!("expected InsufficientLines, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let img = DynamicImage::new_luma8(0, 0);
        assert!(matches!(
            detect_grid(&img, &DetectConfig::default()),
            Err(GridError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn test_merge_close_positions_averages_clusters() {
        let merged = merge_close_positions(&[10, 12, 40, 41, 70], 5);
        assert_yaml_snapshot!(merged, @r###"
        - 11
        - 41
        - 70
        "###);
    }

    #[test]
    fn test_normalize_fills_missing_line() {
        // One line missed between 40 and 80 in an otherwise 20px grid.
        let positions = vec![0, 20, 40, 80, 100];
        let normalized = normalize_positions(positions);
        assert_eq!(normalized, vec![0, 20, 40, 60, 80, 100]);
    }

    #[test]
    fn test_is_irregular() {
        let config = DetectConfig::default();
        assert!(!is_irregular(&[0, 20, 40, 60], &config));
        assert!(is_irregular(&[0, 20, 25, 60], &config));
    }

    #[test]
    fn test_positions_from_profile_takes_run_midpoints() {
        // Two clear spikes over a flat background.
        let mut profile = vec![1.0f32; 50];
        for i in 10..13 {
            profile[i] = 30.0;
        }
        for i in 30..35 {
            profile[i] = 25.0;
        }
        let positions = positions_from_profile(&profile, 1.5);
        assert_eq!(positions, vec![11, 32]);
    }

    #[test]
    fn test_find_peaks_respects_distance_and_prominence() {
        let profile = vec![0.0, 0.2, 1.0, 0.2, 0.95, 0.1, 0.0, 0.02, 0.0];
        // The 0.95 peak is within min_distance of the 1.0 peak and loses;
        // the 0.02 bump lacks prominence.
        let peaks = find_peaks(&profile, 4, 0.05);
        assert_eq!(peaks, vec![2]);
    }

    proptest! {
        #[test]
        fn test_merged_positions_respect_min_distance(
            mut positions in prop::collection::vec(0u32..500, 1..40),
            min_distance in 1u32..30,
        ) {
            positions.sort_unstable();
            let merged = merge_close_positions(&positions, min_distance);
            for pair in merged.windows(2) {
                prop_assert!(pair[1] - pair[0] > min_distance);
            }
            prop_assert!(!merged.is_empty());
        }

        #[test]
        fn test_merged_positions_are_strictly_increasing(
            positions in prop::collection::vec(0u32..1000, 1..60),
        ) {
            let merged = merge_close_positions(&positions, 6);
            for pair in merged.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
