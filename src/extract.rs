//! Per-cell color extraction.
//!
//! Samples the interior of every grid cell, filters out pixels claimed by
//! mask strategies (watermark tint, pegboard-hole edges), trims outliers in
//! Lab space, and resolves each cell to one representative color.

use image::{imageops, DynamicImage, RgbImage};
use imageproc::{
    distance_transform::Norm, edges::canny, filter::median_filter, morphology, rect::Rect,
};
use kmeans_colors::get_kmeans;
use palette::Srgb;
use rayon::prelude::*;
use tracing::*;

use crate::{
    color::{self, Rgb8},
    config::ExtractConfig,
    geometry::{ColorGrid, GridGeometry},
};

/// Fallback for cells where every resolution path degenerates.
const WHITE: Rgb8 = [255, 255, 255];
/// Cells at or above this size get a denoising median prefilter.
const MEDIAN_FILTER_MIN_DIM: u32 = 5;
/// Sampling stride grows with the cell so large cells stay cheap.
const STRIDE_2_MIN_DIM: u32 = 30;
const STRIDE_3_MIN_DIM: u32 = 60;
/// Below this many samples a plain channel mean is used.
const MEAN_PATH_MAX: usize = 10;
/// Above this many samples the histogram path replaces k-means.
const HISTOGRAM_PATH_MIN: usize = 50;
/// Channel spread below which a cell counts as uniform.
const UNIFORM_CHANNEL_STD: f32 = 15.0;
/// Histogram bucket width per channel.
const HISTOGRAM_BUCKET: u32 = 32;
/// K-means convergence and seeding.
const KMEANS_CONVERGE: f32 = 0.0025;
const KMEANS_MAX_ITER: usize = 100;
const KMEANS_SEED: u64 = 42;

/// Bit assigned to each mask strategy in a sample's flag byte.
const FLAG_WATERMARK: u8 = 0b01;
const FLAG_EDGE: u8 = 0b10;

/// Per-image pixel classification produced by a [`MaskStrategy`].
pub struct PixelMask {
    width: u32,
    flagged: Vec<bool>,
    /// Fraction of flagged pixels over the whole image.
    pub coverage: f32,
}

impl PixelMask {
    fn new(width: u32, flagged: Vec<bool>) -> Self {
        let count = flagged.iter().filter(|&&f| f).count();
        let coverage = count as f32 / flagged.len().max(1) as f32;
        Self {
            width,
            flagged,
            coverage,
        }
    }

    #[inline]
    pub fn is_flagged(&self, x: u32, y: u32) -> bool {
        self.flagged[(y * self.width + x) as usize]
    }
}

/// A source of suspect pixels that should not vote on a cell's color.
///
/// Strategies build one mask over the full image; each cell then decides
/// whether to honor the mask depending on how much of the cell it claims.
pub trait MaskStrategy: Sync {
    /// Bit this strategy occupies in a sample's flag byte.
    fn flag(&self) -> u8;

    /// Builds the full-image mask, or `None` when the strategy decides it
    /// does not apply to this image.
    fn build(&self, image: &RgbImage, config: &ExtractConfig) -> Option<PixelMask>;

    /// Whether a cell with `flagged_fraction` of its samples flagged should
    /// drop them.
    fn applies_to_cell(&self, flagged_fraction: f32, config: &ExtractConfig) -> bool;

    /// Samples that must survive the drop for it to happen.
    fn min_survivors(&self, config: &ExtractConfig) -> usize;
}

/// Flags the semi-transparent watermark tint: mid-brightness, low-spread
/// pixels. Only engages when the tint covers a meaningful share of the image.
pub struct WatermarkMask;

impl MaskStrategy for WatermarkMask {
    fn flag(&self) -> u8 {
        FLAG_WATERMARK
    }

    fn build(&self, image: &RgbImage, config: &ExtractConfig) -> Option<PixelMask> {
        if !config.watermark_enabled {
            return None;
        }
        let flagged: Vec<bool> = image
            .pixels()
            .map(|p| {
                let rgb = [p[0], p[1], p[2]];
                let brightness = color::brightness(rgb);
                brightness >= config.watermark_brightness_min
                    && brightness <= config.watermark_brightness_max
                    && color::channel_spread(rgb) <= config.watermark_spread
            })
            .collect();
        let mask = PixelMask::new(image.width(), flagged);
        if mask.coverage < config.watermark_image_ratio {
            trace!(coverage = mask.coverage, "watermark coverage below gate");
            return None;
        }
        debug!(coverage = mask.coverage, "watermark mask active");
        Some(mask)
    }

    fn applies_to_cell(&self, flagged_fraction: f32, config: &ExtractConfig) -> bool {
        // A cell dominated by the tint is probably a genuinely gray cell.
        flagged_fraction > 0.0 && flagged_fraction < config.watermark_cell_keep_ratio
    }

    fn min_survivors(&self, config: &ExtractConfig) -> usize {
        config.watermark_min_pixels
    }
}

/// Flags dilated Canny edges so pegboard-hole rims and line bleed do not
/// contaminate cell interiors.
pub struct EdgeMask;

impl MaskStrategy for EdgeMask {
    fn flag(&self) -> u8 {
        FLAG_EDGE
    }

    fn build(&self, image: &RgbImage, config: &ExtractConfig) -> Option<PixelMask> {
        if !config.edge_enabled {
            return None;
        }
        let gray = DynamicImage::ImageRgb8(image.clone()).to_luma8();
        let median = median_luma(&gray);
        let low = ((1.0 - config.edge_sigma) * median).max(0.0);
        let high = ((1.0 + config.edge_sigma) * median).min(255.0).max(low + 1.0);
        let edges = canny(&gray, low, high);
        let dilated = morphology::dilate(&edges, Norm::LInf, config.edge_dilate);
        let flagged: Vec<bool> = dilated.pixels().map(|p| p[0] > 0).collect();
        let mask = PixelMask::new(image.width(), flagged);
        debug!(coverage = mask.coverage, "edge mask built");
        Some(mask)
    }

    fn applies_to_cell(&self, flagged_fraction: f32, config: &ExtractConfig) -> bool {
        flagged_fraction >= config.edge_cell_ratio
    }

    fn min_survivors(&self, config: &ExtractConfig) -> usize {
        config.edge_min_pixels
    }
}

fn median_luma(gray: &image::GrayImage) -> f32 {
    let mut histogram = [0u32; 256];
    for p in gray.pixels() {
        histogram[p[0] as usize] += 1;
    }
    let half = (gray.width() as u64 * gray.height() as u64) / 2;
    let mut seen = 0u64;
    for (value, &count) in histogram.iter().enumerate() {
        seen += count as u64;
        if seen >= half {
            return value as f32;
        }
    }
    255.0
}

/// Extracts one representative color per cell of `geometry`.
pub fn extract_colors(
    image: &DynamicImage,
    geometry: &GridGeometry,
    config: &ExtractConfig,
) -> ColorGrid {
    let rgb = image.to_rgb8();
    let strategies: [&dyn MaskStrategy; 2] = [&WatermarkMask, &EdgeMask];
    let masks: Vec<(&dyn MaskStrategy, PixelMask)> = strategies
        .iter()
        .filter_map(|s| s.build(&rgb, config).map(|m| (*s, m)))
        .collect();

    let rows = geometry.rows();
    let cols = geometry.cols();
    info!(rows, cols, masks = masks.len(), "extracting cell colors");

    let resolve_row = |row: usize| -> Vec<Rgb8> {
        (0..cols)
            .map(|col| match geometry.cell(row, col) {
                Some(rect) => cell_color(&rgb, rect, &masks, config),
                None => WHITE,
            })
            .collect()
    };

    let cell_rows: Vec<Vec<Rgb8>> = if config.enable_parallel {
        (0..rows).into_par_iter().map(resolve_row).collect()
    } else {
        (0..rows).map(resolve_row).collect()
    };

    ColorGrid::from_rows(cell_rows)
}

/// Resolves one cell to a single color.
fn cell_color(
    image: &RgbImage,
    rect: Rect,
    masks: &[(&dyn MaskStrategy, PixelMask)],
    config: &ExtractConfig,
) -> Rgb8 {
    let samples = sample_cell(image, rect, masks, config);
    if samples.is_empty() {
        return WHITE;
    }

    let samples = drop_masked_samples(samples, masks, config);
    let colors = robust_trim(samples, config);
    if colors.is_empty() {
        return WHITE;
    }

    if colors.len() < MEAN_PATH_MAX {
        return channel_mean(&colors);
    }
    if channel_stds(&colors).iter().all(|&s| s < UNIFORM_CHANNEL_STD) {
        return channel_median(&colors);
    }
    if colors.len() > HISTOGRAM_PATH_MIN {
        histogram_color(&colors, config)
    } else {
        kmeans_color(&colors, config)
    }
}

/// Samples the cell interior with a size-dependent margin and stride.
/// Each sample carries the mask flags of its source pixel so later filtering
/// stays aligned.
fn sample_cell(
    image: &RgbImage,
    rect: Rect,
    masks: &[(&dyn MaskStrategy, PixelMask)],
    config: &ExtractConfig,
) -> Vec<(Rgb8, u8)> {
    let (cw, ch) = (rect.width(), rect.height());
    if cw == 0 || ch == 0 {
        return Vec::new();
    }
    let margin_x = cell_margin(cw, config);
    let margin_y = cell_margin(ch, config);
    let inner_w = cw.saturating_sub(2 * margin_x);
    let inner_h = ch.saturating_sub(2 * margin_y);
    if inner_w == 0 || inner_h == 0 {
        return Vec::new();
    }

    let x0 = rect.left() as u32 + margin_x;
    let y0 = rect.top() as u32 + margin_y;
    let crop = imageops::crop_imm(image, x0, y0, inner_w, inner_h).to_image();
    let crop = if inner_w >= MEDIAN_FILTER_MIN_DIM && inner_h >= MEDIAN_FILTER_MIN_DIM {
        median_filter(&crop, 2, 2)
    } else {
        crop
    };

    let stride = if cw.min(ch) > STRIDE_3_MIN_DIM {
        3
    } else if cw.min(ch) > STRIDE_2_MIN_DIM {
        2
    } else {
        1
    };

    let capacity = ((inner_w / stride + 1) * (inner_h / stride + 1)) as usize;
    let mut samples = Vec::with_capacity(capacity);
    for y in (0..inner_h).step_by(stride as usize) {
        for x in (0..inner_w).step_by(stride as usize) {
            let p = crop.get_pixel(x, y);
            let mut flags = 0u8;
            for (strategy, mask) in masks {
                if mask.is_flagged(x0 + x, y0 + y) {
                    flags |= strategy.flag();
                }
            }
            samples.push(([p[0], p[1], p[2]], flags));
        }
    }
    samples
}

fn cell_margin(dim: u32, config: &ExtractConfig) -> u32 {
    ((dim as f32 * config.margin_percent) as u32)
        .max(config.margin_min)
        .min(dim / config.margin_max_divisor.max(1))
}

/// Applies each mask strategy's per-cell decision in sequence, keeping flag
/// bytes attached so a later strategy sees the earlier strategy's survivors.
fn drop_masked_samples(
    mut samples: Vec<(Rgb8, u8)>,
    masks: &[(&dyn MaskStrategy, PixelMask)],
    config: &ExtractConfig,
) -> Vec<(Rgb8, u8)> {
    for (strategy, _) in masks {
        let flag = strategy.flag();
        let flagged = samples.iter().filter(|(_, f)| f & flag != 0).count();
        if flagged == 0 {
            continue;
        }
        let fraction = flagged as f32 / samples.len() as f32;
        let survivors = samples.len() - flagged;
        if strategy.applies_to_cell(fraction, config) && survivors >= strategy.min_survivors(config)
        {
            samples.retain(|(_, f)| f & flag == 0);
        }
    }
    samples
}

/// Drops Lab-space outliers: samples beyond the configured percentile of the
/// distance to the cell's channel-median color. Skipped for small cells.
fn robust_trim(samples: Vec<(Rgb8, u8)>, config: &ExtractConfig) -> Vec<Rgb8> {
    let colors: Vec<Rgb8> = samples.into_iter().map(|(c, _)| c).collect();
    if !config.robust_trim_enabled || colors.len() < config.robust_trim_min_pixels {
        return colors;
    }

    let center = color::rgb_to_lab(channel_median(&colors));
    let mut distances: Vec<f32> = colors
        .iter()
        .map(|c| color::lab_distance(color::rgb_to_lab(*c), center))
        .collect();
    let mut sorted = distances.clone();
    sorted.sort_by(f32::total_cmp);
    let rank = ((config.robust_trim_percentile / 100.0) * (sorted.len() - 1) as f32) as usize;
    let cutoff = sorted[rank];

    let kept: Vec<Rgb8> = colors
        .iter()
        .zip(distances.drain(..))
        .filter(|(_, d)| *d <= cutoff)
        .map(|(c, _)| *c)
        .collect();
    // The trim only commits when enough pixels survive it.
    if kept.len() >= config.robust_trim_min_pixels {
        kept
    } else {
        colors
    }
}

fn channel_mean(colors: &[Rgb8]) -> Rgb8 {
    let n = colors.len() as f64;
    let mut sums = [0.0f64; 3];
    for c in colors {
        for i in 0..3 {
            sums[i] += c[i] as f64;
        }
    }
    [
        (sums[0] / n).round() as u8,
        (sums[1] / n).round() as u8,
        (sums[2] / n).round() as u8,
    ]
}

fn channel_median(colors: &[Rgb8]) -> Rgb8 {
    let mut out = [0u8; 3];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut channel: Vec<u8> = colors.iter().map(|c| c[i]).collect();
        channel.sort_unstable();
        *slot = channel[channel.len() / 2];
    }
    out
}

fn channel_stds(colors: &[Rgb8]) -> [f32; 3] {
    let n = colors.len() as f32;
    let mut means = [0.0f32; 3];
    for c in colors {
        for i in 0..3 {
            means[i] += c[i] as f32;
        }
    }
    for m in &mut means {
        *m /= n;
    }
    let mut variances = [0.0f32; 3];
    for c in colors {
        for i in 0..3 {
            let d = c[i] as f32 - means[i];
            variances[i] += d * d;
        }
    }
    [
        (variances[0] / n).sqrt(),
        (variances[1] / n).sqrt(),
        (variances[2] / n).sqrt(),
    ]
}

/// Bucket key used by the histogram path: channels quantized to 32 levels.
fn bucket_key(color: &Rgb8) -> Rgb8 {
    let q = |c: u8| -> u8 {
        let bucket = c as u32 / HISTOGRAM_BUCKET * HISTOGRAM_BUCKET + HISTOGRAM_BUCKET / 2;
        bucket.min(255) as u8
    };
    [q(color[0]), q(color[1]), q(color[2])]
}

/// Population-descending bucket ranking with the black/white skip policy:
/// near-black buckets only win when the cell is genuinely dark, near-white
/// buckets only win when they dominate. Returns the mean of the winning
/// bucket's true pixels.
fn histogram_color(colors: &[Rgb8], config: &ExtractConfig) -> Rgb8 {
    let mut buckets: std::collections::HashMap<Rgb8, Vec<Rgb8>> = std::collections::HashMap::new();
    for c in colors {
        buckets.entry(bucket_key(c)).or_default().push(*c);
    }
    let mut ranked: Vec<(Rgb8, Vec<Rgb8>)> = buckets.into_iter().collect();
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

    let total = colors.len() as f32;
    let dark_fraction = colors
        .iter()
        .filter(|c| color::is_near_black(**c, config.black_threshold))
        .count() as f32
        / total;

    let last = ranked.len() - 1;
    for (i, (key, members)) in ranked.iter().enumerate() {
        let share = members.len() as f32 / total;
        if i < last {
            if color::is_near_black(*key, config.black_threshold)
                && !(dark_fraction >= config.dark_pixel_ratio && share >= config.black_cluster_ratio)
            {
                continue;
            }
            if color::is_near_white(*key, config.white_brightness, config.white_spread)
                && share <= config.white_cluster_ratio
            {
                continue;
            }
        }
        return channel_mean(members);
    }
    WHITE
}

/// K-means path for mid-sized cells. Clusters in sRGB and applies the same
/// black/white skip policy over cluster populations, falling back to the most
/// populous cluster when every cluster is skip-eligible.
fn kmeans_color(colors: &[Rgb8], config: &ExtractConfig) -> Rgb8 {
    let buffer: Vec<Srgb<f32>> = colors
        .iter()
        .map(|c| Srgb::new(c[0] as f32 / 255.0, c[1] as f32 / 255.0, c[2] as f32 / 255.0))
        .collect();
    let k = config.kmeans_clusters.min(colors.len()).max(1);
    let result = get_kmeans(k, KMEANS_MAX_ITER, KMEANS_CONVERGE, false, &buffer, KMEANS_SEED);

    let mut counts = vec![0usize; result.centroids.len()];
    for &index in &result.indices {
        counts[index as usize] += 1;
    }
    let mut ranked: Vec<(Rgb8, usize)> = result
        .centroids
        .iter()
        .zip(counts)
        .filter(|(_, count)| *count > 0)
        .map(|(centroid, count)| {
            let rgb = centroid.into_format::<u8>();
            ([rgb.red, rgb.green, rgb.blue], count)
        })
        .collect();
    if ranked.is_empty() {
        return channel_median(colors);
    }
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let total: usize = ranked.iter().map(|(_, c)| c).sum();
    let dark_fraction = colors
        .iter()
        .filter(|c| color::is_near_black(**c, config.black_threshold))
        .count() as f32
        / colors.len() as f32;

    for (rgb, count) in &ranked {
        let share = *count as f32 / total as f32;
        if color::is_near_black(*rgb, config.black_threshold)
            && !(dark_fraction >= config.dark_pixel_ratio && share >= config.black_cluster_ratio)
        {
            continue;
        }
        if color::is_near_white(*rgb, config.white_brightness, config.white_spread)
            && share <= config.white_cluster_ratio
        {
            continue;
        }
        return *rgb;
    }
    // Every cluster was skip-eligible; the most populous one still wins.
    ranked[0].0
}
