//! Immutable parameter sets for every pipeline stage.
//!
//! Each stage takes its config by reference on every call; there is no
//! process-wide state. All defaults were tuned on scanned/photographed bead
//! pattern sheets.

const DEFAULT_THRESHOLD_BLOCK_RADIUS: u32 = 12;
const DEFAULT_THRESHOLD_DELTA: i32 = 2;
const DEFAULT_VOTE_THRESHOLD: u32 = 40;
const DEFAULT_VOTE_THRESHOLD_STRONG: u32 = 50;
const DEFAULT_MAX_COLORS: usize = 20;

/// Configuration for grid-geometry detection.
///
/// # Example
/// ```
/// use beadgrid::DetectConfig;
///
/// let config = DetectConfig::default();
/// assert_eq!(config.threshold_block_radius, 12);
/// assert_eq!(config.threshold_delta, 2);
/// assert_eq!(config.vote_threshold, 40);
/// assert!(config.enable_parallel);
/// ```
#[derive(Debug, Clone)]
pub struct DetectConfig {
    /// Block radius for adaptive thresholding (default: 12). Window-based so
    /// uneven lighting does not erase grid lines.
    pub threshold_block_radius: u32,
    /// Constant offset applied to the neighborhood mean inside the adaptive
    /// threshold comparison (default: 2).
    pub threshold_delta: i32,
    /// Hough accumulator votes required for a line (default: 40).
    pub vote_threshold: u32,
    /// Stricter vote threshold used by the irregular-grid retry (default: 50).
    pub vote_threshold_strong: u32,
    /// Non-maximum suppression radius in the Hough accumulator (default: 8).
    pub suppression_radius: u32,
    /// Allowed angular deviation, in degrees, from exactly horizontal or
    /// vertical when classifying detected lines (default: 15).
    pub angle_tolerance: u32,
    /// Structuring-kernel length as a fraction of the shorter image side,
    /// used when spacing estimation is inconclusive (default: 0.05).
    pub kernel_len_ratio: f32,
    /// Lower bound on the fallback kernel length (default: 40).
    pub kernel_len_min: u32,
    /// Positions closer than `median_spacing * merge_spacing_ratio` are
    /// merged by cluster-and-average (default: 0.6).
    pub merge_spacing_ratio: f32,
    /// Absolute lower bound on the merge distance in pixels (default: 6).
    pub merge_min_distance: u32,
    /// Coefficient of variation of gaps above which a grid is judged
    /// irregular (default: 0.35).
    pub irregular_cv: f32,
    /// A minimum gap below `median * irregular_min_ratio` also marks the
    /// grid irregular (default: 0.5).
    pub irregular_min_ratio: f32,
    /// Projection-fallback threshold: `median + stddev * ratio` (default: 1.5).
    pub projection_std_ratio: f32,
    /// Process the two axes concurrently (default: true).
    pub enable_parallel: bool,
}

impl DetectConfig {
    /// Creates a detection config from the commonly tuned parameters; every
    /// other field keeps its default.
    ///
    /// # Example
    /// ```
    /// use beadgrid::DetectConfig;
    ///
    /// let config = DetectConfig::new(15, 60, false);
    /// assert_eq!(config.threshold_block_radius, 15);
    /// assert_eq!(config.vote_threshold, 60);
    /// assert_eq!(config.vote_threshold_strong, 75);
    /// assert!(!config.enable_parallel);
    /// ```
    pub fn new(threshold_block_radius: u32, vote_threshold: u32, enable_parallel: bool) -> Self {
        let vote_threshold = vote_threshold.max(1);
        Self {
            threshold_block_radius: threshold_block_radius.max(3), // Minimum block radius
            vote_threshold,
            vote_threshold_strong: (vote_threshold as f32 * 1.25).ceil() as u32,
            enable_parallel,
            ..Self::default()
        }
    }
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            threshold_block_radius: DEFAULT_THRESHOLD_BLOCK_RADIUS,
            threshold_delta: DEFAULT_THRESHOLD_DELTA,
            vote_threshold: DEFAULT_VOTE_THRESHOLD,
            vote_threshold_strong: DEFAULT_VOTE_THRESHOLD_STRONG,
            suppression_radius: 8,
            angle_tolerance: 15,
            kernel_len_ratio: 0.05,
            kernel_len_min: 40,
            merge_spacing_ratio: 0.6,
            merge_min_distance: 6,
            irregular_cv: 0.35,
            irregular_min_ratio: 0.5,
            projection_std_ratio: 1.5,
            enable_parallel: true,
        }
    }
}

/// Configuration for per-cell color extraction.
///
/// # Example
/// ```
/// use beadgrid::ExtractConfig;
///
/// let config = ExtractConfig::default();
/// assert_eq!(config.margin_min, 2);
/// assert_eq!(config.black_threshold, 50);
/// assert!(config.watermark_enabled);
/// ```
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Inward margin as a fraction of cell size (default: 0.1).
    pub margin_percent: f32,
    /// Minimum margin in pixels (default: 2).
    pub margin_min: u32,
    /// Margin is capped at `cell_dim / margin_max_divisor` (default: 3).
    pub margin_max_divisor: u32,
    /// Cluster count for the small-sample k-means path (default: 5).
    pub kmeans_clusters: usize,
    /// Channels all below this value count as near-black (default: 50).
    pub black_threshold: u8,
    /// A near-black bucket/cluster is only accepted when its population
    /// share reaches this ratio (default: 0.05).
    pub black_cluster_ratio: f32,
    /// ... and when the cell's overall dark-pixel fraction reaches this
    /// ratio, distinguishing printed ink from stray dark pixels
    /// (default: 0.08).
    pub dark_pixel_ratio: f32,
    /// Mean brightness above which a color may count as near-white
    /// (default: 215.0).
    pub white_brightness: f32,
    /// Channel spread below which a bright color counts as near-white
    /// (default: 12).
    pub white_spread: u8,
    /// A near-white bucket/cluster is only accepted when its population
    /// share exceeds this ratio (default: 0.3).
    pub white_cluster_ratio: f32,
    /// Enable the faint-overlay (watermark) exclusion mask (default: true).
    pub watermark_enabled: bool,
    /// Watermark brightness band, lower bound (default: 120.0).
    pub watermark_brightness_min: f32,
    /// Watermark brightness band, upper bound (default: 210.0).
    pub watermark_brightness_max: f32,
    /// Maximum channel spread for a watermark pixel (default: 12).
    pub watermark_spread: u8,
    /// The watermark mask is only used when at least this fraction of the
    /// whole image matches it, avoiding false suppression on naturally pale
    /// cells (default: 0.08).
    pub watermark_image_ratio: f32,
    /// Cells whose sample is mostly watermark-colored keep their raw sample
    /// (default: 0.6).
    pub watermark_cell_keep_ratio: f32,
    /// Minimum sample size that must survive watermark filtering (default: 30).
    pub watermark_min_pixels: usize,
    /// Enable the printed-stroke edge exclusion mask (default: true).
    pub edge_enabled: bool,
    /// Sigma for the median-based Canny threshold band (default: 0.33).
    pub edge_sigma: f32,
    /// Dilation radius applied to the edge mask, 0 to disable (default: 1).
    pub edge_dilate: u8,
    /// Minimum fraction of edge pixels in a cell before the mask is applied
    /// (default: 0.01).
    pub edge_cell_ratio: f32,
    /// Minimum sample size that must survive edge filtering (default: 30).
    pub edge_min_pixels: usize,
    /// Enable outlier rejection by distance-from-median in Lab space
    /// (default: true).
    pub robust_trim_enabled: bool,
    /// Percentile of distance-from-median beyond which pixels are dropped
    /// (default: 80.0).
    pub robust_trim_percentile: f32,
    /// Robust trim only runs, and only commits, with at least this many
    /// pixels (default: 50).
    pub robust_trim_min_pixels: usize,
    /// Extract cell rows concurrently (default: true).
    pub enable_parallel: bool,
}

impl ExtractConfig {
    /// Creates an extraction config from the commonly tuned parameters; every
    /// other field keeps its default.
    ///
    /// # Example
    /// ```
    /// use beadgrid::ExtractConfig;
    ///
    /// let config = ExtractConfig::new(0.15, 4, false);
    /// assert_eq!(config.margin_percent, 0.15);
    /// assert_eq!(config.kmeans_clusters, 4);
    /// assert!(!config.enable_parallel);
    /// ```
    pub fn new(margin_percent: f32, kmeans_clusters: usize, enable_parallel: bool) -> Self {
        Self {
            margin_percent: margin_percent.clamp(0.0, 0.4), // Margins must leave an interior
            kmeans_clusters: kmeans_clusters.max(1),
            enable_parallel,
            ..Self::default()
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            margin_percent: 0.1,
            margin_min: 2,
            margin_max_divisor: 3,
            kmeans_clusters: 5,
            black_threshold: 50,
            black_cluster_ratio: 0.05,
            dark_pixel_ratio: 0.08,
            white_brightness: 215.0,
            white_spread: 12,
            white_cluster_ratio: 0.3,
            watermark_enabled: true,
            watermark_brightness_min: 120.0,
            watermark_brightness_max: 210.0,
            watermark_spread: 12,
            watermark_image_ratio: 0.08,
            watermark_cell_keep_ratio: 0.6,
            watermark_min_pixels: 30,
            edge_enabled: true,
            edge_sigma: 0.33,
            edge_dilate: 1,
            edge_cell_ratio: 0.01,
            edge_min_pixels: 30,
            robust_trim_enabled: true,
            robust_trim_percentile: 80.0,
            robust_trim_min_pixels: 50,
            enable_parallel: true,
        }
    }
}

/// Configuration for palette merging.
///
/// # Example
/// ```
/// use beadgrid::MergeConfig;
///
/// let config = MergeConfig::default();
/// assert_eq!(config.max_colors, 20);
/// assert!(config.protect_near_black);
/// ```
#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Target palette size for the final clustering step (default: 20).
    pub max_colors: usize,
    /// Lab-space distance below which the greedy pass folds a color into an
    /// existing cluster (default: 45.0).
    pub merge_threshold: f32,
    /// Mean brightness above which a color may count as near-white
    /// (default: 215.0).
    pub white_brightness: f32,
    /// Channel spread below which a bright color counts as near-white
    /// (default: 12).
    pub white_spread: u8,
    /// Channels all below this value count as near-black (default: 50).
    pub black_threshold: u8,
    /// Keep near-black colors out of the final clustering step, preserving
    /// outline ink (default: true).
    pub protect_near_black: bool,
    /// Collapse near-black variants to their weighted mean (default: true).
    pub near_black_merge_enabled: bool,
    /// ... but only when more than this many variants exist (default: 3).
    pub near_black_merge_limit: usize,
    /// Final clustering only triggers above
    /// `max(max_colors * ratio, max_colors + min_overflow)` distinct colors
    /// (default: 1.5).
    pub merge_trigger_ratio: f32,
    /// Minimum absolute overflow allowance (default: 6).
    pub merge_trigger_min_overflow: usize,
}

impl MergeConfig {
    /// Creates a merge config from the commonly tuned parameters; every other
    /// field keeps its default.
    ///
    /// # Example
    /// ```
    /// use beadgrid::MergeConfig;
    ///
    /// let config = MergeConfig::new(12, 30.0);
    /// assert_eq!(config.max_colors, 12);
    /// assert_eq!(config.merge_threshold, 30.0);
    /// ```
    pub fn new(max_colors: usize, merge_threshold: f32) -> Self {
        Self {
            max_colors: max_colors.max(1), // At least one palette slot
            merge_threshold: merge_threshold.max(0.0),
            ..Self::default()
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            max_colors: DEFAULT_MAX_COLORS,
            merge_threshold: 45.0,
            white_brightness: 215.0,
            white_spread: 12,
            black_threshold: 50,
            protect_near_black: true,
            near_black_merge_enabled: true,
            near_black_merge_limit: 3,
            merge_trigger_ratio: 1.5,
            merge_trigger_min_overflow: 6,
        }
    }
}
