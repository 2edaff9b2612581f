//! This crate turns photographs of bead/pixel-art grid patterns into clean
//! logical grids of discrete colors, optionally mapped onto a fixed catalog
//! of standard color codes.
//!
//! The pipeline has four stages, each usable on its own:
//!
//! 1. [`detect::detect_grid`] recovers the row/column line geometry from a
//!    noisy photograph (unknown spacing, lighting, line thickness).
//! 2. [`extract::extract_colors`] produces one representative color per cell
//!    despite compression noise, printed codes and watermarks.
//! 3. [`merge::merge_palette`] collapses the noisy color set down to a small,
//!    visually faithful palette.
//! 4. [`catalog::ColorCatalog::map_grid`] assigns standard color codes via
//!    CIEDE2000 perceptual distance.
//!
//! Image decoding, rendering and any interactive surface are the caller's
//! concern; all inputs are fully materialized `image` crate buffers.
//!
//! # Example
//!
//! ```
//! use beadgrid::{process_image, PipelineConfig};
//! use image::{DynamicImage, Rgb, RgbImage};
//!
//! // A tiny synthetic pattern: 3x3 cells of 20px, separated by black lines.
//! let img = RgbImage::from_fn(61, 61, |x, y| {
//!     if x % 20 == 0 || y % 20 == 0 {
//!         Rgb([0, 0, 0])
//!     } else {
//!         Rgb([200, 60, 60])
//!     }
//! });
//! let pattern =
//!     process_image(&DynamicImage::ImageRgb8(img), &PipelineConfig::default()).unwrap();
//! assert_eq!(pattern.rows(), 3);
//! assert_eq!(pattern.cols(), 3);
//! ```

pub mod catalog;
pub mod color;
pub mod config;
pub mod detect;
pub mod extract;
pub mod geometry;
pub mod merge;

use std::fmt;

use image::DynamicImage;
use smallvec::SmallVec;
use thiserror::Error;
use tracing::*;

pub use catalog::{CatalogSource, ColorCatalog, DelimitedFile, MappingResult};
pub use color::Rgb8;
pub use config::{DetectConfig, ExtractConfig, MergeConfig};
pub use geometry::{ColorGrid, GridGeometry};

// Determined through benchmarking typical use cases
const DEFAULT_SMALLVEC_SIZE: usize = 32;

/// A type alias for SmallVec with an optimized stack-allocated buffer size.
pub type SmallVecLine<T> = SmallVec<[T; DEFAULT_SMALLVEC_SIZE]>;

/// The image axis a diagnostic refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Axis {
    Rows,
    Columns,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Rows => write!(f, "row"),
            Axis::Columns => write!(f, "column"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Invalid image dimensions: width={width}, height={height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error(
        "Not enough grid lines found: {horizontal} horizontal, {vertical} vertical \
         (need at least 2 per axis)"
    )]
    InsufficientLines { horizontal: usize, vertical: usize },

    #[error("Grid geometry too irregular along the {axis} axis, even after retry")]
    IrregularGeometry { axis: Axis },
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Color catalog is empty (or the allowed subset matches no entry)")]
    EmptyCatalog,

    #[error("Failed to read catalog source: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the full detect/extract/merge pipeline.
///
/// # Example
/// ```
/// use beadgrid::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.merge.max_colors, 20);
/// ```
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub detect: DetectConfig,
    pub extract: ExtractConfig,
    pub merge: MergeConfig,
}

/// The result of running the full pipeline over one photograph.
#[derive(Debug, Clone)]
pub struct Pattern {
    /// The recovered grid geometry.
    pub geometry: GridGeometry,
    /// One merged color per cell.
    pub colors: ColorGrid,
}

impl Pattern {
    pub fn rows(&self) -> usize {
        self.colors.rows()
    }

    pub fn cols(&self) -> usize {
        self.colors.cols()
    }
}

/// Runs detection, extraction and palette merging over an image.
///
/// Catalog mapping is separate: build a [`ColorCatalog`] and call
/// [`ColorCatalog::map_grid`] on `pattern.colors`.
pub fn process_image(image: &DynamicImage, config: &PipelineConfig) -> Result<Pattern, GridError> {
    let geometry = detect::detect_grid(image, &config.detect)?;
    info!(rows = geometry.rows(), cols = geometry.cols(), "detected grid");
    let colors = extract::extract_colors(image, &geometry, &config.extract);
    let colors = merge::merge_palette(&colors, &config.merge);
    debug!(distinct = colors.distinct_colors(), "merged palette");
    Ok(Pattern { geometry, colors })
}
