//! Bead-catalog lookup.
//!
//! Loads a catalog of purchasable bead colors and maps a merged grid onto it
//! with CIEDE2000 nearest-neighbor matching, producing the shopping list and
//! per-cell match diagnostics.

use std::{collections::HashMap, fs, path::PathBuf};

use palette::{color_difference::Ciede2000, white_point::D65, Lab};
use tracing::*;

use crate::{
    color::{self, Rgb8},
    geometry::ColorGrid,
    CatalogError,
};

/// Number of runner-up matches recorded per cell.
const ALTERNATE_COUNT: usize = 3;

/// Anything that can yield catalog rows of (code, hex color).
pub trait CatalogSource {
    fn rows(&self) -> Result<Vec<(String, String)>, CatalogError>;
}

/// A catalog file with one `code<sep>hex` entry per line.
///
/// Blank lines and lines starting with `#` are ignored.
pub struct DelimitedFile {
    pub path: PathBuf,
    pub separator: char,
}

impl DelimitedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            separator: ',',
        }
    }
}

impl CatalogSource for DelimitedFile {
    fn rows(&self) -> Result<Vec<(String, String)>, CatalogError> {
        let content = fs::read_to_string(&self.path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                line.split_once(self.separator)
                    .map(|(code, hex)| (code.trim().to_string(), hex.trim().to_string()))
            })
            .collect())
    }
}

/// In-memory rows, used by tests and embedding callers.
impl CatalogSource for Vec<(String, String)> {
    fn rows(&self) -> Result<Vec<(String, String)>, CatalogError> {
        Ok(self.clone())
    }
}

/// One catalog entry with its precomputed Lab coordinates.
#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub code: String,
    pub rgb: Rgb8,
    lab: Lab<D65, f32>,
}

/// A loaded bead catalog.
///
/// Entries keep their source order; Lab coordinates are computed once at
/// load time so matching is a pure distance scan.
pub struct ColorCatalog {
    entries: Vec<CatalogEntry>,
}

/// A single catalog match.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ColorMatch {
    pub code: String,
    pub rgb: Rgb8,
    pub delta_e: f32,
}

/// The mapping outcome for one cell.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CellMapping {
    /// The cell's merged color before catalog substitution.
    pub original: Rgb8,
    /// Catalog code of the best match.
    pub code: String,
    /// Catalog color of the best match.
    pub mapped: Rgb8,
    /// CIEDE2000 distance between `original` and `mapped`.
    pub delta_e: f32,
    /// Runner-up matches, best first.
    pub alternates: Vec<ColorMatch>,
}

/// One line of the shopping list.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PaletteEntry {
    pub code: String,
    pub rgb: Rgb8,
    pub hex: String,
    pub count: usize,
}

/// Aggregate match quality over the whole grid.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MappingStats {
    pub total_cells: usize,
    pub unique_codes: usize,
    pub mean_delta_e: f32,
    pub max_delta_e: f32,
}

/// A grid fully mapped onto the catalog.
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct MappingResult {
    /// Row-major per-cell mappings, `rows * cols` entries.
    pub cells: Vec<CellMapping>,
    pub rows: usize,
    pub cols: usize,
    /// Shopping list, most-used first.
    pub palette: Vec<PaletteEntry>,
    pub stats: MappingStats,
}

impl ColorCatalog {
    /// Loads a catalog from `source`, skipping malformed rows.
    ///
    /// # Errors
    /// [`CatalogError::Io`] when the source fails to read, and
    /// [`CatalogError::EmptyCatalog`] when no valid entry remains.
    pub fn load(source: &dyn CatalogSource) -> Result<Self, CatalogError> {
        let mut entries = Vec::new();
        for (code, hex) in source.rows()? {
            match color::parse_hex(&hex) {
                Some(rgb) => entries.push(CatalogEntry {
                    code,
                    lab: color::rgb_to_lab(rgb),
                    rgb,
                }),
                None => warn!(%code, %hex, "skipping catalog row with malformed color"),
            }
        }
        if entries.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }
        info!(entries = entries.len(), "catalog loaded");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry for `code`, if present.
    pub fn info(&self, code: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.code == code)
    }

    /// Ranks catalog entries by CIEDE2000 distance to `rgb`, closest first,
    /// keeping at most `top_n` matches.
    ///
    /// `allowed` restricts matching to the named codes; `None` means the
    /// whole catalog.
    ///
    /// # Errors
    /// [`CatalogError::EmptyCatalog`] when `allowed` filters out every entry.
    pub fn find_closest(
        &self,
        rgb: Rgb8,
        top_n: usize,
        allowed: Option<&[String]>,
    ) -> Result<Vec<ColorMatch>, CatalogError> {
        let lab = color::rgb_to_lab(rgb);
        let mut matches: Vec<ColorMatch> = self
            .entries
            .iter()
            .filter(|entry| match allowed {
                Some(codes) => codes.iter().any(|c| *c == entry.code),
                None => true,
            })
            .map(|entry| ColorMatch {
                code: entry.code.clone(),
                rgb: entry.rgb,
                delta_e: lab.difference(entry.lab),
            })
            .collect();
        if matches.is_empty() {
            return Err(CatalogError::EmptyCatalog);
        }
        matches.sort_by(|a, b| a.delta_e.total_cmp(&b.delta_e));
        matches.truncate(top_n.max(1));
        Ok(matches)
    }

    /// Maps every cell of `grid` onto the catalog.
    ///
    /// Matching runs once per distinct grid color; identical cells share the
    /// same result.
    pub fn map_grid(
        &self,
        grid: &ColorGrid,
        allowed: Option<&[String]>,
    ) -> Result<MappingResult, CatalogError> {
        let mut memo: HashMap<Rgb8, Vec<ColorMatch>> = HashMap::new();
        for rgb in grid.color_counts().into_keys() {
            memo.insert(rgb, self.find_closest(rgb, 1 + ALTERNATE_COUNT, allowed)?);
        }

        let mut cells = Vec::with_capacity(grid.rows() * grid.cols());
        let mut code_counts: HashMap<String, usize> = HashMap::new();
        let mut delta_sum = 0.0f64;
        let mut delta_max = 0.0f32;
        for original in grid.iter() {
            let ranked = &memo[original];
            let best = &ranked[0];
            delta_sum += best.delta_e as f64;
            delta_max = delta_max.max(best.delta_e);
            *code_counts.entry(best.code.clone()).or_insert(0) += 1;
            cells.push(CellMapping {
                original: *original,
                code: best.code.clone(),
                mapped: best.rgb,
                delta_e: best.delta_e,
                alternates: ranked[1..].to_vec(),
            });
        }

        let total_cells = cells.len();
        let mut palette: Vec<PaletteEntry> = code_counts
            .into_iter()
            .filter_map(|(code, count)| {
                self.info(&code).map(|entry| PaletteEntry {
                    code,
                    rgb: entry.rgb,
                    hex: color::hex(entry.rgb),
                    count,
                })
            })
            .collect();
        palette.sort_by(|a, b| b.count.cmp(&a.count).then(a.code.cmp(&b.code)));

        let stats = MappingStats {
            total_cells,
            unique_codes: palette.len(),
            mean_delta_e: if total_cells == 0 {
                0.0
            } else {
                (delta_sum / total_cells as f64) as f32
            },
            max_delta_e: delta_max,
        };
        debug!(
            cells = stats.total_cells,
            codes = stats.unique_codes,
            mean_delta_e = stats.mean_delta_e,
            "grid mapped onto catalog"
        );

        Ok(MappingResult {
            cells,
            rows: grid.rows(),
            cols: grid.cols(),
            palette,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(entries: &[(&str, &str)]) -> Vec<(String, String)> {
        entries
            .iter()
            .map(|(code, hex)| (code.to_string(), hex.to_string()))
            .collect()
    }

    fn catalog() -> ColorCatalog {
        ColorCatalog::load(&rows(&[
            ("W01", "#FFFFFF"),
            ("K01", "#000000"),
            ("R05", "#C81E1E"),
            ("B12", "#2846DC"),
            ("G07", "#1EB450"),
        ]))
        .unwrap()
    }

    #[test]
    fn test_exact_match_has_zero_delta() {
        let matches = catalog()
            .find_closest([200, 30, 30], 1 + ALTERNATE_COUNT, None)
            .unwrap();
        assert_eq!(matches[0].code, "R05");
        assert!(matches[0].delta_e < 1e-4);
        assert_eq!(matches.len(), 1 + ALTERNATE_COUNT);
        // Ranked ascending.
        for pair in matches.windows(2) {
            assert!(pair[0].delta_e <= pair[1].delta_e);
        }
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let catalog = ColorCatalog::load(&rows(&[
            ("A1", "#FF0000"),
            ("A2", "not-a-color"),
            ("A3", "#12345"),
        ]))
        .unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.info("A1").unwrap().rgb, [255, 0, 0]);
        assert!(catalog.info("A2").is_none());
    }

    #[test]
    fn test_empty_catalog_is_an_error() {
        let no_rows: Vec<(String, String)> = Vec::new();
        assert!(matches!(
            ColorCatalog::load(&no_rows),
            Err(CatalogError::EmptyCatalog)
        ));
        assert!(matches!(
            ColorCatalog::load(&rows(&[("A1", "nope")])),
            Err(CatalogError::EmptyCatalog)
        ));
    }

    #[test]
    fn test_allowed_subset_restricts_matching() {
        let catalog = catalog();
        let allowed = vec!["W01".to_string(), "K01".to_string()];
        let matches = catalog
            .find_closest([200, 30, 30], 4, Some(&allowed))
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|m| m.code == "W01" || m.code == "K01"));

        let empty: Vec<String> = vec!["ZZZ".to_string()];
        assert!(matches!(
            catalog.find_closest([200, 30, 30], 4, Some(&empty)),
            Err(CatalogError::EmptyCatalog)
        ));
    }

    #[test]
    fn test_map_grid_counts_and_stats() {
        let catalog = catalog();
        let grid = ColorGrid::from_rows(vec![
            vec![[200, 30, 30], [200, 30, 30]],
            vec![[30, 180, 80], [255, 255, 255]],
        ]);
        let result = catalog.map_grid(&grid, None).unwrap();
        assert_eq!(result.rows, 2);
        assert_eq!(result.cols, 2);
        assert_eq!(result.stats.total_cells, 4);
        assert_eq!(result.stats.unique_codes, 3);
        assert_eq!(result.palette[0].code, "R05");
        assert_eq!(result.palette[0].count, 2);
        assert_eq!(result.palette[0].hex, "#c81e1e");
        // The white cell is an exact hit and does not raise the mean.
        let white_cell = &result.cells[3];
        assert_eq!(white_cell.code, "W01");
        assert!(white_cell.delta_e < 1e-4);
        assert_eq!(white_cell.alternates.len(), ALTERNATE_COUNT);
        assert!(result.stats.max_delta_e >= result.stats.mean_delta_e);
    }

    #[test]
    fn test_identical_cells_share_their_mapping() {
        let catalog = catalog();
        let grid = ColorGrid::new(3, 3, [199, 31, 29]);
        let result = catalog.map_grid(&grid, None).unwrap();
        assert!(result.cells.iter().all(|c| c == &result.cells[0]));
        assert_eq!(result.palette.len(), 1);
        assert_eq!(result.palette[0].count, 9);
    }

    #[test]
    fn test_delimited_file_parses_comments_and_separators() {
        let dir = std::env::temp_dir().join("beadgrid-catalog-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("catalog.csv");
        std::fs::write(&path, "# hama midi\nH01, #FF0000\n\nH02,00FF00\nbroken-line\n").unwrap();

        let catalog = ColorCatalog::load(&DelimitedFile::new(&path)).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.info("H02").unwrap().rgb, [0, 255, 0]);

        assert!(matches!(
            ColorCatalog::load(&DelimitedFile::new(dir.join("missing.csv"))),
            Err(CatalogError::Io(_))
        ));
    }
}
