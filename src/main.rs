use anyhow::{Context, Result};
use beadgrid::{
    catalog::DelimitedFile, ColorCatalog, MergeConfig, PipelineConfig, Rgb8,
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Turns a photograph of a bead grid into a cell-by-cell pattern and, with a
/// catalog, a shopping list of bead codes.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the photograph.
    image: std::path::PathBuf,

    /// Optional catalog file with one `code,hex` entry per line.
    #[arg(long)]
    catalog: Option<std::path::PathBuf>,

    /// Maximum number of distinct colors in the merged palette.
    #[arg(long, default_value_t = 20)]
    max_colors: usize,

    /// Disable rayon parallelism (useful when profiling).
    #[arg(long)]
    sequential: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    let img = image::open(&args.image)
        .with_context(|| format!("Failed to open image {}", args.image.display()))?;

    let mut config = PipelineConfig::default();
    config.merge = MergeConfig::new(args.max_colors, config.merge.merge_threshold);
    if args.sequential {
        config.detect.enable_parallel = false;
        config.extract.enable_parallel = false;
    }

    let pattern = beadgrid::process_image(&img, &config).context("Grid detection failed")?;
    println!(
        "{} x {} cells, {} colors",
        pattern.rows(),
        pattern.cols(),
        pattern.colors.distinct_colors()
    );

    match &args.catalog {
        Some(path) => {
            let catalog = ColorCatalog::load(&DelimitedFile::new(path))
                .with_context(|| format!("Failed to load catalog {}", path.display()))?;
            let result = catalog
                .map_grid(&pattern.colors, None)
                .context("Catalog mapping failed")?;
            println!(
                "mapped onto {} codes, mean dE {:.2}, max dE {:.2}",
                result.stats.unique_codes, result.stats.mean_delta_e, result.stats.max_delta_e
            );
            for entry in &result.palette {
                println!("{:>6} x {}  {}", entry.count, entry.code, entry.hex);
            }
        }
        None => {
            let mut usage: Vec<(Rgb8, usize)> =
                pattern.colors.color_counts().into_iter().collect();
            usage.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
            for (rgb, count) in usage {
                println!("{:>6} x {}", count, beadgrid::color::hex(rgb));
            }
        }
    }

    Ok(())
}

/// End-to-end tests over synthetic photographs.
#[cfg(test)]
mod tests {
    use beadgrid::{catalog::CatalogSource, *};
    use image::{DynamicImage, Rgb, RgbImage};
    use pretty_assertions::assert_eq;

    const LINE: Rgb8 = [25, 25, 25];

    /// Renders a bead-pattern photograph: `cells[r][c]` colors on a grid with
    /// 2px dark separator lines and a plain border.
    fn synthetic_pattern(cells: &[Vec<Rgb8>], cell: u32, margin: u32) -> DynamicImage {
        let rows = cells.len() as u32;
        let cols = cells[0].len() as u32;
        let width = cols * cell + 2 + 2 * margin;
        let height = rows * cell + 2 + 2 * margin;
        let img = RgbImage::from_fn(width, height, |x, y| {
            let (gx, gy) = (x.wrapping_sub(margin), y.wrapping_sub(margin));
            let inside = x >= margin && y >= margin && gx <= cols * cell + 1 && gy <= rows * cell + 1;
            if !inside {
                return Rgb([235, 235, 235]);
            }
            if gx % cell <= 1 || gy % cell <= 1 {
                return Rgb(LINE);
            }
            let (r, c) = ((gy / cell) as usize, (gx / cell) as usize);
            Rgb(cells[r.min(cells.len() - 1)][c.min(cells[0].len() - 1)])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn checker(rows: usize, cols: usize, a: Rgb8, b: Rgb8) -> Vec<Vec<Rgb8>> {
        (0..rows)
            .map(|r| {
                (0..cols)
                    .map(|c| if (r + c) % 2 == 0 { a } else { b })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_pipeline_recovers_a_checkerboard() {
        let red: Rgb8 = [200, 30, 30];
        let blue: Rgb8 = [40, 60, 220];
        let img = synthetic_pattern(&checker(5, 7, red, blue), 24, 10);

        let pattern = process_image(&img, &PipelineConfig::default()).unwrap();
        assert_eq!(pattern.rows(), 5);
        assert_eq!(pattern.cols(), 7);
        assert_eq!(pattern.colors.distinct_colors(), 2);
        // Cell colors land close to the painted ones.
        let got = pattern.colors.get(0, 0);
        assert!(
            color::delta_e(color::rgb_to_lab(got), color::rgb_to_lab(red)) < 5.0,
            "expected ~{red:?}, got {got:?}"
        );
    }

    #[test]
    fn test_pipeline_maps_onto_a_catalog() {
        let cells = checker(4, 4, [200, 30, 30], [255, 255, 255]);
        let img = synthetic_pattern(&cells, 24, 8);
        let pattern = process_image(&img, &PipelineConfig::default()).unwrap();

        let source: Vec<(String, String)> = vec![
            ("R05".into(), "#C81E1E".into()),
            ("W01".into(), "#FFFFFF".into()),
            ("B12".into(), "#2846DC".into()),
        ];
        assert_eq!(source.rows().unwrap().len(), 3);
        let catalog = ColorCatalog::load(&source).unwrap();
        let result = catalog.map_grid(&pattern.colors, None).unwrap();

        assert_eq!(result.stats.total_cells, 16);
        assert_eq!(result.stats.unique_codes, 2);
        let codes: Vec<&str> = result.palette.iter().map(|e| e.code.as_str()).collect();
        assert_eq!(codes, vec!["R05", "W01"]);
        assert_eq!(result.palette[0].count + result.palette[1].count, 16);
    }

    #[test]
    fn test_pipeline_rejects_a_lineless_image() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(180, 180, Rgb([240, 240, 240])));
        assert!(matches!(
            process_image(&img, &PipelineConfig::default()),
            Err(GridError::InsufficientLines { .. })
        ));
    }
}
