//! Palette consolidation.
//!
//! Collapses the extractor's raw palette into a buildable one: near-white
//! variants become a single white, near-black colors are protected (or
//! gently pooled), perceptually close colors are merged greedily, and a
//! Lab-space k-means pass caps the palette when it still overflows.

use std::collections::HashMap;

use kmeans_colors::get_kmeans;
use palette::{white_point::D65, Lab};
use tracing::*;

use crate::{
    color::{self, Rgb8},
    config::MergeConfig,
    geometry::ColorGrid,
};

const KMEANS_CONVERGE: f32 = 0.0025;
const KMEANS_MAX_ITER: usize = 100;
const KMEANS_SEED: u64 = 42;

/// Returns a copy of `grid` with its palette consolidated per `config`.
///
/// The grid shape is preserved; only cell colors are substituted.
pub fn merge_palette(grid: &ColorGrid, config: &MergeConfig) -> ColorGrid {
    let counts = grid.color_counts();
    let mut map: HashMap<Rgb8, Rgb8> = HashMap::new();

    let mut whites: Vec<(Rgb8, usize)> = Vec::new();
    let mut blacks: Vec<(Rgb8, usize)> = Vec::new();
    let mut others: Vec<(Rgb8, usize)> = Vec::new();
    for (&rgb, &count) in &counts {
        if color::is_near_white(rgb, config.white_brightness, config.white_spread) {
            whites.push((rgb, count));
        } else if color::is_near_black(rgb, config.black_threshold) {
            blacks.push((rgb, count));
        } else {
            others.push((rgb, count));
        }
    }

    // Near-white colors are resolved here and never enter the greedy merge
    // or the clustering cap; a background white must not drift toward a pale
    // cell color.
    if whites.len() > 1 {
        let unified = weighted_mean(&whites);
        debug!(variants = whites.len(), ?unified, "collapsing near-white variants");
        for (rgb, _) in &whites {
            map.insert(*rgb, unified);
        }
    }

    let protected_blacks = if config.near_black_merge_enabled
        && blacks.len() > config.near_black_merge_limit
    {
        let pooled = weighted_mean(&blacks);
        debug!(variants = blacks.len(), ?pooled, "pooling near-black variants");
        for (rgb, _) in &blacks {
            map.insert(*rgb, pooled);
        }
        1
    } else if config.protect_near_black {
        // Protected blacks pass through untouched but still occupy slots.
        blacks.len()
    } else {
        others.extend(blacks);
        0
    };

    let greedy = greedy_merge(&others, config);
    map.extend(greedy.iter().map(|(from, to)| (*from, *to)));

    let mut centroids: Vec<Rgb8> = greedy.values().copied().collect();
    centroids.sort_unstable();
    centroids.dedup();

    let trigger = ((config.max_colors as f32 * config.merge_trigger_ratio) as usize)
        .max(config.max_colors + config.merge_trigger_min_overflow);
    if centroids.len() + protected_blacks > trigger {
        let k = config.max_colors.saturating_sub(protected_blacks).max(1);
        info!(
            centroids = centroids.len(),
            protected_blacks, k, "palette still overflows, clustering in Lab space"
        );
        let clustered = cluster_centroids(&centroids, k);
        for mapped in map.values_mut() {
            if let Some(repr) = clustered.get(mapped) {
                *mapped = *repr;
            }
        }
        for (from, to) in clustered {
            map.entry(from).or_insert(to);
        }
    }

    map.retain(|from, to| from != to);
    let mut merged = grid.clone();
    merged.apply_color_map(&map);
    trace!(
        before = grid.distinct_colors(),
        after = merged.distinct_colors(),
        "palette merged"
    );
    merged
}

/// Count-weighted channel mean.
fn weighted_mean(colors: &[(Rgb8, usize)]) -> Rgb8 {
    let total: usize = colors.iter().map(|(_, c)| c).sum();
    if total == 0 {
        return [255, 255, 255];
    }
    let mut sums = [0.0f64; 3];
    for (rgb, count) in colors {
        for i in 0..3 {
            sums[i] += rgb[i] as f64 * *count as f64;
        }
    }
    [
        (sums[0] / total as f64).round() as u8,
        (sums[1] / total as f64).round() as u8,
        (sums[2] / total as f64).round() as u8,
    ]
}

/// Greedy frequency-ordered merge. Each color seeds a centroid or joins the
/// nearest existing centroid within the Lab threshold; centroids drift as
/// count-weighted means of their members. Returns the color -> representative
/// map (identity entries included).
fn greedy_merge(colors: &[(Rgb8, usize)], config: &MergeConfig) -> HashMap<Rgb8, Rgb8> {
    struct Centroid {
        lab: Lab<D65, f32>,
        rgb: [f32; 3],
        count: usize,
        members: Vec<Rgb8>,
    }

    let mut ordered: Vec<(Rgb8, usize)> = colors.to_vec();
    ordered.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut centroids: Vec<Centroid> = Vec::new();
    for (rgb, count) in ordered {
        let lab = color::rgb_to_lab(rgb);
        let nearest = centroids
            .iter()
            .enumerate()
            .map(|(i, c)| (color::lab_distance(c.lab, lab), i))
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match nearest {
            Some((distance, i)) if distance <= config.merge_threshold => {
                let centroid = &mut centroids[i];
                let total = (centroid.count + count) as f32;
                let w = count as f32 / total;
                centroid.lab = Lab::new(
                    centroid.lab.l * (1.0 - w) + lab.l * w,
                    centroid.lab.a * (1.0 - w) + lab.a * w,
                    centroid.lab.b * (1.0 - w) + lab.b * w,
                );
                for i in 0..3 {
                    centroid.rgb[i] = centroid.rgb[i] * (1.0 - w) + rgb[i] as f32 * w;
                }
                centroid.count += count;
                centroid.members.push(rgb);
            }
            _ => centroids.push(Centroid {
                lab,
                rgb: [rgb[0] as f32, rgb[1] as f32, rgb[2] as f32],
                count,
                members: vec![rgb],
            }),
        }
    }

    let mut map = HashMap::new();
    for centroid in &centroids {
        let repr = [
            centroid.rgb[0].round().clamp(0.0, 255.0) as u8,
            centroid.rgb[1].round().clamp(0.0, 255.0) as u8,
            centroid.rgb[2].round().clamp(0.0, 255.0) as u8,
        ];
        for member in &centroid.members {
            // A member that drifted out of range keeps its own color.
            let final_distance =
                color::lab_distance(color::rgb_to_lab(*member), centroid.lab);
            if final_distance <= config.merge_threshold {
                map.insert(*member, repr);
            } else {
                map.insert(*member, *member);
            }
        }
    }
    map
}

/// K-means over the distinct greedy centroids in Lab space; every centroid is
/// mapped to the RGB rendering of its cluster center.
fn cluster_centroids(centroids: &[Rgb8], k: usize) -> HashMap<Rgb8, Rgb8> {
    if centroids.len() <= k {
        return HashMap::new();
    }
    let buffer: Vec<Lab<D65, f32>> = centroids.iter().map(|c| color::rgb_to_lab(*c)).collect();
    let result = get_kmeans(k, KMEANS_MAX_ITER, KMEANS_CONVERGE, false, &buffer, KMEANS_SEED);

    let representatives: Vec<Rgb8> = result
        .centroids
        .iter()
        .map(|lab| color::lab_to_rgb(*lab))
        .collect();
    centroids
        .iter()
        .zip(&result.indices)
        .map(|(rgb, &cluster)| (*rgb, representatives[cluster as usize]))
        .collect()
}
