//! Color conversions and perceptual distance.
//!
//! All perceptual work in this crate (robust trimming, palette merging,
//! catalog mapping) goes through the same sRGB → Lab (D65) conversion from
//! the `palette` crate. Catalog mapping uses CIEDE2000; merging uses plain
//! Euclidean distance in Lab, which is cheaper and sufficient for
//! cluster-or-not decisions.

use palette::{color_difference::Ciede2000, white_point::D65, FromColor, Lab, Srgb};

/// An RGB triple, one byte per channel.
pub type Rgb8 = [u8; 3];

/// Converts a gamma-encoded sRGB triple to Lab (D65 reference white).
pub fn rgb_to_lab(rgb: Rgb8) -> Lab<D65, f32> {
    let srgb = Srgb::new(
        rgb[0] as f32 / 255.0,
        rgb[1] as f32 / 255.0,
        rgb[2] as f32 / 255.0,
    );
    Lab::from_color(srgb)
}

/// Converts a Lab color back to an sRGB triple, clamping out-of-gamut values.
pub fn lab_to_rgb(lab: Lab<D65, f32>) -> Rgb8 {
    let srgb = Srgb::from_color(lab);
    let srgb: Srgb<u8> = srgb.into_format();
    [srgb.red, srgb.green, srgb.blue]
}

/// CIEDE2000 color difference between two Lab colors.
///
/// Symmetric by construction and zero iff both inputs are identical.
pub fn delta_e(a: Lab<D65, f32>, b: Lab<D65, f32>) -> f32 {
    a.difference(b)
}

/// Euclidean distance in Lab space.
pub(crate) fn lab_distance(a: Lab<D65, f32>, b: Lab<D65, f32>) -> f32 {
    let dl = a.l - b.l;
    let da = a.a - b.a;
    let db = a.b - b.b;
    (dl * dl + da * da + db * db).sqrt()
}

/// Mean channel brightness.
pub fn brightness(rgb: Rgb8) -> f32 {
    (rgb[0] as f32 + rgb[1] as f32 + rgb[2] as f32) / 3.0
}

/// Difference between the largest and smallest channel.
pub fn channel_spread(rgb: Rgb8) -> u8 {
    let max = rgb[0].max(rgb[1]).max(rgb[2]);
    let min = rgb[0].min(rgb[1]).min(rgb[2]);
    max - min
}

/// Bright and nearly gray: background paper, anti-aliased borders.
pub fn is_near_white(rgb: Rgb8, min_brightness: f32, max_spread: u8) -> bool {
    brightness(rgb) > min_brightness && channel_spread(rgb) < max_spread
}

/// All channels below the dark threshold: outline ink, printed codes.
pub fn is_near_black(rgb: Rgb8, threshold: u8) -> bool {
    rgb[0] < threshold && rgb[1] < threshold && rgb[2] < threshold
}

/// Formats a triple as `#rrggbb`.
pub fn hex(rgb: Rgb8) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Parses `rrggbb` or `#rrggbb`, case-insensitive.
pub fn parse_hex(s: &str) -> Option<Rgb8> {
    let s = s.trim();
    let s = s.strip_prefix('#').unwrap_or(s);
    if s.len() != 6 || !s.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&s[0..2], 16).ok()?;
    let g = u8::from_str_radix(&s[2..4], 16).ok()?;
    let b = u8::from_str_radix(&s[4..6], 16).ok()?;
    Some([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(hex([255, 0, 128]), "#ff0080");
        assert_eq!(parse_hex("#ff0080"), Some([255, 0, 128]));
        assert_eq!(parse_hex("FF0080"), Some([255, 0, 128]));
        assert_eq!(parse_hex("  #a1b2c3 "), Some([0xa1, 0xb2, 0xc3]));
        assert_eq!(parse_hex("xyzzy!"), None);
        assert_eq!(parse_hex("#ff00"), None);
    }

    #[test]
    fn test_classification() {
        assert!(is_near_white([250, 248, 252], 215.0, 12));
        assert!(!is_near_white([250, 200, 252], 215.0, 12));
        assert!(is_near_black([10, 20, 30], 50));
        assert!(!is_near_black([10, 20, 80], 50));
    }

    #[test]
    fn test_lab_round_trip_is_close() {
        for rgb in [[0, 0, 0], [255, 255, 255], [200, 40, 40], [13, 200, 97]] {
            let back = lab_to_rgb(rgb_to_lab(rgb));
            for c in 0..3 {
                assert!(
                    (back[c] as i16 - rgb[c] as i16).abs() <= 1,
                    "{rgb:?} -> {back:?}"
                );
            }
        }
    }

    proptest! {
        #[test]
        fn test_delta_e_symmetric(
            r1 in 0u8..=255, g1 in 0u8..=255, b1 in 0u8..=255,
            r2 in 0u8..=255, g2 in 0u8..=255, b2 in 0u8..=255,
        ) {
            let lab1 = rgb_to_lab([r1, g1, b1]);
            let lab2 = rgb_to_lab([r2, g2, b2]);
            let forward = delta_e(lab1, lab2);
            let backward = delta_e(lab2, lab1);
            prop_assert!((forward - backward).abs() < 1e-4);
        }

        #[test]
        fn test_delta_e_zero_on_identity(r in 0u8..=255, g in 0u8..=255, b in 0u8..=255) {
            let lab = rgb_to_lab([r, g, b]);
            prop_assert!(delta_e(lab, lab).abs() < 1e-4);
        }

        #[test]
        fn test_delta_e_positive_on_distinct_grays(v in 0u8..200) {
            let a = rgb_to_lab([v, v, v]);
            let b = rgb_to_lab([v + 40, v + 40, v + 40]);
            prop_assert!(delta_e(a, b) > 0.0);
        }
    }
}
