//! Color scales for legends and maps.
//!
//! Two scales are used: a zero-centred diverging scale (blue for sinks,
//! red for emissions) and a 20 entry categorical palette for change ids.
//! Both sample their lookup tables the same way common plotting libraries
//! do, so rendered maps and exported legends agree on every color.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

const LUT_SIZE: usize = 256;

/// Anchor colors of the diverging scale, evenly spaced over `[0, 1]`.
const SEISMIC_ANCHORS: [(f64, f64, f64); 5] = [
    (0.0, 0.0, 0.3),
    (0.0, 0.0, 1.0),
    (1.0, 1.0, 1.0),
    (1.0, 0.0, 0.0),
    (0.5, 0.0, 0.0),
];

const TAB20B: [(u8, u8, u8); 20] = [
    (57, 59, 121),
    (82, 84, 163),
    (107, 110, 207),
    (156, 158, 222),
    (99, 121, 57),
    (140, 162, 82),
    (181, 207, 107),
    (206, 219, 156),
    (140, 109, 49),
    (189, 158, 57),
    (231, 186, 82),
    (231, 203, 148),
    (132, 60, 57),
    (173, 73, 74),
    (214, 97, 107),
    (231, 150, 156),
    (123, 65, 115),
    (165, 81, 148),
    (206, 109, 189),
    (222, 158, 214),
];

/// Neutral color of cells without land-cover change.
pub const NO_CHANGE_GRAY: Rgb = Rgb::new(128, 128, 128);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        Some(Self::new(r, g, b))
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

// Legends store colors as `[r, g, b]`.
impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [self.r, self.g, self.b].serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let [r, g, b] = <[u8; 3]>::deserialize(deserializer)?;
        Ok(Self::new(r, g, b))
    }
}

/// Convert a `[0, 1]` channel value to a byte, rounding half to even.
fn channel_to_u8(value: f64) -> u8 {
    (value * 255.0).round_ties_even().clamp(0.0, 255.0) as u8
}

/// Piecewise linear lookup table for one channel of the diverging scale.
fn seismic_channel(channel: impl Fn(&(f64, f64, f64)) -> f64) -> [f64; LUT_SIZE] {
    let n = LUT_SIZE;
    let last = (n - 1) as f64;
    let step = 1.0 / last;

    let anchors: Vec<f64> = (0..SEISMIC_ANCHORS.len())
        .map(|i| i as f64 / (SEISMIC_ANCHORS.len() - 1) as f64 * last)
        .collect();
    let values: Vec<f64> = SEISMIC_ANCHORS.iter().map(channel).collect();

    let mut lut = [0.0; LUT_SIZE];
    lut[0] = values[0];
    lut[n - 1] = values[values.len() - 1];
    for (i, slot) in lut.iter_mut().enumerate().take(n - 1).skip(1) {
        let x = last * (i as f64 * step);
        // first anchor >= x
        let ind = anchors.partition_point(|&a| a < x);
        let distance = (x - anchors[ind - 1]) / (anchors[ind] - anchors[ind - 1]);
        *slot = (distance * (values[ind] - values[ind - 1]) + values[ind - 1]).clamp(0.0, 1.0);
    }
    lut
}

fn seismic_lut() -> &'static [Rgb; LUT_SIZE] {
    static LUT: std::sync::OnceLock<[Rgb; LUT_SIZE]> = std::sync::OnceLock::new();
    LUT.get_or_init(|| {
        let r = seismic_channel(|c| c.0);
        let g = seismic_channel(|c| c.1);
        let b = seismic_channel(|c| c.2);
        let mut lut = [Rgb::new(0, 0, 0); LUT_SIZE];
        for i in 0..LUT_SIZE {
            lut[i] = Rgb::new(channel_to_u8(r[i]), channel_to_u8(g[i]), channel_to_u8(b[i]));
        }
        lut
    })
}

/// Index into a colormap of `n` entries for a normalised value.
fn lut_index(fraction: f64, n: usize) -> usize {
    let scaled = fraction * n as f64;
    if scaled.is_nan() || scaled < 0.0 {
        return 0;
    }
    (scaled as usize).min(n - 1)
}

/// Zero-centred diverging color scale over `[-bound, bound]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DivergingScale {
    bound: f64,
}

impl DivergingScale {
    pub fn new(bound: f64) -> Self {
        Self { bound: bound.abs() }
    }

    /// Scale bounded by the largest absolute value in `values`.
    pub fn symmetric(values: &[f64]) -> Self {
        let bound = values
            .iter()
            .filter(|v| v.is_finite())
            .fold(0.0_f64, |acc, v| acc.max(v.abs()));
        Self::new(bound)
    }

    pub fn bound(&self) -> f64 {
        self.bound
    }

    /// Position of `value` on the scale, `0.5` for zero.
    pub fn normalize(&self, value: f64) -> f64 {
        if self.bound == 0.0 {
            return 0.5;
        }
        let vmin = -self.bound;
        let vmax = self.bound;
        (value - vmin) / (vmax - vmin)
    }

    pub fn color_for(&self, value: f64) -> Rgb {
        seismic_lut()[lut_index(self.normalize(value), LUT_SIZE)]
    }
}

/// Colors for a series of values on a diverging scale centred at zero and
/// bounded by the largest absolute value of the series.
pub fn get_colors(values: &[f64]) -> Vec<Rgb> {
    let scale = DivergingScale::symmetric(values);
    values.iter().map(|&v| scale.color_for(v)).collect()
}

/// Categorical palette color for a fraction in `[0, 1]`.
pub fn categorical_color(fraction: f64) -> Rgb {
    TAB20B[lut_index(fraction, TAB20B.len())].into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_colors() {
        let emissions = [-376.6, -19.12, 0.0, 16.8, 310.97];
        let colors: Vec<String> = get_colors(&emissions).iter().map(Rgb::to_hex).collect();
        assert_eq!(
            colors,
            vec!["#00004c", "#e5e5ff", "#fffdfd", "#ffe9e9", "#ac0000"]
        );
    }

    #[test]
    fn test_extremes_and_midpoint() {
        let scale = DivergingScale::new(1.82);
        assert_eq!(scale.color_for(-1.82), Rgb::new(0, 0, 76));
        assert_eq!(scale.color_for(1.82), Rgb::new(128, 0, 0));
        assert_eq!(scale.color_for(0.0), Rgb::new(255, 253, 253));
        assert_eq!(scale.color_for(0.915), Rgb::new(254, 0, 0));
        assert_eq!(scale.color_for(0.905), Rgb::new(255, 1, 1));
        assert_eq!(scale.color_for(-0.535), Rgb::new(105, 105, 255));
        assert_eq!(scale.color_for(1.45), Rgb::new(179, 0, 0));
    }

    #[test]
    fn test_all_zero_values_map_to_midpoint() {
        let colors = get_colors(&[0.0, 0.0, 0.0]);
        assert!(colors.iter().all(|c| *c == Rgb::new(255, 253, 253)));
    }

    #[test]
    fn test_categorical_color() {
        assert_eq!(categorical_color(2.0 / 14.0), Rgb::new(107, 110, 207));
        assert_eq!(categorical_color(7.0 / 14.0), Rgb::new(231, 186, 82));
        assert_eq!(categorical_color(1.0), Rgb::new(222, 158, 214));
        assert_eq!(categorical_color(0.0), Rgb::new(57, 59, 121));
    }

    #[test]
    fn test_hex_conversion() {
        let color = Rgb::new(172, 0, 0);
        assert_eq!(color.to_hex(), "#ac0000");
        assert_eq!(Rgb::from_hex("#ac0000"), Some(color));
        assert_eq!(Rgb::from_hex("ac0000"), Some(color));
        assert_eq!(Rgb::from_hex("#ac00"), None);
    }
}
