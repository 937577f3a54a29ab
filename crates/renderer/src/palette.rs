//! Color palettes and the lookup tables the fragment shader samples.
//!
//! A [`Palette`] is a sparse list of [`ColorStop`]s. [`generate`] turns it into
//! a dense RGBA table with one texel per iteration, which `GraphicsContext`
//! uploads as a `steps x 1` texture. Stop placement follows canvas gradient
//! rules: stops are ordered by offset (ties keep insertion order), a sample
//! sitting exactly on several stops takes the last one, and samples outside
//! the stop range take the nearest end color.
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum PaletteError {
    #[error("palette must contain at least one color stop")]
    Empty,
    #[error("palette resolution must be at least one step")]
    ZeroSteps,
    #[error("color stop {index} has a non-finite value")]
    NonFinite { index: usize },
    #[error("color stop {index} has offset {value} outside [0, 1]; enable force_spacing to use it as a sort key")]
    OffsetOutOfRange { index: usize, value: f64 },
    #[error("palette of {steps} steps exceeds the GPU texture width limit of {limit}")]
    ExceedsTextureLimit { steps: u32, limit: u32 },
    #[error("failed to parse palette: {0}")]
    Parse(#[from] toml::de::Error),
}

/// 8-bit RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::opaque(0, 0, 0);
    pub const RED: Rgba = Rgba::opaque(255, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// Parses `#rgb`, `#rgba`, `#rrggbb`, `#rrggbbaa` or a basic CSS color
    /// name (case-insensitive).
    pub fn parse(value: &str) -> Result<Self, String> {
        let trimmed = value.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| format!("invalid hex color '{trimmed}'"));
        }
        named_color(&trimmed.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown color name '{trimmed}'"))
    }

    fn to_array(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    fn lerp(self, other: Rgba, fraction: f64) -> Rgba {
        let channel = |from: u8, to: u8| {
            let value = f64::from(from) + (f64::from(to) - f64::from(from)) * fraction;
            value.round().clamp(0.0, 255.0) as u8
        };
        Rgba::new(
            channel(self.r, other.r),
            channel(self.g, other.g),
            channel(self.b, other.b),
            channel(self.a, other.a),
        )
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            write!(f, "#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Rgba {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Rgba::parse(&value)
    }
}

impl From<Rgba> for String {
    fn from(value: Rgba) -> Self {
        value.to_string()
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return None;
    }
    let nibble = |index: usize| u8::from_str_radix(&hex[index..index + 1], 16).ok();
    let byte = |index: usize| u8::from_str_radix(&hex[index..index + 2], 16).ok();
    match hex.len() {
        3 | 4 => {
            let mut channels = [255u8; 4];
            for (slot, index) in channels.iter_mut().zip(0..hex.len()) {
                *slot = nibble(index)? * 17;
            }
            Some(Rgba::new(channels[0], channels[1], channels[2], channels[3]))
        }
        6 | 8 => {
            let alpha = if hex.len() == 8 { byte(6)? } else { 255 };
            Some(Rgba::new(byte(0)?, byte(2)?, byte(4)?, alpha))
        }
        _ => None,
    }
}

fn named_color(name: &str) -> Option<Rgba> {
    let color = match name {
        "black" => Rgba::opaque(0, 0, 0),
        "white" => Rgba::opaque(255, 255, 255),
        "red" => Rgba::opaque(255, 0, 0),
        "lime" => Rgba::opaque(0, 255, 0),
        "green" => Rgba::opaque(0, 128, 0),
        "blue" => Rgba::opaque(0, 0, 255),
        "yellow" => Rgba::opaque(255, 255, 0),
        "cyan" | "aqua" => Rgba::opaque(0, 255, 255),
        "magenta" | "fuchsia" => Rgba::opaque(255, 0, 255),
        "gray" | "grey" => Rgba::opaque(128, 128, 128),
        "silver" => Rgba::opaque(192, 192, 192),
        "maroon" => Rgba::opaque(128, 0, 0),
        "navy" => Rgba::opaque(0, 0, 128),
        "orange" => Rgba::opaque(255, 165, 0),
        "purple" => Rgba::opaque(128, 0, 128),
        "transparent" => Rgba::new(0, 0, 0, 0),
        _ => return None,
    };
    Some(color)
}

/// One anchor of a palette gradient.
///
/// `value` is the gradient offset in `[0, 1]`, or only a sort key when the
/// palette forces even spacing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorStop {
    pub value: f64,
    pub color: Rgba,
}

impl ColorStop {
    pub const fn new(value: f64, color: Rgba) -> Self {
        Self { value, color }
    }
}

/// A sparse color ramp plus the spacing policy used to expand it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    #[serde(default)]
    pub force_spacing: bool,
    pub stops: Vec<ColorStop>,
}

impl Default for Palette {
    /// Red fading to black.
    fn default() -> Self {
        Self::new(
            vec![ColorStop::new(0.0, Rgba::RED), ColorStop::new(1.0, Rgba::BLACK)],
            false,
        )
    }
}

const RAINBOW_HEX: [&str; 23] = [
    "#ff0000", "#00ff00", "#0000ff", "#ffff00", "#ff00ff", "#00ffff", "#00ff00", "#0000ff",
    "#ffff00", "#ff00ff", "#00ffff", "#ff0000", "#00ff00", "#0000ff", "#ffff00", "#ff00ff",
    "#00ffff", "#00ff00", "#0000ff", "#ffff00", "#ff00ff", "#00ffff", "#000000",
];

impl Palette {
    pub const BUILTIN_NAMES: [&'static str; 2] = ["default", "rainbow"];

    pub fn new(stops: Vec<ColorStop>, force_spacing: bool) -> Self {
        Self {
            force_spacing,
            stops,
        }
    }

    /// Cycling primaries ending in black, evenly spaced.
    pub fn rainbow() -> Self {
        let stops = RAINBOW_HEX
            .iter()
            .enumerate()
            .filter_map(|(index, hex)| {
                Rgba::parse(hex)
                    .ok()
                    .map(|color| ColorStop::new(index as f64, color))
            })
            .collect();
        Self::new(stops, true)
    }

    pub fn builtin(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "rainbow" => Some(Self::rainbow()),
            _ => None,
        }
    }

    pub fn from_toml_str(input: &str) -> Result<Self, PaletteError> {
        let palette: Palette = toml::from_str(input)?;
        if palette.stops.is_empty() {
            return Err(PaletteError::Empty);
        }
        Ok(palette)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read palette at {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("failed to load palette at {}", path.display()))
    }

    /// Expands the palette into `steps` RGBA texels.
    pub fn generate(&self, steps: u32) -> Result<Vec<u8>, PaletteError> {
        generate(&self.stops, steps, self.force_spacing)
    }
}

/// Samples the gradient described by `stops` at `steps` evenly spaced
/// positions and returns `4 * steps` RGBA bytes.
///
/// Sample `i` sits at `i / (steps - 1)`, so the first and last texels carry
/// the gradient's end colors exactly.
pub fn generate(stops: &[ColorStop], steps: u32, force_spacing: bool) -> Result<Vec<u8>, PaletteError> {
    let placed = place_stops(stops, force_spacing)?;
    if steps == 0 {
        return Err(PaletteError::ZeroSteps);
    }

    let last = f64::from(steps.saturating_sub(1).max(1));
    let mut data = Vec::with_capacity(steps as usize * 4);
    for index in 0..steps {
        let position = if steps == 1 { 0.0 } else { f64::from(index) / last };
        data.extend_from_slice(&sample(&placed, position).to_array());
    }
    Ok(data)
}

/// Resolves every stop to its gradient offset, ordered by offset.
fn place_stops(stops: &[ColorStop], force_spacing: bool) -> Result<Vec<(f64, Rgba)>, PaletteError> {
    if stops.is_empty() {
        return Err(PaletteError::Empty);
    }
    if let Some(index) = stops.iter().position(|stop| !stop.value.is_finite()) {
        return Err(PaletteError::NonFinite { index });
    }

    let by_value = |a: &f64, b: &f64| a.partial_cmp(b).unwrap_or(Ordering::Equal);

    if force_spacing {
        let mut sorted = stops.to_vec();
        sorted.sort_by(|a, b| by_value(&a.value, &b.value));
        if sorted.len() == 1 {
            return Ok(vec![(0.0, sorted[0].color)]);
        }
        let spacing = (sorted.len() - 1) as f64;
        return Ok(sorted
            .iter()
            .enumerate()
            .map(|(index, stop)| (index as f64 / spacing, stop.color))
            .collect());
    }

    if let Some((index, stop)) = stops
        .iter()
        .enumerate()
        .find(|(_, stop)| !(0.0..=1.0).contains(&stop.value))
    {
        return Err(PaletteError::OffsetOutOfRange {
            index,
            value: stop.value,
        });
    }
    let mut placed: Vec<(f64, Rgba)> = stops.iter().map(|stop| (stop.value, stop.color)).collect();
    placed.sort_by(|a, b| by_value(&a.0, &b.0));
    Ok(placed)
}

fn sample(placed: &[(f64, Rgba)], position: f64) -> Rgba {
    let (first_offset, first_color) = placed[0];
    if position < first_offset {
        return first_color;
    }
    let lower_index = placed
        .iter()
        .rposition(|(offset, _)| *offset <= position)
        .unwrap_or(0);
    let (lower_offset, lower_color) = placed[lower_index];
    match placed.get(lower_index + 1) {
        Some(&(upper_offset, upper_color)) => {
            let fraction = (position - lower_offset) / (upper_offset - lower_offset);
            lower_color.lerp(upper_color, fraction)
        }
        None => lower_color,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texel(data: &[u8], index: usize) -> [u8; 4] {
        [
            data[index * 4],
            data[index * 4 + 1],
            data[index * 4 + 2],
            data[index * 4 + 3],
        ]
    }

    #[test]
    fn empty_palette_is_rejected_for_any_resolution() {
        for steps in [0, 1, 256] {
            for force in [false, true] {
                assert!(matches!(
                    generate(&[], steps, force),
                    Err(PaletteError::Empty)
                ));
            }
        }
    }

    #[test]
    fn output_holds_four_bytes_per_step() {
        let palette = Palette::rainbow();
        for steps in [1, 2, 3, 255, 256, 1000] {
            assert_eq!(palette.generate(steps).unwrap().len(), 4 * steps as usize);
        }
        assert!(matches!(palette.generate(0), Err(PaletteError::ZeroSteps)));
    }

    #[test]
    fn interpolates_linearly_between_stops() {
        let data = Palette::default().generate(3).unwrap();
        assert_eq!(texel(&data, 0), [255, 0, 0, 255]);
        assert_eq!(texel(&data, 1), [128, 0, 0, 255]);
        assert_eq!(texel(&data, 2), [0, 0, 0, 255]);
    }

    #[test]
    fn interpolates_alpha() {
        let stops = [
            ColorStop::new(0.0, Rgba::new(0, 0, 0, 0)),
            ColorStop::new(1.0, Rgba::new(200, 100, 50, 255)),
        ];
        let data = generate(&stops, 5, false).unwrap();
        assert_eq!(texel(&data, 2), [100, 50, 25, 128]);
    }

    #[test]
    fn forced_spacing_ignores_stop_order() {
        let stops = vec![
            ColorStop::new(3.0, Rgba::opaque(0, 0, 255)),
            ColorStop::new(-1.0, Rgba::opaque(255, 0, 0)),
            ColorStop::new(10.0, Rgba::opaque(255, 255, 255)),
            ColorStop::new(0.5, Rgba::opaque(0, 255, 0)),
        ];
        let expected = generate(&stops, 97, true).unwrap();

        let mut reversed = stops.clone();
        reversed.reverse();
        assert_eq!(generate(&reversed, 97, true).unwrap(), expected);

        let mut rotated = stops.clone();
        rotated.rotate_left(1);
        assert_eq!(generate(&rotated, 97, true).unwrap(), expected);

        assert_eq!(texel(&expected, 0), [255, 0, 0, 255]);
        assert_eq!(texel(&expected, 96), [255, 255, 255, 255]);
        assert_eq!(texel(&expected, 32), [0, 255, 0, 255]);
        assert_eq!(texel(&expected, 64), [0, 0, 255, 255]);
    }

    #[test]
    fn forced_spacing_keeps_ties_in_insertion_order() {
        let stops = [
            ColorStop::new(1.0, Rgba::opaque(0, 0, 255)),
            ColorStop::new(0.0, Rgba::opaque(255, 0, 0)),
            ColorStop::new(1.0, Rgba::opaque(0, 255, 0)),
        ];
        let data = generate(&stops, 3, true).unwrap();
        assert_eq!(texel(&data, 0), [255, 0, 0, 255]);
        assert_eq!(texel(&data, 1), [0, 0, 255, 255]);
        assert_eq!(texel(&data, 2), [0, 255, 0, 255]);
    }

    #[test]
    fn single_stop_produces_constant_table() {
        let stops = [ColorStop::new(42.0, Rgba::opaque(10, 20, 30))];
        let data = generate(&stops, 16, true).unwrap();
        assert!(data.chunks(4).all(|chunk| chunk == [10, 20, 30, 255]));

        let stops = [ColorStop::new(0.7, Rgba::opaque(10, 20, 30))];
        let data = generate(&stops, 16, false).unwrap();
        assert!(data.chunks(4).all(|chunk| chunk == [10, 20, 30, 255]));
    }

    #[test]
    fn duplicate_offsets_resolve_to_last_stop() {
        let stops = [
            ColorStop::new(0.0, Rgba::opaque(255, 0, 0)),
            ColorStop::new(0.5, Rgba::opaque(0, 255, 0)),
            ColorStop::new(0.5, Rgba::opaque(0, 0, 255)),
            ColorStop::new(1.0, Rgba::opaque(255, 255, 255)),
        ];
        let data = generate(&stops, 5, false).unwrap();
        assert_eq!(texel(&data, 1), [128, 128, 0, 255]);
        assert_eq!(texel(&data, 2), [0, 0, 255, 255]);
        assert_eq!(texel(&data, 3), [128, 128, 255, 255]);
    }

    #[test]
    fn samples_outside_stop_range_clamp_to_end_colors() {
        let stops = [
            ColorStop::new(0.25, Rgba::opaque(255, 0, 0)),
            ColorStop::new(0.75, Rgba::opaque(0, 0, 255)),
        ];
        let data = generate(&stops, 5, false).unwrap();
        assert_eq!(texel(&data, 0), [255, 0, 0, 255]);
        assert_eq!(texel(&data, 2), [128, 0, 128, 255]);
        assert_eq!(texel(&data, 4), [0, 0, 255, 255]);
    }

    #[test]
    fn unforced_offsets_must_be_in_unit_range() {
        let stops = [
            ColorStop::new(0.0, Rgba::RED),
            ColorStop::new(1.5, Rgba::BLACK),
        ];
        assert!(matches!(
            generate(&stops, 8, false),
            Err(PaletteError::OffsetOutOfRange { index: 1, .. })
        ));
        assert!(generate(&stops, 8, true).is_ok());

        let stops = [ColorStop::new(f64::NAN, Rgba::RED)];
        assert!(matches!(
            generate(&stops, 8, true),
            Err(PaletteError::NonFinite { index: 0 })
        ));
    }

    #[test]
    fn generation_is_deterministic() {
        let palette = Palette::rainbow();
        assert_eq!(palette.generate(300).unwrap(), palette.generate(300).unwrap());
    }

    #[test]
    fn rainbow_starts_red_and_ends_black() {
        let palette = Palette::rainbow();
        assert_eq!(palette.stops.len(), 23);
        let data = palette.generate(256).unwrap();
        assert_eq!(texel(&data, 0), [255, 0, 0, 255]);
        assert_eq!(texel(&data, 255), [0, 0, 0, 255]);
    }

    #[test]
    fn parses_css_style_colors() {
        assert_eq!(Rgba::parse("#f80").unwrap(), Rgba::opaque(255, 136, 0));
        assert_eq!(Rgba::parse("#ff000080").unwrap(), Rgba::new(255, 0, 0, 128));
        assert_eq!(Rgba::parse(" Red ").unwrap(), Rgba::RED);
        assert_eq!(Rgba::parse("Black").unwrap(), Rgba::BLACK);
        assert!(Rgba::parse("#12345").is_err());
        assert!(Rgba::parse("#gg0000").is_err());
        assert!(Rgba::parse("chartreuse-ish").is_err());
        assert_eq!(Rgba::new(1, 2, 3, 4).to_string(), "#01020304");
    }

    #[test]
    fn parses_palette_documents() {
        let palette = Palette::from_toml_str(
            r##"
force_spacing = true

[[stops]]
value = 2
color = "#0000ff"

[[stops]]
value = 1
color = "white"
"##,
        )
        .unwrap();
        assert!(palette.force_spacing);
        assert_eq!(palette.stops[1].color, Rgba::opaque(255, 255, 255));

        assert!(matches!(
            Palette::from_toml_str("stops = []"),
            Err(PaletteError::Empty)
        ));
        assert!(matches!(
            Palette::from_toml_str("[[stops]]\nvalue = 0\ncolor = \"nope\""),
            Err(PaletteError::Parse(_))
        ));
    }

    #[test]
    fn load_reports_the_palette_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("sunset.toml");
        fs::write(
            &path,
            "force_spacing = true\n[[stops]]\nvalue = 0\ncolor = \"orange\"\n[[stops]]\nvalue = 1\ncolor = \"#402\"\n",
        )
        .unwrap();
        let palette = Palette::load(&path).unwrap();
        assert!(palette.force_spacing);
        assert_eq!(palette.stops.len(), 2);

        fs::write(&path, "stops = []").unwrap();
        let err = Palette::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("sunset.toml"));
    }
}
