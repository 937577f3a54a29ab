use std::fmt;

use serde::{Deserialize, Serialize};

use crate::palette::Palette;

/// Iteration budget used until the caller picks another one.
pub const DEFAULT_ITERATIONS: u32 = 256;

/// Width and height of the default viewport in complex-plane units.
pub const DEFAULT_AXIS_LENGTH: f64 = 4.0;

/// A complex number (`x` real, `y` imaginary) or a 2D offset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    pub(crate) fn to_f32(self) -> [f32; 2] {
        [self.x as f32, self.y as f32]
    }
}

impl From<[f64; 2]> for Point {
    fn from(value: [f64; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("axis length must be a finite value greater than zero (got {0})")]
    AxisLength(f64),
    #[error("iteration count must be greater than zero")]
    Iterations,
    #[error("{field} must be finite (got {value})")]
    NonFinite { field: &'static str, value: Point },
}

/// The viewport and fractal parameters rendered each frame.
///
/// `center` and `axis_length` select the square
/// `[center.x - axis_length / 2, center.x + axis_length / 2] x
/// [center.y - axis_length / 2, center.y + axis_length / 2]`.
/// `c` and `p` are handed to the fractal's setup code unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub center: Point,
    pub axis_length: f64,
    pub iterations: u32,
    pub c: Point,
    pub p: Point,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            center: Point::ORIGIN,
            axis_length: DEFAULT_AXIS_LENGTH,
            iterations: DEFAULT_ITERATIONS,
            c: Point::ORIGIN,
            p: Point::ORIGIN,
        }
    }
}

impl Configuration {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.axis_length.is_finite() && self.axis_length > 0.0) {
            return Err(ConfigError::AxisLength(self.axis_length));
        }
        if self.iterations == 0 {
            return Err(ConfigError::Iterations);
        }
        for (field, value) in [("center", self.center), ("c", self.c), ("p", self.p)] {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite { field, value });
            }
        }
        Ok(())
    }

    /// Copies a fractal's preset parameters into `c` and `p`.
    pub fn load_preset(&mut self, c: Point, p: Point) {
        self.c = c;
        self.p = p;
    }

    /// Restores the default view while keeping the iteration budget and
    /// fractal parameters.
    pub fn reset_view(&mut self) {
        self.center = Point::ORIGIN;
        self.axis_length = DEFAULT_AXIS_LENGTH;
    }
}

/// One entry of the preview's fractal list: display name plus GLSL snippets
/// and the parameter preset loaded on request.
#[derive(Debug, Clone)]
pub struct FractalSource {
    pub key: String,
    pub name: String,
    pub setup: String,
    pub next: String,
    pub default_c: Point,
    pub default_p: Point,
}

/// Start-up options for the interactive preview window.
#[derive(Debug, Clone)]
pub struct PreviewConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Fractals to build, in cycling order.
    pub fractals: Vec<FractalSource>,
    /// Key of the fractal shown first; falls back to the first one that builds.
    pub initial_fractal: Option<String>,
    pub configuration: Configuration,
    pub palette: Palette,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_configuration_matches_initial_view() {
        let config = Configuration::default();
        assert_eq!(config.center, Point::ORIGIN);
        assert_eq!(config.axis_length, 4.0);
        assert_eq!(config.iterations, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_configurations() {
        let mut config = Configuration::default();
        config.axis_length = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::AxisLength(0.0)));

        let mut config = Configuration::default();
        config.iterations = 0;
        assert_eq!(config.validate(), Err(ConfigError::Iterations));

        let mut config = Configuration::default();
        config.c = Point::new(f64::NAN, 0.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFinite { field: "c", .. })
        ));
    }

    #[test]
    fn parses_partial_configuration_from_toml() {
        let config: Configuration = toml::from_str(
            r#"
iterations = 512
center = { x = -0.75, y = 0.1 }
"#,
        )
        .unwrap();
        assert_eq!(config.iterations, 512);
        assert_eq!(config.center, Point::new(-0.75, 0.1));
        assert_eq!(config.axis_length, DEFAULT_AXIS_LENGTH);
    }

    #[test]
    fn reset_view_keeps_parameters() {
        let mut config = Configuration {
            center: Point::new(1.0, 1.0),
            axis_length: 0.01,
            iterations: 1000,
            c: Point::new(0.3, 0.2),
            p: Point::ORIGIN,
        };
        config.reset_view();
        assert_eq!(config.center, Point::ORIGIN);
        assert_eq!(config.axis_length, DEFAULT_AXIS_LENGTH);
        assert_eq!(config.iterations, 1000);
        assert_eq!(config.c, Point::new(0.3, 0.2));
    }
}
