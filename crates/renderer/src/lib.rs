//! GPU renderer for escape-time fractals.
//!
//! A fractal is a pair of GLSL snippets spliced into one shared fragment
//! template (see [`compile`]). Each pixel of a viewport quad maps to a point
//! of the complex plane; the template iterates the fractal's recurrence there
//! and looks the escape iteration up in a palette texture.
//!
//! ```text
//!   FractalSource ──▶ assemble_fragment ──▶ naga validation ──▶ FractalRenderer
//!                                                                     │
//!   Palette ──▶ palette::generate ──▶ GraphicsContext ◀── Configuration
//!                                           │
//!                                           └─▶ draw() ─▶ surface / offscreen
//! ```
//!
//! [`GraphicsContext`] owns the device, the render target, the live
//! [`Configuration`] and the bound palette. [`run_preview`] wraps it in an
//! interactive `winit` window.

pub mod compile;
mod fractal;
mod gpu;
mod graphics;
pub mod interaction;
pub mod palette;
mod types;
mod window;

pub use compile::{BuildError, InsertionPoint, ShaderStageKind};
pub use fractal::{viewport_corners, FractalRenderer, CLIP_CORNERS, QUAD_INDICES};
pub use graphics::{GraphicsContext, GraphicsError};
pub use palette::{ColorStop, Palette, PaletteError, Rgba};
pub use types::{
    ConfigError, Configuration, FractalSource, Point, PreviewConfig, DEFAULT_AXIS_LENGTH,
    DEFAULT_ITERATIONS,
};
pub use window::run_preview;
