//! wgpu plumbing shared by the fractal renderers.
//!
//! - `context` owns the instance, adapter, device and queue.
//! - `surface` wraps the presentation target: a window swapchain or an
//!   offscreen texture for headless rendering.
//! - `pipeline` holds the bind group and vertex layouts every fractal program
//!   is built against.
//! - `texture` uploads palette tables.
//! - `uniforms` mirrors the template's `FractalParams` block.

mod context;
mod pipeline;
mod surface;
mod texture;
mod uniforms;

pub(crate) use context::GpuContext;
pub(crate) use pipeline::{ProgramLayouts, QUAD_VERTEX_BUFFERS};
pub(crate) use surface::RenderSurface;
pub(crate) use texture::PaletteTexture;
pub(crate) use uniforms::FractalUniforms;
