use std::fmt;

use wgpu::util::DeviceExt;

use crate::compile::{
    assemble_fragment, BuildError, CompiledProgram, FractalSnippets, ShaderProgramBuilder,
    VERTEX_SHADER_GLSL,
};
use crate::gpu::{FractalUniforms, ProgramLayouts};
use crate::types::{Configuration, FractalSource, Point};

/// Clip-space positions of the quad, top-left first, counter-clockwise.
pub const CLIP_CORNERS: [[f32; 2]; 4] = [[-1.0, 1.0], [-1.0, -1.0], [1.0, -1.0], [1.0, 1.0]];

/// Two triangles over [`CLIP_CORNERS`].
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 0, 2, 3];

/// Complex-plane coordinates of the viewport corners in the order of
/// [`CLIP_CORNERS`]: top-left, bottom-left, bottom-right, top-right.
pub fn viewport_corners(config: &Configuration) -> [Point; 4] {
    let half = config.axis_length / 2.0;
    let Point { x, y } = config.center;
    [
        Point::new(x - half, y + half),
        Point::new(x - half, y - half),
        Point::new(x + half, y - half),
        Point::new(x + half, y + half),
    ]
}

/// What a draw renders into.
pub(crate) struct DrawTarget<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub view: &'a wgpu::TextureView,
    pub palette: &'a wgpu::BindGroup,
}

/// One fractal kind: its linked program and the quad it is drawn on.
///
/// All GPU objects are allocated in [`FractalRenderer::new`]; drawing only
/// rewrites buffer contents.
pub struct FractalRenderer {
    key: String,
    name: String,
    default_c: Point,
    default_p: Point,
    program: CompiledProgram,
    clip_buffer: wgpu::Buffer,
    location_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
}

impl fmt::Debug for FractalRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FractalRenderer")
            .field("key", &self.key)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl FractalRenderer {
    pub(crate) fn new(
        device: &wgpu::Device,
        layouts: &ProgramLayouts,
        target_format: wgpu::TextureFormat,
        source: &FractalSource,
    ) -> Result<Self, BuildError> {
        let fragment = assemble_fragment(&FractalSnippets::new(&source.setup, &source.next))?;
        let program = ShaderProgramBuilder::new(device, layouts, target_format)
            .build(VERTEX_SHADER_GLSL, &fragment)?;

        let clip_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad clip positions"),
            contents: bytemuck::cast_slice(&CLIP_CORNERS),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let location_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("quad locations"),
            size: std::mem::size_of::<[[f32; 2]; 4]>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad indices"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        tracing::debug!(fractal = %source.key, "built fractal program");
        Ok(Self {
            key: source.key.clone(),
            name: source.name.clone(),
            default_c: source.default_c,
            default_p: source.default_p,
            program,
            clip_buffer,
            location_buffer,
            index_buffer,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default `c` and `p` for this fractal.
    pub fn preset(&self) -> (Point, Point) {
        (self.default_c, self.default_p)
    }

    /// Uploads parameters and corner locations, then encodes and submits one
    /// draw of the quad.
    pub(crate) fn draw(&self, target: &DrawTarget<'_>, config: &Configuration) {
        let config = *config;

        let uniforms = FractalUniforms::from_config(&config);
        target
            .queue
            .write_buffer(&self.program.params_buffer, 0, bytemuck::bytes_of(&uniforms));
        let locations = viewport_corners(&config).map(Point::to_f32);
        target
            .queue
            .write_buffer(&self.location_buffer, 0, bytemuck::cast_slice(&locations));

        let mut encoder = target
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("fractal encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("fractal pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.program.pipeline);
            render_pass.set_bind_group(0, &self.program.params_bind_group, &[]);
            render_pass.set_bind_group(1, target.palette, &[]);
            render_pass.set_vertex_buffer(0, self.clip_buffer.slice(..));
            render_pass.set_vertex_buffer(1, self.location_buffer.slice(..));
            render_pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..QUAD_INDICES.len() as u32, 0, 0..1);
        }
        target.queue.submit(std::iter::once(encoder.finish()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_view_corners() {
        let corners = viewport_corners(&Configuration::default());
        assert_eq!(
            corners,
            [
                Point::new(-2.0, 2.0),
                Point::new(-2.0, -2.0),
                Point::new(2.0, -2.0),
                Point::new(2.0, 2.0),
            ]
        );
    }

    #[test]
    fn corners_follow_center_and_axis() {
        let config = Configuration {
            center: Point::new(-0.75, 0.25),
            axis_length: 0.5,
            ..Configuration::default()
        };
        let [top_left, bottom_left, bottom_right, top_right] = viewport_corners(&config);
        assert_eq!(top_left, Point::new(-1.0, 0.5));
        assert_eq!(bottom_left, Point::new(-1.0, 0.0));
        assert_eq!(bottom_right, Point::new(-0.5, 0.0));
        assert_eq!(top_right, Point::new(-0.5, 0.5));
    }

    #[test]
    fn corners_pair_with_clip_positions() {
        let corners = viewport_corners(&Configuration::default());
        for (corner, clip) in corners.iter().zip(CLIP_CORNERS) {
            assert_eq!(corner.x.signum() as f32, clip[0].signum());
            assert_eq!(corner.y.signum() as f32, clip[1].signum());
        }
    }

    #[test]
    fn indices_cover_the_quad_with_two_triangles() {
        assert_eq!(QUAD_INDICES.len(), 6);
        assert!(QUAD_INDICES.iter().all(|&index| (index as usize) < CLIP_CORNERS.len()));
    }
}
