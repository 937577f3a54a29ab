use std::sync::mpsc;

use anyhow::{anyhow, bail, Context, Result};

use super::context::GpuContext;

/// Format of the offscreen target used for headless rendering.
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Where frames end up: a window swapchain or a plain texture.
pub(crate) enum RenderSurface {
    Window {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

/// A frame acquired from a [`RenderSurface`].
pub(crate) enum Frame {
    Window {
        texture: wgpu::SurfaceTexture,
        view: wgpu::TextureView,
    },
    Offscreen {
        view: wgpu::TextureView,
    },
}

impl Frame {
    pub(crate) fn view(&self) -> &wgpu::TextureView {
        match self {
            Frame::Window { view, .. } | Frame::Offscreen { view } => view,
        }
    }

    pub(crate) fn present(self) {
        if let Frame::Window { texture, .. } = self {
            texture.present();
        }
    }
}

impl RenderSurface {
    /// Configures a window surface. Palette bytes are authored in display
    /// space, so a non-sRGB format is preferred.
    pub(crate) fn for_window(
        gpu: &GpuContext,
        surface: wgpu::Surface<'static>,
        (width, height): (u32, u32),
    ) -> Self {
        let caps = surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| !format.is_srgb())
            .unwrap_or_else(|| {
                let fallback = caps.formats[0];
                tracing::warn!(
                    ?fallback,
                    "no non-sRGB surface format available; palette colors will be gamma encoded"
                );
                fallback
            });
        let present_mode = caps
            .present_modes
            .iter()
            .copied()
            .find(|mode| *mode == wgpu::PresentMode::Fifo)
            .unwrap_or(caps.present_modes[0]);
        tracing::debug!(?format, ?present_mode, "configuring window surface");

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);
        RenderSurface::Window { surface, config }
    }

    pub(crate) fn offscreen(device: &wgpu::Device, (width, height): (u32, u32)) -> Self {
        let texture = create_offscreen_texture(device, width, height);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        RenderSurface::Offscreen { texture, view }
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        match self {
            RenderSurface::Window { config, .. } => config.format,
            RenderSurface::Offscreen { .. } => OFFSCREEN_FORMAT,
        }
    }

    pub(crate) fn size(&self) -> (u32, u32) {
        match self {
            RenderSurface::Window { config, .. } => (config.width, config.height),
            RenderSurface::Offscreen { texture, .. } => (texture.width(), texture.height()),
        }
    }

    /// Zero-sized requests are ignored.
    pub(crate) fn resize(&mut self, device: &wgpu::Device, (width, height): (u32, u32)) {
        if width == 0 || height == 0 {
            return;
        }
        match self {
            RenderSurface::Window { surface, config } => {
                config.width = width;
                config.height = height;
                surface.configure(device, config);
            }
            RenderSurface::Offscreen { texture, view } => {
                *texture = create_offscreen_texture(device, width, height);
                *view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            }
        }
    }

    /// Reapplies the current configuration after a lost or outdated frame.
    pub(crate) fn reconfigure(&self, device: &wgpu::Device) {
        if let RenderSurface::Window { surface, config } = self {
            surface.configure(device, config);
        }
    }

    pub(crate) fn acquire(&self) -> Result<Frame, wgpu::SurfaceError> {
        match self {
            RenderSurface::Window { surface, .. } => {
                let texture = surface.get_current_texture()?;
                let view = texture
                    .texture
                    .create_view(&wgpu::TextureViewDescriptor::default());
                Ok(Frame::Window { texture, view })
            }
            RenderSurface::Offscreen { view, .. } => Ok(Frame::Offscreen { view: view.clone() }),
        }
    }

    /// Copies the offscreen target back to the CPU as tightly packed RGBA
    /// rows, top row first.
    pub(crate) fn read_back(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        let RenderSurface::Offscreen { texture, .. } = self else {
            bail!("only offscreen targets can be read back");
        };
        let (width, height) = (texture.width(), texture.height());
        let row_bytes = width * 4;
        let padded_row_bytes = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen readback"),
            size: u64::from(padded_row_bytes) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            texture.size(),
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait)
            .context("failed to wait for the readback copy")?;
        receiver
            .recv()
            .map_err(|_| anyhow!("readback mapping was dropped"))?
            .context("failed to map readback buffer")?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        for row in mapped.chunks_exact(padded_row_bytes as usize) {
            pixels.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(mapped);
        staging.unmap();
        Ok(pixels)
    }
}

fn create_offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}
