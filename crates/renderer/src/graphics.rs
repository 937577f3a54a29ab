use std::sync::Arc;

use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::compile::BuildError;
use crate::fractal::{DrawTarget, FractalRenderer};
use crate::gpu::{GpuContext, PaletteTexture, ProgramLayouts, RenderSurface};
use crate::palette::{Palette, PaletteError};
use crate::types::{ConfigError, Configuration, FractalSource};

#[derive(Debug, thiserror::Error)]
pub enum GraphicsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Palette(#[from] PaletteError),
}

/// Owns the render target, the live [`Configuration`] and the bound palette.
///
/// The configuration is only read while drawing. Callers edit it between
/// frames through [`GraphicsContext::config_mut`] or replace it with
/// [`GraphicsContext::set_config`].
pub struct GraphicsContext {
    surface: RenderSurface,
    gpu: GpuContext,
    layouts: ProgramLayouts,
    config: Configuration,
    palette: Palette,
    palette_data: Vec<u8>,
    palette_texture: PaletteTexture,
    rejected: Option<Configuration>,
    frames_presented: u64,
}

impl GraphicsContext {
    /// Renders into an offscreen texture of `width x height`.
    pub fn headless(
        (width, height): (u32, u32),
        config: Configuration,
        palette: Palette,
    ) -> Result<Self> {
        let gpu = GpuContext::new(GpuContext::create_instance(), None)?;
        let surface = RenderSurface::offscreen(&gpu.device, (width, height));
        Self::from_parts(gpu, surface, config, palette)
    }

    /// Renders into a window. The surface keeps `target` alive.
    pub fn for_window<W>(
        target: Arc<W>,
        size: (u32, u32),
        config: Configuration,
        palette: Palette,
    ) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = GpuContext::create_instance();
        let surface = instance
            .create_surface(target)
            .context("failed to create rendering surface")?;
        let gpu = GpuContext::new(instance, Some(&surface))?;
        let surface = RenderSurface::for_window(&gpu, surface, size);
        Self::from_parts(gpu, surface, config, palette)
    }

    fn from_parts(
        gpu: GpuContext,
        surface: RenderSurface,
        config: Configuration,
        palette: Palette,
    ) -> Result<Self> {
        config.validate().context("invalid initial configuration")?;
        let layouts = ProgramLayouts::new(&gpu.device);
        let palette_data = generate_for_device(&gpu, &palette, config.iterations)
            .context("invalid initial palette")?;
        let palette_texture =
            PaletteTexture::upload(&gpu.device, &gpu.queue, &layouts.palette_layout, &palette_data);

        let info = gpu.adapter_info();
        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            size = ?surface.size(),
            "graphics context ready"
        );

        Ok(Self {
            surface,
            gpu,
            layouts,
            config,
            palette,
            palette_data,
            palette_texture,
            rejected: None,
            frames_presented: 0,
        })
    }

    /// Compiles `source` into a renderer targeting this context's surface.
    pub fn build_renderer(&self, source: &FractalSource) -> Result<FractalRenderer, BuildError> {
        FractalRenderer::new(
            &self.gpu.device,
            &self.layouts,
            self.surface.format(),
            source,
        )
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Mutable access for in-place edits between frames. Changing
    /// `iterations` here leaves the palette at its old width until the next
    /// [`draw`](Self::draw) or [`set_palette`](Self::set_palette). Nothing is
    /// validated until then.
    pub fn config_mut(&mut self) -> &mut Configuration {
        &mut self.config
    }

    /// Validates and stores `config`, regenerating the palette at the new
    /// iteration count. Nothing changes when either step fails.
    pub fn set_config(&mut self, config: Configuration) -> Result<(), GraphicsError> {
        config.validate()?;
        if config.iterations != self.palette_texture.width() {
            let data = generate_for_device(&self.gpu, &self.palette, config.iterations)?;
            self.upload_palette(data);
        }
        self.config = config;
        Ok(())
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// The RGBA table currently bound for sampling.
    pub fn palette_data(&self) -> &[u8] {
        &self.palette_data
    }

    /// Regenerates the palette table at `config.iterations` and binds it.
    /// A rejected palette leaves the previous one in place.
    pub fn set_palette(&mut self, palette: Palette) -> Result<(), PaletteError> {
        let data = generate_for_device(&self.gpu, &palette, self.config.iterations)?;
        self.palette = palette;
        self.upload_palette(data);
        Ok(())
    }

    /// Resizes the render target; `height` defaults to `width`.
    pub fn set_canvas_size(&mut self, width: u32, height: Option<u32>) {
        let size = (width, height.unwrap_or(width));
        self.surface.resize(&self.gpu.device, size);
        tracing::debug!(?size, "canvas resized");
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.surface.size()
    }

    /// Draws one frame with `renderer` and presents it.
    ///
    /// Edits made through [`config_mut`](Self::config_mut) are checked here.
    /// An invalid configuration skips the frame. When the palette cannot be
    /// regenerated at the new iteration count, the frame is drawn with
    /// `iterations` equal to the bound palette width. Each rejected
    /// configuration is logged once.
    pub fn draw(&mut self, renderer: &FractalRenderer) -> Result<(), wgpu::SurfaceError> {
        let Some(frame_config) = self.frame_config() else {
            return Ok(());
        };

        let frame = match self.surface.acquire() {
            Ok(frame) => frame,
            Err(err @ (wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)) => {
                self.surface.reconfigure(&self.gpu.device);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        renderer.draw(
            &DrawTarget {
                device: &self.gpu.device,
                queue: &self.gpu.queue,
                view: frame.view(),
                palette: &self.palette_texture.bind_group,
            },
            &frame_config,
        );
        frame.present();
        self.frames_presented += 1;
        Ok(())
    }

    /// Frames drawn and presented so far.
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// RGBA bytes of the last frame, row by row from the top. Only headless
    /// contexts can be read back.
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        self.surface.read_back(&self.gpu.device, &self.gpu.queue)
    }

    /// Widest palette the device can hold, which bounds `iterations`.
    pub fn max_iterations(&self) -> u32 {
        self.gpu.max_texture_width()
    }

    /// Configuration used for the next frame, or `None` to skip it.
    fn frame_config(&mut self) -> Option<Configuration> {
        let mut config = self.config;
        if let Err(err) = config.validate() {
            self.note_rejected(config, &err);
            return None;
        }
        if self.palette_texture.width() != config.iterations {
            tracing::debug!(
                palette_width = self.palette_texture.width(),
                iterations = config.iterations,
                "iteration count changed; regenerating palette"
            );
            match generate_for_device(&self.gpu, &self.palette, config.iterations) {
                Ok(data) => self.upload_palette(data),
                Err(err) => {
                    self.note_rejected(config, &err);
                    config.iterations = self.palette_texture.width();
                    return Some(config);
                }
            }
        }
        self.rejected = None;
        Some(config)
    }

    fn note_rejected(&mut self, config: Configuration, err: &dyn std::error::Error) {
        if self.rejected != Some(config) {
            tracing::warn!(error = %err, "configuration rejected for drawing");
            self.rejected = Some(config);
        }
    }

    fn upload_palette(&mut self, data: Vec<u8>) {
        self.palette_texture = PaletteTexture::upload(
            &self.gpu.device,
            &self.gpu.queue,
            &self.layouts.palette_layout,
            &data,
        );
        self.palette_data = data;
    }
}

fn generate_for_device(
    gpu: &GpuContext,
    palette: &Palette,
    steps: u32,
) -> Result<Vec<u8>, PaletteError> {
    let limit = gpu.max_texture_width();
    if steps > limit {
        return Err(PaletteError::ExceedsTextureLimit { steps, limit });
    }
    palette.generate(steps)
}
